//! Standard library detection
//!
//! The registry is an immutable value handed to the classifier instead of
//! process-wide state, so tests can swap in a synthetic set of names.

use ruff_python_stdlib::sys;
use rustc_hash::FxHashSet;

/// Set of top-level module names treated as the Python standard library
#[derive(Debug, Clone, Default)]
pub struct StdlibRegistry {
    /// Explicit names, checked first
    names: FxHashSet<String>,
    /// Python minor version (e.g. 12 for 3.12) used to consult ruff's stdlib
    /// database; `None` restricts the registry to `names`
    python_version: Option<u8>,
}

impl StdlibRegistry {
    /// Registry backed by ruff's stdlib database for the given minor version
    pub fn for_python_version(python_version: u8) -> Self {
        let mut names = FxHashSet::default();
        // __future__ is not part of ruff's is_known_standard_library
        names.insert("__future__".to_owned());
        Self {
            names,
            python_version: Some(python_version),
        }
    }

    /// Registry containing exactly the given names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            python_version: None,
        }
    }

    /// Add extra names on top of the existing registry
    #[must_use]
    pub fn with_extra_names<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(extra.into_iter().map(Into::into));
        self
    }

    /// Check whether a top-level module name belongs to the registry
    pub fn contains(&self, top_level: &str) -> bool {
        if top_level.is_empty() {
            return false;
        }
        if self.names.contains(top_level) {
            return true;
        }
        self.python_version
            .is_some_and(|version| sys::is_known_standard_library(version, top_level))
    }

    /// Iterate the explicitly registered names
    pub fn explicit_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Parse a target version string such as `py312` or `3.12` into a minor version
pub fn parse_python_version(version: &str) -> Option<u8> {
    let trimmed = version.trim();
    let digits = trimmed
        .strip_prefix("py3")
        .or_else(|| trimmed.strip_prefix("3."))?;
    digits.parse().ok()
}
