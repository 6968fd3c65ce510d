//! Import handling and classification for function bundling
//!
//! This module provides the core types for a file's import section: the
//! statements found there, the names each one binds, and the classified
//! groups they are emitted in.

pub mod classifier;
pub mod parser;

use std::ops::RangeInclusive;

use serde::Serialize;

pub use classifier::ImportClassifier;
pub use parser::{ImportParseError, ImportParser};

use crate::types::ModuleKind;

/// Grammatical form of an import statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "form")]
pub enum ImportForm {
    /// `import a, b.c as d`
    Simple,
    /// `from ..pkg import a, b as c`
    From {
        /// Module without leading dots, if any
        module: Option<String>,
        /// Number of leading dots
        level: u32,
    },
}

/// One imported name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportEntry {
    /// Dotted module the name comes from, including leading dots
    pub module: String,
    /// Imported member for from-imports (`*` for star imports)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub kind: ModuleKind,
}

impl ImportEntry {
    /// Name this entry binds in the importing module
    pub fn binding(&self) -> &str {
        if let Some(alias) = &self.alias {
            return alias;
        }
        match &self.name {
            Some(name) => name,
            // `import a.b` binds `a`
            None => self.module.split('.').next().unwrap_or(&self.module),
        }
    }

    pub fn is_star(&self) -> bool {
        self.name.as_deref() == Some("*")
    }
}

/// A single import statement from an import section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportStatement {
    /// Verbatim source lines, leading comment lines included, newline-terminated
    pub text: String,
    /// 1-based file lines the statement itself spans
    pub lines: RangeInclusive<usize>,
    /// Module name the statement was classified by
    pub primary_module: String,
    pub kind: ModuleKind,
    pub form: ImportForm,
    pub entries: Vec<ImportEntry>,
    /// Inside a development-only block nested in the import section
    pub dev_only: bool,
}

impl ImportStatement {
    pub fn is_future(&self) -> bool {
        self.primary_module == "__future__"
    }

    /// Whitespace-insensitive rendering used to detect duplicate imports
    pub fn canonical(&self) -> String {
        match &self.form {
            ImportForm::Simple => {
                let names: Vec<_> = self.entries.iter().map(render_simple).collect();
                format!("import {}", names.join(", "))
            }
            ImportForm::From { .. } => {
                let names: Vec<_> = self.entries.iter().map(render_member).collect();
                format!("from {} import {}", self.primary_module, names.join(", "))
            }
        }
    }

    /// Names bound by this statement
    pub fn bindings(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|entry| !entry.is_star())
            .map(ImportEntry::binding)
    }
}

fn render_simple(entry: &ImportEntry) -> String {
    match &entry.alias {
        Some(alias) => format!("{} as {alias}", entry.module),
        None => entry.module.clone(),
    }
}

fn render_member(entry: &ImportEntry) -> String {
    let name = entry.name.as_deref().unwrap_or_default();
    match &entry.alias {
        Some(alias) => format!("{name} as {alias}"),
        None => name.to_owned(),
    }
}

/// Consecutive statements sharing one classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportGroup {
    pub kind: ModuleKind,
    pub statements: Vec<ImportStatement>,
}

impl ImportGroup {
    pub fn entries(&self) -> impl Iterator<Item = &ImportEntry> {
        self.statements
            .iter()
            .flat_map(|statement| statement.entries.iter())
    }

    /// 1-based file lines from the first to the last statement
    pub fn lines(&self) -> Option<RangeInclusive<usize>> {
        let first = self.statements.first()?;
        let last = self.statements.last()?;
        Some(*first.lines.start()..=*last.lines.end())
    }
}

/// Split statements into runs of equal classification, keeping file order
pub fn group_statements(statements: Vec<ImportStatement>) -> Vec<ImportGroup> {
    let mut groups: Vec<ImportGroup> = Vec::new();
    for statement in statements {
        match groups.last_mut() {
            Some(group) if group.kind == statement.kind => group.statements.push(statement),
            _ => groups.push(ImportGroup {
                kind: statement.kind,
                statements: vec![statement],
            }),
        }
    }
    groups
}
