//! Shared type definitions for the fnpack crate
//!
//! This module contains common types that are used across multiple components
//! of the bundler, ensuring consistency and avoiding circular dependencies.

use std::hash::BuildHasherDefault;

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHasher;
use serde::Serialize;

pub type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;
pub type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

/// Classification of an imported module based on its origin
///
/// Generated import sections are regrouped in this order, so the derived
/// `Ord` is load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    /// Python standard library modules (e.g., os, sys, json)
    StandardLibrary,

    /// Packages that must be shipped alongside the function (e.g., boto3, aiohttp)
    ThirdParty,

    /// Relative imports of sibling modules in the source tree
    Local,
}

impl ModuleKind {
    pub fn is_third_party(self) -> bool {
        matches!(self, Self::ThirdParty)
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StandardLibrary => write!(f, "stdlib"),
            Self::ThirdParty => write!(f, "third-party"),
            Self::Local => write!(f, "local"),
        }
    }
}
