//! AST visitor implementations for fnpack
//!
//! These visitors walk ruff's Python AST to answer the questions inlining
//! needs: which names a scope binds, where imports live, and which
//! occurrences of a module-level name must follow it when it is renamed.

mod binding_collector;
mod import_locator;
mod rename_collector;

pub use binding_collector::{BindingCollector, ScopeBindings};
pub use import_locator::{ImportLocator, LocatedImport};
pub use rename_collector::{RenameCollector, RenameSite};
