//! Import location visitor
//!
//! Finds every import statement in a module at any depth, including those
//! inside functions, classes and conditional blocks.

use ruff_python_ast::{
    ModModule, Stmt,
    visitor::{Visitor, walk_stmt},
};
use ruff_text_size::{Ranged, TextRange};

/// One import statement and the dotted names it may refer to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedImport {
    pub range: TextRange,
    /// For `import a.b` the module itself; for `from m import x` both `m`
    /// and `m.x`, since `x` may be a submodule. Leading dots are kept.
    pub candidates: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ImportLocator {
    imports: Vec<LocatedImport>,
}

impl ImportLocator {
    pub fn locate(module: &ModModule) -> Vec<LocatedImport> {
        let mut locator = Self::default();
        locator.visit_body(&module.body);
        locator.imports
    }
}

impl<'a> Visitor<'a> for ImportLocator {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::Import(import) => {
                self.imports.push(LocatedImport {
                    range: import.range(),
                    candidates: import
                        .names
                        .iter()
                        .map(|alias| alias.name.to_string())
                        .collect(),
                });
            }
            Stmt::ImportFrom(import_from) => {
                let dots = ".".repeat(import_from.level as usize);
                let base = match &import_from.module {
                    Some(module) => format!("{dots}{module}"),
                    None => dots.clone(),
                };
                let mut candidates = vec![base.clone()];
                for alias in &import_from.names {
                    if base.ends_with('.') || base.is_empty() {
                        candidates.push(format!("{base}{}", alias.name));
                    } else {
                        candidates.push(format!("{base}.{}", alias.name));
                    }
                }
                self.imports.push(LocatedImport {
                    range: import_from.range(),
                    candidates,
                });
            }
            _ => walk_stmt(self, stmt),
        }
    }
}
