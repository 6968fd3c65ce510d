//! Binding collection visitor
//!
//! Collects the names one scope binds. Compound statements (`if`, `for`,
//! `while`, `try`, `with`) do not open a scope in Python, so their bodies are
//! walked; nested function and class bodies, lambdas and comprehensions are
//! not.

use ruff_python_ast::{
    ExceptHandler, Expr, Parameters, Stmt,
    visitor::{Visitor, walk_expr, walk_stmt},
};

use crate::types::FxIndexSet;

/// Names bound in one scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeBindings {
    /// Bound by definitions, assignments, loop targets and parameters
    pub defined: FxIndexSet<String>,
    /// Bound by import statements
    pub imported: FxIndexSet<String>,
    /// Declared `global` in this scope
    pub globals: FxIndexSet<String>,
}

impl ScopeBindings {
    pub fn contains(&self, name: &str) -> bool {
        self.defined.contains(name) || self.imported.contains(name)
    }

    /// Every bound name, definitions first
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defined
            .iter()
            .chain(self.imported.iter())
            .map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct BindingCollector {
    bindings: ScopeBindings,
}

impl BindingCollector {
    /// Bindings of a module (or class) body
    pub fn collect(body: &[Stmt]) -> ScopeBindings {
        Self::collect_from(body)
    }

    /// Bindings of a selection of top-level statements
    pub fn collect_from<'a>(stmts: impl IntoIterator<Item = &'a Stmt>) -> ScopeBindings {
        let mut collector = Self::default();
        for stmt in stmts {
            collector.visit_stmt(stmt);
        }
        collector.bindings
    }

    /// Local bindings of a function: its parameters and whatever its body
    /// binds, minus names declared `global`
    pub fn collect_function(parameters: &Parameters, body: &[Stmt]) -> ScopeBindings {
        let mut collector = Self::default();
        collector
            .bindings
            .defined
            .extend(parameter_names(parameters).map(ToOwned::to_owned));
        collector.visit_body(body);

        let mut bindings = collector.bindings;
        let globals = bindings.globals.clone();
        bindings.defined.retain(|name| !globals.contains(name));
        bindings.imported.retain(|name| !globals.contains(name));
        bindings
    }

    fn collect_target(&mut self, target: &Expr) {
        match target {
            Expr::Name(name) => {
                self.bindings.defined.insert(name.id.to_string());
            }
            Expr::Tuple(tuple) => {
                for elt in &tuple.elts {
                    self.collect_target(elt);
                }
            }
            Expr::List(list) => {
                for elt in &list.elts {
                    self.collect_target(elt);
                }
            }
            Expr::Starred(starred) => self.collect_target(&starred.value),
            _ => {}
        }
    }
}

impl<'a> Visitor<'a> for BindingCollector {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::FunctionDef(func) => {
                self.bindings.defined.insert(func.name.to_string());
            }
            Stmt::ClassDef(class) => {
                self.bindings.defined.insert(class.name.to_string());
            }
            Stmt::Import(import) => {
                for alias in &import.names {
                    let bound = match &alias.asname {
                        Some(asname) => asname.as_str(),
                        // `import a.b` binds `a`
                        None => alias.name.as_str().split('.').next().unwrap_or_default(),
                    };
                    self.bindings.imported.insert(bound.to_owned());
                }
            }
            Stmt::ImportFrom(import_from) => {
                for alias in &import_from.names {
                    if alias.name.as_str() == "*" {
                        continue;
                    }
                    let bound = alias.asname.as_ref().unwrap_or(&alias.name);
                    self.bindings.imported.insert(bound.to_string());
                }
            }
            Stmt::Assign(assign) => {
                for target in &assign.targets {
                    self.collect_target(target);
                }
                self.visit_expr(&assign.value);
            }
            Stmt::AnnAssign(ann_assign) => {
                self.collect_target(&ann_assign.target);
                if let Some(value) = &ann_assign.value {
                    self.visit_expr(value);
                }
            }
            Stmt::AugAssign(aug_assign) => {
                self.collect_target(&aug_assign.target);
                self.visit_expr(&aug_assign.value);
            }
            Stmt::For(for_stmt) => {
                self.collect_target(&for_stmt.target);
                walk_stmt(self, stmt);
            }
            Stmt::With(with_stmt) => {
                for item in &with_stmt.items {
                    if let Some(vars) = &item.optional_vars {
                        self.collect_target(vars);
                    }
                }
                walk_stmt(self, stmt);
            }
            Stmt::Try(try_stmt) => {
                for handler in &try_stmt.handlers {
                    let ExceptHandler::ExceptHandler(eh) = handler;
                    if let Some(name) = &eh.name {
                        self.bindings.defined.insert(name.to_string());
                    }
                }
                walk_stmt(self, stmt);
            }
            Stmt::Global(global_stmt) => {
                for name in &global_stmt.names {
                    self.bindings.globals.insert(name.to_string());
                }
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Named(named) => {
                self.collect_target(&named.target);
                self.visit_expr(&named.value);
            }
            // Own scopes
            Expr::Lambda(_)
            | Expr::ListComp(_)
            | Expr::SetComp(_)
            | Expr::DictComp(_)
            | Expr::Generator(_) => {}
            _ => walk_expr(self, expr),
        }
    }
}

/// Names of every parameter, in declaration order
pub(crate) fn parameter_names(parameters: &Parameters) -> impl Iterator<Item = &str> {
    parameters
        .posonlyargs
        .iter()
        .chain(&parameters.args)
        .chain(&parameters.kwonlyargs)
        .map(|param| param.parameter.name.as_str())
        .chain(parameters.vararg.iter().map(|param| param.name.as_str()))
        .chain(parameters.kwarg.iter().map(|param| param.name.as_str()))
}

#[cfg(test)]
mod tests {
    use ruff_python_parser::parse_module;

    use super::*;

    fn module_bindings(code: &str) -> ScopeBindings {
        let parsed = parse_module(code).expect("valid python");
        BindingCollector::collect(&parsed.syntax().body)
    }

    #[test]
    fn test_top_level_bindings() {
        let bindings = module_bindings(
            r#"
import os.path
from json import dumps as to_json
from typing import *
TIMEOUT = 30
a, (b, *rest) = 1, (2, 3)
count: int = 0

def helper():
    inner = 1

class Settings:
    field = 2

if os.environ.get("X"):
    flag = True
else:
    flag = False

for item in []:
    pass

with open("f") as handle:
    pass

try:
    pass
except ValueError as err:
    pass

if (found := 3):
    pass

squares = [sq for sq in range(3)]
"#,
        );

        let defined: Vec<_> = bindings.defined.iter().map(String::as_str).collect();
        assert_eq!(
            defined,
            vec![
                "TIMEOUT", "a", "b", "rest", "count", "helper", "Settings", "flag", "item",
                "handle", "err", "found", "squares"
            ]
        );
        let imported: Vec<_> = bindings.imported.iter().map(String::as_str).collect();
        assert_eq!(imported, vec!["os", "to_json"]);
        assert!(!bindings.contains("inner"));
        assert!(!bindings.contains("field"));
        assert!(!bindings.contains("sq"));
    }

    #[test]
    fn test_function_locals_exclude_globals() {
        let parsed = parse_module(
            r#"
def handler(event, *args, flag=False, **kwargs):
    global CACHE
    CACHE = {}
    result = event
    def nested():
        hidden = 1
    return result
"#,
        )
        .expect("valid python");
        let Stmt::FunctionDef(func) = &parsed.syntax().body[0] else {
            panic!("expected a function");
        };

        let bindings = BindingCollector::collect_function(&func.parameters, &func.body);
        let defined: Vec<_> = bindings.defined.iter().map(String::as_str).collect();
        assert_eq!(
            defined,
            vec!["event", "flag", "args", "kwargs", "result", "nested"]
        );
        assert!(bindings.globals.contains("CACHE"));
        assert!(!bindings.contains("hidden"));
    }
}
