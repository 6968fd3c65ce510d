//! Scope-aware rename collection
//!
//! Given a set of module-level names, finds every source range that refers to
//! the module-level binding of one of them: top-level `def`/`class` names,
//! name expressions that are not shadowed by an enclosing function, lambda or
//! comprehension scope, and identifiers in `global` statements.

use ruff_python_ast::{
    Comprehension, Expr, ModModule, Parameters, Stmt,
    visitor::{Visitor, walk_expr, walk_stmt},
};
use ruff_text_size::{Ranged, TextRange};
use rustc_hash::FxHashSet;

use super::binding_collector::{BindingCollector, parameter_names};

/// One occurrence to rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameSite {
    pub range: TextRange,
    pub name: String,
}

#[derive(Debug)]
enum ScopeKind {
    Function,
    Class,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    locals: FxHashSet<String>,
}

#[derive(Debug)]
pub struct RenameCollector<'n> {
    targets: &'n FxHashSet<String>,
    scopes: Vec<Scope>,
    sites: Vec<RenameSite>,
}

impl<'n> RenameCollector<'n> {
    /// Occurrences of `targets` bound at module level, sorted by position
    pub fn collect(module: &ModModule, targets: &'n FxHashSet<String>) -> Vec<RenameSite> {
        let mut collector = Self {
            targets,
            scopes: Vec::new(),
            sites: Vec::new(),
        };
        collector.visit_body(&module.body);

        let mut sites = collector.sites;
        sites.sort_by_key(|site| site.range.start());
        sites.dedup();
        sites
    }

    fn record(&mut self, name: &str, range: TextRange) {
        if self.targets.contains(name) {
            self.sites.push(RenameSite {
                range,
                name: name.to_owned(),
            });
        }
    }

    /// Whether `name` resolves to the module-level binding from the current scope
    fn resolves_to_module(&self, name: &str) -> bool {
        // Class bodies are only visible to their own statements, not to
        // functions nested inside them
        for (depth, scope) in self.scopes.iter().enumerate().rev() {
            let innermost = depth + 1 == self.scopes.len();
            if matches!(scope.kind, ScopeKind::Class) && !innermost {
                continue;
            }
            if scope.locals.contains(name) {
                return false;
            }
        }
        true
    }

    fn in_scope(
        &mut self,
        kind: ScopeKind,
        locals: FxHashSet<String>,
        body: impl FnOnce(&mut Self),
    ) {
        self.scopes.push(Scope { kind, locals });
        body(self);
        self.scopes.pop();
    }

    fn comprehension_scope(
        &mut self,
        generators: &[Comprehension],
        visit: impl FnOnce(&mut Self),
    ) {
        let mut locals = FxHashSet::default();
        for generator in generators {
            collect_target_names(&generator.target, &mut locals);
        }
        self.in_scope(ScopeKind::Function, locals, visit);
    }
}

impl<'a> Visitor<'a> for RenameCollector<'_> {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::FunctionDef(func) => {
                if self.scopes.is_empty() {
                    self.record(func.name.as_str(), func.name.range());
                }
                // Decorators, defaults and annotations evaluate in the enclosing scope
                for decorator in &func.decorator_list {
                    self.visit_decorator(decorator);
                }
                self.visit_parameters(&func.parameters);
                if let Some(returns) = &func.returns {
                    self.visit_expr(returns);
                }
                let locals = BindingCollector::collect_function(&func.parameters, &func.body)
                    .names()
                    .map(ToOwned::to_owned)
                    .collect();
                self.in_scope(ScopeKind::Function, locals, |this| this.visit_body(&func.body));
            }
            Stmt::ClassDef(class) => {
                if self.scopes.is_empty() {
                    self.record(class.name.as_str(), class.name.range());
                }
                for decorator in &class.decorator_list {
                    self.visit_decorator(decorator);
                }
                if let Some(arguments) = &class.arguments {
                    self.visit_arguments(arguments);
                }
                let locals = BindingCollector::collect(&class.body)
                    .names()
                    .map(ToOwned::to_owned)
                    .collect();
                self.in_scope(ScopeKind::Class, locals, |this| this.visit_body(&class.body));
            }
            Stmt::Global(global_stmt) => {
                for name in &global_stmt.names {
                    self.record(name.as_str(), name.range());
                }
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Name(name) => {
                if self.resolves_to_module(name.id.as_str()) {
                    self.record(name.id.as_str(), name.range);
                }
            }
            Expr::Lambda(lambda) => {
                let Some(parameters) = &lambda.parameters else {
                    self.in_scope(ScopeKind::Function, FxHashSet::default(), |this| {
                        this.visit_expr(&lambda.body);
                    });
                    return;
                };
                self.visit_parameters(parameters);
                let locals = lambda_locals(parameters);
                self.in_scope(ScopeKind::Function, locals, |this| this.visit_expr(&lambda.body));
            }
            Expr::ListComp(comp) => {
                self.comprehension_scope(&comp.generators, |this| walk_expr(this, expr));
            }
            Expr::SetComp(comp) => {
                self.comprehension_scope(&comp.generators, |this| walk_expr(this, expr));
            }
            Expr::DictComp(comp) => {
                self.comprehension_scope(&comp.generators, |this| walk_expr(this, expr));
            }
            Expr::Generator(generator) => {
                self.comprehension_scope(&generator.generators, |this| walk_expr(this, expr));
            }
            _ => walk_expr(self, expr),
        }
    }
}

fn lambda_locals(parameters: &Parameters) -> FxHashSet<String> {
    parameter_names(parameters).map(ToOwned::to_owned).collect()
}

fn collect_target_names(target: &Expr, names: &mut FxHashSet<String>) {
    match target {
        Expr::Name(name) => {
            names.insert(name.id.to_string());
        }
        Expr::Tuple(tuple) => {
            for elt in &tuple.elts {
                collect_target_names(elt, names);
            }
        }
        Expr::List(list) => {
            for elt in &list.elts {
                collect_target_names(elt, names);
            }
        }
        Expr::Starred(starred) => collect_target_names(&starred.value, names),
        _ => {}
    }
}
