//! Deployment artifact generation
//!
//! Turns one synchronized [`SourceModule`] into a self-contained file: the
//! import section is regrouped, the shared configuration is inlined in place
//! of its import, and development-only blocks are dropped. Everything else
//! is copied verbatim. Generation is pure; writing to disk happens elsewhere.

mod import_deduplicator;
mod shared_config;

use std::{
    ops::Range,
    path::{Path, PathBuf},
};

use log::{debug, trace};
use ruff_python_ast::ModModule;
use ruff_python_parser::parse_module;
use ruff_text_size::Ranged;
use serde::Serialize;

pub use shared_config::SharedConfig;

use crate::{
    error::GenerationError,
    import_handling::{ImportEntry, ImportForm, ImportGroup, ImportParser, ImportStatement},
    issues::ValidationResult,
    markers::MarkerBlock,
    module_registry::SourceModule,
    types::{FxIndexMap, FxIndexSet},
    util::{content_hash, line_column, splice},
    visitors::{BindingCollector, ImportLocator},
};

/// Default prefix given to shared names that collide with host names
pub const DEFAULT_RENAME_PREFIX: &str = "_shared_";

/// Generated output for one function
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentArtifact {
    pub function: String,
    pub source_path: PathBuf,
    pub text: String,
    /// Shared configuration body as inlined, when the module imports it
    pub inlined_shared_config: Option<String>,
    /// Top-level third-party packages the artifact imports
    pub third_party: Vec<String>,
    /// SHA-256 of `text`
    pub content_hash: String,
    pub validation: ValidationResult,
}

/// A name requested from the shared module by `from shared import name as binding`
#[derive(Debug, Clone, PartialEq, Eq)]
struct SharedRequest {
    name: String,
    binding: String,
}

/// How the host's import section refers to the shared module
#[derive(Debug, Default)]
struct InliningPlan {
    /// Host statements that survive, narrowed where they also named the shared module
    kept: Vec<ImportStatement>,
    requests: Vec<SharedRequest>,
    /// Names bound to the whole shared module
    namespaces: Vec<String>,
    /// At least one statement imported the shared module
    active: bool,
}

/// Inlined shared configuration for one host
#[derive(Debug)]
struct Inlined {
    body: String,
    bindings: String,
    hoisted: Vec<ImportStatement>,
}

#[derive(Debug, Clone)]
pub struct DeploymentFileGenerator {
    parser: ImportParser,
    shared_module: String,
    rename_prefix: String,
}

impl DeploymentFileGenerator {
    pub fn new(parser: ImportParser, shared_module: impl Into<String>) -> Self {
        Self {
            parser,
            shared_module: shared_module.into(),
            rename_prefix: DEFAULT_RENAME_PREFIX.to_owned(),
        }
    }

    #[must_use]
    pub fn with_rename_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.rename_prefix = prefix.into();
        self
    }

    pub fn shared_module(&self) -> &str {
        &self.shared_module
    }

    /// Parse shared configuration text for use with [`Self::generate_with`]
    pub fn parse_shared(&self, path: &Path, text: String) -> Result<SharedConfig, GenerationError> {
        SharedConfig::parse(path, text, &self.parser)
    }

    /// Generate the artifact for `module` with the given shared configuration text
    pub fn generate(
        &self,
        module: &SourceModule,
        shared_config_text: &str,
    ) -> Result<DeploymentArtifact, GenerationError> {
        let path = self.shared_path(module);
        let shared = self.parse_shared(&path, shared_config_text.to_owned())?;
        self.generate_with(module, Some(&shared))
    }

    /// Whether the module's import section imports the shared module
    pub fn imports_shared(&self, module: &SourceModule) -> bool {
        let Ok(groups) = &module.imports else {
            return false;
        };
        groups
            .iter()
            .flat_map(|group| &group.statements)
            .filter(|statement| !statement.dev_only)
            .any(|statement| self.statement_touches_shared(statement))
    }

    /// Generate the artifact for `module`; `shared` may be absent when the
    /// module does not import it
    pub fn generate_with(
        &self,
        module: &SourceModule,
        shared: Option<&SharedConfig>,
    ) -> Result<DeploymentArtifact, GenerationError> {
        let groups = module.imports.clone()?;
        let host_ast = parse_host(module)?;
        let import_block = module.block(&self.parser.syntax().import_block);
        self.check_stray_shared_imports(module, &host_ast, import_block)?;

        let statements: Vec<ImportStatement> = groups
            .into_iter()
            .flat_map(|group| group.statements)
            .filter(|statement| !statement.dev_only)
            .collect();
        let plan = self.plan_inlining(statements)?;

        let inlined = match (plan.active, shared) {
            (false, _) => None,
            (true, None) => {
                return Err(GenerationError::SharedConfigMissing {
                    path: self.shared_path(module),
                });
            }
            (true, Some(shared)) => Some(self.inline(&host_ast, shared, &plan)?),
        };

        let hoisted = inlined
            .as_ref()
            .map(|inlined| inlined.hoisted.clone())
            .unwrap_or_default();
        let groups = import_deduplicator::merge_statements(plan.kept, hoisted);
        let text = self.assemble(module, import_block, &groups, inlined.as_ref());
        debug!(
            "generated {}: {} bytes, shared configuration {}",
            module.name,
            text.len(),
            if inlined.is_some() { "inlined" } else { "not used" }
        );

        Ok(DeploymentArtifact {
            function: module.name.clone(),
            source_path: module.path.clone(),
            content_hash: content_hash([text.as_str()]),
            text,
            inlined_shared_config: inlined.map(|inlined| inlined.body),
            third_party: import_deduplicator::third_party_packages(&groups),
            validation: ValidationResult::default(),
        })
    }

    fn shared_path(&self, module: &SourceModule) -> PathBuf {
        module
            .path
            .with_file_name(format!("{}.py", self.shared_module))
    }

    /// Whether a dotted name (leading dots allowed) refers to the shared module
    fn names_shared(&self, candidate: &str) -> bool {
        let stripped = candidate.trim_start_matches('.');
        stripped == self.shared_module
            || stripped
                .strip_suffix(self.shared_module.as_str())
                .is_some_and(|parent| parent.ends_with('.'))
    }

    fn statement_touches_shared(&self, statement: &ImportStatement) -> bool {
        statement
            .entries
            .iter()
            .any(|entry| self.entry_touches_shared(statement, entry))
    }

    fn entry_touches_shared(&self, statement: &ImportStatement, entry: &ImportEntry) -> bool {
        match (&statement.form, &entry.name) {
            (ImportForm::From { .. }, Some(name)) => {
                self.names_shared(&entry.module) || name == &self.shared_module
            }
            _ => self.names_shared(&entry.module),
        }
    }

    /// Reject imports of the shared module that would survive into the artifact
    fn check_stray_shared_imports(
        &self,
        module: &SourceModule,
        host_ast: &ModModule,
        import_block: Option<&MarkerBlock>,
    ) -> Result<(), GenerationError> {
        let syntax = self.parser.syntax();
        for located in ImportLocator::locate(host_ast) {
            let offset = located.range.start().to_usize();
            if import_block.is_some_and(|block| block.contains_offset(offset)) {
                continue;
            }
            let in_dev_block = module
                .blocks
                .iter()
                .any(|block| syntax.is_dev_only(&block.name) && block.contains_offset(offset));
            if in_dev_block {
                continue;
            }
            if located
                .candidates
                .iter()
                .any(|candidate| self.names_shared(candidate))
            {
                return Err(GenerationError::SharedImportOutsideSection {
                    line: line_column(&module.text, offset).0,
                });
            }
        }
        Ok(())
    }

    fn plan_inlining(
        &self,
        statements: Vec<ImportStatement>,
    ) -> Result<InliningPlan, GenerationError> {
        let mut plan = InliningPlan::default();
        for statement in statements {
            if !self.statement_touches_shared(&statement) {
                plan.kept.push(statement);
                continue;
            }
            plan.active = true;
            trace!("shared configuration import: {}", statement.canonical());

            for entry in &statement.entries {
                if !self.entry_touches_shared(&statement, entry) {
                    continue;
                }
                self.plan_entry(&statement, entry, &mut plan)?;
            }
            let narrowed = import_deduplicator::retain_entries(&statement, |entry| {
                !self.entry_touches_shared(&statement, entry)
            });
            plan.kept.extend(narrowed);
        }
        Ok(plan)
    }

    fn plan_entry(
        &self,
        statement: &ImportStatement,
        entry: &ImportEntry,
        plan: &mut InliningPlan,
    ) -> Result<(), GenerationError> {
        match (&statement.form, &entry.name) {
            // `from shared import name [as binding]` or `from shared import *`
            (ImportForm::From { .. }, Some(name)) if self.names_shared(&entry.module) => {
                if !entry.is_star() {
                    plan.requests.push(SharedRequest {
                        name: name.clone(),
                        binding: entry.binding().to_owned(),
                    });
                }
            }
            // `from pkg import shared [as binding]`
            (ImportForm::From { .. }, Some(_)) => {
                plan.namespaces.push(entry.binding().to_owned());
            }
            // `import shared [as binding]`
            _ => {
                let dotted = entry.module.contains('.');
                match &entry.alias {
                    Some(alias) => plan.namespaces.push(alias.clone()),
                    None if !dotted => plan.namespaces.push(entry.module.clone()),
                    None => {
                        return Err(GenerationError::UnaliasedSharedImport {
                            module: entry.module.clone(),
                            line: *statement.lines.start(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn inline(
        &self,
        host_ast: &ModModule,
        shared: &SharedConfig,
        plan: &InliningPlan,
    ) -> Result<Inlined, GenerationError> {
        let shared_bound: FxIndexSet<&str> = plan
            .requests
            .iter()
            .map(|request| request.binding.as_str())
            .chain(plan.namespaces.iter().map(String::as_str))
            .collect();
        let host = BindingCollector::collect(&host_ast.body);
        let host_names: FxIndexSet<&str> = host
            .defined
            .iter()
            .map(String::as_str)
            .chain(
                host.imported
                    .iter()
                    .map(String::as_str)
                    .filter(|name| !shared_bound.contains(name)),
            )
            .collect();

        if let Some(unknown) = plan
            .requests
            .iter()
            .find(|request| !shared.provides(&request.name))
        {
            return Err(GenerationError::UnknownSharedName {
                name: unknown.name.clone(),
            });
        }

        let mut collisions: Vec<String> = plan
            .requests
            .iter()
            .filter(|request| host.defined.contains(&request.binding))
            .map(|request| request.binding.clone())
            .collect();
        if !collisions.is_empty() {
            collisions.sort();
            collisions.dedup();
            return Err(GenerationError::InliningCollision { names: collisions });
        }

        let renames = self.plan_renames(shared, &host_names, plan)?;
        let body = shared.render(&renames);
        let bindings = render_bindings(shared, &renames, plan);

        let mut hoisted = shared.imports().to_vec();
        if !plan.namespaces.is_empty() {
            hoisted.push(self.types_import());
        }
        Ok(Inlined {
            body,
            bindings,
            hoisted,
        })
    }

    /// Shared definitions that must be renamed so host names keep their meaning
    fn plan_renames(
        &self,
        shared: &SharedConfig,
        host_names: &FxIndexSet<&str>,
        plan: &InliningPlan,
    ) -> Result<FxIndexMap<String, String>, GenerationError> {
        // Names the binding statements assign after the body runs
        let rebound: FxIndexSet<&str> = plan
            .requests
            .iter()
            .filter(|request| request.binding != request.name)
            .map(|request| request.binding.as_str())
            .chain(plan.namespaces.iter().map(String::as_str))
            .collect();

        let mut renames = FxIndexMap::default();
        let mut collisions = Vec::new();
        for name in shared.definitions() {
            if !host_names.contains(name.as_str()) && !rebound.contains(name.as_str()) {
                continue;
            }
            let renamed = format!("{}{name}", self.rename_prefix);
            if host_names.contains(renamed.as_str()) || shared.definitions().contains(&renamed) {
                collisions.push(renamed);
                continue;
            }
            debug!("renaming shared definition {name} to {renamed}");
            renames.insert(name.clone(), renamed);
        }
        if collisions.is_empty() {
            Ok(renames)
        } else {
            Err(GenerationError::InliningCollision { names: collisions })
        }
    }

    fn types_import(&self) -> ImportStatement {
        let kind = self.parser.classifier().classify("types");
        ImportStatement {
            text: "import types\n".to_owned(),
            lines: 0..=0,
            primary_module: "types".to_owned(),
            kind,
            form: ImportForm::Simple,
            entries: vec![ImportEntry {
                module: "types".to_owned(),
                name: None,
                alias: None,
                kind,
            }],
            dev_only: false,
        }
    }

    fn assemble(
        &self,
        module: &SourceModule,
        import_block: Option<&MarkerBlock>,
        groups: &[ImportGroup],
        inlined: Option<&Inlined>,
    ) -> String {
        let syntax = self.parser.syntax();
        let mut edits: Vec<(Range<usize>, String)> = Vec::new();

        let mut dropped_until = 0;
        for block in &module.blocks {
            let inside_imports = import_block
                .is_some_and(|imports| imports.start <= block.start && block.end <= imports.end);
            if !syntax.is_dev_only(&block.name) || inside_imports || block.start < dropped_until {
                continue;
            }
            trace!("dropping development-only block {} from {}", block.name, module.name);
            edits.push((block.start..block.end, String::new()));
            dropped_until = block.end;
        }

        // An import section wrapped in a dropped block goes away with it
        let import_block = import_block.filter(|imports| {
            !edits
                .iter()
                .any(|(range, _)| range.start <= imports.start && imports.end <= range.end)
        });
        if let Some(block) = import_block {
            edits.push((
                block.content_range.clone(),
                import_deduplicator::render_groups(groups),
            ));
            if let Some(inlined) = inlined {
                let mut section = String::new();
                if !module.text[..block.end].ends_with('\n') {
                    section.push('\n');
                }
                section.push('\n');
                section.push_str(&syntax.start_line(&syntax.shared_block));
                section.push('\n');
                section.push_str(&inlined.body);
                if !inlined.bindings.is_empty() {
                    if !inlined.body.is_empty() {
                        section.push('\n');
                    }
                    section.push_str(&inlined.bindings);
                }
                section.push_str(&syntax.end_line(&syntax.shared_block));
                section.push('\n');
                edits.push((block.end..block.end, section));
            }
        }

        edits.sort_by_key(|(range, _)| (range.start, range.end));
        splice(&module.text, &edits)
    }
}

fn parse_host(module: &SourceModule) -> Result<ModModule, GenerationError> {
    parse_module(&module.text)
        .map(ruff_python_parser::Parsed::into_syntax)
        .map_err(|err| {
            let (line, column) = line_column(&module.text, err.location.start().to_usize());
            GenerationError::HostParse {
                line,
                column,
                message: err.error.to_string(),
            }
        })
}

/// Statements that bind the names the host imported from the shared module
fn render_bindings(
    shared: &SharedConfig,
    renames: &FxIndexMap<String, String>,
    plan: &InliningPlan,
) -> String {
    let resolve = |name: &str| -> String {
        renames
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_owned())
    };

    let mut bindings = String::new();
    for request in &plan.requests {
        let target = resolve(&request.name);
        if request.binding != target {
            bindings.push_str(&format!("{} = {target}\n", request.binding));
        }
    }
    for namespace in &plan.namespaces {
        let members: Vec<String> = shared
            .exports()
            .map(|name| format!("    {name}={},\n", resolve(name)))
            .collect();
        if members.is_empty() {
            bindings.push_str(&format!("{namespace} = types.SimpleNamespace()\n"));
        } else {
            bindings.push_str(&format!(
                "{namespace} = types.SimpleNamespace(\n{})\n",
                members.concat()
            ));
        }
    }
    bindings
}
