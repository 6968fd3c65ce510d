//! Run pipeline
//!
//! Load and analyze every module, stop on broken marker structure or an
//! ambiguous primary, synchronize transfer blocks, then generate and validate
//! one artifact per function. Nothing touches the disk before the single
//! writer phase at the end, so a fatal error leaves every file as it was.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::{
    code_generator::{DeploymentArtifact, DeploymentFileGenerator, SharedConfig},
    config::{Config, ConfigError},
    error::{BundleError, GenerationError},
    issues::{Issue, IssueKind},
    manifest::{Manifest, ManifestEntry},
    module_registry::{Corpus, ModuleAnalyzer, SourceModule, module_name},
    report::{FileReport, FileStatus, RunReport},
    sync::{SyncRun, TransferBlockSynchronizer},
    util::content_hash,
    validation::MarkerValidator,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Synchronize sources and write validated artifacts
    #[default]
    Build,
    /// Run everything, write nothing
    Check,
    /// Synchronize sources only
    Sync,
}

/// Python files found in the source directory
#[derive(Debug, Default)]
struct Discovery {
    functions: Vec<PathBuf>,
    excluded: Vec<PathBuf>,
    shared: Option<PathBuf>,
}

#[derive(Debug)]
enum Loaded {
    Module(SourceModule),
    Undecodable(PathBuf),
}

/// The shared configuration module as read for this run
#[derive(Debug)]
struct SharedSource {
    text: String,
    parsed: Result<SharedConfig, GenerationError>,
}

/// Inputs every function build reads
#[derive(Debug)]
struct BuildContext<'a> {
    shared: Option<&'a SharedSource>,
    manifest: &'a Manifest,
    deployment_dir: &'a Path,
    fingerprint: String,
}

#[derive(Debug)]
struct FunctionResult {
    report: FileReport,
    artifact: Option<(PathBuf, String)>,
    manifest_entry: Option<ManifestEntry>,
}

/// Everything the writer phase puts on disk
#[derive(Debug, Default)]
struct WritePlan {
    sources: Vec<(PathBuf, String)>,
    artifacts: Vec<(PathBuf, String)>,
    manifest: Option<Manifest>,
}

#[derive(Debug)]
pub struct Orchestrator {
    config: Config,
    analyzer: ModuleAnalyzer,
    synchronizer: TransferBlockSynchronizer,
    generator: DeploymentFileGenerator,
    validator: MarkerValidator,
}

impl Orchestrator {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        Ok(Self {
            analyzer: config.module_analyzer()?,
            synchronizer: config.synchronizer()?,
            generator: config.generator()?,
            validator: config.validator(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the pipeline; `Err` only for I/O failures
    pub fn run(&self, mode: RunMode) -> Result<RunReport> {
        let source_dir = self.config.source_dir()?;
        let discovery = self.discover(source_dir)?;

        let mut report = RunReport::default();
        report.files.extend(
            discovery
                .excluded
                .iter()
                .map(|path| path_entry(path, FileStatus::Excluded)),
        );

        let (modules, undecodable) = self.load_all(&discovery.functions)?;
        for path in undecodable {
            let mut entry = path_entry(&path, FileStatus::Failed);
            entry
                .issues
                .push(GenerationError::Encoding { path }.to_issue());
            report.files.push(entry);
        }
        let corpus = Corpus::from_modules(modules);
        info!(
            "loaded {} module(s) from {}",
            corpus.len(),
            source_dir.display()
        );

        if let Err(err) = self.check_corpus(&corpus) {
            return Ok(self.abort(report, &corpus, &err));
        }
        let run = match self.synchronizer.synchronize_all(corpus.clone(), &self.analyzer) {
            Ok(run) => run,
            Err(err) => return Ok(self.abort(report, &corpus, &err)),
        };
        report.sync_edits.clone_from(&run.edits);

        let mut plan = WritePlan::default();
        let source_issues = self.source_issues(&run, &mut plan);
        if mode == RunMode::Sync {
            report_sources(&run.corpus, source_issues, &mut report);
        } else {
            self.generate_all(
                &run.corpus,
                discovery.shared.as_deref(),
                source_issues,
                &mut report,
                &mut plan,
            )?;
        }
        self.report_unknown_functions(&mut report, source_dir);

        let written = if mode == RunMode::Check {
            0
        } else {
            self.write(&plan)?
        };
        report.finish(written);
        log_summary(&report);
        Ok(report)
    }

    fn discover(&self, source_dir: &Path) -> Result<Discovery> {
        let entries = fs::read_dir(source_dir).with_context(|| {
            format!("Failed to read source directory {}", source_dir.display())
        })?;

        let mut discovery = Discovery::default();
        for entry in entries {
            let path = entry
                .with_context(|| format!("Failed to list {}", source_dir.display()))?
                .path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "py") {
                continue;
            }
            let name = module_name(&path);
            if name == "__init__" {
                continue;
            }
            if name == self.config.shared_config_module {
                discovery.shared = Some(path);
            } else if self.config.exclude.contains(&name) {
                discovery.excluded.push(path);
            } else {
                discovery.functions.push(path);
            }
        }
        discovery.functions.sort();
        discovery.excluded.sort();
        debug!(
            "discovered {} function module(s), {} excluded",
            discovery.functions.len(),
            discovery.excluded.len()
        );
        Ok(discovery)
    }

    fn load_all(&self, paths: &[PathBuf]) -> Result<(Vec<SourceModule>, Vec<PathBuf>)> {
        let loaded = paths
            .par_iter()
            .map(|path| self.load(path))
            .collect::<Result<Vec<_>>>()?;

        let mut modules = Vec::with_capacity(loaded.len());
        let mut undecodable = Vec::new();
        for item in loaded {
            match item {
                Loaded::Module(module) => modules.push(module),
                Loaded::Undecodable(path) => undecodable.push(path),
            }
        }
        Ok((modules, undecodable))
    }

    fn load(&self, path: &Path) -> Result<Loaded> {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => Loaded::Module(self.analyzer.analyze(path, text)),
            Err(_) => {
                warn!("{} is not valid UTF-8", path.display());
                Loaded::Undecodable(path.to_path_buf())
            }
        })
    }

    /// Corpus-global conditions checked before anything is synchronized
    fn check_corpus(&self, corpus: &Corpus) -> Result<(), BundleError> {
        let broken: Vec<&SourceModule> = corpus
            .iter()
            .filter(|module| module.has_structural_errors())
            .collect();
        if !broken.is_empty() {
            return Err(BundleError::Structural {
                modules: broken.len(),
                issues: broken
                    .iter()
                    .flat_map(|module| &module.scan_issues)
                    .filter(|issue| issue.is_error())
                    .count(),
            });
        }
        let names = self.synchronizer.block_names(corpus);
        self.synchronizer.check_primaries(corpus, &names)
    }

    fn abort(&self, mut report: RunReport, corpus: &Corpus, err: &BundleError) -> RunReport {
        error!("{err}");
        report.files.extend(corpus.iter().map(|module| {
            let mut entry = module_entry(module, FileStatus::Failed);
            entry.issues.clone_from(&module.scan_issues);
            entry
        }));
        report.fatal = Some(err.to_string());
        report.finish(0);
        report
    }

    /// Issues attributed to each source module, and the synchronized sources
    /// worth writing back
    fn source_issues(&self, run: &SyncRun, plan: &mut WritePlan) -> FxHashMap<String, Vec<Issue>> {
        let mut issues: FxHashMap<String, Vec<Issue>> = run
            .corpus
            .iter()
            .map(|module| (module.name.clone(), module.scan_issues.clone()))
            .collect();
        for (name, issue) in &run.issues {
            issues.entry(name.clone()).or_default().push(issue.clone());
        }

        for name in &run.changed {
            let Some(module) = run.corpus.get(name) else {
                continue;
            };
            match self.validator.syntax_issue(&module.text) {
                Some(mut issue) => {
                    warn!(
                        "not writing back {}: synchronized text does not parse",
                        module.path.display()
                    );
                    issue.message =
                        format!("synchronized source does not parse: {}", issue.message);
                    issues.entry(name.clone()).or_default().push(issue);
                }
                None => plan.sources.push((module.path.clone(), module.text.clone())),
            }
        }
        issues
    }

    fn generate_all(
        &self,
        corpus: &Corpus,
        shared_path: Option<&Path>,
        mut source_issues: FxHashMap<String, Vec<Issue>>,
        report: &mut RunReport,
        plan: &mut WritePlan,
    ) -> Result<()> {
        let deployment_dir = self.config.deployment_dir()?;
        let shared = shared_path.map(|path| self.load_shared(path)).transpose()?;
        let mut manifest = Manifest::load(deployment_dir);
        let context = BuildContext {
            shared: shared.as_ref(),
            manifest: &manifest,
            deployment_dir,
            fingerprint: self.config.generation_fingerprint(),
        };

        let mut jobs = Vec::new();
        for module in corpus.iter() {
            if self.is_requested(&module.name) {
                let issues = source_issues.remove(&module.name).unwrap_or_default();
                jobs.push((module, issues));
            } else {
                report
                    .files
                    .push(module_entry(module, FileStatus::Excluded));
            }
        }

        let results: Vec<FunctionResult> = jobs
            .into_par_iter()
            .map(|(module, issues)| self.build_function(module, issues, &context))
            .collect();

        for result in results {
            let function = result.report.function.clone();
            match result.manifest_entry {
                Some(entry) => manifest.insert(function, entry),
                None => {
                    manifest.remove(&function);
                }
            }
            plan.artifacts.extend(result.artifact);
            report.files.push(result.report);
        }
        plan.manifest = Some(manifest);
        Ok(())
    }

    fn load_shared(&self, path: &Path) -> Result<SharedSource> {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => SharedSource {
                parsed: self.generator.parse_shared(path, text.clone()),
                text,
            },
            Err(_) => SharedSource {
                text: String::new(),
                parsed: Err(GenerationError::Encoding {
                    path: path.to_path_buf(),
                }),
            },
        })
    }

    fn build_function(
        &self,
        module: &SourceModule,
        mut issues: Vec<Issue>,
        context: &BuildContext<'_>,
    ) -> FunctionResult {
        let file_name = module
            .path
            .file_name()
            .map_or_else(|| PathBuf::from(format!("{}.py", module.name)), PathBuf::from);
        let output_path = context.deployment_dir.join(file_name);
        let mut report = module_entry(module, FileStatus::Failed);
        report.output_path = Some(output_path.clone());

        let shared_text = context.shared.map_or("", |shared| shared.text.as_str());
        let input_hash = content_hash([
            module.name.as_str(),
            module.text.as_str(),
            shared_text,
            context.fingerprint.as_str(),
        ]);
        let clean = !issues.iter().any(Issue::is_error);

        if clean
            && !self.config.force_rebuild
            && context
                .manifest
                .is_up_to_date(&module.name, &input_hash, &output_path)
        {
            debug!("{} is up to date", module.name);
            report.status = FileStatus::UpToDate;
            report.issues = issues;
            return FunctionResult {
                report,
                artifact: None,
                manifest_entry: context.manifest.get(&module.name).cloned(),
            };
        }

        let artifact = match self.generate(module, context.shared) {
            Ok(mut artifact) => {
                artifact.validation = self.validator.validate(&artifact);
                issues.extend(artifact.validation.issues.iter().cloned());
                artifact
            }
            Err(err) => {
                debug!("{}: {err}", module.name);
                issues.push(err.to_issue());
                report.issues = issues;
                return FunctionResult {
                    report,
                    artifact: None,
                    manifest_entry: None,
                };
            }
        };

        report.third_party.clone_from(&artifact.third_party);
        let passed = !issues.iter().any(Issue::is_error);
        report.issues = issues;
        if !passed {
            return FunctionResult {
                report,
                artifact: None,
                manifest_entry: None,
            };
        }
        report.status = FileStatus::Passed;
        FunctionResult {
            report,
            manifest_entry: Some(ManifestEntry {
                input_hash,
                output_hash: artifact.content_hash.clone(),
            }),
            artifact: Some((output_path, artifact.text)),
        }
    }

    fn generate(
        &self,
        module: &SourceModule,
        shared: Option<&SharedSource>,
    ) -> Result<DeploymentArtifact, GenerationError> {
        let shared = match shared.map(|source| &source.parsed) {
            Some(Err(err)) if self.generator.imports_shared(module) => return Err(err.clone()),
            Some(parsed) => parsed.as_ref().ok(),
            None => None,
        };
        self.generator.generate_with(module, shared)
    }

    fn is_requested(&self, function: &str) -> bool {
        self.config.functions.is_empty()
            || self.config.functions.iter().any(|name| name == function)
    }

    fn report_unknown_functions(&self, report: &mut RunReport, source_dir: &Path) {
        for name in &self.config.functions {
            if report.file(name).is_some() {
                continue;
            }
            let mut entry = FileReport::new(name.as_str(), FileStatus::Failed);
            entry.issues.push(Issue::error(
                IssueKind::Generation,
                format!("no function module named '{name}' in {}", source_dir.display()),
            ));
            report.files.push(entry);
        }
    }

    /// Single writer: synchronized sources, then artifacts, then the manifest
    fn write(&self, plan: &WritePlan) -> Result<usize> {
        for (path, text) in &plan.sources {
            fs::write(path, text).with_context(|| {
                format!("Failed to write synchronized source {}", path.display())
            })?;
            info!("synchronized {}", path.display());
        }

        if !plan.artifacts.is_empty() || plan.manifest.is_some() {
            let deployment_dir = self.config.deployment_dir()?;
            fs::create_dir_all(deployment_dir).with_context(|| {
                format!("Failed to create deployment directory {}", deployment_dir.display())
            })?;
            for (path, text) in &plan.artifacts {
                fs::write(path, text)
                    .with_context(|| format!("Failed to write artifact {}", path.display()))?;
                info!("wrote {}", path.display());
            }
            if let Some(manifest) = &plan.manifest {
                manifest.save(deployment_dir)?;
            }
        }
        Ok(plan.sources.len() + plan.artifacts.len())
    }
}

fn report_sources(
    corpus: &Corpus,
    mut source_issues: FxHashMap<String, Vec<Issue>>,
    report: &mut RunReport,
) {
    for module in corpus.iter() {
        let mut issues = source_issues.remove(&module.name).unwrap_or_default();
        if let Err(err) = &module.imports {
            issues.push(GenerationError::ImportParse(err.clone()).to_issue());
        }
        let status = if issues.iter().any(Issue::is_error) {
            FileStatus::Failed
        } else {
            FileStatus::Passed
        };
        let mut entry = module_entry(module, status);
        entry.issues = issues;
        report.files.push(entry);
    }
}

fn module_entry(module: &SourceModule, status: FileStatus) -> FileReport {
    let mut entry = FileReport::new(module.name.as_str(), status);
    entry.source_path = Some(module.path.clone());
    entry
}

fn path_entry(path: &Path, status: FileStatus) -> FileReport {
    let mut entry = FileReport::new(module_name(path), status);
    entry.source_path = Some(path.to_path_buf());
    entry
}

fn log_summary(report: &RunReport) {
    let summary = &report.summary;
    let message = format!(
        "{} passed, {} failed, {} up-to-date, {} excluded; {} file(s) written",
        summary.passed, summary.failed, summary.up_to_date, summary.excluded, summary.written
    );
    if report.success {
        info!("{message}");
    } else {
        warn!("{message}");
    }
}
