//! Transfer block synchronization
//!
//! Every transfer block name forms a star: one primary copy and any number
//! of target copies. The primaries of every name are validated before any
//! target is touched, so an ambiguous corpus is never partially synchronized.

pub mod rules;

use std::ops::Range;

use log::{debug, info, warn};
use serde::Serialize;

pub use rules::{CompiledRule, SyncRule};

use crate::{
    error::BundleError,
    issues::{Issue, IssueKind},
    module_registry::{Corpus, ModuleAnalyzer, SourceModule},
    types::{FxIndexMap, FxIndexSet},
};

/// One rule as applied to one copied block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedRule {
    pub pattern: String,
    pub replacement: String,
    pub regex: bool,
    pub matches: usize,
}

/// Record of one target block rewrite
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncEdit {
    pub block: String,
    pub primary: String,
    pub target: String,
    /// Content byte range in the target before the rewrite
    pub byte_range: Range<usize>,
    pub rules: Vec<AppliedRule>,
    pub changed: bool,
}

/// New text for one target module
#[derive(Debug, Clone)]
pub struct SyncUpdate {
    pub module: String,
    pub text: String,
    pub edit: SyncEdit,
}

/// Result of synchronizing one block name
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub updates: Vec<SyncUpdate>,
    /// Drift warnings keyed by module name
    pub issues: Vec<(String, Issue)>,
}

/// Result of synchronizing every transfer block in a corpus
#[derive(Debug, Clone, Default)]
pub struct SyncRun {
    pub corpus: Corpus,
    pub edits: Vec<SyncEdit>,
    pub issues: Vec<(String, Issue)>,
    /// Modules whose text changed
    pub changed: FxIndexSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TransferBlockSynchronizer {
    /// Substitution rules per target module
    rules: FxIndexMap<String, Vec<CompiledRule>>,
    /// Modules expected to carry a copy of each block
    participants: FxIndexMap<String, Vec<String>>,
}

impl TransferBlockSynchronizer {
    pub fn new(
        rules: FxIndexMap<String, Vec<CompiledRule>>,
        participants: FxIndexMap<String, Vec<String>>,
    ) -> Self {
        Self {
            rules,
            participants,
        }
    }

    /// Every block name that takes part in synchronization, sorted
    pub fn block_names(&self, corpus: &Corpus) -> Vec<String> {
        let mut names: FxIndexSet<String> = corpus.transfer_block_names().into_iter().collect();
        names.extend(self.participants.keys().cloned());
        names.sort();
        names.into_iter().collect()
    }

    /// The single module owning the primary copy of `block`
    pub fn primary_for<'a>(
        &self,
        corpus: &'a Corpus,
        block: &str,
    ) -> Result<&'a SourceModule, BundleError> {
        let primaries: Vec<&SourceModule> = corpus
            .iter()
            .filter(|module| module.block(block).is_some_and(|found| found.is_primary()))
            .collect();
        match primaries.as_slice() {
            [primary] => Ok(primary),
            [] => Err(BundleError::MissingPrimary {
                block: block.to_owned(),
            }),
            _ => Err(BundleError::AmbiguousPrimary {
                block: block.to_owned(),
                modules: primaries.iter().map(|module| module.name.clone()).collect(),
            }),
        }
    }

    /// Fail unless every block name has exactly one primary
    pub fn check_primaries(&self, corpus: &Corpus, names: &[String]) -> Result<(), BundleError> {
        for name in names {
            let primary = self.primary_for(corpus, name)?;
            debug!("transfer block {name}: primary is {}", primary.name);
        }
        Ok(())
    }

    /// Compute the updated content of every target copy of `block`
    pub fn synchronize(&self, corpus: &Corpus, block: &str) -> Result<SyncOutcome, BundleError> {
        let primary = self.primary_for(corpus, block)?;
        let Some(source) = primary.extract_block(block) else {
            return Err(BundleError::MissingPrimary {
                block: block.to_owned(),
            });
        };

        let mut outcome = SyncOutcome::default();
        self.report_missing_participants(corpus, block, &mut outcome);

        for target in corpus.iter().filter(|module| module.name != primary.name) {
            let Some(target_block) = target.block(block) else {
                continue;
            };
            let (content, rules) = self.apply_rules(&target.name, block, source, &mut outcome);
            let changed = content != target_block.content;
            let Some(text) = target.replace_block_content(block, &content) else {
                continue;
            };
            outcome.updates.push(SyncUpdate {
                module: target.name.clone(),
                text,
                edit: SyncEdit {
                    block: block.to_owned(),
                    primary: primary.name.clone(),
                    target: target.name.clone(),
                    byte_range: target_block.content_range.clone(),
                    rules,
                    changed,
                },
            });
        }
        Ok(outcome)
    }

    fn apply_rules(
        &self,
        target: &str,
        block: &str,
        source: &str,
        outcome: &mut SyncOutcome,
    ) -> (String, Vec<AppliedRule>) {
        let mut content = source.to_owned();
        let mut applied = Vec::new();
        let rules = self.rules.get(target).map(Vec::as_slice).unwrap_or_default();

        for compiled in rules.iter().filter(|rule| rule.rule().applies_to(block)) {
            let rule = compiled.rule();
            let (replaced, matches) = compiled.apply(&content);
            let replaced = replaced.into_owned();
            // Unscoped rules are checked across every block in `report_unmatched_rules`
            if matches == 0 && !rule.blocks.is_empty() {
                outcome.issues.push((
                    target.to_owned(),
                    Issue::warning(
                        IssueKind::SyncMismatch,
                        format!(
                            "sync rule `{}` -> `{}` matched nothing in the copied block",
                            rule.pattern, rule.replacement
                        ),
                    )
                    .in_block(block),
                ));
            }
            applied.push(AppliedRule {
                pattern: rule.pattern.clone(),
                replacement: rule.replacement.clone(),
                regex: rule.regex,
                matches,
            });
            content = replaced;
        }
        (content, applied)
    }

    /// Modules that must carry `block`: the configured participants plus every
    /// target with a rule scoped to it
    fn expected_participants(&self, block: &str) -> FxIndexSet<&str> {
        let mut expected: FxIndexSet<&str> = self
            .participants
            .get(block)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        expected.extend(
            self.rules
                .iter()
                .filter(|(_, rules)| {
                    rules
                        .iter()
                        .any(|compiled| compiled.rule().blocks.iter().any(|name| name == block))
                })
                .map(|(target, _)| target.as_str()),
        );
        expected
    }

    fn report_missing_participants(&self, corpus: &Corpus, block: &str, outcome: &mut SyncOutcome) {
        for name in self.expected_participants(block) {
            match corpus.get(name) {
                Some(module) if module.block(block).is_none() => {
                    outcome.issues.push((
                        name.to_owned(),
                        Issue::warning(
                            IssueKind::SyncMismatch,
                            format!("expected transfer block '{block}' is missing"),
                        )
                        .in_block(block),
                    ));
                }
                Some(_) => {}
                None => warn!("transfer block {block} lists unknown module '{name}'"),
            }
        }
    }

    /// Warn about unscoped rules that matched nothing in any block copied into their target
    fn report_unmatched_rules(&self, run: &mut SyncRun) {
        for (target, rules) in &self.rules {
            for rule in rules.iter().map(CompiledRule::rule) {
                if !rule.blocks.is_empty() {
                    continue;
                }
                let mut applied = run
                    .edits
                    .iter()
                    .filter(|edit| &edit.target == target)
                    .flat_map(|edit| &edit.rules)
                    .filter(|applied| applied.is_from(rule))
                    .peekable();
                if applied.peek().is_none() || applied.any(|entry| entry.matches > 0) {
                    continue;
                }
                run.issues.push((
                    target.clone(),
                    Issue::warning(
                        IssueKind::SyncMismatch,
                        format!(
                            "sync rule `{}` -> `{}` matched nothing in any copied block",
                            rule.pattern, rule.replacement
                        ),
                    ),
                ));
            }
        }
    }

    /// Synchronize every transfer block, superseding changed modules
    ///
    /// Block names are processed in sorted order; each name sees the corpus as
    /// left by the previous one, so nested transfer blocks compose.
    pub fn synchronize_all(
        &self,
        corpus: Corpus,
        analyzer: &ModuleAnalyzer,
    ) -> Result<SyncRun, BundleError> {
        let names = self.block_names(&corpus);
        self.check_primaries(&corpus, &names)?;

        let mut run = SyncRun {
            corpus,
            ..SyncRun::default()
        };
        for name in &names {
            let outcome = self.synchronize(&run.corpus, name)?;
            for update in outcome.updates {
                log_edit(&update.edit);
                if update.edit.changed {
                    if let Some(module) = run.corpus.get(&update.module) {
                        let superseded = analyzer.reanalyze(module, update.text);
                        run.corpus.replace(superseded);
                    }
                    run.changed.insert(update.module);
                }
                run.edits.push(update.edit);
            }
            run.issues.extend(outcome.issues);
        }
        self.report_unmatched_rules(&mut run);
        info!(
            "synchronized {} transfer block(s), {} module(s) changed",
            names.len(),
            run.changed.len()
        );
        Ok(run)
    }
}

impl AppliedRule {
    fn is_from(&self, rule: &SyncRule) -> bool {
        self.pattern == rule.pattern
            && self.replacement == rule.replacement
            && self.regex == rule.regex
    }
}

fn log_edit(edit: &SyncEdit) {
    debug!(
        "{} -> {} [{}]: bytes {}..{}{}",
        edit.primary,
        edit.target,
        edit.block,
        edit.byte_range.start,
        edit.byte_range.end,
        if edit.changed { "" } else { " (unchanged)" }
    );
    for rule in &edit.rules {
        debug!(
            "  rule `{}` -> `{}`{}: {} match(es)",
            rule.pattern,
            rule.replacement,
            if rule.regex { " (regex)" } else { "" },
            rule.matches
        );
    }
}
