//! Import merging for deployment artifacts
//!
//! An artifact's import section is rebuilt from the host's statements plus
//! the statements hoisted out of the shared configuration. Duplicates are
//! dropped by canonical form, then everything is regrouped by classification.

use rustc_hash::FxHashSet;

use crate::{
    import_handling::{ImportEntry, ImportGroup, ImportStatement},
    types::ModuleKind,
};

/// Merge host and hoisted statements into classified groups
///
/// Host statements win over hoisted ones with the same canonical form.
/// Development-only statements are dropped. Within a group, statements keep
/// their relative order except that `__future__` imports move to the front.
pub(super) fn merge_statements(
    host: impl IntoIterator<Item = ImportStatement>,
    hoisted: impl IntoIterator<Item = ImportStatement>,
) -> Vec<ImportGroup> {
    let mut seen = FxHashSet::default();
    let merged: Vec<ImportStatement> = host
        .into_iter()
        .chain(hoisted)
        .filter(|statement| !statement.dev_only)
        .filter(|statement| seen.insert(statement.canonical()))
        .collect();

    [
        ModuleKind::StandardLibrary,
        ModuleKind::ThirdParty,
        ModuleKind::Local,
    ]
    .into_iter()
    .filter_map(|kind| {
        let mut statements: Vec<ImportStatement> = merged
            .iter()
            .filter(|statement| statement.kind == kind)
            .cloned()
            .collect();
        statements.sort_by_key(|statement| !statement.is_future());
        (!statements.is_empty()).then_some(ImportGroup { kind, statements })
    })
    .collect()
}

/// Groups as source text, separated by one blank line
pub(super) fn render_groups(groups: &[ImportGroup]) -> String {
    groups
        .iter()
        .map(|group| {
            group
                .statements
                .iter()
                .map(|statement| statement.text.as_str())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The statement restricted to the entries `keep` accepts, re-rendered from
/// its canonical form when anything was removed
pub(super) fn retain_entries(
    statement: &ImportStatement,
    keep: impl Fn(&ImportEntry) -> bool,
) -> Option<ImportStatement> {
    let entries: Vec<ImportEntry> = statement
        .entries
        .iter()
        .filter(|entry| keep(entry))
        .cloned()
        .collect();
    if entries.is_empty() {
        return None;
    }
    if entries.len() == statement.entries.len() {
        return Some(statement.clone());
    }

    let mut narrowed = ImportStatement {
        entries,
        ..statement.clone()
    };
    narrowed.text = format!("{}\n", narrowed.canonical());
    Some(narrowed)
}

/// Top-level packages of every third-party entry, sorted
pub(super) fn third_party_packages(groups: &[ImportGroup]) -> Vec<String> {
    let mut packages: Vec<String> = groups
        .iter()
        .filter(|group| group.kind.is_third_party())
        .flat_map(ImportGroup::entries)
        .filter_map(|entry| entry.module.split('.').next())
        .map(ToOwned::to_owned)
        .collect();
    packages.sort();
    packages.dedup();
    packages
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        import_handling::{ImportClassifier, ImportParser},
        markers::MarkerSyntax,
        stdlib_detection::StdlibRegistry,
    };

    fn statements(section: &str) -> Vec<ImportStatement> {
        let parser = ImportParser::new(
            ImportClassifier::new(StdlibRegistry::for_python_version(12)),
            MarkerSyntax::default(),
        );
        let text = format!("# IMPORT_BLOCK_START\n{section}# IMPORT_BLOCK_END\n");
        parser
            .parse(&text)
            .expect("section parses")
            .into_iter()
            .flat_map(|group| group.statements)
            .collect()
    }

    #[test]
    fn test_regroups_and_deduplicates() {
        let host = statements("import requests\nimport os\nfrom . import util\nimport json\n");
        let hoisted = statements("import os\nfrom __future__ import annotations\nimport redis\n");

        let groups = merge_statements(host, hoisted);
        assert_eq!(
            render_groups(&groups),
            "\
from __future__ import annotations
import os
import json

import requests
import redis

from . import util
"
        );
        assert_eq!(third_party_packages(&groups), vec!["redis", "requests"]);
    }

    #[test]
    fn test_dev_only_statements_are_dropped() {
        let mut host = statements("import os\nimport pytest\n");
        host[1].dev_only = true;
        let groups = merge_statements(host, Vec::new());
        assert_eq!(render_groups(&groups), "import os\n");
    }

    #[test]
    fn test_retain_entries_rewrites_partial_statement() {
        let statement = statements("import os, shared_configuration  # both\n").remove(0);

        let narrowed = retain_entries(&statement, |entry| entry.module != "shared_configuration")
            .expect("os remains");
        assert_eq!(narrowed.text, "import os\n");

        let untouched = retain_entries(&statement, |_| true).expect("everything remains");
        assert_eq!(untouched.text, "import os, shared_configuration  # both\n");

        assert!(retain_entries(&statement, |_| false).is_none());
    }
}
