//! Shared configuration module
//!
//! The shared module is parsed once per run. Its top-level imports are
//! split off for hoisting into each artifact's import section; the rest of
//! its body is rendered per artifact, with colliding names renamed.

use std::{
    ops::Range,
    path::{Path, PathBuf},
};

use log::debug;
use ruff_python_ast::ModModule;
use ruff_python_parser::parse_module;
use ruff_text_size::Ranged;
use rustc_hash::FxHashSet;

use crate::{
    error::GenerationError,
    import_handling::{ImportParser, ImportStatement},
    markers::MarkerScanner,
    types::{FxIndexMap, FxIndexSet},
    util::{line_column, source_lines, splice},
    visitors::{BindingCollector, RenameCollector},
};

#[derive(Debug, Clone)]
pub struct SharedConfig {
    pub path: PathBuf,
    text: String,
    module: ModModule,
    /// Top-level imports to hoist, in file order
    imports: Vec<ImportStatement>,
    /// Byte ranges left out of the rendered body, sorted and disjoint
    removals: Vec<Range<usize>>,
    /// Names bound at top level by anything but an import
    definitions: FxIndexSet<String>,
    /// Names bound at top level by hoisted imports
    imported: FxIndexSet<String>,
}

impl SharedConfig {
    pub fn parse(
        path: &Path,
        text: String,
        parser: &ImportParser,
    ) -> Result<Self, GenerationError> {
        let module = parse_module(&text)
            .map_err(|err| {
                let (line, column) = line_column(&text, err.location.start().to_usize());
                GenerationError::SharedConfigParse {
                    line,
                    column,
                    message: err.error.to_string(),
                }
            })?
            .into_syntax();

        let syntax = parser.syntax();
        let scan = MarkerScanner::new(syntax.clone()).scan(&text);
        let dev_only: Vec<Range<usize>> = scan
            .blocks
            .iter()
            .filter(|block| syntax.is_dev_only(&block.name))
            .map(|block| block.start..block.end)
            .collect();

        let mut removals: Vec<Range<usize>> = source_lines(&text)
            .filter(|line| syntax.parse_line(line.text).is_some())
            .map(|line| line.range())
            .collect();
        removals.extend(dev_only.iter().cloned());

        let top_level = parser
            .top_level_imports(&text, &module.body)
            .map_err(|err| GenerationError::SharedConfigParse {
                line: err.line,
                column: 1,
                message: err.message,
            })?;
        let mut imports = Vec::new();
        for (statement, span) in top_level {
            if !dev_only.iter().any(|range| range.contains(&span.start)) {
                imports.push(statement);
            }
            removals.push(span);
        }

        let bindings = BindingCollector::collect_from(module.body.iter().filter(|stmt| {
            let start = stmt.start().to_usize();
            !dev_only.iter().any(|range| range.contains(&start))
        }));
        debug!(
            "shared configuration {}: {} definition(s), {} hoisted import(s)",
            path.display(),
            bindings.defined.len(),
            imports.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            text,
            module,
            imports,
            removals: merge_ranges(removals),
            definitions: bindings.defined,
            imported: bindings.imported,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn imports(&self) -> &[ImportStatement] {
        &self.imports
    }

    pub fn definitions(&self) -> &FxIndexSet<String> {
        &self.definitions
    }

    /// Whether a host may import `name` from the shared module
    pub fn provides(&self, name: &str) -> bool {
        self.definitions.contains(name) || self.imported.contains(name)
    }

    /// Public top-level definitions, exposed through namespace imports
    pub fn exports(&self) -> impl Iterator<Item = &str> {
        self.definitions
            .iter()
            .map(String::as_str)
            .filter(|name| !name.starts_with('_'))
    }

    /// Body without imports and marker lines, with `renames` applied
    pub fn render(&self, renames: &FxIndexMap<String, String>) -> String {
        let targets: FxHashSet<String> = renames.keys().cloned().collect();
        let mut edits: Vec<(Range<usize>, String)> = self
            .removals
            .iter()
            .map(|range| (range.clone(), String::new()))
            .collect();

        if !targets.is_empty() {
            for site in RenameCollector::collect(&self.module, &targets) {
                let range = site.range.start().to_usize()..site.range.end().to_usize();
                if self.removals.iter().any(|removed| removed.contains(&range.start)) {
                    continue;
                }
                if let Some(renamed) = renames.get(&site.name) {
                    edits.push((range, renamed.clone()));
                }
            }
        }
        edits.sort_by_key(|(range, _)| (range.start, range.end));

        let spliced = splice(&self.text, &edits);
        let body = spliced.trim_start_matches(['\n', '\r']).trim_end();
        if body.is_empty() {
            String::new()
        } else {
            format!("{body}\n")
        }
    }
}

/// Sort ranges and fuse the overlapping or touching ones
fn merge_ranges(mut ranges: Vec<Range<usize>>) -> Vec<Range<usize>> {
    ranges.sort_by_key(|range| range.start);
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        import_handling::ImportClassifier, markers::MarkerSyntax,
        stdlib_detection::StdlibRegistry, types::ModuleKind,
    };

    fn parser() -> ImportParser {
        ImportParser::new(
            ImportClassifier::new(StdlibRegistry::for_python_version(12)),
            MarkerSyntax::default(),
        )
    }

    fn parse_shared(text: &str) -> Result<SharedConfig, GenerationError> {
        SharedConfig::parse(Path::new("shared_configuration.py"), text.to_owned(), &parser())
    }

    const SHARED: &str = "\
\"\"\"Settings shared by every function.\"\"\"
import os
# IMPORT_BLOCK_START
import redis
# IMPORT_BLOCK_END

TIMEOUT = int(os.environ.get(\"TIMEOUT\", \"30\"))
_CACHE = {}

# DEV_ONLY_BLOCK_START
import pytest
DEBUG_HOOK = pytest
# DEV_ONLY_BLOCK_END

def helper(key):
    return _CACHE.get(key, TIMEOUT)
";

    #[test]
    fn test_parse_splits_imports_and_definitions() {
        let shared = parse_shared(SHARED).expect("shared module parses");

        let hoisted: Vec<_> = shared.imports().iter().map(|s| s.text.as_str()).collect();
        assert_eq!(hoisted, vec!["import os\n", "import redis\n"]);
        assert_eq!(shared.imports()[1].kind, ModuleKind::ThirdParty);

        let exports: Vec<_> = shared.exports().collect();
        assert_eq!(exports, vec!["TIMEOUT", "helper"]);
        assert!(!shared.provides("DEBUG_HOOK"));
        assert!(!shared.provides("pytest"));
        assert!(shared.provides("_CACHE"));
        assert!(shared.provides("os"));
        assert!(!shared.provides("missing"));
    }

    #[test]
    fn test_render_drops_imports_markers_and_dev_blocks() {
        let shared = parse_shared(SHARED).expect("shared module parses");

        assert_eq!(
            shared.render(&FxIndexMap::default()),
            "\
\"\"\"Settings shared by every function.\"\"\"

TIMEOUT = int(os.environ.get(\"TIMEOUT\", \"30\"))
_CACHE = {}


def helper(key):
    return _CACHE.get(key, TIMEOUT)
"
        );
    }

    #[test]
    fn test_render_applies_renames() {
        let shared = parse_shared(SHARED).expect("shared module parses");
        let mut renames = FxIndexMap::default();
        renames.insert("TIMEOUT".to_owned(), "_shared_TIMEOUT".to_owned());

        let body = shared.render(&renames);
        assert!(body.contains("_shared_TIMEOUT = int("));
        assert!(body.contains("return _CACHE.get(key, _shared_TIMEOUT)"));
        assert!(!body.contains(" TIMEOUT"));
    }

    #[test]
    fn test_parse_error_location() {
        let err = parse_shared("x = 1\ndef broken(:\n").expect_err("invalid python");
        assert!(matches!(err, GenerationError::SharedConfigParse { line: 2, .. }));
    }

    #[test]
    fn test_merge_ranges() {
        assert_eq!(merge_ranges(vec![5..8, 0..2, 1..3, 8..9]), vec![0..3, 5..9]);
    }
}
