//! Source modules and the corpus they form
//!
//! A [`SourceModule`] is an immutable snapshot of one file: its text, the
//! marker blocks found in it, and its parsed import section. Editing a
//! module produces a new snapshot through [`ModuleAnalyzer::reanalyze`].

use std::path::{Path, PathBuf};

use log::debug;

use crate::{
    import_handling::{ImportGroup, ImportParseError, ImportParser},
    issues::{Issue, IssueKind},
    markers::{MarkerBlock, MarkerScanner},
    types::{FxIndexMap, FxIndexSet},
    util::splice,
};

#[derive(Debug, Clone)]
pub struct SourceModule {
    pub path: PathBuf,
    /// Module name (file stem), also the function name
    pub name: String,
    pub text: String,
    /// Balanced blocks ordered by start offset
    pub blocks: Vec<MarkerBlock>,
    /// Structural issues found while scanning markers
    pub scan_issues: Vec<Issue>,
    pub imports: Result<Vec<ImportGroup>, ImportParseError>,
}

impl SourceModule {
    pub fn block(&self, name: &str) -> Option<&MarkerBlock> {
        self.blocks.iter().find(|block| block.name == name)
    }

    pub fn transfer_blocks(&self) -> impl Iterator<Item = &MarkerBlock> {
        self.blocks.iter().filter(|block| block.is_transfer_block())
    }

    /// Unbalanced or duplicate markers; escalated orphan reports do not count
    pub fn has_structural_errors(&self) -> bool {
        self.scan_issues.iter().any(|issue| {
            issue.is_error()
                && matches!(
                    issue.kind,
                    IssueKind::UnbalancedMarker | IssueKind::DuplicateMarkerName
                )
        })
    }

    /// Raw content of a named block
    pub fn extract_block(&self, name: &str) -> Option<&str> {
        self.block(name).map(|block| block.content.as_str())
    }

    /// File text with one block's raw content replaced; everything outside
    /// the block's content range is kept byte-for-byte
    pub fn replace_block_content(&self, name: &str, content: &str) -> Option<String> {
        let block = self.block(name)?;
        Some(splice(
            &self.text,
            &[(block.content_range.clone(), content.to_owned())],
        ))
    }
}

/// Module name for a path: its file stem
pub fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Scans and parses source text into [`SourceModule`]s
#[derive(Debug, Clone)]
pub struct ModuleAnalyzer {
    scanner: MarkerScanner,
    parser: ImportParser,
}

impl ModuleAnalyzer {
    pub fn new(scanner: MarkerScanner, parser: ImportParser) -> Self {
        Self { scanner, parser }
    }

    pub fn scanner(&self) -> &MarkerScanner {
        &self.scanner
    }

    pub fn parser(&self) -> &ImportParser {
        &self.parser
    }

    pub fn analyze(&self, path: &Path, text: String) -> SourceModule {
        let scan = self.scanner.scan(&text);
        let imports = self.parser.parse_with_blocks(&text, &scan.blocks);
        debug!(
            "analyzed {}: {} block(s), {} issue(s)",
            path.display(),
            scan.blocks.len(),
            scan.issues.len()
        );
        SourceModule {
            path: path.to_path_buf(),
            name: module_name(path),
            text,
            blocks: scan.blocks,
            scan_issues: scan.issues,
            imports,
        }
    }

    /// New snapshot of `module` with replacement text
    pub fn reanalyze(&self, module: &SourceModule, text: String) -> SourceModule {
        self.analyze(&module.path, text)
    }
}

/// All source modules of one run, ordered by module name
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    modules: FxIndexMap<String, SourceModule>,
}

impl Corpus {
    pub fn from_modules(modules: impl IntoIterator<Item = SourceModule>) -> Self {
        let mut modules: FxIndexMap<_, _> = modules
            .into_iter()
            .map(|module| (module.name.clone(), module))
            .collect();
        modules.sort_keys();
        Self { modules }
    }

    pub fn get(&self, name: &str) -> Option<&SourceModule> {
        self.modules.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceModule> {
        self.modules.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Supersede a module snapshot with a newer one of the same name
    pub fn replace(&mut self, module: SourceModule) {
        if let Some(slot) = self.modules.get_mut(&module.name) {
            *slot = module;
        }
    }

    /// Names of every transfer block in the corpus, sorted
    pub fn transfer_block_names(&self) -> Vec<String> {
        let mut names: FxIndexSet<String> = self
            .iter()
            .flat_map(SourceModule::transfer_blocks)
            .map(|block| block.name.clone())
            .collect();
        names.sort();
        names.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        import_handling::ImportClassifier, markers::MarkerSyntax,
        stdlib_detection::StdlibRegistry,
    };

    fn analyzer() -> ModuleAnalyzer {
        let syntax = MarkerSyntax::default();
        ModuleAnalyzer::new(
            MarkerScanner::new(syntax.clone()),
            ImportParser::new(
                ImportClassifier::new(StdlibRegistry::for_python_version(12)),
                syntax,
            ),
        )
    }

    const SOURCE: &str = "\
# IMPORT_BLOCK_START
import os
# IMPORT_BLOCK_END

# CACHE_LOGIC_BLOCK_START transfer
PREFIX = \"b_\"
TTL = 60
# CACHE_LOGIC_BLOCK_END

def handler(event, context):
    return PREFIX
";

    #[test]
    fn test_extract_then_reinsert_is_identity() {
        let module = analyzer().analyze(Path::new("fn_b.py"), SOURCE.to_owned());

        for block in &module.blocks {
            let content = module.extract_block(&block.name).expect("block exists");
            let rebuilt = module
                .replace_block_content(&block.name, content)
                .expect("block exists");
            assert_eq!(rebuilt, SOURCE);
        }
    }

    #[test]
    fn test_replace_block_content_only_touches_block() {
        let module = analyzer().analyze(Path::new("fn_b.py"), SOURCE.to_owned());
        let rebuilt = module
            .replace_block_content("CACHE_LOGIC", "PREFIX = \"z_\"\n")
            .expect("block exists");

        let block = module.block("CACHE_LOGIC").expect("block exists");
        assert_eq!(&rebuilt[..block.content_range.start], &SOURCE[..block.content_range.start]);
        assert!(rebuilt.ends_with(&SOURCE[block.content_range.end..]));
        assert!(rebuilt.contains("PREFIX = \"z_\"\n# CACHE_LOGIC_BLOCK_END"));
        assert!(!rebuilt.contains("TTL"));
    }

    #[test]
    fn test_module_metadata() {
        let module = analyzer().analyze(Path::new("src/fn_b.py"), SOURCE.to_owned());
        assert_eq!(module.name, "fn_b");
        assert!(!module.has_structural_errors());
        assert_eq!(module.transfer_blocks().count(), 1);
        assert_eq!(module.imports.as_ref().map(Vec::len), Ok(1));
        assert!(module.replace_block_content("MISSING", "").is_none());
    }

    #[test]
    fn test_corpus_is_sorted_and_replaceable() {
        let analyzer = analyzer();
        let mut corpus = Corpus::from_modules([
            analyzer.analyze(Path::new("zeta.py"), SOURCE.to_owned()),
            analyzer.analyze(Path::new("alpha.py"), String::new()),
        ]);
        let names: Vec<_> = corpus.names().collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(corpus.transfer_block_names(), vec!["CACHE_LOGIC".to_owned()]);

        let alpha = corpus.get("alpha").expect("alpha");
        let updated = analyzer.reanalyze(alpha, "x = 1\n".to_owned());
        corpus.replace(updated);
        assert_eq!(corpus.get("alpha").map(|module| module.text.as_str()), Some("x = 1\n"));
    }
}
