//! Post-generation validation
//!
//! Every artifact is re-scanned for marker structure and then handed to a
//! syntax oracle. An artifact with any error-severity issue is withheld.

use log::debug;
use ruff_python_parser::parse_module;
use ruff_text_size::Ranged;

use crate::{
    code_generator::DeploymentArtifact,
    issues::{Issue, IssueKind, ValidationResult},
    markers::{MarkerScanner, MarkerSyntax},
    util::line_column,
};

/// A syntax error reported by an oracle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxDiagnostic {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

/// Decides whether source text is syntactically valid Python
pub trait SyntaxOracle: Send + Sync {
    fn check(&self, source: &str) -> Result<(), SyntaxDiagnostic>;
}

/// Oracle backed by ruff's parser
#[derive(Debug, Clone, Copy, Default)]
pub struct RuffSyntaxOracle;

impl SyntaxOracle for RuffSyntaxOracle {
    fn check(&self, source: &str) -> Result<(), SyntaxDiagnostic> {
        parse_module(source).map(|_| ()).map_err(|err| {
            let (line, column) = line_column(source, err.location.start().to_usize());
            SyntaxDiagnostic {
                message: err.error.to_string(),
                line: Some(line),
                column: Some(column),
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct MarkerValidator<O = RuffSyntaxOracle> {
    scanner: MarkerScanner,
    oracle: O,
}

impl MarkerValidator {
    pub fn new(syntax: MarkerSyntax) -> Self {
        Self::with_oracle(syntax, RuffSyntaxOracle)
    }
}

impl<O: SyntaxOracle> MarkerValidator<O> {
    /// Artifacts are never checked for orphaned code: inlining and
    /// regrouping legitimately produce lines outside the source's blocks
    pub fn with_oracle(syntax: MarkerSyntax, oracle: O) -> Self {
        Self {
            scanner: MarkerScanner::new(syntax),
            oracle,
        }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn validate(&self, artifact: &DeploymentArtifact) -> ValidationResult {
        let mut result = ValidationResult::new(self.scanner.scan(&artifact.text).issues);
        if let Some(issue) = self.syntax_issue(&artifact.text) {
            result.extend([issue]);
        }
        debug!(
            "validated {}: {} error(s), {} warning(s)",
            artifact.function,
            result.errors().count(),
            result.warnings().count()
        );
        result
    }

    /// The oracle's verdict on arbitrary text, as an issue
    pub fn syntax_issue(&self, source: &str) -> Option<Issue> {
        let diagnostic = self.oracle.check(source).err()?;
        let mut issue = Issue::error(IssueKind::SyntaxError, diagnostic.message);
        issue.line = diagnostic.line;
        issue.column = diagnostic.column;
        Some(issue)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn artifact(text: &str) -> DeploymentArtifact {
        DeploymentArtifact {
            function: "fn_a".to_owned(),
            source_path: PathBuf::from("fn_a.py"),
            text: text.to_owned(),
            inlined_shared_config: None,
            third_party: Vec::new(),
            content_hash: String::new(),
            validation: ValidationResult::default(),
        }
    }

    struct RejectAll;

    impl SyntaxOracle for RejectAll {
        fn check(&self, _source: &str) -> Result<(), SyntaxDiagnostic> {
            Err(SyntaxDiagnostic {
                message: "rejected".to_owned(),
                line: None,
                column: None,
            })
        }
    }

    #[test]
    fn test_valid_artifact_passes() {
        let validator = MarkerValidator::new(MarkerSyntax::default());
        let result = validator.validate(&artifact(
            "# IMPORT_BLOCK_START\nimport os\n# IMPORT_BLOCK_END\n\nprint(os.sep)\n",
        ));
        assert!(result.passed());
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_syntax_error_has_location() {
        let validator = MarkerValidator::new(MarkerSyntax::default());
        let result = validator.validate(&artifact("x = 1\ndef broken(:\n    pass\n"));

        assert!(!result.passed());
        let issue = result.errors().next().expect("one error");
        assert_eq!(issue.kind, IssueKind::SyntaxError);
        assert_eq!(issue.line, Some(2));
        assert!(issue.column.is_some());
    }

    #[test]
    fn test_unbalanced_markers_fail_validation() {
        let validator = MarkerValidator::new(MarkerSyntax::default());
        let result = validator.validate(&artifact("# CACHE_BLOCK_START\nx = 1\n"));
        assert!(!result.passed());
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].kind, IssueKind::UnbalancedMarker);
    }

    #[test]
    fn test_custom_oracle() {
        let validator = MarkerValidator::with_oracle(MarkerSyntax::default(), RejectAll);
        let result = validator.validate(&artifact("x = 1\n"));
        assert_eq!(result.errors().count(), 1);
        assert_eq!(result.issues[0].message, "rejected");
        assert_eq!(result.issues[0].line, None);
    }
}
