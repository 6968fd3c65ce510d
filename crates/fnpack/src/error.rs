//! Error types
//!
//! [`BundleError`] covers corpus-global conditions that abort a run before
//! anything is written. [`GenerationError`] is local to one function and only
//! withholds that function's artifact.

use std::path::PathBuf;

use crate::{
    import_handling::ImportParseError,
    issues::{Issue, IssueKind},
};

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error(
        "marker structure is broken in {modules} module(s) ({issues} error(s)); nothing was written"
    )]
    Structural { modules: usize, issues: usize },

    #[error("transfer block '{block}' has no primary copy; mark exactly one start marker `primary`")]
    MissingPrimary { block: String },

    #[error("transfer block '{block}' has {} primary copies ({}); exactly one is allowed", .modules.len(), .modules.join(", "))]
    AmbiguousPrimary { block: String, modules: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("module does not parse: {message}")]
    HostParse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("shared configuration does not parse: {message}")]
    SharedConfigParse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("module imports the shared configuration but {} was not found", .path.display())]
    SharedConfigMissing { path: PathBuf },

    #[error("inlining collision: {} defined by both the module and the shared configuration", .names.join(", "))]
    InliningCollision { names: Vec<String> },

    #[error("'{name}' is imported from the shared configuration but not defined there")]
    UnknownSharedName { name: String },

    #[error("shared configuration is imported outside the import section")]
    SharedImportOutsideSection { line: usize },

    #[error("`import {module}` binds the parent package; write `import {module} as <name>`")]
    UnaliasedSharedImport { module: String, line: usize },

    #[error("import section does not parse: {0}")]
    ImportParse(#[from] ImportParseError),

    #[error("{} is not valid UTF-8", .path.display())]
    Encoding { path: PathBuf },
}

impl GenerationError {
    /// Report entry for this failure
    pub fn to_issue(&self) -> Issue {
        let issue = Issue::error(IssueKind::Generation, self.to_string());
        match self {
            Self::HostParse { line, column, .. } | Self::SharedConfigParse { line, column, .. } => {
                issue.at(*line, *column)
            }
            Self::SharedImportOutsideSection { line }
            | Self::UnaliasedSharedImport { line, .. } => issue.at_line(*line),
            Self::ImportParse(err) => {
                Issue::error(IssueKind::ImportParse, err.message.clone()).at_line(err.line)
            }
            _ => issue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_primary_message() {
        let err = BundleError::AmbiguousPrimary {
            block: "CACHE_LOGIC".to_owned(),
            modules: vec!["fn_a".to_owned(), "fn_b".to_owned()],
        };
        assert_eq!(
            err.to_string(),
            "transfer block 'CACHE_LOGIC' has 2 primary copies (fn_a, fn_b); exactly one is allowed"
        );
    }

    #[test]
    fn test_generation_error_issue_location() {
        let issue = GenerationError::SharedImportOutsideSection { line: 14 }.to_issue();
        assert_eq!(issue.kind, IssueKind::Generation);
        assert_eq!(issue.line, Some(14));
        assert!(issue.is_error());

        let issue = GenerationError::InliningCollision {
            names: vec!["helper".to_owned()],
        }
        .to_issue();
        assert_eq!(
            issue.message,
            "inlining collision: helper defined by both the module and the shared configuration"
        );
    }

    #[test]
    fn test_import_parse_error_keeps_its_kind() {
        let err: GenerationError = ImportParseError {
            line: 4,
            message: "expected an import".to_owned(),
        }
        .into();
        let issue = err.to_issue();
        assert_eq!(issue.kind, IssueKind::ImportParse);
        assert_eq!(issue.line, Some(4));
        assert_eq!(err.to_string(), "import section does not parse: line 4: expected an import");
    }
}
