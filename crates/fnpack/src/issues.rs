//! Issues reported against source modules and deployment artifacts

use serde::Serialize;

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    UnbalancedMarker,
    DuplicateMarkerName,
    OrphanedCodeRange,
    SyncMismatch,
    SyntaxError,
    ImportParse,
    Generation,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::UnbalancedMarker => "unbalanced-marker",
            Self::DuplicateMarkerName => "duplicate-marker-name",
            Self::OrphanedCodeRange => "orphaned-code-range",
            Self::SyncMismatch => "sync-mismatch",
            Self::SyntaxError => "syntax-error",
            Self::ImportParse => "import-parse",
            Self::Generation => "generation",
        };
        f.write_str(label)
    }
}

/// Whether an issue blocks packaging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    /// 1-based line, when the issue points at a location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// 1-based column, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
    /// Marker block the issue concerns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
}

impl Issue {
    pub fn error(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
            line: None,
            column: None,
            block: None,
        }
    }

    pub fn warning(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(kind, message)
        }
    }

    #[must_use]
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    #[must_use]
    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    #[must_use]
    pub fn in_block(mut self, block: impl Into<String>) -> Self {
        self.block = Some(block.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{severity}[{}]", self.kind)?;
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, " {line}:{column}")?,
            (Some(line), None) => write!(f, " line {line}")?,
            _ => {}
        }
        write!(f, ": {}", self.message)
    }
}

/// Outcome of validating one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub issues: Vec<Issue>,
}

impl ValidationResult {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self { issues }
    }

    /// True when no issue has error severity
    pub fn passed(&self) -> bool {
        !self.issues.iter().any(Issue::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|issue| issue.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|issue| !issue.is_error())
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = Issue>) {
        self.issues.extend(issues);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_result_passes_with_only_warnings() {
        let mut result = ValidationResult::default();
        assert!(result.passed());

        result.extend([Issue::warning(IssueKind::OrphanedCodeRange, "stray code").at_line(3)]);
        assert!(result.passed());
        assert_eq!(result.warnings().count(), 1);

        result.extend([Issue::error(IssueKind::SyntaxError, "invalid syntax").at(4, 7)]);
        assert!(!result.passed());
        assert_eq!(result.errors().count(), 1);
    }

    #[test]
    fn test_issue_display() {
        let issue = Issue::error(IssueKind::UnbalancedMarker, "unclosed marker").at_line(12);
        assert_eq!(
            issue.to_string(),
            "error[unbalanced-marker] line 12: unclosed marker"
        );

        let issue = Issue::warning(IssueKind::SyncMismatch, "rule matched nothing");
        assert_eq!(
            issue.to_string(),
            "warning[sync-mismatch]: rule matched nothing"
        );
    }
}
