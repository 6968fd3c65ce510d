//! Machine-readable run report
//!
//! Serialized as JSON for CI. Field order is stable and file entries are
//! sorted by function name, so identical runs produce identical reports.

use std::{
    fmt,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{issues::Issue, sync::SyncEdit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileStatus {
    Passed,
    Failed,
    UpToDate,
    Excluded,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::UpToDate => "up-to-date",
            Self::Excluded => "excluded",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub function: String,
    pub source_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub status: FileStatus,
    pub issues: Vec<Issue>,
    /// Top-level third-party packages the artifact imports
    pub third_party: Vec<String>,
}

impl FileReport {
    pub fn new(function: impl Into<String>, status: FileStatus) -> Self {
        Self {
            function: function.into(),
            source_path: None,
            output_path: None,
            status,
            issues: Vec::new(),
            third_party: Vec::new(),
        }
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|issue| issue.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues.len() - self.error_count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub up_to_date: usize,
    pub excluded: usize,
    pub errors: usize,
    pub warnings: usize,
    /// Artifacts and synchronized sources written to disk
    pub written: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub success: bool,
    pub summary: Summary,
    /// Set when a corpus-global error aborted the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
    pub files: Vec<FileReport>,
    pub sync_edits: Vec<SyncEdit>,
}

impl RunReport {
    /// Sort entries, recount the summary and decide overall success
    pub fn finish(&mut self, written: usize) {
        self.files
            .sort_by(|left, right| left.function.cmp(&right.function));

        let mut summary = Summary {
            total: self.files.len(),
            written,
            ..Summary::default()
        };
        for file in &self.files {
            match file.status {
                FileStatus::Passed => summary.passed += 1,
                FileStatus::Failed => summary.failed += 1,
                FileStatus::UpToDate => summary.up_to_date += 1,
                FileStatus::Excluded => summary.excluded += 1,
            }
            summary.errors += file.error_count();
            summary.warnings += file.warning_count();
        }
        self.summary = summary;
        self.success = self.fatal.is_none() && summary.failed == 0 && summary.errors == 0;
    }

    pub fn file(&self, function: &str) -> Option<&FileReport> {
        self.files.iter().find(|file| file.function == function)
    }

    /// Pretty JSON followed by a newline
    pub fn emit(&self, writer: &mut impl Write) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        writeln!(writer, "{json}")
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let mut buffer = Vec::new();
        self.emit(&mut buffer)
            .context("Failed to serialize run report")?;
        fs::write(path, buffer)
            .with_context(|| format!("Failed to write run report to {}", path.display()))
    }

    /// Human-readable summary, one line per file with issues
    pub fn render_text(&self, writer: &mut impl Write) -> io::Result<()> {
        for file in &self.files {
            writeln!(writer, "{:<10} {}", file.status, file.function)?;
            for issue in &file.issues {
                writeln!(writer, "    {issue}")?;
            }
        }
        if let Some(fatal) = &self.fatal {
            writeln!(writer, "fatal: {fatal}")?;
        }
        let summary = &self.summary;
        writeln!(
            writer,
            "{} function(s): {} passed, {} failed, {} up-to-date, {} excluded; {} error(s), {} warning(s)",
            summary.total,
            summary.passed,
            summary.failed,
            summary.up_to_date,
            summary.excluded,
            summary.errors,
            summary.warnings
        )
    }
}
