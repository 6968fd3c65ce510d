//! Stack-based marker scanner
//!
//! A single pass over the file's lines: start markers are pushed, end markers
//! pop the most recent open marker of the same name. Every structural
//! problem becomes an [`Issue`]; the scan never aborts.

use log::{trace, warn};
use rustc_hash::FxHashSet;

use super::{Marker, MarkerBlock, MarkerFlags, MarkerSyntax};
use crate::{
    issues::{Issue, IssueKind, Severity},
    util::{SourceLine, source_lines},
};

/// Blocks and issues found in one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Balanced blocks ordered by start offset
    pub blocks: Vec<MarkerBlock>,
    pub issues: Vec<Issue>,
}

impl ScanResult {
    pub fn block(&self, name: &str) -> Option<&MarkerBlock> {
        self.blocks.iter().find(|block| block.name == name)
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(Issue::is_error)
    }
}

#[derive(Debug, Clone)]
pub struct MarkerScanner {
    syntax: MarkerSyntax,
    strict_orphans: bool,
    orphan_severity: Severity,
    transfer_names: FxHashSet<String>,
}

impl MarkerScanner {
    pub fn new(syntax: MarkerSyntax) -> Self {
        Self {
            syntax,
            strict_orphans: false,
            orphan_severity: Severity::Warning,
            transfer_names: FxHashSet::default(),
        }
    }

    /// Report code outside every block; `as_errors` escalates those reports
    #[must_use]
    pub fn with_orphan_checking(mut self, strict: bool, as_errors: bool) -> Self {
        self.strict_orphans = strict;
        self.orphan_severity = if as_errors {
            Severity::Error
        } else {
            Severity::Warning
        };
        self
    }

    /// Block names treated as transfer blocks even without a marker flag
    #[must_use]
    pub fn with_transfer_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transfer_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn syntax(&self) -> &MarkerSyntax {
        &self.syntax
    }

    pub fn scan(&self, text: &str) -> ScanResult {
        let mut state = ScanState::new(text, &self.transfer_names);

        for line in source_lines(text) {
            match self.syntax.parse_line(line.text) {
                Some(Marker::Start { name, flags }) => state.open(name, flags, line),
                Some(Marker::End { name }) => state.close(&name, line),
                None => {}
            }
        }

        let mut result = state.finish();
        if self.strict_orphans {
            self.report_orphans(text, &mut result);
        }
        result
    }

    fn report_orphans(&self, text: &str, result: &mut ScanResult) {
        let mut run: Option<(usize, usize)> = None;
        let mut ranges = Vec::new();

        for line in source_lines(text) {
            if result.blocks.iter().any(|block| block.covers_line(line.number)) {
                ranges.extend(run.take());
            } else if self.is_code(&line) {
                run = Some(run.map_or((line.number, line.number), |(first, _)| {
                    (first, line.number)
                }));
            }
        }
        ranges.extend(run);

        for (first, last) in ranges {
            let message = if first == last {
                format!("line {first} is outside every marker block")
            } else {
                format!("lines {first}-{last} are outside every marker block")
            };
            let mut issue = Issue::warning(IssueKind::OrphanedCodeRange, message).at_line(first);
            issue.severity = self.orphan_severity;
            result.issues.push(issue);
        }
    }

    fn is_code(&self, line: &SourceLine<'_>) -> bool {
        let trimmed = line.text.trim();
        !trimmed.is_empty() && !trimmed.starts_with(self.syntax.comment_prefix.as_str())
    }
}

#[derive(Debug)]
struct OpenMarker {
    name: String,
    flags: MarkerFlags,
    line_number: usize,
    line_start: usize,
    content_start: usize,
    /// Duplicate of a name already used in this file; closing it yields no block
    rejected: bool,
}

struct ScanState<'a> {
    text: &'a str,
    transfer_names: &'a FxHashSet<String>,
    stack: Vec<OpenMarker>,
    seen: FxHashSet<String>,
    result: ScanResult,
}

impl<'a> ScanState<'a> {
    fn new(text: &'a str, transfer_names: &'a FxHashSet<String>) -> Self {
        Self {
            text,
            transfer_names,
            stack: Vec::new(),
            seen: FxHashSet::default(),
            result: ScanResult::default(),
        }
    }

    fn open(&mut self, name: String, flags: MarkerFlags, line: SourceLine<'_>) {
        let duplicate =
            self.seen.contains(&name) || self.stack.iter().any(|open| open.name == name);
        if duplicate {
            self.result.issues.push(
                Issue::error(
                    IssueKind::DuplicateMarkerName,
                    format!("block '{name}' is opened more than once in this file"),
                )
                .at_line(line.number)
                .in_block(name.clone()),
            );
        }
        trace!("open marker {name} at line {}", line.number);
        self.stack.push(OpenMarker {
            name,
            flags,
            line_number: line.number,
            line_start: line.start,
            content_start: line.end,
            rejected: duplicate,
        });
    }

    fn close(&mut self, name: &str, line: SourceLine<'_>) {
        let Some(index) = self.stack.iter().rposition(|open| open.name == name) else {
            warn!(
                "discarding end marker for '{name}' at line {}: no open start marker",
                line.number
            );
            self.result.issues.push(
                Issue::error(
                    IssueKind::UnbalancedMarker,
                    format!("end marker for '{name}' has no matching start marker"),
                )
                .at_line(line.number)
                .in_block(name),
            );
            return;
        };

        if index + 1 != self.stack.len() {
            let innermost = &self.stack[self.stack.len() - 1].name;
            self.result.issues.push(
                Issue::error(
                    IssueKind::UnbalancedMarker,
                    format!("end marker for '{name}' closes over still-open block '{innermost}'"),
                )
                .at_line(line.number)
                .in_block(name),
            );
        }

        let open = self.stack.remove(index);
        if !open.rejected {
            self.record_block(open, line);
        }
    }

    fn record_block(&mut self, open: OpenMarker, line: SourceLine<'_>) {
        let content_range = open.content_start..line.start;
        let configured_transfer = self.transfer_names.contains(&open.name);
        self.seen.insert(open.name.clone());
        self.result.blocks.push(MarkerBlock {
            content: self.text[content_range.clone()].to_owned(),
            name: open.name,
            start: open.line_start,
            end: line.end,
            content_range,
            start_line: open.line_number,
            end_line: line.number,
            flags: open.flags,
            configured_transfer,
        });
    }

    fn finish(mut self) -> ScanResult {
        for open in self.stack.drain(..) {
            self.result.issues.push(
                Issue::error(
                    IssueKind::UnbalancedMarker,
                    format!("start marker for '{}' is never closed", open.name),
                )
                .at_line(open.line_number)
                .in_block(open.name),
            );
        }
        self.result.blocks.sort_by_key(|block| block.start);
        self.result
    }
}

#[cfg(test)]
mod tests;
