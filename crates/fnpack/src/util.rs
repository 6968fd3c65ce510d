//! Small text and hashing helpers shared across the pipeline

use std::ops::Range;

use sha2::{Digest, Sha256};

/// A line of source text with its byte range in the containing file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLine<'a> {
    /// 1-based line number
    pub number: usize,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset just past the line terminator (or end of text)
    pub end: usize,
    /// Line text without its terminator
    pub text: &'a str,
}

impl SourceLine<'_> {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Iterate lines keeping byte offsets, so edits can be spliced back exactly
pub fn source_lines(text: &str) -> impl Iterator<Item = SourceLine<'_>> {
    let mut offset = 0;
    text.split_inclusive('\n')
        .enumerate()
        .map(move |(index, raw)| {
            let start = offset;
            offset += raw.len();
            let body = raw.strip_suffix('\n').unwrap_or(raw);
            let body = body.strip_suffix('\r').unwrap_or(body);
            SourceLine {
                number: index + 1,
                start,
                end: offset,
                text: body,
            }
        })
}

/// Convert a byte offset into a 1-based (line, column) pair
pub fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let prefix = &text[..offset];
    let line = prefix.matches('\n').count() + 1;
    let line_start = prefix.rfind('\n').map_or(0, |index| index + 1);
    let column = prefix[line_start..].chars().count() + 1;
    (line, column)
}

/// Hex-encoded SHA-256 of the given parts, separated so that part boundaries matter
pub fn content_hash<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Replace byte ranges in `text`; ranges must be sorted by start, and an edit
/// starting inside an earlier one is dropped
pub fn splice(text: &str, edits: &[(Range<usize>, String)]) -> String {
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    for (range, replacement) in edits {
        if range.start < cursor {
            continue;
        }
        output.push_str(&text[cursor..range.start]);
        output.push_str(replacement);
        cursor = range.end;
    }
    output.push_str(&text[cursor..]);
    output
}
