//! Sentinel marker blocks
//!
//! A block is delimited by a pair of comment lines such as
//! `# CACHE_LOGIC_BLOCK_START primary` and `# CACHE_LOGIC_BLOCK_END`.
//! The token text is configurable through [`MarkerSyntax`].

pub mod scanner;

use std::ops::Range;

use serde::{Deserialize, Serialize};

pub use scanner::{MarkerScanner, ScanResult};

/// Configurable token text for marker comments and well-known block names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkerSyntax {
    pub comment_prefix: String,
    pub start_suffix: String,
    pub end_suffix: String,
    /// Block holding the file's import section
    pub import_block: String,
    /// Blocks whose name contains this tag are stripped from artifacts
    pub dev_only_tag: String,
    /// Block wrapping the inlined shared configuration in artifacts
    pub shared_block: String,
}

impl Default for MarkerSyntax {
    fn default() -> Self {
        Self {
            comment_prefix: "#".to_owned(),
            start_suffix: "_BLOCK_START".to_owned(),
            end_suffix: "_BLOCK_END".to_owned(),
            import_block: "IMPORT".to_owned(),
            dev_only_tag: "DEV_ONLY".to_owned(),
            shared_block: "SHARED_CONFIG".to_owned(),
        }
    }
}

/// A recognized marker line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Start { name: String, flags: MarkerFlags },
    End { name: String },
}

/// Flags carried after a start token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarkerFlags {
    pub transfer: bool,
    pub primary: bool,
}

impl MarkerSyntax {
    /// Recognize a marker line; anything else (including malformed tokens) is ordinary text
    pub fn parse_line(&self, line: &str) -> Option<Marker> {
        let rest = line.trim_start().strip_prefix(self.comment_prefix.as_str())?;
        let mut words = rest.split_whitespace();
        let token = words.next()?;

        if let Some(name) = token.strip_suffix(self.start_suffix.as_str()) {
            if !is_block_name(name) {
                return None;
            }
            let flags = parse_flags(words);
            return Some(Marker::Start {
                name: name.to_owned(),
                flags,
            });
        }

        let name = token.strip_suffix(self.end_suffix.as_str())?;
        is_block_name(name).then(|| Marker::End {
            name: name.to_owned(),
        })
    }

    pub fn start_line(&self, name: &str) -> String {
        format!("{} {name}{}", self.comment_prefix, self.start_suffix)
    }

    pub fn end_line(&self, name: &str) -> String {
        format!("{} {name}{}", self.comment_prefix, self.end_suffix)
    }

    pub fn is_dev_only(&self, name: &str) -> bool {
        !self.dev_only_tag.is_empty() && name.contains(self.dev_only_tag.as_str())
    }
}

fn is_block_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|byte| byte.is_ascii_uppercase() || byte.is_ascii_digit() || byte == b'_')
}

fn parse_flags<'a>(words: impl Iterator<Item = &'a str>) -> MarkerFlags {
    let mut flags = MarkerFlags::default();
    for word in words {
        match word.trim_matches(|c: char| c == ',' || c == '[' || c == ']') {
            "transfer" => flags.transfer = true,
            "primary" => {
                flags.transfer = true;
                flags.primary = true;
            }
            _ => {}
        }
    }
    flags
}

/// A balanced, named region of a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerBlock {
    pub name: String,
    /// Byte offset of the start marker line
    pub start: usize,
    /// Byte offset just past the end marker line
    pub end: usize,
    /// Byte range of the raw content between the marker lines
    pub content_range: Range<usize>,
    /// Raw content between the marker lines
    pub content: String,
    /// 1-based line numbers of the marker lines
    pub start_line: usize,
    pub end_line: usize,
    pub flags: MarkerFlags,
    /// Listed as a transfer block by configuration rather than by flag
    pub configured_transfer: bool,
}

impl MarkerBlock {
    pub fn is_transfer_block(&self) -> bool {
        self.flags.transfer || self.configured_transfer
    }

    pub fn is_primary(&self) -> bool {
        self.flags.primary
    }

    /// Whether a 1-based line falls inside this block, marker lines included
    pub fn covers_line(&self, line: usize) -> bool {
        (self.start_line..=self.end_line).contains(&line)
    }

    /// Whether a byte offset lies inside the raw content
    pub fn contains_offset(&self, offset: usize) -> bool {
        self.content_range.contains(&offset)
    }
}
