//! Import section parser
//!
//! Only the text inside the file's import block is parsed, so import-like
//! strings elsewhere in the file are never picked up. Each grammatical form
//! has its own small helper; [`ImportParser::parse_statement`] only
//! dispatches between them.

use std::ops::Range;

use log::trace;
use ruff_python_ast::{Alias, Stmt, StmtImport, StmtImportFrom};
use ruff_python_parser::parse_module;
use ruff_text_size::Ranged;

use super::{
    ImportClassifier, ImportEntry, ImportForm, ImportGroup, ImportStatement, group_statements,
};
use crate::{
    markers::{MarkerBlock, MarkerScanner, MarkerSyntax},
    util::{line_column, source_lines},
};

/// An import section the parser could not decompose
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ImportParseError {
    /// 1-based line in the file
    pub line: usize,
    pub message: String,
}

/// Form-specific parts of a statement before classification
struct ParsedForm {
    form: ImportForm,
    primary_module: String,
    /// (module, member, alias) per imported name
    names: Vec<(String, Option<String>, Option<String>)>,
}

/// The import block's text and its position in the file
struct Section<'a> {
    text: &'a str,
    offset: usize,
    first_line: usize,
    dev_only: Vec<&'a MarkerBlock>,
}

impl Section<'_> {
    fn file_line(&self, section_offset: usize) -> usize {
        line_column(self.text, section_offset).0 + self.first_line - 1
    }

    fn is_dev_only(&self, section_offset: usize) -> bool {
        let absolute = self.offset + section_offset;
        self.dev_only
            .iter()
            .any(|block| block.contains_offset(absolute))
    }
}

#[derive(Debug, Clone)]
pub struct ImportParser {
    classifier: ImportClassifier,
    syntax: MarkerSyntax,
}

impl ImportParser {
    pub fn new(classifier: ImportClassifier, syntax: MarkerSyntax) -> Self {
        Self { classifier, syntax }
    }

    pub fn classifier(&self) -> &ImportClassifier {
        &self.classifier
    }

    pub fn syntax(&self) -> &MarkerSyntax {
        &self.syntax
    }

    /// Parse a whole file's import section into classified groups
    pub fn parse(&self, text: &str) -> Result<Vec<ImportGroup>, ImportParseError> {
        let scan = MarkerScanner::new(self.syntax.clone()).scan(text);
        self.parse_with_blocks(text, &scan.blocks)
    }

    /// Same as [`Self::parse`] for a file whose blocks are already known
    pub fn parse_with_blocks(
        &self,
        text: &str,
        blocks: &[MarkerBlock],
    ) -> Result<Vec<ImportGroup>, ImportParseError> {
        self.parse_statements(text, blocks).map(group_statements)
    }

    /// Statements of the import section in file order
    pub fn parse_statements(
        &self,
        text: &str,
        blocks: &[MarkerBlock],
    ) -> Result<Vec<ImportStatement>, ImportParseError> {
        let Some(block) = blocks
            .iter()
            .find(|block| block.name == self.syntax.import_block)
        else {
            trace!("no {} block, nothing to parse", self.syntax.import_block);
            return Ok(Vec::new());
        };

        let section = Section {
            text: &text[block.content_range.clone()],
            offset: block.content_range.start,
            first_line: block.start_line + 1,
            dev_only: blocks
                .iter()
                .filter(|candidate| self.syntax.is_dev_only(&candidate.name))
                .collect(),
        };

        let parsed = parse_module(section.text).map_err(|err| ImportParseError {
            line: section.file_line(err.location.start().to_usize()),
            message: err.error.to_string(),
        })?;

        let mut consumed = 0;
        let mut statements = Vec::new();
        for stmt in &parsed.syntax().body {
            let statement = self.parse_statement(stmt, &section, consumed)?;
            consumed = line_end(section.text, stmt.end().to_usize());
            statements.push(statement);
        }
        Ok(statements)
    }

    fn parse_statement(
        &self,
        stmt: &Stmt,
        section: &Section<'_>,
        consumed: usize,
    ) -> Result<ImportStatement, ImportParseError> {
        let start = stmt.start().to_usize();
        let line = section.file_line(start);
        let parsed = match stmt {
            Stmt::Import(import) => parse_simple_import(import),
            Stmt::ImportFrom(import_from) => parse_from_import(import_from),
            _ => {
                return Err(ImportParseError {
                    line,
                    message: "expected an `import` or `from ... import` statement".to_owned(),
                });
            }
        };
        if start < consumed {
            return Err(ImportParseError {
                line,
                message: "multiple statements on one line are not supported".to_owned(),
            });
        }

        let kind = self.classifier.classify(&parsed.primary_module);
        trace!("line {line}: `{}` is {kind}", parsed.primary_module);
        let entries = parsed
            .names
            .into_iter()
            .map(|(module, name, alias)| ImportEntry {
                module,
                name,
                alias,
                kind,
            })
            .collect();

        Ok(ImportStatement {
            text: self.statement_text(section.text, stmt, consumed),
            lines: line..=section.file_line(stmt.end().to_usize()),
            primary_module: parsed.primary_module,
            kind,
            form: parsed.form,
            entries,
            dev_only: section.is_dev_only(start),
        })
    }

    /// Byte range of the statement's whole lines plus the comment lines
    /// directly above it
    fn statement_span(&self, section: &str, stmt: &Stmt, consumed: usize) -> Range<usize> {
        let first = line_start(section, stmt.start().to_usize());
        let last = line_end(section, stmt.end().to_usize());

        let mut start = first;
        for line in source_lines(&section[consumed..first]).collect::<Vec<_>>().iter().rev() {
            let trimmed = line.text.trim();
            let is_comment = trimmed.starts_with(self.syntax.comment_prefix.as_str());
            if !is_comment || self.syntax.parse_line(line.text).is_some() {
                break;
            }
            start = consumed + line.start;
        }
        start..last
    }

    fn statement_text(&self, section: &str, stmt: &Stmt, consumed: usize) -> String {
        let mut text = section[self.statement_span(section, stmt, consumed)].to_owned();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text
    }

    /// Import statements at the top level of a whole module, each with the
    /// byte range its text occupies
    ///
    /// Used for modules without an import block, such as the shared
    /// configuration, whose imports are hoisted into another file.
    pub fn top_level_imports(
        &self,
        text: &str,
        body: &[Stmt],
    ) -> Result<Vec<(ImportStatement, Range<usize>)>, ImportParseError> {
        let section = Section {
            text,
            offset: 0,
            first_line: 1,
            dev_only: Vec::new(),
        };
        let mut consumed = 0;
        let mut imports = Vec::new();
        for stmt in body {
            if matches!(stmt, Stmt::Import(_) | Stmt::ImportFrom(_)) {
                let statement = self.parse_statement(stmt, &section, consumed)?;
                imports.push((statement, self.statement_span(text, stmt, consumed)));
            }
            consumed = line_end(text, stmt.end().to_usize());
        }
        Ok(imports)
    }
}

fn parse_simple_import(import: &StmtImport) -> ParsedForm {
    let names: Vec<_> = import
        .names
        .iter()
        .map(|alias| {
            let (module, alias) = resolve_alias(alias);
            (module, None, alias)
        })
        .collect();
    let primary_module = names
        .first()
        .map(|(module, _, _)| module.clone())
        .unwrap_or_default();
    ParsedForm {
        form: ImportForm::Simple,
        primary_module,
        names,
    }
}

fn parse_from_import(import_from: &StmtImportFrom) -> ParsedForm {
    let module = import_from.module.as_ref().map(ToString::to_string);
    let primary_module = format!(
        "{}{}",
        ".".repeat(import_from.level as usize),
        module.as_deref().unwrap_or_default()
    );
    let names = import_from
        .names
        .iter()
        .map(|alias| {
            let (name, alias) = resolve_alias(alias);
            (primary_module.clone(), Some(name), alias)
        })
        .collect();
    ParsedForm {
        form: ImportForm::From {
            module,
            level: import_from.level,
        },
        primary_module,
        names,
    }
}

/// Imported name and the alias it is bound to, if renamed
fn resolve_alias(alias: &Alias) -> (String, Option<String>) {
    (
        alias.name.to_string(),
        alias.asname.as_ref().map(ToString::to_string),
    )
}

fn line_start(text: &str, offset: usize) -> usize {
    text[..offset].rfind('\n').map_or(0, |index| index + 1)
}

fn line_end(text: &str, offset: usize) -> usize {
    text[offset..]
        .find('\n')
        .map_or(text.len(), |index| offset + index + 1)
}

#[cfg(test)]
mod tests;
