//! Tests for the import section parser

use pretty_assertions::assert_eq;

use super::*;
use crate::{stdlib_detection::StdlibRegistry, types::ModuleKind};

fn parser() -> ImportParser {
    ImportParser::new(
        ImportClassifier::new(StdlibRegistry::for_python_version(12)),
        MarkerSyntax::default(),
    )
}

#[test]
fn test_groups_preserve_file_order() {
    let source = "\
\"\"\"Handler module.\"\"\"
# IMPORT_BLOCK_START
import os
import json
import boto3
from .shared_configuration import helper
import logging
# IMPORT_BLOCK_END

def handler(event, context):
    import not_in_section
";
    let groups = parser().parse(source).expect("section parses");

    let kinds: Vec<_> = groups.iter().map(|group| group.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ModuleKind::StandardLibrary,
            ModuleKind::ThirdParty,
            ModuleKind::Local,
            ModuleKind::StandardLibrary,
        ]
    );
    assert_eq!(groups[0].statements.len(), 2);
    assert_eq!(groups[0].lines(), Some(3..=4));
    assert_eq!(groups[3].statements[0].text, "import logging\n");

    let all_modules: Vec<_> = groups
        .iter()
        .flat_map(ImportGroup::entries)
        .map(|entry| entry.module.as_str())
        .collect();
    assert!(!all_modules.contains(&"not_in_section"));
}

#[test]
fn test_no_import_block_yields_nothing() {
    let groups = parser().parse("import os\n").expect("parses");
    assert!(groups.is_empty());
}

#[test]
fn test_simple_import_entries() {
    let source = "# IMPORT_BLOCK_START\nimport os.path, sys as system\n# IMPORT_BLOCK_END\n";
    let groups = parser().parse(source).expect("parses");
    let statement = &groups[0].statements[0];

    assert_eq!(statement.form, ImportForm::Simple);
    assert_eq!(statement.primary_module, "os.path");
    let bindings: Vec<_> = statement.bindings().collect();
    assert_eq!(bindings, vec!["os", "system"]);
    assert_eq!(statement.canonical(), "import os.path, sys as system");
}

#[test]
fn test_from_import_with_aliases_and_parentheses() {
    let source = "\
# IMPORT_BLOCK_START
from ..pkg.utils import (
    alpha,
    beta as b,  # trailing comment
)
# IMPORT_BLOCK_END
";
    let statements = parser()
        .parse_statements(source, &MarkerScanner::new(MarkerSyntax::default()).scan(source).blocks)
        .expect("parses");
    assert_eq!(statements.len(), 1);

    let statement = &statements[0];
    assert_eq!(statement.kind, ModuleKind::Local);
    assert_eq!(
        statement.form,
        ImportForm::From {
            module: Some("pkg.utils".to_owned()),
            level: 2
        }
    );
    assert_eq!(statement.lines, 2..=5);
    assert_eq!(
        statement.text,
        "from ..pkg.utils import (\n    alpha,\n    beta as b,  # trailing comment\n)\n"
    );

    let entries: Vec<_> = statement
        .entries
        .iter()
        .map(|entry| (entry.name.as_deref(), entry.alias.as_deref(), entry.binding()))
        .collect();
    assert_eq!(
        entries,
        vec![
            (Some("alpha"), None, "alpha"),
            (Some("beta"), Some("b"), "b"),
        ]
    );
    assert_eq!(statement.canonical(), "from ..pkg.utils import alpha, beta as b");
}

#[test]
fn test_classification_is_per_statement() {
    let source = "# IMPORT_BLOCK_START\nimport os, requests\n# IMPORT_BLOCK_END\n";
    let groups = parser().parse(source).expect("parses");

    assert_eq!(groups.len(), 1);
    assert!(
        groups[0]
            .entries()
            .all(|entry| entry.kind == ModuleKind::StandardLibrary)
    );
}

#[test]
fn test_leading_comments_attach_to_statement() {
    let source = "\
# IMPORT_BLOCK_START
import os

# HTTP client used by the handler
import aiohttp
# IMPORT_BLOCK_END
";
    let groups = parser().parse(source).expect("parses");
    assert_eq!(
        groups[1].statements[0].text,
        "# HTTP client used by the handler\nimport aiohttp\n"
    );
}

#[test]
fn test_dev_only_statements_are_flagged() {
    let source = "\
# IMPORT_BLOCK_START
import os
# DEV_ONLY_BLOCK_START
from dotenv import load_dotenv
# DEV_ONLY_BLOCK_END
# IMPORT_BLOCK_END
";
    let groups = parser().parse(source).expect("parses");
    let flags: Vec<_> = groups
        .iter()
        .flat_map(|group| group.statements.iter())
        .map(|statement| (statement.primary_module.as_str(), statement.dev_only))
        .collect();
    assert_eq!(flags, vec![("os", false), ("dotenv", true)]);
    // The nested marker line is not taken as a leading comment
    assert_eq!(groups[1].statements[0].text, "from dotenv import load_dotenv\n");
}

#[test]
fn test_non_import_statement_is_rejected_with_line() {
    let source = "\
# IMPORT_BLOCK_START
import os
TIMEOUT = 30
# IMPORT_BLOCK_END
";
    let err = parser().parse(source).expect_err("assignment is not an import");
    assert_eq!(err.line, 3);
    assert!(err.message.contains("import"));
}

#[test]
fn test_syntax_error_in_section_reports_line() {
    let source = "# IMPORT_BLOCK_START\nimport os\nfrom import x\n# IMPORT_BLOCK_END\n";
    let err = parser().parse(source).expect_err("invalid syntax");
    assert_eq!(err.line, 3);
}

#[test]
fn test_multiple_statements_on_one_line() {
    let source = "# IMPORT_BLOCK_START\nimport os; import sys\n# IMPORT_BLOCK_END\n";
    let err = parser().parse(source).expect_err("semicolon separated imports");
    assert_eq!(err.line, 2);
}

#[test]
fn test_star_import_binds_nothing() {
    let source = "# IMPORT_BLOCK_START\nfrom .shared_configuration import *\n# IMPORT_BLOCK_END\n";
    let groups = parser().parse(source).expect("parses");
    let statement = &groups[0].statements[0];
    assert!(statement.entries[0].is_star());
    assert_eq!(statement.bindings().count(), 0);
}

#[test]
fn test_top_level_imports_of_whole_module() {
    let source = "\
\"\"\"Shared settings.\"\"\"
import os

# cache backend
import redis
TIMEOUT = 30

def helper():
    import json
    return json
";
    let parsed = ruff_python_parser::parse_module(source).expect("valid python");
    let imports = parser()
        .top_level_imports(source, &parsed.syntax().body)
        .expect("imports parse");

    assert_eq!(imports.len(), 2);
    let (os, os_range) = &imports[0];
    assert_eq!(os.text, "import os\n");
    assert_eq!(os.lines, 2..=2);
    assert_eq!(&source[os_range.clone()], "import os\n");

    let (redis, redis_range) = &imports[1];
    assert_eq!(redis.kind, ModuleKind::ThirdParty);
    assert_eq!(redis.text, "# cache backend\nimport redis\n");
    assert_eq!(&source[redis_range.clone()], redis.text);
}
