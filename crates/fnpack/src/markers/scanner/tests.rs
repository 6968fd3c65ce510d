//! Tests for the marker scanner

use pretty_assertions::assert_eq;

use super::*;

fn scanner() -> MarkerScanner {
    MarkerScanner::new(MarkerSyntax::default())
}

#[test]
fn test_balanced_blocks_with_content() {
    let source = "\
# IMPORT_BLOCK_START
import os
# IMPORT_BLOCK_END
# CACHE_LOGIC_BLOCK_START primary
PREFIX = \"a_\"
# CACHE_LOGIC_BLOCK_END
";
    let result = scanner().scan(source);

    assert!(result.issues.is_empty(), "{:?}", result.issues);
    assert_eq!(result.blocks.len(), 2);

    let imports = result.block("IMPORT").expect("import block");
    assert_eq!(imports.content, "import os\n");
    assert_eq!(imports.start_line, 1);
    assert_eq!(imports.end_line, 3);
    assert_eq!(&source[imports.content_range.clone()], "import os\n");
    assert!(!imports.is_transfer_block());

    let cache = result.block("CACHE_LOGIC").expect("cache block");
    assert_eq!(cache.content, "PREFIX = \"a_\"\n");
    assert!(cache.is_primary());
    assert!(cache.is_transfer_block());
    assert_eq!(&source[cache.start..cache.end], &source[source.find("# CACHE").unwrap()..]);
}

#[test]
fn test_unclosed_start_yields_exactly_one_issue() {
    let source = "# CACHE_LOGIC_BLOCK_START\nPREFIX = 1\n";
    let result = scanner().scan(source);

    assert!(result.blocks.is_empty());
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].kind, IssueKind::UnbalancedMarker);
    assert_eq!(result.issues[0].line, Some(1));
    assert!(result.has_errors());
}

#[test]
fn test_end_without_start_is_discarded() {
    let source = "x = 1\n# AUTH_BLOCK_END\n";
    let result = scanner().scan(source);

    assert!(result.blocks.is_empty());
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].kind, IssueKind::UnbalancedMarker);
    assert_eq!(result.issues[0].line, Some(2));
}

#[test]
fn test_mismatched_end_closes_nearest_same_name() {
    let source = "\
# OUTER_BLOCK_START
# INNER_BLOCK_START
a = 1
# OUTER_BLOCK_END
";
    let result = scanner().scan(source);

    // OUTER is still recovered, INNER is left unclosed
    assert_eq!(result.blocks.len(), 1);
    assert_eq!(result.blocks[0].name, "OUTER");
    let kinds: Vec<_> = result.issues.iter().map(|issue| issue.kind).collect();
    assert_eq!(
        kinds,
        vec![IssueKind::UnbalancedMarker, IssueKind::UnbalancedMarker]
    );
    assert_eq!(result.issues[1].block.as_deref(), Some("INNER"));
}

#[test]
fn test_nesting_different_names_is_allowed() {
    let source = "\
# IMPORT_BLOCK_START
import os
# DEV_ONLY_BLOCK_START
from dotenv import load_dotenv
# DEV_ONLY_BLOCK_END
# IMPORT_BLOCK_END
";
    let result = scanner().scan(source);

    assert!(result.issues.is_empty(), "{:?}", result.issues);
    let names: Vec<_> = result.blocks.iter().map(|block| block.name.as_str()).collect();
    assert_eq!(names, vec!["IMPORT", "DEV_ONLY"]);
}

#[test]
fn test_nested_same_name_is_duplicate() {
    let source = "\
# AUTH_BLOCK_START
# AUTH_BLOCK_START
x = 1
# AUTH_BLOCK_END
# AUTH_BLOCK_END
";
    let result = scanner().scan(source);

    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].kind, IssueKind::DuplicateMarkerName);
    assert_eq!(result.issues[0].line, Some(2));
    // Only the outer block survives
    assert_eq!(result.blocks.len(), 1);
    assert_eq!(result.blocks[0].start_line, 1);
    assert_eq!(result.blocks[0].end_line, 5);
}

#[test]
fn test_sequential_same_name_is_duplicate() {
    let source = "\
# AUTH_BLOCK_START
a = 1
# AUTH_BLOCK_END
# AUTH_BLOCK_START
b = 2
# AUTH_BLOCK_END
";
    let result = scanner().scan(source);

    assert_eq!(result.blocks.len(), 1);
    assert_eq!(result.blocks[0].content, "a = 1\n");
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].kind, IssueKind::DuplicateMarkerName);
}

const ORPHAN_SOURCE: &str = "\
#!/usr/bin/env python3
# IMPORT_BLOCK_START
import os
# IMPORT_BLOCK_END

stray = os.getenv(\"X\")

# HANDLER_BLOCK_START
def handler(event, context):
    return stray
# HANDLER_BLOCK_END
";

#[test]
fn test_orphans_reported_only_in_strict_mode() {
    let relaxed = scanner().scan(ORPHAN_SOURCE);
    assert!(relaxed.issues.is_empty());

    let strict = scanner()
        .with_orphan_checking(true, false)
        .scan(ORPHAN_SOURCE);
    assert_eq!(strict.issues.len(), 1);
    let issue = &strict.issues[0];
    assert_eq!(issue.kind, IssueKind::OrphanedCodeRange);
    assert_eq!(issue.severity, Severity::Warning);
    assert_eq!(issue.line, Some(6));
    assert!(!strict.has_errors());
}

#[test]
fn test_orphans_escalated_to_errors() {
    let strict = scanner()
        .with_orphan_checking(true, true)
        .scan(ORPHAN_SOURCE);
    assert_eq!(strict.issues.len(), 1);
    assert!(strict.has_errors());
}

#[test]
fn test_orphan_run_spans_contiguous_lines() {
    let source = "a = 1\n\nb = 2\n# X_BLOCK_START\n# X_BLOCK_END\nc = 3\n";
    let result = scanner().with_orphan_checking(true, false).scan(source);

    let messages: Vec<_> = result.issues.iter().map(|issue| issue.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "lines 1-3 are outside every marker block",
            "line 6 is outside every marker block",
        ]
    );
}

#[test]
fn test_configured_transfer_names() {
    let source = "# CACHE_LOGIC_BLOCK_START\nx = 1\n# CACHE_LOGIC_BLOCK_END\n";
    let result = scanner().with_transfer_names(["CACHE_LOGIC"]).scan(source);

    let block = result.block("CACHE_LOGIC").expect("block");
    assert!(block.is_transfer_block());
    assert!(!block.is_primary());
}

#[test]
fn test_empty_block_content() {
    let source = "# EMPTY_BLOCK_START\n# EMPTY_BLOCK_END";
    let result = scanner().scan(source);

    let block = result.block("EMPTY").expect("block");
    assert_eq!(block.content, "");
    assert_eq!(block.end, source.len());
}
