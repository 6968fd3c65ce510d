//! Per-target substitution rules applied to copied transfer blocks

use std::borrow::Cow;

use cow_utils::CowUtils;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One substitution as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncRule {
    pub pattern: String,
    pub replacement: String,
    /// Treat `pattern` as a regular expression (`$1` style captures in `replacement`)
    #[serde(default)]
    pub regex: bool,
    /// Restrict the rule to these transfer blocks; empty means every block
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<String>,
}

impl SyncRule {
    pub fn literal(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            regex: false,
            blocks: Vec::new(),
        }
    }

    pub fn compile(&self) -> Result<CompiledRule, regex::Error> {
        let matcher = if self.regex {
            Matcher::Regex(Regex::new(&self.pattern)?)
        } else {
            Matcher::Literal
        };
        Ok(CompiledRule {
            rule: self.clone(),
            matcher,
        })
    }

    pub fn applies_to(&self, block: &str) -> bool {
        self.blocks.is_empty() || self.blocks.iter().any(|name| name == block)
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Literal,
    Regex(Regex),
}

/// A rule ready to run
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: SyncRule,
    matcher: Matcher,
}

impl CompiledRule {
    pub fn rule(&self) -> &SyncRule {
        &self.rule
    }

    /// Apply the rule, returning the new text and the number of matches
    pub fn apply<'a>(&self, text: &'a str) -> (Cow<'a, str>, usize) {
        match &self.matcher {
            Matcher::Literal if self.rule.pattern.is_empty() => (Cow::Borrowed(text), 0),
            Matcher::Literal => {
                let matches = text.matches(self.rule.pattern.as_str()).count();
                let replaced = text.cow_replace(self.rule.pattern.as_str(), &self.rule.replacement);
                (replaced, matches)
            }
            Matcher::Regex(regex) => {
                let matches = regex.find_iter(text).count();
                (regex.replace_all(text, self.rule.replacement.as_str()), matches)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_rule() {
        let rule = SyncRule::literal("a_", "b_").compile().expect("literal compiles");
        let (text, matches) = rule.apply("PREFIX = \"a_\"\nOTHER = \"a_x\"\n");
        assert_eq!(text, "PREFIX = \"b_\"\nOTHER = \"b_x\"\n");
        assert_eq!(matches, 2);
    }

    #[test]
    fn test_literal_rule_without_match_borrows() {
        let rule = SyncRule::literal("zzz", "y").compile().expect("literal compiles");
        let (text, matches) = rule.apply("nothing here");
        assert!(matches!(text, Cow::Borrowed(_)));
        assert_eq!(matches, 0);
    }

    #[test]
    fn test_empty_literal_pattern_is_a_no_op() {
        let rule = SyncRule::literal("", "x").compile().expect("literal compiles");
        let (text, matches) = rule.apply("abc");
        assert_eq!(text, "abc");
        assert_eq!(matches, 0);
    }

    #[test]
    fn test_regex_rule_with_captures() {
        let rule = SyncRule {
            regex: true,
            ..SyncRule::literal(r#"SERVICE = "(\w+)-a""#, r#"SERVICE = "$1-b""#)
        }
        .compile()
        .expect("regex compiles");
        let (text, matches) = rule.apply("SERVICE = \"cache-a\"\n");
        assert_eq!(text, "SERVICE = \"cache-b\"\n");
        assert_eq!(matches, 1);
    }

    #[test]
    fn test_invalid_regex() {
        let rule = SyncRule {
            regex: true,
            ..SyncRule::literal("(unclosed", "x")
        };
        assert!(rule.compile().is_err());
    }

    #[test]
    fn test_block_scoping() {
        let mut rule = SyncRule::literal("a", "b");
        assert!(rule.applies_to("ANY"));
        rule.blocks = vec!["CACHE_LOGIC".to_owned()];
        assert!(rule.applies_to("CACHE_LOGIC"));
        assert!(!rule.applies_to("AUTH"));
    }
}
