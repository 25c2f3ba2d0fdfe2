//! Path transformation rule engine
//!
//! A crawler is configured with an ordered list of rules, one per line. Each
//! discovered path runs through the rules top to bottom; the first matching
//! rule decides whether the path is rewritten, dropped, or passed through.
//! Rules with a `>>` head rewrite the working path and keep matching instead
//! of terminating.
//!
//! The rule list is parsed and compiled once, at crawler construction time,
//! so invalid rules fail the run before any crawling starts.

mod parser;
mod rule;
mod template;

pub use parser::RuleParseError;
pub use rule::{ArrowHead, ArrowKind, RightSide, Rule};
pub use template::TemplateError;

use crate::path::PurePath;
use crate::Result;
use rule::{Step, Transformation};

/// Outcome of running a path through the rule list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformResult {
    /// Some rule rewrote the path
    Transformed(PurePath),
    /// No rule changed the path (no match, or an identity match)
    Unchanged,
    /// A rule with the `!` target matched; the path is dropped
    Ignored,
}

impl TransformResult {
    /// The output path, if the input survives.
    pub fn output(&self, input: &PurePath) -> Option<PurePath> {
        match self {
            TransformResult::Transformed(path) => Some(path.clone()),
            TransformResult::Unchanged => Some(input.clone()),
            TransformResult::Ignored => None,
        }
    }
}

#[derive(Debug)]
struct CompiledRule {
    line: String,
    tf: Transformation,
}

/// An ordered, immutable list of compiled transformation rules
#[derive(Debug)]
pub struct Transformer {
    rules: Vec<CompiledRule>,
}

impl Transformer {
    /// Parses and compiles a rule list, one rule per line.
    ///
    /// Blank lines are skipped. Any syntax error, invalid regex, invalid
    /// template or multi-segment name-arrow source fails compilation.
    pub fn new(rules_text: &str) -> std::result::Result<Self, RuleParseError> {
        let mut rules = Vec::new();
        for (i, line) in rules_text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed = parser::parse_rule(line, i + 1)?;
            rules.push(CompiledRule {
                line: line.to_string(),
                tf: Transformation::compile(&parsed)?,
            });
        }
        Ok(Transformer { rules })
    }

    /// Runs a path through the rule list.
    ///
    /// Template evaluation failures indicate a broken rule and are propagated
    /// as errors rather than recorded against the path.
    pub fn transform(&self, path: &PurePath) -> Result<TransformResult> {
        let mut working = path.clone();

        for (i, rule) in self.rules.iter().enumerate() {
            tracing::trace!("Testing rule {}: {}", i + 1, rule.line);

            let step = match rule.tf.apply(&working)? {
                None => continue,
                Some(step) => step,
            };

            match step {
                Step::Ignored => {
                    tracing::trace!("Match found, path ignored");
                    return Ok(TransformResult::Ignored);
                }
                Step::Rewritten(new_path) => match rule.tf.head {
                    ArrowHead::Normal => {
                        tracing::trace!("Match found, transformed path to {}", new_path);
                        working = new_path;
                        break;
                    }
                    ArrowHead::Sequence => {
                        tracing::trace!("Match found, updated path to {}", new_path);
                        working = new_path;
                    }
                },
            }
        }

        if working == *path {
            Ok(TransformResult::Unchanged)
        } else {
            Ok(TransformResult::Transformed(working))
        }
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transformer(rules: &str) -> Transformer {
        Transformer::new(rules).unwrap()
    }

    fn apply(rules: &str, path: &str) -> TransformResult {
        transformer(rules)
            .transform(&PurePath::parse(path))
            .unwrap()
    }

    fn transformed(rules: &str, path: &str) -> PurePath {
        match apply(rules, path) {
            TransformResult::Transformed(p) => p,
            other => panic!("expected a transformation, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_rule_list_is_unchanged() {
        assert_eq!(apply("", "a/b"), TransformResult::Unchanged);
    }

    #[test]
    fn test_no_match_is_unchanged() {
        assert_eq!(apply("x --> y", "a/b"), TransformResult::Unchanged);
    }

    #[test]
    fn test_first_match_wins() {
        let rules = "a --> first\na --> second";
        assert_eq!(transformed(rules, "a"), PurePath::parse("first"));
    }

    #[test]
    fn test_reordering_non_matching_rules_is_irrelevant() {
        let a = "x --> y\na --> out";
        let b = "a --> out\nx --> y";
        assert_eq!(apply(a, "a"), apply(b, "a"));
    }

    #[test]
    fn test_identity_is_terminal_without_sequence_head() {
        // The identity rule matches first and stops evaluation
        let rules = "a -exact->\na --> renamed";
        assert_eq!(apply(rules, "a"), TransformResult::Unchanged);
    }

    #[test]
    fn test_identity_with_sequence_head_continues_unchanged() {
        let rules = "a -exact->>\na --> renamed";
        assert_eq!(transformed(rules, "a"), PurePath::parse("renamed"));
    }

    #[test]
    fn test_ignore_short_circuits() {
        // Later rules are never consulted once `!` matches
        let rules = "junk --> !\njunk --> resurrected";
        assert_eq!(apply(rules, "junk/file"), TransformResult::Ignored);
    }

    #[test]
    fn test_sequence_rules_chain() {
        let rules = "a -->> b\nb -->> c";
        assert_eq!(transformed(rules, "a/x"), PurePath::parse("c/x"));
    }

    #[test]
    fn test_sequence_then_terminal() {
        let rules = "a -->> b\nb --> final\nfinal --> never";
        assert_eq!(transformed(rules, "a"), PurePath::parse("final"));
    }

    #[test]
    fn test_rewrite_back_to_original_is_unchanged() {
        let rules = "a -->> b\nb -->> a";
        assert_eq!(apply(rules, "a"), TransformResult::Unchanged);
    }

    #[test]
    fn test_tutorials_example() {
        let rules = "tutorials/tut_02 --> my_tut\ntutorials -exact->\ntutorials --> !";

        assert_eq!(apply(rules, "tutorials"), TransformResult::Unchanged);
        assert_eq!(
            apply(rules, "tutorials/tut_02/x"),
            TransformResult::Transformed(PurePath::parse("my_tut/x"))
        );
        assert_eq!(apply(rules, "tutorials/tut_01"), TransformResult::Ignored);
    }

    #[test]
    fn test_regex_example() {
        let rules = "f(oo+)/be?ar -re-> B{g1.upper()}H/fear";
        assert_eq!(
            transformed(rules, "fooooo/bear"),
            PurePath::parse("BOOOOOH/fear")
        );
        assert_eq!(
            transformed(rules, "foo/bar/baz"),
            PurePath::parse("BOOH/fear/baz")
        );
    }

    #[test]
    fn test_name_arrow_multi_segment_source_rejected() {
        assert!(Transformer::new("a/b -name-> c").is_err());
    }

    #[test]
    fn test_rule_error_carries_line_number() {
        let err = Transformer::new("good --> fine\nbad arrow here").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_template_error_is_not_per_path() {
        let t = transformer("a(b)?c -exact-re-> {g1}");
        assert!(t.transform(&PurePath::parse("ac")).is_err());
        // A path the rule does not match at all is fine
        assert_eq!(
            t.transform(&PurePath::parse("zzz")).unwrap(),
            TransformResult::Unchanged
        );
    }

    #[test]
    fn test_output_helper() {
        let input = PurePath::parse("a");
        assert_eq!(
            TransformResult::Unchanged.output(&input),
            Some(input.clone())
        );
        assert_eq!(TransformResult::Ignored.output(&input), None);
        assert_eq!(
            TransformResult::Transformed(PurePath::parse("b")).output(&input),
            Some(PurePath::parse("b"))
        );
    }
}
