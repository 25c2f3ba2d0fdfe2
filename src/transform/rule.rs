//! Rule representation and matching
//!
//! A rule pairs a source pattern with a target and an arrow kind. The arrow
//! kind decides both the match granularity (longest path prefix, whole path,
//! or individual segment names) and whether the source is a literal path or a
//! regular expression. The arrow head decides whether a match terminates rule
//! evaluation (`>`) or feeds the rewritten path to later rules (`>>`).

use crate::path::PurePath;
use crate::transform::template::{Template, TemplateError};
use crate::transform::RuleParseError;
use regex::Regex;

/// Whether a matching rule terminates evaluation or continues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowHead {
    /// `>`: first match wins
    Normal,
    /// `>>`: rewrite and keep matching against later rules
    Sequence,
}

/// The name between the dashes of an arrow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowKind {
    /// `-->`: literal source matched against the longest path prefix
    Basic,
    /// `-exact->`: literal source matched against the whole path
    Exact,
    /// `-name->`: literal single-segment source matched against each segment
    Name,
    /// `-re->`: regex source matched against the longest path prefix
    Re,
    /// `-exact-re->`: regex source matched against the whole path
    ExactRe,
    /// `-name-re->`: regex source matched against each segment name
    NameRe,
}

/// Right side of a rule as written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RightSide {
    /// A literal replacement path, or a template for regex arrows
    Literal(String),
    /// `!`: matching paths are dropped
    Ignore,
    /// Omitted: matching paths pass through unchanged
    Empty,
}

/// A parsed but not yet compiled rule line
#[derive(Debug, Clone)]
pub struct Rule {
    pub left: String,
    pub left_column: usize,
    pub kind: ArrowKind,
    pub head: ArrowHead,
    pub right: RightSide,
    pub line_nr: usize,
}

/// Outcome of applying a single transformation to a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    Ignored,
    Rewritten(PurePath),
}

/// How a matcher is applied across a path
#[derive(Debug, Clone, Copy)]
enum Scope {
    WholePath,
    LongestPrefix,
    EachSegment,
}

/// What a rule substitutes on match
#[derive(Debug, Clone)]
enum Target {
    Path(PurePath),
    Template(Template),
    Ignore,
    Identity,
}

#[derive(Debug, Clone)]
enum Matcher {
    Literal(PurePath),
    Pattern(Regex),
}

/// A compiled rule, ready to apply to paths
#[derive(Debug, Clone)]
pub(crate) struct Transformation {
    scope: Scope,
    matcher: Matcher,
    target: Target,
    pub(crate) head: ArrowHead,
}

impl Transformation {
    /// Compiles a parsed rule, validating its pattern and target.
    ///
    /// Literal name arrows must have a single-segment source; regex sources
    /// must compile; regex targets must be valid templates. All of these are
    /// configuration errors surfaced before any crawling starts.
    pub(crate) fn compile(rule: &Rule) -> Result<Transformation, RuleParseError> {
        let scope = match rule.kind {
            ArrowKind::Basic | ArrowKind::Re => Scope::LongestPrefix,
            ArrowKind::Exact | ArrowKind::ExactRe => Scope::WholePath,
            ArrowKind::Name | ArrowKind::NameRe => Scope::EachSegment,
        };

        let is_regex = matches!(
            rule.kind,
            ArrowKind::Re | ArrowKind::ExactRe | ArrowKind::NameRe
        );

        let matcher = if is_regex {
            // Anchor the pattern so it must consume the entire candidate.
            let anchored = format!(r"\A(?:{})\z", rule.left);
            let regex = Regex::new(&anchored).map_err(|e| RuleParseError {
                line: rule.line_nr,
                column: rule.left_column,
                reason: format!("invalid regex: {}", e),
            })?;
            Matcher::Pattern(regex)
        } else {
            let source = PurePath::parse(&rule.left);
            if matches!(rule.kind, ArrowKind::Name) && source.len() != 1 {
                return Err(RuleParseError {
                    line: rule.line_nr,
                    column: rule.left_column,
                    reason: "expected a single name, not multiple segments".to_string(),
                });
            }
            Matcher::Literal(source)
        };

        let target = match &rule.right {
            RightSide::Ignore => Target::Ignore,
            RightSide::Empty => Target::Identity,
            RightSide::Literal(text) if is_regex => {
                let template = Template::parse(text).map_err(|e| RuleParseError {
                    line: rule.line_nr,
                    column: rule.left_column,
                    reason: format!("invalid target template: {}", e),
                })?;
                Target::Template(template)
            }
            RightSide::Literal(text) => Target::Path(PurePath::parse(text)),
        };

        Ok(Transformation {
            scope,
            matcher,
            target,
            head: rule.head,
        })
    }

    /// Applies the rule to a path.
    ///
    /// Returns `None` if the rule does not match. Template evaluation errors
    /// propagate; they indicate a broken rule, not a problem with the path.
    pub(crate) fn apply(&self, path: &PurePath) -> Result<Option<Step>, TemplateError> {
        match self.scope {
            Scope::WholePath => self.apply_once(path),

            Scope::LongestPrefix => {
                for i in (0..=path.len()).rev() {
                    let prefix = path.prefix(i);
                    match self.apply_once(&prefix)? {
                        None => continue,
                        Some(Step::Ignored) => return Ok(Some(Step::Ignored)),
                        Some(Step::Rewritten(new_prefix)) => {
                            return Ok(Some(Step::Rewritten(new_prefix.join(&path.suffix(i)))));
                        }
                    }
                }
                Ok(None)
            }

            Scope::EachSegment => {
                let mut result = PurePath::root();
                let mut any_matched = false;
                for part in path.parts() {
                    let segment = PurePath::from_parts([part.clone()]);
                    match self.apply_once(&segment)? {
                        None => result = result.child(part),
                        Some(Step::Ignored) => return Ok(Some(Step::Ignored)),
                        Some(Step::Rewritten(replacement)) => {
                            result = result.join(&replacement);
                            any_matched = true;
                        }
                    }
                }
                if any_matched {
                    Ok(Some(Step::Rewritten(result)))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Matches the source against one candidate (sub)path.
    fn apply_once(&self, candidate: &PurePath) -> Result<Option<Step>, TemplateError> {
        match &self.matcher {
            Matcher::Literal(source) => {
                if candidate != source {
                    return Ok(None);
                }
                Ok(Some(self.produce(candidate, None)?))
            }
            Matcher::Pattern(regex) => {
                let text = candidate.parts().join("/");
                match regex.captures(&text) {
                    None => Ok(None),
                    Some(caps) => Ok(Some(self.produce(candidate, Some(&caps))?)),
                }
            }
        }
    }

    fn produce(
        &self,
        candidate: &PurePath,
        caps: Option<&regex::Captures<'_>>,
    ) -> Result<Step, TemplateError> {
        match &self.target {
            Target::Ignore => Ok(Step::Ignored),
            Target::Identity => Ok(Step::Rewritten(candidate.clone())),
            Target::Path(path) => Ok(Step::Rewritten(path.clone())),
            Target::Template(template) => {
                // produce() is only reached with captures for pattern matchers
                let caps = caps.expect("template target without a regex match");
                let rendered = template.render(caps)?;
                Ok(Step::Rewritten(PurePath::parse(&rendered)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(left: &str, kind: ArrowKind, right: RightSide) -> Transformation {
        Transformation::compile(&Rule {
            left: left.to_string(),
            left_column: 0,
            kind,
            head: ArrowHead::Normal,
            right,
            line_nr: 1,
        })
        .unwrap()
    }

    fn rewritten(step: Option<Step>) -> PurePath {
        match step {
            Some(Step::Rewritten(p)) => p,
            other => panic!("expected a rewrite, got {:?}", other),
        }
    }

    #[test]
    fn test_exact_matches_whole_path_only() {
        let tf = compile(
            "a/b",
            ArrowKind::Exact,
            RightSide::Literal("x".to_string()),
        );
        assert_eq!(
            rewritten(tf.apply(&PurePath::parse("a/b")).unwrap()),
            PurePath::parse("x")
        );
        assert_eq!(tf.apply(&PurePath::parse("a/b/c")).unwrap(), None);
        assert_eq!(tf.apply(&PurePath::parse("a")).unwrap(), None);
    }

    #[test]
    fn test_basic_matches_multi_segment_prefix() {
        let tf = compile(
            "a/b",
            ArrowKind::Basic,
            RightSide::Literal("x".to_string()),
        );
        assert_eq!(
            rewritten(tf.apply(&PurePath::parse("a/b/c/d")).unwrap()),
            PurePath::parse("x/c/d")
        );
        assert_eq!(
            rewritten(tf.apply(&PurePath::parse("a/b")).unwrap()),
            PurePath::parse("x")
        );
        assert_eq!(tf.apply(&PurePath::parse("a/x/b")).unwrap(), None);
    }

    #[test]
    fn test_name_rewrites_each_matching_segment() {
        let tf = compile(
            "old",
            ArrowKind::Name,
            RightSide::Literal("new".to_string()),
        );
        assert_eq!(
            rewritten(tf.apply(&PurePath::parse("old/a/old")).unwrap()),
            PurePath::parse("new/a/new")
        );
        assert_eq!(tf.apply(&PurePath::parse("a/b")).unwrap(), None);
    }

    #[test]
    fn test_name_segment_can_expand_to_multiple_segments() {
        let tf = compile(
            "old",
            ArrowKind::Name,
            RightSide::Literal("x/y".to_string()),
        );
        assert_eq!(
            rewritten(tf.apply(&PurePath::parse("a/old/b")).unwrap()),
            PurePath::parse("a/x/y/b")
        );
    }

    #[test]
    fn test_name_requires_single_segment_source() {
        let result = Transformation::compile(&Rule {
            left: "a/b".to_string(),
            left_column: 0,
            kind: ArrowKind::Name,
            head: ArrowHead::Normal,
            right: RightSide::Empty,
            line_nr: 3,
        });
        let err = result.unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.reason.contains("single name"));
    }

    #[test]
    fn test_ignore_target() {
        let tf = compile("junk", ArrowKind::Basic, RightSide::Ignore);
        assert_eq!(
            tf.apply(&PurePath::parse("junk/file")).unwrap(),
            Some(Step::Ignored)
        );
    }

    #[test]
    fn test_identity_target() {
        let tf = compile("keep", ArrowKind::Exact, RightSide::Empty);
        assert_eq!(
            rewritten(tf.apply(&PurePath::parse("keep")).unwrap()),
            PurePath::parse("keep")
        );
    }

    #[test]
    fn test_regex_prefix_with_template() {
        let tf = compile(
            "f(oo+)/be?ar",
            ArrowKind::Re,
            RightSide::Literal("B{g1.upper()}H/fear".to_string()),
        );
        assert_eq!(
            rewritten(tf.apply(&PurePath::parse("fooooo/bear")).unwrap()),
            PurePath::parse("BOOOOOH/fear")
        );
        assert_eq!(
            rewritten(tf.apply(&PurePath::parse("foo/bar/baz")).unwrap()),
            PurePath::parse("BOOH/fear/baz")
        );
    }

    #[test]
    fn test_exact_regex_does_not_match_prefix() {
        let tf = compile(
            "f(oo+)/be?ar",
            ArrowKind::ExactRe,
            RightSide::Literal("B{g1.upper()}H/fear".to_string()),
        );
        assert_eq!(tf.apply(&PurePath::parse("foo/bar/baz")).unwrap(), None);
        assert_eq!(
            rewritten(tf.apply(&PurePath::parse("foo/bar")).unwrap()),
            PurePath::parse("BOOH/fear")
        );
    }

    #[test]
    fn test_name_regex_replaces_matched_segments_only() {
        let tf = compile(
            "tut_(\\d+)",
            ArrowKind::NameRe,
            RightSide::Literal("Tutorial {i1:02}".to_string()),
        );
        assert_eq!(
            rewritten(tf.apply(&PurePath::parse("tut_3/sheet")).unwrap()),
            PurePath::parse("Tutorial 03/sheet")
        );
    }

    #[test]
    fn test_regex_is_anchored() {
        let tf = compile("b", ArrowKind::NameRe, RightSide::Literal("x".to_string()));
        // "abc" contains 'b' but the segment as a whole does not match
        assert_eq!(tf.apply(&PurePath::parse("abc")).unwrap(), None);
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let result = Transformation::compile(&Rule {
            left: "f(oo".to_string(),
            left_column: 0,
            kind: ArrowKind::Re,
            head: ArrowHead::Normal,
            right: RightSide::Empty,
            line_nr: 1,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_template_error_propagates() {
        let tf = compile(
            "a(b)?c",
            ArrowKind::ExactRe,
            RightSide::Literal("{g1}".to_string()),
        );
        // Group 1 did not participate in the match
        assert!(tf.apply(&PurePath::parse("ac")).is_err());
    }
}
