//! Parser for transformation rule lines
//!
//! Grammar, one rule per line:
//!
//! ```text
//! RULE  = LEFT SPACE '-' NAME '-' HEAD (SPACE RIGHT)?
//! NAME  = '' | 'exact' | 'name' | 're' | 'exact-re' | 'name-re'
//! HEAD  = '>' | '>>'
//! LEFT  = STR | QUOTED_STR
//! RIGHT = STR | QUOTED_STR | '!'
//! ```
//!
//! Unquoted strings run until the next space. Quoted strings (single or
//! double quotes) support backslash escapes for segments that must contain a
//! space or a reserved character.

use crate::transform::rule::{ArrowHead, ArrowKind, RightSide, Rule};
use thiserror::Error;

/// A rule line that could not be parsed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("line {line}, column {column}: {reason}")]
pub struct RuleParseError {
    pub line: usize,
    pub column: usize,
    pub reason: String,
}

/// Cursor over a single rule line
struct Cursor {
    chars: Vec<char>,
    index: usize,
    line_nr: usize,
}

impl Cursor {
    fn new(line: &str, line_nr: usize) -> Self {
        Self {
            chars: line.chars().collect(),
            index: 0,
            line_nr,
        }
    }

    fn error(&self, reason: impl Into<String>) -> RuleParseError {
        RuleParseError {
            line: self.line_nr,
            column: self.index,
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn take(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.index += 1;
        Some(c)
    }

    fn expect(&mut self, expected: &str) -> Result<(), RuleParseError> {
        for want in expected.chars() {
            if self.peek() == Some(want) {
                self.index += 1;
            } else {
                return Err(self.error(format!("expected '{}'", expected)));
            }
        }
        Ok(())
    }

    /// Tries alternatives in order, resetting the cursor between attempts.
    fn one_of<T>(
        &mut self,
        parsers: &[fn(&mut Cursor) -> Result<T, RuleParseError>],
        description: &str,
    ) -> Result<T, RuleParseError> {
        for parser in parsers {
            let saved = self.index;
            match parser(self) {
                Ok(value) => return Ok(value),
                Err(_) => self.index = saved,
            }
        }
        Err(self.error(format!("expected {}", description)))
    }

    fn at_end(&self) -> bool {
        self.index >= self.chars.len()
    }
}

fn skip_spaces(cursor: &mut Cursor) {
    while cursor.peek() == Some(' ') {
        cursor.index += 1;
    }
}

fn expect_spaces(cursor: &mut Cursor) -> Result<(), RuleParseError> {
    if cursor.peek() != Some(' ') {
        return Err(cursor.error("expected a space"));
    }
    skip_spaces(cursor);
    Ok(())
}

/// Parses an unquoted string up to the next space.
fn parse_bare_str(cursor: &mut Cursor) -> Result<String, RuleParseError> {
    let mut result = String::new();
    while let Some(c) = cursor.peek() {
        if c == ' ' {
            break;
        }
        cursor.index += 1;
        result.push(c);
    }

    if result.is_empty() {
        return Err(cursor.error("expected a non-space character"));
    }
    Ok(result)
}

/// Parses a quoted string with backslash escapes.
fn parse_quoted_str(cursor: &mut Cursor) -> Result<String, RuleParseError> {
    let quote = match cursor.peek() {
        Some(c @ '\'') | Some(c @ '"') => c,
        _ => return Err(cursor.error("expected a quotation mark")),
    };
    cursor.index += 1;

    let mut result = String::new();
    while let Some(c) = cursor.take() {
        if c == quote {
            return Ok(result);
        }
        if c == '\\' {
            match cursor.take() {
                Some('\\') => result.push('\\'),
                Some('\'') => result.push('\''),
                Some('"') => result.push('"'),
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some(other) => {
                    return Err(cursor.error(format!("unknown escape sequence '\\{}'", other)));
                }
                None => break,
            }
        } else {
            result.push(c);
        }
    }

    Err(cursor.error("expected end of string literal"))
}

fn parse_left(cursor: &mut Cursor) -> Result<String, RuleParseError> {
    if matches!(cursor.peek(), Some('\'') | Some('"')) {
        parse_quoted_str(cursor)
    } else {
        parse_bare_str(cursor)
    }
}

fn parse_right(cursor: &mut Cursor) -> Result<RightSide, RuleParseError> {
    if matches!(cursor.peek(), Some('\'') | Some('"')) {
        // A quoted "!" is a literal path, not the ignore sentinel
        return Ok(RightSide::Literal(parse_quoted_str(cursor)?));
    }

    let text = parse_bare_str(cursor)?;
    if text == "!" {
        Ok(RightSide::Ignore)
    } else {
        Ok(RightSide::Literal(text))
    }
}

/// Parses the name between the arrow's dashes. Longer names first so that
/// `exact-re` is not consumed as `exact` plus garbage.
fn parse_arrow_kind(cursor: &mut Cursor) -> Result<ArrowKind, RuleParseError> {
    cursor.one_of(
        &[
            |c| c.expect("exact-re").map(|_| ArrowKind::ExactRe),
            |c| c.expect("exact").map(|_| ArrowKind::Exact),
            |c| c.expect("name-re").map(|_| ArrowKind::NameRe),
            |c| c.expect("name").map(|_| ArrowKind::Name),
            |c| c.expect("re").map(|_| ArrowKind::Re),
            |_| Ok(ArrowKind::Basic),
        ],
        "an arrow name",
    )
}

fn parse_arrow_head(cursor: &mut Cursor) -> Result<ArrowHead, RuleParseError> {
    cursor.one_of(
        &[
            |c| c.expect(">>").map(|_| ArrowHead::Sequence),
            |c| c.expect(">").map(|_| ArrowHead::Normal),
        ],
        "'>' or '>>'",
    )
}

/// Parses a full rule line.
pub fn parse_rule(line: &str, line_nr: usize) -> Result<Rule, RuleParseError> {
    let mut cursor = Cursor::new(line, line_nr);

    skip_spaces(&mut cursor);
    let left_column = cursor.index;
    let left = parse_left(&mut cursor)?;

    expect_spaces(&mut cursor)?;

    cursor.expect("-")?;
    let kind = parse_arrow_kind(&mut cursor)?;
    cursor.expect("-")?;
    let head = parse_arrow_head(&mut cursor)?;

    let saved = cursor.index;
    skip_spaces(&mut cursor);
    let right = if cursor.at_end() {
        RightSide::Empty
    } else {
        cursor.index = saved;
        expect_spaces(&mut cursor)?;
        let right = parse_right(&mut cursor)?;
        skip_spaces(&mut cursor);
        if !cursor.at_end() {
            return Err(cursor.error("expected end of line"));
        }
        right
    };

    Ok(Rule {
        left,
        left_column,
        kind,
        head,
        right,
        line_nr,
    })
}
