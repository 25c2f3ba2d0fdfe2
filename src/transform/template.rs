//! Target templates for regex arrows
//!
//! The right side of a regex rule is a format template evaluated over the
//! capture groups of the match. Capture `n` is exposed as `g<n>` (the matched
//! text), `i<n>` (only defined if the text parses as an integer) and `f<n>`
//! (only if it parses as a float); named groups are exposed under their own
//! name, and `g0` is the entire match.
//!
//! Placeholders support a small, whitelisted expression grammar instead of a
//! general interpreter: attribute-style method calls (`upper()`, `lower()`,
//! `strip()`, `replace('a', 'b')`) and a `:` format spec with width and zero
//! padding for numeric variables. Referencing a group that was not captured is
//! a configuration error, not a per-path error.

use regex::Captures;
use thiserror::Error;

/// Errors arising from template syntax or evaluation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("invalid template at column {column}: {reason}")]
    Parse { column: usize, reason: String },

    #[error("variable '{name}' is not defined for this match")]
    UndefinedVariable { name: String },

    #[error("cannot call {method}() on a {kind} value")]
    BadMethod { method: String, kind: &'static str },

    #[error("{method}() expects {expected} argument(s), got {got}")]
    BadArity {
        method: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid format spec: {0}")]
    BadFormat(String),
}

/// A parsed template, compiled once per rule.
#[derive(Debug, Clone)]
pub struct Template {
    pieces: Vec<Piece>,
}

#[derive(Debug, Clone)]
enum Piece {
    Literal(String),
    Placeholder(Placeholder),
}

#[derive(Debug, Clone)]
struct Placeholder {
    var: String,
    calls: Vec<Call>,
    spec: Option<FormatSpec>,
}

#[derive(Debug, Clone)]
struct Call {
    method: String,
    args: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct FormatSpec {
    zero_pad: bool,
    width: usize,
}

/// A value during placeholder evaluation
#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Int(i64),
    Float(f64),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
        }
    }
}

impl Template {
    /// Parses a template string. `{{` and `}}` are literal braces.
    pub fn parse(input: &str) -> Result<Self, TemplateError> {
        let chars: Vec<char> = input.chars().collect();
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '{' if chars.get(i + 1) == Some(&'{') => {
                    literal.push('{');
                    i += 2;
                }
                '}' if chars.get(i + 1) == Some(&'}') => {
                    literal.push('}');
                    i += 2;
                }
                '{' => {
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    let (placeholder, next) = parse_placeholder(&chars, i + 1)?;
                    pieces.push(Piece::Placeholder(placeholder));
                    i = next;
                }
                '}' => {
                    return Err(TemplateError::Parse {
                        column: i,
                        reason: "unmatched '}'".to_string(),
                    });
                }
                c => {
                    literal.push(c);
                    i += 1;
                }
            }
        }

        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }

        Ok(Template { pieces })
    }

    /// Renders the template for one regex match.
    pub fn render(&self, caps: &Captures<'_>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(s) => out.push_str(s),
                Piece::Placeholder(p) => out.push_str(&eval_placeholder(p, caps)?),
            }
        }
        Ok(out)
    }
}

/// Parses a `{...}` placeholder starting just after the opening brace.
/// Returns the placeholder and the index just past the closing brace.
fn parse_placeholder(
    chars: &[char],
    start: usize,
) -> Result<(Placeholder, usize), TemplateError> {
    let mut i = start;

    let var = parse_ident(chars, &mut i).ok_or_else(|| TemplateError::Parse {
        column: i,
        reason: "expected variable name".to_string(),
    })?;

    let mut calls = Vec::new();
    while chars.get(i) == Some(&'.') {
        i += 1;
        let method = parse_ident(chars, &mut i).ok_or_else(|| TemplateError::Parse {
            column: i,
            reason: "expected method name after '.'".to_string(),
        })?;
        if chars.get(i) != Some(&'(') {
            return Err(TemplateError::Parse {
                column: i,
                reason: format!("expected '(' after '{}'", method),
            });
        }
        i += 1;
        let args = parse_args(chars, &mut i)?;
        calls.push(Call { method, args });
    }

    let spec = if chars.get(i) == Some(&':') {
        i += 1;
        Some(parse_format_spec(chars, &mut i)?)
    } else {
        None
    };

    if chars.get(i) != Some(&'}') {
        return Err(TemplateError::Parse {
            column: i,
            reason: "expected '}'".to_string(),
        });
    }

    Ok((Placeholder { var, calls, spec }, i + 1))
}

fn parse_ident(chars: &[char], i: &mut usize) -> Option<String> {
    let start = *i;
    while let Some(&c) = chars.get(*i) {
        if c.is_ascii_alphanumeric() || c == '_' {
            *i += 1;
        } else {
            break;
        }
    }
    if *i == start || chars[start].is_ascii_digit() {
        None
    } else {
        Some(chars[start..*i].iter().collect())
    }
}

/// Parses a `(...)` argument list, consuming the closing parenthesis.
/// Arguments are quoted strings separated by commas.
fn parse_args(chars: &[char], i: &mut usize) -> Result<Vec<String>, TemplateError> {
    let mut args = Vec::new();

    skip_spaces(chars, i);
    if chars.get(*i) == Some(&')') {
        *i += 1;
        return Ok(args);
    }

    loop {
        skip_spaces(chars, i);
        args.push(parse_quoted(chars, i)?);
        skip_spaces(chars, i);
        match chars.get(*i) {
            Some(',') => *i += 1,
            Some(')') => {
                *i += 1;
                return Ok(args);
            }
            _ => {
                return Err(TemplateError::Parse {
                    column: *i,
                    reason: "expected ',' or ')'".to_string(),
                });
            }
        }
    }
}

fn skip_spaces(chars: &[char], i: &mut usize) {
    while chars.get(*i) == Some(&' ') {
        *i += 1;
    }
}

fn parse_quoted(chars: &[char], i: &mut usize) -> Result<String, TemplateError> {
    let quote = match chars.get(*i) {
        Some(&c @ '\'') | Some(&c @ '"') => c,
        _ => {
            return Err(TemplateError::Parse {
                column: *i,
                reason: "expected quoted string argument".to_string(),
            });
        }
    };
    *i += 1;

    let mut out = String::new();
    while let Some(&c) = chars.get(*i) {
        *i += 1;
        if c == quote {
            return Ok(out);
        }
        if c == '\\' {
            match chars.get(*i) {
                Some(&'\\') => out.push('\\'),
                Some(&'\'') => out.push('\''),
                Some(&'"') => out.push('"'),
                Some(&'n') => out.push('\n'),
                Some(&'t') => out.push('\t'),
                Some(&other) => {
                    return Err(TemplateError::Parse {
                        column: *i,
                        reason: format!("unknown escape sequence '\\{}'", other),
                    });
                }
                None => break,
            }
            *i += 1;
        } else {
            out.push(c);
        }
    }

    Err(TemplateError::Parse {
        column: *i,
        reason: "unterminated string argument".to_string(),
    })
}

fn parse_format_spec(chars: &[char], i: &mut usize) -> Result<FormatSpec, TemplateError> {
    let zero_pad = chars.get(*i) == Some(&'0');
    if zero_pad {
        *i += 1;
    }

    let start = *i;
    while chars.get(*i).map_or(false, |c| c.is_ascii_digit()) {
        *i += 1;
    }
    if *i == start {
        return Err(TemplateError::BadFormat(
            "expected a width after ':'".to_string(),
        ));
    }

    let width: usize = chars[start..*i]
        .iter()
        .collect::<String>()
        .parse()
        .map_err(|_| TemplateError::BadFormat("width is not a number".to_string()))?;

    Ok(FormatSpec { zero_pad, width })
}

fn eval_placeholder(p: &Placeholder, caps: &Captures<'_>) -> Result<String, TemplateError> {
    let mut value = resolve_var(&p.var, caps)?;

    for call in &p.calls {
        value = apply_call(value, call)?;
    }

    format_value(&value, p.spec)
}

fn resolve_var(name: &str, caps: &Captures<'_>) -> Result<Value, TemplateError> {
    let undefined = || TemplateError::UndefinedVariable {
        name: name.to_string(),
    };

    // g<n>, i<n>, f<n> address numbered groups; anything else is a named group.
    if let Some(n) = numbered_group(name, 'g') {
        let text = caps.get(n).ok_or_else(undefined)?.as_str();
        return Ok(Value::Str(text.to_string()));
    }
    if let Some(n) = numbered_group(name, 'i') {
        let text = caps.get(n).ok_or_else(undefined)?.as_str();
        return text
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| undefined());
    }
    if let Some(n) = numbered_group(name, 'f') {
        let text = caps.get(n).ok_or_else(undefined)?.as_str();
        return text
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| undefined());
    }

    caps.name(name)
        .map(|m| Value::Str(m.as_str().to_string()))
        .ok_or_else(undefined)
}

fn numbered_group(name: &str, prefix: char) -> Option<usize> {
    let rest = name.strip_prefix(prefix)?;
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

fn apply_call(value: Value, call: &Call) -> Result<Value, TemplateError> {
    let s = match value {
        Value::Str(s) => s,
        other => {
            return Err(TemplateError::BadMethod {
                method: call.method.clone(),
                kind: other.kind(),
            });
        }
    };

    let expect_args = |n: usize| -> Result<(), TemplateError> {
        if call.args.len() == n {
            Ok(())
        } else {
            Err(TemplateError::BadArity {
                method: call.method.clone(),
                expected: n,
                got: call.args.len(),
            })
        }
    };

    match call.method.as_str() {
        "upper" => {
            expect_args(0)?;
            Ok(Value::Str(s.to_uppercase()))
        }
        "lower" => {
            expect_args(0)?;
            Ok(Value::Str(s.to_lowercase()))
        }
        "strip" => {
            expect_args(0)?;
            Ok(Value::Str(s.trim().to_string()))
        }
        "replace" => {
            expect_args(2)?;
            Ok(Value::Str(s.replace(&call.args[0], &call.args[1])))
        }
        other => Err(TemplateError::BadMethod {
            method: other.to_string(),
            kind: "string",
        }),
    }
}

fn format_value(value: &Value, spec: Option<FormatSpec>) -> Result<String, TemplateError> {
    let Some(spec) = spec else {
        return Ok(match value {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
        });
    };

    match value {
        Value::Int(i) if spec.zero_pad => Ok(format!("{:01$}", i, spec.width)),
        Value::Int(i) => Ok(format!("{:1$}", i, spec.width)),
        Value::Float(f) if spec.zero_pad => Ok(format!("{:01$}", f, spec.width)),
        Value::Float(f) => Ok(format!("{:1$}", f, spec.width)),
        Value::Str(_) if spec.zero_pad => Err(TemplateError::BadFormat(
            "zero padding only applies to numeric variables".to_string(),
        )),
        Value::Str(s) => Ok(format!("{:1$}", s, spec.width)),
    }
}
