// nbreport-core/src/literal.rs
// ============================================================================
// Module: Literal Parser
// Description: Strict literal-only parser for untrusted parameter values.
// Purpose: Turn request strings into typed values without evaluating
//          arbitrary expressions.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Request parameters arrive as raw strings and are interpreted as literals
//! when possible: numbers, quoted strings, `True`/`False`/`None`, lists,
//! tuples, and dicts, nested up to a depth limit. Anything else — function
//! calls, identifiers, attribute access, arithmetic — is a parse error, and
//! the caller falls back to the raw string form. This gives templates typed
//! parameters while keeping expression evaluation off the table.
//!
//! ### Grammar (informal)
//! - **Scalars**: `4`, `-1.5`, `'text'`, `"text"`, `True`, `False`, `None`
//! - **Sequences**: `[1, 2]`, `(1, 2)` — both produce lists; `(x)` without a
//!   comma is plain grouping and yields `x`
//! - **Maps**: `{'a': 1}` with literal keys; `{1, 2}` set syntax yields a list
//! - Numbers are decimal only; trailing input after a complete literal is an
//!   error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum accepted literal input size in bytes.
const MAX_LITERAL_INPUT_BYTES: usize = 64 * 1024;
/// Maximum supported nesting depth for containers.
const MAX_LITERAL_NESTING: usize = 32;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while parsing a literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiteralError {
    /// Input was empty or contained only whitespace.
    #[error("input is empty")]
    EmptyInput,
    /// Input exceeded the configured size limit.
    #[error("input exceeds size limit: {actual_bytes} bytes (max {max_bytes})")]
    InputTooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual input length in bytes.
        actual_bytes: usize,
    },
    /// Containers nested deeper than the limit.
    #[error("nesting exceeds limit {max_depth} at {position}")]
    NestingTooDeep {
        /// Maximum allowed nesting depth.
        max_depth: usize,
        /// Byte offset where the limit was exceeded.
        position: usize,
    },
    /// A character that cannot start or continue the expected construct.
    #[error("unexpected character `{found}` at {position}, expected {expected}")]
    UnexpectedCharacter {
        /// Human-friendly expectation summary.
        expected: &'static str,
        /// The character that was seen.
        found: char,
        /// Byte offset in the input.
        position: usize,
    },
    /// An identifier other than `True`, `False`, or `None`.
    #[error("`{name}` at {position} is not a literal")]
    NotALiteral {
        /// The offending identifier.
        name: String,
        /// Byte offset in the input.
        position: usize,
    },
    /// Numeric literal failed to parse.
    #[error("invalid number `{raw}` at {position}")]
    InvalidNumber {
        /// The raw numeric text.
        raw: String,
        /// Byte offset in the input.
        position: usize,
    },
    /// A string literal ran past the end of input.
    #[error("unterminated string starting at {position}")]
    UnterminatedString {
        /// Byte offset of the opening quote.
        position: usize,
    },
    /// Input continued after a complete literal.
    #[error("unexpected trailing input at {position}")]
    TrailingInput {
        /// Byte offset where trailing input begins.
        position: usize,
    },
}

// ============================================================================
// SECTION: Public API
// ============================================================================

/// Parses a strict literal into a JSON value (`None` maps to `null`).
///
/// # Errors
///
/// Returns [`LiteralError`] when the input is not a pure literal.
pub fn parse_literal(input: &str) -> Result<Value, LiteralError> {
    if input.len() > MAX_LITERAL_INPUT_BYTES {
        return Err(LiteralError::InputTooLarge {
            max_bytes: MAX_LITERAL_INPUT_BYTES,
            actual_bytes: input.len(),
        });
    }
    let mut parser = Parser::new(input);
    parser.skip_whitespace();
    if parser.at_end() {
        return Err(LiteralError::EmptyInput);
    }
    let value = parser.parse_value(0)?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(LiteralError::TrailingInput {
            position: parser.offset,
        });
    }
    Ok(value)
}

/// Returns the template-facing type name for a parsed literal.
#[must_use]
pub fn literal_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "None",
        Value::Bool(_) => "bool",
        Value::Number(number) => {
            if number.is_i64() || number.is_u64() {
                "int"
            } else {
                "float"
            }
        }
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Recursive-descent parser over the literal grammar.
struct Parser<'a> {
    /// Source input.
    input: &'a str,
    /// Current byte offset.
    offset: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser positioned at the start of the input.
    const fn new(input: &'a str) -> Self {
        Self {
            input,
            offset: 0,
        }
    }

    /// Returns whether the parser reached the end of input.
    fn at_end(&self) -> bool {
        self.offset >= self.input.len()
    }

    /// Peeks at the next character without consuming it.
    fn peek(&self) -> Option<char> {
        self.input[self.offset..].chars().next()
    }

    /// Consumes one character.
    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.offset += ch.len_utf8();
        Some(ch)
    }

    /// Skips ASCII whitespace.
    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_whitespace() {
                self.offset += 1;
            } else {
                break;
            }
        }
    }

    /// Parses one literal value.
    fn parse_value(&mut self, depth: usize) -> Result<Value, LiteralError> {
        if depth >= MAX_LITERAL_NESTING {
            return Err(LiteralError::NestingTooDeep {
                max_depth: MAX_LITERAL_NESTING,
                position: self.offset,
            });
        }
        let Some(ch) = self.peek() else {
            return Err(LiteralError::UnexpectedCharacter {
                expected: "a literal",
                found: '\0',
                position: self.offset,
            });
        };
        match ch {
            '[' => self.parse_sequence(']', depth),
            '(' => self.parse_group(depth),
            '{' => self.parse_map_or_set(depth),
            '\'' | '"' => self.parse_string(),
            _ if ch.is_ascii_alphabetic() || ch == '_' => self.parse_keyword(),
            _ if ch.is_ascii_digit() || ch == '+' || ch == '-' || ch == '.' => self.parse_number(),
            _ => Err(LiteralError::UnexpectedCharacter {
                expected: "a literal",
                found: ch,
                position: self.offset,
            }),
        }
    }

    /// Parses a bracketed sequence into a list.
    fn parse_sequence(&mut self, close: char, depth: usize) -> Result<Value, LiteralError> {
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(Value::Array(items));
            }
            items.push(self.parse_value(depth + 1)?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(ch) if ch == close => {}
                Some(ch) => {
                    return Err(LiteralError::UnexpectedCharacter {
                        expected: "`,` or a closing bracket",
                        found: ch,
                        position: self.offset,
                    });
                }
                None => {
                    return Err(LiteralError::UnexpectedCharacter {
                        expected: "`,` or a closing bracket",
                        found: '\0',
                        position: self.offset,
                    });
                }
            }
        }
    }

    /// Parses a parenthesized construct: tuple syntax, or plain grouping
    /// when exactly one element appears without a trailing comma.
    fn parse_group(&mut self, depth: usize) -> Result<Value, LiteralError> {
        self.bump();
        let mut items = Vec::new();
        let mut saw_comma = false;
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.bump();
                break;
            }
            items.push(self.parse_value(depth + 1)?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    saw_comma = true;
                    self.bump();
                }
                Some(')') => {}
                Some(ch) => {
                    return Err(LiteralError::UnexpectedCharacter {
                        expected: "`,` or `)`",
                        found: ch,
                        position: self.offset,
                    });
                }
                None => {
                    return Err(LiteralError::UnexpectedCharacter {
                        expected: "`,` or `)`",
                        found: '\0',
                        position: self.offset,
                    });
                }
            }
        }
        if items.len() == 1 && !saw_comma {
            Ok(items.remove(0))
        } else {
            Ok(Value::Array(items))
        }
    }

    /// Parses `{...}` as a dict, or as set syntax yielding a list.
    fn parse_map_or_set(&mut self, depth: usize) -> Result<Value, LiteralError> {
        self.bump();
        self.skip_whitespace();
        if self.peek() == Some('}') {
            self.bump();
            return Ok(Value::Object(Map::new()));
        }
        let first = self.parse_value(depth + 1)?;
        self.skip_whitespace();
        if self.peek() == Some(':') {
            self.bump();
            self.parse_map_rest(first, depth)
        } else {
            self.parse_set_rest(first, depth)
        }
    }

    /// Parses the remainder of a dict after the first key and `:`.
    fn parse_map_rest(&mut self, first_key: Value, depth: usize) -> Result<Value, LiteralError> {
        let mut map = Map::new();
        self.skip_whitespace();
        let first_value = self.parse_value(depth + 1)?;
        map.insert(key_text(first_key), first_value);
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('}') => {
                    self.bump();
                    return Ok(Value::Object(map));
                }
                Some(',') => {
                    self.bump();
                    self.skip_whitespace();
                    if self.peek() == Some('}') {
                        self.bump();
                        return Ok(Value::Object(map));
                    }
                    let key = self.parse_value(depth + 1)?;
                    self.skip_whitespace();
                    if self.peek() == Some(':') {
                        self.bump();
                    } else {
                        return Err(LiteralError::UnexpectedCharacter {
                            expected: "`:`",
                            found: self.peek().unwrap_or('\0'),
                            position: self.offset,
                        });
                    }
                    self.skip_whitespace();
                    let value = self.parse_value(depth + 1)?;
                    map.insert(key_text(key), value);
                }
                found => {
                    return Err(LiteralError::UnexpectedCharacter {
                        expected: "`,` or `}`",
                        found: found.unwrap_or('\0'),
                        position: self.offset,
                    });
                }
            }
        }
    }

    /// Parses the remainder of set syntax after its first element.
    fn parse_set_rest(&mut self, first: Value, depth: usize) -> Result<Value, LiteralError> {
        let mut items = vec![first];
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('}') => {
                    self.bump();
                    return Ok(Value::Array(items));
                }
                Some(',') => {
                    self.bump();
                    self.skip_whitespace();
                    if self.peek() == Some('}') {
                        self.bump();
                        return Ok(Value::Array(items));
                    }
                    items.push(self.parse_value(depth + 1)?);
                }
                found => {
                    return Err(LiteralError::UnexpectedCharacter {
                        expected: "`,` or `}`",
                        found: found.unwrap_or('\0'),
                        position: self.offset,
                    });
                }
            }
        }
    }

    /// Parses a quoted string with common escape sequences.
    fn parse_string(&mut self) -> Result<Value, LiteralError> {
        let start = self.offset;
        let Some(quote) = self.bump() else {
            return Err(LiteralError::UnterminatedString {
                position: start,
            });
        };
        let mut text = String::new();
        loop {
            match self.bump() {
                Some(ch) if ch == quote => return Ok(Value::String(text)),
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('0') => text.push('\0'),
                    Some(ch @ ('\\' | '\'' | '"')) => text.push(ch),
                    // Unrecognized escapes keep the backslash, as the source
                    // language does.
                    Some(ch) => {
                        text.push('\\');
                        text.push(ch);
                    }
                    None => {
                        return Err(LiteralError::UnterminatedString {
                            position: start,
                        });
                    }
                },
                Some(ch) => text.push(ch),
                None => {
                    return Err(LiteralError::UnterminatedString {
                        position: start,
                    });
                }
            }
        }
    }

    /// Parses `True`, `False`, or `None`.
    fn parse_keyword(&mut self) -> Result<Value, LiteralError> {
        let start = self.offset;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.offset += ch.len_utf8();
            } else {
                break;
            }
        }
        let name = &self.input[start..self.offset];
        match name {
            "True" => Ok(Value::Bool(true)),
            "False" => Ok(Value::Bool(false)),
            "None" => Ok(Value::Null),
            _ => Err(LiteralError::NotALiteral {
                name: name.to_string(),
                position: start,
            }),
        }
    }

    /// Parses a decimal integer or float.
    fn parse_number(&mut self) -> Result<Value, LiteralError> {
        let start = self.offset;
        if matches!(self.peek(), Some('+' | '-')) {
            self.bump();
        }
        let mut previous = ' ';
        while let Some(ch) = self.peek() {
            let accepted = ch.is_ascii_digit()
                || ch == '.'
                || ch == 'e'
                || ch == 'E'
                || (matches!(ch, '+' | '-') && matches!(previous, 'e' | 'E'));
            if !accepted {
                break;
            }
            previous = ch;
            self.offset += 1;
        }
        let raw = &self.input[start..self.offset];
        if let Ok(int) = raw.parse::<i64>() {
            return Ok(Value::Number(Number::from(int)));
        }
        if let Ok(float) = raw.parse::<f64>() {
            if let Some(number) = Number::from_f64(float) {
                return Ok(Value::Number(number));
            }
        }
        Err(LiteralError::InvalidNumber {
            raw: raw.to_string(),
            position: start,
        })
    }
}

/// Converts a parsed dict key into its JSON object key text.
fn key_text(key: Value) -> String {
    match key {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
