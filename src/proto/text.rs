//! # Protobuf Text Format
//!
//! Renders [`Message`] trees as `.prototxt` text and parses text back into
//! an untyped [`TextMessage`] tree. Field names are resolved later by the
//! layer that owns the message, so the parser needs no schema.

use super::{Message, ProtoError, Value};
use std::str::FromStr;

// --- Rendering ---

/// Renders a message with two-space indentation, one field per line.
pub fn render(message: &Message) -> String {
    let mut out = String::new();
    render_into(message, 0, &mut out);
    out
}

fn render_into(message: &Message, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    for field in message.fields() {
        match &field.value {
            Value::Message(inner) => {
                out.push_str(&format!("{}{} {{\n", pad, field.name));
                render_into(inner, depth + 1, out);
                out.push_str(&format!("{}}}\n", pad));
            }
            Value::PackedFloat(values) => {
                for v in values {
                    out.push_str(&format!("{}{}: {}\n", pad, field.name, format_float(*v)));
                }
            }
            Value::PackedInt64(values) => {
                for v in values {
                    out.push_str(&format!("{}{}: {}\n", pad, field.name, v));
                }
            }
            scalar => {
                out.push_str(&format!("{}{}: {}\n", pad, field.name, scalar_text(scalar)));
            }
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Float(v) => format_float(*v),
        Value::Str(s) => quote(s),
        Value::Enum(ident, _) => ident.to_string(),
        // Aggregates are handled by the caller.
        Value::Message(_) | Value::PackedFloat(_) | Value::PackedInt64(_) => String::new(),
    }
}

fn format_float(v: f32) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v.is_infinite() {
        let text = if v > 0.0 { "inf" } else { "-inf" };
        text.to_string()
    } else {
        v.to_string()
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\{:03o}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// --- Parsed Tree ---

#[derive(Debug, Clone, PartialEq)]
pub enum TextScalar {
    /// A quoted string, escapes resolved.
    Str(String),
    /// A bare token: number, bool or enum identifier.
    Token(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextValue {
    Scalar(TextScalar),
    Message(TextMessage),
}

/// A parsed text-format message. Fields keep their source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextMessage {
    fields: Vec<(String, TextValue)>,
}

fn invalid(field: &str, value: impl Into<String>) -> ProtoError {
    ProtoError::InvalidValue {
        field: field.to_string(),
        value: value.into(),
    }
}

impl TextMessage {
    /// Parses a whole document as the body of one message.
    pub fn parse(text: &str) -> Result<Self, ProtoError> {
        let tokens = tokenize(text)?;
        let mut parser = Parser { tokens, pos: 0 };
        parser.parse_message(0)
    }

    pub fn fields(&self) -> &[(String, TextValue)] {
        &self.fields
    }

    /// All values of field `name`, in order.
    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a TextValue> + 'a {
        self.fields
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// The value of a singular field. When repeated, the last one wins.
    pub fn get(&self, name: &str) -> Option<&TextValue> {
        self.fields.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn message(&self, name: &str) -> Option<&TextMessage> {
        match self.get(name) {
            Some(TextValue::Message(m)) => Some(m),
            _ => None,
        }
    }

    pub fn messages<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a TextMessage> + 'a {
        self.all(name).filter_map(|v| match v {
            TextValue::Message(m) => Some(m),
            TextValue::Scalar(_) => None,
        })
    }

    /// A quoted string field.
    pub fn string(&self, name: &str) -> Result<Option<String>, ProtoError> {
        self.get(name).map(|v| string_value(name, v)).transpose()
    }

    /// A repeated string field.
    pub fn strings(&self, name: &str) -> Result<Vec<String>, ProtoError> {
        self.all(name).map(|v| string_value(name, v)).collect()
    }

    /// A bare token field, for enum identifiers.
    pub fn token(&self, name: &str) -> Result<Option<&str>, ProtoError> {
        match self.get(name) {
            None => Ok(None),
            Some(TextValue::Scalar(TextScalar::Token(t))) => Ok(Some(t.as_str())),
            Some(_) => Err(invalid(name, "expected a bare value")),
        }
    }

    /// A numeric field parsed into `T`.
    pub fn number<T: FromStr>(&self, name: &str) -> Result<Option<T>, ProtoError> {
        self.token(name)?
            .map(|t| t.parse::<T>().map_err(|_| invalid(name, t)))
            .transpose()
    }

    /// A repeated numeric field.
    pub fn numbers<T: FromStr>(&self, name: &str) -> Result<Vec<T>, ProtoError> {
        self.all(name)
            .map(|v| match v {
                TextValue::Scalar(TextScalar::Token(t)) => t.parse::<T>().map_err(|_| invalid(name, t.as_str())),
                _ => Err(invalid(name, "expected a number")),
            })
            .collect()
    }

    /// A bool field: `true`/`false` in any case, `t`/`f`, or `1`/`0`.
    pub fn boolean(&self, name: &str) -> Result<Option<bool>, ProtoError> {
        self.token(name)?
            .map(|t| match t {
                "true" | "True" | "t" | "1" => Ok(true),
                "false" | "False" | "f" | "0" => Ok(false),
                other => Err(invalid(name, other)),
            })
            .transpose()
    }
}

fn string_value(name: &str, value: &TextValue) -> Result<String, ProtoError> {
    match value {
        TextValue::Scalar(TextScalar::Str(s)) => Ok(s.clone()),
        _ => Err(invalid(name, "expected a quoted string")),
    }
}

// --- Tokenizer ---

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Open,
    Close,
    Colon,
    Sep,
    Str(String),
    Word(String),
}

#[derive(Debug, Clone)]
struct Spanned {
    tok: Tok,
    line: usize,
    column: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '+')
}

fn tokenize(text: &str) -> Result<Vec<Spanned>, ProtoError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let (mut i, mut line, mut column) = (0usize, 1usize, 1usize);

    let syntax = |line: usize, column: usize, message: &str| ProtoError::Syntax {
        line,
        column,
        message: message.to_string(),
    };

    while i < chars.len() {
        let c = chars[i];
        let (start_line, start_col) = (line, column);
        match c {
            '\n' => {
                i += 1;
                line += 1;
                column = 1;
                continue;
            }
            c if c.is_whitespace() => {
                i += 1;
                column += 1;
                continue;
            }
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '{' | '<' => tokens.push(Spanned { tok: Tok::Open, line, column }),
            '}' | '>' => tokens.push(Spanned { tok: Tok::Close, line, column }),
            ':' => tokens.push(Spanned { tok: Tok::Colon, line, column }),
            ',' | ';' => tokens.push(Spanned { tok: Tok::Sep, line, column }),
            '"' | '\'' => {
                let quote_char = c;
                let mut value = String::new();
                i += 1;
                column += 1;
                loop {
                    let Some(&ch) = chars.get(i) else {
                        return Err(syntax(start_line, start_col, "unterminated string"));
                    };
                    if ch == '\n' {
                        return Err(syntax(start_line, start_col, "newline in string"));
                    }
                    i += 1;
                    column += 1;
                    if ch == quote_char {
                        break;
                    }
                    if ch != '\\' {
                        value.push(ch);
                        continue;
                    }
                    let Some(&esc) = chars.get(i) else {
                        return Err(syntax(line, column, "dangling escape"));
                    };
                    i += 1;
                    column += 1;
                    match esc {
                        'n' => value.push('\n'),
                        'r' => value.push('\r'),
                        't' => value.push('\t'),
                        'a' => value.push('\x07'),
                        'b' => value.push('\x08'),
                        'f' => value.push('\x0c'),
                        'v' => value.push('\x0b'),
                        '\\' | '\'' | '"' | '?' => value.push(esc),
                        'x' => {
                            let mut code = 0u32;
                            let mut digits = 0;
                            while digits < 2 {
                                match chars.get(i).and_then(|d| d.to_digit(16)) {
                                    Some(d) => code = code * 16 + d,
                                    None => break,
                                }
                                i += 1;
                                column += 1;
                                digits += 1;
                            }
                            if digits == 0 {
                                return Err(syntax(line, column, "empty \\x escape"));
                            }
                            value.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                        }
                        '0'..='7' => {
                            let mut code = esc.to_digit(8).unwrap_or(0);
                            let mut digits = 1;
                            while digits < 3 {
                                match chars.get(i).and_then(|d| d.to_digit(8)) {
                                    Some(d) => code = code * 8 + d,
                                    None => break,
                                }
                                i += 1;
                                column += 1;
                                digits += 1;
                            }
                            value.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                        }
                        _ => return Err(syntax(line, column, "unknown escape sequence")),
                    }
                }
                tokens.push(Spanned {
                    tok: Tok::Str(value),
                    line: start_line,
                    column: start_col,
                });
                continue;
            }
            c if is_word_char(c) => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                column += i - start;
                tokens.push(Spanned {
                    tok: Tok::Word(chars[start..i].iter().collect()),
                    line: start_line,
                    column: start_col,
                });
                continue;
            }
            other => {
                return Err(syntax(line, column, &format!("unexpected character '{}'", other)));
            }
        }
        // single-character punctuation
        i += 1;
        column += 1;
    }
    Ok(tokens)
}

// --- Parser ---

/// Deepest `{ ... }` nesting accepted. Caffe nets need three or four levels.
const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> Option<Spanned> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|s| &s.tok)
    }

    fn error_at(&self, spanned: Option<&Spanned>, message: &str) -> ProtoError {
        let (line, column) = spanned
            .or_else(|| self.tokens.last())
            .map(|s| (s.line, s.column))
            .unwrap_or((1, 1));
        ProtoError::Syntax {
            line,
            column,
            message: message.to_string(),
        }
    }

    fn parse_message(&mut self, depth: usize) -> Result<TextMessage, ProtoError> {
        let nested = depth > 0;
        let mut message = TextMessage::default();
        loop {
            let Some(token) = self.next() else {
                if nested {
                    return Err(self.error_at(None, "unexpected end of input, expected '}'"));
                }
                return Ok(message);
            };
            let name = match token.tok {
                Tok::Close if nested => return Ok(message),
                Tok::Word(ref name) => name.clone(),
                _ => return Err(self.error_at(Some(&token), "expected a field name")),
            };

            let mut value_tok = self.next();
            let had_colon = matches!(value_tok.as_ref().map(|s| &s.tok), Some(Tok::Colon));
            if had_colon {
                value_tok = self.next();
            }
            let value = match value_tok {
                Some(ref open @ Spanned { tok: Tok::Open, .. }) => {
                    if depth >= MAX_NESTING {
                        return Err(self.error_at(Some(open), "messages nested too deeply"));
                    }
                    TextValue::Message(self.parse_message(depth + 1)?)
                }
                Some(Spanned { tok: Tok::Str(mut s), .. }) if had_colon => {
                    // Adjacent string literals are concatenated.
                    while let Some(Tok::Str(more)) = self.peek() {
                        s.push_str(more);
                        self.pos += 1;
                    }
                    TextValue::Scalar(TextScalar::Str(s))
                }
                Some(Spanned { tok: Tok::Word(w), .. }) if had_colon => TextValue::Scalar(TextScalar::Token(w)),
                other => {
                    let message = format!("expected a value for field '{}'", name);
                    return Err(self.error_at(other.as_ref(), &message));
                }
            };
            message.fields.push((name, value));

            if matches!(self.peek(), Some(Tok::Sep)) {
                self.pos += 1;
            }
        }
    }
}
