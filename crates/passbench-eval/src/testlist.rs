//! Decoding of the doubly-encoded `test_list` field into assertion statements.
//!
//! Reference datasets store the assertion list as a Python-style literal,
//! sometimes wrapped in a second layer of string encoding (a literal
//! string that itself decodes to the list). The reader here covers the
//! literal forms those datasets actually contain: quoted strings with
//! escapes, lists, tuples, numbers, booleans and None.

use thiserror::Error;

/// Failure to decode a `test_list` value. Terminal for one entry only;
/// the batch records PARSE_FAIL and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TestListError {
    #[error("invalid literal at offset {pos}: {reason}")]
    Invalid { pos: usize, reason: String },

    #[error("test_list parsed to non-list")]
    NotAList,
}

/// Parse the raw `test_list` field into ordered assertion statements.
///
/// Decodes the outer literal; if that yields a string, decodes it again.
/// The final value must be a list or tuple; every element is coerced to
/// its string form.
pub fn parse_tests(raw: &str) -> Result<Vec<String>, TestListError> {
    let value = match parse_literal(raw)? {
        Literal::Str(inner) => parse_literal(&inner)?,
        other => other,
    };
    match value {
        Literal::List(items) | Literal::Tuple(items) => {
            Ok(items.into_iter().map(|item| item.coerce_string()).collect())
        }
        _ => Err(TestListError::NotAList),
    }
}

/// A decoded Python-style literal value.
#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
}

impl Literal {
    /// The `str()` form of the value. String elements pass through
    /// unquoted; containers render their elements repr-style.
    fn coerce_string(&self) -> String {
        match self {
            Literal::Str(s) => s.clone(),
            other => other.repr(),
        }
    }

    fn repr(&self) -> String {
        match self {
            Literal::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Literal::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.repr()).collect();
                format!("[{}]", parts.join(", "))
            }
            Literal::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.repr()).collect();
                if parts.len() == 1 {
                    format!("({},)", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }
            Literal::Int(v) => v.to_string(),
            Literal::Float(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    format!("{:.1}", v)
                } else {
                    v.to_string()
                }
            }
            Literal::Bool(true) => "True".to_string(),
            Literal::Bool(false) => "False".to_string(),
            Literal::None => "None".to_string(),
        }
    }
}

fn parse_literal(input: &str) -> Result<Literal, TestListError> {
    let mut reader = Reader::new(input);
    reader.skip_whitespace();
    let value = reader.parse_value()?;
    reader.skip_whitespace();
    if reader.peek().is_some() {
        return Err(reader.error("trailing characters after literal"));
    }
    Ok(value)
}

struct Reader {
    chars: Vec<char>,
    pos: usize,
}

impl Reader {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn error(&self, reason: &str) -> TestListError {
        TestListError::Invalid {
            pos: self.pos,
            reason: reason.to_string(),
        }
    }

    fn parse_value(&mut self) -> Result<Literal, TestListError> {
        match self.peek() {
            Some('\'') | Some('"') => self.parse_string(),
            Some('[') => {
                let items = self.parse_sequence('[', ']')?;
                Ok(Literal::List(items))
            }
            Some('(') => {
                let items = self.parse_sequence('(', ')')?;
                Ok(Literal::Tuple(items))
            }
            Some(c) if c.is_ascii_digit() || c == '+' || c == '-' || c == '.' => {
                self.parse_number()
            }
            Some(c) if c.is_alphabetic() => self.parse_keyword(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_string(&mut self) -> Result<Literal, TestListError> {
        let quote = match self.bump() {
            Some(q) => q,
            None => return Err(self.error("unexpected end of input")),
        };
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal")),
                Some(c) if c == quote => return Ok(Literal::Str(out)),
                Some('\\') => self.parse_escape(&mut out)?,
                Some(c) => out.push(c),
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<(), TestListError> {
        match self.bump() {
            None => Err(self.error("unterminated escape sequence")),
            Some('n') => {
                out.push('\n');
                Ok(())
            }
            Some('t') => {
                out.push('\t');
                Ok(())
            }
            Some('r') => {
                out.push('\r');
                Ok(())
            }
            Some('a') => {
                out.push('\x07');
                Ok(())
            }
            Some('b') => {
                out.push('\x08');
                Ok(())
            }
            Some('f') => {
                out.push('\x0c');
                Ok(())
            }
            Some('v') => {
                out.push('\x0b');
                Ok(())
            }
            // Octal escape: one to three octal digits.
            Some(c @ '0'..='7') => {
                let mut value = c as u32 - '0' as u32;
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ '0'..='7') => {
                            value = value * 8 + (d as u32 - '0' as u32);
                            self.bump();
                        }
                        _ => break,
                    }
                }
                match char::from_u32(value) {
                    Some(c) => {
                        out.push(c);
                        Ok(())
                    }
                    None => Err(self.error("invalid octal escape")),
                }
            }
            Some('\\') => {
                out.push('\\');
                Ok(())
            }
            Some('\'') => {
                out.push('\'');
                Ok(())
            }
            Some('"') => {
                out.push('"');
                Ok(())
            }
            // Line continuation inside a literal: both characters vanish.
            Some('\n') => Ok(()),
            Some('x') => {
                let value = self.parse_hex_digits(2)?;
                match char::from_u32(value) {
                    Some(c) => {
                        out.push(c);
                        Ok(())
                    }
                    None => Err(self.error("invalid \\x escape")),
                }
            }
            Some('u') => {
                let value = self.parse_hex_digits(4)?;
                match char::from_u32(value) {
                    Some(c) => {
                        out.push(c);
                        Ok(())
                    }
                    None => Err(self.error("invalid \\u escape")),
                }
            }
            // Python keeps unknown escapes verbatim (e.g. "\d" in regexes).
            Some(other) => {
                out.push('\\');
                out.push(other);
                Ok(())
            }
        }
    }

    fn parse_hex_digits(&mut self, count: usize) -> Result<u32, TestListError> {
        let mut value = 0u32;
        for _ in 0..count {
            let digit = match self.bump().and_then(|c| c.to_digit(16)) {
                Some(d) => d,
                None => return Err(self.error("invalid hex escape")),
            };
            value = value * 16 + digit;
        }
        Ok(value)
    }

    fn parse_sequence(&mut self, open: char, close: char) -> Result<Vec<Literal>, TestListError> {
        debug_assert_eq!(self.peek(), Some(open));
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(items);
            }
            items.push(self.parse_value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(c) if c == close => {
                    self.bump();
                    return Ok(items);
                }
                _ => return Err(self.error("expected ',' or closing bracket")),
            }
        }
    }

    fn parse_number(&mut self) -> Result<Literal, TestListError> {
        let start = self.pos;
        if matches!(self.peek(), Some('+') | Some('-')) {
            self.bump();
        }
        let mut prev_was_exponent = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' || c == '_' {
                prev_was_exponent = false;
                self.bump();
            } else if c == 'e' || c == 'E' {
                prev_was_exponent = true;
                self.bump();
            } else if (c == '+' || c == '-') && prev_was_exponent {
                prev_was_exponent = false;
                self.bump();
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if let Ok(value) = text.parse::<i64>() {
            return Ok(Literal::Int(value));
        }
        match text.parse::<f64>() {
            Ok(value) => Ok(Literal::Float(value)),
            Err(_) => Err(self.error("invalid number literal")),
        }
    }

    fn parse_keyword(&mut self) -> Result<Literal, TestListError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" => Ok(Literal::Bool(true)),
            "False" => Ok(Literal::Bool(false)),
            "None" => Ok(Literal::None),
            _ => Err(self.error("unexpected identifier")),
        }
    }
}
