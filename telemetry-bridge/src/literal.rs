//! Strict literal parser for configuration files and sensor records
//!
//! Accepts data only:
//! - mappings `{k: v}`, lists `[..]`, tuples `(..)`
//! - strings (single or double quoted, escapes, adjacent concatenation)
//! - integers (decimal, hex, octal, binary), floats, unary `+`/`-`
//! - `True`, `False`, `None`, `#` comments
//!
//! Names, calls and operators are rejected, so evaluating untrusted device
//! output can never run anything.

use std::fmt;

/// A parsed literal value. Mapping entries keep their source order.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
    Map(Vec<(Literal, Literal)>),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LiteralError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected '{found}' at offset {offset}")]
    Unexpected { found: char, offset: usize },
    #[error("malformed literal at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },
    #[error("unhashable mapping key at offset {offset}")]
    UnhashableKey { offset: usize },
}

/// Parse exactly one literal; anything after it other than whitespace and
/// comments is an error.
pub fn parse(input: &str) -> Result<Literal, LiteralError> {
    let mut parser = Parser {
        src: input,
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_trivia();
    match parser.peek() {
        None => Ok(value),
        Some(c) => Err(LiteralError::Unexpected {
            found: c,
            offset: parser.pos,
        }),
    }
}

impl Literal {
    /// Look up a mapping entry by string key. Later duplicates win.
    pub fn get(&self, key: &str) -> Option<&Literal> {
        match self {
            Literal::Map(entries) => entries
                .iter()
                .rev()
                .find(|(k, _)| matches!(k, Literal::Str(s) if s == key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(i) => Some(*i as f64),
            Literal::Float(f) => Some(*f),
            Literal::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Literal::Int(i) => Some(*i),
            Literal::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// First element of a list or tuple; a scalar is its own first element.
    pub fn first(&self) -> Option<&Literal> {
        match self {
            Literal::List(items) | Literal::Tuple(items) => items.first(),
            Literal::Map(_) => None,
            scalar => Some(scalar),
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Literal::Map(_))
    }

    /// Convert to JSON for serde deserialization. Non-string mapping keys
    /// become their printed form.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Literal::None => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::from(*i),
            Literal::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Literal::Str(s) => Value::String(s.clone()),
            Literal::List(items) | Literal::Tuple(items) => {
                Value::Array(items.iter().map(Literal::to_json).collect())
            }
            Literal::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| {
                        let key = match k {
                            Literal::Str(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (key, v.to_json())
                    })
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::None => f.write_str("None"),
            Literal::Bool(true) => f.write_str("True"),
            Literal::Bool(false) => f.write_str("False"),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => f.write_str(&float_repr(*x)),
            Literal::Str(s) => f.write_str(&string_repr(s)),
            Literal::List(items) => {
                f.write_str("[")?;
                write_seq(f, items)?;
                f.write_str("]")
            }
            Literal::Tuple(items) => {
                f.write_str("(")?;
                write_seq(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Literal::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Literal]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn float_repr(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let abs = x.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let exp = format!("{:e}", x);
        return match exp.split_once('e') {
            Some((mantissa, power)) if !power.starts_with('-') => {
                format!("{}e+{:0>2}", mantissa, power)
            }
            Some((mantissa, power)) => {
                format!("{}e-{:0>2}", mantissa, &power[1..])
            }
            None => exp,
        };
    }
    let text = format!("{}", x);
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

fn string_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Deepest container nesting accepted.
pub const MAX_NESTING: usize = 100;

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn expect_any(&mut self) -> Result<char, LiteralError> {
        self.skip_trivia();
        self.peek().ok_or(LiteralError::UnexpectedEnd)
    }

    fn unexpected(&self, found: char) -> LiteralError {
        LiteralError::Unexpected {
            found,
            offset: self.pos,
        }
    }

    fn malformed(&self, offset: usize, reason: impl Into<String>) -> LiteralError {
        LiteralError::Malformed {
            offset,
            reason: reason.into(),
        }
    }

    fn value(&mut self) -> Result<Literal, LiteralError> {
        if self.depth >= MAX_NESTING {
            return Err(self.malformed(self.pos, "nesting too deep"));
        }
        self.depth += 1;
        let value = self.item();
        self.depth -= 1;
        value
    }

    fn item(&mut self) -> Result<Literal, LiteralError> {
        match self.expect_any()? {
            '{' => self.mapping(),
            '[' => {
                self.bump();
                Ok(Literal::List(self.sequence(']')?.0))
            }
            '(' => self.paren(),
            '\'' | '"' => self.strings(),
            '+' | '-' => self.signed(),
            c if c.is_ascii_digit() || c == '.' => self.number(false),
            c if c.is_alphabetic() || c == '_' => self.keyword(),
            c => Err(self.unexpected(c)),
        }
    }

    /// Items up to `close`; returns them and whether a trailing comma was
    /// seen after the last item.
    fn sequence(&mut self, close: char) -> Result<(Vec<Literal>, bool), LiteralError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            if self.expect_any()? == close {
                self.bump();
                return Ok((items, trailing_comma));
            }
            items.push(self.value()?);
            trailing_comma = false;
            match self.expect_any()? {
                ',' => {
                    self.bump();
                    trailing_comma = true;
                }
                c if c == close => {}
                c => return Err(self.unexpected(c)),
            }
        }
    }

    fn paren(&mut self) -> Result<Literal, LiteralError> {
        self.bump();
        let (mut items, trailing_comma) = self.sequence(')')?;
        if items.len() == 1 && !trailing_comma {
            Ok(items.remove(0))
        } else {
            Ok(Literal::Tuple(items))
        }
    }

    fn mapping(&mut self) -> Result<Literal, LiteralError> {
        self.bump();
        let mut entries: Vec<(Literal, Literal)> = Vec::new();
        loop {
            if self.expect_any()? == '}' {
                self.bump();
                return Ok(Literal::Map(entries));
            }
            let key_offset = self.pos;
            let key = self.value()?;
            if matches!(key, Literal::List(_) | Literal::Map(_)) {
                return Err(LiteralError::UnhashableKey { offset: key_offset });
            }
            match self.expect_any()? {
                ':' => {
                    self.bump();
                }
                c => return Err(self.unexpected(c)),
            }
            let value = self.value()?;
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
            match self.expect_any()? {
                ',' => {
                    self.bump();
                }
                '}' => {}
                c => return Err(self.unexpected(c)),
            }
        }
    }

    fn strings(&mut self) -> Result<Literal, LiteralError> {
        let mut out = self.string()?;
        loop {
            self.skip_trivia();
            match self.peek() {
                Some('\'') | Some('"') => out.push_str(&self.string()?),
                _ => return Ok(Literal::Str(out)),
            }
        }
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let start = self.pos;
        let quote = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
        let mut out = String::new();
        loop {
            let c = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
            match c {
                c if c == quote => return Ok(out),
                '\n' => return Err(self.malformed(start, "unterminated string")),
                '\\' => {
                    let esc = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
                    match esc {
                        '\\' => out.push('\\'),
                        '\'' => out.push('\''),
                        '"' => out.push('"'),
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        '0' => out.push('\0'),
                        '\n' => {}
                        'x' => out.push(self.hex_escape(2)?),
                        'u' => out.push(self.hex_escape(4)?),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                c => out.push(c),
            }
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, LiteralError> {
        let start = self.pos;
        let end = start + digits;
        let hex = self
            .src
            .get(start..end)
            .ok_or_else(|| self.malformed(start, "truncated escape"))?;
        let code = u32::from_str_radix(hex, 16)
            .map_err(|_| self.malformed(start, "invalid escape"))?;
        self.pos = end;
        char::from_u32(code).ok_or_else(|| self.malformed(start, "invalid code point"))
    }

    fn signed(&mut self) -> Result<Literal, LiteralError> {
        let negative = self.bump() == Some('-');
        match self.expect_any()? {
            c if c.is_ascii_digit() || c == '.' => self.number(negative),
            c => Err(self.unexpected(c)),
        }
    }

    fn number(&mut self, negative: bool) -> Result<Literal, LiteralError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '+' || c == '-')
                && matches!(self.src[..self.pos].chars().last(), Some('e') | Some('E'))
                && !self.src[start..self.pos].starts_with("0x")
                && !self.src[start..self.pos].starts_with("0X");
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || exponent_sign {
                self.bump();
            } else {
                break;
            }
        }
        let text: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();
        let lower = text.to_ascii_lowercase();

        let radix = match lower.get(..2) {
            Some("0x") => Some(16),
            Some("0o") => Some(8),
            Some("0b") => Some(2),
            _ => None,
        };

        if let Some(radix) = radix {
            let value = i64::from_str_radix(&lower[2..], radix)
                .map_err(|_| self.malformed(start, format!("invalid integer '{}'", text)))?;
            return Ok(Literal::Int(if negative { -value } else { value }));
        }

        let is_float = lower.contains('.') || lower.contains('e');
        if is_float {
            let value: f64 = lower
                .parse()
                .map_err(|_| self.malformed(start, format!("invalid number '{}'", text)))?;
            return Ok(Literal::Float(if negative { -value } else { value }));
        }

        if lower.len() > 1 && lower.starts_with('0') && lower.chars().any(|c| c != '0') {
            return Err(self.malformed(start, "leading zeros in integer"));
        }
        let signed = if negative { format!("-{}", lower) } else { lower };
        signed
            .parse::<i64>()
            .map(Literal::Int)
            .map_err(|_| self.malformed(start, format!("invalid integer '{}'", text)))
    }

    fn keyword(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        match &self.src[start..self.pos] {
            "True" => Ok(Literal::Bool(true)),
            "False" => Ok(Literal::Bool(false)),
            "None" => Ok(Literal::None),
            name => Err(self.malformed(start, format!("name '{}' is not a literal", name))),
        }
    }
}
