//! PDF tokenizer.
//!
//! Splits a byte slice into the token kinds that make up PDF object
//! syntax. The lexer is lenient about content; the object parser and the
//! cross-reference loader decide how strict to be.

use crate::error::{PdfError, Result};

/// Keywords and delimiters that carry structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyword {
    ArrayStart, // [
    ArrayEnd,   // ]
    DictStart,  // <<
    DictEnd,    // >>
    BraceOpen,  // {
    BraceClose, // }
    Null,
    R,
    Obj,
    EndObj,
    Stream,
    EndStream,
    XRef,
    Trailer,
    StartXRef,
    Unknown(Vec<u8>),
}

impl Keyword {
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"null" => Self::Null,
            b"R" => Self::R,
            b"obj" => Self::Obj,
            b"endobj" => Self::EndObj,
            b"stream" => Self::Stream,
            b"endstream" => Self::EndStream,
            b"xref" => Self::XRef,
            b"trailer" => Self::Trailer,
            b"startxref" => Self::StartXRef,
            other => Self::Unknown(other.to_vec()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::ArrayStart => b"[",
            Self::ArrayEnd => b"]",
            Self::DictStart => b"<<",
            Self::DictEnd => b">>",
            Self::BraceOpen => b"{",
            Self::BraceClose => b"}",
            Self::Null => b"null",
            Self::R => b"R",
            Self::Obj => b"obj",
            Self::EndObj => b"endobj",
            Self::Stream => b"stream",
            Self::EndStream => b"endstream",
            Self::XRef => b"xref",
            Self::Trailer => b"trailer",
            Self::StartXRef => b"startxref",
            Self::Unknown(bytes) => bytes.as_slice(),
        }
    }
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Integer value
    Int(i64),
    /// Floating point value
    Real(f64),
    /// Boolean value
    Bool(bool),
    /// Name (e.g., /Name), one char per raw byte
    Name(String),
    /// Keyword or delimiter
    Keyword(Keyword),
    /// String (literal or hex)
    String(Vec<u8>),
}

/// Byte-level tokenizer over a borrowed buffer.
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
    /// Start of the most recent token
    token_pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            token_pos: 0,
        }
    }

    /// Start tokenizing at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos,
            token_pos: pos,
        }
    }

    /// Current position in stream
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Set current position in stream.
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
        self.token_pos = pos;
    }

    /// Start of the most recently returned token.
    pub fn token_pos(&self) -> usize {
        self.token_pos
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    pub fn is_whitespace(b: u8) -> bool {
        matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
    }

    pub fn is_delimiter(b: u8) -> bool {
        matches!(
            b,
            b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
        )
    }

    fn is_keyword_end(b: u8) -> bool {
        Self::is_whitespace(b) || Self::is_delimiter(b)
    }

    /// Skip whitespace and comments
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'%' {
                match find_line_end(&self.data[self.pos..]) {
                    Some(offset) => self.pos += offset + 1,
                    None => self.pos = self.data.len(),
                }
                continue;
            }
            if !Self::is_whitespace(b) {
                return;
            }
            self.pos += 1;
        }
    }

    fn parse_name(&mut self) -> Token {
        self.advance(); // '/'
        let mut name = Vec::new();
        while let Some(b) = self.peek() {
            if Self::is_keyword_end(b) {
                break;
            }
            if b == b'#' {
                if let (Some(h), Some(l)) = (
                    self.peek_at(1).and_then(hex_value),
                    self.peek_at(2).and_then(hex_value),
                ) {
                    self.pos += 3;
                    name.push((h << 4) | l);
                    continue;
                }
                // A bare '#' is kept as-is.
            }
            name.push(b);
            self.pos += 1;
        }
        Token::Name(name_from_bytes(&name))
    }

    fn parse_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut has_dot = false;

        if matches!(self.peek(), Some(b'+') | Some(b'-')) {
            self.advance();
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.advance();
            } else if b == b'.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let s = std::str::from_utf8(&self.data[start..self.pos]).map_err(|_| {
            PdfError::TokenError {
                pos: start,
                msg: "invalid number".into(),
            }
        })?;

        if has_dot {
            // "5." and "-.5" are valid PDF reals but not valid Rust floats as-is.
            let normalized = match s {
                "." | "-." | "+." => "0".to_string(),
                _ if s.ends_with('.') => format!("{s}0"),
                _ => s.replacen("-.", "-0.", 1).replacen("+.", "0.", 1),
            };
            let val: f64 = normalized.parse().map_err(|_| PdfError::TokenError {
                pos: start,
                msg: format!("invalid real: {s}"),
            })?;
            Ok(Token::Real(val))
        } else {
            match s.parse::<i64>() {
                Ok(val) => Ok(Token::Int(val)),
                // Out-of-range integers are tolerated as reals.
                Err(_) => s
                    .parse::<f64>()
                    .map(Token::Real)
                    .map_err(|_| PdfError::TokenError {
                        pos: start,
                        msg: format!("invalid int: {s}"),
                    }),
            }
        }
    }

    fn parse_literal_string(&mut self) -> Result<Token> {
        self.advance(); // '('
        let mut result = Vec::new();
        let mut depth = 1;

        while depth > 0 {
            match self.advance() {
                Some(b'(') => {
                    depth += 1;
                    result.push(b'(');
                }
                Some(b')') => {
                    depth -= 1;
                    if depth > 0 {
                        result.push(b')');
                    }
                }
                Some(b'\\') => match self.advance() {
                    Some(b'n') => result.push(b'\n'),
                    Some(b'r') => result.push(b'\r'),
                    Some(b't') => result.push(b'\t'),
                    Some(b'b') => result.push(0x08),
                    Some(b'f') => result.push(0x0c),
                    Some(b'\r') => {
                        if self.peek() == Some(b'\n') {
                            self.advance();
                        }
                    }
                    Some(b'\n') => {}
                    Some(c) if (b'0'..b'8').contains(&c) => {
                        let mut octal = (c - b'0') as u32;
                        for _ in 0..2 {
                            match self.peek() {
                                Some(d) if (b'0'..b'8').contains(&d) => {
                                    self.advance();
                                    octal = octal * 8 + (d - b'0') as u32;
                                }
                                _ => break,
                            }
                        }
                        result.push((octal & 0xFF) as u8);
                    }
                    // Covers \( \) \\ and unknown escapes alike.
                    Some(c) => result.push(c),
                    None => return Err(PdfError::UnexpectedEof),
                },
                Some(c) => result.push(c),
                None => return Err(PdfError::UnexpectedEof),
            }
        }

        Ok(Token::String(result))
    }

    fn parse_hex_string(&mut self) -> Result<Token> {
        let start = self.pos;
        self.advance(); // '<'
        let mut result = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            match self.advance() {
                Some(b'>') => break,
                Some(c) if Self::is_whitespace(c) => {}
                Some(c) => {
                    let nibble = hex_value(c).ok_or_else(|| PdfError::TokenError {
                        pos: start,
                        msg: format!("invalid hex digit {:?} in string", c as char),
                    })?;
                    match pending.take() {
                        Some(high) => result.push((high << 4) | nibble),
                        None => pending = Some(nibble),
                    }
                }
                None => return Err(PdfError::UnexpectedEof),
            }
        }

        // An odd digit count behaves as if followed by 0.
        if let Some(high) = pending {
            result.push(high << 4);
        }
        Ok(Token::String(result))
    }

    fn parse_keyword(&mut self) -> Token {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if Self::is_keyword_end(b) {
                break;
            }
            self.advance();
        }
        // A lone unexpected delimiter still has to make progress.
        if self.pos == start {
            self.advance();
        }
        match &self.data[start..self.pos] {
            b"true" => Token::Bool(true),
            b"false" => Token::Bool(false),
            bytes => Token::Keyword(Keyword::from_bytes(bytes)),
        }
    }

    /// Get next token with its starting position.
    pub fn next_token(&mut self) -> Option<Result<(usize, Token)>> {
        self.skip_whitespace();
        let b = self.peek()?;
        self.token_pos = self.pos;

        let result = match b {
            b'/' => Ok(self.parse_name()),
            b'(' => self.parse_literal_string(),
            b'<' if self.peek_at(1) == Some(b'<') => {
                self.pos += 2;
                Ok(Token::Keyword(Keyword::DictStart))
            }
            b'<' => self.parse_hex_string(),
            b'>' if self.peek_at(1) == Some(b'>') => {
                self.pos += 2;
                Ok(Token::Keyword(Keyword::DictEnd))
            }
            b'[' => {
                self.advance();
                Ok(Token::Keyword(Keyword::ArrayStart))
            }
            b']' => {
                self.advance();
                Ok(Token::Keyword(Keyword::ArrayEnd))
            }
            b'{' => {
                self.advance();
                Ok(Token::Keyword(Keyword::BraceOpen))
            }
            b'}' => {
                self.advance();
                Ok(Token::Keyword(Keyword::BraceClose))
            }
            b'+' | b'-' | b'.'
                if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit() || c == b'.') =>
            {
                self.parse_number()
            }
            c if c.is_ascii_digit() => self.parse_number(),
            _ => Ok(self.parse_keyword()),
        };

        Some(result.map(|token| (self.token_pos, token)))
    }

    /// Read an unsigned decimal integer at the current position without
    /// skipping anything first. Used by the cross-reference loader, which
    /// works at the byte level.
    pub fn read_uint(&mut self) -> Option<u64> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.data[start..self.pos])
            .ok()?
            .parse()
            .ok()
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn find_line_end(data: &[u8]) -> Option<usize> {
    data.iter().position(|&b| b == b'\r' || b == b'\n')
}

/// Names keep one char per raw byte so they survive a rewrite unchanged.
pub(crate) fn name_from_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Inverse of [`name_from_bytes`].
pub(crate) fn name_to_bytes(name: &str) -> Vec<u8> {
    name.chars().map(|c| c as u32 as u8).collect()
}
