//! Byte-level tokenizer shared by the object parser and the content stream decoder

use crate::error::{PdfError, PdfResult};
use super::{is_delimiter, is_regular, is_whitespace};

/// A single PDF token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Integer(i64),
    Real(f64),
    LiteralString(Vec<u8>),
    HexString(Vec<u8>),
    Name(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    /// Bare word: `true`, `obj`, `R`, content operators, `{`, `}`
    Keyword(Vec<u8>),
}

impl Token {
    pub fn is_keyword(&self, keyword: &[u8]) -> bool {
        matches!(self, Token::Keyword(k) if k == keyword)
    }
}

/// Tokenizer over an in-memory buffer
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Start tokenizing at `pos`
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos: pos.min(data.len()),
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Skip whitespace and `%` comments
    pub fn skip_whitespace(&mut self) {
        while let Some(&byte) = self.data.get(self.pos) {
            if is_whitespace(byte) {
                self.pos += 1;
            } else if byte == b'%' {
                while let Some(&c) = self.data.get(self.pos) {
                    if c == b'\r' || c == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    /// Skip the end-of-line marker that follows the `stream` keyword
    pub fn skip_stream_eol(&mut self) {
        match self.data.get(self.pos) {
            Some(b'\r') => {
                self.pos += 1;
                if self.data.get(self.pos) == Some(&b'\n') {
                    self.pos += 1;
                }
            }
            Some(b'\n') => self.pos += 1,
            _ => {
                // Tolerate spaces before the EOL
                while self.data.get(self.pos) == Some(&b' ') {
                    self.pos += 1;
                }
                if self.data.get(self.pos) == Some(&b'\n') {
                    self.pos += 1;
                }
            }
        }
    }

    /// Read the next token without consuming it
    pub fn peek_token(&mut self) -> PdfResult<Option<Token>> {
        let saved = self.pos;
        let token = self.next_token();
        self.pos = saved;
        token
    }

    /// Read the next token, `None` at end of input
    pub fn next_token(&mut self) -> PdfResult<Option<Token>> {
        self.skip_whitespace();
        let Some(&byte) = self.data.get(self.pos) else {
            return Ok(None);
        };

        let token = match byte {
            b'[' => {
                self.pos += 1;
                Token::ArrayStart
            }
            b']' => {
                self.pos += 1;
                Token::ArrayEnd
            }
            b'<' if self.data.get(self.pos + 1) == Some(&b'<') => {
                self.pos += 2;
                Token::DictStart
            }
            b'>' if self.data.get(self.pos + 1) == Some(&b'>') => {
                self.pos += 2;
                Token::DictEnd
            }
            b'<' => {
                self.pos += 1;
                Token::HexString(self.read_hex_string()?)
            }
            b'(' => {
                self.pos += 1;
                Token::LiteralString(self.read_literal_string()?)
            }
            b'/' => {
                self.pos += 1;
                Token::Name(self.read_name())
            }
            b'{' | b'}' => {
                self.pos += 1;
                Token::Keyword(vec![byte])
            }
            b')' | b'>' => {
                return Err(PdfError::parse(self.pos, format!("Unexpected '{}'", byte as char)));
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.read_number(),
            _ => {
                let start = self.pos;
                while self.data.get(self.pos).is_some_and(|&b| is_regular(b)) {
                    self.pos += 1;
                }
                Token::Keyword(self.data[start..self.pos].to_vec())
            }
        };

        Ok(Some(token))
    }

    fn read_number(&mut self) -> Token {
        let start = self.pos;
        while self.data.get(self.pos).is_some_and(|&b| is_regular(b)) {
            self.pos += 1;
        }
        let raw = &self.data[start..self.pos];
        let text = String::from_utf8_lossy(raw);

        if !raw.contains(&b'.') {
            if let Ok(value) = text.parse::<i64>() {
                return Token::Integer(value);
            }
        }
        // Tolerate doubled signs such as "--5" written by some producers
        let trimmed = text.trim_start_matches(['+', '-']);
        let negative = text.starts_with('-');
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Token::Real(if negative { -value } else { value }),
            _ if trimmed.is_empty() && raw.iter().all(|b| matches!(b, b'+' | b'-' | b'.')) => Token::Real(0.0),
            _ => Token::Keyword(raw.to_vec()),
        }
    }

    fn read_name(&mut self) -> Vec<u8> {
        let mut name = Vec::new();
        while let Some(&byte) = self.data.get(self.pos) {
            if !is_regular(byte) {
                break;
            }
            self.pos += 1;
            if byte == b'#' {
                let hex = self.data.get(self.pos..self.pos + 2).and_then(|pair| {
                    std::str::from_utf8(pair).ok().and_then(|s| u8::from_str_radix(s, 16).ok())
                });
                if let Some(decoded) = hex {
                    name.push(decoded);
                    self.pos += 2;
                    continue;
                }
            }
            name.push(byte);
        }
        name
    }

    fn read_hex_string(&mut self) -> PdfResult<Vec<u8>> {
        let mut digits = Vec::new();
        loop {
            let Some(&byte) = self.data.get(self.pos) else {
                return Err(PdfError::parse(self.pos, "Unterminated hex string"));
            };
            self.pos += 1;
            match byte {
                b'>' => break,
                b if b.is_ascii_hexdigit() => digits.push(b),
                b if is_whitespace(b) => continue,
                _ => {
                    let offset = self.pos - 1;
                    // Resume after the closing '>'
                    self.pos = super::find_bytes(self.data, b">", offset).map_or(self.data.len(), |end| end + 1);
                    return Err(PdfError::parse(offset, "Invalid hex string"));
                }
            }
        }

        if digits.len() % 2 != 0 {
            digits.push(b'0');
        }

        Ok(digits
            .chunks(2)
            .map(|pair| (hex_value(pair[0]) << 4) | hex_value(pair[1]))
            .collect())
    }

    fn read_literal_string(&mut self) -> PdfResult<Vec<u8>> {
        let mut content = Vec::new();
        let mut nesting = 1;

        loop {
            let Some(&byte) = self.data.get(self.pos) else {
                return Err(PdfError::parse(self.pos, "Unterminated literal string"));
            };
            self.pos += 1;

            match byte {
                b'(' => {
                    nesting += 1;
                    content.push(byte);
                }
                b')' => {
                    nesting -= 1;
                    if nesting == 0 {
                        break;
                    }
                    content.push(byte);
                }
                b'\\' => self.read_escape(&mut content),
                b'\r' => {
                    // Raw EOLs in literal strings read as a single LF
                    if self.data.get(self.pos) == Some(&b'\n') {
                        self.pos += 1;
                    }
                    content.push(b'\n');
                }
                _ => content.push(byte),
            }
        }

        Ok(content)
    }

    fn read_escape(&mut self, content: &mut Vec<u8>) {
        let Some(&byte) = self.data.get(self.pos) else {
            return;
        };
        self.pos += 1;

        match byte {
            b'n' => content.push(b'\n'),
            b'r' => content.push(b'\r'),
            b't' => content.push(b'\t'),
            b'b' => content.push(b'\x08'),
            b'f' => content.push(b'\x0c'),
            b'(' | b')' | b'\\' => content.push(byte),
            b'0'..=b'7' => {
                let mut value = (byte - b'0') as u32;
                for _ in 0..2 {
                    match self.data.get(self.pos) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + (d - b'0') as u32;
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                content.push(value as u8);
            }
            // Line continuation
            b'\r' => {
                if self.data.get(self.pos) == Some(&b'\n') {
                    self.pos += 1;
                }
            }
            b'\n' => {}
            // Unknown escapes drop the backslash
            _ => content.push(byte),
        }
    }

    /// Check whether the bytes at the cursor spell `keyword` followed by a delimiter
    pub fn starts_with_keyword(&self, keyword: &[u8]) -> bool {
        let end = self.pos + keyword.len();
        self.data.get(self.pos..end) == Some(keyword)
            && self
                .data
                .get(end)
                .map_or(true, |&b| is_whitespace(b) || is_delimiter(b))
    }
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => 0,
    }
}
