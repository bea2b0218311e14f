//! PDF tokenizer
//!
//! Turns a byte buffer into PDF syntax tokens. The lexer is position based and
//! never copies the input, so it is shared by the object parser, the
//! cross-reference resolver and content-stream consumers.

use log::trace;

use crate::error::{PDFError, PDFResult};

/// PDF keywords recognised by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Keyword {
    Obj,
    EndObj,
    Stream,
    EndStream,
    XRef,
    Trailer,
    R,
    True,
    False,
    Null,
    StartXRef,
    /// Any other bare word (content operators, xref `n`/`f` markers)
    Other(String),
}

impl Keyword {
    fn from_bytes(word: &[u8]) -> Self {
        match word {
            b"obj" => Keyword::Obj,
            b"endobj" => Keyword::EndObj,
            b"stream" => Keyword::Stream,
            b"endstream" => Keyword::EndStream,
            b"xref" => Keyword::XRef,
            b"trailer" => Keyword::Trailer,
            b"R" => Keyword::R,
            b"true" => Keyword::True,
            b"false" => Keyword::False,
            b"null" => Keyword::Null,
            b"startxref" => Keyword::StartXRef,
            other => Keyword::Other(String::from_utf8_lossy(other).into_owned()),
        }
    }
}

/// PDF syntax tokens
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Integer(i64),
    /// Real number, also used for integers beyond the `i64` range
    Real(f64),
    /// Name with `#xx` escapes decoded
    Name(Vec<u8>),
    LiteralString(Vec<u8>),
    HexString(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    BraceOpen,
    BraceClose,
    Keyword(Keyword),
    Eof,
}

/// PDF whitespace characters
pub fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

/// PDF delimiter characters
pub fn is_delimiter(byte: u8) -> bool {
    matches!(byte, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Characters that are neither whitespace nor delimiters
pub fn is_regular(byte: u8) -> bool {
    !is_whitespace(byte) && !is_delimiter(byte)
}

/// Read the token starting at `position`, returning it with the position just past it
pub fn next_token(buffer: &[u8], position: usize) -> PDFResult<(Token, usize)> {
    let mut lexer = Lexer::at(buffer, position);
    let token = lexer.next_token()?;
    Ok((token, lexer.position()))
}

/// Position-based PDF lexer over a borrowed buffer
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Create lexer at the start of the buffer
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    /// Create lexer at a given offset
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos: pos.min(data.len()),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Look at the next token without consuming it
    pub fn peek_token(&mut self) -> PDFResult<Token> {
        let saved = self.pos;
        let token = self.next_token();
        self.pos = saved;
        token
    }

    /// Skip whitespace and comments
    pub fn skip_whitespace(&mut self) {
        while let Some(&byte) = self.data.get(self.pos) {
            if is_whitespace(byte) {
                self.pos += 1;
            } else if byte == b'%' {
                while let Some(&c) = self.data.get(self.pos) {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    /// Skip the end-of-line that follows the `stream` keyword
    pub fn skip_stream_eol(&mut self) {
        match self.data.get(self.pos) {
            Some(b'\r') => {
                self.pos += 1;
                if self.data.get(self.pos) == Some(&b'\n') {
                    self.pos += 1;
                }
            }
            Some(b'\n') => self.pos += 1,
            _ => {}
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> PDFResult<Token> {
        self.skip_whitespace();

        let start = self.pos;
        let byte = match self.data.get(self.pos) {
            Some(&b) => b,
            None => return Ok(Token::Eof),
        };

        let token = match byte {
            b'/' => {
                self.pos += 1;
                Token::Name(self.read_name())
            }
            b'(' => {
                self.pos += 1;
                Token::LiteralString(self.read_literal_string(start)?)
            }
            b'<' => {
                if self.data.get(self.pos + 1) == Some(&b'<') {
                    self.pos += 2;
                    Token::DictStart
                } else {
                    self.pos += 1;
                    Token::HexString(self.read_hex_string(start)?)
                }
            }
            b'>' => {
                if self.data.get(self.pos + 1) == Some(&b'>') {
                    self.pos += 2;
                    Token::DictEnd
                } else {
                    return Err(PDFError::lex(start, "unexpected '>'"));
                }
            }
            b'[' => {
                self.pos += 1;
                Token::ArrayStart
            }
            b']' => {
                self.pos += 1;
                Token::ArrayEnd
            }
            b'{' => {
                self.pos += 1;
                Token::BraceOpen
            }
            b'}' => {
                self.pos += 1;
                Token::BraceClose
            }
            b')' => return Err(PDFError::lex(start, "unbalanced ')'")),
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.read_number(),
            _ => {
                let word = self.read_regular();
                Token::Keyword(Keyword::from_bytes(word))
            }
        };

        trace!("token at {}: {:?}", start, token);
        Ok(token)
    }

    fn read_regular(&mut self) -> &'a [u8] {
        let start = self.pos;
        while let Some(&byte) = self.data.get(self.pos) {
            if !is_regular(byte) {
                break;
            }
            self.pos += 1;
        }
        &self.data[start..self.pos]
    }

    fn read_name(&mut self) -> Vec<u8> {
        let raw = self.read_regular();
        let mut name = Vec::with_capacity(raw.len());
        let mut i = 0;

        while i < raw.len() {
            if raw[i] == b'#' && i + 2 < raw.len() {
                if let (Some(hi), Some(lo)) = (hex_value(raw[i + 1]), hex_value(raw[i + 2])) {
                    name.push((hi << 4) | lo);
                    i += 3;
                    continue;
                }
            }
            name.push(raw[i]);
            i += 1;
        }

        name
    }

    fn read_number(&mut self) -> Token {
        let start = self.pos;
        let mut seen_dot = false;
        let mut seen_digit = false;

        // Lenient: collapse repeated signs such as "--5"
        while let Some(&byte) = self.data.get(self.pos) {
            if byte == b'+' || byte == b'-' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let digits_start = self.pos;

        while let Some(&byte) = self.data.get(self.pos) {
            match byte {
                b'0'..=b'9' => seen_digit = true,
                b'.' if !seen_dot => seen_dot = true,
                _ => break,
            }
            self.pos += 1;
        }

        let negative = self.data[start..digits_start].iter().filter(|&&b| b == b'-').count() % 2 == 1;
        let digits = std::str::from_utf8(&self.data[digits_start..self.pos]).unwrap_or("0");

        if !seen_digit {
            return Token::Integer(0);
        }

        if seen_dot {
            let value: f64 = digits.parse().unwrap_or(0.0);
            return Token::Real(if negative { -value } else { value });
        }

        match digits.parse::<i64>() {
            Ok(value) => Token::Integer(if negative { -value } else { value }),
            Err(_) => {
                let value: f64 = digits.parse().unwrap_or(0.0);
                Token::Real(if negative { -value } else { value })
            }
        }
    }

    fn read_literal_string(&mut self, start: usize) -> PDFResult<Vec<u8>> {
        let mut output = Vec::new();
        let mut depth = 1usize;

        loop {
            let byte = match self.data.get(self.pos) {
                Some(&b) => b,
                None => return Err(PDFError::lex(start, "unterminated literal string")),
            };
            self.pos += 1;

            match byte {
                b'(' => {
                    depth += 1;
                    output.push(byte);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    output.push(byte);
                }
                b'\\' => self.read_escape(start, &mut output)?,
                b'\r' => {
                    // Bare end-of-line markers read as a single newline
                    if self.data.get(self.pos) == Some(&b'\n') {
                        self.pos += 1;
                    }
                    output.push(b'\n');
                }
                _ => output.push(byte),
            }
        }

        Ok(output)
    }

    fn read_escape(&mut self, start: usize, output: &mut Vec<u8>) -> PDFResult<()> {
        let byte = match self.data.get(self.pos) {
            Some(&b) => b,
            None => return Err(PDFError::lex(start, "unterminated literal string")),
        };
        self.pos += 1;

        match byte {
            b'n' => output.push(b'\n'),
            b'r' => output.push(b'\r'),
            b't' => output.push(b'\t'),
            b'b' => output.push(0x08),
            b'f' => output.push(0x0c),
            b'(' | b')' | b'\\' => output.push(byte),
            b'0'..=b'7' => {
                let mut value = u32::from(byte - b'0');
                for _ in 0..2 {
                    match self.data.get(self.pos) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                output.push((value & 0xff) as u8);
            }
            // Line continuation
            b'\r' => {
                if self.data.get(self.pos) == Some(&b'\n') {
                    self.pos += 1;
                }
            }
            b'\n' => {}
            // Unknown escapes drop the backslash
            other => output.push(other),
        }

        Ok(())
    }

    fn read_hex_string(&mut self, start: usize) -> PDFResult<Vec<u8>> {
        let mut output = Vec::new();
        let mut high: Option<u8> = None;

        loop {
            let byte = match self.data.get(self.pos) {
                Some(&b) => b,
                None => return Err(PDFError::lex(start, "unterminated hex string")),
            };
            self.pos += 1;

            if byte == b'>' {
                break;
            }
            if is_whitespace(byte) {
                continue;
            }

            let nibble = hex_value(byte)
                .ok_or_else(|| PDFError::lex(self.pos - 1, format!("invalid hex digit 0x{:02x}", byte)))?;

            match high.take() {
                Some(h) => output.push((h << 4) | nibble),
                None => high = Some(nibble),
            }
        }

        // Odd number of digits: final digit is padded with 0
        if let Some(h) = high {
            output.push(h << 4);
        }

        Ok(output)
    }
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(data: &[u8]) -> PDFResult<Vec<Token>> {
        let mut lexer = Lexer::new(data);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token()?;
            if token == Token::Eof {
                break;
            }
            out.push(token);
        }
        Ok(out)
    }

    #[test_log::test]
    fn test_numbers() -> PDFResult<()> {
        let toks = tokens(b"123 -17 +4 3.5 -.25 4. 99999999999999999999")?;
        assert_eq!(toks[0], Token::Integer(123));
        assert_eq!(toks[1], Token::Integer(-17));
        assert_eq!(toks[2], Token::Integer(4));
        assert_eq!(toks[3], Token::Real(3.5));
        assert_eq!(toks[4], Token::Real(-0.25));
        assert_eq!(toks[5], Token::Real(4.0));
        assert!(matches!(toks[6], Token::Real(v) if v > 9.0e19));
        Ok(())
    }

    #[test_log::test]
    fn test_names_with_escapes() -> PDFResult<()> {
        let toks = tokens(b"/Type /A#20B /Lime#23Green /#zz")?;
        assert_eq!(toks[0], Token::Name(b"Type".to_vec()));
        assert_eq!(toks[1], Token::Name(b"A B".to_vec()));
        assert_eq!(toks[2], Token::Name(b"Lime#Green".to_vec()));
        assert_eq!(toks[3], Token::Name(b"#zz".to_vec()));
        Ok(())
    }

    #[test_log::test]
    fn test_literal_strings() -> PDFResult<()> {
        let toks = tokens(b"(a (nested) string) (esc\\n\\(x\\)) (\\101\\0611) (line\\\ncont) (cr\r\nlf)")?;
        assert_eq!(toks[0], Token::LiteralString(b"a (nested) string".to_vec()));
        assert_eq!(toks[1], Token::LiteralString(b"esc\n(x)".to_vec()));
        assert_eq!(toks[2], Token::LiteralString(b"A11".to_vec()));
        assert_eq!(toks[3], Token::LiteralString(b"linecont".to_vec()));
        assert_eq!(toks[4], Token::LiteralString(b"cr\nlf".to_vec()));
        Ok(())
    }

    #[test_log::test]
    fn test_hex_strings() -> PDFResult<()> {
        let toks = tokens(b"<48656C6C6F> <4 8 6> <>")?;
        assert_eq!(toks[0], Token::HexString(b"Hello".to_vec()));
        assert_eq!(toks[1], Token::HexString(vec![0x48, 0x60]));
        assert_eq!(toks[2], Token::HexString(Vec::new()));
        Ok(())
    }

    #[test_log::test]
    fn test_delimiters_and_keywords() -> PDFResult<()> {
        let toks = tokens(b"<< /K [1 0 R] >> % comment\n{ } obj endobj startxref BT")?;
        assert_eq!(toks[0], Token::DictStart);
        assert_eq!(toks[2], Token::ArrayStart);
        assert_eq!(toks[5], Token::Keyword(Keyword::R));
        assert_eq!(toks[6], Token::ArrayEnd);
        assert_eq!(toks[7], Token::DictEnd);
        assert_eq!(toks[8], Token::BraceOpen);
        assert_eq!(toks[9], Token::BraceClose);
        assert_eq!(toks[10], Token::Keyword(Keyword::Obj));
        assert_eq!(toks[11], Token::Keyword(Keyword::EndObj));
        assert_eq!(toks[12], Token::Keyword(Keyword::StartXRef));
        assert_eq!(toks[13], Token::Keyword(Keyword::Other("BT".to_string())));
        Ok(())
    }

    #[test_log::test]
    fn test_next_token_contract() -> PDFResult<()> {
        let data = b"  /Name 12";
        let (token, pos) = next_token(data, 0)?;
        assert_eq!(token, Token::Name(b"Name".to_vec()));
        assert_eq!(pos, 7);
        let (token, pos) = next_token(data, pos)?;
        assert_eq!(token, Token::Integer(12));
        let (token, _) = next_token(data, pos)?;
        assert_eq!(token, Token::Eof);
        Ok(())
    }

    #[test_log::test]
    fn test_lex_errors() {
        assert!(matches!(tokens(b"(never closed"), Err(PDFError::LexError { .. })));
        assert!(matches!(tokens(b"<48GG>"), Err(PDFError::LexError { .. })));
        assert!(matches!(tokens(b"<4865"), Err(PDFError::LexError { .. })));
    }
}
