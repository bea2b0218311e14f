//! PDF object parser
//!
//! Recursive descent over lexer tokens. References are produced as
//! `Object::Reference` and never followed here; resolution belongs to the
//! document so forward and cyclic references parse without recursion.

use log::{trace, warn};

use super::lexer::{Keyword, Lexer, Token};
use super::object::{name_from_bytes, Object, ObjectId, PDFObject};
use super::{Dictionary, Stream};
use crate::error::{Diagnostic, DiagnosticKind, PDFError, PDFResult};

const MAX_NESTING: usize = 256;
const ENDSTREAM: &[u8] = b"endstream";

/// Find the first occurrence of `needle` at or after `from`
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

/// Find the last occurrence of `needle`
pub(crate) fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|window| window == needle)
}

/// PDF object parser
#[derive(Debug)]
pub struct PDFParser<'a> {
    lexer: Lexer<'a>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> PDFParser<'a> {
    /// Create new parser at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    /// Create new parser at a byte offset
    pub fn at(data: &'a [u8], position: usize) -> Self {
        Self {
            lexer: Lexer::at(data, position),
            diagnostics: Vec::new(),
        }
    }

    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    pub fn set_position(&mut self, position: usize) {
        self.lexer.set_position(position);
    }

    /// Underlying lexer, for callers that read raw tokens (xref tables)
    pub fn lexer(&mut self) -> &mut Lexer<'a> {
        &mut self.lexer
    }

    /// Repairs made while parsing
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Parse one direct object
    pub fn parse_object(&mut self) -> PDFResult<Object> {
        self.parse_nested(0)
    }

    fn parse_nested(&mut self, depth: usize) -> PDFResult<Object> {
        self.lexer.skip_whitespace();
        let start = self.lexer.position();
        let token = self.lexer.next_token()?;
        self.object_from_token(token, start, depth)
    }

    fn object_from_token(&mut self, token: Token, start: usize, depth: usize) -> PDFResult<Object> {
        if depth > MAX_NESTING {
            return Err(PDFError::parse(start, "shallower nesting"));
        }

        match token {
            Token::Integer(value) => Ok(self.reference_or_integer(value)),
            Token::Real(value) => Ok(Object::Real(value)),
            Token::Name(bytes) => Ok(Object::Name(name_from_bytes(&bytes))),
            Token::LiteralString(bytes) | Token::HexString(bytes) => Ok(Object::String(bytes)),
            Token::ArrayStart => self.parse_array(depth),
            Token::DictStart => Ok(Object::Dictionary(self.parse_dictionary_body(depth)?)),
            Token::Keyword(Keyword::True) => Ok(Object::Boolean(true)),
            Token::Keyword(Keyword::False) => Ok(Object::Boolean(false)),
            Token::Keyword(Keyword::Null) => Ok(Object::Null),
            Token::Eof => Err(PDFError::parse(start, "object before end of data")),
            other => Err(PDFError::parse(start, format!("object, found {:?}", other))),
        }
    }

    /// `<int> <int> R` lookahead
    fn reference_or_integer(&mut self, number: i64) -> Object {
        let saved = self.lexer.position();

        if let (Ok(num), Ok(Token::Integer(generation))) = (u32::try_from(number), self.lexer.next_token()) {
            if let Ok(Token::Keyword(Keyword::R)) = self.lexer.next_token() {
                if let Ok(generation) = u16::try_from(generation) {
                    return Object::Reference((num, generation));
                }
            }
        }

        self.lexer.set_position(saved);
        Object::Integer(number)
    }

    fn parse_array(&mut self, depth: usize) -> PDFResult<Object> {
        let mut items = Vec::new();
        loop {
            self.lexer.skip_whitespace();
            let start = self.lexer.position();
            match self.lexer.next_token()? {
                Token::ArrayEnd => break,
                Token::Eof => return Err(PDFError::parse(start, "']'")),
                token => items.push(self.object_from_token(token, start, depth + 1)?),
            }
        }
        Ok(Object::Array(items))
    }

    fn parse_dictionary_body(&mut self, depth: usize) -> PDFResult<Dictionary> {
        let mut dict = Dictionary::new();
        loop {
            self.lexer.skip_whitespace();
            let start = self.lexer.position();
            match self.lexer.next_token()? {
                Token::DictEnd => break,
                Token::Name(key) => {
                    self.lexer.skip_whitespace();
                    let value_start = self.lexer.position();
                    let value_token = self.lexer.next_token()?;
                    if value_token == Token::DictEnd {
                        return Err(PDFError::parse(value_start, "dictionary value"));
                    }
                    let value = self.object_from_token(value_token, value_start, depth + 1)?;
                    dict.set(name_from_bytes(&key), value);
                }
                Token::Eof => return Err(PDFError::parse(start, "'>>'")),
                other => return Err(PDFError::parse(start, format!("dictionary key, found {:?}", other))),
            }
        }
        Ok(dict)
    }

    /// Parse `N G obj ... endobj` at the current position
    ///
    /// `resolve_length` supplies the value of an indirect `/Length`. When the
    /// length is missing or wrong the payload is recovered by scanning for
    /// `endstream`, and a `StreamLength` diagnostic is recorded.
    pub fn parse_indirect_object<F>(&mut self, mut resolve_length: F) -> PDFResult<PDFObject>
    where
        F: FnMut(ObjectId) -> Option<i64>,
    {
        self.lexer.skip_whitespace();
        let start = self.lexer.position();
        let id = self.parse_object_header()?;
        trace!("Parsing indirect object {} {} at {}", id.0, id.1, start);

        let mut object = self.parse_object()?;

        let after_value = self.lexer.position();
        match self.lexer.next_token() {
            Ok(Token::Keyword(Keyword::Stream)) => {
                let dict = match object {
                    Object::Dictionary(dict) => dict,
                    other => {
                        return Err(PDFError::parse(
                            after_value,
                            format!("stream dictionary, found {}", other.type_name()),
                        ))
                    }
                };
                object = Object::Stream(self.parse_stream_body(id, dict, &mut resolve_length)?);
                self.expect_endobj(id);
            }
            Ok(Token::Keyword(Keyword::EndObj)) => {}
            _ => {
                self.lexer.set_position(after_value);
                warn!("Object {} {} is missing endobj", id.0, id.1);
            }
        }

        Ok(PDFObject::new(id, object))
    }

    /// Parse `N G obj`
    pub fn parse_object_header(&mut self) -> PDFResult<ObjectId> {
        let start = self.lexer.position();
        let number = match self.lexer.next_token()? {
            Token::Integer(n) => u32::try_from(n).map_err(|_| PDFError::parse(start, "object number"))?,
            _ => return Err(PDFError::parse(start, "object number")),
        };
        let generation = match self.lexer.next_token()? {
            Token::Integer(g) => u16::try_from(g).map_err(|_| PDFError::parse(start, "generation number"))?,
            _ => return Err(PDFError::parse(start, "generation number")),
        };
        match self.lexer.next_token()? {
            Token::Keyword(Keyword::Obj) => Ok((number, generation)),
            _ => Err(PDFError::parse(start, "'obj' keyword")),
        }
    }

    fn expect_endobj(&mut self, id: ObjectId) {
        let saved = self.lexer.position();
        if !matches!(self.lexer.next_token(), Ok(Token::Keyword(Keyword::EndObj))) {
            self.lexer.set_position(saved);
            warn!("Stream object {} {} is missing endobj", id.0, id.1);
        }
    }

    fn parse_stream_body<F>(&mut self, id: ObjectId, dict: Dictionary, resolve_length: &mut F) -> PDFResult<Stream>
    where
        F: FnMut(ObjectId) -> Option<i64>,
    {
        self.lexer.skip_stream_eol();
        let data = self.lexer.data();
        let start = self.lexer.position();

        let declared = match dict.get("Length") {
            Some(Object::Integer(n)) => Some(*n),
            Some(Object::Reference(length_id)) => resolve_length(*length_id),
            _ => None,
        };

        if let Some(length) = declared.and_then(|n| usize::try_from(n).ok()) {
            if let Some(end) = start.checked_add(length).filter(|&end| end <= data.len()) {
                let mut after = Lexer::at(data, end);
                after.skip_whitespace();
                if data[after.position()..].starts_with(ENDSTREAM) {
                    self.lexer.set_position(after.position() + ENDSTREAM.len());
                    return Ok(Stream::new(dict, data[start..end].to_vec()));
                }
            }
        }

        // Recover the payload by locating endstream
        let marker = find_bytes(data, ENDSTREAM, start)
            .ok_or_else(|| PDFError::parse(start, "'endstream'"))?;
        let mut end = marker;
        if end > start && data[end - 1] == b'\n' {
            end -= 1;
        }
        if end > start && data[end - 1] == b'\r' {
            end -= 1;
        }

        let message = format!(
            "object {} {}: /Length {:?} does not match payload, recovered {} bytes",
            id.0,
            id.1,
            declared,
            end - start
        );
        warn!("{}", message);
        self.diagnostics
            .push(Diagnostic::new(DiagnosticKind::StreamLength, message).at(start));

        self.lexer.set_position(marker + ENDSTREAM.len());
        Ok(Stream::new(dict, data[start..end].to_vec()))
    }
}
