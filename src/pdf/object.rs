//! PDF object types and value serialization

use log::trace;

use super::{Dictionary, Stream};
use crate::error::{PDFError, PDFResult};

/// Indirect object identifier: (object number, generation)
pub type ObjectId = (u32, u16);

/// PDF value
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real value
    Real(f64),
    /// String bytes (literal or hexadecimal in the source)
    String(Vec<u8>),
    /// Name object, one char per byte
    Name(String),
    /// Array object
    Array(Vec<Object>),
    /// Dictionary object
    Dictionary(Dictionary),
    /// Stream object
    Stream(Stream),
    /// Indirect reference, never resolved in place
    Reference(ObjectId),
}

impl Object {
    /// Create a name object
    pub fn name(name: impl Into<String>) -> Self {
        Object::Name(name.into())
    }

    /// Create a string object from text or bytes
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Object::String(bytes.into())
    }

    /// Short type label used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "null",
            Object::Boolean(_) => "boolean",
            Object::Integer(_) => "integer",
            Object::Real(_) => "real",
            Object::String(_) => "string",
            Object::Name(_) => "name",
            Object::Array(_) => "array",
            Object::Dictionary(_) => "dictionary",
            Object::Stream(_) => "stream",
            Object::Reference(_) => "reference",
        }
    }

    fn mismatch(&self, expected: &'static str) -> PDFError {
        PDFError::InvalidObjectType {
            expected,
            found: self.type_name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    pub fn as_bool(&self) -> PDFResult<bool> {
        match self {
            Object::Boolean(b) => Ok(*b),
            _ => Err(self.mismatch("boolean")),
        }
    }

    /// Integer value; reals are truncated
    pub fn as_i64(&self) -> PDFResult<i64> {
        match self {
            Object::Integer(i) => Ok(*i),
            Object::Real(r) => Ok(*r as i64),
            _ => Err(self.mismatch("integer")),
        }
    }

    pub fn as_f64(&self) -> PDFResult<f64> {
        match self {
            Object::Integer(i) => Ok(*i as f64),
            Object::Real(r) => Ok(*r),
            _ => Err(self.mismatch("number")),
        }
    }

    pub fn as_name(&self) -> PDFResult<&str> {
        match self {
            Object::Name(n) => Ok(n),
            _ => Err(self.mismatch("name")),
        }
    }

    pub fn as_str(&self) -> PDFResult<&[u8]> {
        match self {
            Object::String(s) => Ok(s),
            _ => Err(self.mismatch("string")),
        }
    }

    pub fn as_array(&self) -> PDFResult<&Vec<Object>> {
        match self {
            Object::Array(a) => Ok(a),
            _ => Err(self.mismatch("array")),
        }
    }

    pub fn as_array_mut(&mut self) -> PDFResult<&mut Vec<Object>> {
        match self {
            Object::Array(a) => Ok(a),
            other => Err(other.mismatch("array")),
        }
    }

    /// Dictionary view; a stream yields its dictionary
    pub fn as_dict(&self) -> PDFResult<&Dictionary> {
        match self {
            Object::Dictionary(d) => Ok(d),
            Object::Stream(s) => Ok(s.dict()),
            _ => Err(self.mismatch("dictionary")),
        }
    }

    pub fn as_dict_mut(&mut self) -> PDFResult<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Ok(d),
            Object::Stream(s) => Ok(s.dict_mut()),
            other => Err(other.mismatch("dictionary")),
        }
    }

    pub fn as_stream(&self) -> PDFResult<&Stream> {
        match self {
            Object::Stream(s) => Ok(s),
            _ => Err(self.mismatch("stream")),
        }
    }

    pub fn as_stream_mut(&mut self) -> PDFResult<&mut Stream> {
        match self {
            Object::Stream(s) => Ok(s),
            other => Err(other.mismatch("stream")),
        }
    }

    pub fn as_reference(&self) -> PDFResult<ObjectId> {
        match self {
            Object::Reference(id) => Ok(*id),
            _ => Err(self.mismatch("reference")),
        }
    }

    /// Serialize this value in PDF syntax
    pub fn write_to(&self, output: &mut Vec<u8>) {
        match self {
            Object::Null => output.extend_from_slice(b"null"),
            Object::Boolean(true) => output.extend_from_slice(b"true"),
            Object::Boolean(false) => output.extend_from_slice(b"false"),
            Object::Integer(i) => output.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(r) => output.extend_from_slice(format_real(*r).as_bytes()),
            Object::String(s) => write_string(s, output),
            Object::Name(n) => write_name(n, output),
            Object::Array(items) => {
                output.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        output.push(b' ');
                    }
                    item.write_to(output);
                }
                output.push(b']');
            }
            Object::Dictionary(dict) => dict.write_to(output),
            Object::Stream(stream) => stream.write_to(output),
            Object::Reference((num, gen)) => {
                output.extend_from_slice(format!("{} {} R", num, gen).as_bytes());
            }
        }
    }

    /// Serialize to a fresh buffer
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut output = Vec::new();
        self.write_to(&mut output);
        output
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Object::Boolean(value)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Integer(value)
    }
}

impl From<i32> for Object {
    fn from(value: i32) -> Self {
        Object::Integer(i64::from(value))
    }
}

impl From<u32> for Object {
    fn from(value: u32) -> Self {
        Object::Integer(i64::from(value))
    }
}

impl From<usize> for Object {
    fn from(value: usize) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        Object::Real(value)
    }
}

impl From<Vec<Object>> for Object {
    fn from(value: Vec<Object>) -> Self {
        Object::Array(value)
    }
}

impl From<Dictionary> for Object {
    fn from(value: Dictionary) -> Self {
        Object::Dictionary(value)
    }
}

impl From<Stream> for Object {
    fn from(value: Stream) -> Self {
        Object::Stream(value)
    }
}

impl From<ObjectId> for Object {
    fn from(value: ObjectId) -> Self {
        Object::Reference(value)
    }
}

/// Indirect object: identifier plus value, written as `N G obj ... endobj`
#[derive(Debug, Clone, PartialEq)]
pub struct PDFObject {
    pub id: ObjectId,
    pub object: Object,
}

impl PDFObject {
    pub fn new(id: ObjectId, object: Object) -> Self {
        Self { id, object }
    }

    /// Write the full indirect object
    pub fn write_to(&self, output: &mut Vec<u8>) {
        trace!("Writing object {} {}", self.id.0, self.id.1);
        output.extend_from_slice(format!("{} {} obj\n", self.id.0, self.id.1).as_bytes());
        self.object.write_to(output);
        output.extend_from_slice(b"\nendobj\n");
    }
}

/// Decode raw name bytes into a name string, one char per byte
pub fn name_from_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Inverse of [`name_from_bytes`]; chars above U+00FF are written as UTF-8
pub fn name_to_bytes(name: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(name.len());
    for c in name.chars() {
        let code = u32::from(c);
        if code <= 0xff {
            bytes.push(code as u8);
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
    bytes
}

/// Format a real without exponent notation
pub fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let mut text = value.to_string();
    if !text.contains('.') {
        text.push_str(".0");
    }
    text
}

fn write_name(name: &str, output: &mut Vec<u8>) {
    output.push(b'/');
    for byte in name_to_bytes(name) {
        if byte.is_ascii_graphic() && byte != b'#' && super::lexer::is_regular(byte) {
            output.push(byte);
        } else {
            output.extend_from_slice(format!("#{:02X}", byte).as_bytes());
        }
    }
}

fn write_string(bytes: &[u8], output: &mut Vec<u8>) {
    let printable = bytes
        .iter()
        .filter(|&&b| (0x20..0x7f).contains(&b) || b == b'\n' || b == b'\r' || b == b'\t')
        .count();

    // Mostly binary content reads better as hex
    if !bytes.is_empty() && printable * 4 < bytes.len() * 3 {
        output.push(b'<');
        output.extend_from_slice(hex::encode_upper(bytes).as_bytes());
        output.push(b'>');
        return;
    }

    output.push(b'(');
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                output.push(b'\\');
                output.push(byte);
            }
            b'\r' => output.extend_from_slice(b"\\r"),
            b'\n' => output.extend_from_slice(b"\\n"),
            0x20..=0x7e | b'\t' => output.push(byte),
            _ => output.extend_from_slice(format!("\\{:03o}", byte).as_bytes()),
        }
    }
    output.push(b')');
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn written(object: &Object) -> String {
        String::from_utf8_lossy(&object.to_bytes()).into_owned()
    }

    #[test_log::test]
    fn test_scalar_serialization() {
        assert_eq!(written(&Object::Null), "null");
        assert_eq!(written(&Object::Boolean(true)), "true");
        assert_eq!(written(&Object::Integer(-42)), "-42");
        assert_eq!(written(&Object::Real(3.0)), "3.0");
        assert_eq!(written(&Object::Real(0.25)), "0.25");
        assert_eq!(written(&Object::Reference((7, 0))), "7 0 R");
    }

    #[test_log::test]
    fn test_name_serialization() {
        assert_eq!(written(&Object::name("Type")), "/Type");
        assert_eq!(written(&Object::name("A B")), "/A#20B");
        assert_eq!(written(&Object::name("x#y")), "/x#23y");
        assert_eq!(written(&Object::name("a/b")), "/a#2Fb");
    }

    #[test_log::test]
    fn test_string_serialization() {
        assert_eq!(written(&Object::string("a(b)c\\")), "(a\\(b\\)c\\\\)");
        assert_eq!(written(&Object::string("line\n")), "(line\\n)");
        assert_eq!(written(&Object::string(vec![0u8, 1, 2, 0xff])), "<000102FF>");
        assert_eq!(written(&Object::string("caf\u{e9}".as_bytes().to_vec())), "(caf\\303\\251)");
    }

    #[test_log::test]
    fn test_array_and_indirect() {
        let array = Object::Array(vec![1.into(), Object::name("N"), Object::Reference((3, 0))]);
        assert_eq!(written(&array), "[1 /N 3 0 R]");

        let indirect = PDFObject::new((5, 0), Object::Integer(9));
        let mut out = Vec::new();
        indirect.write_to(&mut out);
        assert_eq!(out, b"5 0 obj\n9\nendobj\n".to_vec());
    }

    #[test_log::test]
    fn test_accessors() -> PDFResult<()> {
        assert_eq!(Object::Real(2.9).as_i64()?, 2);
        assert_eq!(Object::Integer(4).as_f64()?, 4.0);
        assert_eq!(Object::name("Page").as_name()?, "Page");
        assert!(matches!(
            Object::Null.as_dict(),
            Err(PDFError::InvalidObjectType { expected: "dictionary", found: "null" })
        ));
        Ok(())
    }

    #[test_log::test]
    fn test_name_byte_mapping() {
        let raw = vec![b'A', 0xe9, b'B'];
        let name = name_from_bytes(&raw);
        assert_eq!(name_to_bytes(&name), raw);
    }
}
