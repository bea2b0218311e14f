//! Object streams (`/Type /ObjStm`)

use log::{trace, warn};

use super::lexer::{Lexer, Token};
use super::parser::PDFParser;
use super::{Dictionary, Object, Stream};
use crate::error::{PDFError, PDFResult};

/// Upper bound on objects packed into one stream when writing
pub const MAX_OBJECTS_PER_STREAM: usize = 100;

/// Read the `N` pairs of `number offset` at the start of an object stream
pub fn read_header(stream: &Stream) -> PDFResult<Vec<(u32, usize)>> {
    let content = stream.decoded_data()?;
    header_pairs(stream.dict(), content)
}

fn header_pairs(dict: &Dictionary, content: &[u8]) -> PDFResult<Vec<(u32, usize)>> {
    let count = dict
        .get_i64("N")
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| PDFError::MissingDictionaryEntry("N".to_string()))?;
    let first = dict
        .get_i64("First")
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| PDFError::MissingDictionaryEntry("First".to_string()))?;

    let header = &content[..first.min(content.len())];
    let mut lexer = Lexer::new(header);
    let mut pairs = Vec::with_capacity(count.min(header.len() / 4 + 1));
    for _ in 0..count {
        let position = lexer.position();
        match (lexer.next_token()?, lexer.next_token()?) {
            (Token::Integer(number), Token::Integer(offset)) if number >= 0 && offset >= 0 => {
                pairs.push((number as u32, offset as usize));
            }
            _ => return Err(PDFError::parse(position, "object stream header pair")),
        }
    }
    Ok(pairs)
}

/// Decoded object stream with its header
#[derive(Debug)]
pub struct ObjectStream {
    content: Vec<u8>,
    first: usize,
    header: Vec<(u32, usize)>,
}

impl ObjectStream {
    /// Decode and index an object stream
    pub fn parse(stream: &Stream) -> PDFResult<Self> {
        let content = stream.decoded_data()?.to_vec();
        let header = header_pairs(stream.dict(), &content)?;
        let first = stream.dict().get_i64("First").unwrap_or(0) as usize;
        trace!("Object stream holds {} objects", header.len());
        Ok(Self { content, first, header })
    }

    pub fn len(&self) -> usize {
        self.header.len()
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty()
    }

    /// Object numbers in stream order
    pub fn numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.header.iter().map(|&(number, _)| number)
    }

    /// Parse the object at `index`
    pub fn get(&self, index: usize) -> PDFResult<(u32, Object)> {
        let &(number, offset) = self
            .header
            .get(index)
            .ok_or_else(|| PDFError::parse(self.first, format!("object stream index {}", index)))?;
        let start = self.first.saturating_add(offset);
        if start >= self.content.len() {
            return Err(PDFError::parse(start, "object inside object stream"));
        }
        let object = PDFParser::at(&self.content, start).parse_object()?;
        Ok((number, object))
    }

    /// Every object that parses; broken members are skipped
    pub fn objects(&self) -> Vec<(u32, Object)> {
        (0..self.len())
            .filter_map(|index| match self.get(index) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("Skipping object {} of object stream: {}", index, err);
                    None
                }
            })
            .collect()
    }
}

/// Pack objects into a compressed object stream
///
/// Callers keep streams, the encryption dictionary and non-zero generations
/// out of `objects`.
pub fn pack(objects: &[(u32, Object)]) -> PDFResult<Stream> {
    let mut header = Vec::new();
    let mut body = Vec::new();
    for (number, object) in objects {
        if matches!(object, Object::Stream(_)) {
            return Err(PDFError::InvalidObjectType {
                expected: "non-stream object",
                found: object.type_name(),
            });
        }
        header.extend_from_slice(format!("{} {} ", number, body.len()).as_bytes());
        object.write_to(&mut body);
        body.push(b'\n');
    }

    let mut dict = Dictionary::with_type("ObjStm");
    dict.set("N", objects.len());
    dict.set("First", header.len());

    let mut content = header;
    content.extend_from_slice(&body);
    let mut stream = Stream::from_content(dict, content);
    stream.compress()?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test_log::test]
    fn test_read_header_and_objects() -> PDFResult<()> {
        let content = b"10 0 11 6 [1 2] << /A (x) >>".to_vec();
        let mut dict = Dictionary::with_type("ObjStm");
        dict.set("N", 2);
        dict.set("First", 10);
        let stream = Stream::new(dict, content);

        assert_eq!(read_header(&stream)?, vec![(10, 0), (11, 6)]);

        let objstm = ObjectStream::parse(&stream)?;
        assert_eq!(objstm.numbers().collect::<Vec<_>>(), vec![10, 11]);
        assert_eq!(objstm.get(0)?, (10, Object::Array(vec![1.into(), 2.into()])));
        let (number, second) = objstm.get(1)?;
        assert_eq!(number, 11);
        assert_eq!(second.as_dict()?.get_string("A"), Some(&b"x"[..]));
        assert!(objstm.get(2).is_err());
        Ok(())
    }

    #[test_log::test]
    fn test_pack_is_readable() -> PDFResult<()> {
        let objects: Vec<(u32, Object)> = (1..=20)
            .map(|n| (n, Object::Dictionary(Dictionary::with_type("Annot"))))
            .collect();
        let stream = pack(&objects)?;

        assert_eq!(stream.dict().get_name("Filter"), Some("FlateDecode"));
        let objstm = ObjectStream::parse(&stream)?;
        assert_eq!(objstm.objects(), objects);
        Ok(())
    }

    #[test_log::test]
    fn test_pack_rejects_streams() {
        let stream = Stream::new(Dictionary::new(), Vec::new());
        assert!(pack(&[(1, Object::Stream(stream))]).is_err());
    }

    #[test_log::test]
    fn test_header_missing_first() {
        let mut dict = Dictionary::with_type("ObjStm");
        dict.set("N", 1);
        let stream = Stream::new(dict, b"1 0 null".to_vec());
        assert!(matches!(
            read_header(&stream),
            Err(PDFError::MissingDictionaryEntry(key)) if key == "First"
        ));
    }
}
