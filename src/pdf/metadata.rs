//! Document information dictionary and PDF text strings

use log::trace;

use super::{Dictionary, Document, Object};
use crate::error::PDFResult;

const UTF16BE_BOM: [u8; 2] = [0xFE, 0xFF];
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// PDFDocEncoding code points for bytes 0x18..=0x1F
const PDFDOC_18: [char; 8] = ['\u{02D8}', '\u{02C7}', '\u{02C6}', '\u{02D9}', '\u{02DD}', '\u{02DB}', '\u{02DA}', '\u{02DC}'];

/// PDFDocEncoding code points for bytes 0x80..=0xA0
const PDFDOC_80: [char; 33] = [
    '\u{2022}', '\u{2020}', '\u{2021}', '\u{2026}', '\u{2014}', '\u{2013}', '\u{0192}', '\u{2044}',
    '\u{2039}', '\u{203A}', '\u{2212}', '\u{2030}', '\u{201E}', '\u{201C}', '\u{201D}', '\u{2018}',
    '\u{2019}', '\u{201A}', '\u{2122}', '\u{FB01}', '\u{FB02}', '\u{0141}', '\u{0152}', '\u{0160}',
    '\u{0178}', '\u{017D}', '\u{0131}', '\u{0142}', '\u{0153}', '\u{0161}', '\u{017E}', '\u{FFFD}',
    '\u{20AC}',
];

/// Decode a text string: UTF-16BE or UTF-8 with a byte order mark,
/// PDFDocEncoding otherwise
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&UTF16BE_BOM) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(utf8) = bytes.strip_prefix(&UTF8_BOM) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    bytes.iter().map(|&b| pdfdoc_char(b)).collect()
}

/// Encode a text string, using PDFDocEncoding when every character fits
/// and UTF-16BE with a byte order mark otherwise
pub fn encode_text_string(text: &str) -> Vec<u8> {
    if let Some(bytes) = text.chars().map(pdfdoc_byte).collect::<Option<Vec<u8>>>() {
        return bytes;
    }
    let mut bytes = UTF16BE_BOM.to_vec();
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes
}

fn pdfdoc_char(byte: u8) -> char {
    match byte {
        0x18..=0x1F => PDFDOC_18[usize::from(byte - 0x18)],
        0x7F => '\u{FFFD}',
        0x80..=0xA0 => PDFDOC_80[usize::from(byte - 0x80)],
        _ => char::from(byte),
    }
}

fn pdfdoc_byte(ch: char) -> Option<u8> {
    match u32::from(ch) {
        0x09 | 0x0A | 0x0D | 0x20..=0x7E | 0xA1..=0xFF => u8::try_from(u32::from(ch)).ok(),
        _ => {
            if let Some(i) = PDFDOC_18.iter().position(|&c| c == ch) {
                return u8::try_from(i + 0x18).ok();
            }
            PDFDOC_80
                .iter()
                .position(|&c| c == ch && c != '\u{FFFD}')
                .and_then(|i| u8::try_from(i + 0x80).ok())
        }
    }
}

/// Standard entries of the document information dictionary
///
/// Dates are kept in their PDF form, e.g. `D:20240131120000Z`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub mod_date: Option<String>,
}

impl Metadata {
    fn entries(&self) -> [(&'static str, &Option<String>); 8] {
        [
            ("Title", &self.title),
            ("Author", &self.author),
            ("Subject", &self.subject),
            ("Keywords", &self.keywords),
            ("Creator", &self.creator),
            ("Producer", &self.producer),
            ("CreationDate", &self.creation_date),
            ("ModDate", &self.mod_date),
        ]
    }

    fn from_info(document: &Document, info: &Dictionary) -> PDFResult<Self> {
        let read = |key: &str| -> PDFResult<Option<String>> {
            match info.get(key) {
                Some(value) => match document.resolve_object(value)? {
                    Object::String(bytes) => Ok(Some(decode_text_string(bytes))),
                    _ => Ok(None),
                },
                None => Ok(None),
            }
        };
        Ok(Self {
            title: read("Title")?,
            author: read("Author")?,
            subject: read("Subject")?,
            keywords: read("Keywords")?,
            creator: read("Creator")?,
            producer: read("Producer")?,
            creation_date: read("CreationDate")?,
            mod_date: read("ModDate")?,
        })
    }
}

impl Document {
    /// Read `/Info`; a document without one yields empty metadata
    pub fn metadata(&self) -> PDFResult<Metadata> {
        match self.trailer().get("Info") {
            Some(info) => match self.resolve_object(info)? {
                Object::Dictionary(info) => Metadata::from_info(self, info),
                _ => Ok(Metadata::default()),
            },
            None => Ok(Metadata::default()),
        }
    }

    /// Write `/Info`, creating it when absent
    ///
    /// `None` fields remove the entry; keys outside [`Metadata`] are kept.
    pub fn set_metadata(&mut self, metadata: &Metadata) -> PDFResult<()> {
        let info_id = match self.trailer().get("Info").cloned() {
            Some(Object::Reference(id)) if self.has_object(id.0) => id,
            Some(Object::Dictionary(inline)) => {
                let id = self.add_object(inline);
                self.trailer_mut().set("Info", id);
                id
            }
            _ => {
                let id = self.add_object(Dictionary::new());
                self.trailer_mut().set("Info", id);
                id
            }
        };

        let info = self.get_dictionary_mut(info_id)?;
        for (key, value) in metadata.entries() {
            match value {
                Some(text) => info.set(key, Object::String(encode_text_string(text))),
                None => {
                    info.remove(key);
                }
            }
        }
        trace!("Updated /Info {} {}", info_id.0, info_id.1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case::ascii("Annual Report", b"Annual Report".to_vec())]
    #[case::latin1("Café", b"Caf\xE9".to_vec())]
    #[case::pdfdoc("\u{2022} \u{20AC}5", b"\x80 \xA05".to_vec())]
    #[case::utf16("日本", vec![0xFE, 0xFF, 0x65, 0xE5, 0x67, 0x2C])]
    fn test_text_string_codec(#[case] text: &str, #[case] bytes: Vec<u8>) {
        assert_eq!(encode_text_string(text), bytes);
        assert_eq!(decode_text_string(&bytes), text);
    }

    #[test_log::test]
    fn test_utf8_bom() {
        assert_eq!(decode_text_string(b"\xEF\xBB\xBFna\xC3\xAFve"), "naïve");
    }

    #[test_log::test]
    fn test_metadata_set_get() -> PDFResult<()> {
        let mut document = Document::new();
        assert_eq!(document.metadata()?, Metadata::default());

        let metadata = Metadata {
            title: Some("Résumé".to_string()),
            author: Some("Ødegaard 著".to_string()),
            creation_date: Some("D:20240131120000Z".to_string()),
            ..Metadata::default()
        };
        document.set_metadata(&metadata)?;
        assert_eq!(document.metadata()?, metadata);

        let cleared = Metadata {
            title: Some("Draft".to_string()),
            ..Metadata::default()
        };
        document.set_metadata(&cleared)?;
        assert_eq!(document.metadata()?, cleared);
        Ok(())
    }

    #[test_log::test]
    fn test_unknown_keys_preserved() -> PDFResult<()> {
        let mut document = Document::new();
        let mut info = Dictionary::new();
        info.set("Custom", Object::string("kept"));
        let info = document.add_object(info);
        document.trailer_mut().set("Info", info);

        document.set_metadata(&Metadata {
            subject: Some("Tests".to_string()),
            ..Metadata::default()
        })?;
        let info = document.get_dictionary(info)?;
        assert_eq!(info.get_string("Custom"), Some(&b"kept"[..]));
        assert_eq!(info.get_string("Subject"), Some(&b"Tests"[..]));
        Ok(())
    }
}
