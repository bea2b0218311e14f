//! PDF cross-reference table implementation
//!
//! Reads classic `xref` tables, cross-reference streams and hybrid files,
//! following the `/Prev` chain from the newest section to the oldest. When the
//! structure is unusable the table is rebuilt by scanning the whole buffer for
//! `N G obj` headers.

use std::collections::{BTreeMap, HashSet};

use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace, warn};

use super::lexer::{is_regular, is_whitespace, Keyword, Lexer, Token};
use super::objstm;
use super::parser::{find_bytes, rfind_bytes, PDFParser};
use super::{Dictionary, Object};
use crate::error::{Diagnostic, DiagnosticKind, PDFError, PDFResult};

/// Keys that describe the xref stream itself rather than the document
const XREF_STREAM_KEYS: [&str; 8] = [
    "Type",
    "W",
    "Index",
    "Filter",
    "DecodeParms",
    "Length",
    "Prev",
    "XRefStm",
];

/// One cross-reference entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    Free { next: u32, generation: u16 },
    InUse { offset: usize, generation: u16 },
    /// Object stored inside an object stream
    Compressed { stream: u32, index: u32 },
}

impl XRefEntry {
    pub fn generation(&self) -> u16 {
        match *self {
            XRefEntry::Free { generation, .. } | XRefEntry::InUse { generation, .. } => generation,
            XRefEntry::Compressed { .. } => 0,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, XRefEntry::Free { .. })
    }
}

/// PDF cross-reference table
///
/// Built newest section first: an object number that already has an entry is
/// never overwritten by an older section.
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    entries: BTreeMap<u32, XRefEntry>,
    trailer: Dictionary,
    reconstructed: bool,
    uses_xref_stream: bool,
    diagnostics: Vec<Diagnostic>,
}

impl XRefTable {
    /// Create new xref table
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, number: u32) -> Option<&XRefEntry> {
        self.entries.get(&number)
    }

    /// Add an entry unless the object number is already known
    pub fn insert(&mut self, number: u32, entry: XRefEntry) -> bool {
        if self.entries.contains_key(&number) {
            return false;
        }
        self.entries.insert(number, entry);
        true
    }

    /// Add or replace an entry
    pub fn set(&mut self, number: u32, entry: XRefEntry) {
        self.entries.insert(number, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (u32, &XRefEntry)> {
        self.entries.iter().map(|(&number, entry)| (number, entry))
    }

    /// Merged trailer dictionary
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub fn max_object_number(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    /// Whether the table came from a linear scan instead of xref sections
    pub fn is_reconstructed(&self) -> bool {
        self.reconstructed
    }

    /// Whether the newest section was a cross-reference stream
    pub fn uses_xref_stream(&self) -> bool {
        self.uses_xref_stream
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Split into entries and trailer
    pub fn into_parts(self) -> (BTreeMap<u32, XRefEntry>, Dictionary) {
        (self.entries, self.trailer)
    }

    fn merge_trailer(&mut self, section: &Dictionary) {
        for (key, value) in section {
            if key != "Prev" && key != "XRefStm" && !self.trailer.has(key) {
                self.trailer.set(key.clone(), value.clone());
            }
        }
    }
}

/// Build the cross-reference table, falling back to reconstruction
///
/// Never fails: a buffer whose xref data cannot be used yields a
/// reconstructed table carrying `XRefReconstructed` diagnostics.
pub fn build_table(data: &[u8]) -> XRefTable {
    match build_table_strict(data) {
        Ok(table) => table,
        Err(err) => {
            warn!("Cross-reference data unusable ({}), scanning file", err);
            let mut table = reconstruct(data);
            table.diagnostics.insert(
                0,
                Diagnostic::new(
                    DiagnosticKind::XRefReconstructed,
                    format!("cross-reference data unusable: {}", err),
                ),
            );
            table
        }
    }
}

/// Build the cross-reference table from `startxref` without any repair
pub fn build_table_strict(data: &[u8]) -> PDFResult<XRefTable> {
    if rfind_bytes(data, b"%%EOF").is_none() {
        return Err(PDFError::parse(data.len(), "'%%EOF' marker"));
    }
    let startxref = rfind_bytes(data, b"startxref")
        .ok_or_else(|| PDFError::parse(data.len(), "'startxref'"))?;

    let mut lexer = Lexer::at(data, startxref + b"startxref".len());
    let offset = match lexer.next_token()? {
        Token::Integer(n) => usize::try_from(n).map_err(|_| PDFError::parse(startxref, "xref offset"))?,
        _ => return Err(PDFError::parse(startxref, "xref offset")),
    };
    debug!("startxref points at byte {}", offset);

    let mut table = XRefTable::new();
    let mut visited = HashSet::new();
    let mut next = Some(offset);
    let mut newest = true;

    while let Some(offset) = next.take() {
        if !visited.insert(offset) {
            warn!("Cross-reference /Prev chain loops back to byte {}", offset);
            break;
        }
        if offset >= data.len() {
            return Err(PDFError::parse(offset, "xref section inside the file"));
        }

        let (section, is_stream) = read_section(data, offset, &mut table)?;
        if newest {
            table.uses_xref_stream = is_stream;
            newest = false;
        }
        table.merge_trailer(&section);
        next = section.get_i64("Prev").and_then(|prev| usize::try_from(prev).ok());
    }

    if !table.trailer.has("Root") {
        return Err(PDFError::MissingDictionaryEntry("Root".to_string()));
    }

    debug!("Cross-reference table has {} entries", table.len());
    Ok(table)
}

/// Read one section, returning its trailer and whether it was a stream
fn read_section(data: &[u8], offset: usize, table: &mut XRefTable) -> PDFResult<(Dictionary, bool)> {
    let mut lexer = Lexer::at(data, offset);
    lexer.skip_whitespace();
    let start = lexer.position();

    if data[start..].starts_with(b"xref") {
        Ok((read_table_section(data, start, table)?, false))
    } else {
        Ok((read_stream_section(data, start, table)?, true))
    }
}

fn expect_integer(lexer: &mut Lexer<'_>, expected: &str) -> PDFResult<i64> {
    let position = lexer.position();
    match lexer.next_token()? {
        Token::Integer(n) if n >= 0 => Ok(n),
        _ => Err(PDFError::parse(position, expected)),
    }
}

/// Classic `xref` table followed by `trailer`
fn read_table_section(data: &[u8], start: usize, table: &mut XRefTable) -> PDFResult<Dictionary> {
    trace!("Reading xref table at {}", start);
    let mut lexer = Lexer::at(data, start);
    match lexer.next_token()? {
        Token::Keyword(Keyword::XRef) => {}
        _ => return Err(PDFError::parse(start, "'xref'")),
    }

    let mut in_use = Vec::new();
    let mut free = Vec::new();
    loop {
        lexer.skip_whitespace();
        let position = lexer.position();
        match lexer.next_token()? {
            Token::Keyword(Keyword::Trailer) => break,
            Token::Integer(first) if first >= 0 => {
                let count = expect_integer(&mut lexer, "xref subsection count")?;
                if count as usize > data.len() / 18 + 1 {
                    return Err(PDFError::parse(position, "plausible xref subsection count"));
                }
                for i in 0..count {
                    let number = first
                        .checked_add(i)
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| PDFError::parse(position, "object number"))?;
                    let field = expect_integer(&mut lexer, "xref entry offset")?;
                    let generation = expect_integer(&mut lexer, "xref entry generation")?;
                    let generation = u16::try_from(generation).unwrap_or(u16::MAX);
                    let marker_at = lexer.position();
                    match lexer.next_token()? {
                        Token::Keyword(Keyword::Other(kind)) if kind == "n" => {
                            let offset = usize::try_from(field).map_err(|_| PDFError::parse(marker_at, "offset"))?;
                            in_use.push((number, XRefEntry::InUse { offset, generation }));
                        }
                        Token::Keyword(Keyword::Other(kind)) if kind == "f" => {
                            let next = u32::try_from(field).unwrap_or(0);
                            free.push((number, XRefEntry::Free { next, generation }));
                        }
                        _ => return Err(PDFError::parse(marker_at, "'n' or 'f'")),
                    }
                }
            }
            _ => return Err(PDFError::parse(position, "xref subsection or 'trailer'")),
        }
    }

    let trailer_at = lexer.position();
    let mut parser = PDFParser::at(data, trailer_at);
    let trailer = match parser.parse_object()? {
        Object::Dictionary(dict) => dict,
        other => {
            return Err(PDFError::InvalidObjectType {
                expected: "dictionary",
                found: other.type_name(),
            })
        }
    };

    for (number, entry) in in_use {
        table.insert(number, entry);
    }
    if let Some(stm_offset) = trailer.get_i64("XRefStm").and_then(|o| usize::try_from(o).ok()) {
        if let Err(err) = read_stream_section(data, stm_offset, table) {
            warn!("Ignoring unreadable /XRefStm at {}: {}", stm_offset, err);
        }
    }
    for (number, entry) in free {
        table.insert(number, entry);
    }

    Ok(trailer)
}

/// Decodes one `[type, field2, field3]` row; `None` for unknown types or fields too wide for their slot.
fn stream_entry(fields: [u64; 3]) -> Option<XRefEntry> {
    let [kind, second, third] = fields;
    match kind {
        0 => Some(XRefEntry::Free {
            next: u32::try_from(second).ok()?,
            generation: u16::try_from(third).ok()?,
        }),
        1 => Some(XRefEntry::InUse {
            offset: usize::try_from(second).ok()?,
            generation: u16::try_from(third).ok()?,
        }),
        2 => Some(XRefEntry::Compressed {
            stream: u32::try_from(second).ok()?,
            index: u32::try_from(third).ok()?,
        }),
        _ => None,
    }
}

/// Cross-reference stream (`/Type /XRef`)
fn read_stream_section(data: &[u8], start: usize, table: &mut XRefTable) -> PDFResult<Dictionary> {
    trace!("Reading xref stream at {}", start);
    let mut parser = PDFParser::at(data, start);
    let object = parser.parse_indirect_object(|_| None)?;
    let stream = match object.object {
        Object::Stream(stream) => stream,
        other => {
            return Err(PDFError::InvalidObjectType {
                expected: "stream",
                found: other.type_name(),
            })
        }
    };

    let dict = stream.dict();
    if !dict.has_type("XRef") {
        return Err(PDFError::parse(start, "/Type /XRef stream"));
    }

    let widths = dict
        .get_array("W")
        .ok_or_else(|| PDFError::MissingDictionaryEntry("W".to_string()))?
        .iter()
        .map(|w| w.as_i64().ok().and_then(|w| usize::try_from(w).ok()).filter(|&w| w <= 8))
        .collect::<Option<Vec<usize>>>()
        .filter(|w| w.len() == 3)
        .ok_or_else(|| PDFError::parse(start, "/W array of three widths up to 8"))?;
    let row_len: usize = widths.iter().sum();
    if row_len == 0 {
        return Err(PDFError::parse(start, "non-zero /W row width"));
    }

    let size = dict.get_i64("Size").unwrap_or(0);
    let index: Vec<(i64, i64)> = match dict.get_array("Index") {
        Some(items) => items
            .chunks_exact(2)
            .filter_map(|pair| Some((pair[0].as_i64().ok()?, pair[1].as_i64().ok()?)))
            .collect(),
        None => vec![(0, size)],
    };

    let content = stream.decoded_data()?;
    let mut rows = content.chunks_exact(row_len);

    'sections: for (first, count) in index {
        for i in 0..count.max(0) {
            let Some(row) = rows.next() else {
                warn!("Cross-reference stream at {} is shorter than its /Index", start);
                break 'sections;
            };
            let Some(number) = first.checked_add(i).and_then(|n| u32::try_from(n).ok()) else {
                continue;
            };

            let mut fields = [0u64; 3];
            let mut pos = 0;
            for (field, &width) in fields.iter_mut().zip(&widths) {
                if width > 0 {
                    *field = BigEndian::read_uint(&row[pos..pos + width], width);
                }
                pos += width;
            }
            if widths[0] == 0 {
                fields[0] = 1;
            }

            let Some(entry) = stream_entry(fields) else {
                warn!("Skipping out-of-range xref stream entry {:?} for object {}", fields, number);
                continue;
            };
            table.insert(number, entry);
        }
    }

    let mut trailer = dict.clone();
    for key in XREF_STREAM_KEYS {
        if key != "Prev" && key != "XRefStm" {
            trailer.remove(key);
        }
    }
    Ok(trailer)
}

/// Rebuild a table by scanning for `N G obj` headers
///
/// Later definitions of an object number win, matching incremental updates.
/// Objects inside discovered object streams are indexed when no direct
/// definition exists. The trailer comes from the last usable `trailer`
/// dictionary, else the last xref stream dictionary, else a discovered
/// `/Type /Catalog` object.
pub fn reconstruct(data: &[u8]) -> XRefTable {
    let mut table = XRefTable::new();
    table.reconstructed = true;

    let mut pos = 0;
    while let Some(at) = find_bytes(data, b"obj", pos) {
        pos = at + 3;
        if data.get(at + 3).is_some_and(|&b| is_regular(b)) {
            continue;
        }
        if let Some((start, number, generation)) = header_before(data, at) {
            trace!("Found object {} {} at {}", number, generation, start);
            table.set(number, XRefEntry::InUse { offset: start, generation });
        }
    }

    let mut catalog = None;
    let mut xref_trailer = None;
    let direct: Vec<(u32, usize)> = table
        .entries()
        .filter_map(|(number, entry)| match *entry {
            XRefEntry::InUse { offset, .. } => Some((number, offset)),
            _ => None,
        })
        .collect();

    for (number, offset) in direct {
        let mut parser = PDFParser::at(data, offset);
        let Ok(object) = parser.parse_indirect_object(|_| None) else {
            continue;
        };
        match &object.object {
            Object::Dictionary(dict) if dict.has_type("Catalog") => catalog = Some(object.id),
            Object::Stream(stream) if stream.dict().has_type("XRef") => {
                let mut dict = stream.dict().clone();
                for key in XREF_STREAM_KEYS {
                    dict.remove(key);
                }
                xref_trailer = Some(dict);
            }
            Object::Stream(stream) if stream.dict().has_type("ObjStm") => match objstm::read_header(stream) {
                Ok(header) => {
                    for (index, (inner, _)) in header.into_iter().enumerate() {
                        table.insert(
                            inner,
                            XRefEntry::Compressed {
                                stream: number,
                                index: index as u32,
                            },
                        );
                    }
                }
                Err(err) => warn!("Object stream {} is unreadable: {}", number, err),
            },
            _ => {}
        }
    }

    let mut trailer = last_trailer_dictionary(data, &table);
    if trailer.is_none() {
        trailer = xref_trailer.filter(|dict| dict.has("Root"));
    }
    let mut trailer = trailer.unwrap_or_default();
    if !trailer.has("Root") {
        match catalog {
            Some(id) => {
                warn!("No trailer found, using catalog {} {}", id.0, id.1);
                trailer.set("Root", Object::Reference(id));
            }
            None => {
                warn!("No document catalog found while scanning");
                table.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::XRefReconstructed,
                    "no document catalog found",
                ));
            }
        }
    }
    trailer.set("Size", table.max_object_number() as i64 + 1);
    table.trailer = trailer;

    debug!("Reconstructed cross-reference table with {} entries", table.len());
    table.diagnostics.push(Diagnostic::new(
        DiagnosticKind::XRefReconstructed,
        format!("rebuilt cross-reference table from {} objects", table.len()),
    ));
    table
}

/// Locate `N G` immediately before an `obj` keyword at `at`
fn header_before(data: &[u8], at: usize) -> Option<(usize, u32, u16)> {
    let mut i = at;
    let skip_spaces = |mut i: usize| {
        while i > 0 && is_whitespace(data[i - 1]) {
            i -= 1;
        }
        i
    };
    let digits_before = |end: usize| {
        let mut start = end;
        while start > 0 && data[start - 1].is_ascii_digit() && end - start < 10 {
            start -= 1;
        }
        start
    };

    let gen_end = skip_spaces(i);
    if gen_end == at {
        return None;
    }
    let gen_start = digits_before(gen_end);
    if gen_start == gen_end || gen_start == 0 || !is_whitespace(data[gen_start - 1]) {
        return None;
    }

    i = skip_spaces(gen_start);
    let num_start = digits_before(i);
    if num_start == i {
        return None;
    }
    if num_start > 0 && is_regular(data[num_start - 1]) {
        return None;
    }

    let generation = std::str::from_utf8(&data[gen_start..gen_end]).ok()?.parse().ok()?;
    let number = std::str::from_utf8(&data[num_start..i]).ok()?.parse().ok()?;
    Some((num_start, number, generation))
}

fn last_trailer_dictionary(data: &[u8], table: &XRefTable) -> Option<Dictionary> {
    let mut found = None;
    let mut pos = 0;
    while let Some(at) = find_bytes(data, b"trailer", pos) {
        pos = at + b"trailer".len();
        let mut parser = PDFParser::at(data, pos);
        if let Ok(Object::Dictionary(dict)) = parser.parse_object() {
            let root_known = dict
                .get_reference("Root")
                .is_some_and(|(number, _)| table.get(number).is_some());
            if root_known {
                found = Some(dict);
            }
        }
    }
    found.map(|mut dict| {
        dict.remove("Prev");
        dict.remove("XRefStm");
        dict
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Lay out objects and a classic xref section, returning the buffer
    fn classic_file(objects: &[(u32, &str)], trailer: &str) -> Vec<u8> {
        let mut data = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (number, body) in objects {
            offsets.push((*number, data.len()));
            data.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", number, body).as_bytes());
        }
        let xref_at = data.len();
        let size = objects.iter().map(|(n, _)| n + 1).max().unwrap_or(1);
        data.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
        data.extend_from_slice(b"0000000000 65535 f \n");
        for number in 1..size {
            match offsets.iter().find(|(n, _)| *n == number) {
                Some((_, offset)) => data.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes()),
                None => data.extend_from_slice(b"0000000000 00000 f \n"),
            }
        }
        data.extend_from_slice(format!("trailer\n{}\nstartxref\n{}\n%%EOF\n", trailer, xref_at).as_bytes());
        data
    }

    #[test_log::test]
    fn test_classic_table() -> PDFResult<()> {
        let data = classic_file(
            &[(1, "<< /Type /Catalog /Pages 2 0 R >>"), (2, "<< /Type /Pages /Kids [] /Count 0 >>")],
            "<< /Size 3 /Root 1 0 R >>",
        );
        let table = build_table_strict(&data)?;

        assert_eq!(table.len(), 3);
        assert!(table.get(0).is_some_and(XRefEntry::is_free));
        assert_eq!(table.get(1), Some(&XRefEntry::InUse { offset: 9, generation: 0 }));
        assert_eq!(table.trailer().get_reference("Root"), Some((1, 0)));
        assert!(!table.is_reconstructed());
        assert!(!table.uses_xref_stream());
        Ok(())
    }

    #[test_log::test]
    fn test_incremental_update_newest_wins() -> PDFResult<()> {
        let mut data = classic_file(
            &[(1, "<< /Type /Catalog >>"), (5, "(base)")],
            "<< /Size 6 /Root 1 0 R >>",
        );
        let first_xref = rfind_bytes(&data, b"xref\n0 6").ok_or_else(|| PDFError::parse(0, "xref"))?;

        let updated_at = data.len();
        data.extend_from_slice(b"5 0 obj\n(updated)\nendobj\n");
        let xref_at = data.len();
        data.extend_from_slice(format!("xref\n5 1\n{:010} 00000 n \n", updated_at).as_bytes());
        data.extend_from_slice(
            format!(
                "trailer\n<< /Size 6 /Root 1 0 R /Prev {} >>\nstartxref\n{}\n%%EOF\n",
                first_xref, xref_at
            )
            .as_bytes(),
        );

        let table = build_table_strict(&data)?;
        assert_eq!(
            table.get(5),
            Some(&XRefEntry::InUse { offset: updated_at, generation: 0 })
        );
        assert!(!table.trailer().has("Prev"));
        Ok(())
    }

    #[test_log::test]
    fn test_xref_stream() -> PDFResult<()> {
        let mut data = b"%PDF-1.5\n".to_vec();
        let catalog_at = data.len();
        data.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");

        let xref_at = data.len();
        let mut rows = Vec::new();
        rows.extend_from_slice(&[0, 0, 0, 0xff]);
        rows.extend_from_slice(&[1, (catalog_at >> 8) as u8, catalog_at as u8, 0]);
        rows.extend_from_slice(&[2, 0, 7, 3]);
        rows.extend_from_slice(&[1, (xref_at >> 8) as u8, xref_at as u8, 0]);
        data.extend_from_slice(
            format!(
                "4 0 obj\n<< /Type /XRef /Size 5 /W [1 2 1] /Index [0 3 4 1] /Root 1 0 R /Length {} >>\nstream\n",
                rows.len()
            )
            .as_bytes(),
        );
        data.extend_from_slice(&rows);
        data.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{}\n%%EOF\n", xref_at).as_bytes());

        let table = build_table_strict(&data)?;
        assert!(table.uses_xref_stream());
        assert_eq!(table.get(1), Some(&XRefEntry::InUse { offset: catalog_at, generation: 0 }));
        assert_eq!(table.get(2), Some(&XRefEntry::Compressed { stream: 7, index: 3 }));
        assert_eq!(table.get(3), None);
        assert_eq!(table.get(4), Some(&XRefEntry::InUse { offset: xref_at, generation: 0 }));
        assert_eq!(table.trailer().get_reference("Root"), Some((1, 0)));
        assert!(!table.trailer().has("W"));
        Ok(())
    }

    #[test_log::test]
    fn test_xref_stream_skips_fields_wider_than_their_slot() -> PDFResult<()> {
        let mut data = b"%PDF-1.5\n".to_vec();
        let catalog_at = data.len();
        data.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");

        let xref_at = data.len();
        let row = |kind: u8, second: u64, third: u32| {
            let mut row = vec![kind];
            row.extend_from_slice(&second.to_be_bytes());
            row.extend_from_slice(&third.to_be_bytes());
            row
        };
        let mut rows = Vec::new();
        rows.extend(row(0, 1 << 33, 0xffff));
        rows.extend(row(1, catalog_at as u64, 0));
        rows.extend(row(2, 1 << 40, 0));
        rows.extend(row(1, xref_at as u64, 0x1_0000));
        rows.extend(row(1, xref_at as u64, 0));
        data.extend_from_slice(
            format!(
                "4 0 obj\n<< /Type /XRef /Size 5 /W [1 8 4] /Index [0 3 3 2] /Root 1 0 R /Length {} >>\nstream\n",
                rows.len()
            )
            .as_bytes(),
        );
        data.extend_from_slice(&rows);
        data.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{}\n%%EOF\n", xref_at).as_bytes());

        let table = build_table_strict(&data)?;
        assert_eq!(table.get(0), None);
        assert_eq!(table.get(1), Some(&XRefEntry::InUse { offset: catalog_at, generation: 0 }));
        assert_eq!(table.get(2), None);
        assert_eq!(table.get(3), None);
        assert_eq!(table.get(4), Some(&XRefEntry::InUse { offset: xref_at, generation: 0 }));
        Ok(())
    }

    #[test_log::test]
    fn test_subsection_start_beyond_object_range() {
        let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\nxref\n9223372036854775807 2\n\
0000000009 00000 n \n0000000009 00000 n \ntrailer\n<< /Size 2 /Root 1 0 R >>\nstartxref\n45\n%%EOF\n";
        assert_eq!(rfind_bytes(data, b"xref\n9223"), Some(45));

        assert!(build_table_strict(data).is_err());
        let table = build_table(data);
        assert!(table.is_reconstructed());
        assert_eq!(table.get(1), Some(&XRefEntry::InUse { offset: 9, generation: 0 }));
    }

    #[test_log::test]
    fn test_broken_startxref_reconstructs() {
        let mut data = classic_file(
            &[(1, "<< /Type /Catalog /Pages 2 0 R >>"), (2, "<< /Type /Pages /Kids [] /Count 0 >>")],
            "<< /Size 3 /Root 1 0 R >>",
        );
        let at = rfind_bytes(&data, b"startxref").unwrap_or(0);
        data.truncate(at);
        data.extend_from_slice(b"startxref\n999999\n%%EOF\n");

        assert!(build_table_strict(&data).is_err());
        let table = build_table(&data);
        assert!(table.is_reconstructed());
        assert!(!table.diagnostics().is_empty());
        assert_eq!(table.get(2), Some(&XRefEntry::InUse { offset: 58, generation: 0 }));
        assert_eq!(table.trailer().get_reference("Root"), Some((1, 0)));
    }

    #[test_log::test]
    fn test_reconstruct_without_trailer_finds_catalog() {
        let data = b"%PDF-1.7\n3 0 obj\n<< /Type /Catalog >>\nendobj\n7 1 obj\n42\nendobj\n";
        let table = reconstruct(data);

        assert_eq!(table.get(7), Some(&XRefEntry::InUse { offset: 45, generation: 1 }));
        assert_eq!(table.trailer().get_reference("Root"), Some((3, 0)));
        assert_eq!(table.trailer().get_i64("Size"), Some(8));
    }

    #[test_log::test]
    fn test_prev_loop_terminates() -> PDFResult<()> {
        let mut data = classic_file(&[(1, "<< /Type /Catalog >>")], "<< /Size 2 /Root 1 0 R >>");
        let xref_at = rfind_bytes(&data, b"xref\n0 2").ok_or_else(|| PDFError::parse(0, "xref"))?;
        let trailer_at = rfind_bytes(&data, b"<< /Size 2").ok_or_else(|| PDFError::parse(0, "trailer"))?;
        let tail = data.split_off(trailer_at);
        let patched = String::from_utf8_lossy(&tail).replace(
            "<< /Size 2 /Root 1 0 R >>",
            &format!("<< /Size 2 /Root 1 0 R /Prev {} >>", xref_at),
        );
        data.extend_from_slice(patched.as_bytes());

        let table = build_table_strict(&data)?;
        assert_eq!(table.len(), 2);
        Ok(())
    }

    #[test_log::test]
    fn test_missing_eof_is_structural_failure() {
        let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n";
        assert!(build_table_strict(data).is_err());
        assert!(build_table(data).is_reconstructed());
    }
}
