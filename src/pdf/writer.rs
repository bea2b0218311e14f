//! PDF serializer
//!
//! Output is always a full rewrite: every object reachable from the trailer
//! is renumbered contiguously at generation 0, followed by a single
//! cross-reference section.

use std::collections::{HashMap, HashSet, VecDeque};

use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace, warn};
use rand::{thread_rng, RngCore};

use super::objstm::{self, MAX_OBJECTS_PER_STREAM};
use super::xref::XRefEntry;
use super::{Dictionary, Document, Object, ObjectId, PDFObject, Stream};
use crate::crypto::PDFCryptoEngine;
use crate::error::{PDFError, PDFResult};
use crate::handlers::StandardSecurityHandler;
use crate::options::{SaveOptions, XRefFormat};
use crate::security::object_encryption;

/// Second line of every file; bytes above 0x7F mark the file as binary
const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

const XREF_STREAM_VERSION: (u8, u8) = (1, 5);

/// Serialize `document` with `options`
pub fn serialize(document: &Document, options: &SaveOptions) -> PDFResult<Vec<u8>> {
    PDFWriter::new(document, options).write()
}

/// Single-use serializer for one document
pub struct PDFWriter<'a> {
    document: &'a Document,
    options: &'a SaveOptions,
    /// Old object number to new object number
    numbers: HashMap<u32, u32>,
    /// Old identifiers in output order
    order: Vec<ObjectId>,
    dangling: HashSet<u32>,
    output: Vec<u8>,
    entries: Vec<XRefEntry>,
}

impl<'a> PDFWriter<'a> {
    pub fn new(document: &'a Document, options: &'a SaveOptions) -> Self {
        Self {
            document,
            options,
            numbers: HashMap::new(),
            order: Vec::new(),
            dangling: HashSet::new(),
            output: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn write(mut self) -> PDFResult<Vec<u8>> {
        let options = self.options;
        if options.encrypt && options.owner_password.is_empty() {
            return Err(PDFError::encryption("an owner password is required to encrypt"));
        }

        self.collect()?;
        let use_stream = self.use_xref_stream();
        let version = self.output_version(use_stream);
        debug!(
            "Serializing {} objects as PDF {}.{} ({})",
            self.order.len(),
            version.0,
            version.1,
            if use_stream { "xref stream" } else { "xref table" }
        );

        let file_id = self.file_id();
        let mut objects = self.prepare_objects()?;

        let mut next_number = objects.len() as u32 + 1;
        let mut security = None;
        if options.encrypt {
            let handler = StandardSecurityHandler::new(
                options.encryption_method,
                options.permissions,
                &options.user_password,
                &options.owner_password,
                &file_id[0],
                options.encrypt_metadata,
            )?;
            let engine = handler.crypto_engine()?;
            let encrypt_number = next_number;
            next_number += 1;
            security = Some((engine, encrypt_number, handler.to_dict()));
        }

        self.output.extend_from_slice(format!("%PDF-{}.{}\n", version.0, version.1).as_bytes());
        self.output.extend_from_slice(BINARY_MARKER);
        self.entries = vec![XRefEntry::Free { next: 0, generation: 65535 }; next_number as usize];

        let engine = security.as_ref().map(|(engine, _, _)| engine);
        if options.object_streams {
            next_number = self.write_with_object_streams(objects, engine, next_number)?;
        } else {
            for (number, object) in objects.iter_mut() {
                if let Some(engine) = engine {
                    object_encryption::encrypt_object(engine, (*number, 0), object)?;
                }
                self.emit(*number, object);
            }
        }

        let mut trailer = self.trailer(&file_id)?;
        if let Some((_, encrypt_number, dict)) = security {
            self.emit(encrypt_number, &Object::Dictionary(dict));
            trailer.set("Encrypt", (encrypt_number, 0));
        }

        if use_stream {
            self.write_xref_stream(trailer, next_number)?;
        } else {
            self.write_xref_table(trailer);
        }
        debug!("Serialized {} bytes", self.output.len());
        Ok(self.output)
    }

    /// Number every object reachable from `/Root` and `/Info`, breadth first
    fn collect(&mut self) -> PDFResult<()> {
        let document = self.document;
        let trailer = document.trailer();
        let root = trailer
            .get_reference("Root")
            .ok_or_else(|| PDFError::MissingDictionaryEntry("Root".to_string()))?;

        let mut queue = VecDeque::from([root]);
        if let Some(info) = trailer.get_reference("Info") {
            queue.push_back(info);
        }
        let mut seen = HashSet::new();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.0) {
                continue;
            }
            let object = match document.get_object(id) {
                Ok(object) => object,
                Err(err) => {
                    warn!("Reference {} {} R written as null: {}", id.0, id.1, err);
                    self.dangling.insert(id.0);
                    continue;
                }
            };
            self.order.push(id);
            self.numbers.insert(id.0, self.order.len() as u32);

            let mut refs = Vec::new();
            collect_references(object, &mut refs);
            queue.extend(refs.into_iter().filter(|r| !seen.contains(&r.0)));
        }

        if !self.numbers.contains_key(&root.0) {
            return Err(PDFError::DanglingReference(root.0, root.1));
        }
        Ok(())
    }

    fn use_xref_stream(&self) -> bool {
        self.options.object_streams
            || match self.options.xref_format {
                XRefFormat::Table => false,
                XRefFormat::Stream => true,
                XRefFormat::MatchSource => self.document.uses_xref_stream(),
            }
    }

    /// Requested or source version, raised to what the output needs
    fn output_version(&self, use_stream: bool) -> (u8, u8) {
        let mut version = self
            .options
            .version
            .unwrap_or_else(|| parse_version(self.document.version()));
        if use_stream {
            version = version.max(XREF_STREAM_VERSION);
        }
        if self.options.encrypt {
            version = version.max(self.options.encryption_method.minimum_version());
        }
        version
    }

    /// First `/ID` element kept from the source, second one fresh
    fn file_id(&self) -> [Vec<u8>; 2] {
        let mut rng = thread_rng();
        let mut fresh = || {
            let mut id = vec![0u8; 16];
            rng.fill_bytes(&mut id);
            id
        };
        let original = match self.document.trailer().get_array("ID").and_then(|ids| ids.first()) {
            Some(Object::String(id)) if !id.is_empty() => id.clone(),
            _ => fresh(),
        };
        [original, fresh()]
    }

    /// Renumbered, compressed copies of every collected object
    fn prepare_objects(&self) -> PDFResult<Vec<(u32, Object)>> {
        let mut objects = Vec::with_capacity(self.order.len());
        for (i, id) in self.order.iter().enumerate() {
            let mut object = self.document.get_object(*id)?.clone();
            self.renumber(&mut object);

            if let Object::Stream(stream) = &mut object {
                if self.options.compress && !stream.dict().has_type("XRef") {
                    stream.compress()?;
                }
                let length = stream.raw_data().len();
                stream.dict_mut().set("Length", length);
            }
            objects.push((i as u32 + 1, object));
        }
        Ok(objects)
    }

    fn renumber(&self, object: &mut Object) {
        match object {
            Object::Reference(id) => {
                let old = *id;
                *object = match self.numbers.get(&old.0) {
                    Some(&number) => Object::Reference((number, 0)),
                    None => {
                        if !self.dangling.contains(&old.0) {
                            warn!("Reference {} {} R written as null", old.0, old.1);
                        }
                        Object::Null
                    }
                };
            }
            Object::Array(items) => items.iter_mut().for_each(|item| self.renumber(item)),
            Object::Dictionary(dict) => dict.iter_mut().for_each(|(_, value)| self.renumber(value)),
            Object::Stream(stream) => stream
                .dict_mut()
                .iter_mut()
                .for_each(|(_, value)| self.renumber(value)),
            _ => {}
        }
    }

    fn emit(&mut self, number: u32, object: &Object) {
        let offset = self.output.len();
        if let Some(entry) = self.entries.get_mut(number as usize) {
            *entry = XRefEntry::InUse { offset, generation: 0 };
        }
        trace!("Object {} at byte {}", number, offset);
        self.output.extend_from_slice(format!("{} 0 obj\n", number).as_bytes());
        object.write_to(&mut self.output);
        self.output.extend_from_slice(b"\nendobj\n");
    }

    /// Write streams directly and pack everything else into object streams
    fn write_with_object_streams(
        &mut self,
        objects: Vec<(u32, Object)>,
        engine: Option<&PDFCryptoEngine>,
        mut next_number: u32,
    ) -> PDFResult<u32> {
        let (streams, packable): (Vec<_>, Vec<_>) = objects
            .into_iter()
            .partition(|(_, object)| matches!(object, Object::Stream(_)));

        for (number, mut object) in streams {
            if let Some(engine) = engine {
                object_encryption::encrypt_object(engine, (number, 0), &mut object)?;
            }
            self.emit(number, &object);
        }

        for chunk in packable.chunks(MAX_OBJECTS_PER_STREAM) {
            let container = next_number;
            next_number += 1;
            for (index, (number, _)) in chunk.iter().enumerate() {
                self.entries[*number as usize] = XRefEntry::Compressed {
                    stream: container,
                    index: index as u32,
                };
            }

            let mut object = Object::Stream(objstm::pack(chunk)?);
            if let Some(engine) = engine {
                object_encryption::encrypt_object(engine, (container, 0), &mut object)?;
            }
            self.entries.push(XRefEntry::Free { next: 0, generation: 0 });
            self.emit(container, &object);
            trace!("Packed {} objects into object stream {}", chunk.len(), container);
        }
        Ok(next_number)
    }

    fn trailer(&self, file_id: &[Vec<u8>; 2]) -> PDFResult<Dictionary> {
        let source = self.document.trailer();
        let mut trailer = Dictionary::new();
        let root = source
            .get_reference("Root")
            .and_then(|root| self.numbers.get(&root.0))
            .ok_or_else(|| PDFError::MissingDictionaryEntry("Root".to_string()))?;
        trailer.set("Root", (*root, 0));
        if let Some(info) = source.get_reference("Info").and_then(|info| self.numbers.get(&info.0)) {
            trailer.set("Info", (*info, 0));
        }
        trailer.set(
            "ID",
            vec![Object::String(file_id[0].clone()), Object::String(file_id[1].clone())],
        );
        Ok(trailer)
    }

    fn write_xref_table(&mut self, mut trailer: Dictionary) {
        let start = self.output.len();
        trailer.set("Size", self.entries.len());

        let mut section = format!("xref\n0 {}\n", self.entries.len());
        for entry in &self.entries {
            match *entry {
                XRefEntry::InUse { offset, generation } => {
                    section.push_str(&format!("{:010} {:05} n \n", offset, generation))
                }
                XRefEntry::Free { next, generation } => {
                    section.push_str(&format!("{:010} {:05} f \n", next, generation))
                }
                XRefEntry::Compressed { .. } => section.push_str("0000000000 00000 f \n"),
            }
        }
        self.output.extend_from_slice(section.as_bytes());
        self.output.extend_from_slice(b"trailer\n");
        trailer.write_to(&mut self.output);
        self.output
            .extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", start).as_bytes());
    }

    fn write_xref_stream(&mut self, mut trailer: Dictionary, number: u32) -> PDFResult<()> {
        let start = self.output.len();
        self.entries.resize(number as usize, XRefEntry::Free { next: 0, generation: 0 });
        self.entries.push(XRefEntry::InUse { offset: start, generation: 0 });

        let middle = self
            .entries
            .iter()
            .map(|entry| match *entry {
                XRefEntry::InUse { offset, .. } => offset as u64,
                XRefEntry::Free { next, .. } => u64::from(next),
                XRefEntry::Compressed { stream, .. } => u64::from(stream),
            })
            .max()
            .unwrap_or(0);
        let widths = [1usize, byte_width(middle), 2];

        let row = widths.iter().sum::<usize>();
        let mut rows = vec![0u8; row * self.entries.len()];
        for (chunk, entry) in rows.chunks_exact_mut(row).zip(&self.entries) {
            let (kind, second, third) = match *entry {
                XRefEntry::Free { next, generation } => (0, u64::from(next), u64::from(generation)),
                XRefEntry::InUse { offset, generation } => (1, offset as u64, u64::from(generation)),
                XRefEntry::Compressed { stream, index } => (2, u64::from(stream), u64::from(index)),
            };
            chunk[0] = kind;
            BigEndian::write_uint(&mut chunk[1..1 + widths[1]], second, widths[1]);
            BigEndian::write_uint(&mut chunk[1 + widths[1]..], third, widths[2]);
        }

        trailer.set("Type", Object::name("XRef"));
        trailer.set("Size", self.entries.len());
        trailer.set("W", widths.iter().map(|&w| Object::from(w)).collect::<Vec<_>>());
        let mut stream = Stream::from_content(trailer, rows);
        stream.compress()?;

        PDFObject::new((number, 0), Object::Stream(stream)).write_to(&mut self.output);
        self.output
            .extend_from_slice(format!("startxref\n{}\n%%EOF\n", start).as_bytes());
        Ok(())
    }
}

/// References inside `object`; a stream's `/Length` is skipped because it
/// is rewritten from the payload
fn collect_references(object: &Object, refs: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => refs.push(*id),
        Object::Array(items) => items.iter().for_each(|item| collect_references(item, refs)),
        Object::Dictionary(dict) => dict.iter().for_each(|(_, value)| collect_references(value, refs)),
        Object::Stream(stream) => stream
            .dict()
            .iter()
            .filter(|(key, _)| key.as_str() != "Length")
            .for_each(|(_, value)| collect_references(value, refs)),
        _ => {}
    }
}

/// Bytes needed to hold `value` big-endian
fn byte_width(value: u64) -> usize {
    (((64 - value.leading_zeros()) as usize + 7) / 8).max(1)
}

fn parse_version(version: &str) -> (u8, u8) {
    let mut parts = version.split('.').map(|part| part.parse::<u8>().ok());
    match (parts.next().flatten(), parts.next().flatten()) {
        (Some(major), Some(minor)) => (major, minor),
        _ => (1, 4),
    }
}
