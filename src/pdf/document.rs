//! PDF document: object table, lazy resolution and loading

use std::cell::{OnceCell, Ref, RefCell};
use std::collections::{BTreeMap, HashSet};

use log::{debug, trace, warn};

use super::objstm::ObjectStream;
use super::parser::{find_bytes, PDFParser};
use super::xref::{self, XRefEntry, XRefTable};
use super::{Dictionary, Object, ObjectId, Stream};
use crate::crypto::PDFCryptoEngine;
use crate::error::{Diagnostic, DiagnosticKind, PDFError, PDFResult};
use crate::handlers;
use crate::options::{LoadOptions, SaveOptions};
use crate::security::object_encryption;
use crate::EncryptionInfo;

/// Bytes searched for the `%PDF-` signature
const HEADER_WINDOW: usize = 1024;

const DEFAULT_VERSION: &str = "1.7";

/// One entry of the object table
#[derive(Debug)]
struct ObjectSlot {
    generation: u16,
    cell: OnceCell<Object>,
    /// Where to parse the object from; `None` for objects created in memory
    location: Option<XRefEntry>,
}

impl ObjectSlot {
    fn loaded(generation: u16, object: Object) -> Self {
        Self {
            generation,
            cell: OnceCell::from(object),
            location: None,
        }
    }
}

/// Loaded buffer plus what is needed to read objects from it
#[derive(Debug)]
struct Source {
    data: Vec<u8>,
    engine: Option<PDFCryptoEngine>,
    encrypt_id: Option<ObjectId>,
    /// Scan-based index, built the first time a recorded offset is wrong
    repaired: OnceCell<XRefTable>,
}

/// PDF document
///
/// Owns every object. Objects read from a file are parsed on first access
/// and cached; references are only ever resolved through this table.
#[derive(Debug)]
pub struct Document {
    version: String,
    trailer: Dictionary,
    objects: BTreeMap<u32, ObjectSlot>,
    source: Option<Source>,
    strict: bool,
    encryption: Option<EncryptionInfo>,
    uses_xref_stream: bool,
    max_id: u32,
    dirty: bool,
    loading: RefCell<HashSet<u32>>,
    diagnostics: RefCell<Vec<Diagnostic>>,
    pub(crate) page_cache: RefCell<Option<Vec<ObjectId>>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document with a catalog and an empty page tree
    pub fn new() -> Self {
        let mut document = Self::empty(DEFAULT_VERSION.to_string());

        let mut pages = Dictionary::with_type("Pages");
        pages.set("Kids", Vec::<Object>::new());
        pages.set("Count", 0);
        let pages_id = document.add_object(pages);

        let mut catalog = Dictionary::with_type("Catalog");
        catalog.set("Pages", pages_id);
        let catalog_id = document.add_object(catalog);

        document.trailer.set("Root", catalog_id);
        document.dirty = false;
        document
    }

    fn empty(version: String) -> Self {
        Self {
            version,
            trailer: Dictionary::new(),
            objects: BTreeMap::new(),
            source: None,
            strict: false,
            encryption: None,
            uses_xref_stream: false,
            max_id: 0,
            dirty: false,
            loading: RefCell::new(HashSet::new()),
            diagnostics: RefCell::new(Vec::new()),
            page_cache: RefCell::new(None),
        }
    }

    /// Load a document from a complete in-memory buffer
    pub fn load(data: &[u8]) -> PDFResult<Self> {
        Self::load_with_options(data, &LoadOptions::default())
    }

    /// Load with a password and/or strict structure checking
    ///
    /// Fails only when the buffer is not a PDF, the password is wrong, or
    /// `strict` is set and the cross-reference data is damaged. Otherwise
    /// repairs are listed in [`Document::diagnostics`].
    pub fn load_with_options(data: &[u8], options: &LoadOptions) -> PDFResult<Self> {
        let window = &data[..data.len().min(HEADER_WINDOW)];
        let header = find_bytes(window, b"%PDF-", 0)
            .ok_or_else(|| PDFError::InvalidPDF("missing %PDF- header".to_string()))?;
        let version = parse_version(&data[header + 5..]);
        debug!("Loading PDF {} ({} bytes)", version, data.len());

        let mut table = if options.strict {
            xref::build_table_strict(data)?
        } else {
            xref::build_table(data)
        };

        let mut document = Self::empty(version);
        document.strict = options.strict;
        document.uses_xref_stream = table.uses_xref_stream();
        document.diagnostics.get_mut().extend(table.take_diagnostics());

        let (entries, trailer) = table.into_parts();
        for (number, entry) in entries {
            if number == 0 || entry.is_free() {
                continue;
            }
            document.objects.insert(
                number,
                ObjectSlot {
                    generation: entry.generation(),
                    cell: OnceCell::new(),
                    location: Some(entry),
                },
            );
        }
        document.max_id = document.objects.keys().next_back().copied().unwrap_or(0);
        document.trailer = trailer;
        document.trailer.remove("Prev");
        document.trailer.remove("XRefStm");
        document.source = Some(Source {
            data: data.to_vec(),
            engine: None,
            encrypt_id: None,
            repaired: OnceCell::new(),
        });

        if document.trailer.has("Encrypt") {
            document.open_encryption(&options.password)?;
        }

        debug!("Loaded {} objects", document.objects.len());
        Ok(document)
    }

    /// Authenticate and install the decryption engine
    fn open_encryption(&mut self, password: &[u8]) -> PDFResult<()> {
        let (encrypt_dict, encrypt_id) = match self.trailer.get("Encrypt") {
            Some(Object::Reference(id)) => (self.get_object(*id)?.as_dict()?.clone(), Some(*id)),
            Some(Object::Dictionary(dict)) => (dict.clone(), None),
            _ => return Err(PDFError::encryption("/Encrypt is not a dictionary")),
        };

        let file_id = match self.trailer.get_array("ID").and_then(|ids| ids.first()) {
            Some(Object::String(id)) => id.clone(),
            _ => {
                warn!("Encrypted document has no /ID; using an empty identifier");
                Vec::new()
            }
        };

        let handler = handlers::open_security_handler(&encrypt_dict, &file_id, password)?;
        self.encryption = Some(EncryptionInfo {
            algorithm: handler.algorithm(),
            revision: handler.revision(),
            permissions: handler.permissions(),
            encrypt_metadata: handler.encrypt_metadata(),
        });
        let engine = handler.crypto_engine()?;

        self.trailer.remove("Encrypt");
        if let Some(id) = encrypt_id {
            self.objects.remove(&id.0);
        }
        if let Some(source) = self.source.as_mut() {
            source.engine = Some(engine);
            source.encrypt_id = encrypt_id;
        }
        Ok(())
    }

    /// Get an object by identifier, parsing it on first access
    ///
    /// Fails with `DanglingReference` when the number has no table entry and
    /// with `CyclicReference` when loading it requires itself.
    pub fn get_object(&self, id: ObjectId) -> PDFResult<&Object> {
        let slot = self
            .objects
            .get(&id.0)
            .ok_or(PDFError::DanglingReference(id.0, id.1))?;
        if let Some(object) = slot.cell.get() {
            return Ok(object);
        }
        if slot.generation != id.1 {
            trace!("Reference {} {} R used for generation {}", id.0, id.1, slot.generation);
        }

        if !self.loading.borrow_mut().insert(id.0) {
            return Err(PDFError::CyclicReference(id.0, id.1));
        }
        let result = self.load_slot(id.0, slot);
        self.loading.borrow_mut().remove(&id.0);

        let object = result?;
        Ok(slot.cell.get_or_init(|| object))
    }

    fn load_slot(&self, number: u32, slot: &ObjectSlot) -> PDFResult<Object> {
        let source = self
            .source
            .as_ref()
            .ok_or(PDFError::DanglingReference(number, slot.generation))?;

        match slot.location {
            Some(XRefEntry::InUse { offset, generation }) => self.load_direct(source, (number, generation), offset),
            Some(XRefEntry::Compressed { stream, index }) => self.load_compressed(number, stream, index),
            _ => Err(PDFError::DanglingReference(number, slot.generation)),
        }
    }

    fn load_direct(&self, source: &Source, id: ObjectId, offset: usize) -> PDFResult<Object> {
        let err = match self.parse_at(source, id, offset) {
            Ok(object) => return Ok(object),
            Err(err) if self.strict => return Err(err),
            Err(err) => err,
        };

        let table = source.repaired.get_or_init(|| {
            debug!("Building scan index to repair object offsets");
            xref::reconstruct(&source.data)
        });
        match table.get(id.0).copied() {
            Some(XRefEntry::InUse { offset: found, .. }) if found != offset => {
                self.record(
                    Diagnostic::new(
                        DiagnosticKind::BrokenObject,
                        format!("object {} {} not at byte {} ({}), found at byte {}", id.0, id.1, offset, err, found),
                    )
                    .at(offset),
                );
                warn!("Object {} {} relocated from byte {} to {}", id.0, id.1, offset, found);
                self.parse_at(source, id, found)
            }
            Some(XRefEntry::Compressed { stream, index }) => {
                self.record(Diagnostic::new(
                    DiagnosticKind::BrokenObject,
                    format!("object {} {} found in object stream {}", id.0, id.1, stream),
                ));
                self.load_compressed(id.0, stream, index)
            }
            _ => Err(err),
        }
    }

    /// Parse `N G obj` at `offset` and decrypt it
    fn parse_at(&self, source: &Source, id: ObjectId, offset: usize) -> PDFResult<Object> {
        if offset >= source.data.len() {
            return Err(PDFError::parse(offset, format!("object {} {} inside the file", id.0, id.1)));
        }

        let mut parser = PDFParser::at(&source.data, offset);
        let parsed = parser.parse_indirect_object(|length_id| {
            self.get_object(length_id).ok().and_then(|length| length.as_i64().ok())
        })?;
        for diagnostic in parser.take_diagnostics() {
            self.record(diagnostic);
        }
        if parsed.id.0 != id.0 {
            return Err(PDFError::parse(offset, format!("object {} {}", id.0, id.1)));
        }

        let mut object = parsed.object;
        if let Some(engine) = &source.engine {
            if source.encrypt_id != Some(parsed.id) {
                if let Err(err) = object_encryption::decrypt_object(engine, parsed.id, &mut object) {
                    warn!("Could not decrypt object {} {}: {}", id.0, id.1, err);
                    self.record(Diagnostic::new(
                        DiagnosticKind::Decryption,
                        format!("object {} {}: {}", id.0, id.1, err),
                    ));
                }
            }
        }
        Ok(object)
    }

    /// Load an object from an object stream, caching its loaded siblings
    fn load_compressed(&self, number: u32, stream_number: u32, index: u32) -> PDFResult<Object> {
        let generation = self.objects.get(&stream_number).map_or(0, |slot| slot.generation);
        let container = self.get_object((stream_number, generation))?.as_stream()?;
        let objstm = ObjectStream::parse(container)?;

        let index = index as usize;
        let position = if objstm.numbers().nth(index) == Some(number) {
            index
        } else {
            objstm
                .numbers()
                .position(|n| n == number)
                .ok_or_else(|| PDFError::parse(0, format!("object {} in object stream {}", number, stream_number)))?
        };

        for (i, sibling) in objstm.numbers().enumerate() {
            if i == position {
                continue;
            }
            let Some(slot) = self.objects.get(&sibling) else {
                continue;
            };
            let same_stream = matches!(slot.location, Some(XRefEntry::Compressed { stream, .. }) if stream == stream_number);
            if same_stream && slot.cell.get().is_none() && !self.loading.borrow().contains(&sibling) {
                if let Ok((_, object)) = objstm.get(i) {
                    if slot.cell.set(object).is_err() {
                        trace!("Object {} was cached while its stream was unpacked", sibling);
                    }
                }
            }
        }

        Ok(objstm.get(position)?.1)
    }

    /// Follow a reference chain to a direct value
    pub fn resolve(&self, id: ObjectId) -> PDFResult<&Object> {
        let mut seen = HashSet::new();
        let mut current = id;
        loop {
            if !seen.insert(current) {
                return Err(PDFError::CyclicReference(current.0, current.1));
            }
            match self.get_object(current)? {
                Object::Reference(next) => current = *next,
                object => return Ok(object),
            }
        }
    }

    /// Resolve `object` if it is a reference, otherwise return it unchanged
    pub fn resolve_object<'a>(&'a self, object: &'a Object) -> PDFResult<&'a Object> {
        match object {
            Object::Reference(id) => self.resolve(*id),
            other => Ok(other),
        }
    }

    /// Mutable access to a loaded object; marks the document dirty
    pub fn get_object_mut(&mut self, id: ObjectId) -> PDFResult<&mut Object> {
        self.get_object(id)?;
        self.mark_dirty();
        self.objects
            .get_mut(&id.0)
            .and_then(|slot| slot.cell.get_mut())
            .ok_or(PDFError::DanglingReference(id.0, id.1))
    }

    pub fn get_dictionary(&self, id: ObjectId) -> PDFResult<&Dictionary> {
        self.resolve(id)?.as_dict()
    }

    pub fn get_dictionary_mut(&mut self, id: ObjectId) -> PDFResult<&mut Dictionary> {
        self.get_object_mut(id)?.as_dict_mut()
    }

    pub fn get_stream(&self, id: ObjectId) -> PDFResult<&Stream> {
        self.resolve(id)?.as_stream()
    }

    /// Add an object under the next free number
    pub fn add_object(&mut self, object: impl Into<Object>) -> ObjectId {
        self.max_id += 1;
        let id = (self.max_id, 0);
        self.objects.insert(id.0, ObjectSlot::loaded(0, object.into()));
        self.mark_dirty();
        id
    }

    /// Insert or replace an object
    pub fn set_object(&mut self, id: ObjectId, object: impl Into<Object>) {
        self.objects.insert(id.0, ObjectSlot::loaded(id.1, object.into()));
        self.max_id = self.max_id.max(id.0);
        self.mark_dirty();
    }

    /// Remove an object from the table, returning it when it was readable
    pub fn remove_object(&mut self, id: ObjectId) -> Option<Object> {
        if let Err(err) = self.get_object(id) {
            trace!("Removing unreadable object {} {}: {}", id.0, id.1, err);
        }
        self.mark_dirty();
        self.objects.remove(&id.0).and_then(|slot| slot.cell.into_inner())
    }

    pub fn has_object(&self, number: u32) -> bool {
        self.objects.contains_key(&number)
    }

    /// Identifiers of every object in the table
    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.iter().map(|(&number, slot)| (number, slot.generation))
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn max_object_number(&self) -> u32 {
        self.max_id
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub fn trailer_mut(&mut self) -> &mut Dictionary {
        self.mark_dirty();
        &mut self.trailer
    }

    /// Reference to the document catalog
    pub fn catalog_id(&self) -> PDFResult<ObjectId> {
        self.trailer
            .get_reference("Root")
            .ok_or_else(|| PDFError::MissingDictionaryEntry("Root".to_string()))
    }

    pub fn catalog(&self) -> PDFResult<&Dictionary> {
        self.get_dictionary(self.catalog_id()?)
    }

    pub fn catalog_mut(&mut self) -> PDFResult<&mut Dictionary> {
        let id = self.catalog_id()?;
        self.get_dictionary_mut(id)
    }

    /// Header version, e.g. `"1.7"`
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
        self.mark_dirty();
    }

    /// Whether the loaded file ended with a cross-reference stream
    pub fn uses_xref_stream(&self) -> bool {
        self.uses_xref_stream
    }

    /// Encryption of the loaded file, if any; the in-memory model is plaintext
    pub fn encryption(&self) -> Option<&EncryptionInfo> {
        self.encryption.as_ref()
    }

    /// Whether the document changed since it was loaded or created
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
        self.page_cache.get_mut().take();
    }

    /// Problems repaired or skipped so far
    pub fn diagnostics(&self) -> Ref<'_, [Diagnostic]> {
        Ref::map(self.diagnostics.borrow(), |diagnostics| diagnostics.as_slice())
    }

    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.take()
    }

    pub(crate) fn record(&self, diagnostic: Diagnostic) {
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    /// Serialize the document
    pub fn save(&self, options: &SaveOptions) -> PDFResult<Vec<u8>> {
        super::writer::serialize(self, options)
    }
}

/// `1.7` from the bytes following `%PDF-`
fn parse_version(bytes: &[u8]) -> String {
    let version: String = bytes
        .iter()
        .take(8)
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|&b| char::from(b))
        .collect();
    if version.is_empty() {
        warn!("Unreadable header version, assuming {}", DEFAULT_VERSION);
        DEFAULT_VERSION.to_string()
    } else {
        version
    }
}
