//! Page tree: flattened page list, lazy attribute inheritance and page CRUD

use std::collections::HashSet;

use log::{debug, trace, warn};

use super::{Dictionary, Document, Object, ObjectId, Stream};
use crate::error::{Diagnostic, DiagnosticKind, PDFError, PDFResult};

/// US Letter, used when no node in the chain declares a `/MediaBox`
pub const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Borrowed view of one page
///
/// Inheritable attributes are looked up through the `/Parent` chain on every
/// access, so edits to ancestor nodes are visible immediately.
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    document: &'a Document,
    id: ObjectId,
    index: usize,
}

impl<'a> Page<'a> {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Zero-based position in document order
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn dictionary(&self) -> PDFResult<&'a Dictionary> {
        self.document.get_dictionary(self.id)
    }

    /// Look up `key` on the page, then on each ancestor `/Pages` node
    ///
    /// The returned value is already resolved. A `/Parent` chain that loops
    /// fails with `CyclicReference` on the repeated node.
    pub fn get_inherited(&self, key: &str) -> PDFResult<Option<&'a Object>> {
        let document = self.document;
        let mut visited = HashSet::new();
        let mut current = self.id;

        loop {
            if !visited.insert(current.0) {
                return Err(PDFError::CyclicReference(current.0, current.1));
            }
            let node = document.get_dictionary(current)?;
            if let Some(value) = node.get(key) {
                return document.resolve_object(value).map(Some);
            }
            match node.get_reference("Parent") {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
    }

    /// Page boundaries, defaulting to US Letter
    pub fn media_box(&self) -> PDFResult<[f64; 4]> {
        match self.get_inherited("MediaBox")? {
            Some(value) => self.rectangle(value),
            None => Ok(DEFAULT_MEDIA_BOX),
        }
    }

    /// Visible region, defaulting to the media box
    pub fn crop_box(&self) -> PDFResult<[f64; 4]> {
        match self.get_inherited("CropBox")? {
            Some(value) => self.rectangle(value),
            None => self.media_box(),
        }
    }

    pub fn resources(&self) -> PDFResult<Option<&'a Dictionary>> {
        match self.get_inherited("Resources")? {
            Some(value) => value.as_dict().map(Some),
            None => Ok(None),
        }
    }

    /// Clockwise rotation in degrees, normalised to 0, 90, 180 or 270
    pub fn rotate(&self) -> PDFResult<i64> {
        let rotate = match self.get_inherited("Rotate")? {
            Some(value) => value.as_i64()?,
            None => 0,
        };
        if rotate % 90 != 0 {
            warn!("Page {} has /Rotate {}, not a multiple of 90", self.index, rotate);
        }
        Ok(rotate.rem_euclid(360) / 90 * 90)
    }

    /// Identifiers of the content streams, in drawing order
    pub fn content_ids(&self) -> PDFResult<Vec<ObjectId>> {
        let document = self.document;
        let items = match self.dictionary()?.get("Contents") {
            None | Some(Object::Null) => return Ok(Vec::new()),
            Some(Object::Reference(id)) => match document.get_object(*id)? {
                Object::Stream(_) => return Ok(vec![*id]),
                Object::Array(items) => items,
                other => {
                    return Err(PDFError::InvalidObjectType {
                        expected: "stream or array",
                        found: other.type_name(),
                    })
                }
            },
            Some(Object::Array(items)) => items,
            Some(other) => {
                return Err(PDFError::InvalidObjectType {
                    expected: "stream or array",
                    found: other.type_name(),
                })
            }
        };
        items.iter().map(Object::as_reference).collect()
    }

    /// Decoded content streams joined with newlines
    pub fn contents(&self) -> PDFResult<Vec<u8>> {
        let mut content = Vec::new();
        for (i, id) in self.content_ids()?.into_iter().enumerate() {
            if i > 0 {
                content.push(b'\n');
            }
            content.extend_from_slice(self.document.get_stream(id)?.decoded_data()?);
        }
        Ok(content)
    }

    fn rectangle(&self, value: &Object) -> PDFResult<[f64; 4]> {
        let items = value.as_array()?;
        if items.len() != 4 {
            return Err(PDFError::InvalidObjectType {
                expected: "rectangle",
                found: "array",
            });
        }
        let mut rect = [0.0; 4];
        for (slot, item) in rect.iter_mut().zip(items) {
            *slot = self.document.resolve_object(item)?.as_f64()?;
        }
        Ok(rect)
    }
}

impl Document {
    /// Page identifiers in document order
    ///
    /// Malformed nodes (loops, unresolvable kids, missing catalog) are skipped
    /// and reported as `PageTree` diagnostics.
    pub fn page_ids(&self) -> PDFResult<Vec<ObjectId>> {
        if let Some(cached) = self.page_cache.borrow().as_ref() {
            return Ok(cached.clone());
        }
        let pages = self.collect_pages();
        *self.page_cache.borrow_mut() = Some(pages.clone());
        Ok(pages)
    }

    fn collect_pages(&self) -> Vec<ObjectId> {
        let root = match self.catalog().map(|catalog| catalog.get_reference("Pages")) {
            Ok(Some(root)) => root,
            Ok(None) => {
                self.page_tree_problem("catalog has no /Pages reference".to_string());
                return Vec::new();
            }
            Err(err) => {
                self.page_tree_problem(format!("catalog unavailable: {}", err));
                return Vec::new();
            }
        };

        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            if !visited.insert(id.0) {
                self.page_tree_problem(format!("node {} {} appears twice in the page tree", id.0, id.1));
                continue;
            }
            let node = match self.get_dictionary(id) {
                Ok(node) => node,
                Err(err) => {
                    self.page_tree_problem(format!("node {} {} skipped: {}", id.0, id.1, err));
                    continue;
                }
            };

            let is_pages = match node.type_name() {
                Some("Pages") => true,
                Some("Page") => false,
                _ => node.has("Kids"),
            };
            if !is_pages {
                pages.push(id);
                continue;
            }

            let kids = node.get_array("Kids").map(Vec::as_slice).unwrap_or_default();
            for kid in kids.iter().rev() {
                match kid {
                    Object::Reference(kid) => stack.push(*kid),
                    other => self.page_tree_problem(format!(
                        "node {} {} has a {} in /Kids",
                        id.0,
                        id.1,
                        other.type_name()
                    )),
                }
            }
        }

        debug!("Page tree has {} pages", pages.len());
        pages
    }

    fn page_tree_problem(&self, message: String) {
        warn!("Page tree: {}", message);
        self.record(Diagnostic::new(DiagnosticKind::PageTree, message));
    }

    pub fn page_count(&self) -> PDFResult<usize> {
        Ok(self.page_ids()?.len())
    }

    pub fn get_page(&self, index: usize) -> PDFResult<Page<'_>> {
        let id = self
            .page_ids()?
            .get(index)
            .copied()
            .ok_or(PDFError::PageNotFound(index))?;
        Ok(Page {
            document: self,
            id,
            index,
        })
    }

    /// All pages in document order
    pub fn pages(&self) -> PDFResult<Vec<Page<'_>>> {
        Ok(self
            .page_ids()?
            .into_iter()
            .enumerate()
            .map(|(index, id)| Page {
                document: self,
                id,
                index,
            })
            .collect())
    }

    /// Append a page under the root `/Pages` node
    pub fn add_page(&mut self, page: Dictionary) -> PDFResult<ObjectId> {
        let root = self.pages_root()?;
        let id = self.add_object(Self::page_node(page, root));
        self.get_dictionary_mut(root)?
            .get_mut("Kids")
            .ok_or_else(|| PDFError::MissingDictionaryEntry("Kids".to_string()))?
            .as_array_mut()?
            .push(Object::Reference(id));
        self.adjust_counts(root, 1)?;
        trace!("Added page {} {}", id.0, id.1);
        Ok(id)
    }

    /// Insert a page so that it ends up at `index`
    ///
    /// `index == page_count()` appends.
    pub fn insert_page(&mut self, index: usize, page: Dictionary) -> PDFResult<ObjectId> {
        let count = self.page_count()?;
        if index == count {
            return self.add_page(page);
        }
        if index > count {
            return Err(PDFError::PageNotFound(index));
        }

        let (_, parent, position) = self.locate_page(index)?;
        let id = self.add_object(Self::page_node(page, parent));
        self.kids_mut(parent)?.insert(position, Object::Reference(id));
        self.adjust_counts(parent, 1)?;
        Ok(id)
    }

    /// Detach the page at `index` from the tree
    ///
    /// The page object stays in the table but is no longer reachable, so it
    /// is not written on save.
    pub fn remove_page(&mut self, index: usize) -> PDFResult<ObjectId> {
        let (id, parent, position) = self.locate_page(index)?;
        self.kids_mut(parent)?.remove(position);
        self.adjust_counts(parent, -1)?;
        debug!("Removed page {} ({} {})", index, id.0, id.1);
        Ok(id)
    }

    /// Put a new page in place of the one at `index`
    pub fn replace_page(&mut self, index: usize, page: Dictionary) -> PDFResult<ObjectId> {
        let (_, parent, position) = self.locate_page(index)?;
        let id = self.add_object(Self::page_node(page, parent));
        self.kids_mut(parent)?[position] = Object::Reference(id);
        Ok(id)
    }

    /// Replace the page's content with a single unfiltered stream
    pub fn set_page_contents(&mut self, index: usize, content: Vec<u8>) -> PDFResult<ObjectId> {
        let page = self.get_page(index)?.id();
        let stream = self.add_object(Stream::from_content(Dictionary::new(), content));
        self.get_dictionary_mut(page)?.set("Contents", stream);
        Ok(stream)
    }

    fn page_node(mut page: Dictionary, parent: ObjectId) -> Dictionary {
        page.set("Type", Object::name("Page"));
        page.set("Parent", parent);
        page
    }

    /// Root `/Pages` node, created when the catalog has none
    fn pages_root(&mut self) -> PDFResult<ObjectId> {
        if let Some(root) = self.catalog()?.get_reference("Pages") {
            return Ok(root);
        }
        let mut pages = Dictionary::with_type("Pages");
        pages.set("Kids", Vec::<Object>::new());
        pages.set("Count", 0);
        let root = self.add_object(pages);
        self.catalog_mut()?.set("Pages", root);
        Ok(root)
    }

    /// Page id, its parent node and its position in the parent's `/Kids`
    fn locate_page(&self, index: usize) -> PDFResult<(ObjectId, ObjectId, usize)> {
        let id = self.get_page(index)?.id();
        let parent = self
            .get_dictionary(id)?
            .get_reference("Parent")
            .ok_or_else(|| PDFError::MissingDictionaryEntry("Parent".to_string()))?;
        let position = self
            .get_dictionary(parent)?
            .get_array("Kids")
            .and_then(|kids| {
                kids.iter()
                    .position(|kid| matches!(kid, Object::Reference(kid) if kid.0 == id.0))
            })
            .ok_or_else(|| PDFError::MissingDictionaryEntry("Kids".to_string()))?;
        Ok((id, parent, position))
    }

    fn kids_mut(&mut self, node: ObjectId) -> PDFResult<&mut Vec<Object>> {
        self.get_dictionary_mut(node)?
            .get_mut("Kids")
            .ok_or_else(|| PDFError::MissingDictionaryEntry("Kids".to_string()))?
            .as_array_mut()
    }

    /// Add `delta` to `/Count` on `node` and every ancestor
    fn adjust_counts(&mut self, node: ObjectId, delta: i64) -> PDFResult<()> {
        let mut visited = HashSet::new();
        let mut current = Some(node);
        while let Some(id) = current {
            if !visited.insert(id.0) {
                return Err(PDFError::CyclicReference(id.0, id.1));
            }
            let dict = self.get_dictionary_mut(id)?;
            let count = dict.get_i64("Count").unwrap_or(0);
            dict.set("Count", (count + delta).max(0));
            current = dict.get_reference("Parent");
        }
        Ok(())
    }
}
