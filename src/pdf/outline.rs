//! Document outline (bookmarks)

use std::collections::{HashMap, HashSet};

use log::{trace, warn};

use super::metadata::{decode_text_string, encode_text_string};
use super::{Dictionary, Document, Object, ObjectId};
use crate::error::{PDFError, PDFResult};

/// Deepest outline or name-tree level followed on read
const MAX_TREE_DEPTH: usize = 256;

/// One bookmark and its children
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutlineItem {
    pub title: String,
    /// Zero-based target page; `None` for items without a usable destination
    pub page: Option<usize>,
    /// Whether the children are shown expanded
    pub open: bool,
    pub children: Vec<OutlineItem>,
}

impl OutlineItem {
    pub fn new(title: impl Into<String>, page: Option<usize>) -> Self {
        Self {
            title: title.into(),
            page,
            open: false,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<OutlineItem>, open: bool) -> Self {
        self.children = children;
        self.open = open;
        self
    }
}

/// Items visible when every open ancestor is expanded
fn visible_count(items: &[OutlineItem]) -> i64 {
    items
        .iter()
        .map(|item| 1 + if item.open { visible_count(&item.children) } else { 0 })
        .sum()
}

impl Document {
    /// Read the outline tree
    ///
    /// Sibling and child links that revisit an item end that branch with a
    /// warning.
    pub fn outline(&self) -> PDFResult<Vec<OutlineItem>> {
        let root = match self.catalog()?.get("Outlines") {
            Some(root) => match self.resolve_object(root)? {
                Object::Dictionary(root) => root,
                _ => return Ok(Vec::new()),
            },
            None => return Ok(Vec::new()),
        };

        let pages: HashMap<u32, usize> = self
            .page_ids()?
            .into_iter()
            .enumerate()
            .map(|(index, id)| (id.0, index))
            .collect();
        let mut visited = HashSet::new();
        Ok(self.read_outline_level(root.get_reference("First"), &pages, &mut visited, 0))
    }

    fn read_outline_level(
        &self,
        first: Option<ObjectId>,
        pages: &HashMap<u32, usize>,
        visited: &mut HashSet<u32>,
        depth: usize,
    ) -> Vec<OutlineItem> {
        let mut items = Vec::new();
        if depth >= MAX_TREE_DEPTH {
            warn!("Outline nested deeper than {} levels, dropping the rest", MAX_TREE_DEPTH);
            return items;
        }
        let mut next = first;

        while let Some(id) = next {
            if !visited.insert(id.0) {
                warn!("Outline item {} {} is linked twice", id.0, id.1);
                break;
            }
            let dict = match self.get_dictionary(id) {
                Ok(dict) => dict,
                Err(err) => {
                    warn!("Outline item {} {} unreadable: {}", id.0, id.1, err);
                    break;
                }
            };

            let title = match dict.get("Title").map(|title| self.resolve_object(title)) {
                Some(Ok(Object::String(bytes))) => decode_text_string(bytes),
                _ => String::new(),
            };
            let children = self.read_outline_level(dict.get_reference("First"), pages, visited, depth + 1);
            items.push(OutlineItem {
                title,
                page: self.outline_target(dict, pages),
                open: dict.get_i64("Count").is_some_and(|count| count > 0),
                children,
            });
            next = dict.get_reference("Next");
        }
        items
    }

    /// Page index from `/Dest` or a `/GoTo` action
    fn outline_target(&self, item: &Dictionary, pages: &HashMap<u32, usize>) -> Option<usize> {
        let dest = match item.get("Dest") {
            Some(dest) => dest,
            None => {
                let action = self.resolve_object(item.get("A")?).ok()?.as_dict().ok()?;
                if action.get_name("S") != Some("GoTo") {
                    return None;
                }
                action.get("D")?
            }
        };

        let dest = match self.resolve_object(dest).ok()? {
            Object::Name(name) => self.named_destination(name.as_bytes())?,
            Object::String(name) => self.named_destination(name)?,
            other => other,
        };
        let dest = match dest {
            Object::Dictionary(dict) => self.resolve_object(dict.get("D")?).ok()?,
            other => other,
        };

        match dest.as_array().ok()?.first()? {
            Object::Reference(page) => pages.get(&page.0).copied(),
            Object::Integer(index) => usize::try_from(*index).ok().filter(|&index| index < pages.len()),
            _ => None,
        }
    }

    /// Look a name up in the catalog `/Dests` dictionary, then in the
    /// `/Names` destination tree
    fn named_destination(&self, name: &[u8]) -> Option<&Object> {
        let catalog = self.catalog().ok()?;

        if let Some(dests) = catalog.get("Dests") {
            let dests = self.resolve_object(dests).ok()?.as_dict().ok()?;
            let key = String::from_utf8_lossy(name);
            if let Some(dest) = dests.get(&key) {
                return self.resolve_object(dest).ok();
            }
        }

        let names = self.resolve_object(catalog.get("Names")?).ok()?.as_dict().ok()?;
        let tree = self.resolve_object(names.get("Dests")?).ok()?;
        let mut visited = HashSet::new();
        self.search_name_tree(tree, name, &mut visited, 0)
    }

    fn search_name_tree<'a>(
        &'a self,
        node: &'a Object,
        key: &[u8],
        visited: &mut HashSet<u32>,
        depth: usize,
    ) -> Option<&'a Object> {
        if depth >= MAX_TREE_DEPTH {
            warn!("Name tree nested deeper than {} levels", MAX_TREE_DEPTH);
            return None;
        }
        let node = node.as_dict().ok()?;

        if let Some(names) = node.get_array("Names") {
            for pair in names.chunks_exact(2) {
                if matches!(&pair[0], Object::String(name) if name.as_slice() == key) {
                    return self.resolve_object(&pair[1]).ok();
                }
            }
        }

        for kid in node.get_array("Kids").map(Vec::as_slice).unwrap_or_default() {
            let Object::Reference(id) = kid else { continue };
            if !visited.insert(id.0) {
                continue;
            }
            let Ok(child) = self.get_object(*id) else { continue };
            if let Some(found) = self.search_name_tree(child, key, visited, depth + 1) {
                return Some(found);
            }
        }
        None
    }

    /// Replace the outline; an empty list removes it
    pub fn set_outline(&mut self, items: &[OutlineItem]) -> PDFResult<()> {
        if items.is_empty() {
            self.catalog_mut()?.remove("Outlines");
            return Ok(());
        }

        let pages = self.page_ids()?;
        let root = self.add_object(Dictionary::with_type("Outlines"));
        let (first, last) = self.write_outline_level(items, root, &pages)?;

        let mut root_dict = Dictionary::with_type("Outlines");
        root_dict.set("First", first);
        root_dict.set("Last", last);
        root_dict.set("Count", visible_count(items));
        self.set_object(root, root_dict);
        self.catalog_mut()?.set("Outlines", root);
        trace!("Wrote outline with {} top-level items", items.len());
        Ok(())
    }

    /// Write one sibling list, returning its first and last item
    fn write_outline_level(
        &mut self,
        items: &[OutlineItem],
        parent: ObjectId,
        pages: &[ObjectId],
    ) -> PDFResult<(ObjectId, ObjectId)> {
        let ids: Vec<ObjectId> = items.iter().map(|_| self.add_object(Object::Null)).collect();

        for (i, item) in items.iter().enumerate() {
            let mut dict = Dictionary::new();
            dict.set("Title", Object::String(encode_text_string(&item.title)));
            dict.set("Parent", parent);
            if i > 0 {
                dict.set("Prev", ids[i - 1]);
            }
            if let Some(next) = ids.get(i + 1) {
                dict.set("Next", *next);
            }
            if let Some(index) = item.page {
                let page = pages.get(index).ok_or(PDFError::PageNotFound(index))?;
                dict.set("Dest", vec![Object::Reference(*page), Object::name("Fit")]);
            }
            if !item.children.is_empty() {
                let (first, last) = self.write_outline_level(&item.children, ids[i], pages)?;
                dict.set("First", first);
                dict.set("Last", last);
                let count = visible_count(&item.children);
                dict.set("Count", if item.open { count } else { -count });
            }
            self.set_object(ids[i], dict);
        }

        match (ids.first(), ids.last()) {
            (Some(first), Some(last)) => Ok((*first, *last)),
            _ => Err(PDFError::MissingDictionaryEntry("First".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn document_with_pages(count: usize) -> PDFResult<Document> {
        let mut document = Document::new();
        for _ in 0..count {
            document.add_page(Dictionary::new())?;
        }
        Ok(document)
    }

    #[test_log::test]
    fn test_outline_round_trip() -> PDFResult<()> {
        let mut document = document_with_pages(3)?;
        let outline = vec![
            OutlineItem::new("Introduction", Some(0)),
            OutlineItem::new("Chapter 1", Some(1)).with_children(
                vec![OutlineItem::new("Section 1.1", Some(1)), OutlineItem::new("Section 1.2", Some(2))],
                true,
            ),
            OutlineItem::new("Appendix", None).with_children(vec![OutlineItem::new("Überblick", Some(2))], false),
        ];
        document.set_outline(&outline)?;
        assert_eq!(document.outline()?, outline);

        let root = document.catalog()?.get_reference("Outlines").ok_or(PDFError::PageNotFound(0))?;
        assert_eq!(document.get_dictionary(root)?.get_i64("Count"), Some(5));
        Ok(())
    }

    #[test_log::test]
    fn test_missing_page_is_rejected() -> PDFResult<()> {
        let mut document = document_with_pages(1)?;
        let result = document.set_outline(&[OutlineItem::new("Nowhere", Some(4))]);
        assert!(matches!(result, Err(PDFError::PageNotFound(4))));
        Ok(())
    }

    #[test_log::test]
    fn test_named_and_action_destinations() -> PDFResult<()> {
        let mut document = document_with_pages(2)?;
        let second = document.page_ids()?[1];

        let mut tree = Dictionary::new();
        tree.set("Names", vec![Object::string("end"), vec![Object::Reference(second), Object::name("Fit")].into()]);
        let tree = document.add_object(tree);
        let mut names = Dictionary::new();
        names.set("Dests", tree);
        document.catalog_mut()?.set("Names", names);

        let mut goto = Dictionary::new();
        goto.set("S", Object::name("GoTo"));
        goto.set("D", Object::string("end"));
        let mut item = Dictionary::new();
        item.set("Title", Object::string("Last page"));
        item.set("A", goto);
        let item = document.add_object(item);

        let mut root = Dictionary::with_type("Outlines");
        root.set("First", item);
        let root = document.add_object(root);
        document.catalog_mut()?.set("Outlines", root);

        assert_eq!(document.outline()?, vec![OutlineItem::new("Last page", Some(1))]);
        Ok(())
    }

    #[test_log::test]
    fn test_sibling_loop_terminates() -> PDFResult<()> {
        let mut document = document_with_pages(1)?;
        document.set_outline(&[OutlineItem::new("A", Some(0)), OutlineItem::new("B", Some(0))])?;

        let root = document.catalog()?.get_reference("Outlines").ok_or(PDFError::PageNotFound(0))?;
        let first = document.get_dictionary(root)?.get_reference("First").ok_or(PDFError::PageNotFound(0))?;
        let second = document.get_dictionary(first)?.get_reference("Next").ok_or(PDFError::PageNotFound(0))?;
        document.get_dictionary_mut(second)?.set("Next", first);

        assert_eq!(document.outline()?.len(), 2);
        Ok(())
    }

    #[test_log::test]
    fn test_deep_outline_is_cut_off() -> PDFResult<()> {
        let mut document = document_with_pages(1)?;
        let mut item = OutlineItem::new("leaf", Some(0));
        for level in 0..MAX_TREE_DEPTH + 40 {
            item = OutlineItem::new(format!("level {}", level), Some(0)).with_children(vec![item], true);
        }
        document.set_outline(&[item])?;

        let outline = document.outline()?;
        let mut depth = 0;
        let mut level = outline.as_slice();
        while let Some(item) = level.first() {
            depth += 1;
            level = item.children.as_slice();
        }
        assert_eq!(depth, MAX_TREE_DEPTH);
        Ok(())
    }

    #[test_log::test]
    fn test_deep_name_tree_is_not_followed() -> PDFResult<()> {
        let mut document = document_with_pages(1)?;
        let page = document.page_ids()?[0];

        let mut node = Dictionary::new();
        node.set("Names", vec![Object::string("end"), vec![Object::Reference(page), Object::name("Fit")].into()]);
        let mut node = document.add_object(node);
        for _ in 0..MAX_TREE_DEPTH + 40 {
            let mut parent = Dictionary::new();
            parent.set("Kids", vec![Object::Reference(node)]);
            node = document.add_object(parent);
        }
        let mut names = Dictionary::new();
        names.set("Dests", node);
        document.catalog_mut()?.set("Names", names);

        let mut item = Dictionary::new();
        item.set("Title", Object::string("Deep"));
        item.set("Dest", Object::string("end"));
        let item = document.add_object(item);
        let mut root = Dictionary::with_type("Outlines");
        root.set("First", item);
        let root = document.add_object(root);
        document.catalog_mut()?.set("Outlines", root);

        assert_eq!(document.outline()?, vec![OutlineItem::new("Deep", None)]);
        Ok(())
    }
}
