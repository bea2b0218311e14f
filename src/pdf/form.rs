//! Interactive form (AcroForm) fields

use std::collections::HashSet;

use log::{debug, warn};

use super::metadata::{decode_text_string, encode_text_string};
use super::{Dictionary, Document, Object, ObjectId};
use crate::error::{PDFError, PDFResult};

/// Field type from `/FT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Button,
    Choice,
    Signature,
    Unknown,
}

impl FieldKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "Tx" => FieldKind::Text,
            "Btn" => FieldKind::Button,
            "Ch" => FieldKind::Choice,
            "Sig" => FieldKind::Signature,
            _ => FieldKind::Unknown,
        }
    }

    pub fn name(&self) -> Option<&'static str> {
        match self {
            FieldKind::Text => Some("Tx"),
            FieldKind::Button => Some("Btn"),
            FieldKind::Choice => Some("Ch"),
            FieldKind::Signature => Some("Sig"),
            FieldKind::Unknown => None,
        }
    }
}

/// A terminal or non-terminal form field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    /// Fully qualified name, partial names joined with `.`
    pub name: String,
    pub kind: FieldKind,
    /// Text value; button states are given by name, multiple choices joined with `", "`
    pub value: Option<String>,
    /// `/Ff` bits
    pub flags: u32,
    pub children: Vec<FormField>,
}

impl FormField {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            value: None,
            flags: 0,
            children: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Last component of the qualified name
    pub fn partial_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Form {
    pub fields: Vec<FormField>,
    pub need_appearances: bool,
}

impl Form {
    /// Qualified names of every field, depth first
    pub fn field_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut stack: Vec<&FormField> = self.fields.iter().rev().collect();
        while let Some(field) = stack.pop() {
            names.push(field.name.as_str());
            stack.extend(field.children.iter().rev());
        }
        names
    }

    pub fn find(&self, name: &str) -> Option<&FormField> {
        let mut stack: Vec<&FormField> = self.fields.iter().collect();
        while let Some(field) = stack.pop() {
            if field.name == name {
                return Some(field);
            }
            stack.extend(field.children.iter());
        }
        None
    }
}

/// Attributes a field passes on to its kids
#[derive(Default, Clone, Copy)]
struct Inherited<'a> {
    kind: Option<&'a str>,
    value: Option<&'a Object>,
    flags: u32,
}

impl Document {
    fn acroform(&self) -> PDFResult<Option<&Dictionary>> {
        match self.catalog()?.get("AcroForm") {
            Some(form) => match self.resolve_object(form)? {
                Object::Dictionary(form) => Ok(Some(form)),
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Read the interactive form, if the catalog has one
    pub fn form(&self) -> PDFResult<Option<Form>> {
        let Some(acroform) = self.acroform()? else {
            return Ok(None);
        };
        let entries = acroform.get_array("Fields").map(Vec::as_slice).unwrap_or_default();
        let mut visited = HashSet::new();
        let mut ids = Vec::new();
        Ok(Some(Form {
            fields: self.walk_fields(entries, None, Inherited::default(), &mut visited, &mut ids),
            need_appearances: acroform.get_bool("NeedAppearances").unwrap_or(false),
        }))
    }

    fn walk_fields<'a>(
        &'a self,
        entries: &'a [Object],
        prefix: Option<&str>,
        parent: Inherited<'a>,
        visited: &mut HashSet<u32>,
        ids: &mut Vec<(String, ObjectId, FieldKind)>,
    ) -> Vec<FormField> {
        let mut fields = Vec::new();

        for entry in entries {
            let (id, dict) = match entry {
                Object::Reference(id) => {
                    if !visited.insert(id.0) {
                        warn!("Form field {} {} is listed twice", id.0, id.1);
                        continue;
                    }
                    match self.get_dictionary(*id) {
                        Ok(dict) => (Some(*id), dict),
                        Err(err) => {
                            warn!("Form field {} {} unreadable: {}", id.0, id.1, err);
                            continue;
                        }
                    }
                }
                Object::Dictionary(dict) => (None, dict),
                _ => continue,
            };

            // Kids without /T are widget annotations of the parent field
            let Some(partial) = dict.get_string("T") else {
                continue;
            };
            let partial = decode_text_string(partial);
            let name = match prefix {
                Some(prefix) => format!("{}.{}", prefix, partial),
                None => partial,
            };

            let kind_name = dict.get_name("FT").or(parent.kind);
            let value = dict.get("V").or(parent.value);
            let flags = dict
                .get_i64("Ff")
                .and_then(|flags| u32::try_from(flags).ok())
                .unwrap_or(parent.flags);
            let kind = kind_name.map_or(FieldKind::Unknown, FieldKind::from_name);

            let kids = dict.get_array("Kids").map(Vec::as_slice).unwrap_or_default();
            let inherited = Inherited {
                kind: kind_name,
                value,
                flags,
            };
            let children = self.walk_fields(kids, Some(&name), inherited, visited, ids);

            if let Some(id) = id {
                ids.push((name.clone(), id, kind));
            }
            fields.push(FormField {
                value: value.and_then(|value| self.field_value(value)),
                name,
                kind,
                flags,
                children,
            });
        }
        fields
    }

    fn field_value(&self, value: &Object) -> Option<String> {
        match self.resolve_object(value).ok()? {
            Object::String(bytes) => Some(decode_text_string(bytes)),
            Object::Name(name) => Some(name.clone()),
            Object::Array(items) => {
                let values: Vec<String> = items.iter().filter_map(|item| self.field_value(item)).collect();
                Some(values.join(", "))
            }
            _ => None,
        }
    }

    /// Replace the interactive form with `form`
    pub fn set_form(&mut self, form: &Form) -> PDFResult<()> {
        let fields = self.write_fields(&form.fields, None)?;
        let mut acroform = Dictionary::new();
        acroform.set("Fields", fields);
        if form.need_appearances {
            acroform.set("NeedAppearances", true);
        }
        let id = self.add_object(acroform);
        self.catalog_mut()?.set("AcroForm", id);
        debug!("Wrote form with {} top-level fields", form.fields.len());
        Ok(())
    }

    fn write_fields(&mut self, fields: &[FormField], parent: Option<ObjectId>) -> PDFResult<Vec<Object>> {
        let mut refs = Vec::with_capacity(fields.len());
        for field in fields {
            let id = self.add_object(Object::Null);
            let mut dict = Dictionary::new();
            dict.set("T", Object::String(encode_text_string(field.partial_name())));
            if let Some(kind) = field.kind.name() {
                dict.set("FT", Object::name(kind));
            }
            if let Some(value) = &field.value {
                dict.set("V", Self::encode_field_value(field.kind, value));
            }
            if field.flags != 0 {
                dict.set("Ff", field.flags);
            }
            if let Some(parent) = parent {
                dict.set("Parent", parent);
            }
            if !field.children.is_empty() {
                let kids = self.write_fields(&field.children, Some(id))?;
                dict.set("Kids", kids);
            }
            self.set_object(id, dict);
            refs.push(Object::Reference(id));
        }
        Ok(refs)
    }

    fn encode_field_value(kind: FieldKind, value: &str) -> Object {
        match kind {
            FieldKind::Button => Object::name(value),
            _ => Object::String(encode_text_string(value)),
        }
    }

    /// Set `/V` on the field with qualified name `name`
    ///
    /// `/NeedAppearances` is turned on so viewers regenerate the widget.
    pub fn set_field_value(&mut self, name: &str, value: &str) -> PDFResult<()> {
        let (id, kind) = {
            let acroform = self
                .acroform()?
                .ok_or_else(|| PDFError::MissingDictionaryEntry("AcroForm".to_string()))?;
            let entries = acroform.get_array("Fields").map(Vec::as_slice).unwrap_or_default();
            let mut visited = HashSet::new();
            let mut ids = Vec::new();
            self.walk_fields(entries, None, Inherited::default(), &mut visited, &mut ids);
            ids.into_iter()
                .find(|(field, _, _)| field == name)
                .map(|(_, id, kind)| (id, kind))
                .ok_or_else(|| PDFError::MissingDictionaryEntry(format!("field {}", name)))?
        };

        self.get_dictionary_mut(id)?.set("V", Self::encode_field_value(kind, value));

        let catalog_id = self.catalog_id()?;
        match self.get_dictionary(catalog_id)?.get("AcroForm").cloned() {
            Some(Object::Reference(form)) => self.get_dictionary_mut(form)?.set("NeedAppearances", true),
            Some(Object::Dictionary(_)) => {
                if let Some(Object::Dictionary(form)) = self.get_dictionary_mut(catalog_id)?.get_mut("AcroForm") {
                    form.set("NeedAppearances", true);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_form() -> Form {
        let mut address = FormField::new("address", FieldKind::Unknown);
        address.children = vec![
            FormField::new("address.street", FieldKind::Text).with_value("1 Main St"),
            FormField::new("address.city", FieldKind::Text),
        ];
        Form {
            fields: vec![
                FormField::new("name", FieldKind::Text).with_value("Zoë"),
                FormField::new("subscribe", FieldKind::Button).with_value("Yes"),
                address,
            ],
            need_appearances: false,
        }
    }

    #[test_log::test]
    fn test_form_round_trip() -> PDFResult<()> {
        let mut document = Document::new();
        assert_eq!(document.form()?, None);

        let form = sample_form();
        document.set_form(&form)?;
        let read = document.form()?.ok_or(PDFError::PageNotFound(0))?;
        assert_eq!(read, form);
        assert_eq!(
            read.field_names(),
            ["name", "subscribe", "address", "address.street", "address.city"]
        );
        Ok(())
    }

    #[test_log::test]
    fn test_set_field_value() -> PDFResult<()> {
        let mut document = Document::new();
        document.set_form(&sample_form())?;
        document.set_field_value("address.city", "Springfield")?;
        document.set_field_value("subscribe", "Off")?;

        let form = document.form()?.ok_or(PDFError::PageNotFound(0))?;
        assert!(form.need_appearances);
        assert_eq!(form.find("address.city").and_then(|f| f.value.as_deref()), Some("Springfield"));
        assert_eq!(form.find("subscribe").and_then(|f| f.value.as_deref()), Some("Off"));
        assert!(document.set_field_value("missing", "x").is_err());
        Ok(())
    }

    #[test_log::test]
    fn test_inherited_attributes_and_widgets() -> PDFResult<()> {
        let mut document = Document::new();
        let mut widget = Dictionary::new();
        widget.set("Subtype", Object::name("Widget"));
        let widget = document.add_object(widget);

        let mut choice = Dictionary::new();
        choice.set("T", Object::string("colors"));
        choice.set("FT", Object::name("Ch"));
        choice.set("Ff", 1 << 21);
        choice.set("V", vec![Object::string("red"), Object::string("blue")]);
        choice.set("Kids", vec![Object::Reference(widget)]);
        let choice = document.add_object(choice);

        let mut acroform = Dictionary::new();
        acroform.set("Fields", vec![Object::Reference(choice)]);
        document.catalog_mut()?.set("AcroForm", acroform);

        let form = document.form()?.ok_or(PDFError::PageNotFound(0))?;
        let field = &form.fields[0];
        assert_eq!(field.kind, FieldKind::Choice);
        assert_eq!(field.value.as_deref(), Some("red, blue"));
        assert_eq!(field.flags, 1 << 21);
        assert!(field.children.is_empty());

        document.set_field_value("colors", "green")?;
        assert!(document.form()?.is_some_and(|form| form.need_appearances));
        Ok(())
    }
}
