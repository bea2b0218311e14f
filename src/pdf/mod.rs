//! PDF parsing and manipulation module

pub mod filter;
pub mod lexer;
pub mod objstm;
pub mod xref;

mod dict;
mod document;
mod form;
mod metadata;
mod object;
mod outline;
mod page;
mod parser;
mod stream;
mod writer;

pub use dict::Dictionary;
pub use document::Document;
pub use filter::Filter;
pub use form::{FieldKind, Form, FormField};
pub use metadata::{decode_text_string, encode_text_string, Metadata};
pub use object::{format_real, name_from_bytes, name_to_bytes, Object, ObjectId, PDFObject};
pub use outline::OutlineItem;
pub use page::{Page, DEFAULT_MEDIA_BOX};
pub use parser::PDFParser;
pub use stream::Stream;
pub use writer::{serialize, PDFWriter};
pub use xref::{XRefEntry, XRefTable};
