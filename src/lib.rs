//! PDF document engine for Rust
//!
//! Parses a PDF byte buffer into a lazily resolved object graph, exposes the
//! page tree, metadata, outline and form fields for reading and mutation, and
//! serializes the graph back into a conforming file with optional stream
//! compression, object streams and standard security handler encryption.
//!
//! ```no_run
//! use pdf_engine::{Document, SaveOptions};
//!
//! # fn main() -> pdf_engine::PDFResult<()> {
//! let data = std::fs::read("input.pdf")?;
//! let mut document = Document::load(&data)?;
//! for diagnostic in document.diagnostics().iter() {
//!     eprintln!("repaired: {}", diagnostic);
//! }
//! document.remove_page(0)?;
//! let output = document.save(&SaveOptions::default().with_compression(true))?;
//! # let _ = output;
//! # Ok(())
//! # }
//! ```

use std::fmt;

mod crypto;
mod error;
mod handlers;
mod options;
pub mod pdf;
mod security;
pub mod worker;

pub use crypto::CryptMethod;
pub use error::{Diagnostic, DiagnosticKind, PDFError, PDFResult};
pub use handlers::StandardSecurityHandler;
pub use options::{LoadOptions, SaveOptions, XRefFormat};
pub use pdf::{
    serialize, Dictionary, Document, FieldKind, Filter, Form, FormField, Metadata, Object, ObjectId, OutlineItem,
    PDFObject, PDFParser, PDFWriter, Page, Stream,
};
pub use worker::{CancellationToken, PageCoordinator, PageOutput, PageSnapshot, PageTask};

/// Standard security handler cipher and key length
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionAlgorithm {
    /// RC4, 40-bit key (V1 R2)
    RC4_40,
    /// RC4, 128-bit key (V2 R3)
    RC4_128,
    /// AES-CBC, 128-bit key (V4 R4, AESV2)
    AES_128,
    /// AES-CBC, 256-bit key (V5 R6, AESV3)
    AES_256,
}

impl EncryptionAlgorithm {
    /// Lowest header version that can carry this algorithm
    pub fn minimum_version(&self) -> (u8, u8) {
        match self {
            EncryptionAlgorithm::RC4_40 => (1, 3),
            EncryptionAlgorithm::RC4_128 => (1, 4),
            EncryptionAlgorithm::AES_128 => (1, 6),
            EncryptionAlgorithm::AES_256 => (1, 7),
        }
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptionAlgorithm::RC4_40 => write!(f, "RC4-40"),
            EncryptionAlgorithm::RC4_128 => write!(f, "RC4-128"),
            EncryptionAlgorithm::AES_128 => write!(f, "AES-128"),
            EncryptionAlgorithm::AES_256 => write!(f, "AES-256"),
        }
    }
}

/// User access permissions stored in `/P`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PDFPermissions(u32);

impl PDFPermissions {
    /// Nothing granted
    pub const NONE: u32 = 0;
    /// Bit 3
    pub const PRINT: u32 = 1 << 2;
    /// Bit 4: modify contents
    pub const MODIFY: u32 = 1 << 3;
    /// Bit 5: copy or extract text and graphics
    pub const COPY: u32 = 1 << 4;
    /// Bit 6: annotations and interactive form fields
    pub const ANNOTATE: u32 = 1 << 5;
    /// Bit 9
    pub const FILL_FORMS: u32 = 1 << 8;
    /// Bit 10: extraction for accessibility
    pub const EXTRACT: u32 = 1 << 9;
    /// Bit 11: insert, rotate or delete pages
    pub const ASSEMBLE: u32 = 1 << 10;
    /// Bit 12: faithful printing
    pub const PRINT_HIGH: u32 = 1 << 11;
    pub const ALL: u32 = Self::PRINT
        | Self::MODIFY
        | Self::COPY
        | Self::ANNOTATE
        | Self::FILL_FORMS
        | Self::EXTRACT
        | Self::ASSEMBLE
        | Self::PRINT_HIGH;

    /// Bits that must be set in `/P`
    const RESERVED: u32 = 0xFFFF_F0C0;

    /// Keep only the defined permission bits
    pub fn new(bits: u32) -> Self {
        Self(bits & Self::ALL)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn has_permission(&self, permission: u32) -> bool {
        (self.0 & permission) == permission
    }

    /// Value stored as `/P`
    pub fn p_value(&self) -> i32 {
        (self.0 | Self::RESERVED) as i32
    }

    /// Permissions from a `/P` value
    pub fn from_p_value(p_value: i32) -> Self {
        Self::new(p_value as u32)
    }
}

impl Default for PDFPermissions {
    fn default() -> Self {
        Self(Self::ALL)
    }
}

/// Information about a loaded document's encryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionInfo {
    pub algorithm: EncryptionAlgorithm,
    /// Security handler revision
    pub revision: u8,
    /// Granted permissions
    pub permissions: PDFPermissions,
    /// Whether metadata streams were encrypted
    pub encrypt_metadata: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_permissions() {
        let perms = PDFPermissions::new(PDFPermissions::PRINT | PDFPermissions::COPY);
        assert!(perms.has_permission(PDFPermissions::PRINT));
        assert!(perms.has_permission(PDFPermissions::COPY));
        assert!(!perms.has_permission(PDFPermissions::MODIFY));
    }

    #[test]
    fn test_p_value_round_trip() {
        let perms = PDFPermissions::new(PDFPermissions::PRINT | PDFPermissions::PRINT_HIGH);
        assert!(perms.p_value() < 0);
        assert_eq!(PDFPermissions::from_p_value(perms.p_value()), perms);
        assert_eq!(PDFPermissions::new(PDFPermissions::NONE).p_value(), -3904);
        assert_eq!(PDFPermissions::default().p_value(), -4);
    }

    #[test]
    fn test_algorithm_display() {
        assert_eq!(EncryptionAlgorithm::AES_256.to_string(), "AES-256");
        assert_eq!(EncryptionAlgorithm::AES_128.minimum_version(), (1, 6));
    }
}
