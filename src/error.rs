//! Error and diagnostic types for the PDF engine

use std::fmt;
use std::io;
use thiserror::Error;

/// Main error type for PDF engine operations
#[derive(Error, Debug)]
pub enum PDFError {
    /// Malformed token
    #[error("Lexical error at byte {position}: {message}")]
    LexError {
        position: usize,
        message: String,
    },

    /// Structural grammar violation
    #[error("Parse error at byte {position}: expected {expected}")]
    ParseError {
        position: usize,
        expected: String,
    },

    /// Object number not present in the cross-reference table
    #[error("Dangling reference: {0} {1} R is not in the object table")]
    DanglingReference(u32, u16),

    /// Resolution loop detected
    #[error("Cyclic reference detected at {0} {1} R")]
    CyclicReference(u32, u16),

    /// Filter not implemented; the raw payload is still available
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Filter implemented but the payload is corrupt
    #[error("Filter {filter} failed: {message}")]
    FilterError {
        filter: String,
        message: String,
    },

    /// Missing `%PDF-` signature
    #[error("Not a PDF document: {0}")]
    InvalidPDF(String),

    /// Wrong password or unsupported security handler
    #[error("Encryption error: {0}")]
    EncryptionError(String),

    /// Authentication failed (wrong password)
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Unsupported encryption revision
    #[error("Unsupported revision: {0}")]
    UnsupportedRevision(u8),

    /// Invalid key length
    #[error("Invalid key length: {0}")]
    InvalidKeyLength(usize),

    /// Invalid data length
    #[error("Invalid data length for {operation}")]
    InvalidDataLength {
        operation: String,
    },

    /// Page index out of range
    #[error("Page {0} not found")]
    PageNotFound(usize),

    /// Invalid object type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        expected: &'static str,
        found: &'static str,
    },

    /// Missing required dictionary entry
    #[error("Missing required dictionary entry: {0}")]
    MissingDictionaryEntry(String),

    /// Bulk operation cancelled before completion
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Result type for PDF engine operations
pub type PDFResult<T> = Result<T, PDFError>;

impl PDFError {
    /// Create a new lexer error
    pub fn lex(position: usize, message: impl Into<String>) -> Self {
        Self::LexError {
            position,
            message: message.into(),
        }
    }

    /// Create a new parse error
    pub fn parse(position: usize, expected: impl Into<String>) -> Self {
        Self::ParseError {
            position,
            expected: expected.into(),
        }
    }

    /// Create a new encryption error
    pub fn encryption(msg: impl Into<String>) -> Self {
        Self::EncryptionError(msg.into())
    }

    /// Create a new filter error
    pub fn filter(filter: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::FilterError {
            filter: filter.into(),
            message: msg.into(),
        }
    }

    /// Create a new invalid data length error
    pub fn invalid_length(operation: impl Into<String>) -> Self {
        Self::InvalidDataLength {
            operation: operation.into(),
        }
    }

    /// Check if error is authentication related
    pub fn is_auth_error(&self) -> bool {
        matches!(self,
            Self::AuthenticationFailed |
            Self::EncryptionError(_)
        )
    }

    /// Check if error is related to PDF structure
    pub fn is_structure_error(&self) -> bool {
        matches!(self,
            Self::LexError { .. } |
            Self::ParseError { .. } |
            Self::DanglingReference(..) |
            Self::CyclicReference(..) |
            Self::MissingDictionaryEntry(_) |
            Self::InvalidObjectType { .. }
        )
    }

    /// Check if the load path may repair around this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self,
            Self::LexError { .. } |
            Self::ParseError { .. } |
            Self::UnsupportedFilter(_) |
            Self::FilterError { .. } |
            Self::IoError(_)
        )
    }
}

impl From<cipher::InvalidLength> for PDFError {
    fn from(err: cipher::InvalidLength) -> Self {
        Self::EncryptionError(err.to_string())
    }
}

impl From<cipher::block_padding::UnpadError> for PDFError {
    fn from(_: cipher::block_padding::UnpadError) -> Self {
        Self::EncryptionError("invalid AES padding".to_string())
    }
}

/// Category of a non-fatal problem found while loading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Cross-reference data was rebuilt by scanning the file
    XRefReconstructed,
    /// An object could not be read at its recorded location
    BrokenObject,
    /// Stream `/Length` was wrong or unresolvable
    StreamLength,
    /// Page tree contained a loop or an unreadable node
    PageTree,
    /// A reference pointed at a missing object
    DanglingReference,
    /// Stream or string could not be decrypted
    Decryption,
}

/// A repaired or skipped problem, reported alongside a usable document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub position: Option<usize>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            position: None,
        }
    }

    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{:?} at byte {}: {}", self.kind, pos, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}
