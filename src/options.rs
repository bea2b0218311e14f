//! Load and save configuration

use crate::{EncryptionAlgorithm, PDFPermissions};

/// Options for [`Document::load_with_options`](crate::Document::load_with_options)
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// User or owner password for encrypted documents
    pub password: Vec<u8>,
    /// Fail on structural damage instead of reconstructing
    pub strict: bool,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(mut self, password: impl AsRef<[u8]>) -> Self {
        self.password = password.as_ref().to_vec();
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Cross-reference section format written by the serializer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XRefFormat {
    /// Classic `xref` table with a `trailer` dictionary
    Table,
    /// `/Type /XRef` stream
    Stream,
    /// Whatever the loaded document used; a table for new documents
    #[default]
    MatchSource,
}

/// Options for [`Document::save`](crate::Document::save)
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Flate-compress unfiltered streams when that makes them smaller
    pub compress: bool,
    /// Encrypt strings and streams with the standard security handler
    pub encrypt: bool,
    pub user_password: Vec<u8>,
    /// Required when `encrypt` is set
    pub owner_password: Vec<u8>,
    pub permissions: PDFPermissions,
    pub encryption_method: EncryptionAlgorithm,
    /// Encrypt `/Type /Metadata` streams too
    pub encrypt_metadata: bool,
    pub xref_format: XRefFormat,
    /// Pack eligible objects into object streams; implies an xref stream
    pub object_streams: bool,
    /// Header version, raised automatically when a feature needs more
    pub version: Option<(u8, u8)>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            compress: false,
            encrypt: false,
            user_password: Vec::new(),
            owner_password: Vec::new(),
            permissions: PDFPermissions::default(),
            encryption_method: EncryptionAlgorithm::AES_256,
            encrypt_metadata: true,
            xref_format: XRefFormat::default(),
            object_streams: false,
            version: None,
        }
    }
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Turn on encryption with the given passwords
    pub fn with_encryption(
        mut self,
        method: EncryptionAlgorithm,
        user_password: impl AsRef<[u8]>,
        owner_password: impl AsRef<[u8]>,
    ) -> Self {
        self.encrypt = true;
        self.encryption_method = method;
        self.user_password = user_password.as_ref().to_vec();
        self.owner_password = owner_password.as_ref().to_vec();
        self
    }

    pub fn with_permissions(mut self, permissions: PDFPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_encrypt_metadata(mut self, encrypt_metadata: bool) -> Self {
        self.encrypt_metadata = encrypt_metadata;
        self
    }

    pub fn with_xref_format(mut self, format: XRefFormat) -> Self {
        self.xref_format = format;
        self
    }

    pub fn with_object_streams(mut self, object_streams: bool) -> Self {
        self.object_streams = object_streams;
        self
    }

    pub fn with_version(mut self, major: u8, minor: u8) -> Self {
        self.version = Some((major, minor));
        self
    }
}
