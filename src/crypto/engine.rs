//! Core cryptographic engine implementation

use std::collections::HashMap;
use std::fmt;

use log::trace;
use md5::{Digest, Md5};
use zeroize::Zeroizing;

use super::{AESProvider, CryptoProvider, RC4Provider};
use crate::error::{PDFError, PDFResult};
use crate::pdf::ObjectId;

/// Cipher selected by a crypt filter (`/CFM`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CryptMethod {
    /// Data passes through unchanged
    Identity,
    /// RC4 with a per-object key (`/V2`)
    RC4,
    /// AES-128-CBC with a per-object key
    AESV2,
    /// AES-256-CBC with the file key
    AESV3,
}

impl CryptMethod {
    /// Parse a `/CFM` value
    pub fn from_name(name: &str) -> PDFResult<Self> {
        match name {
            "None" | "Identity" => Ok(Self::Identity),
            "V2" => Ok(Self::RC4),
            "AESV2" => Ok(Self::AESV2),
            "AESV3" => Ok(Self::AESV3),
            other => Err(PDFError::encryption(format!("unsupported crypt filter method /{}", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "None",
            Self::RC4 => "V2",
            Self::AESV2 => "AESV2",
            Self::AESV3 => "AESV3",
        }
    }

    pub fn is_aes(&self) -> bool {
        matches!(self, Self::AESV2 | Self::AESV3)
    }
}

type ProvidersMap = HashMap<CryptMethod, Box<dyn CryptoProvider>>;

/// Per-object string and stream encryption (Algorithms 1 and 1.A)
pub struct PDFCryptoEngine {
    providers: ProvidersMap,
    file_key: Zeroizing<Vec<u8>>,
    string_method: CryptMethod,
    stream_method: CryptMethod,
    encrypt_metadata: bool,
}

impl fmt::Debug for PDFCryptoEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PDFCryptoEngine")
            .field("string_method", &self.string_method)
            .field("stream_method", &self.stream_method)
            .field("encrypt_metadata", &self.encrypt_metadata)
            .finish_non_exhaustive()
    }
}

impl PDFCryptoEngine {
    /// Create an engine for an authenticated file key
    pub fn new(file_key: &[u8], string_method: CryptMethod, stream_method: CryptMethod) -> Self {
        let mut providers: ProvidersMap = HashMap::new();
        providers.insert(CryptMethod::RC4, Box::new(RC4Provider::new()));
        providers.insert(CryptMethod::AESV2, Box::new(AESProvider::new(16)));
        providers.insert(CryptMethod::AESV3, Box::new(AESProvider::new(32)));

        Self {
            providers,
            file_key: Zeroizing::new(file_key.to_vec()),
            string_method,
            stream_method,
            encrypt_metadata: true,
        }
    }

    /// Leave `/Type /Metadata` streams in clear text when `false`
    pub fn with_encrypt_metadata(mut self, encrypt_metadata: bool) -> Self {
        self.encrypt_metadata = encrypt_metadata;
        self
    }

    pub fn encrypt_metadata(&self) -> bool {
        self.encrypt_metadata
    }

    pub fn string_method(&self) -> CryptMethod {
        self.string_method
    }

    pub fn stream_method(&self) -> CryptMethod {
        self.stream_method
    }

    /// Key for one object
    ///
    /// AESV3 uses the file key unchanged. Otherwise the key is
    /// `MD5(file key, low 3 bytes of the object number, low 2 bytes of the
    /// generation[, "sAlT"])` truncated to `min(n + 5, 16)` bytes.
    pub fn object_key(&self, id: ObjectId, method: CryptMethod) -> Zeroizing<Vec<u8>> {
        if method == CryptMethod::AESV3 {
            return self.file_key.clone();
        }

        let mut hasher = Md5::new();
        hasher.update(self.file_key.as_slice());
        hasher.update(&id.0.to_le_bytes()[..3]);
        hasher.update(id.1.to_le_bytes());
        if method == CryptMethod::AESV2 {
            hasher.update(b"sAlT");
        }
        let hash = hasher.finalize();

        let key_len = (self.file_key.len() + 5).min(16);
        Zeroizing::new(hash[..key_len].to_vec())
    }

    fn process(&self, id: ObjectId, method: CryptMethod, data: &[u8], encrypt: bool) -> PDFResult<Vec<u8>> {
        if method == CryptMethod::Identity {
            return Ok(data.to_vec());
        }
        let provider = self
            .providers
            .get(&method)
            .ok_or_else(|| PDFError::encryption(format!("no provider for {:?}", method)))?;
        let key = self.object_key(id, method);

        trace!(
            "{} {} bytes of object {} {} with {:?}",
            if encrypt { "Encrypting" } else { "Decrypting" },
            data.len(),
            id.0,
            id.1,
            method
        );
        if encrypt {
            provider.encrypt(data, &key)
        } else if data.is_empty() {
            Ok(Vec::new())
        } else {
            provider.decrypt(data, &key)
        }
    }

    pub fn encrypt_string(&self, id: ObjectId, data: &[u8]) -> PDFResult<Vec<u8>> {
        self.process(id, self.string_method, data, true)
    }

    pub fn decrypt_string(&self, id: ObjectId, data: &[u8]) -> PDFResult<Vec<u8>> {
        self.process(id, self.string_method, data, false)
    }

    pub fn encrypt_stream(&self, id: ObjectId, data: &[u8]) -> PDFResult<Vec<u8>> {
        self.process(id, self.stream_method, data, true)
    }

    pub fn decrypt_stream(&self, id: ObjectId, data: &[u8]) -> PDFResult<Vec<u8>> {
        self.process(id, self.stream_method, data, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test_log::test]
    fn test_object_key_lengths() {
        let rc4_40 = PDFCryptoEngine::new(&[1, 2, 3, 4, 5], CryptMethod::RC4, CryptMethod::RC4);
        assert_eq!(rc4_40.object_key((1, 0), CryptMethod::RC4).len(), 10);

        let rc4_128 = PDFCryptoEngine::new(&[9; 16], CryptMethod::RC4, CryptMethod::RC4);
        assert_eq!(rc4_128.object_key((1, 0), CryptMethod::RC4).len(), 16);

        let aes_256 = PDFCryptoEngine::new(&[3; 32], CryptMethod::AESV3, CryptMethod::AESV3);
        assert_eq!(aes_256.object_key((7, 0), CryptMethod::AESV3).as_slice(), &[3u8; 32][..]);
    }

    #[test_log::test]
    fn test_object_keys_differ_per_object_and_salt() {
        let engine = PDFCryptoEngine::new(&[5; 16], CryptMethod::AESV2, CryptMethod::AESV2);
        let first = engine.object_key((1, 0), CryptMethod::AESV2);
        let second = engine.object_key((2, 0), CryptMethod::AESV2);
        let unsalted = engine.object_key((1, 0), CryptMethod::RC4);
        assert_ne!(first, second);
        assert_ne!(first, unsalted);
    }

    #[rstest]
    #[case(CryptMethod::RC4, 5)]
    #[case(CryptMethod::RC4, 16)]
    #[case(CryptMethod::AESV2, 16)]
    #[case(CryptMethod::AESV3, 32)]
    fn test_string_and_stream_round_trip(#[case] method: CryptMethod, #[case] key_len: usize) -> PDFResult<()> {
        let engine = PDFCryptoEngine::new(&vec![0x42; key_len], method, method);
        let id = (12, 0);

        let string = engine.encrypt_string(id, b"Hello, PDF encryption!")?;
        assert_ne!(string, b"Hello, PDF encryption!");
        assert_eq!(engine.decrypt_string(id, &string)?, b"Hello, PDF encryption!");

        let stream = engine.encrypt_stream(id, &[0u8; 300])?;
        assert_eq!(engine.decrypt_stream(id, &stream)?, vec![0u8; 300]);
        Ok(())
    }

    #[test_log::test]
    fn test_identity_passes_through() -> PDFResult<()> {
        let engine = PDFCryptoEngine::new(&[1; 16], CryptMethod::Identity, CryptMethod::AESV2);
        assert_eq!(engine.encrypt_string((1, 0), b"plain")?, b"plain");
        assert_ne!(engine.encrypt_stream((1, 0), b"plain")?, b"plain");
        Ok(())
    }

    #[test_log::test]
    fn test_crypt_method_names() -> PDFResult<()> {
        for method in [CryptMethod::Identity, CryptMethod::RC4, CryptMethod::AESV2, CryptMethod::AESV3] {
            assert_eq!(CryptMethod::from_name(method.name())?, method);
        }
        assert!(CryptMethod::from_name("ROT13").is_err());
        Ok(())
    }
}
