//! PDF cryptographic engine implementation

mod aes;
mod engine;
mod rc4;

pub use engine::{CryptMethod, PDFCryptoEngine};
pub(crate) use self::aes::{cbc_decrypt_unpadded, cbc_encrypt_unpadded, AESProvider};
pub(crate) use self::rc4::RC4Provider;

use crate::error::PDFResult;

/// Trait for PDF string and stream encryption/decryption
pub(crate) trait CryptoProvider: Send + Sync {
    fn encrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>>;
    fn decrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>>;
}
