//! AES-CBC encryption provider implementation

use ::aes::{Aes128, Aes256};
use cbc::{Decryptor, Encryptor};
use cipher::block_padding::{NoPadding, Pkcs7};
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use log::trace;
use rand::{thread_rng, RngCore};

use super::CryptoProvider;
use crate::error::{PDFError, PDFResult};

const BLOCK_SIZE: usize = 16;

type Aes128CbcEnc = Encryptor<Aes128>;
type Aes128CbcDec = Decryptor<Aes128>;
type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

/// AES-CBC provider for PDF strings and streams
///
/// Ciphertext is laid out as a 16-byte IV followed by PKCS#7 padded blocks.
#[derive(Debug)]
pub(crate) struct AESProvider {
    key_length: usize,
}

impl AESProvider {
    pub fn new(key_length: usize) -> Self {
        Self { key_length }
    }

    fn check_key(&self, key: &[u8]) -> PDFResult<()> {
        if key.len() != self.key_length {
            return Err(PDFError::InvalidKeyLength(key.len()));
        }
        Ok(())
    }
}

impl CryptoProvider for AESProvider {
    fn encrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>> {
        self.check_key(key)?;

        let mut iv = [0u8; BLOCK_SIZE];
        thread_rng().fill_bytes(&mut iv);

        let ciphertext = match key.len() {
            16 => Aes128CbcEnc::new_from_slices(key, &iv)?.encrypt_padded_vec_mut::<Pkcs7>(data),
            32 => Aes256CbcEnc::new_from_slices(key, &iv)?.encrypt_padded_vec_mut::<Pkcs7>(data),
            n => return Err(PDFError::InvalidKeyLength(n)),
        };

        let mut output = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
        output.extend_from_slice(&iv);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn decrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>> {
        self.check_key(key)?;

        if data.len() < BLOCK_SIZE {
            return Err(PDFError::invalid_length("AES decryption (missing IV)"));
        }
        let (iv, ciphertext) = data.split_at(BLOCK_SIZE);
        if ciphertext.is_empty() {
            trace!("AES payload holds only an IV");
            return Ok(Vec::new());
        }
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(PDFError::invalid_length("AES decryption (partial block)"));
        }

        let plaintext = match key.len() {
            16 => Aes128CbcDec::new_from_slices(key, iv)?.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)?,
            32 => Aes256CbcDec::new_from_slices(key, iv)?.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)?,
            n => return Err(PDFError::InvalidKeyLength(n)),
        };
        Ok(plaintext)
    }
}

/// CBC encryption without padding; `data` must be block aligned
pub(crate) fn cbc_encrypt_unpadded(key: &[u8], iv: &[u8], data: &[u8]) -> PDFResult<Vec<u8>> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(PDFError::invalid_length("unpadded AES encryption"));
    }
    match key.len() {
        16 => Ok(Aes128CbcEnc::new_from_slices(key, iv)?.encrypt_padded_vec_mut::<NoPadding>(data)),
        32 => Ok(Aes256CbcEnc::new_from_slices(key, iv)?.encrypt_padded_vec_mut::<NoPadding>(data)),
        n => Err(PDFError::InvalidKeyLength(n)),
    }
}

/// CBC decryption without padding; `data` must be block aligned
pub(crate) fn cbc_decrypt_unpadded(key: &[u8], iv: &[u8], data: &[u8]) -> PDFResult<Vec<u8>> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(PDFError::invalid_length("unpadded AES decryption"));
    }
    match key.len() {
        16 => Ok(Aes128CbcDec::new_from_slices(key, iv)?.decrypt_padded_vec_mut::<NoPadding>(data)?),
        32 => Ok(Aes256CbcDec::new_from_slices(key, iv)?.decrypt_padded_vec_mut::<NoPadding>(data)?),
        n => Err(PDFError::InvalidKeyLength(n)),
    }
}
