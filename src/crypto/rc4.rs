//! RC4 encryption provider implementation

use ::rc4::Rc4;
use cipher::consts::{U10, U11, U12, U13, U14, U15, U16, U5, U6, U7, U8, U9};
use cipher::{KeyInit, StreamCipher};

use super::CryptoProvider;
use crate::error::{PDFError, PDFResult};

/// RC4 encryption provider
///
/// Accepts the key sizes the standard security handler produces, 40 to 128
/// bits in whole bytes.
#[derive(Debug, Default)]
pub struct RC4Provider;

impl RC4Provider {
    /// Create new RC4 provider
    pub fn new() -> Self {
        Self
    }

    /// Apply the keystream in place; RC4 is its own inverse
    pub fn apply(&self, data: &mut [u8], key: &[u8]) -> PDFResult<()> {
        macro_rules! keystream {
            ($size:ty) => {{
                let mut cipher = Rc4::<$size>::new_from_slice(key)?;
                cipher.apply_keystream(data);
            }};
        }

        match key.len() {
            5 => keystream!(U5),
            6 => keystream!(U6),
            7 => keystream!(U7),
            8 => keystream!(U8),
            9 => keystream!(U9),
            10 => keystream!(U10),
            11 => keystream!(U11),
            12 => keystream!(U12),
            13 => keystream!(U13),
            14 => keystream!(U14),
            15 => keystream!(U15),
            16 => keystream!(U16),
            n => return Err(PDFError::InvalidKeyLength(n)),
        }
        Ok(())
    }
}

impl CryptoProvider for RC4Provider {
    fn encrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>> {
        let mut output = data.to_vec();
        self.apply(&mut output, key)?;
        Ok(output)
    }

    fn decrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>> {
        self.encrypt(data, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test_log::test]
    fn test_rc4_round_trip() -> PDFResult<()> {
        let provider = RC4Provider::new();
        let key = [0x01, 0x02, 0x03, 0x04, 0x05];
        let data = b"Test RC4 encryption".to_vec();

        let encrypted = provider.encrypt(&data, &key)?;
        assert_ne!(encrypted, data);
        assert_eq!(provider.decrypt(&encrypted, &key)?, data);
        Ok(())
    }

    #[test_log::test]
    fn test_rc4_known_keystream() -> PDFResult<()> {
        // RFC 6229, 40-bit key, keystream offset 0
        let key = hex::decode("0102030405").map_err(|e| PDFError::encryption(e.to_string()))?;
        let mut data = vec![0u8; 16];
        RC4Provider::new().apply(&mut data, &key)?;
        assert_eq!(hex::encode(data), "b2396305f03dc027ccc3524a0a1118a8");
        Ok(())
    }

    #[test_log::test]
    fn test_rc4_rejects_key_sizes() {
        let provider = RC4Provider::new();
        assert!(matches!(provider.encrypt(b"x", &[1; 4]), Err(PDFError::InvalidKeyLength(4))));
        assert!(matches!(provider.encrypt(b"x", &[1; 17]), Err(PDFError::InvalidKeyLength(17))));
    }
}
