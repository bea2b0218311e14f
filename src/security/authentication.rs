use log::trace;
use zeroize::Zeroizing;

use super::key_derivation::{compute_file_key, compute_u_value, decrypt_o_value, decrypt_perms, hash_password, unwrap_file_key};
use super::{constant_time_eq, utf8_password};
use crate::error::{PDFError, PDFResult};
use crate::handlers::StandardSecurityHandler;

impl StandardSecurityHandler {
    /// Algorithm 6 (revisions 2 to 4) and Algorithm 11 (revisions 5 and 6)
    ///
    /// Returns the file key, or `None` when the password does not match.
    pub(crate) fn authenticate_user_password(&self, password: &[u8]) -> PDFResult<Option<Zeroizing<Vec<u8>>>> {
        match self.revision {
            2..=4 => {
                let file_key = compute_file_key(
                    password,
                    &self.o_value,
                    self.p_value,
                    &self.file_id,
                    self.revision,
                    self.key_length,
                    self.encrypt_metadata,
                );
                let u_value = compute_u_value(&file_key, self.revision, &self.file_id)?;
                let compared = if self.revision == 2 { 32 } else { 16 };
                let matches = constant_time_eq(&u_value[..compared], &self.u_value[..compared]);
                trace!("User password check (R{}): {}", self.revision, matches);
                Ok(matches.then_some(file_key))
            }
            5 | 6 => {
                let password = utf8_password(password);
                let hash = hash_password(password, &self.u_value[32..40], &[], self.revision)?;
                if !constant_time_eq(&hash, &self.u_value[..32]) {
                    return Ok(None);
                }
                let ue = self
                    .ue_value
                    .as_deref()
                    .ok_or_else(|| PDFError::MissingDictionaryEntry("UE".to_string()))?;
                let key_hash = Zeroizing::new(hash_password(password, &self.u_value[40..48], &[], self.revision)?);
                unwrap_file_key(key_hash.as_slice(), ue).map(Some)
            }
            other => Err(PDFError::UnsupportedRevision(other)),
        }
    }

    /// Algorithm 7 (revisions 2 to 4) and Algorithm 12 (revisions 5 and 6)
    pub(crate) fn authenticate_owner_password(&self, password: &[u8]) -> PDFResult<Option<Zeroizing<Vec<u8>>>> {
        match self.revision {
            2..=4 => {
                let user_password = decrypt_o_value(password, &self.o_value, self.revision, self.key_length)?;
                self.authenticate_user_password(&user_password)
            }
            5 | 6 => {
                let password = utf8_password(password);
                let user_key = &self.u_value[..48];
                let hash = hash_password(password, &self.o_value[32..40], user_key, self.revision)?;
                if !constant_time_eq(&hash, &self.o_value[..32]) {
                    return Ok(None);
                }
                let oe = self
                    .oe_value
                    .as_deref()
                    .ok_or_else(|| PDFError::MissingDictionaryEntry("OE".to_string()))?;
                let key_hash = Zeroizing::new(hash_password(password, &self.o_value[40..48], user_key, self.revision)?);
                unwrap_file_key(key_hash.as_slice(), oe).map(Some)
            }
            other => Err(PDFError::UnsupportedRevision(other)),
        }
    }

    /// Algorithm 13: check `/Perms` against `/P` and `/EncryptMetadata`
    ///
    /// A missing `/Perms` entry is accepted.
    pub(crate) fn validate_perms(&self, file_key: &[u8]) -> PDFResult<bool> {
        let Some(perms) = self.perms_value.as_deref() else {
            return Ok(true);
        };
        let block = decrypt_perms(file_key, perms)?;
        if &block[9..12] != b"adb" {
            return Ok(false);
        }
        let p_value = i32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        let encrypt_metadata = block[8] == b'T';
        Ok(p_value == self.p_value && encrypt_metadata == self.encrypt_metadata)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::PDFResult;
    use crate::handlers::StandardSecurityHandler;
    use crate::{EncryptionAlgorithm, PDFPermissions};

    fn handler(algorithm: EncryptionAlgorithm) -> PDFResult<StandardSecurityHandler> {
        StandardSecurityHandler::new(
            algorithm,
            PDFPermissions::new(PDFPermissions::PRINT),
            b"user",
            b"owner",
            b"file-identifier!",
            true,
        )
    }

    #[test_log::test]
    fn test_user_and_owner_keys_match() -> PDFResult<()> {
        for algorithm in [EncryptionAlgorithm::RC4_40, EncryptionAlgorithm::RC4_128, EncryptionAlgorithm::AES_256] {
            let handler = handler(algorithm)?;
            let from_user = handler.authenticate_user_password(b"user")?;
            let from_owner = handler.authenticate_owner_password(b"owner")?;
            assert!(from_user.is_some());
            assert_eq!(from_user, from_owner);
            assert!(handler.authenticate_user_password(b"owner")?.is_none());
        }
        Ok(())
    }

    #[test_log::test]
    fn test_perms_validation() -> PDFResult<()> {
        let mut handler = handler(EncryptionAlgorithm::AES_256)?;
        let key = handler.file_key()?;
        assert!(handler.validate_perms(&key)?);

        handler.p_value ^= 0x4;
        assert!(!handler.validate_perms(&key)?);
        Ok(())
    }
}
