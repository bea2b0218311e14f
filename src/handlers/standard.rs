//! Password-based `/Standard` security handler (revisions 2 to 6)

use std::fmt;

use log::{debug, warn};
use zeroize::{Zeroizing, ZeroizeOnDrop};

use crate::crypto::{CryptMethod, PDFCryptoEngine};
use crate::error::{PDFError, PDFResult};
use crate::pdf::{Dictionary, Object};
use crate::security::key_derivation::{
    compute_file_key, compute_o_value, compute_r6_values, compute_u_value, generate_file_key,
};
use crate::security::utf8_password;
use crate::{EncryptionAlgorithm, PDFPermissions};

/// Name of the crypt filter written for V4 and V5 dictionaries
const STD_CF: &str = "StdCF";

/// Standard security handler for password-based encryption
#[derive(Clone, ZeroizeOnDrop)]
pub struct StandardSecurityHandler {
    #[zeroize(skip)]
    pub(crate) algorithm: EncryptionAlgorithm,
    pub(crate) version: u8,
    pub(crate) revision: u8,
    /// File key length in bytes
    pub(crate) key_length: usize,
    /// `/P` as stored, a signed 32-bit value
    pub(crate) p_value: i32,
    pub(crate) o_value: Vec<u8>,
    pub(crate) u_value: Vec<u8>,
    pub(crate) oe_value: Option<Vec<u8>>,
    pub(crate) ue_value: Option<Vec<u8>>,
    pub(crate) perms_value: Option<Vec<u8>>,
    pub(crate) encrypt_metadata: bool,
    #[zeroize(skip)]
    string_method: CryptMethod,
    #[zeroize(skip)]
    stream_method: CryptMethod,
    encryption_key: Option<Vec<u8>>,
    pub(crate) file_id: Vec<u8>,
}

impl fmt::Debug for StandardSecurityHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardSecurityHandler")
            .field("algorithm", &self.algorithm)
            .field("version", &self.version)
            .field("revision", &self.revision)
            .field("key_length", &self.key_length)
            .field("p_value", &self.p_value)
            .field("encrypt_metadata", &self.encrypt_metadata)
            .field("authenticated", &self.encryption_key.is_some())
            .finish_non_exhaustive()
    }
}

/// (V, R, key bytes, crypt method) written for each algorithm
fn parameters(algorithm: EncryptionAlgorithm) -> (u8, u8, usize, CryptMethod) {
    match algorithm {
        EncryptionAlgorithm::RC4_40 => (1, 2, 5, CryptMethod::RC4),
        EncryptionAlgorithm::RC4_128 => (2, 3, 16, CryptMethod::RC4),
        EncryptionAlgorithm::AES_128 => (4, 4, 16, CryptMethod::AESV2),
        EncryptionAlgorithm::AES_256 => (5, 6, 32, CryptMethod::AESV3),
    }
}

impl StandardSecurityHandler {
    /// Create a handler for writing, deriving every dictionary value
    ///
    /// The handler is authenticated on return. An empty owner password falls
    /// back to the user password.
    pub fn new(
        algorithm: EncryptionAlgorithm,
        permissions: PDFPermissions,
        user_password: &[u8],
        owner_password: &[u8],
        file_id: &[u8],
        encrypt_metadata: bool,
    ) -> PDFResult<Self> {
        let (version, revision, key_length, method) = parameters(algorithm);
        let p_value = permissions.p_value();
        let owner_password = if owner_password.is_empty() { user_password } else { owner_password };

        let mut handler = Self {
            algorithm,
            version,
            revision,
            key_length,
            p_value,
            o_value: Vec::new(),
            u_value: Vec::new(),
            oe_value: None,
            ue_value: None,
            perms_value: None,
            encrypt_metadata,
            string_method: method,
            stream_method: method,
            encryption_key: None,
            file_id: file_id.to_vec(),
        };

        if revision >= 5 {
            let file_key = generate_file_key();
            let values = compute_r6_values(
                utf8_password(user_password),
                utf8_password(owner_password),
                &file_key,
                p_value,
                encrypt_metadata,
            )?;
            handler.u_value = values.u;
            handler.o_value = values.o;
            handler.ue_value = Some(values.ue);
            handler.oe_value = Some(values.oe);
            handler.perms_value = Some(values.perms);
            handler.encryption_key = Some(file_key.to_vec());
        } else {
            handler.o_value = compute_o_value(owner_password, user_password, revision, key_length)?;
            let file_key = compute_file_key(
                user_password,
                &handler.o_value,
                p_value,
                file_id,
                revision,
                key_length,
                encrypt_metadata,
            );
            handler.u_value = compute_u_value(&file_key, revision, file_id)?;
            handler.encryption_key = Some(file_key.to_vec());
        }

        debug!("Created {} security handler (V{} R{})", algorithm, version, revision);
        Ok(handler)
    }

    /// Read an encryption dictionary
    ///
    /// `file_id` is the first element of the trailer `/ID`.
    pub fn from_dict(dict: &Dictionary, file_id: &[u8]) -> PDFResult<Self> {
        match dict.get_name("Filter") {
            Some("Standard") => {}
            Some(other) => {
                return Err(PDFError::encryption(format!("unsupported security handler /{}", other)))
            }
            None => return Err(PDFError::MissingDictionaryEntry("Filter".to_string())),
        }

        let version = dict.get_i64("V").unwrap_or(0);
        let revision = dict
            .get_i64("R")
            .ok_or_else(|| PDFError::MissingDictionaryEntry("R".to_string()))?;
        let revision = u8::try_from(revision)
            .ok()
            .filter(|r| (2..=6).contains(r))
            .ok_or(PDFError::UnsupportedRevision(revision.clamp(0, 255) as u8))?;

        let (version, string_method, stream_method) = match version {
            1 | 2 => (version as u8, CryptMethod::RC4, CryptMethod::RC4),
            4 | 5 => (
                version as u8,
                crypt_filter_method(dict, dict.get_name("StrF"))?,
                crypt_filter_method(dict, dict.get_name("StmF"))?,
            ),
            other => return Err(PDFError::encryption(format!("unsupported encryption /V {}", other))),
        };

        let key_length = if revision >= 5 {
            32
        } else if revision == 2 {
            5
        } else {
            let bits = dict.get_i64("Length").unwrap_or(if version == 4 { 128 } else { 40 });
            let bytes = usize::try_from(bits / 8).unwrap_or(0);
            if !(5..=16).contains(&bytes) || bits % 8 != 0 {
                return Err(PDFError::InvalidKeyLength(bytes));
            }
            bytes
        };

        let o_value = dict
            .get_string("O")
            .ok_or_else(|| PDFError::MissingDictionaryEntry("O".to_string()))?
            .to_vec();
        let u_value = dict
            .get_string("U")
            .ok_or_else(|| PDFError::MissingDictionaryEntry("U".to_string()))?
            .to_vec();
        let required = if revision >= 5 { 48 } else { 32 };
        if o_value.len() < required || u_value.len() < required {
            return Err(PDFError::invalid_length("/O or /U value"));
        }

        let p_value = dict
            .get_i64("P")
            .ok_or_else(|| PDFError::MissingDictionaryEntry("P".to_string()))?;
        // Some writers store /P as an unsigned 32-bit number
        let p_value = p_value as u32 as i32;

        let algorithm = match (version, stream_method, string_method) {
            (5, ..) => EncryptionAlgorithm::AES_256,
            (_, CryptMethod::AESV2, _) | (_, _, CryptMethod::AESV2) => EncryptionAlgorithm::AES_128,
            _ if key_length == 5 => EncryptionAlgorithm::RC4_40,
            _ => EncryptionAlgorithm::RC4_128,
        };

        let optional = |key: &str| dict.get_string(key).map(<[u8]>::to_vec);

        Ok(Self {
            algorithm,
            version,
            revision,
            key_length,
            p_value,
            o_value,
            u_value,
            oe_value: optional("OE"),
            ue_value: optional("UE"),
            perms_value: optional("Perms"),
            encrypt_metadata: dict.get_bool("EncryptMetadata").unwrap_or(true),
            string_method,
            stream_method,
            encryption_key: None,
            file_id: file_id.to_vec(),
        })
    }

    /// Authenticate with the user or the owner password
    pub fn authenticate_password(&mut self, password: &[u8]) -> PDFResult<()> {
        let key = match self.authenticate_user_password(password)? {
            Some(key) => key,
            None => self
                .authenticate_owner_password(password)?
                .ok_or(PDFError::AuthenticationFailed)?,
        };

        if self.revision >= 5 && !self.validate_perms(&key)? {
            warn!("/Perms does not match /P; continuing with /P");
        }
        self.encryption_key = Some(key.to_vec());
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.encryption_key.is_some()
    }

    /// File encryption key after authentication
    pub fn file_key(&self) -> PDFResult<Zeroizing<Vec<u8>>> {
        self.encryption_key
            .as_ref()
            .map(|key| Zeroizing::new(key.clone()))
            .ok_or(PDFError::AuthenticationFailed)
    }

    /// String and stream cipher bound to the file key
    pub fn crypto_engine(&self) -> PDFResult<PDFCryptoEngine> {
        let key = self.file_key()?;
        Ok(PDFCryptoEngine::new(&key, self.string_method, self.stream_method)
            .with_encrypt_metadata(self.encrypt_metadata))
    }

    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.algorithm
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn revision(&self) -> u8 {
        self.revision
    }

    pub fn permissions(&self) -> PDFPermissions {
        PDFPermissions::from_p_value(self.p_value)
    }

    pub fn encrypt_metadata(&self) -> bool {
        self.encrypt_metadata
    }

    /// Encryption dictionary for the trailer `/Encrypt`
    pub fn to_dict(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::name("Standard"));
        dict.set("V", i64::from(self.version));
        dict.set("R", i64::from(self.revision));
        dict.set("Length", (self.key_length * 8) as i64);
        dict.set("O", Object::string(self.o_value.clone()));
        dict.set("U", Object::string(self.u_value.clone()));
        dict.set("P", i64::from(self.p_value));

        if self.version >= 4 {
            let mut std_cf = Dictionary::with_type("CryptFilter");
            std_cf.set("CFM", Object::name(self.stream_method.name()));
            std_cf.set("AuthEvent", Object::name("DocOpen"));
            std_cf.set("Length", self.key_length);
            let mut cf = Dictionary::new();
            cf.set(STD_CF, std_cf);
            dict.set("CF", cf);
            dict.set("StmF", Object::name(STD_CF));
            dict.set("StrF", Object::name(STD_CF));
            dict.set("EncryptMetadata", self.encrypt_metadata);
        }
        if let Some(oe) = &self.oe_value {
            dict.set("OE", Object::string(oe.clone()));
        }
        if let Some(ue) = &self.ue_value {
            dict.set("UE", Object::string(ue.clone()));
        }
        if let Some(perms) = &self.perms_value {
            dict.set("Perms", Object::string(perms.clone()));
        }
        dict
    }
}

/// Resolve `/StmF` or `/StrF` through `/CF`
fn crypt_filter_method(dict: &Dictionary, name: Option<&str>) -> PDFResult<CryptMethod> {
    let name = match name {
        None | Some("Identity") => return Ok(CryptMethod::Identity),
        Some(name) => name,
    };
    let filter = dict
        .get_dict("CF")
        .and_then(|cf| cf.get_dict(name))
        .ok_or_else(|| PDFError::encryption(format!("crypt filter /{} is not defined", name)))?;
    CryptMethod::from_name(filter.get_name("CFM").unwrap_or("None"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const FILE_ID: &[u8] = b"\x01\x23\x45\x67\x89\xab\xcd\xef\x01\x23\x45\x67\x89\xab\xcd\xef";

    #[rstest]
    #[case(EncryptionAlgorithm::RC4_40)]
    #[case(EncryptionAlgorithm::RC4_128)]
    #[case(EncryptionAlgorithm::AES_128)]
    #[case(EncryptionAlgorithm::AES_256)]
    fn test_dictionary_round_trip_authenticates(#[case] algorithm: EncryptionAlgorithm) -> PDFResult<()> {
        let permissions = PDFPermissions::new(PDFPermissions::PRINT | PDFPermissions::COPY);
        let writer = StandardSecurityHandler::new(algorithm, permissions, b"user", b"owner", FILE_ID, true)?;
        let dict = writer.to_dict();

        let mut reader = StandardSecurityHandler::from_dict(&dict, FILE_ID)?;
        assert_eq!(reader.algorithm(), algorithm);
        assert_eq!(reader.permissions().bits(), permissions.bits());

        reader.authenticate_password(b"user")?;
        assert_eq!(reader.file_key()?, writer.file_key()?);

        let mut owner = StandardSecurityHandler::from_dict(&dict, FILE_ID)?;
        owner.authenticate_password(b"owner")?;
        assert_eq!(owner.file_key()?, writer.file_key()?);

        let mut wrong = StandardSecurityHandler::from_dict(&dict, FILE_ID)?;
        assert!(matches!(wrong.authenticate_password(b"nope"), Err(PDFError::AuthenticationFailed)));
        assert!(!wrong.is_authenticated());
        Ok(())
    }

    #[test_log::test]
    fn test_empty_user_password() -> PDFResult<()> {
        let writer = StandardSecurityHandler::new(
            EncryptionAlgorithm::AES_128,
            PDFPermissions::new(PDFPermissions::ALL),
            b"",
            b"owner",
            FILE_ID,
            true,
        )?;
        let mut reader = StandardSecurityHandler::from_dict(&writer.to_dict(), FILE_ID)?;
        reader.authenticate_password(b"")?;
        assert!(reader.is_authenticated());
        Ok(())
    }

    #[test_log::test]
    fn test_v4_dictionary_layout() -> PDFResult<()> {
        let handler = StandardSecurityHandler::new(
            EncryptionAlgorithm::AES_128,
            PDFPermissions::new(PDFPermissions::ALL),
            b"u",
            b"o",
            FILE_ID,
            false,
        )?;
        let dict = handler.to_dict();
        assert_eq!(dict.get_i64("V"), Some(4));
        assert_eq!(dict.get_i64("R"), Some(4));
        assert_eq!(dict.get_name("StmF"), Some("StdCF"));
        assert_eq!(dict.get_bool("EncryptMetadata"), Some(false));
        let cfm = dict
            .get_dict("CF")
            .and_then(|cf| cf.get_dict("StdCF"))
            .and_then(|f| f.get_name("CFM"));
        assert_eq!(cfm, Some("AESV2"));
        Ok(())
    }

    #[test_log::test]
    fn test_rejects_other_handlers_and_revisions() {
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::name("Adobe.PubSec"));
        assert!(matches!(
            StandardSecurityHandler::from_dict(&dict, FILE_ID),
            Err(PDFError::EncryptionError(_))
        ));

        dict.set("Filter", Object::name("Standard"));
        dict.set("V", 2);
        dict.set("R", 7);
        assert!(matches!(
            StandardSecurityHandler::from_dict(&dict, FILE_ID),
            Err(PDFError::UnsupportedRevision(7))
        ));
    }

    #[test_log::test]
    fn test_identity_crypt_filter() -> PDFResult<()> {
        let mut dict = StandardSecurityHandler::new(
            EncryptionAlgorithm::AES_128,
            PDFPermissions::new(PDFPermissions::ALL),
            b"",
            b"",
            FILE_ID,
            true,
        )?
        .to_dict();
        dict.set("StrF", Object::name("Identity"));

        let mut handler = StandardSecurityHandler::from_dict(&dict, FILE_ID)?;
        handler.authenticate_password(b"")?;
        let engine = handler.crypto_engine()?;
        assert_eq!(engine.string_method(), CryptMethod::Identity);
        assert_eq!(engine.stream_method(), CryptMethod::AESV2);
        Ok(())
    }
}
