//! Security handlers for PDF encryption/decryption

mod standard;

pub use standard::StandardSecurityHandler;

use log::debug;

use crate::error::{PDFError, PDFResult};
use crate::pdf::Dictionary;

/// Select and authenticate the handler named by an encryption dictionary
///
/// Only the password-based `/Standard` handler is implemented; any other
/// `/Filter` is reported as an `EncryptionError`.
pub fn open_security_handler(dict: &Dictionary, file_id: &[u8], password: &[u8]) -> PDFResult<StandardSecurityHandler> {
    let mut handler = StandardSecurityHandler::from_dict(dict, file_id)?;
    debug!(
        "Authenticating {} (V{} R{})",
        handler.algorithm(),
        handler.version(),
        handler.revision()
    );
    handler.authenticate_password(password).map_err(|err| match err {
        PDFError::AuthenticationFailed => PDFError::encryption("incorrect password"),
        other => other,
    })?;
    Ok(handler)
}
