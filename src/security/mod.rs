//! Standard security handler algorithms
//!
//! `key_derivation` computes file keys and the `/O`, `/U`, `/OE`, `/UE` and
//! `/Perms` values, `authentication` checks passwords against them and
//! `object_encryption` applies the resulting keys to an object graph.

pub(crate) mod authentication;
pub(crate) mod key_derivation;
pub(crate) mod object_encryption;

/// Password padding string used by revisions 2 to 4
pub(crate) const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Longest password revisions 5 and 6 consider
pub(crate) const MAX_UTF8_PASSWORD: usize = 127;

/// Truncate or pad a password to 32 bytes
pub(crate) fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

/// Password bytes used by revisions 5 and 6
pub(crate) fn utf8_password(password: &[u8]) -> &[u8] {
    &password[..password.len().min(MAX_UTF8_PASSWORD)]
}

/// Compare without an early exit on the first differing byte
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
