use md5::{Digest, Md5};
use rand::{thread_rng, RngCore};
use sha2::{Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use super::{pad_password, PADDING};
use crate::crypto::{cbc_decrypt_unpadded, cbc_encrypt_unpadded, RC4Provider};
use crate::error::{PDFError, PDFResult};

const ZERO_IV: [u8; 16] = [0; 16];

/// Algorithm 2: file key from a user password (revisions 2 to 4)
pub(crate) fn compute_file_key(
    password: &[u8],
    o_value: &[u8],
    p_value: i32,
    file_id: &[u8],
    revision: u8,
    key_length: usize,
    encrypt_metadata: bool,
) -> Zeroizing<Vec<u8>> {
    let mut hasher = Md5::new();
    hasher.update(pad_password(password));
    hasher.update(&o_value[..o_value.len().min(32)]);
    hasher.update(p_value.to_le_bytes());
    hasher.update(file_id);
    if revision >= 4 && !encrypt_metadata {
        hasher.update([0xFF; 4]);
    }
    let mut hash = Zeroizing::new(hasher.finalize().to_vec());

    if revision >= 3 {
        for _ in 0..50 {
            *hash = Md5::digest(&hash[..key_length]).to_vec();
        }
    }

    hash.truncate(key_length);
    hash
}

/// Algorithm 3 steps a to d: RC4 key derived from the owner password
fn owner_key(owner_password: &[u8], revision: u8, key_length: usize) -> Zeroizing<Vec<u8>> {
    let mut hash = Zeroizing::new(Md5::digest(pad_password(owner_password)).to_vec());
    if revision >= 3 {
        for _ in 0..50 {
            *hash = Md5::digest(hash.as_slice()).to_vec();
        }
    }
    hash.truncate(if revision == 2 { 5 } else { key_length });
    hash
}

/// RC4 passes of Algorithm 3 and Algorithm 5: key, then key XOR 1..=19
fn rc4_rounds(data: &mut [u8], key: &[u8], revision: u8, reverse: bool) -> PDFResult<()> {
    let rc4 = RC4Provider::new();
    if revision == 2 {
        return rc4.apply(data, key);
    }

    let mut round_key = Zeroizing::new(vec![0u8; key.len()]);
    let mut apply_round = |i: u8| {
        for (dst, src) in round_key.iter_mut().zip(key) {
            *dst = src ^ i;
        }
        rc4.apply(data, &round_key)
    };
    if reverse {
        for i in (0..=19u8).rev() {
            apply_round(i)?;
        }
    } else {
        for i in 0..=19u8 {
            apply_round(i)?;
        }
    }
    Ok(())
}

/// Algorithm 3: the `/O` value (revisions 2 to 4)
///
/// An empty owner password falls back to the user password.
pub(crate) fn compute_o_value(
    owner_password: &[u8],
    user_password: &[u8],
    revision: u8,
    key_length: usize,
) -> PDFResult<Vec<u8>> {
    let owner_password = if owner_password.is_empty() { user_password } else { owner_password };
    let key = owner_key(owner_password, revision, key_length);
    let mut data = pad_password(user_password).to_vec();
    rc4_rounds(&mut data, &key, revision, false)?;
    Ok(data)
}

/// Algorithm 7 steps a and b: recover the padded user password from `/O`
pub(crate) fn decrypt_o_value(
    owner_password: &[u8],
    o_value: &[u8],
    revision: u8,
    key_length: usize,
) -> PDFResult<Zeroizing<Vec<u8>>> {
    if o_value.len() < 32 {
        return Err(PDFError::invalid_length("/O value"));
    }
    let key = owner_key(owner_password, revision, key_length);
    let mut data = Zeroizing::new(o_value[..32].to_vec());
    rc4_rounds(&mut data, &key, revision, true)?;
    Ok(data)
}

/// Algorithms 4 and 5: the `/U` value from a file key
///
/// Revision 3 and later only define the first 16 bytes; the rest is padding.
pub(crate) fn compute_u_value(file_key: &[u8], revision: u8, file_id: &[u8]) -> PDFResult<Vec<u8>> {
    if revision == 2 {
        let mut data = PADDING.to_vec();
        RC4Provider::new().apply(&mut data, file_key)?;
        return Ok(data);
    }

    let mut hasher = Md5::new();
    hasher.update(PADDING);
    hasher.update(file_id);
    let mut data = hasher.finalize().to_vec();
    rc4_rounds(&mut data, file_key, revision, false)?;
    data.extend_from_slice(&PADDING[..16]);
    Ok(data)
}

/// Algorithm 2.B (revision 6), or a single SHA-256 for revision 5
///
/// `user_key` is the 48-byte `/U` prefix for owner operations and empty for
/// user operations.
pub(crate) fn hash_password(password: &[u8], salt: &[u8], user_key: &[u8], revision: u8) -> PDFResult<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    hasher.update(user_key);
    let mut k = Zeroizing::new(hasher.finalize().to_vec());

    if revision >= 6 {
        let mut round = 0usize;
        loop {
            let mut k1 = Zeroizing::new(Vec::with_capacity(64 * (password.len() + k.len() + user_key.len())));
            for _ in 0..64 {
                k1.extend_from_slice(password);
                k1.extend_from_slice(&k);
                k1.extend_from_slice(user_key);
            }

            let e = Zeroizing::new(cbc_encrypt_unpadded(&k[..16], &k[16..32], &k1)?);
            let selector = e[..16].iter().map(|&b| u32::from(b)).sum::<u32>() % 3;
            *k = match selector {
                0 => Sha256::digest(e.as_slice()).to_vec(),
                1 => Sha384::digest(e.as_slice()).to_vec(),
                _ => Sha512::digest(e.as_slice()).to_vec(),
            };

            round += 1;
            let last = usize::from(e.last().copied().unwrap_or(0));
            if round >= 64 && last + 32 <= round {
                break;
            }
        }
    }

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&k[..32]);
    Ok(hash)
}

/// Random file key for revision 6
pub(crate) fn generate_file_key() -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(vec![0u8; 32]);
    thread_rng().fill_bytes(&mut key);
    key
}

/// Values written to the encryption dictionary for revision 6
#[derive(Debug, Clone)]
pub(crate) struct R6Values {
    pub u: Vec<u8>,
    pub ue: Vec<u8>,
    pub o: Vec<u8>,
    pub oe: Vec<u8>,
    pub perms: Vec<u8>,
}

/// Algorithms 8, 9 and 10
pub(crate) fn compute_r6_values(
    user_password: &[u8],
    owner_password: &[u8],
    file_key: &[u8],
    p_value: i32,
    encrypt_metadata: bool,
) -> PDFResult<R6Values> {
    let mut salts = [0u8; 32];
    thread_rng().fill_bytes(&mut salts);
    let (user_salts, owner_salts) = salts.split_at(16);

    // Algorithm 8
    let mut u = hash_password(user_password, &user_salts[..8], &[], 6)?.to_vec();
    u.extend_from_slice(user_salts);
    let user_key_hash = Zeroizing::new(hash_password(user_password, &user_salts[8..], &[], 6)?);
    let ue = cbc_encrypt_unpadded(user_key_hash.as_slice(), &ZERO_IV, file_key)?;

    // Algorithm 9
    let mut o = hash_password(owner_password, &owner_salts[..8], &u, 6)?.to_vec();
    o.extend_from_slice(owner_salts);
    let owner_key_hash = Zeroizing::new(hash_password(owner_password, &owner_salts[8..], &u, 6)?);
    let oe = cbc_encrypt_unpadded(owner_key_hash.as_slice(), &ZERO_IV, file_key)?;

    // Algorithm 10
    let mut block = [0u8; 16];
    block[..8].copy_from_slice(&i64::from(p_value).to_le_bytes());
    block[8] = if encrypt_metadata { b'T' } else { b'F' };
    block[9..12].copy_from_slice(b"adb");
    thread_rng().fill_bytes(&mut block[12..]);
    let perms = cbc_encrypt_unpadded(file_key, &ZERO_IV, &block)?;

    Ok(R6Values { u, ue, o, oe, perms })
}

/// Decrypt `/UE` or `/OE` with an intermediate key hash
pub(crate) fn unwrap_file_key(key_hash: &[u8], wrapped: &[u8]) -> PDFResult<Zeroizing<Vec<u8>>> {
    if wrapped.len() < 32 {
        return Err(PDFError::invalid_length("/OE or /UE value"));
    }
    Ok(Zeroizing::new(cbc_decrypt_unpadded(key_hash, &ZERO_IV, &wrapped[..32])?))
}

/// Algorithm 13 decryption of `/Perms`, returning the 16-byte block
pub(crate) fn decrypt_perms(file_key: &[u8], perms: &[u8]) -> PDFResult<Vec<u8>> {
    if perms.len() < 16 {
        return Err(PDFError::invalid_length("/Perms value"));
    }
    cbc_decrypt_unpadded(file_key, &ZERO_IV, &perms[..16])
}
