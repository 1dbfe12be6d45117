//! Credential derivation and comparison.
//!
//! The scrypt parameters and API-key size are compile-time constants and
//! must be identical on every node of a cluster: password verification on
//! one node must reproduce hashes written by another.

use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::error::{Result, UserError};

/// scrypt CPU/memory cost, as log2(N). N = 32768.
pub const SCRYPT_LOG_N: u8 = 15;
/// scrypt block size parameter.
pub const SCRYPT_R: u32 = 8;
/// scrypt parallelization parameter.
pub const SCRYPT_P: u32 = 1;
/// Derived hash length in bytes.
pub const HASH_BYTES: usize = 32;
/// Per-user salt length in bytes.
pub const SALT_BYTES: usize = 32;
/// Bytes of entropy in an API key (base-32 encoded for transport).
pub const API_KEY_BYTES: usize = 32;

/// Derives the scrypt hash of a password with the given salt.
pub fn hash_password(password: &[u8], salt: &[u8]) -> Result<Vec<u8>> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, HASH_BYTES)
        .map_err(|e| UserError::Kdf(e.to_string()))?;
    let mut out = vec![0u8; HASH_BYTES];
    scrypt::scrypt(password, salt, &params, &mut out).map_err(|e| UserError::Kdf(e.to_string()))?;
    Ok(out)
}

/// A fresh random salt from the OS CSPRNG.
pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// A fresh API key: [`API_KEY_BYTES`] of CSPRNG output, base-32 encoded.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    data_encoding::BASE32.encode(&bytes)
}

/// Constant-time equality of two secrets. Length is not secret.
pub fn secrets_equal(a: &[u8], b: &[u8]) -> bool {
    bool::from(a.ct_eq(b))
}
