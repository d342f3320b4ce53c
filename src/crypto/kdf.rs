//! Password-based key derivation
//!
//! A package key is derived from the viewer's password and the salt carried
//! in the envelope using PBKDF2-HMAC. One key serves exactly one decrypt.

use crate::crypto::KEY_SIZE;
use crate::error::{Error, Result};
use ring::pbkdf2;
use std::fmt;
use std::num::NonZeroU32;
use zeroize::Zeroizing;

/// HMAC hash used inside PBKDF2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashId {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashId {
    fn algorithm(self) -> pbkdf2::Algorithm {
        match self {
            HashId::Sha256 => pbkdf2::PBKDF2_HMAC_SHA256,
            HashId::Sha384 => pbkdf2::PBKDF2_HMAC_SHA384,
            HashId::Sha512 => pbkdf2::PBKDF2_HMAC_SHA512,
        }
    }
}

/// Symmetric key for a single decrypt, wiped on drop
pub struct DerivedKey {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl DerivedKey {
    /// Wrap existing key material
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        DerivedKey {
            key: Zeroizing::new(bytes),
        }
    }

    /// Get the raw key bytes
    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive a 256-bit key from a password and salt
///
/// # Arguments
/// * `password` - Viewer-supplied password
/// * `salt` - Salt carried in the envelope
/// * `iterations` - PBKDF2 iteration count (see `PBKDF2_ITERATIONS`)
/// * `hash` - HMAC hash function
pub fn derive_key(password: &str, salt: &[u8], iterations: u32, hash: HashId) -> Result<DerivedKey> {
    let iterations = NonZeroU32::new(iterations)
        .ok_or_else(|| Error::KeyDerivation("Iteration count must be non-zero".to_string()))?;

    if salt.is_empty() {
        return Err(Error::KeyDerivation("Salt must not be empty".to_string()));
    }

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2::derive(
        hash.algorithm(),
        iterations,
        salt,
        password.as_bytes(),
        &mut key[..],
    );

    Ok(DerivedKey { key })
}
