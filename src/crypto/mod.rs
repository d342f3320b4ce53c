//! Cryptography module for portalcrypt
//!
//! Provides AES-256-GCM encryption with PBKDF2-HMAC key derivation.
//! The parameters here are part of the package wire contract shared with
//! the packaging side; changing any of them breaks existing packages.

mod encryption;
mod kdf;

pub use encryption::{decrypt, encrypt, open_package, seal_package, self_test};
pub use kdf::{derive_key, DerivedKey, HashId};

/// Size of AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of GCM nonce (IV) in bytes
pub const IV_SIZE: usize = 12;

/// Size of GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Size of salt generated for key derivation
pub const SALT_SIZE: usize = 16;

/// PBKDF2 iteration count shared by producer and consumer
pub const PBKDF2_ITERATIONS: u32 = 120_000;
