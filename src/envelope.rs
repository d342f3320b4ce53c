//! Package envelope wire format
//!
//! An envelope is four hex fields joined by `.` in fixed order:
//!
//! ```text
//! <hex:salt>.<hex:iv>.<hex:auth_tag>.<hex:ciphertext>
//! ```
//!
//! This module only deals with framing. Whether the bytes decrypt is decided
//! by the cipher engine.

use crate::crypto::{IV_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Field separator on the wire
pub const SEPARATOR: char = '.';

/// Encrypted package as produced by the packaging side
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    salt: Vec<u8>,
    iv: Vec<u8>,
    auth_tag: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl Envelope {
    /// Build an envelope, enforcing the framing invariants
    pub fn new(salt: Vec<u8>, iv: Vec<u8>, auth_tag: Vec<u8>, ciphertext: Vec<u8>) -> Result<Self> {
        if salt.is_empty() || iv.is_empty() || auth_tag.is_empty() || ciphertext.is_empty() {
            return Err(Error::MalformedEnvelope("empty field".to_string()));
        }
        if iv.len() != IV_SIZE {
            return Err(Error::MalformedEnvelope(format!(
                "iv must be {} bytes, got {}",
                IV_SIZE,
                iv.len()
            )));
        }
        if auth_tag.len() != TAG_SIZE {
            return Err(Error::MalformedEnvelope(format!(
                "auth tag must be {} bytes, got {}",
                TAG_SIZE,
                auth_tag.len()
            )));
        }

        Ok(Envelope {
            salt,
            iv,
            auth_tag,
            ciphertext,
        })
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    pub fn auth_tag(&self) -> &[u8] {
        &self.auth_tag
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Encode to the wire string
    pub fn encode(&self) -> String {
        [&self.salt, &self.iv, &self.auth_tag, &self.ciphertext]
            .iter()
            .map(hex::encode)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Decode from the wire string
    ///
    /// Surrounding whitespace is ignored so packages written with a trailing
    /// newline still decode. Hex digits may be upper or lower case.
    pub fn decode(wire: &str) -> Result<Self> {
        let segments: Vec<&str> = wire.trim().split(SEPARATOR).collect();
        if segments.len() != 4 {
            return Err(Error::MalformedEnvelope(format!(
                "expected 4 segments, found {}",
                segments.len()
            )));
        }

        let mut fields = Vec::with_capacity(4);
        for (index, segment) in segments.iter().enumerate() {
            fields.push(decode_segment(index, segment)?);
        }

        let ciphertext = fields.pop().unwrap_or_default();
        let auth_tag = fields.pop().unwrap_or_default();
        let iv = fields.pop().unwrap_or_default();
        let salt = fields.pop().unwrap_or_default();

        Envelope::new(salt, iv, auth_tag, ciphertext)
    }
}

fn decode_segment(index: usize, segment: &str) -> Result<Vec<u8>> {
    if segment.is_empty() {
        return Err(Error::MalformedEnvelope(format!("segment {} is empty", index)));
    }
    if segment.len() % 2 != 0 {
        return Err(Error::MalformedEnvelope(format!(
            "segment {} has odd hex length",
            index
        )));
    }
    hex::decode(segment)
        .map_err(|e| Error::MalformedEnvelope(format!("segment {}: {}", index, e)))
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Envelope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Envelope::decode(s)
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("salt", &hex::encode(&self.salt))
            .field("iv", &hex::encode(&self.iv))
            .field("auth_tag", &hex::encode(&self.auth_tag))
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}
