//! Per-viewer session tokens
//!
//! Every successful load is installed under a fresh random token and served
//! from `{scope}{token}/`. Holding the token is what grants access to that
//! file table, so it is only ever handed to the viewer that supplied the
//! password.

use rand::RngCore;
use std::fmt;

/// Random bytes in a session token
pub const SESSION_TOKEN_BYTES: usize = 16;

/// Opaque session token, lowercase hex
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a new random token
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        SessionId(hex::encode(bytes))
    }

    /// Parse a token taken from a request path
    ///
    /// Anything other than exactly `2 * SESSION_TOKEN_BYTES` lowercase hex
    /// digits is rejected.
    pub fn parse(token: &str) -> Option<Self> {
        let valid = token.len() == SESSION_TOKEN_BYTES * 2
            && token
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| SessionId(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Only a short prefix, so tokens do not end up in logs
impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({}..)", &self.0[..8])
    }
}
