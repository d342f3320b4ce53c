//! Reserved scope prefix partitioning virtual requests from real ones

use super::SessionId;
use crate::error::{Error, Result};

/// Default reserved path segment
pub const DEFAULT_SCOPE_PREFIX: &str = "/portal-scope/";

/// A validated scope prefix of the form `/segment/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    prefix: String,
}

impl Scope {
    /// Parse a prefix, adding missing leading/trailing slashes
    pub fn new(prefix: &str) -> Result<Self> {
        let trimmed = prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(Error::InvalidConfig(
                "Scope prefix must name at least one path segment".to_string(),
            ));
        }
        if trimmed.contains(['?', '#', ' ', '"', '\'', '<', '>']) {
            return Err(Error::InvalidConfig(format!(
                "Scope prefix contains invalid characters: {}",
                prefix
            )));
        }

        Ok(Scope {
            prefix: format!("/{}/", trimmed),
        })
    }

    /// The prefix, always `/segment/`
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Path prefix a session's files are served from, `/segment/{token}/`
    pub fn session_prefix(&self, session: &SessionId) -> String {
        format!("{}{}/", self.prefix, session)
    }

    /// Check if a request path falls under this scope
    pub fn contains(&self, path: &str) -> bool {
        self.strip(path).is_some()
    }

    /// Strip the prefix, returning the scope-relative remainder
    ///
    /// The bare prefix without its trailing slash counts as the scope root.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        if let Some(rest) = path.strip_prefix(self.prefix.as_str()) {
            return Some(rest);
        }
        if path == self.prefix.trim_end_matches('/') {
            return Some("");
        }
        None
    }
}

impl Default for Scope {
    fn default() -> Self {
        Scope {
            prefix: DEFAULT_SCOPE_PREFIX.to_string(),
        }
    }
}
