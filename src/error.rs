//! Error types for portalcrypt

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for portalcrypt
#[derive(Error, Debug)]
pub enum Error {
    // Platform / entry errors
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Insecure transport: {0}")]
    InsecureTransport(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    // Fetch errors
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    // Crypto errors
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    // Archive errors
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    // Interceptor errors
    #[error("Handoff failed: {0}")]
    HandoffFailed(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure classes surfaced to the person viewing a project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedPlatform,
    InsecureTransport,
    MissingCredentials,
    ProjectNotFound,
    FetchFailed,
    /// Wrong password, tampered data and bad framing all land here
    Decryption,
    /// Archive could not be unpacked
    Processing,
    HandoffFailed,
    Internal,
}

impl ErrorKind {
    /// Short, non-technical message for the host page.
    ///
    /// Decryption and processing failures deliberately share one message per
    /// class so a viewer cannot tell a wrong password from damaged data.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedPlatform => "This viewer is not supported on this platform.",
            ErrorKind::InsecureTransport => "A secure connection is required to open this project.",
            ErrorKind::MissingCredentials => "The project link is incomplete.",
            ErrorKind::ProjectNotFound => "Project not found.",
            ErrorKind::FetchFailed => "The project could not be downloaded. Reload to try again.",
            ErrorKind::Decryption => "Decryption failed.",
            ErrorKind::Processing => "Processing failed.",
            ErrorKind::HandoffFailed => "The viewer could not be started. Reload the page.",
            ErrorKind::Internal => "An unexpected error occurred.",
        }
    }

    /// HTTP status used when rendering the error page
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::UnsupportedPlatform => 501,
            ErrorKind::InsecureTransport => 403,
            ErrorKind::MissingCredentials => 400,
            ErrorKind::ProjectNotFound => 404,
            ErrorKind::FetchFailed => 502,
            ErrorKind::Decryption => 403,
            ErrorKind::Processing => 422,
            ErrorKind::HandoffFailed => 503,
            ErrorKind::Internal => 500,
        }
    }
}

impl Error {
    /// Classify into the user-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedPlatform(_) => ErrorKind::UnsupportedPlatform,
            Error::InsecureTransport(_) => ErrorKind::InsecureTransport,
            Error::MissingCredentials(_) => ErrorKind::MissingCredentials,
            Error::ProjectNotFound(_) => ErrorKind::ProjectNotFound,
            Error::FetchFailed(_) => ErrorKind::FetchFailed,
            Error::MalformedEnvelope(_) | Error::AuthenticationFailed | Error::KeyDerivation(_) => {
                ErrorKind::Decryption
            }
            Error::CorruptArchive(_) => ErrorKind::Processing,
            Error::HandoffFailed(_) => ErrorKind::HandoffFailed,
            _ => ErrorKind::Internal,
        }
    }

    /// User-safe message for this error
    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::FetchFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decryption_class_is_undifferentiated() {
        let wrong_password = Error::AuthenticationFailed;
        let bad_framing = Error::MalformedEnvelope("odd hex length".to_string());

        assert_eq!(wrong_password.kind(), ErrorKind::Decryption);
        assert_eq!(wrong_password.user_message(), bad_framing.user_message());
        assert_eq!(wrong_password.status_code(), bad_framing.status_code());
    }

    #[test]
    fn test_user_message_hides_detail() {
        let err = Error::CorruptArchive("header checksum mismatch at offset 512".to_string());
        assert_eq!(err.user_message(), "Processing failed.");
        assert!(!err.user_message().contains("checksum"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::ProjectNotFound("x".into()).status_code(), 404);
        assert_eq!(Error::MissingCredentials("id".into()).status_code(), 400);
        assert_eq!(Error::Io(io::Error::other("disk")).status_code(), 500);
    }
}
