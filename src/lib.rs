//! portalcrypt - Encrypted project package delivery
//!
//! A project build is packed into a tar archive, sealed with a
//! password-derived AES-256-GCM key and published as a hex envelope. The
//! portal fetches the envelope, decrypts and unpacks it in memory, and hands
//! the resulting file table to an interceptor that serves it under a
//! reserved path scope. Nothing decrypted is ever written to disk.

pub mod archive;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod interceptor;
pub mod pipeline;
pub mod server;
pub mod source;
pub mod vfs;

pub use config::Config;
pub use envelope::Envelope;
pub use error::{Error, ErrorKind, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::envelope::Envelope;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::interceptor::{Interceptor, InterceptorHandle, Scope, SessionId};
    pub use crate::pipeline::{Pipeline, PipelineState, PortalSession};
    pub use crate::source::{EnvelopeSource, HttpSource, DirectorySource};
    pub use crate::vfs::VirtualFileTable;
}
