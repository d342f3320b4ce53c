//! Messages exchanged between the page and the interceptor
//!
//! Every request carries its own reply channel; every reply is tagged so the
//! sender can check it got the acknowledgment it asked for.

use super::SessionId;
use crate::vfs::VirtualFileTable;
use bytes::Bytes;
use tokio::sync::oneshot;

/// Requests accepted by the interceptor task
#[derive(Debug)]
pub enum PortalMessage {
    /// Readiness probe sent while registering
    Ping { reply: oneshot::Sender<PortalReply> },
    /// Handoff: install a file table for a session, replacing any previous one
    LoadFiles {
        session: SessionId,
        files: VirtualFileTable,
        reply: oneshot::Sender<PortalReply>,
    },
    /// Resolve an intercepted request path
    Fetch {
        path: String,
        reply: oneshot::Sender<Interception>,
    },
}

/// Tagged acknowledgments sent back to the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalReply {
    /// Interceptor is active and controlling its scope
    Ready,
    /// File table received and installed
    FilesLoaded { count: usize },
}

/// Outcome of running a request through the interceptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// Outside the scope; handle normally
    Passthrough,
    /// Answered from the virtual scope
    Respond(VirtualResponse),
}

/// Response synthesized by the interceptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
}

impl VirtualResponse {
    /// 200 with stored content
    pub fn ok(body: Bytes, content_type: impl Into<String>) -> Self {
        VirtualResponse {
            status: 200,
            content_type: content_type.into(),
            body,
        }
    }

    /// 404 for a path not in the table
    pub fn not_found() -> Self {
        VirtualResponse {
            status: 404,
            content_type: "text/plain".to_string(),
            body: Bytes::from_static(b"Not found"),
        }
    }

    /// 500 while no file table is installed for the requested session
    pub fn not_initialized() -> Self {
        VirtualResponse {
            status: 500,
            content_type: "text/plain".to_string(),
            body: Bytes::from_static(b"Portal not yet initialized"),
        }
    }
}
