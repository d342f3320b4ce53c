//! Request interception layer
//!
//! The interceptor is a background task with its own lifecycle. It starts
//! with no data, claims its scope once registered, and answers every
//! request under the scope from the file table of the session named in the
//! path (`{scope}{token}/{file}`). It can outlive any single page load; each
//! load hands off its table under a fresh session token.
//!
//! Tables are owned by the task alone, so no locking is needed. At most
//! `MAX_SESSIONS` tables are kept; the oldest is dropped first.

mod protocol;
mod scope;
mod session;

pub use protocol::{Interception, PortalMessage, PortalReply, VirtualResponse};
pub use scope::{Scope, DEFAULT_SCOPE_PREFIX};
pub use session::{SessionId, SESSION_TOKEN_BYTES};

use crate::error::{Error, Result};
use crate::vfs::{normalize_path, VirtualFileTable};
use percent_encoding::percent_decode_str;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Bound on queued messages before senders wait
const CHANNEL_CAPACITY: usize = 64;

/// Live session tables kept before the oldest is evicted
pub const MAX_SESSIONS: usize = 64;

/// Background interceptor state
pub struct Interceptor {
    scope: Scope,
    sessions: HashMap<SessionId, VirtualFileTable>,
    /// Install order, oldest first
    order: VecDeque<SessionId>,
    rx: mpsc::Receiver<PortalMessage>,
}

impl Interceptor {
    /// Spawn the interceptor on the current tokio runtime
    pub fn spawn(scope: Scope) -> (InterceptorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let interceptor = Interceptor {
            scope: scope.clone(),
            sessions: HashMap::new(),
            order: VecDeque::new(),
            rx,
        };
        let task = tokio::spawn(interceptor.run());
        (InterceptorHandle { tx, scope }, task)
    }

    async fn run(mut self) {
        info!("Interceptor started for scope {}", self.scope.prefix());
        while let Some(message) = self.rx.recv().await {
            self.handle(message);
        }
        info!("Interceptor stopped");
    }

    fn handle(&mut self, message: PortalMessage) {
        match message {
            PortalMessage::Ping { reply } => {
                let _ = reply.send(PortalReply::Ready);
            }
            PortalMessage::LoadFiles {
                session,
                files,
                reply,
            } => {
                let count = files.len();
                self.install(session, files);
                info!(
                    "Installed file table: {} files ({} sessions live)",
                    count,
                    self.sessions.len()
                );
                let _ = reply.send(PortalReply::FilesLoaded { count });
            }
            PortalMessage::Fetch { path, reply } => {
                let _ = reply.send(self.resolve(&path));
            }
        }
    }

    fn install(&mut self, session: SessionId, files: VirtualFileTable) {
        if self.sessions.insert(session.clone(), files).is_some() {
            debug!("Replacing file table for {:?}", session);
            self.order.retain(|s| s != &session);
        }
        self.order.push_back(session);

        while self.order.len() > MAX_SESSIONS {
            if let Some(evicted) = self.order.pop_front() {
                self.sessions.remove(&evicted);
                debug!("Evicted session {:?}", evicted);
            }
        }
    }

    fn resolve(&self, path: &str) -> Interception {
        let Some(relative) = self.scope.strip(path) else {
            return Interception::Passthrough;
        };

        let (token, rest) = relative.split_once('/').unwrap_or((relative, ""));
        let Some(table) = SessionId::parse(token).and_then(|id| self.sessions.get(&id)) else {
            debug!("Request outside any live session");
            return Interception::Respond(VirtualResponse::not_initialized());
        };

        let decoded = percent_decode_str(rest).decode_utf8_lossy();
        let key = normalize_path(&decoded);
        match table.get(&key) {
            Some(file) => Interception::Respond(VirtualResponse::ok(
                file.bytes.clone(),
                file.mime_type.clone(),
            )),
            None => {
                debug!("Not in package: {}", key);
                Interception::Respond(VirtualResponse::not_found())
            }
        }
    }
}

/// Cloneable sender side used by pages and the HTTP front
#[derive(Clone)]
pub struct InterceptorHandle {
    tx: mpsc::Sender<PortalMessage>,
    scope: Scope,
}

impl InterceptorHandle {
    /// Scope this interceptor controls
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Check whether the task is still running
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Wait until the interceptor is active
    pub async fn register(&self, timeout: Duration) -> Result<()> {
        let (reply, ack) = oneshot::channel();
        match self.exchange(PortalMessage::Ping { reply }, ack, timeout).await? {
            PortalReply::Ready => Ok(()),
            other => Err(Error::HandoffFailed(format!(
                "unexpected reply to registration: {:?}",
                other
            ))),
        }
    }

    /// Hand a session's file table to the interceptor and wait for its acknowledgment
    ///
    /// Returns the number of files the interceptor reports installed.
    pub async fn handoff(
        &self,
        session: SessionId,
        files: VirtualFileTable,
        timeout: Duration,
    ) -> Result<usize> {
        let expected = files.len();
        let (reply, ack) = oneshot::channel();
        let message = PortalMessage::LoadFiles {
            session,
            files,
            reply,
        };

        match self.exchange(message, ack, timeout).await? {
            PortalReply::FilesLoaded { count } if count == expected => Ok(count),
            other => Err(Error::HandoffFailed(format!(
                "unexpected handoff acknowledgment: {:?}",
                other
            ))),
        }
    }

    /// Run a request path through the interceptor
    ///
    /// Out-of-scope paths pass through without touching the task. If the
    /// task is gone, in-scope paths still get the uninitialized response
    /// rather than falling through to the real origin.
    pub async fn intercept(&self, path: &str) -> Interception {
        if !self.scope.contains(path) {
            return Interception::Passthrough;
        }

        let (reply, response) = oneshot::channel();
        let message = PortalMessage::Fetch {
            path: path.to_string(),
            reply,
        };
        if self.tx.send(message).await.is_err() {
            warn!("Interceptor not running, refusing {}", path);
            return Interception::Respond(VirtualResponse::not_initialized());
        }

        response
            .await
            .unwrap_or_else(|_| Interception::Respond(VirtualResponse::not_initialized()))
    }

    async fn exchange(
        &self,
        message: PortalMessage,
        ack: oneshot::Receiver<PortalReply>,
        timeout: Duration,
    ) -> Result<PortalReply> {
        let round_trip = async {
            self.tx
                .send(message)
                .await
                .map_err(|_| Error::HandoffFailed("interceptor is not running".to_string()))?;
            ack.await
                .map_err(|_| Error::HandoffFailed("interceptor dropped the request".to_string()))
        };

        tokio::time::timeout(timeout, round_trip)
            .await
            .map_err(|_| Error::HandoffFailed(format!("no acknowledgment within {:?}", timeout)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveEntry;
    use bytes::Bytes;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn table(files: &[(&str, &str)]) -> VirtualFileTable {
        VirtualFileTable::from_entries(files.iter().map(|(path, body)| ArchiveEntry {
            path: path.to_string(),
            bytes: body.as_bytes().to_vec(),
            is_directory: false,
        }))
    }

    fn status(interception: Interception) -> u16 {
        match interception {
            Interception::Respond(response) => response.status,
            Interception::Passthrough => panic!("expected a virtual response"),
        }
    }

    fn body(interception: Interception) -> Bytes {
        match interception {
            Interception::Respond(response) => response.body,
            Interception::Passthrough => panic!("expected a virtual response"),
        }
    }

    async fn load(handle: &InterceptorHandle, files: &[(&str, &str)]) -> String {
        let session = SessionId::generate();
        let prefix = handle.scope().session_prefix(&session);
        handle.handoff(session, table(files), TIMEOUT).await.unwrap();
        prefix
    }

    #[tokio::test]
    async fn test_uninitialized_before_handoff() {
        let (handle, _task) = Interceptor::spawn(Scope::default());
        handle.register(TIMEOUT).await.unwrap();

        assert_eq!(status(handle.intercept("/portal-scope/").await), 500);
        assert_eq!(status(handle.intercept("/portal-scope/missing.css").await), 500);
    }

    #[tokio::test]
    async fn test_out_of_scope_passthrough() {
        let (handle, _task) = Interceptor::spawn(Scope::default());
        load(&handle, &[("index.html", "x")]).await;

        assert_eq!(handle.intercept("/open").await, Interception::Passthrough);
        assert_eq!(handle.intercept("/index.html").await, Interception::Passthrough);
        assert_eq!(handle.intercept("/portal-scoped/index.html").await, Interception::Passthrough);
    }

    #[tokio::test]
    async fn test_serves_after_handoff() {
        let (handle, _task) = Interceptor::spawn(Scope::default());
        let session = SessionId::generate();
        let prefix = handle.scope().session_prefix(&session);
        let count = handle
            .handoff(
                session,
                table(&[("index.html", "<html></html>"), ("style.css", "p{}")]),
                TIMEOUT,
            )
            .await
            .unwrap();
        assert_eq!(count, 2);

        match handle.intercept(&prefix).await {
            Interception::Respond(response) => {
                assert_eq!(response.status, 200);
                assert_eq!(response.content_type, "text/html");
                assert_eq!(response.body, Bytes::from_static(b"<html></html>"));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(status(handle.intercept(&format!("{}style.css", prefix)).await), 200);
        assert_eq!(status(handle.intercept(prefix.trim_end_matches('/')).await), 200);
        assert_eq!(status(handle.intercept(&format!("{}nope.js", prefix)).await), 404);
    }

    #[tokio::test]
    async fn test_scope_root_has_no_session() {
        let (handle, _task) = Interceptor::spawn(Scope::default());
        load(&handle, &[("index.html", "secret")]).await;

        assert_eq!(status(handle.intercept("/portal-scope/").await), 500);
        assert_eq!(status(handle.intercept("/portal-scope/index.html").await), 500);

        let guessed = format!("/portal-scope/{}/index.html", SessionId::generate());
        assert_eq!(status(handle.intercept(&guessed).await), 500);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let (handle, _task) = Interceptor::spawn(Scope::default());
        let first = load(&handle, &[("index.html", "first")]).await;
        let second = load(&handle, &[("index.html", "second")]).await;

        assert_ne!(first, second);
        assert_eq!(body(handle.intercept(&first).await), Bytes::from_static(b"first"));
        assert_eq!(body(handle.intercept(&second).await), Bytes::from_static(b"second"));
    }

    #[tokio::test]
    async fn test_rehandoff_same_session_last_writer_wins() {
        let (handle, _task) = Interceptor::spawn(Scope::default());
        let session = SessionId::generate();
        let prefix = handle.scope().session_prefix(&session);

        handle
            .handoff(session.clone(), table(&[("index.html", "first")]), TIMEOUT)
            .await
            .unwrap();
        handle
            .handoff(session, table(&[("index.html", "second")]), TIMEOUT)
            .await
            .unwrap();

        let path = format!("{}index.html", prefix);
        assert_eq!(body(handle.intercept(&path).await), Bytes::from_static(b"second"));
    }

    #[tokio::test]
    async fn test_percent_encoded_names() {
        let (handle, _task) = Interceptor::spawn(Scope::default());
        let prefix = load(
            &handle,
            &[("my file.html", "spaced"), ("café/menu.css", "accented")],
        )
        .await;

        let spaced = format!("{}my%20file.html", prefix);
        assert_eq!(body(handle.intercept(&spaced).await), Bytes::from_static(b"spaced"));

        let accented = format!("{}caf%C3%A9/menu.css", prefix);
        assert_eq!(body(handle.intercept(&accented).await), Bytes::from_static(b"accented"));
    }

    #[tokio::test]
    async fn test_oldest_session_evicted() {
        let (handle, _task) = Interceptor::spawn(Scope::default());
        let oldest = load(&handle, &[("index.html", "0")]).await;
        for _ in 0..MAX_SESSIONS {
            load(&handle, &[("index.html", "n")]).await;
        }

        assert_eq!(status(handle.intercept(&oldest).await), 500);
    }

    #[tokio::test]
    async fn test_handoff_times_out_without_ack() {
        // A receiver that is held but never drained models an unresponsive interceptor
        let (tx, _rx) = mpsc::channel(1);
        let handle = InterceptorHandle {
            tx,
            scope: Scope::default(),
        };

        let result = handle
            .handoff(
                SessionId::generate(),
                table(&[("index.html", "x")]),
                Duration::from_millis(50),
            )
            .await;
        assert!(matches!(result, Err(Error::HandoffFailed(_))));
    }

    #[tokio::test]
    async fn test_stopped_interceptor() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = InterceptorHandle {
            tx,
            scope: Scope::default(),
        };

        assert!(!handle.is_alive());
        assert!(matches!(
            handle.register(TIMEOUT).await,
            Err(Error::HandoffFailed(_))
        ));
        assert_eq!(status(handle.intercept("/portal-scope/index.html").await), 500);
        assert_eq!(handle.intercept("/healthz").await, Interception::Passthrough);
    }
}
