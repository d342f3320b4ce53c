//! Package load pipeline
//!
//! Drives one page load from capability checks to a served file table:
//!
//! ```text
//! Checking -> RegisteringInterceptor -> Loading -> Decrypting
//!          -> Unpacking -> Handoff -> Success
//! ```
//!
//! Any step can divert to `Error`; the capability and transport checks
//! divert to `Unsupported` or `Insecure` instead. Terminal states are final.
//! The viewport may only be pointed at the scope once `Success` is reached.
//!
//! Each run installs its table under a fresh session token, so concurrent
//! viewers of the same interceptor never see each other's files.

use crate::archive::unpack;
use crate::config::HandoffConfig;
use crate::crypto::{open_package, self_test};
use crate::envelope::Envelope;
use crate::error::{Error, ErrorKind, Result};
use crate::interceptor::{InterceptorHandle, SessionId};
use crate::source::EnvelopeSource;
use crate::vfs::VirtualFileTable;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Query parameter carrying the project id
pub const PROJECT_PARAM: &str = "id";

/// Query parameter carrying the password
pub const PASSWORD_PARAM: &str = "password";

/// Observable pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineState {
    Checking,
    Unsupported,
    Insecure,
    RegisteringInterceptor,
    Loading,
    Decrypting,
    Unpacking,
    Handoff,
    Success,
    Error,
}

impl PipelineState {
    /// Check if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Unsupported
                | PipelineState::Insecure
                | PipelineState::Success
                | PipelineState::Error
        )
    }

    fn step(&self) -> u8 {
        match self {
            PipelineState::Checking => 0,
            PipelineState::RegisteringInterceptor => 1,
            PipelineState::Loading => 2,
            PipelineState::Decrypting => 3,
            PipelineState::Unpacking => 4,
            PipelineState::Handoff => 5,
            PipelineState::Success
            | PipelineState::Error
            | PipelineState::Unsupported
            | PipelineState::Insecure => 6,
        }
    }

    /// Check if moving to `next` keeps the machine moving forward
    pub fn can_advance_to(&self, next: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            PipelineState::Unsupported | PipelineState::Insecure => {
                *self == PipelineState::Checking
            }
            PipelineState::Error => true,
            _ => next.step() > self.step(),
        }
    }

    /// Terminal state a failure of this kind lands in
    pub fn for_failure(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::UnsupportedPlatform => PipelineState::Unsupported,
            ErrorKind::InsecureTransport => PipelineState::Insecure,
            _ => PipelineState::Error,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Checking => "checking",
            PipelineState::Unsupported => "unsupported",
            PipelineState::Insecure => "insecure",
            PipelineState::RegisteringInterceptor => "registering-interceptor",
            PipelineState::Loading => "loading",
            PipelineState::Decrypting => "decrypting",
            PipelineState::Unpacking => "unpacking",
            PipelineState::Handoff => "handoff",
            PipelineState::Success => "success",
            PipelineState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Project id and password taken from the page URL
#[derive(Clone)]
pub struct Credentials {
    pub project_id: String,
    pub password: Zeroizing<String>,
}

impl Credentials {
    /// Extract credentials from the page URL query
    ///
    /// Both parameters must be present and non-empty.
    pub fn from_url(url: &Url) -> Result<Self> {
        let mut project_id = None;
        let mut password = None;

        for (name, value) in url.query_pairs() {
            match &*name {
                PROJECT_PARAM if !value.is_empty() => project_id = Some(value.into_owned()),
                PASSWORD_PARAM if !value.is_empty() => {
                    password = Some(Zeroizing::new(value.into_owned()))
                }
                _ => {}
            }
        }

        match (project_id, password) {
            (Some(project_id), Some(password)) => Ok(Credentials { project_id, password }),
            (None, _) => Err(Error::MissingCredentials(format!(
                "query parameter '{}' missing",
                PROJECT_PARAM
            ))),
            (_, None) => Err(Error::MissingCredentials(format!(
                "query parameter '{}' missing",
                PASSWORD_PARAM
            ))),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("project_id", &self.project_id)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Platform capabilities the pipeline depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Authenticated encryption primitive works
    pub aead: bool,
    /// A runtime exists to host the interceptor task
    pub background_tasks: bool,
}

impl Capabilities {
    /// Probe the current process
    pub fn probe() -> Self {
        Capabilities {
            aead: self_test(),
            background_tasks: tokio::runtime::Handle::try_current().is_ok(),
        }
    }

    /// First missing capability, if any
    pub fn missing(&self) -> Option<&'static str> {
        if !self.aead {
            Some("authenticated encryption")
        } else if !self.background_tasks {
            Some("background request interception")
        } else {
            None
        }
    }
}

/// Check the page was loaded over a secure transport
///
/// HTTPS always qualifies; plain HTTP only for a loopback host.
pub fn is_secure_transport(url: &Url) -> bool {
    if url.scheme() == "https" {
        return true;
    }
    if url.scheme() != "http" {
        return false;
    }

    match url.host_str() {
        Some(host) if host.eq_ignore_ascii_case("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false),
        None => false,
    }
}

/// Result of a successful load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortalSession {
    pub project_id: String,
    /// Where the viewport should be pointed
    pub entry_path: String,
    pub file_count: usize,
}

/// One page load
pub struct Pipeline<S: EnvelopeSource> {
    source: Arc<S>,
    interceptor: InterceptorHandle,
    handoff: HandoffConfig,
    capabilities: Option<Capabilities>,
    state: watch::Sender<PipelineState>,
}

impl<S: EnvelopeSource> Pipeline<S> {
    /// Create a pipeline in the `Checking` state
    pub fn new(source: Arc<S>, interceptor: InterceptorHandle, handoff: HandoffConfig) -> Self {
        let (state, _) = watch::channel(PipelineState::Checking);
        Pipeline {
            source,
            interceptor,
            handoff,
            capabilities: None,
            state,
        }
    }

    /// Use fixed capabilities instead of probing
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Load the project named by `page_url` and hand its files to the interceptor
    pub async fn run(self, page_url: &str) -> Result<PortalSession> {
        match self.execute(page_url).await {
            Ok(session) => {
                self.advance(PipelineState::Success);
                info!(
                    "Project {} ready: {} files at {}",
                    session.project_id, session.file_count, session.entry_path
                );
                Ok(session)
            }
            Err(e) => {
                let failed_at = self.state();
                self.advance(PipelineState::for_failure(e.kind()));
                warn!("Load failed during {}: {}", failed_at, e);
                Err(e)
            }
        }
    }

    async fn execute(&self, page_url: &str) -> Result<PortalSession> {
        let capabilities = self.capabilities.unwrap_or_else(Capabilities::probe);
        if let Some(missing) = capabilities.missing() {
            return Err(Error::UnsupportedPlatform(format!("{} unavailable", missing)));
        }

        let url = Url::parse(page_url)
            .map_err(|e| Error::MissingCredentials(format!("unparseable page URL: {}", e)))?;
        if !is_secure_transport(&url) {
            return Err(Error::InsecureTransport(format!(
                "page served over {} from {}",
                url.scheme(),
                url.host_str().unwrap_or("unknown host")
            )));
        }

        let credentials = Credentials::from_url(&url)?;
        debug!("Opening project {}", credentials.project_id);

        self.advance(PipelineState::RegisteringInterceptor);
        self.interceptor.register(self.handoff.ready_timeout()).await?;

        self.advance(PipelineState::Loading);
        let wire = self.source.fetch(&credentials.project_id).await?;
        debug!("Fetched envelope: {} bytes", wire.len());

        self.advance(PipelineState::Decrypting);
        let password = credentials.password.clone();
        let plaintext = tokio::task::spawn_blocking(move || {
            let envelope = Envelope::decode(&wire)?;
            open_package(&password, &envelope).map(Zeroizing::new)
        })
        .await
        .map_err(|e| Error::Internal(format!("decrypt task failed: {}", e)))??;

        self.advance(PipelineState::Unpacking);
        let session = SessionId::generate();
        let prefix = self.interceptor.scope().session_prefix(&session);
        let base = prefix.clone();
        let table = tokio::task::spawn_blocking(move || {
            unpack(&plaintext, &base).map(VirtualFileTable::from_entries)
        })
        .await
        .map_err(|e| Error::Internal(format!("unpack task failed: {}", e)))??;
        debug!(
            "Unpacked {} files ({} bytes)",
            table.len(),
            table.total_bytes()
        );

        self.advance(PipelineState::Handoff);
        let file_count = self
            .interceptor
            .handoff(session, table, self.handoff.ack_timeout())
            .await?;

        Ok(PortalSession {
            project_id: credentials.project_id,
            entry_path: prefix,
            file_count,
        })
    }

    fn advance(&self, next: PipelineState) {
        self.state.send_if_modified(|current| {
            if current.can_advance_to(next) {
                debug!("Pipeline {} -> {}", current, next);
                *current = next;
                true
            } else {
                false
            }
        });
    }
}
