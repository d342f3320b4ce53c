//! Envelope sources
//!
//! The page fetches a project's envelope from `.../projects/{id}/data.pkg`
//! and treats it as an opaque string. Two backends are provided: an HTTP
//! origin and a local directory laid out the same way.

use crate::config::{SourceConfig, SourceKind};
use crate::error::{Error, Result};
use reqwest::StatusCode;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Package file name inside a project directory
pub const PACKAGE_FILE: &str = "data.pkg";

/// Anything that can produce the wire form of a project's envelope
pub trait EnvelopeSource: Send + Sync {
    /// Fetch the envelope for a project
    ///
    /// A project that does not exist yields `ProjectNotFound`; any other
    /// failure yields `FetchFailed`.
    fn fetch(&self, project_id: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Check a project id is safe to place in a path
///
/// Ids are restricted to ASCII letters, digits, `-` and `_` so a crafted id
/// cannot step outside the projects tree.
pub fn validate_project_id(project_id: &str) -> Result<()> {
    let valid = !project_id.is_empty()
        && project_id.len() <= 128
        && project_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(Error::ProjectNotFound(format!("invalid project id: {:?}", project_id)))
    }
}

/// Relative location of a project's package
pub fn package_path(project_id: &str) -> String {
    format!("projects/{}/{}", project_id, PACKAGE_FILE)
}

/// Fetch envelopes over HTTP(S)
pub struct HttpSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSource {
    /// Create a source rooted at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url_for(&self, project_id: &str) -> String {
        format!("{}/{}", self.base_url, package_path(project_id))
    }
}

impl EnvelopeSource for HttpSource {
    async fn fetch(&self, project_id: &str) -> Result<String> {
        validate_project_id(project_id)?;
        let url = self.url_for(project_id);
        debug!("Fetching envelope from {}", url);

        let response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(Error::ProjectNotFound(project_id.to_string())),
            status if status.is_success() => Ok(response.text().await?),
            status => Err(Error::FetchFailed(format!("{} returned {}", url, status))),
        }
    }
}

/// Read envelopes from a local directory tree
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Create a source rooted at `root`
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        DirectorySource { root: root.into() }
    }
}

impl EnvelopeSource for DirectorySource {
    async fn fetch(&self, project_id: &str) -> Result<String> {
        validate_project_id(project_id)?;
        let path = self.root.join(package_path(project_id));
        debug!("Reading envelope from {:?}", path);

        match tokio::fs::read_to_string(&path).await {
            Ok(wire) => Ok(wire),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::ProjectNotFound(project_id.to_string()))
            }
            Err(e) => Err(Error::FetchFailed(format!("{:?}: {}", path, e))),
        }
    }
}

/// Source selected by configuration
pub enum ConfiguredSource {
    Http(HttpSource),
    Directory(DirectorySource),
}

impl ConfiguredSource {
    /// Build the source described by the config
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        match config.kind {
            SourceKind::Http => Ok(ConfiguredSource::Http(HttpSource::new(
                &config.location,
                Duration::from_secs(config.timeout_secs),
            )?)),
            SourceKind::Directory => Ok(ConfiguredSource::Directory(DirectorySource::new(
                &config.location,
            ))),
        }
    }
}

impl EnvelopeSource for ConfiguredSource {
    async fn fetch(&self, project_id: &str) -> Result<String> {
        match self {
            ConfiguredSource::Http(source) => source.fetch(project_id).await,
            ConfiguredSource::Directory(source) => source.fetch(project_id).await,
        }
    }
}
