//! Configuration management for portalcrypt

use crate::error::{Error, Result};
use crate::interceptor::{Scope, DEFAULT_SCOPE_PREFIX};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default listen address for the portal server
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8480";

/// Default wait for the interceptor to become ready (ms)
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 10_000;

/// Default wait for the handoff acknowledgment (ms)
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 10_000;

/// Default envelope fetch timeout (seconds)
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Portal server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Virtual scope configuration
    #[serde(default)]
    pub scope: ScopeConfig,

    /// Where envelopes are fetched from
    #[serde(default)]
    pub source: SourceConfig,

    /// Page/interceptor handoff timing
    #[serde(default)]
    pub handoff: HandoffConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Portal server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind
    pub listen: String,

    /// Honor `X-Forwarded-Proto` from a TLS-terminating proxy
    pub trust_forwarded_proto: bool,
}

/// Virtual scope configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Reserved path prefix, e.g. `/portal-scope/`
    pub prefix: String,
}

/// Envelope source backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Fetch `{location}/projects/{id}/data.pkg` over HTTP(S)
    Http,

    /// Read `{location}/projects/{id}/data.pkg` from disk
    Directory,
}

/// Envelope source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Backend kind
    pub kind: SourceKind,

    /// Base URL or root directory
    pub location: String,

    /// Request timeout in seconds (HTTP only)
    pub timeout_secs: u64,
}

/// Handoff timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    /// How long to wait for the interceptor to become ready
    pub ready_timeout_ms: u64,

    /// How long to wait for the file table acknowledgment
    pub ack_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: DEFAULT_LISTEN.to_string(),
            trust_forwarded_proto: false,
        }
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        ScopeConfig {
            prefix: DEFAULT_SCOPE_PREFIX.to_string(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        let location = dirs::data_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join("portalcrypt");

        SourceConfig {
            kind: SourceKind::Directory,
            location: location.to_string_lossy().into_owned(),
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

impl Default for HandoffConfig {
    fn default() -> Self {
        HandoffConfig {
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl HandoffConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("Failed to read config file: {}", e))
        })?;

        let mut config: Config = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file: {}", e))
        })?;

        // Override with environment variables if set
        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults and env
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Self::from_env()
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(listen) = std::env::var("PORTALCRYPT_LISTEN") {
            let listen = listen.trim().to_string();
            if !listen.is_empty() {
                self.server.listen = listen;
            }
        }

        // A URL selects the HTTP backend, anything else is a directory
        if let Ok(source) = std::env::var("PORTALCRYPT_SOURCE") {
            let source = source.trim().to_string();
            if !source.is_empty() {
                self.source.kind = if source.starts_with("http://") || source.starts_with("https://") {
                    SourceKind::Http
                } else {
                    SourceKind::Directory
                };
                self.source.location = source;
            }
        }

        if let Ok(prefix) = std::env::var("PORTALCRYPT_SCOPE_PREFIX") {
            let prefix = prefix.trim().to_string();
            if !prefix.is_empty() {
                self.scope.prefix = prefix;
            }
        }

        if let Ok(timeout) = std::env::var("PORTALCRYPT_ACK_TIMEOUT_MS") {
            if let Ok(ms) = timeout.trim().parse::<u64>() {
                self.handoff.ack_timeout_ms = ms;
            }
        }
    }

    /// Create a new config from defaults plus environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            Error::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path.as_ref(), content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(Error::InvalidConfig(format!(
                "Listen address is not a socket address: {}",
                self.server.listen
            )));
        }

        Scope::new(&self.scope.prefix)?;

        if self.source.location.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "Source location is required".to_string(),
            ));
        }

        if self.source.kind == SourceKind::Http
            && !(self.source.location.starts_with("http://")
                || self.source.location.starts_with("https://"))
        {
            return Err(Error::InvalidConfig(format!(
                "HTTP source location must be an http(s) URL: {}",
                self.source.location
            )));
        }

        if self.source.timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "Fetch timeout must be greater than 0".to_string(),
            ));
        }

        if self.handoff.ready_timeout_ms == 0 || self.handoff.ack_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "Handoff timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Parsed scope
    pub fn scope(&self) -> Result<Scope> {
        Scope::new(&self.scope.prefix)
    }
}
