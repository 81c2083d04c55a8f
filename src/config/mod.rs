//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, read PEM material)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!     → consumed by Proxy::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - The runtime `Config` holds already-loaded PEM bytes; only the loader
//!   touches the filesystem
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ProxyConfig;

use std::collections::HashSet;
use std::time::Duration;

/// Top-level runtime configuration consumed by [`crate::proxy::Proxy::new`].
#[derive(Debug, Clone)]
pub struct Config {
    /// How the proxy listens and terminates TLS.
    pub listener: ListenerConfig,

    /// Where connections are proxied and who may open them.
    pub upstream: UpstreamConfig,

    /// Optional per-client rate limiting. `None` disables admission control.
    pub rate_limit: Option<RateLimitConfig>,
}

/// Listener configuration. PEM material arrives as already-loaded bytes;
/// reading certificate files is the loader's job, not the core's.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Bind address, for example `127.0.0.1:5000`. Port 0 asks the OS for a
    /// free port; the bound address is available via `Proxy::address`.
    pub listen_addr: String,

    /// PEM bundle of CA certificates used to verify client certificates.
    pub ca: Vec<u8>,

    /// PEM server certificate presented to clients.
    pub certificate: Vec<u8>,

    /// PEM private key matching `certificate`.
    pub private_key: Vec<u8>,
}

/// Upstream routing configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Label for the upstream set, used only in logs.
    pub name: String,

    /// Upstream `host:port` addresses to proxy connections to.
    pub targets: Vec<String>,

    /// Groups allowed to connect, matched against the `group` half of the
    /// client certificate Common Name.
    pub authorized_groups: HashSet<String>,
}

/// Template for per-client token buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum tokens a bucket can hold; connections admitted back-to-back.
    pub capacity: i64,

    /// One token is restored per elapsed interval, up to `capacity`.
    pub fill_interval: Duration,
}

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No listen address was provided.
    MissingListenAddr,
    /// The upstream target list is empty.
    NoTargets,
    /// A required PEM field is empty. Carries the field name.
    MissingPem(&'static str),
    /// Rate limiting was requested with a non-positive capacity or interval.
    InvalidRateLimit,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingListenAddr => write!(f, "config does not contain a listen address"),
            ConfigError::NoTargets => write!(f, "config does not contain any upstream targets"),
            ConfigError::MissingPem(field) => write!(f, "config does not contain PEM data for {}", field),
            ConfigError::InvalidRateLimit => {
                write!(f, "rate limit capacity and fill interval must be positive")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Confirm every required field is populated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listener.listen_addr.is_empty() {
            return Err(ConfigError::MissingListenAddr);
        }
        if self.upstream.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        if self.listener.ca.is_empty() {
            return Err(ConfigError::MissingPem("ca"));
        }
        if self.listener.certificate.is_empty() {
            return Err(ConfigError::MissingPem("certificate"));
        }
        if self.listener.private_key.is_empty() {
            return Err(ConfigError::MissingPem("private_key"));
        }
        if let Some(rate_limit) = &self.rate_limit {
            if rate_limit.capacity <= 0 || rate_limit.fill_interval.is_zero() {
                return Err(ConfigError::InvalidRateLimit);
            }
        }

        Ok(())
    }
}
