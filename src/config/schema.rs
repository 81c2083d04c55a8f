//! Configuration schema definitions.
//!
//! This module defines the on-disk configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy, as read from a TOML file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS material paths).
    pub listener: ListenerSection,

    /// Upstream targets and client authorization.
    pub upstream: UpstreamSection,

    /// Optional per-client rate limiting. Absent means disabled.
    pub rate_limit: Option<RateLimitSection>,

    /// Observability settings.
    pub observability: ObservabilitySection,
}

/// Listener section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerSection {
    /// Bind address (e.g., "127.0.0.1:5000").
    pub listen_addr: String,

    /// Path to the PEM CA bundle used to verify client certificates.
    pub ca_file: String,

    /// Path to the PEM server certificate.
    pub cert_file: String,

    /// Path to the PEM server private key.
    pub key_file: String,
}

impl Default for ListenerSection {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:5000".to_string(),
            ca_file: String::new(),
            cert_file: String::new(),
            key_file: String::new(),
        }
    }
}

/// Upstream section.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UpstreamSection {
    /// Label for the upstream set, used only in logs.
    pub name: String,

    /// Upstream addresses (e.g., "localhost:9000") to proxy connections to.
    pub targets: Vec<String>,

    /// Groups allowed to connect, matched against the `group` half of the
    /// client certificate Common Name.
    pub authorized_groups: Vec<String>,
}

/// Rate limiting section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitSection {
    /// Maximum tokens per client bucket.
    pub capacity: i64,

    /// Milliseconds between token refills.
    pub fill_interval_ms: u64,
}

/// Observability section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilitySection {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilitySection {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
