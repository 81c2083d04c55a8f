//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Library code emits tracing events + metrics
//!     → logging.rs (subscriber install, binary only)
//!     → metrics.rs (Prometheus exporter + recording helpers)
//! ```
//!
//! # Design Decisions
//! - The library only emits; sinks are installed by the binary
//! - Metrics are counters on connection outcomes and proxied bytes

pub mod logging;
pub mod metrics;
