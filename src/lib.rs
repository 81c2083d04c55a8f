//! Mutually-authenticated TCP reverse proxy library.
//!
//! Clients connect over TLS 1.3 and present a certificate whose Common Name
//! carries a `user@group` identity. Authorized connections are forwarded to
//! the least-loaded upstream, optionally gated by a per-user token bucket,
//! and bytes are pumped in both directions until either side closes.

pub mod config;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod security;

pub use config::Config;
pub use lifecycle::Shutdown;
pub use proxy::{Proxy, ProxyError};
