//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, synchronous TLS handshake)
//!     → connection.rs (authorize, rate-limit, dial upstream, pump bytes)
//!     → teardown (both endpoints closed, upstream released)
//! ```
//!
//! tls.rs builds the rustls configuration the listener terminates with:
//! TLS 1.3, mutual authentication against the configured CA bundle.

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionHandler, DIAL_TIMEOUT};
pub use listener::{AuthenticatedConn, ListenerError, TlsListener};
