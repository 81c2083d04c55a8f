//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Handshake complete:
//!     → access_control.rs (extract user@group identity, check group)
//!     → rate_limit.rs (per-user token bucket admission)
//!     → Pass to upstream checkout
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any malformed client identity
//! - Rate limiting keys on the user half of the identity
//! - Rejected connections never consume an upstream slot

pub mod access_control;
pub mod rate_limit;

pub use access_control::{authorize_peer, ClientIdentity};
pub use rate_limit::{RateLimitError, RateLimitRegistry, TokenBucket};
