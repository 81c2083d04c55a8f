//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Connection authorized → balancer.checkout()
//!     → least_conn.rs (scan upstreams, pick fewest active, increment)
//!     → upstream.rs (UpstreamGuard tracks the checkout)
//!     → connection handler dials the address
//!     → guard dropped → release (decrement)
//! ```
//!
//! # Design Decisions
//! - Selection scan and checkout increment happen under one lock
//! - Checkouts are RAII guards; release survives panics and early returns
//! - An idle upstream (zero active connections) always wins the scan

pub mod least_conn;
pub mod upstream;

pub use least_conn::{EmptyTargets, LeastConnectionBalancer};
pub use upstream::{Upstream, UpstreamGuard};
