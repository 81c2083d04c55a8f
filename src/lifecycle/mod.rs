//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     close() or signal → broadcast trigger → accept loop stops
//!     → in-flight connections drain → mark_drained → close() resumes
//!     → rate limiters closed
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown (binary wrapper only)
//! ```
//!
//! # Design Decisions
//! - Shutdown is a two-phase handshake: stop broadcast out, drain report back
//! - Connections are drained, never aborted
//! - Signal handling lives in the binary, not the library core

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
