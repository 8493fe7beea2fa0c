//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured host:port
//!     → listener.rs (bind, resolve port 0, map bind errors)
//!     → idle.rs (per-connection idle deadline, held while requests run)
//!     → tls.rs (optional TLS 1.3 handshake)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Binding happens inside the run, so bind failures surface as run errors
//! - TLS is optional and handled transparently
//! - The TLS policy is fixed: TLS 1.3 only, AES-GCM suites, P-256

pub mod idle;
pub mod listener;
pub mod tls;

pub use idle::{ConnectionId, IdleAcceptor, IdleService, IdleStream};
pub use listener::Listener;
