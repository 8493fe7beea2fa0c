//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (axum-server, HTTP/1.1 + HTTP/2, header read timeout)
//!     → middleware/request_logger.rs (access log, request metrics)
//!     → middleware/keep_alive.rs (Connection: close while draining)
//!     → write timeout (408) → caller's router
//! ```

pub mod middleware;
pub mod server;

pub use server::Server;
