//! Lifecycle management for long-running network processes.
//!
//! Hosts an HTTP router (or a headless worker body) from startup through a
//! signal-triggered, deadline-bounded graceful shutdown, and reports exactly
//! one outcome per run.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::{ConfigBuilder, Options, ServerConfig, TlsPolicy};
pub use http::Server;
pub use lifecycle::{LifecycleError, Monitor, Outcome, Signal, State, Worker, WorkerConfig};
