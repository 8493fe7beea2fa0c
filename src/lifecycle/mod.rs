//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Start (supervisor.rs):
//!     Subscribe signals → Launch body → Running once ready
//!
//! Stop (signals.rs → shutdown.rs):
//!     SIGINT/SIGTERM → Keep-alive off → Stop accepting → Drain (≤ deadline)
//!
//! Failure:
//!     Body error (bind, TLS, serve, worker) → Failed, no drain
//! ```
//!
//! # Design Decisions
//! - One run per value: `start` consumes the server or worker
//! - Readiness is reported by the body, not guessed from elapsed time
//! - Shutdown has a deadline: forced close and `ShutdownTimeout` after it
//! - Signal subscriptions are scoped to the run; afterwards the platform
//!   default action applies again

pub mod error;
pub mod shutdown;
pub mod signals;
pub mod state;
pub(crate) mod supervisor;
pub mod worker;

pub use error::{BoxError, LifecycleError, Outcome};
pub use shutdown::Drain;
pub use signals::{Signal, SignalWatcher};
pub use state::{Monitor, State, Status};
pub use worker::{Worker, WorkerConfig};
