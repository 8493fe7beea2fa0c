//! Errors and outcomes reported by a lifecycle run.

use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinError;

use crate::lifecycle::signals::Signal;
use crate::net::tls::TlsConfigError;

/// Boxed error returned by worker bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The listener or worker body finished on its own.
    Completed,
    /// A termination signal arrived and the drain finished in time.
    Stopped(Signal),
}

/// Every way a run can fail.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The listener could not acquire its address.
    #[error("listen tcp {addr}: bind: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// In-flight work was still running when the shutdown deadline passed.
    #[error("graceful shutdown did not complete within {timeout:?}")]
    ShutdownTimeout { timeout: Duration },

    /// Certificate or key material could not be used.
    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] TlsConfigError),

    /// Termination signal handlers could not be registered.
    #[error("failed to install signal handlers: {0}")]
    SignalInstall(#[source] std::io::Error),

    /// The listener failed after it was bound.
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    /// The worker body returned an error.
    #[error("worker error: {0}")]
    Worker(#[source] BoxError),

    /// The caller's parent context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A background task panicked.
    #[error("lifecycle task panicked: {0}")]
    Panicked(#[from] JoinError),
}

impl LifecycleError {
    /// Caller-level cancellation, which callers usually treat as a clean stop.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LifecycleError::Cancelled)
    }

    /// The address was already bound by someone else.
    pub fn is_addr_in_use(&self) -> bool {
        matches!(
            self,
            LifecycleError::Bind { source, .. } if source.kind() == std::io::ErrorKind::AddrInUse
        )
    }
}
