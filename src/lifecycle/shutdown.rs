//! Shutdown coordination.
//!
//! # Sequence
//! ```text
//! keep-alive off → stop accepting → wait for in-flight work (≤ deadline)
//!     drained in time   → Ok(())
//!     deadline elapsed  → force close, abort task → ShutdownTimeout
//!     task failed       → that error
//! ```

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::lifecycle::error::LifecycleError;

/// Control surface of a running listener or worker.
///
/// Only the lifecycle core calls these, and never concurrently.
pub trait Drain: Send + Sync + 'static {
    /// Disable keep-alive and stop taking new work. In-flight work continues.
    fn begin(&self);

    /// Terminate whatever is still in flight.
    fn force(&self);
}

/// Drain `task` through `control`, bounded by `now + timeout`.
pub async fn drain<C: Drain>(
    control: &C,
    task: &mut JoinHandle<Result<(), LifecycleError>>,
    timeout: Duration,
) -> Result<(), LifecycleError> {
    let deadline = Instant::now() + timeout;
    control.begin();

    match tokio::time::timeout_at(deadline, &mut *task).await {
        Ok(joined) => joined?,
        Err(_) => {
            tracing::warn!(timeout = ?timeout, "Shutdown deadline exceeded, forcing close");
            control.force();
            task.abort();
            Err(LifecycleError::ShutdownTimeout { timeout })
        }
    }
}
