//! Headless background worker hosted under the same lifecycle as the server.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;

use crate::config::schema::{ServerConfig, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::lifecycle::error::{BoxError, LifecycleError, Outcome};
use crate::lifecycle::shutdown::Drain;
use crate::lifecycle::state::Monitor;
use crate::lifecycle::supervisor::{Launched, Supervisor};
use crate::observability::logging;

/// Settings for a [`Worker`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long the body gets to finish after its token is cancelled.
    pub shutdown_timeout: Duration,
    /// Logger for lifecycle events. `None` logs JSON to stderr.
    pub logger: Option<tracing::Dispatch>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            logger: None,
        }
    }
}

impl From<&ServerConfig> for WorkerConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            shutdown_timeout: config.shutdown_timeout,
            logger: config.logger.clone(),
        }
    }
}

struct WorkerControl {
    stop: CancellationToken,
}

impl Drain for WorkerControl {
    fn begin(&self) {
        self.stop.cancel();
    }

    // The core aborts the body task after this.
    fn force(&self) {}
}

/// A background body with no listener.
///
/// The body receives a token that is cancelled when a termination signal
/// arrives (or when the caller's parent token is cancelled) and should
/// return promptly afterwards.
pub struct Worker<F> {
    config: WorkerConfig,
    body: F,
    supervisor: Supervisor,
}

impl<F, Fut> Worker<F>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    pub fn new(config: WorkerConfig, body: F) -> Self {
        Self {
            config,
            body,
            supervisor: Supervisor::new("Service"),
        }
    }

    /// Observe this run's state.
    pub fn monitor(&self) -> Monitor {
        self.supervisor.monitor()
    }

    /// Run until the body finishes, fails, or a signal stops it.
    pub async fn start(self) -> Result<Outcome, LifecycleError> {
        self.start_with(CancellationToken::new()).await
    }

    /// Like [`Worker::start`], with a caller-owned parent token.
    ///
    /// Cancelling `parent` cancels the body's token too. A body that then
    /// returns `Ok(())` is reported as [`LifecycleError::Cancelled`]; a body
    /// error is still returned as [`LifecycleError::Worker`].
    pub async fn start_with(self, parent: CancellationToken) -> Result<Outcome, LifecycleError> {
        let logger = self
            .config
            .logger
            .clone()
            .unwrap_or_else(logging::default_dispatch);
        self.run(parent).with_subscriber(logger).await
    }

    async fn run(self, parent: CancellationToken) -> Result<Outcome, LifecycleError> {
        let Worker {
            config,
            body,
            supervisor,
        } = self;

        supervisor
            .run(config.shutdown_timeout, move || {
                let stop = parent.child_token();
                let token = stop.clone();
                let (ready_tx, ready_rx) = oneshot::channel();
                let _ = ready_tx.send(None);

                let task = tokio::spawn(
                    async move {
                        match body(token).await {
                            Ok(()) if parent.is_cancelled() => Err(LifecycleError::Cancelled),
                            Ok(()) => Ok(()),
                            Err(err) => Err(LifecycleError::Worker(err)),
                        }
                    }
                    .with_current_subscriber(),
                );

                Ok(Launched {
                    task,
                    ready: ready_rx,
                    control: WorkerControl { stop },
                })
            })
            .await
    }
}
