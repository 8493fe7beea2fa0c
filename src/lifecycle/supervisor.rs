//! The lifecycle core.
//!
//! Launches the listener/worker task and the signal watcher, then waits on
//! whichever yields first. The listener's task result is the error queue, the
//! watcher's task result is the stop queue; both are single-owner join
//! handles, so neither can be closed twice or written after the run ends.
//!
//! Priority on a tie is "listener result first": a listener that already
//! failed has nothing left to drain, so a pending signal is discarded.

use std::future::{pending, Future};
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::instrument::WithSubscriber;

use crate::lifecycle::error::{LifecycleError, Outcome};
use crate::lifecycle::shutdown::{self, Drain};
use crate::lifecycle::signals::{Signal, SignalWatcher};
use crate::lifecycle::state::{Monitor, State, StatusCell};

/// A started listener or worker, handed to the core.
pub(crate) struct Launched<C> {
    /// The body. Its result is the run's fatal-error channel.
    pub task: JoinHandle<Result<(), LifecycleError>>,
    /// Fires once the body is bound and accepting. Dropped unsent on failure.
    pub ready: oneshot::Receiver<Option<SocketAddr>>,
    pub control: C,
}

/// Aborts the watcher task when the core returns, whatever the path.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Drives one run from `Starting` to a terminal state.
pub(crate) struct Supervisor {
    label: &'static str,
    status: StatusCell,
}

impl Supervisor {
    pub(crate) fn new(label: &'static str) -> Self {
        Self {
            label,
            status: StatusCell::new(),
        }
    }

    pub(crate) fn monitor(&self) -> Monitor {
        self.status.monitor()
    }

    /// Run to completion. `launch` is called once, after the watcher is live.
    pub(crate) async fn run<C, F>(
        self,
        shutdown_timeout: Duration,
        launch: F,
    ) -> Result<Outcome, LifecycleError>
    where
        C: Drain,
        F: FnOnce() -> Result<Launched<C>, LifecycleError>,
    {
        let stop = SignalWatcher::subscribe().map(wait_for_signal);
        self.run_until(shutdown_timeout, stop, launch).await
    }

    /// Like [`Supervisor::run`], stopped by `stop` instead of the OS.
    async fn run_until<C, F, S>(
        self,
        shutdown_timeout: Duration,
        stop: Result<S, LifecycleError>,
        launch: F,
    ) -> Result<Outcome, LifecycleError>
    where
        C: Drain,
        F: FnOnce() -> Result<Launched<C>, LifecycleError>,
        S: Future<Output = Signal> + Send + 'static,
    {
        self.status.transition(State::Starting);
        let result = match stop {
            Ok(stop) => self.drive(shutdown_timeout, stop, launch).await,
            Err(err) => Err(err),
        };
        match &result {
            Ok(_) => self.status.transition(State::Stopped),
            Err(_) => self.status.transition(State::Failed),
        }
        result
    }

    async fn drive<C, F, S>(
        &self,
        shutdown_timeout: Duration,
        stop: S,
        launch: F,
    ) -> Result<Outcome, LifecycleError>
    where
        C: Drain,
        F: FnOnce() -> Result<Launched<C>, LifecycleError>,
        S: Future<Output = Signal> + Send + 'static,
    {
        let Launched {
            mut task,
            mut ready,
            control,
        } = launch()?;

        let mut stop = tokio::spawn(stop.with_current_subscriber());
        let _release = AbortOnDrop(stop.abort_handle());

        let mut running = false;
        let signal = loop {
            tokio::select! {
                biased;

                exited = &mut task => return finished(exited),

                bound = &mut ready, if !running => match bound {
                    Ok(local_addr) => {
                        running = true;
                        self.status.running(local_addr);
                        match local_addr {
                            Some(address) => tracing::info!(address = %address, "{} started.", self.label),
                            None => tracing::info!("{} started.", self.label),
                        }
                    }
                    Err(_) => return finished((&mut task).await),
                },

                stopped = &mut stop => break stopped?,
            }
        };

        self.status.transition(State::Draining);
        let drained = shutdown::drain(&control, &mut task, shutdown_timeout).await;
        if let Err(err) = &drained {
            tracing::info!(error = %err, "Error shutting down {}.", self.label.to_lowercase());
        }
        tracing::info!(reason = %signal, "{} stopped.", self.label);

        drained.map(|()| Outcome::Stopped(signal))
    }
}

/// The body ended before any signal: its result is the outcome.
fn finished(joined: Result<Result<(), LifecycleError>, JoinError>) -> Result<Outcome, LifecycleError> {
    joined??;
    Ok(Outcome::Completed)
}

/// The first termination signal. A watcher that ends without one never
/// resolves.
async fn wait_for_signal(mut watcher: SignalWatcher) -> Signal {
    match watcher.recv().await {
        Some(signal) => signal,
        None => pending().await,
    }
}
