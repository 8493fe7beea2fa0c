//! Run states and the watch-based status monitor.

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::watch;

use crate::observability::metrics;

/// Where a run is in its lifecycle.
///
/// ```text
/// Idle → Starting → Running → Draining → { Stopped, Failed }
/// ```
/// `Failed` is also reachable from `Starting` and `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Idle,
    Starting,
    Running,
    Draining,
    Stopped,
    Failed,
}

impl State {
    /// Terminal states end the run.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Stopped | State::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Starting => "starting",
            State::Running => "running",
            State::Draining => "draining",
            State::Stopped => "stopped",
            State::Failed => "failed",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot published on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub state: State,
    /// Bound address, once the listener reports it.
    pub local_addr: Option<SocketAddr>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            state: State::Idle,
            local_addr: None,
        }
    }
}

/// Read side of a run's status.
#[derive(Debug, Clone)]
pub struct Monitor {
    rx: watch::Receiver<Status>,
}

impl Monitor {
    /// Current snapshot.
    pub fn status(&self) -> Status {
        *self.rx.borrow()
    }

    /// Current state.
    pub fn state(&self) -> State {
        self.rx.borrow().state
    }

    /// Wait until the run leaves `Idle`/`Starting`.
    ///
    /// Returns the bound address if the run reached `Running` with one, or
    /// `None` if it failed first (or is a worker without an address).
    pub async fn ready(&mut self) -> Option<SocketAddr> {
        let status = self
            .rx
            .wait_for(|s| !matches!(s.state, State::Idle | State::Starting))
            .await
            .ok()
            .map(|s| *s)?;
        match status.state {
            State::Failed => None,
            _ => status.local_addr,
        }
    }

    /// Wait for a terminal state.
    pub async fn finished(&mut self) -> State {
        let state = self
            .rx
            .wait_for(|s| s.state.is_terminal())
            .await
            .ok()
            .map(|s| s.state);
        state.unwrap_or_else(|| self.state())
    }
}

/// Write side of a run's status, owned by the lifecycle core.
#[derive(Debug)]
pub(crate) struct StatusCell {
    tx: watch::Sender<Status>,
}

impl StatusCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(Status::default());
        Self { tx }
    }

    pub(crate) fn monitor(&self) -> Monitor {
        Monitor {
            rx: self.tx.subscribe(),
        }
    }

    pub(crate) fn transition(&self, state: State) {
        self.tx.send_modify(|s| s.state = state);
        metrics::record_transition(state);
        tracing::debug!(state = %state, "Lifecycle transition");
    }

    pub(crate) fn running(&self, local_addr: Option<SocketAddr>) {
        self.tx.send_modify(|s| s.local_addr = local_addr);
        self.transition(State::Running);
    }
}
