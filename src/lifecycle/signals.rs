//! OS signal handling.
//!
//! # Responsibilities
//! - Subscribe to SIGINT and SIGTERM for the duration of one run
//! - Resolve to the first signal received, then unsubscribe
//! - Hand repeated signals back to the platform default (terminate)
//!
//! # Design Decisions
//! - A [`SignalWatcher`] is a scoped resource: dropping it releases the
//!   subscription on every exit path
//! - While no watcher is live and listening, SIGINT/SIGTERM emulate the
//!   default action. A second Ctrl-C during a hung drain kills the process
//! - Off unix only Ctrl-C is watched. The console default cannot be restored
//!   once tokio has claimed it, so after the first Ctrl-C a background task
//!   exits the process on any later one that arrives with no live watcher
//! - Single-use: a watcher fires at most once

use std::fmt;

#[cfg(unix)]
pub use self::unix::{default_action_restored, SignalWatcher};

#[cfg(not(unix))]
pub use self::fallback::{default_action_restored, SignalWatcher};

/// Termination signal that ended a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl Signal {
    pub fn name(self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(unix)]
mod unix {
    use std::os::raw::c_int;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    use futures_util::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    use super::Signal;
    use crate::lifecycle::error::LifecycleError;

    const TERMINATION_SIGNALS: [c_int; 2] = [SIGINT, SIGTERM];

    /// Process-wide switch between "a watcher handles it" and "default action".
    ///
    /// The conditional default handlers are installed once and stay installed;
    /// `fallthrough` is true whenever no live watcher is waiting.
    struct Gate {
        live: usize,
        fallthrough: Option<Arc<AtomicBool>>,
    }

    static GATE: Mutex<Gate> = Mutex::new(Gate {
        live: 0,
        fallthrough: None,
    });

    fn gate() -> MutexGuard<'static, Gate> {
        GATE.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl Gate {
        fn acquire(&mut self) -> std::io::Result<()> {
            let flag = match &self.fallthrough {
                Some(flag) => Arc::clone(flag),
                None => {
                    let flag = Arc::new(AtomicBool::new(false));
                    for sig in TERMINATION_SIGNALS {
                        signal_hook::flag::register_conditional_default(sig, Arc::clone(&flag))?;
                    }
                    self.fallthrough = Some(Arc::clone(&flag));
                    flag
                }
            };
            self.live += 1;
            flag.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn release(&mut self) {
            self.live = self.live.saturating_sub(1);
            if self.live == 0 {
                if let Some(flag) = &self.fallthrough {
                    flag.store(true, Ordering::SeqCst);
                }
            }
        }
    }

    /// True when SIGINT/SIGTERM currently take the platform default action.
    pub fn default_action_restored() -> bool {
        let gate = gate();
        match &gate.fallthrough {
            Some(flag) => flag.load(Ordering::SeqCst),
            None => true,
        }
    }

    /// One-shot subscription to SIGINT and SIGTERM.
    pub struct SignalWatcher {
        signals: Option<Signals>,
    }

    impl SignalWatcher {
        /// Register the subscription.
        pub fn subscribe() -> Result<Self, LifecycleError> {
            gate().acquire().map_err(LifecycleError::SignalInstall)?;
            match Signals::new(TERMINATION_SIGNALS) {
                Ok(signals) => Ok(Self {
                    signals: Some(signals),
                }),
                Err(err) => {
                    gate().release();
                    Err(LifecycleError::SignalInstall(err))
                }
            }
        }

        /// Wait for the first termination signal.
        ///
        /// The subscription is released as soon as a signal arrives; later
        /// calls return `None` immediately.
        pub async fn recv(&mut self) -> Option<Signal> {
            let raw = self.signals.as_mut()?.next().await;
            self.release();
            raw.map(|sig| match sig {
                SIGTERM => Signal::Terminate,
                _ => Signal::Interrupt,
            })
        }

        /// The subscription has been given up.
        pub fn is_released(&self) -> bool {
            self.signals.is_none()
        }

        fn release(&mut self) {
            if let Some(signals) = self.signals.take() {
                signals.handle().close();
                gate().release();
            }
        }
    }

    impl Drop for SignalWatcher {
        fn drop(&mut self) {
            self.release();
        }
    }

    impl std::fmt::Debug for SignalWatcher {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SignalWatcher")
                .field("released", &self.is_released())
                .finish()
        }
    }
}

#[cfg(not(unix))]
mod fallback {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::Signal;
    use crate::lifecycle::error::LifecycleError;

    /// Exit status of a console process killed by Ctrl-C.
    const CONTROL_C_EXIT: i32 = 0xC000_013A_u32 as i32;

    /// Count of watchers still waiting for their signal.
    struct Live(AtomicUsize);

    impl Live {
        const fn new() -> Self {
            Self(AtomicUsize::new(0))
        }

        fn acquire(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn release(&self) {
            let _ = self
                .0
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        }

        fn idle(&self) -> bool {
            self.0.load(Ordering::SeqCst) == 0
        }
    }

    static LIVE: Live = Live::new();
    static ESCAPE_ARMED: AtomicBool = AtomicBool::new(false);

    /// Clears [`ESCAPE_ARMED`] when the escape task ends with its runtime.
    struct Armed;

    impl Drop for Armed {
        fn drop(&mut self) {
            ESCAPE_ARMED.store(false, Ordering::SeqCst);
        }
    }

    /// Once tokio has consumed a Ctrl-C the console default no longer
    /// applies, so a later Ctrl-C with no live watcher exits from here.
    fn arm_escape() {
        if ESCAPE_ARMED.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(async {
            let _armed = Armed;
            while tokio::signal::ctrl_c().await.is_ok() {
                if LIVE.idle() {
                    std::process::exit(CONTROL_C_EXIT);
                }
            }
        });
    }

    /// True when a Ctrl-C would end the process.
    pub fn default_action_restored() -> bool {
        LIVE.idle()
    }

    /// Ctrl-C only; the platform has no SIGTERM to watch.
    #[derive(Debug)]
    pub struct SignalWatcher {
        live: bool,
    }

    impl SignalWatcher {
        pub fn subscribe() -> Result<Self, LifecycleError> {
            LIVE.acquire();
            Ok(Self { live: true })
        }

        pub async fn recv(&mut self) -> Option<Signal> {
            if !self.live {
                return None;
            }
            let received = tokio::signal::ctrl_c().await;
            self.release();
            received.ok()?;
            arm_escape();
            Some(Signal::Interrupt)
        }

        pub fn is_released(&self) -> bool {
            !self.live
        }

        fn release(&mut self) {
            if std::mem::take(&mut self.live) {
                LIVE.release();
            }
        }
    }

    impl Drop for SignalWatcher {
        fn drop(&mut self) {
            self.release();
        }
    }

}
