//! Structured logging.
//!
//! # Responsibilities
//! - Build the JSON logger the lifecycle writes to by default (stderr)
//! - Build JSON loggers over any writer, for callers that inject their own
//! - Install the process-wide logger for the binary
//!
//! # Design Decisions
//! - JSON with event fields flattened to the top level, one object per line
//! - Loggers are passed around as [`Dispatch`] values, so a run can log to
//!   its own sink without touching the global default

use tracing::dispatcher::SetGlobalDefaultError;
use tracing::Dispatch;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

/// JSON logger at `info` writing to `writer`.
pub fn json_dispatch<W>(writer: W) -> Dispatch
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_writer(writer)
        .finish();
    Dispatch::new(subscriber)
}

/// The logger used when none is configured: JSON on stderr.
pub fn default_dispatch() -> Dispatch {
    json_dispatch(std::io::stderr)
}

/// Install a global JSON logger on stderr.
///
/// `RUST_LOG` takes precedence over `level`. Returns the installed logger so
/// it can also be handed to a server explicitly.
pub fn init(level: &str) -> Result<Dispatch, SetGlobalDefaultError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr),
    );

    let dispatch = Dispatch::new(subscriber);
    tracing::dispatcher::set_global_default(dispatch.clone())?;
    Ok(dispatch)
}
