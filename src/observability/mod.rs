//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Lifecycle core, listener, request middleware produce:
//!     → logging.rs (structured JSON log events)
//!     → metrics.rs (transition and request counters, state gauge)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics go through the facade only; no exporter is bundled

pub mod logging;
pub mod metrics;
