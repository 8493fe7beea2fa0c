//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)            programmatic Options
//!     → loader.rs (parse)             │
//!     → validation.rs (semantic)      │
//!     → Options ──────────────────────┤
//!                                     ▼
//!                  builder.rs (ordered merge, last non-zero wins)
//!                                     ▼
//!                  ServerConfig (resolved, immutable)
//! ```
//!
//! # Design Decisions
//! - Zero values mean "unset" and never clobber an earlier value
//! - Merging is pure; defaults live in `ServerConfig::default`
//! - Config is immutable once built; a new run needs a new config

pub mod builder;
pub mod loader;
pub mod schema;
pub mod validation;

pub use builder::ConfigBuilder;
pub use loader::{load_options, ConfigError};
pub use schema::{Options, PemSource, ServerConfig, TlsPolicy};
