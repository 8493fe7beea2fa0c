//! Configuration schema definitions.
//!
//! [`Options`] is the partial, mergeable form: every field may be left at its
//! zero value, which means "not set". [`ServerConfig`] is the resolved,
//! immutable form handed to the lifecycle core.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use serde::{Deserialize, Serialize};

/// Default bind host (all interfaces).
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default bind port.
pub const DEFAULT_PORT: u16 = 8080;
/// Default HTTP/1 header read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(15);
/// Default per-request handler deadline.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(15);
/// Default idle connection timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default graceful shutdown deadline.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);

/// A partial set of settings.
///
/// Zero values (empty host, port `0`, `0` ms, inactive TLS policy) are
/// treated as unset and never override anything when merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Options {
    /// Bind host (e.g., "127.0.0.1").
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// HTTP/1 header read timeout in milliseconds.
    pub read_timeout_ms: u64,

    /// Handler deadline in milliseconds.
    pub write_timeout_ms: u64,

    /// Idle connection timeout in milliseconds.
    pub idle_timeout_ms: u64,

    /// Graceful shutdown deadline in milliseconds.
    pub shutdown_timeout_ms: u64,

    /// Certificate and key material.
    pub tls: TlsPolicy,
}

impl Options {
    /// Merge `later` on top of `self`. Non-zero fields of `later` win.
    pub fn merge(mut self, later: &Options) -> Options {
        if !later.host.is_empty() {
            self.host = later.host.clone();
        }
        if later.port > 0 {
            self.port = later.port;
        }
        if later.read_timeout_ms > 0 {
            self.read_timeout_ms = later.read_timeout_ms;
        }
        if later.write_timeout_ms > 0 {
            self.write_timeout_ms = later.write_timeout_ms;
        }
        if later.idle_timeout_ms > 0 {
            self.idle_timeout_ms = later.idle_timeout_ms;
        }
        if later.shutdown_timeout_ms > 0 {
            self.shutdown_timeout_ms = later.shutdown_timeout_ms;
        }
        if later.tls.is_active() {
            self.tls = later.tls.clone();
        }
        self
    }

    /// Set the bind host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the bind port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the header read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = millis(timeout);
        self
    }

    /// Set the handler deadline.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = millis(timeout);
        self
    }

    /// Set the idle connection timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = millis(timeout);
        self
    }

    /// Set the graceful shutdown deadline.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = millis(timeout);
        self
    }

    /// Set the TLS policy.
    pub fn with_tls(mut self, tls: TlsPolicy) -> Self {
        self.tls = tls;
        self
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Where PEM material comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PemSource {
    /// A file on disk.
    Path(PathBuf),
    /// Inline PEM bytes.
    Bytes(Vec<u8>),
}

impl PemSource {
    /// True when no material is present.
    pub fn is_empty(&self) -> bool {
        match self {
            PemSource::Path(p) => p.as_os_str().is_empty(),
            PemSource::Bytes(b) => b.is_empty(),
        }
    }
}

impl Default for PemSource {
    fn default() -> Self {
        PemSource::Bytes(Vec::new())
    }
}

impl fmt::Display for PemSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PemSource::Path(p) => write!(f, "{}", p.display()),
            PemSource::Bytes(b) => write!(f, "<{} inline bytes>", b.len()),
        }
    }
}

/// Certificate and private key for TLS termination.
///
/// Only a policy with both halves present is active. Anything else serves
/// plaintext.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsPolicy {
    /// Certificate chain (PEM).
    pub certificate: PemSource,

    /// Private key (PEM).
    pub key: PemSource,
}

impl TlsPolicy {
    /// Policy backed by files on disk.
    pub fn from_paths(certificate: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            certificate: PemSource::Path(certificate.into()),
            key: PemSource::Path(key.into()),
        }
    }

    /// Policy backed by in-memory PEM.
    pub fn from_pem(certificate: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            certificate: PemSource::Bytes(certificate.into()),
            key: PemSource::Bytes(key.into()),
        }
    }

    /// Both certificate and key are present.
    pub fn is_active(&self) -> bool {
        !self.certificate.is_empty() && !self.key.is_empty()
    }

    /// Neither certificate nor key is present.
    pub fn is_empty(&self) -> bool {
        self.certificate.is_empty() && self.key.is_empty()
    }

    /// Exactly one half is present.
    pub fn is_partial(&self) -> bool {
        !self.is_active() && !self.is_empty()
    }
}

/// Resolved server settings.
///
/// Every timeout is strictly positive. Built by
/// [`ConfigBuilder`](crate::config::ConfigBuilder) or [`ServerConfig::merge`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub shutdown_timeout: Duration,

    /// Present only when the policy is active.
    pub tls: Option<TlsPolicy>,

    /// Handler set served by the listener.
    pub router: Router,

    /// Logger for lifecycle events. `None` logs JSON to stderr.
    pub logger: Option<tracing::Dispatch>,
}

impl ServerConfig {
    /// Apply `overrides` on top of `base`; zero-valued fields are skipped.
    pub fn merge(base: &ServerConfig, overrides: &Options) -> ServerConfig {
        let mut merged = base.clone();
        if !overrides.host.is_empty() {
            merged.host = overrides.host.clone();
        }
        if overrides.port > 0 {
            merged.port = overrides.port;
        }
        if overrides.read_timeout_ms > 0 {
            merged.read_timeout = Duration::from_millis(overrides.read_timeout_ms);
        }
        if overrides.write_timeout_ms > 0 {
            merged.write_timeout = Duration::from_millis(overrides.write_timeout_ms);
        }
        if overrides.idle_timeout_ms > 0 {
            merged.idle_timeout = Duration::from_millis(overrides.idle_timeout_ms);
        }
        if overrides.shutdown_timeout_ms > 0 {
            merged.shutdown_timeout = Duration::from_millis(overrides.shutdown_timeout_ms);
        }
        if overrides.tls.is_active() {
            merged.tls = Some(overrides.tls.clone());
        }
        merged
    }

    /// Apply defaults to anything left unset.
    ///
    /// Zero timeouts, an empty host and port `0` take their defaults; a TLS
    /// policy that is not active is dropped. Afterwards every timeout is
    /// strictly positive.
    pub fn with_defaults(mut self) -> ServerConfig {
        if self.host.is_empty() {
            self.host = DEFAULT_HOST.to_string();
        }
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        default_if_zero(&mut self.read_timeout, DEFAULT_READ_TIMEOUT);
        default_if_zero(&mut self.write_timeout, DEFAULT_WRITE_TIMEOUT);
        default_if_zero(&mut self.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        default_if_zero(&mut self.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
        self.tls = self.tls.filter(TlsPolicy::is_active);
        self
    }

    /// The TLS policy to serve with, if it is complete.
    pub fn active_tls(&self) -> Option<&TlsPolicy> {
        self.tls.as_ref().filter(|policy| policy.is_active())
    }

    /// `host:port` as handed to the socket layer.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_if_zero(value: &mut Duration, default: Duration) {
    if value.is_zero() {
        *value = default;
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            tls: None,
            router: Router::new(),
            logger: None,
        }
    }
}
