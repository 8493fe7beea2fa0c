//! TCP listener binding.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Report the bound address (port 0 resolves here)
//! - Map bind failures to [`LifecycleError::Bind`] with the address attached

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::lifecycle::error::LifecycleError;

/// A bound, not yet serving, TCP listener.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind to `address` (`host:port`).
    pub async fn bind(address: &str) -> Result<Self, LifecycleError> {
        let bind_error = |source| LifecycleError::Bind {
            addr: address.to_string(),
            source,
        };

        let inner = TcpListener::bind(address).await.map_err(bind_error)?;
        let local_addr = inner.local_addr().map_err(bind_error)?;

        tracing::debug!(address = %local_addr, "Listener bound");

        Ok(Self { inner, local_addr })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Hand the socket over to the HTTP server.
    pub fn into_std(self) -> std::io::Result<std::net::TcpListener> {
        self.inner.into_std()
    }
}
