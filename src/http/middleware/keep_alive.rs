//! Runtime keep-alive switch.
//!
//! hyper fixes keep-alive when a connection is built, so turning it off for a
//! live server means asking each HTTP/1 client to close after its current
//! response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, Version},
    middleware::Next,
    response::Response,
};

/// Shared on/off flag. Starts enabled.
#[derive(Debug, Clone)]
pub struct KeepAlive {
    enabled: Arc<AtomicBool>,
}

impl KeepAlive {
    pub fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self::new()
    }
}

/// Adds `Connection: close` to HTTP/1 responses once keep-alive is off.
pub async fn keep_alive(
    State(keep_alive): State<KeepAlive>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let http1 = matches!(request.version(), Version::HTTP_10 | Version::HTTP_11);
    let mut response = next.run(request).await;

    if http1 && !keep_alive.is_enabled() {
        response
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
    }
    response
}
