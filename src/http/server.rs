//! HTTP server under lifecycle management.
//!
//! # Responsibilities
//! - Wrap the caller's router with the standard middleware stack
//! - Bind, optionally terminate TLS, and serve HTTP/1.1 and HTTP/2
//! - Apply read, write and idle timeouts
//! - Expose the drain controls (keep-alive off, graceful stop, force close)

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    Extension, Router,
};
use axum_server::{tls_rustls::RustlsAcceptor, Handle};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::instrument::WithSubscriber;

use crate::config::ServerConfig;
use crate::http::middleware::{keep_alive, request_logger, KeepAlive};
use crate::lifecycle::error::{LifecycleError, Outcome};
use crate::lifecycle::shutdown::Drain;
use crate::lifecycle::state::Monitor;
use crate::lifecycle::supervisor::{Launched, Supervisor};
use crate::net::{tls, IdleAcceptor, Listener};
use crate::observability::logging;

/// An HTTP server that runs until a termination signal or a fatal error.
pub struct Server {
    config: ServerConfig,
    supervisor: Supervisor,
}

impl Server {
    /// Create a server. Nothing is bound until [`Server::start`].
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            supervisor: Supervisor::new("Server"),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Observe this run's state and bound address.
    pub fn monitor(&self) -> Monitor {
        self.supervisor.monitor()
    }

    /// Serve until SIGINT/SIGTERM (then drain) or until the listener fails.
    pub async fn start(self) -> Result<Outcome, LifecycleError> {
        self.start_with(CancellationToken::new()).await
    }

    /// Like [`Server::start`]; handlers receive `parent` as an
    /// `Extension<CancellationToken>`.
    ///
    /// Cancelling `parent` does not stop the server.
    pub async fn start_with(self, parent: CancellationToken) -> Result<Outcome, LifecycleError> {
        let logger = self
            .config
            .logger
            .clone()
            .unwrap_or_else(logging::default_dispatch);
        self.run(parent).with_subscriber(logger).await
    }

    async fn run(self, parent: CancellationToken) -> Result<Outcome, LifecycleError> {
        let Server { config, supervisor } = self;
        let shutdown_timeout = config.shutdown_timeout;

        supervisor
            .run(shutdown_timeout, move || {
                let handle = Handle::new();
                let keep_alive = KeepAlive::new();
                let app = build_app(&config, keep_alive.clone(), parent);
                let (ready_tx, ready_rx) = oneshot::channel();

                let task = tokio::spawn(
                    serve(config, app, handle.clone(), ready_tx).with_current_subscriber(),
                );

                Ok(Launched {
                    task,
                    ready: ready_rx,
                    control: HttpControl { handle, keep_alive },
                })
            })
            .await
    }
}

/// Drain controls for a running listener.
struct HttpControl {
    handle: Handle,
    keep_alive: KeepAlive,
}

impl Drain for HttpControl {
    fn begin(&self) {
        self.keep_alive.disable();
        self.handle.graceful_shutdown(None);
    }

    fn force(&self) {
        self.handle.shutdown();
    }
}

/// The caller's router with the standard layers applied.
#[allow(deprecated)]
fn build_app(config: &ServerConfig, keep_alive_switch: KeepAlive, parent: CancellationToken) -> Router {
    config.router.clone().layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(from_fn(request_logger))
            .layer(from_fn_with_state(keep_alive_switch, keep_alive))
            .layer(Extension(parent))
            .layer(TimeoutLayer::new(config.write_timeout)),
    )
}

/// Bind and serve until the handle stops us.
///
/// `ready` fires once the socket is bound; it is dropped unsent if TLS
/// material or the bind is rejected first. A partial TLS policy serves
/// plaintext.
async fn serve(
    config: ServerConfig,
    app: Router,
    handle: Handle,
    ready: oneshot::Sender<Option<SocketAddr>>,
) -> Result<(), LifecycleError> {
    let rustls = config.active_tls().map(tls::load_tls_config).transpose()?;

    let listener = Listener::bind(&config.address()).await?;
    let local_addr = listener.local_addr();
    let socket = listener.into_std().map_err(LifecycleError::Serve)?;

    let idle = IdleAcceptor::new(config.idle_timeout);
    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    let _ = ready.send(Some(local_addr));

    let served = match rustls {
        Some(rustls) => {
            let mut server = axum_server::from_tcp(socket)
                .acceptor(RustlsAcceptor::new(rustls).acceptor(idle))
                .handle(handle);
            tune(server.http_builder(), config.read_timeout);
            server.serve(service).await
        }
        None => {
            let mut server = axum_server::from_tcp(socket).acceptor(idle).handle(handle);
            tune(server.http_builder(), config.read_timeout);
            server.serve(service).await
        }
    };

    served.map_err(LifecycleError::Serve)
}

/// The read timeout bounds how long a client may take to send its headers.
fn tune(builder: &mut Builder<TokioExecutor>, read_timeout: Duration) {
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(read_timeout);
}
