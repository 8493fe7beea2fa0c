//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{routing::get, Router};
use lifeline::config::{ConfigBuilder, Options, ServerConfig};
use lifeline::observability::logging;
use lifeline::{LifecycleError, Outcome, Server};
use tokio::task::JoinHandle;

/// Port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// In-memory log sink shared between a logger and the test.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    pub fn dispatch(&self) -> tracing::Dispatch {
        let sink = self.clone();
        logging::json_dispatch(move || sink.clone())
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Parsed JSON log lines.
    pub fn lines(&self) -> Vec<serde_json::Value> {
        self.contents()
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// First line whose message equals `message`.
    pub fn find(&self, message: &str) -> Option<serde_json::Value> {
        self.lines()
            .into_iter()
            .find(|line| line["message"] == message)
    }
}

/// A router with a fast route and a slow one.
pub fn test_router() -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "slow"
            }),
        )
}

/// Loopback config on a free port, logging into `logs`.
pub fn test_config(logs: &LogCapture, options: Options) -> ServerConfig {
    ConfigBuilder::new()
        .router(test_router())
        .logger(logs.dispatch())
        .option(Options::default().with_host("127.0.0.1").with_port(free_port()))
        .option(options)
        .build()
}

/// Start `server` in the background and wait until it is accepting.
pub async fn spawn_server(
    server: Server,
) -> (JoinHandle<Result<Outcome, LifecycleError>>, Option<SocketAddr>) {
    let mut monitor = server.monitor();
    let run = tokio::spawn(server.start());
    let addr = tokio::time::timeout(Duration::from_secs(5), monitor.ready())
        .await
        .unwrap();
    (run, addr)
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
