//! Runs stopped by real SIGINT/SIGTERM delivery.
//!
//! Signals are process-wide, so every test here holds `SERIAL` for its whole
//! body and raises a signal only while a watcher is subscribed. Tests that
//! need the default action to run are re-executed in a child process.
#![cfg(unix)]

use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::time::Duration;

use axum::http::StatusCode;
use lifeline::config::{Options, TlsPolicy};
use lifeline::lifecycle::signals::default_action_restored;
use lifeline::lifecycle::{BoxError, SignalWatcher, WorkerConfig};
use lifeline::{LifecycleError, Outcome, Server, Signal, State, Worker};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::low_level::raise;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::ChildStdout;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

mod common;

use common::{http_client, spawn_server, test_config, LogCapture};

static SERIAL: Mutex<()> = Mutex::const_new(());

const RUN_DEADLINE: Duration = Duration::from_secs(10);

/// Set in the child process that hosts [`hung_drain_worker`].
const HUNG_DRAIN_ENV: &str = "LIFELINE_HUNG_DRAIN";

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

#[tokio::test]
async fn watcher_fires_once_and_releases() {
    let _serial = SERIAL.lock().await;

    let mut watcher = SignalWatcher::subscribe().unwrap();
    assert!(!default_action_restored());

    raise(SIGTERM).unwrap();
    let first = tokio::time::timeout(RUN_DEADLINE, watcher.recv()).await.unwrap();

    assert_eq!(first, Some(Signal::Terminate));
    assert!(watcher.is_released());
    assert_eq!(watcher.recv().await, None);
    assert!(default_action_restored());
}

#[tokio::test]
async fn sigint_drains_and_stops_the_server() {
    let _serial = SERIAL.lock().await;
    let logs = LogCapture::default();

    let server = Server::new(test_config(&logs, Options::default()));
    let mut monitor = server.monitor();
    let (run, addr) = spawn_server(server).await;
    let addr = addr.expect("server bound");
    assert_eq!(monitor.state(), State::Running);

    let response = http_client()
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "ok");

    raise(SIGINT).unwrap();
    let outcome = tokio::time::timeout(RUN_DEADLINE, run).await.unwrap().unwrap();

    assert_eq!(outcome.unwrap(), Outcome::Stopped(Signal::Interrupt));
    assert_eq!(monitor.finished().await, State::Stopped);
    assert!(default_action_restored());

    let started = logs.find("Server started.").expect("start logged");
    assert_eq!(started["address"], addr.to_string());

    let request = logs.find("Request received.").expect("request logged");
    assert_eq!(request["status"], 200);
    assert_eq!(request["method"], "GET");
    assert_eq!(request["path"], "/health");
    assert_eq!(request["remote_ip"], "127.0.0.1");

    let stopped = logs.find("Server stopped.").expect("stop logged");
    assert_eq!(stopped["reason"], "SIGINT");

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn in_flight_request_finishes_during_drain() {
    let _serial = SERIAL.lock().await;
    let logs = LogCapture::default();

    let options = Options::default().with_shutdown_timeout(Duration::from_secs(5));
    let (run, addr) = spawn_server(Server::new(test_config(&logs, options))).await;
    let addr = addr.expect("server bound");

    let slow = tokio::spawn(http_client().get(format!("http://{addr}/slow")).send());
    tokio::time::sleep(Duration::from_millis(300)).await;

    raise(SIGTERM).unwrap();

    let response = slow.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["connection"], "close");
    assert_eq!(response.text().await.unwrap(), "slow");

    let outcome = tokio::time::timeout(RUN_DEADLINE, run).await.unwrap().unwrap();
    assert_eq!(outcome.unwrap(), Outcome::Stopped(Signal::Terminate));
}

#[tokio::test]
async fn drain_past_the_deadline_is_a_shutdown_timeout() {
    let _serial = SERIAL.lock().await;
    let logs = LogCapture::default();

    let options = Options::default().with_shutdown_timeout(Duration::from_millis(200));
    let server = Server::new(test_config(&logs, options));
    let mut monitor = server.monitor();
    let (run, addr) = spawn_server(server).await;
    let addr = addr.expect("server bound");

    let slow = tokio::spawn(http_client().get(format!("http://{addr}/slow")).send());
    tokio::time::sleep(Duration::from_millis(300)).await;

    raise(SIGTERM).unwrap();
    let err = tokio::time::timeout(RUN_DEADLINE, run)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();

    assert!(
        matches!(err, LifecycleError::ShutdownTimeout { timeout } if timeout == Duration::from_millis(200)),
        "unexpected error: {err}"
    );
    assert_eq!(monitor.finished().await, State::Failed);
    assert!(logs.find("Error shutting down server.").is_some());
    assert!(slow.await.unwrap().is_err());
}

#[tokio::test]
async fn slow_handler_hits_the_write_timeout() {
    let _serial = SERIAL.lock().await;
    let logs = LogCapture::default();

    let options = Options::default().with_write_timeout(Duration::from_millis(100));
    let (run, addr) = spawn_server(Server::new(test_config(&logs, options))).await;
    let addr = addr.expect("server bound");

    let response = http_client()
        .get(format!("http://{addr}/slow"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

    raise(SIGTERM).unwrap();
    let outcome = tokio::time::timeout(RUN_DEADLINE, run).await.unwrap().unwrap();
    assert_eq!(outcome.unwrap(), Outcome::Stopped(Signal::Terminate));
}

#[tokio::test]
async fn tls_server_negotiates_tls13_and_stops() {
    let _serial = SERIAL.lock().await;
    let logs = LogCapture::default();

    let tls = TlsPolicy::from_paths(fixture("cert.pem"), fixture("key.pem"));
    let (run, addr) = spawn_server(Server::new(test_config(&logs, Options::default().with_tls(tls)))).await;
    let addr = addr.expect("server bound");

    let client = reqwest::Client::builder()
        .no_proxy()
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap();

    let response = client
        .get(format!("https://localhost:{}/health", addr.port()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Plaintext against the TLS port does not get an HTTP response.
    assert!(http_client()
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .is_err());

    raise(SIGTERM).unwrap();
    let outcome = tokio::time::timeout(RUN_DEADLINE, run).await.unwrap().unwrap();
    assert_eq!(outcome.unwrap(), Outcome::Stopped(Signal::Terminate));
}

#[tokio::test]
async fn handlers_see_the_parent_token() {
    let _serial = SERIAL.lock().await;
    let logs = LogCapture::default();

    let mut config = test_config(&logs, Options::default());
    config.router = axum::Router::new().route(
        "/cancelled",
        axum::routing::get(
            |axum::Extension(token): axum::Extension<CancellationToken>| async move {
                token.is_cancelled().to_string()
            },
        ),
    );

    let parent = CancellationToken::new();
    let server = Server::new(config);
    let mut monitor = server.monitor();
    let run = tokio::spawn(server.start_with(parent.clone()));
    let addr = monitor.ready().await.expect("server bound");

    parent.cancel();
    let body = http_client()
        .get(format!("http://{addr}/cancelled"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "true");
    assert_eq!(monitor.state(), State::Running);

    raise(SIGINT).unwrap();
    let outcome = tokio::time::timeout(RUN_DEADLINE, run).await.unwrap().unwrap();
    assert_eq!(outcome.unwrap(), Outcome::Stopped(Signal::Interrupt));
}

#[tokio::test]
async fn sigterm_stops_a_worker() {
    let _serial = SERIAL.lock().await;
    let logs = LogCapture::default();
    let config = WorkerConfig::from(&test_config(&logs, Options::default()));

    let worker = Worker::new(config, |token: CancellationToken| async move {
        token.cancelled().await;
        Ok::<(), BoxError>(())
    });
    let mut monitor = worker.monitor();
    let run = tokio::spawn(worker.start());

    assert_eq!(monitor.ready().await, None);
    assert_eq!(monitor.state(), State::Running);

    raise(SIGTERM).unwrap();
    let outcome = tokio::time::timeout(RUN_DEADLINE, run).await.unwrap().unwrap();

    assert_eq!(outcome.unwrap(), Outcome::Stopped(Signal::Terminate));
    assert!(logs.find("Service started.").is_some());
    assert_eq!(logs.find("Service stopped.").unwrap()["reason"], "SIGTERM");
}

#[tokio::test]
async fn worker_ignoring_cancellation_times_out() {
    let _serial = SERIAL.lock().await;
    let logs = LogCapture::default();
    let config = WorkerConfig {
        shutdown_timeout: Duration::from_millis(200),
        logger: Some(logs.dispatch()),
    };

    let worker = Worker::new(config, |_token| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok::<(), BoxError>(())
    });
    let mut monitor = worker.monitor();
    let run = tokio::spawn(worker.start());
    monitor.ready().await;

    raise(SIGINT).unwrap();
    let err = tokio::time::timeout(RUN_DEADLINE, run)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, LifecycleError::ShutdownTimeout { .. }));
    assert!(logs.find("Error shutting down service.").is_some());
}

#[tokio::test]
async fn worker_error_while_draining_is_returned() {
    let _serial = SERIAL.lock().await;
    let logs = LogCapture::default();
    let config = WorkerConfig::from(&test_config(&logs, Options::default()));

    let worker = Worker::new(config, |token: CancellationToken| async move {
        token.cancelled().await;
        Err::<(), BoxError>("flush failed".into())
    });
    let mut monitor = worker.monitor();
    let run = tokio::spawn(worker.start());
    monitor.ready().await;

    raise(SIGINT).unwrap();
    let err = tokio::time::timeout(RUN_DEADLINE, run)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, LifecycleError::Worker(_)));
    assert!(err.to_string().contains("flush failed"));
}

#[tokio::test]
async fn partial_tls_on_the_config_serves_plaintext() {
    let _serial = SERIAL.lock().await;
    let logs = LogCapture::default();

    let mut config = test_config(&logs, Options::default());
    config.tls = Some(TlsPolicy::from_paths(fixture("cert.pem"), ""));
    let (run, addr) = spawn_server(Server::new(config)).await;
    let addr = addr.expect("server bound");

    let response = http_client()
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    raise(SIGTERM).unwrap();
    let outcome = tokio::time::timeout(RUN_DEADLINE, run).await.unwrap().unwrap();
    assert_eq!(outcome.unwrap(), Outcome::Stopped(Signal::Terminate));
}

#[tokio::test]
async fn slow_handler_outlives_the_idle_timeout() {
    let _serial = SERIAL.lock().await;
    let logs = LogCapture::default();

    let options = Options::default()
        .with_idle_timeout(Duration::from_millis(500))
        .with_write_timeout(Duration::from_secs(10));
    let (run, addr) = spawn_server(Server::new(test_config(&logs, options))).await;
    let addr = addr.expect("server bound");

    let response = http_client()
        .get(format!("http://{addr}/slow"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "slow");

    raise(SIGTERM).unwrap();
    let outcome = tokio::time::timeout(RUN_DEADLINE, run).await.unwrap().unwrap();
    assert_eq!(outcome.unwrap(), Outcome::Stopped(Signal::Terminate));
}

#[tokio::test]
async fn second_server_on_a_taken_address_fails() {
    let _serial = SERIAL.lock().await;
    let logs = LogCapture::default();

    let first = Server::new(test_config(&logs, Options::default()));
    let port = first.config().port;
    let (run, addr) = spawn_server(first).await;
    let addr = addr.expect("server bound");

    let second = Server::new(test_config(&logs, Options::default().with_port(port)));
    let monitor = second.monitor();
    let err = tokio::time::timeout(RUN_DEADLINE, second.start())
        .await
        .unwrap()
        .unwrap_err();

    assert!(err.is_addr_in_use(), "unexpected error: {err}");
    assert!(err.to_string().contains(&addr.to_string()));
    assert_eq!(monitor.state(), State::Failed);

    raise(SIGTERM).unwrap();
    let outcome = tokio::time::timeout(RUN_DEADLINE, run).await.unwrap().unwrap();
    assert_eq!(outcome.unwrap(), Outcome::Stopped(Signal::Terminate));
}

/// Only does anything inside the child spawned by
/// `second_sigint_during_a_hung_drain_kills_the_process`.
#[tokio::test]
async fn hung_drain_worker() {
    if std::env::var_os(HUNG_DRAIN_ENV).is_none() {
        return;
    }
    let config = WorkerConfig {
        shutdown_timeout: Duration::from_secs(60),
        logger: Some(tracing::Dispatch::none()),
    };

    let worker = Worker::new(config, |token: CancellationToken| async move {
        println!("lifeline:ready");
        token.cancelled().await;
        println!("lifeline:draining");
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok::<(), BoxError>(())
    });

    let result = worker.start().await;
    panic!("drain ran to the end: {result:?}");
}

async fn wait_for_line(lines: &mut Lines<BufReader<ChildStdout>>, marker: &str) {
    let found = tokio::time::timeout(RUN_DEADLINE, async {
        while let Some(line) = lines.next_line().await.unwrap() {
            if line.contains(marker) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(found, "child exited before printing {marker}");
}

fn interrupt(pid: u32) {
    let killed = std::process::Command::new("kill")
        .args(["-INT", &pid.to_string()])
        .status()
        .unwrap();
    assert!(killed.success());
}

#[tokio::test]
async fn second_sigint_during_a_hung_drain_kills_the_process() {
    let mut child = tokio::process::Command::new(std::env::current_exe().unwrap())
        .args(["--exact", "hung_drain_worker", "--nocapture", "--test-threads=1"])
        .env(HUNG_DRAIN_ENV, "1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let pid = child.id().expect("child running");
    let mut lines = BufReader::new(child.stdout.take().unwrap()).lines();

    wait_for_line(&mut lines, "lifeline:ready").await;
    interrupt(pid);
    wait_for_line(&mut lines, "lifeline:draining").await;
    interrupt(pid);

    let status = tokio::time::timeout(RUN_DEADLINE, child.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.signal(), Some(SIGINT), "exit status {status}");
}
