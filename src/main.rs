//! `lifeline`: serve a health endpoint under full lifecycle management.
//!
//! ```text
//! config file (--config) → CLI flags → ServerConfig
//!     → Server::start → run until SIGINT/SIGTERM → drain → exit
//! ```
//!
//! Exit status is 0 after a clean signal stop and 1 on any startup,
//! runtime or shutdown error.

use std::path::PathBuf;
use std::process::ExitCode;

use axum::{routing::get, Json, Router};
use clap::Parser;
use serde::Serialize;

use lifeline::config::{load_options, ConfigBuilder, Options};
use lifeline::observability::logging;
use lifeline::{Outcome, Server};

#[derive(Parser)]
#[command(name = "lifeline")]
#[command(about = "HTTP server with signal-driven graceful shutdown", long_about = None)]
struct Cli {
    /// TOML file with server options.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides the config file).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Log filter, used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn overrides(&self) -> Options {
        let mut options = Options::default();
        if let Some(host) = &self.host {
            options = options.with_host(host.clone());
        }
        if let Some(port) = self.port {
            options = options.with_port(port);
        }
        options
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logger = match logging::init(&cli.log_level) {
        Ok(logger) => logger,
        Err(err) => {
            eprintln!("failed to initialize logging: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut builder = ConfigBuilder::new()
        .router(Router::new().route("/health", get(health)))
        .logger(logger);

    if let Some(path) = &cli.config {
        match load_options(path) {
            Ok(options) => builder = builder.option(options),
            Err(err) => {
                tracing::error!(error = %err, path = %path.display(), "Invalid configuration.");
                return ExitCode::FAILURE;
            }
        }
    }

    let config = builder.option(cli.overrides()).build();

    tracing::info!(
        address = %config.address(),
        tls = config.tls.is_some(),
        shutdown_timeout = ?config.shutdown_timeout,
        "Configuration loaded"
    );

    match Server::new(config).start().await {
        Ok(Outcome::Stopped(signal)) => {
            tracing::debug!(reason = %signal, "Shutdown complete");
            ExitCode::SUCCESS
        }
        Ok(Outcome::Completed) => ExitCode::SUCCESS,
        Err(err) if err.is_cancelled() => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Server error.");
            ExitCode::FAILURE
        }
    }
}
