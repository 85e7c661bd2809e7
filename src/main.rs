//! # Asset Telemetry
//!
//! Runs the telemetry pipeline against simulated sensors, link and broker.

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use asset_telemetry::config::{Config, LoggingConfig};
use asset_telemetry::pipeline::Pipeline;
use asset_telemetry::sim;
use asset_telemetry::supervisor::ShutdownCause;

/// Prefix of the daily rolling log file
const LOG_FILE_PREFIX: &str = "asset-telemetry.log";

/// Main entry point for the asset telemetry application
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (path from the first argument, defaults otherwise)
///    - Set up logging with tracing subscriber
///    - Start the pipeline with simulated collaborators
///
/// 2. **Supervision**
///    - The recovery supervisor runs until a terminal fault
///    - Ctrl+C takes the same shutdown path
///
/// 3. **Shutdown**
///    - Log the final status record
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/device.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("loading {}", path))?,
        None => Config::default(),
    };

    let _guard = init_logging(&config.logging);
    info!("Asset Telemetry v{} starting...", env!("CARGO_PKG_VERSION"));

    let pipeline = Pipeline::start(&config, sim::collaborators(&config)).context("starting pipeline")?;
    let stop = pipeline.shutdown_handle();
    let run = pipeline.run();
    tokio::pin!(run);

    let report = tokio::select! {
        report = &mut run => report,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            stop.cancel();
            run.await
        }
    };

    match report.cause {
        ShutdownCause::External => info!("Stopped: {:?}", report.snapshot),
        cause => error!("Pipeline shut down ({}): {:?}", cause, report.snapshot),
    }
    Ok(())
}

/// Console logging, plus a daily rolling file when a directory is configured.
///
/// The returned guard flushes the file writer on drop and must outlive the
/// runtime.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    match &logging.directory {
        Some(directory) => {
            use tracing_subscriber::layer::SubscriberExt;
            use tracing_subscriber::util::SubscriberInitExt;

            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter())
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter()).init();
            None
        }
    }
}
