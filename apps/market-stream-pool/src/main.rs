//! Market Stream Pool Binary
//!
//! Streams market data through the pooled adapter and serves health checks.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-stream-pool
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKET_DATA_API_KEY`: Venue API key (without it nothing connects)
//!
//! ## Optional
//! - `MARKET_DATA_STREAM_URL`: Venue WebSocket URL
//! - `MARKET_DATA_SYMBOLS`: Symbols to stream at startup
//! - `STREAM_POOL_MULTI_CONNECTION`: Use the connection pool (default: false)
//! - `STREAM_POOL_CONNECTION_<n>_UNIVERSE` / `_SYMBOLS`: Pool slot tickers
//! - `UNIVERSE_FILE`: JSON symbol universe file
//! - `STREAM_POOL_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use market_stream_pool::application::services::HealthSource;
use market_stream_pool::infrastructure::telemetry;
use market_stream_pool::{
    HealthReporter, HealthServer, HealthServerState, MarketDataAdapter, StaticUniverse,
    StatusData, StreamConfig, TickRecord, WebSocketConnector, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("rustls crypto provider already installed"))?;

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting market stream pool");

    let _metrics_handle = init_metrics().context("failed to install Prometheus recorder")?;

    let config = StreamConfig::from_env()?;
    log_config(&config);

    let universe = match &config.universe_file {
        Some(path) => StaticUniverse::load(path)?,
        None => StaticUniverse::default(),
    };

    let adapter = Arc::new(MarketDataAdapter::new(
        &config,
        Arc::new(WebSocketConnector::new()),
        Arc::new(universe),
        Arc::new(on_tick),
        Arc::new(on_status),
    ));

    let shutdown_token = CancellationToken::new();

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&adapter) as Arc<dyn HealthSource>,
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Spawn health reporter
    let reporter = HealthReporter::new(
        Arc::clone(&adapter) as Arc<dyn HealthSource>,
        config.server.health_interval,
        shutdown_token.clone(),
    );
    tokio::spawn(reporter.run());

    if adapter.connect(&config.venue.symbols).await {
        tracing::info!(mode = %adapter.mode(), "Market stream pool ready");
    } else {
        tracing::warn!(mode = %adapter.mode(), "No streaming connection established");
    }

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, adapter.disconnect())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Disconnect timed out"
        );
    }

    tracing::info!("Market stream pool stopped");
    Ok(())
}

fn on_tick(tick: TickRecord) {
    tracing::trace!(
        symbol = tick.symbol(),
        price = %tick.price(),
        size = tick.size(),
        event_type = tick.event_type().as_str(),
        source = tick.source(),
        "Tick"
    );
}

fn on_status(status: &str, data: StatusData) {
    tracing::info!(status, data = %serde_json::Value::Object(data), "Stream status");
}

/// Log the parsed configuration.
fn log_config(config: &StreamConfig) {
    tracing::info!(
        mode = config.mode.as_str(),
        credentials = config.has_credentials(),
        symbols = config.venue.symbols.len(),
        slots = config.pool.slots.len(),
        max_connections = config.pool.max_connections,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(stream_url = %config.venue.url, "WebSocket endpoint");
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
