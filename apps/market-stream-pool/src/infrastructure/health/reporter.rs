//! Health Reporter
//!
//! Periodically snapshots adapter health, logs it, refreshes the pool
//! gauges, and hands the snapshot to an optional sink.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::services::{HealthSnapshot, HealthSource, HealthStatus};
use crate::infrastructure::metrics;

/// Receives every periodic snapshot.
pub type SnapshotSink = Arc<dyn Fn(&HealthSnapshot) + Send + Sync>;

/// Periodic health reporting task.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use market_stream_pool::application::services::HealthSource;
/// use market_stream_pool::infrastructure::health::HealthReporter;
/// use tokio_util::sync::CancellationToken;
///
/// async fn example(source: Arc<dyn HealthSource>) {
///     let cancel = CancellationToken::new();
///     let reporter = HealthReporter::new(source, Duration::from_secs(30), cancel.clone())
///         .with_sink(Arc::new(|snapshot| println!("{}", snapshot.status.as_str())));
///
///     tokio::spawn(reporter.run());
///     cancel.cancel();
/// }
/// ```
pub struct HealthReporter {
    source: Arc<dyn HealthSource>,
    interval: Duration,
    sink: Option<SnapshotSink>,
    cancel: CancellationToken,
}

impl HealthReporter {
    /// Create a reporter without a sink.
    #[must_use]
    pub fn new(source: Arc<dyn HealthSource>, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            source,
            interval,
            sink: None,
            cancel,
        }
    }

    /// Forward every snapshot to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: SnapshotSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Report once immediately, then every interval until cancelled.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Health reporter cancelled");
                    break;
                }
                _ = interval.tick() => {
                    self.report();
                }
            }
        }
    }

    /// Take, log, and forward one snapshot.
    pub fn report(&self) -> HealthSnapshot {
        let snapshot = self.source.health_snapshot();

        metrics::set_pool_connections(snapshot.connected_connections, snapshot.total_connections);
        match snapshot.status {
            HealthStatus::Healthy => tracing::info!(
                mode = %snapshot.mode,
                connected = snapshot.connected_connections,
                total = snapshot.total_connections,
                tickers = snapshot.total_tickers,
                messages = snapshot.total_messages,
                "Stream health: healthy"
            ),
            HealthStatus::Degraded | HealthStatus::Unhealthy => tracing::warn!(
                mode = %snapshot.mode,
                status = snapshot.status.as_str(),
                connected = snapshot.connected_connections,
                total = snapshot.total_connections,
                errors = snapshot.total_errors,
                "Stream health degraded"
            ),
        }
        for connection in &snapshot.connections {
            tracing::debug!(
                connection = %connection.id,
                name = %connection.name,
                status = %connection.status,
                tickers = connection.ticker_count,
                messages = connection.message_count,
                errors = connection.error_count,
                dropped = connection.dropped_frames,
                "Connection health"
            );
        }

        if let Some(sink) = &self.sink {
            sink(&snapshot);
        }
        snapshot
    }
}
