//! Prometheus Metrics Module
//!
//! Exposes pool metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ticks**: ticks delivered per connection and event type
//! - **Frames**: frames received by kind, elements dropped by reason
//! - **Connections**: per-connection status, errors and reconnect attempts
//! - **Pool**: connected/total connections and routed symbols
//! - **Latency**: frame processing time
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::{ConnectionId, ConnectionStatus};
use crate::domain::streaming::EventType;
use crate::infrastructure::venue::FrameKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling it again returns the already-installed handle.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed (for example when
/// another global recorder is already set).
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Data path
    describe_counter!(
        "market_stream_pool_ticks_total",
        "Ticks delivered to the tick callback"
    );
    describe_counter!(
        "market_stream_pool_frames_received_total",
        "Decoded frame elements by kind"
    );
    describe_counter!(
        "market_stream_pool_frames_dropped_total",
        "Frames or elements dropped by reason"
    );

    // Connections
    describe_gauge!(
        "market_stream_pool_connection_status",
        "Connection status (0 disconnected, 1 connecting, 2 connected, 3 error, 4 failed)"
    );
    describe_counter!(
        "market_stream_pool_connection_errors_total",
        "Connection-level errors by type"
    );
    describe_counter!(
        "market_stream_pool_reconnect_attempts_total",
        "Reconnection attempts"
    );

    // Pool
    describe_gauge!(
        "market_stream_pool_connections",
        "Configured connections by state"
    );
    describe_gauge!(
        "market_stream_pool_routed_symbols",
        "Symbols present in the routing table"
    );

    // Latency
    describe_histogram!(
        "market_stream_pool_frame_processing_seconds",
        "Time to decode and dispatch one inbound frame"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Reasons a frame or frame element is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Frame is not valid JSON.
    Malformed,
    /// Element could not be decoded or has an unknown event type.
    InvalidElement,
    /// Market event without a usable symbol.
    InvalidTick,
    /// Tick or status callback panicked.
    CallbackPanic,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::InvalidElement => "invalid_element",
            Self::InvalidTick => "invalid_tick",
            Self::CallbackPanic => "callback_panic",
        }
    }
}

const fn status_code(status: ConnectionStatus) -> f64 {
    match status {
        ConnectionStatus::Disconnected => 0.0,
        ConnectionStatus::Connecting => 1.0,
        ConnectionStatus::Connected => 2.0,
        ConnectionStatus::Error => 3.0,
        ConnectionStatus::Failed => 4.0,
    }
}

/// Record a tick delivered to the tick callback.
pub fn record_tick(connection: ConnectionId, event_type: EventType) {
    counter!(
        "market_stream_pool_ticks_total",
        "connection" => connection.to_string(),
        "event_type" => event_type.as_str()
    )
    .increment(1);
}

/// Record a decoded frame element.
pub fn record_frame_received(connection: ConnectionId, kind: FrameKind) {
    counter!(
        "market_stream_pool_frames_received_total",
        "connection" => connection.to_string(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a dropped frame or element.
pub fn record_frame_dropped(connection: ConnectionId, reason: DropReason) {
    counter!(
        "market_stream_pool_frames_dropped_total",
        "connection" => connection.to_string(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Update a connection's status gauge.
pub fn set_connection_status(connection: ConnectionId, status: ConnectionStatus) {
    gauge!(
        "market_stream_pool_connection_status",
        "connection" => connection.to_string()
    )
    .set(status_code(status));
}

/// Record a connection-level error.
pub fn record_connection_error(connection: ConnectionId, error_type: &str) {
    counter!(
        "market_stream_pool_connection_errors_total",
        "connection" => connection.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect_attempt(connection: ConnectionId) {
    counter!(
        "market_stream_pool_reconnect_attempts_total",
        "connection" => connection.to_string()
    )
    .increment(1);
}

/// Update pool connection gauges.
#[allow(clippy::cast_precision_loss)]
pub fn set_pool_connections(connected: usize, total: usize) {
    gauge!("market_stream_pool_connections", "state" => "connected").set(connected as f64);
    gauge!("market_stream_pool_connections", "state" => "total").set(total as f64);
}

/// Update the routed symbol gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_routed_symbols(count: usize) {
    gauge!("market_stream_pool_routed_symbols").set(count as f64);
}

/// Record frame processing duration.
pub fn record_processing_duration(connection: ConnectionId, duration: Duration) {
    histogram!(
        "market_stream_pool_frame_processing_seconds",
        "connection" => connection.to_string()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
