//! Application Services
//!
//! Health reporting shared by every backend. Both the single-connection
//! backend and the pool produce a `HealthSnapshot` through `HealthSource`;
//! the reporter and HTTP server consume it without knowing which one is
//! behind it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::connection::{ConnectionId, ConnectionStatus};

// =============================================================================
// Adapter Mode
// =============================================================================

/// Which backend the adapter runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterMode {
    /// One streaming connection.
    Single,
    /// A connection pool.
    Pool,
    /// No credential: nothing ever connects.
    NoClient,
}

impl AdapterMode {
    /// Mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Pool => "pool",
            Self::NoClient => "no_client",
        }
    }
}

impl std::fmt::Display for AdapterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Health Snapshot
// =============================================================================

/// Overall health derived from connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every connection is connected.
    Healthy,
    /// Some connections are connected.
    Degraded,
    /// No connection is connected.
    Unhealthy,
}

impl HealthStatus {
    /// Derive status from connected/total counts.
    #[must_use]
    pub const fn from_counts(connected: usize, total: usize) -> Self {
        if total > 0 && connected == total {
            Self::Healthy
        } else if connected > 0 {
            Self::Degraded
        } else {
            Self::Unhealthy
        }
    }

    /// Status name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// Health of one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionHealth {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: ConnectionStatus,
    /// Tickers routed to the connection.
    pub ticker_count: usize,
    /// Ticks delivered.
    pub message_count: u64,
    /// Connection-level errors.
    pub error_count: u64,
    /// Frames or elements dropped (malformed, unknown, callback panic).
    pub dropped_frames: u64,
    /// Reconnect attempts since the last established session.
    pub reconnect_attempts: u32,
    /// Wall-clock time of the last tick.
    pub last_message_time: Option<DateTime<Utc>>,
}

/// Aggregate and per-connection health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    /// Backend mode.
    pub mode: AdapterMode,
    /// Overall status.
    pub status: HealthStatus,
    /// Configured connections.
    pub total_connections: usize,
    /// Connections currently connected.
    pub connected_connections: usize,
    /// Tickers across all connections.
    pub total_tickers: usize,
    /// Ticks across all connections.
    pub total_messages: u64,
    /// Errors across all connections.
    pub total_errors: u64,
    /// When the snapshot was taken.
    pub generated_at: DateTime<Utc>,
    /// Per-connection detail, ordered by id.
    pub connections: Vec<ConnectionHealth>,
}

impl HealthSnapshot {
    /// Build a snapshot, computing totals from `connections`.
    #[must_use]
    pub fn new(mode: AdapterMode, mut connections: Vec<ConnectionHealth>) -> Self {
        connections.sort_by_key(|c| c.id);
        let connected_connections = connections
            .iter()
            .filter(|c| c.status.is_connected())
            .count();
        let total_connections = connections.len();

        Self {
            mode,
            status: HealthStatus::from_counts(connected_connections, total_connections),
            total_connections,
            connected_connections,
            total_tickers: connections.iter().map(|c| c.ticker_count).sum(),
            total_messages: connections.iter().map(|c| c.message_count).sum(),
            total_errors: connections.iter().map(|c| c.error_count).sum(),
            generated_at: Utc::now(),
            connections,
        }
    }

    /// Snapshot with no connections.
    #[must_use]
    pub fn empty(mode: AdapterMode) -> Self {
        Self::new(mode, Vec::new())
    }

    /// Check if at least one connection is connected.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.connected_connections > 0
    }
}

/// Anything that can report its health.
pub trait HealthSource: Send + Sync {
    /// Take a health snapshot. Only briefly locks shared state.
    fn health_snapshot(&self) -> HealthSnapshot;
}
