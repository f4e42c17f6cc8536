//! Connection Lifecycle Types
//!
//! Identity, lifecycle state machine and pool-side bookkeeping for a single
//! streaming connection.
//!
//! # State Machine
//!
//! ```text
//! disconnected ──► connecting ──► connected ──► disconnected
//!      ▲               │              │
//!      │               ▼              ▼
//!      └────────────  error ◄─────────┘
//!                      │  ▲
//!                      ▼  │ (reconnect attempt)
//!                   failed  connecting
//! ```
//!
//! `failed` is terminal for the reconnection policy; only an explicit
//! disconnect moves it back to `disconnected`.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::streaming::Symbol;

// =============================================================================
// Connection Identity
// =============================================================================

/// Identifier of a connection within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(u16);

impl ConnectionId {
    /// Create a connection identifier.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection_{}", self.0)
    }
}

// =============================================================================
// Connection Status
// =============================================================================

/// Lifecycle status of a streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No socket open.
    #[default]
    Disconnected,
    /// Opening the socket or authenticating.
    Connecting,
    /// Authenticated and streaming.
    Connected,
    /// Session lost or attempt failed; may be retried.
    Error,
    /// Reconnection attempts exhausted.
    Failed,
}

impl ConnectionStatus {
    /// Get the status name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
            Self::Failed => "failed",
        }
    }

    /// Parse a status name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "disconnected" => Some(Self::Disconnected),
            "connecting" => Some(Self::Connecting),
            "connected" => Some(Self::Connected),
            "error" => Some(Self::Error),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected | Self::Error, Self::Connecting)
                | (
                    Self::Connecting,
                    Self::Connected | Self::Error | Self::Disconnected
                )
                | (Self::Connected, Self::Disconnected | Self::Error)
                | (Self::Error, Self::Failed | Self::Disconnected)
                | (Self::Failed, Self::Disconnected)
        )
    }

    /// Check if this is the connected state.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if this is the terminal failed state.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Connection Record
// =============================================================================

/// Pool-side bookkeeping for one connection.
///
/// Owned exclusively by the pool and mutated only under the pool lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Display name.
    pub name: String,
    /// Last known lifecycle status.
    pub status: ConnectionStatus,
    /// Tickers routed to this connection.
    pub assigned_tickers: BTreeSet<Symbol>,
    /// Ticks aggregated from this connection.
    pub message_count: u64,
    /// Transitions into `error`: one per failed attempt or lost session.
    pub error_count: u64,
    /// Wall-clock time of the last aggregated tick.
    pub last_message_time: Option<DateTime<Utc>>,
}

impl ConnectionRecord {
    /// Create a record in the `disconnected` state.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        name: impl Into<String>,
        tickers: impl IntoIterator<Item = Symbol>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            status: ConnectionStatus::Disconnected,
            assigned_tickers: tickers.into_iter().collect(),
            message_count: 0,
            error_count: 0,
            last_message_time: None,
        }
    }

    /// Apply a status reported by the connection.
    ///
    /// Returns `false` (and leaves the record unchanged) for an illegal
    /// transition. Re-applying the current status is accepted as a no-op.
    pub fn apply_status(&mut self, next: ConnectionStatus) -> bool {
        if self.status == next {
            return true;
        }
        if !self.status.can_transition_to(next) {
            return false;
        }
        if next == ConnectionStatus::Error {
            self.error_count += 1;
        }
        self.status = next;
        true
    }

    /// Count one aggregated tick.
    pub fn record_message(&mut self, at: DateTime<Utc>) {
        self.message_count += 1;
        self.last_message_time = Some(at);
    }
}
