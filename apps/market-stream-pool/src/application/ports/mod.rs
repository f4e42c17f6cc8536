//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters and callers must satisfy.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Connector`: opens a text-frame transport to the venue
//! - `UniverseLookup`: read-only symbol universe resolution
//!
//! ## Driver Ports (Inbound)
//!
//! - `TickCallback` / `StatusCallback`: the caller's data and status sinks
//! - `TaggedCallback`: a forwarding function paired with the connection id
//!   it reports for

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Sink, Stream};

use crate::domain::connection::ConnectionId;
use crate::domain::streaming::{Symbol, TickRecord};

// =============================================================================
// Transport Port
// =============================================================================

/// Transport failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Could not open the connection.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    Receive(String),

    /// Peer closed the connection.
    #[error("connection closed")]
    Closed,
}

/// Outbound half of a venue transport.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of a venue transport.
///
/// The stream ending means the peer closed the connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Opens text-frame transports to the venue.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to `url`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connect` if the connection cannot be opened.
    async fn open(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError>;
}

// =============================================================================
// Universe Lookup Port
// =============================================================================

/// Read-only resolution of a named universe to its ticker symbols.
///
/// Loaded once at startup and only queried afterwards. Unknown keys
/// resolve to an empty list.
#[cfg_attr(test, mockall::automock)]
pub trait UniverseLookup: Send + Sync {
    /// Symbols belonging to the universe `key`.
    fn resolve(&self, key: &str) -> Vec<Symbol>;
}

// =============================================================================
// Callbacks
// =============================================================================

/// Status payload delivered with every status event.
pub type StatusData = serde_json::Map<String, serde_json::Value>;

/// Caller-supplied tick sink.
pub type TickCallback = Arc<dyn Fn(TickRecord) + Send + Sync>;

/// Caller-supplied status sink: `(status, data)`.
pub type StatusCallback = Arc<dyn Fn(&str, StatusData) + Send + Sync>;

/// Tick forwarding function taking the reporting connection's id.
pub type TickForward = dyn Fn(TickRecord, ConnectionId) + Send + Sync;

/// Status forwarding function taking the reporting connection's id.
pub type StatusForward = dyn Fn(&str, StatusData, ConnectionId) + Send + Sync;

/// A forwarding function tagged with the connection it reports for.
///
/// One forwarding function can be shared by every connection of a pool;
/// the tag supplies the id at call time.
pub struct TaggedCallback<F: ?Sized> {
    connection_id: ConnectionId,
    forward: Arc<F>,
}

impl<F: ?Sized> TaggedCallback<F> {
    /// Tag `forward` with `connection_id`.
    #[must_use]
    pub const fn new(connection_id: ConnectionId, forward: Arc<F>) -> Self {
        Self {
            connection_id,
            forward,
        }
    }
}

impl TaggedCallback<TickForward> {
    /// Forward a tick.
    pub fn invoke(&self, record: TickRecord) {
        (self.forward)(record, self.connection_id);
    }
}

impl TaggedCallback<StatusForward> {
    /// Forward a status event.
    pub fn invoke(&self, status: &str, data: StatusData) {
        (self.forward)(status, data, self.connection_id);
    }
}

impl<F: ?Sized> Clone for TaggedCallback<F> {
    fn clone(&self) -> Self {
        Self {
            connection_id: self.connection_id,
            forward: Arc::clone(&self.forward),
        }
    }
}

impl<F: ?Sized> fmt::Debug for TaggedCallback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedCallback")
            .field("connection_id", &self.connection_id)
            .finish_non_exhaustive()
    }
}

/// Tagged tick and status callbacks handed to one streaming connection.
#[derive(Debug, Clone)]
pub struct ConnectionCallbacks {
    /// Tick forwarding.
    pub tick: TaggedCallback<TickForward>,
    /// Status forwarding.
    pub status: TaggedCallback<StatusForward>,
}

impl ConnectionCallbacks {
    /// Tag shared forwarding functions with `connection_id`.
    #[must_use]
    pub fn tagged(
        connection_id: ConnectionId,
        tick: &Arc<TickForward>,
        status: &Arc<StatusForward>,
    ) -> Self {
        Self {
            tick: TaggedCallback::new(connection_id, Arc::clone(tick)),
            status: TaggedCallback::new(connection_id, Arc::clone(status)),
        }
    }
}
