//! Streaming Connection
//!
//! Owns one venue socket's complete lifecycle: connect, authenticate,
//! subscribe/unsubscribe, parse inbound frames, and reconnect with backoff.
//!
//! # Lifecycle
//!
//! ```text
//! disconnected -> connecting -> connected -> (disconnected | error)
//! error -> connecting            (reconnect policy permits another attempt)
//! error -> failed                (attempts exhausted, terminal)
//! ```
//!
//! # Concurrency
//!
//! Each established session is served by one spawned task that exclusively
//! reads frames and writes control frames. Callers never touch the socket:
//! `subscribe`/`unsubscribe` record the symbols in the `SubscriptionSet`
//! and enqueue frames for the task, so they never wait on the venue.
//!
//! The status, the `SubscriptionSet` and the outbound queue each sit behind
//! their own `parking_lot::Mutex`; none is held across an `.await`, and
//! callbacks are invoked only after every lock is released. The outbound
//! queue lock is only ever taken while holding the subscriptions lock or
//! on its own.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::auth::{AuthError, AuthHandler, Credentials};
use super::codec::{CodecError, FrameCodec};
use super::messages::{ControlRequest, StatusKind, StreamChannel, VenueMessage};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{
    ConnectionCallbacks, Connector, FrameSink, FrameStream, StatusData, TransportError,
};
use crate::domain::connection::{ConnectionId, ConnectionStatus};
use crate::domain::streaming::Symbol;
use crate::domain::subscription::SubscriptionSet;
use crate::infrastructure::metrics::{self, DropReason};

/// Upper bound for closing a socket during teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// Error Type
// =============================================================================

/// Reasons a connection attempt fails.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Venue rejected authentication.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Control frame could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Handshake did not finish in time.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// Socket closed before authentication completed.
    #[error("connection closed during handshake")]
    ClosedDuringHandshake,

    /// Connection is terminally failed and must be disconnected first.
    #[error("connection has failed; disconnect before reconnecting")]
    Failed,
}

impl ConnectError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Auth(_) => "auth",
            Self::Codec(_) => "codec",
            Self::Timeout(_) => "timeout",
            Self::ClosedDuringHandshake => "closed",
            Self::Failed => "failed",
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for one streaming connection.
#[derive(Debug, Clone)]
pub struct StreamConnectionConfig {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Display name.
    pub name: String,
    /// Venue WebSocket URL.
    pub url: String,
    /// Venue credential.
    pub credentials: Credentials,
    /// Source name stamped on every tick.
    pub source: String,
    /// Channels subscribed per symbol.
    pub channels: Vec<StreamChannel>,
    /// Bound on one connect + authenticate handshake.
    pub connect_timeout: Duration,
    /// Reconnection backoff.
    pub reconnect: ReconnectConfig,
}

impl StreamConnectionConfig {
    /// Create a configuration with default channels, timeout and backoff.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        name: impl Into<String>,
        url: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            credentials,
            source: "polygon".to_string(),
            channels: StreamChannel::DEFAULT.to_vec(),
            connect_timeout: Duration::from_secs(15),
            reconnect: ReconnectConfig::default(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Point-in-time connection statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Ticks delivered to the tick callback.
    pub messages: u64,
    /// Frames or elements dropped.
    pub dropped_frames: u64,
    /// Failed connection attempts and lost sessions.
    pub connection_errors: u64,
    /// Reconnect attempts since the last established session.
    pub reconnect_attempts: u32,
    /// Wall-clock time of the last delivered tick.
    pub last_message_time: Option<DateTime<Utc>>,
}

// =============================================================================
// Shared State
// =============================================================================

/// An authenticated socket plus the queue feeding its writer.
struct Session {
    sink: FrameSink,
    stream: FrameStream,
    commands: mpsc::UnboundedReceiver<String>,
}

/// How a session ended.
enum SessionEnd {
    Cancelled,
    Lost(String),
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// State shared between the caller-facing handle and the session task.
struct Shared {
    config: StreamConnectionConfig,
    connector: Arc<dyn Connector>,
    codec: FrameCodec,
    callbacks: ConnectionCallbacks,
    status: Mutex<ConnectionStatus>,
    subscriptions: Mutex<SubscriptionSet>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    last_message_time: Mutex<Option<DateTime<Utc>>>,
    messages: AtomicU64,
    dropped_frames: AtomicU64,
    connection_errors: AtomicU64,
    reconnect_attempts: AtomicU32,
}

impl Shared {
    fn id(&self) -> ConnectionId {
        self.config.id
    }

    fn status(&self) -> ConnectionStatus {
        *self.status.lock()
    }

    /// Move to `next` if legal, then report it.
    fn set_status(&self, next: ConnectionStatus, data: StatusData) -> bool {
        let previous = {
            let mut status = self.status.lock();
            let previous = *status;
            if previous == next {
                return true;
            }
            if !previous.can_transition_to(next) {
                tracing::warn!(
                    connection = %self.id(),
                    from = %previous,
                    to = %next,
                    "Ignoring illegal status transition"
                );
                return false;
            }
            *status = next;
            previous
        };

        tracing::info!(
            connection = %self.id(),
            name = %self.config.name,
            from = %previous,
            status = %next,
            "Connection status changed"
        );
        metrics::set_connection_status(self.id(), next);

        let callback = AssertUnwindSafe(|| self.callbacks.status.invoke(next.as_str(), data));
        if catch_unwind(callback).is_err() {
            tracing::error!(connection = %self.id(), status = %next, "Status callback panicked");
            self.drop_frame(DropReason::CallbackPanic);
        }
        true
    }

    fn drop_frame(&self, reason: DropReason) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
        metrics::record_frame_dropped(self.id(), reason);
    }

    fn record_error(&self, error: &ConnectError) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
        metrics::record_connection_error(self.id(), error.kind());
    }

    // -------------------------------------------------------------------------
    // Handshake
    // -------------------------------------------------------------------------

    /// Open the socket and authenticate. The socket is closed on failure.
    async fn establish(&self) -> Result<(FrameSink, FrameStream), ConnectError> {
        tracing::info!(connection = %self.id(), url = %self.config.url, "Connecting to venue");

        let (mut sink, mut stream) = self.connector.open(&self.config.url).await?;
        let mut auth = AuthHandler::new(self.config.credentials.clone());

        match self.authenticate(&mut auth, &mut sink, &mut stream).await {
            Ok(()) => Ok((sink, stream)),
            Err(e) => {
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
                Err(e)
            }
        }
    }

    async fn authenticate(
        &self,
        auth: &mut AuthHandler,
        sink: &mut FrameSink,
        stream: &mut FrameStream,
    ) -> Result<(), ConnectError> {
        while let Some(frame) = stream.next().await {
            let text = frame?;
            let elements = match self.codec.decode(&text) {
                Ok(elements) => elements,
                Err(e) => {
                    tracing::warn!(connection = %self.id(), error = %e, "Dropping malformed handshake frame");
                    self.drop_frame(DropReason::Malformed);
                    continue;
                }
            };

            for element in elements {
                let Ok(VenueMessage::Status(status)) = element else {
                    continue;
                };
                if auth.on_status(&status)? {
                    tracing::info!(connection = %self.id(), "Authenticated");
                    return Ok(());
                }
                if auth.state().can_authenticate() {
                    let request = auth.create_auth_request();
                    sink.send(self.codec.encode(&request)?).await?;
                }
            }
        }
        Err(ConnectError::ClosedDuringHandshake)
    }

    /// Mark an authenticated socket live and replay every known subscription.
    fn activate(&self, sink: FrameSink, stream: FrameStream) -> Session {
        let (tx, commands) = mpsc::unbounded_channel();
        let replayed = {
            let mut subscriptions = self.subscriptions.lock();
            subscriptions.mark_all_pending();
            let symbols = subscriptions.symbols();
            for symbol in &symbols {
                self.enqueue(&tx, ControlRequest::subscribe(symbol, &self.config.channels));
            }
            *self.outbound.lock() = Some(tx);
            symbols.len()
        };

        self.reconnect_attempts.store(0, Ordering::Relaxed);
        self.set_status(ConnectionStatus::Connected, StatusData::new());
        if replayed > 0 {
            tracing::info!(connection = %self.id(), symbols = replayed, "Replayed subscriptions");
        }

        Session {
            sink,
            stream,
            commands,
        }
    }

    fn enqueue(&self, tx: &mpsc::UnboundedSender<String>, request: ControlRequest) {
        match self.codec.encode(&request) {
            Ok(frame) => {
                // A closed queue means the session is gone; the symbol stays
                // in the set and is replayed on the next session.
                let _ = tx.send(frame);
            }
            Err(e) => {
                tracing::error!(connection = %self.id(), error = %e, "Failed to encode control frame");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Session Task
    // -------------------------------------------------------------------------

    /// Serve sessions until cancelled or the reconnect policy gives up.
    ///
    /// Without an initial session the task starts in backoff.
    async fn run(self: Arc<Self>, initial: Option<Session>, cancel: CancellationToken) {
        let mut session = match initial {
            Some(session) => session,
            None => match self.reconnect(&cancel).await {
                Some(session) => session,
                None => return,
            },
        };

        loop {
            let reason = match self.pump(&mut session, &cancel).await {
                SessionEnd::Cancelled => {
                    let _ = tokio::time::timeout(CLOSE_TIMEOUT, session.sink.close()).await;
                    tracing::debug!(connection = %self.id(), "Session task cancelled");
                    return;
                }
                SessionEnd::Lost(reason) => reason,
            };

            self.outbound.lock().take();
            self.connection_errors.fetch_add(1, Ordering::Relaxed);
            metrics::record_connection_error(self.id(), "session_lost");
            tracing::warn!(connection = %self.id(), error = %reason, "Venue session lost");
            self.set_status(ConnectionStatus::Error, error_data(&reason));

            match self.reconnect(&cancel).await {
                Some(next) => session = next,
                None => return,
            }
        }
    }

    /// Retry with backoff until a session is established.
    ///
    /// Returns `None` when cancelled or when the attempts run out, in which
    /// case the connection is left `failed`.
    async fn reconnect(&self, cancel: &CancellationToken) -> Option<Session> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());
        loop {
            let Some(delay) = policy.next_delay() else {
                let attempts = policy.attempt_count();
                tracing::error!(
                    connection = %self.id(),
                    attempts,
                    "Reconnect attempts exhausted"
                );
                let mut data = StatusData::new();
                data.insert("attempts".to_string(), json!(attempts));
                self.set_status(ConnectionStatus::Failed, data);
                return None;
            };

            let attempt = policy.attempt_count();
            self.reconnect_attempts.store(attempt, Ordering::Relaxed);
            metrics::record_reconnect_attempt(self.id());
            tracing::info!(
                connection = %self.id(),
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting to venue"
            );

            tokio::select! {
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(delay) => {}
            }

            self.set_status(ConnectionStatus::Connecting, StatusData::new());
            let result = tokio::select! {
                () = cancel.cancelled() => return None,
                result = tokio::time::timeout(self.config.connect_timeout, self.establish()) => result,
            };
            let error = match result {
                Ok(Ok((sink, stream))) => return Some(self.activate(sink, stream)),
                Ok(Err(e)) => e,
                Err(_) => ConnectError::Timeout(self.config.connect_timeout),
            };

            self.record_error(&error);
            tracing::warn!(connection = %self.id(), attempt, error = %error, "Reconnect attempt failed");
            self.set_status(ConnectionStatus::Error, error_data(&error.to_string()));
        }
    }

    /// Read frames and write queued control frames until the session ends.
    async fn pump(&self, session: &mut Session, cancel: &CancellationToken) -> SessionEnd {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return SessionEnd::Cancelled,
                Some(frame) = session.commands.recv() => {
                    if let Err(e) = session.sink.send(frame).await {
                        return SessionEnd::Lost(e.to_string());
                    }
                }
                next = session.stream.next() => match next {
                    Some(Ok(text)) => self.handle_frame(&text),
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                    None => return SessionEnd::Lost(TransportError::Closed.to_string()),
                },
            }
        }
    }

    // -------------------------------------------------------------------------
    // Inbound Frames
    // -------------------------------------------------------------------------

    fn handle_frame(&self, text: &str) {
        let started = Instant::now();
        match self.codec.decode(text) {
            Ok(elements) => {
                for element in elements {
                    match element {
                        Ok(message) => self.handle_message(message),
                        Err(e) => {
                            tracing::warn!(connection = %self.id(), error = %e, "Dropping frame element");
                            self.drop_frame(DropReason::InvalidElement);
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(connection = %self.id(), error = %e, "Dropping malformed frame");
                self.drop_frame(DropReason::Malformed);
            }
        }
        metrics::record_processing_duration(self.id(), started.elapsed());
    }

    fn handle_message(&self, message: VenueMessage) {
        metrics::record_frame_received(self.id(), message.kind());

        if let VenueMessage::Status(status) = &message {
            match status.kind() {
                StatusKind::Subscribed(symbols) => {
                    let mut subscriptions = self.subscriptions.lock();
                    for symbol in &symbols {
                        subscriptions.confirm(symbol);
                    }
                    drop(subscriptions);
                    tracing::debug!(connection = %self.id(), symbols = ?symbols, "Subscription confirmed");
                }
                StatusKind::Unsubscribed(symbols) => {
                    tracing::debug!(connection = %self.id(), symbols = ?symbols, "Unsubscription confirmed");
                }
                StatusKind::Error(message) => {
                    tracing::warn!(connection = %self.id(), message = %message, "Venue reported error");
                }
                other => {
                    tracing::debug!(connection = %self.id(), status = ?other, "Ignoring status message");
                }
            }
            return;
        }

        let Some(tick) = message.to_tick(&self.config.source) else {
            tracing::warn!(connection = %self.id(), "Dropping market event without symbol");
            self.drop_frame(DropReason::InvalidTick);
            return;
        };

        let event_type = tick.event_type();
        let dispatch = AssertUnwindSafe(|| self.callbacks.tick.invoke(tick));
        if catch_unwind(dispatch).is_err() {
            tracing::error!(connection = %self.id(), "Tick callback panicked");
            self.drop_frame(DropReason::CallbackPanic);
            return;
        }

        self.messages.fetch_add(1, Ordering::Relaxed);
        *self.last_message_time.lock() = Some(Utc::now());
        metrics::record_tick(self.id(), event_type);
    }
}

fn error_data(reason: &str) -> StatusData {
    let mut data = StatusData::new();
    data.insert("error".to_string(), json!(reason));
    data
}

// =============================================================================
// Stream Connection
// =============================================================================

/// One venue connection.
///
/// Cheap handle over shared state; the session task holds the other
/// reference while a session is live.
pub struct StreamConnection {
    shared: Arc<Shared>,
    worker: tokio::sync::Mutex<Option<Worker>>,
}

impl std::fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("id", &self.shared.id())
            .field("name", &self.shared.config.name)
            .field("status", &self.shared.status())
            .finish_non_exhaustive()
    }
}

impl StreamConnection {
    /// Create a disconnected connection.
    #[must_use]
    pub fn new(
        config: StreamConnectionConfig,
        connector: Arc<dyn Connector>,
        callbacks: ConnectionCallbacks,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                codec: FrameCodec::new(),
                callbacks,
                status: Mutex::new(ConnectionStatus::Disconnected),
                subscriptions: Mutex::new(SubscriptionSet::default()),
                outbound: Mutex::new(None),
                last_message_time: Mutex::new(None),
                messages: AtomicU64::new(0),
                dropped_frames: AtomicU64::new(0),
                connection_errors: AtomicU64::new(0),
                reconnect_attempts: AtomicU32::new(0),
            }),
            worker: tokio::sync::Mutex::new(None),
        }
    }

    /// Connection identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.shared.id()
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    /// Snapshot of the subscription set.
    #[must_use]
    pub fn subscriptions(&self) -> SubscriptionSet {
        self.shared.subscriptions.lock().clone()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            messages: self.shared.messages.load(Ordering::Relaxed),
            dropped_frames: self.shared.dropped_frames.load(Ordering::Relaxed),
            connection_errors: self.shared.connection_errors.load(Ordering::Relaxed),
            reconnect_attempts: self.shared.reconnect_attempts.load(Ordering::Relaxed),
            last_message_time: *self.shared.last_message_time.lock(),
        }
    }

    /// Connect, authenticate and start the session task.
    ///
    /// Waits until authenticated, rejected, or `connect_timeout` elapses.
    /// On success every symbol already in the subscription set is
    /// (re)subscribed. On failure no socket stays open, the connection is
    /// left in `error` and the session task retries under the reconnect
    /// policy until a session is established or the attempts run out.
    ///
    /// Returns `true` if the connection is connected afterwards. While a
    /// session task is running (connected or reconnecting) this is a no-op
    /// reporting the current state.
    pub async fn connect(&self) -> bool {
        match self.try_connect().await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::warn!(connection = %self.id(), error = %e, "Connect failed");
                false
            }
        }
    }

    async fn try_connect(&self) -> Result<bool, ConnectError> {
        let mut worker = self.worker.lock().await;
        if let Some(running) = worker.as_ref()
            && !running.handle.is_finished()
        {
            return Ok(self.status().is_connected());
        }
        if let Some(finished) = worker.take() {
            let _ = finished.handle.await;
        }

        if self.status().is_failed() {
            return Err(ConnectError::Failed);
        }
        if !self
            .shared
            .set_status(ConnectionStatus::Connecting, StatusData::new())
        {
            return Ok(false);
        }

        let timeout = self.shared.config.connect_timeout;
        let (initial, outcome) = match tokio::time::timeout(timeout, self.shared.establish()).await
        {
            Ok(Ok((sink, stream))) => (Some(self.shared.activate(sink, stream)), Ok(true)),
            Ok(Err(e)) => (None, Err(e)),
            Err(_) => (None, Err(ConnectError::Timeout(timeout))),
        };

        if let Err(error) = &outcome {
            self.shared.record_error(error);
            self.shared
                .set_status(ConnectionStatus::Error, error_data(&error.to_string()));
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&self.shared).run(initial, cancel.clone()));
        *worker = Some(Worker { cancel, handle });
        outcome
    }

    /// Close the socket, stop the session task and clear subscriptions.
    ///
    /// Idempotent: a second call leaves the connection `disconnected`
    /// without further effect. Also cancels a pending reconnect.
    pub async fn disconnect(&self) {
        let mut worker = self.worker.lock().await;
        if let Some(running) = worker.take() {
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                tracing::warn!(connection = %self.id(), error = %e, "Session task ended abnormally");
            }
        }

        self.shared.outbound.lock().take();
        self.shared.subscriptions.lock().clear();
        self.shared.reconnect_attempts.store(0, Ordering::Relaxed);

        if self.status() != ConnectionStatus::Disconnected {
            self.shared
                .set_status(ConnectionStatus::Disconnected, StatusData::new());
            tracing::info!(connection = %self.id(), "Disconnected");
        }
    }

    /// Add symbols to the subscription set and, while connected, send one
    /// subscribe frame per newly added symbol.
    ///
    /// Symbols already present are ignored. While not connected the symbols
    /// are only recorded and are subscribed on the next successful connect.
    /// Returns `false` only if the connection has failed.
    pub fn subscribe<I, S>(&self, symbols: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.status().is_failed() {
            tracing::warn!(connection = %self.id(), "Subscribe on failed connection");
            return false;
        }

        let mut subscriptions = self.shared.subscriptions.lock();
        let added = subscriptions.add(symbols);
        if let Some(tx) = self.shared.outbound.lock().as_ref() {
            for symbol in &added {
                self.shared.enqueue(
                    tx,
                    ControlRequest::subscribe(symbol, &self.shared.config.channels),
                );
            }
        }
        drop(subscriptions);

        if !added.is_empty() {
            tracing::debug!(connection = %self.id(), symbols = ?added, "Subscribed");
        }
        true
    }

    /// Remove symbols from the subscription set and, while connected, send
    /// one unsubscribe frame per removed symbol.
    ///
    /// Returns `false` only if the connection has failed.
    pub fn unsubscribe<I, S>(&self, symbols: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.status().is_failed() {
            tracing::warn!(connection = %self.id(), "Unsubscribe on failed connection");
            return false;
        }

        let mut subscriptions = self.shared.subscriptions.lock();
        let removed: Vec<Symbol> = subscriptions.remove(symbols);
        if let Some(tx) = self.shared.outbound.lock().as_ref() {
            for symbol in &removed {
                self.shared.enqueue(
                    tx,
                    ControlRequest::unsubscribe(symbol, &self.shared.config.channels),
                );
            }
        }
        drop(subscriptions);

        if !removed.is_empty() {
            tracing::debug!(connection = %self.id(), symbols = ?removed, "Unsubscribed");
        }
        true
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{StatusForward, TickForward};
    use crate::domain::streaming::TickRecord;
    use async_trait::async_trait;

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn open(&self, _url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
            Err(TransportError::Connect("refused".to_string()))
        }
    }

    fn connection(statuses: Arc<Mutex<Vec<String>>>) -> StreamConnection {
        let id = ConnectionId::new(1);
        let tick: Arc<TickForward> = Arc::new(|_: TickRecord, _: ConnectionId| {});
        let status: Arc<StatusForward> =
            Arc::new(move |s: &str, _: StatusData, _: ConnectionId| {
                statuses.lock().push(s.to_string());
            });
        let config = StreamConnectionConfig::new(
            id,
            "primary",
            "wss://venue.invalid/stocks",
            Credentials::new("key").unwrap(),
        );
        StreamConnection::new(
            config,
            Arc::new(RefusingConnector),
            ConnectionCallbacks::tagged(id, &tick, &status),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn failed_initial_connect_backs_off_until_failed() {
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let conn = connection(Arc::clone(&statuses));

        assert!(!conn.connect().await);
        assert_eq!(conn.status(), ConnectionStatus::Error);
        assert_eq!(conn.stats().connection_errors, 1);
        assert_eq!(*statuses.lock(), vec!["connecting", "error"]);

        // Default policy: ten attempts, capped at sixty seconds apart.
        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(conn.status(), ConnectionStatus::Failed);
        assert_eq!(conn.stats().connection_errors, 11);
        assert_eq!(conn.stats().reconnect_attempts, 10);
        assert_eq!(statuses.lock().last().map(String::as_str), Some("failed"));
    }

    #[tokio::test]
    async fn subscribe_while_disconnected_records_pending() {
        let conn = connection(Arc::new(Mutex::new(Vec::new())));

        assert!(conn.subscribe(["aapl", "MSFT", "AAPL"]));
        let subscriptions = conn.subscriptions();
        assert_eq!(subscriptions.symbols(), vec!["AAPL", "MSFT"]);
        assert_eq!(subscriptions.pending().len(), 2);

        assert!(conn.unsubscribe(["MSFT"]));
        assert_eq!(conn.subscriptions().symbols(), vec!["AAPL"]);
    }

    #[tokio::test]
    async fn disconnect_after_error_is_idempotent() {
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let conn = connection(Arc::clone(&statuses));
        let _ = conn.connect().await;

        conn.disconnect().await;
        conn.disconnect().await;

        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
        assert_eq!(*statuses.lock(), vec!["connecting", "error", "disconnected"]);
    }

    #[test]
    fn connect_error_kinds() {
        assert_eq!(ConnectError::Timeout(Duration::from_secs(1)).kind(), "timeout");
        assert_eq!(ConnectError::Auth(AuthError::Timeout).kind(), "auth");
        assert_eq!(ConnectError::ClosedDuringHandshake.kind(), "closed");
    }
}
