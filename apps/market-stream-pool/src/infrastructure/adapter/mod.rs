//! Market Data Adapter
//!
//! One stable surface over a single streaming connection or a connection
//! pool. Callers hand over their tick and status callbacks once; the mode is
//! chosen at construction from configuration and cannot be observed through
//! the callbacks.
//!
//! Without a venue credential the adapter runs in no-client mode: every
//! `connect` returns `false` and the caller is expected to pick another data
//! path.

use std::sync::Arc;

use serde_json::json;

use crate::application::ports::{
    ConnectionCallbacks, Connector, StatusCallback, StatusData, StatusForward, TickCallback,
    TickForward, UniverseLookup,
};
use crate::application::services::{
    AdapterMode, ConnectionHealth, HealthSnapshot, HealthSource,
};
use crate::domain::connection::ConnectionId;
use crate::domain::streaming::{Symbol, TickRecord, normalize_symbol};
use crate::infrastructure::config::{ConnectionMode, SlotConfig, StreamConfig};
use crate::infrastructure::pool::ConnectionPool;
use crate::infrastructure::venue::StreamConnection;

/// Id of the connection backing single mode, and of the slot seeded in
/// pool mode when no slot is configured.
const PRIMARY_ID: u16 = 1;

enum Backend {
    NoClient,
    Single(Arc<StreamConnection>),
    Pool(ConnectionPool),
}

/// Facade over the single-connection and pool backends.
pub struct MarketDataAdapter {
    backend: Backend,
}

impl std::fmt::Debug for MarketDataAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataAdapter")
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

impl MarketDataAdapter {
    /// Build the adapter for `config`.
    ///
    /// Pool mode configures the pool from `config.pool.slots` right away;
    /// nothing connects until `connect` is called.
    #[must_use]
    pub fn new(
        config: &StreamConfig,
        connector: Arc<dyn Connector>,
        universe: Arc<dyn UniverseLookup>,
        on_tick: TickCallback,
        on_status: StatusCallback,
    ) -> Self {
        let primary = ConnectionId::new(PRIMARY_ID);
        let Some(template) = config.connection_config(primary, primary.to_string()) else {
            tracing::warn!("No venue credential configured; market data adapter disabled");
            return Self {
                backend: Backend::NoClient,
            };
        };

        let backend = match config.mode {
            ConnectionMode::Single => {
                let name = template.name.clone();
                let tick: Arc<TickForward> =
                    Arc::new(move |record: TickRecord, _: ConnectionId| on_tick(record));
                let status: Arc<StatusForward> = Arc::new(
                    move |status: &str, mut data: StatusData, id: ConnectionId| {
                        data.insert("connection_id".to_string(), json!(id.get()));
                        data.insert("connection_name".to_string(), json!(name));
                        on_status(status, data);
                    },
                );
                let connection = StreamConnection::new(
                    template,
                    connector,
                    ConnectionCallbacks::tagged(primary, &tick, &status),
                );
                Backend::Single(Arc::new(connection))
            }
            ConnectionMode::Pool => {
                let pool = ConnectionPool::new(
                    &config.pool,
                    template,
                    connector,
                    universe,
                    on_tick,
                    on_status,
                );
                if !config.pool.slots.is_empty() {
                    pool.configure(&config.pool.slots);
                }
                Backend::Pool(pool)
            }
        };

        let adapter = Self { backend };
        tracing::info!(mode = %adapter.mode(), "Market data adapter created");
        adapter
    }

    /// Backend mode.
    #[must_use]
    pub const fn mode(&self) -> AdapterMode {
        match self.backend {
            Backend::NoClient => AdapterMode::NoClient,
            Backend::Single(_) => AdapterMode::Single,
            Backend::Pool(_) => AdapterMode::Pool,
        }
    }

    /// Connect and stream `symbols`.
    ///
    /// In pool mode the configured slots connect first and any passed symbol
    /// not already routed is routed afterwards; with no slot configured, one
    /// slot is seeded from `symbols`. Returns `true` if at least one
    /// connection is connected. Always `false` in no-client mode.
    pub async fn connect<S: AsRef<str>>(&self, symbols: &[S]) -> bool {
        let symbols: Vec<Symbol> = symbols
            .iter()
            .filter_map(|s| normalize_symbol(s.as_ref()))
            .collect();

        match &self.backend {
            Backend::NoClient => {
                tracing::warn!("connect called without a venue credential");
                false
            }
            Backend::Single(connection) => {
                connection.subscribe(&symbols);
                connection.connect().await
            }
            Backend::Pool(pool) => {
                if pool.connection_count() == 0 {
                    let seeded = pool.configure(&[SlotConfig::symbols(
                        PRIMARY_ID,
                        ConnectionId::new(PRIMARY_ID).to_string(),
                        &symbols,
                    )]);
                    tracing::info!(seeded, "No pool slot configured; seeded from connect symbols");
                }
                let connected = pool.connect_all().await;
                if connected && !pool.subscribe(&symbols) {
                    tracing::warn!("Some symbols could not be routed");
                }
                connected
            }
        }
    }

    /// Disconnect every connection. Idempotent.
    pub async fn disconnect(&self) {
        match &self.backend {
            Backend::NoClient => {}
            Backend::Single(connection) => connection.disconnect().await,
            Backend::Pool(pool) => pool.disconnect_all().await,
        }
    }

    /// Add symbols to the stream.
    ///
    /// Returns `false` in no-client mode or if a symbol could not be placed.
    pub fn subscribe<S: AsRef<str>>(&self, symbols: &[S]) -> bool {
        match &self.backend {
            Backend::NoClient => false,
            Backend::Single(connection) => connection.subscribe(symbols),
            Backend::Pool(pool) => pool.subscribe(symbols),
        }
    }

    /// Remove symbols from the stream.
    ///
    /// Returns `false` in no-client mode or if the single connection has
    /// failed. In pool mode the tickers are always unrouted.
    pub fn unsubscribe<S: AsRef<str>>(&self, symbols: &[S]) -> bool {
        match &self.backend {
            Backend::NoClient => false,
            Backend::Single(connection) => connection.unsubscribe(symbols),
            Backend::Pool(pool) => pool.unsubscribe(symbols),
        }
    }

    /// The pool backend, in pool mode.
    #[must_use]
    pub const fn pool(&self) -> Option<&ConnectionPool> {
        match &self.backend {
            Backend::Pool(pool) => Some(pool),
            _ => None,
        }
    }

    /// The connection backend, in single mode.
    #[must_use]
    pub fn connection(&self) -> Option<&Arc<StreamConnection>> {
        match &self.backend {
            Backend::Single(connection) => Some(connection),
            _ => None,
        }
    }
}

impl HealthSource for MarketDataAdapter {
    fn health_snapshot(&self) -> HealthSnapshot {
        match &self.backend {
            Backend::NoClient => HealthSnapshot::empty(AdapterMode::NoClient),
            Backend::Single(connection) => {
                let stats = connection.stats();
                let health = ConnectionHealth {
                    id: connection.id(),
                    name: connection.name().to_string(),
                    status: connection.status(),
                    ticker_count: connection.subscriptions().len(),
                    message_count: stats.messages,
                    error_count: stats.connection_errors,
                    dropped_frames: stats.dropped_frames,
                    reconnect_attempts: stats.reconnect_attempts,
                    last_message_time: stats.last_message_time,
                };
                HealthSnapshot::new(AdapterMode::Single, vec![health])
            }
            Backend::Pool(pool) => pool.health_snapshot(),
        }
    }
}
