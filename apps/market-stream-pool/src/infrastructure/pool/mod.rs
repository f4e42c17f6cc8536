//! Connection Pool
//!
//! Presents several `StreamConnection`s as one logical source.
//!
//! # Design
//!
//! - Each slot resolves to a ticker set (universe key or explicit list) and
//!   gets one connection. Tickers are routed to exactly one connection;
//!   duplicates across slots are dropped at configuration time, so the
//!   aggregator forwards ticks unchanged without de-duplication.
//! - Every connection reports through shared forwarding functions tagged
//!   with its id. The forwarders hold a `Weak` reference back to the pool.
//! - Records, the routing table and counters live behind one pool-level
//!   `parking_lot::Mutex`. Critical sections only touch that state: no
//!   network call, connection lock or caller callback runs while it is
//!   held. One lock is adequate for a handful of connections (account
//!   limits are typically 3); larger pools would need sharded state.
//!
//! # Failure Isolation
//!
//! A connection that drops reconnects on its own while the others keep
//! streaming. When it fails terminally its tickers are moved to the
//! remaining connected connections (if failover is enabled).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

use chrono::Utc;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde_json::json;

use crate::application::ports::{
    ConnectionCallbacks, Connector, StatusCallback, StatusData, StatusForward, TickCallback,
    TickForward, UniverseLookup,
};
use crate::application::services::{
    AdapterMode, ConnectionHealth, HealthSnapshot, HealthSource,
};
use crate::domain::connection::{ConnectionId, ConnectionRecord, ConnectionStatus};
use crate::domain::routing::{RouteCandidate, RoutingStrategy, RoutingTable};
use crate::domain::streaming::{Symbol, TickRecord, normalize_symbol};
use crate::infrastructure::config::{PoolSettings, SlotConfig, TickerSource};
use crate::infrastructure::metrics;
use crate::infrastructure::venue::{StreamConnection, StreamConnectionConfig};

// =============================================================================
// Pool State
// =============================================================================

/// State guarded by the pool lock.
#[derive(Debug, Default)]
struct PoolState {
    records: BTreeMap<ConnectionId, ConnectionRecord>,
    routing: RoutingTable,
}

impl PoolState {
    fn candidates(&self, exclude: Option<ConnectionId>) -> Vec<RouteCandidate> {
        self.records
            .values()
            .filter(|record| Some(record.id) != exclude)
            .map(|record| RouteCandidate {
                id: record.id,
                status: record.status,
                load: record.assigned_tickers.len(),
            })
            .collect()
    }

    /// Route `symbol` to `target`, detaching it from any previous owner.
    fn assign(&mut self, symbol: &Symbol, target: ConnectionId) {
        if let Some(previous) = self.routing.assign(symbol.clone(), target)
            && let Some(record) = self.records.get_mut(&previous)
        {
            record.assigned_tickers.remove(symbol);
        }
        if let Some(record) = self.records.get_mut(&target) {
            record.assigned_tickers.insert(symbol.clone());
        }
    }

    fn connected_count(&self) -> usize {
        self.records
            .values()
            .filter(|record| record.status.is_connected())
            .count()
    }

    fn publish_gauges(&self) {
        metrics::set_pool_connections(self.connected_count(), self.records.len());
        metrics::set_routed_symbols(self.routing.len());
    }
}

/// Per-connection subscribe batches computed under the pool lock.
type Batches = BTreeMap<ConnectionId, Vec<Symbol>>;

struct PoolInner {
    template: StreamConnectionConfig,
    max_connections: usize,
    failover: bool,
    parallel_connect: bool,
    connector: Arc<dyn Connector>,
    universe: Arc<dyn UniverseLookup>,
    strategy: Box<dyn RoutingStrategy>,
    on_tick: TickCallback,
    on_status: StatusCallback,
    state: Mutex<PoolState>,
    connections: RwLock<BTreeMap<ConnectionId, Arc<StreamConnection>>>,
}

impl PoolInner {
    fn connection_list(&self) -> Vec<Arc<StreamConnection>> {
        self.connections.read().values().cloned().collect()
    }

    fn connection(&self, id: ConnectionId) -> Option<Arc<StreamConnection>> {
        self.connections.read().get(&id).cloned()
    }

    /// Count the tick, then hand it to the caller without the connection id.
    fn aggregate_tick(&self, record: TickRecord, connection_id: ConnectionId) {
        {
            let mut state = self.state.lock();
            if let Some(connection) = state.records.get_mut(&connection_id) {
                connection.record_message(Utc::now());
            }
        }
        (self.on_tick)(record);
    }

    /// Track the connection's status, then forward it enriched with the
    /// connection id and name.
    fn aggregate_status(&self, status: &str, mut data: StatusData, connection_id: ConnectionId) {
        let parsed = ConnectionStatus::parse(status);
        let name = {
            let mut state = self.state.lock();
            let name = state.records.get_mut(&connection_id).map(|record| {
                if let Some(next) = parsed
                    && !record.apply_status(next)
                {
                    tracing::warn!(
                        connection = %connection_id,
                        from = %record.status,
                        to = %next,
                        "Connection record rejected status"
                    );
                }
                record.name.clone()
            });
            state.publish_gauges();
            name
        };

        data.insert("connection_id".to_string(), json!(connection_id.get()));
        if let Some(name) = name {
            data.insert("connection_name".to_string(), json!(name));
        }
        (self.on_status)(status, data);

        if self.failover && parsed == Some(ConnectionStatus::Failed) {
            let moved = self.move_tickers(&[connection_id]);
            tracing::warn!(
                connection = %connection_id,
                moved,
                "Connection failed; tickers failed over"
            );
        }
    }

    /// Move tickers owned by `sources` onto other connected connections.
    ///
    /// Tickers with no eligible target stay where they are. Moved tickers
    /// are removed from the source's subscription set so a later reconnect
    /// does not replay them.
    fn move_tickers(&self, sources: &[ConnectionId]) -> usize {
        let mut batches = Batches::new();
        let mut released = Batches::new();
        let mut moved = 0;
        {
            let mut state = self.state.lock();
            for &source in sources {
                for ticker in state.routing.symbols_for(source) {
                    let candidates = state.candidates(Some(source));
                    let Some(target) = self.strategy.select(&ticker, &candidates) else {
                        continue;
                    };
                    state.assign(&ticker, target);
                    released.entry(source).or_default().push(ticker.clone());
                    batches.entry(target).or_default().push(ticker);
                    moved += 1;
                }
            }
            state.routing = RoutingTable::rebuild(state.records.values());
            state.publish_gauges();
        }

        for (id, symbols) in released {
            if let Some(connection) = self.connection(id) {
                // A failed connection keeps its set; it never reconnects.
                connection.unsubscribe(&symbols);
            }
        }
        self.send_subscribes(batches);
        moved
    }

    fn send_subscribes(&self, batches: Batches) {
        for (id, symbols) in batches {
            match self.connection(id) {
                Some(connection) => {
                    if !connection.subscribe(&symbols) {
                        tracing::warn!(connection = %id, symbols = ?symbols, "Connection refused subscribe");
                    }
                }
                None => tracing::warn!(connection = %id, "Routed to unknown connection"),
            }
        }
    }
}

// =============================================================================
// Connection Pool
// =============================================================================

/// Pool of streaming connections behind one tick and status callback.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("connections", &self.connection_count())
            .field("strategy", &self.inner.strategy.name())
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Create an empty pool.
    ///
    /// `template` supplies the venue endpoint, credential and backoff shared
    /// by every connection; its id and name are replaced per slot.
    #[must_use]
    pub fn new(
        settings: &PoolSettings,
        template: StreamConnectionConfig,
        connector: Arc<dyn Connector>,
        universe: Arc<dyn UniverseLookup>,
        on_tick: TickCallback,
        on_status: StatusCallback,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                template,
                max_connections: settings.max_connections,
                failover: settings.failover,
                parallel_connect: settings.parallel_connect,
                connector,
                universe,
                strategy: settings.routing.build(),
                on_tick,
                on_status,
                state: Mutex::new(PoolState::default()),
                connections: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    /// Configure connections from slots, replacing any previous
    /// configuration. Call while disconnected.
    ///
    /// At most `max_connections` slots are activated. Disabled slots and
    /// slots whose tickers resolve to nothing are skipped with a warning;
    /// a ticker already claimed by an earlier slot is dropped from later
    /// ones. Returns the number of configured connections.
    pub fn configure(&self, slots: &[SlotConfig]) -> usize {
        let inner = &self.inner;
        let weak = Arc::downgrade(inner);
        let tick_forward = tick_forwarder(weak.clone());
        let status_forward = status_forwarder(weak);

        let mut seen: BTreeSet<Symbol> = BTreeSet::new();
        let mut records = BTreeMap::new();
        let mut connections = BTreeMap::new();

        for slot in slots {
            if !slot.enabled {
                tracing::info!(connection = %slot.id, name = %slot.name, "Slot disabled");
                continue;
            }
            if records.len() >= inner.max_connections {
                tracing::warn!(
                    connection = %slot.id,
                    max_connections = inner.max_connections,
                    "Connection limit reached; slot skipped"
                );
                continue;
            }
            if records.contains_key(&slot.id) {
                tracing::warn!(connection = %slot.id, "Duplicate slot id; slot skipped");
                continue;
            }

            let resolved = match &slot.tickers {
                TickerSource::Universe(key) => inner.universe.resolve(key),
                TickerSource::Symbols(symbols) => symbols.clone(),
            };
            let mut tickers = Vec::new();
            for symbol in resolved.iter().filter_map(|s| normalize_symbol(s)) {
                if seen.insert(symbol.clone()) {
                    tickers.push(symbol);
                } else {
                    tracing::warn!(
                        connection = %slot.id,
                        ticker = %symbol,
                        "Ticker already assigned to another slot; dropped"
                    );
                }
            }
            if tickers.is_empty() {
                tracing::warn!(
                    connection = %slot.id,
                    name = %slot.name,
                    "Slot resolved to no tickers; skipped"
                );
                continue;
            }

            let config = StreamConnectionConfig {
                id: slot.id,
                name: slot.name.clone(),
                ..inner.template.clone()
            };
            let connection = StreamConnection::new(
                config,
                Arc::clone(&inner.connector),
                ConnectionCallbacks::tagged(slot.id, &tick_forward, &status_forward),
            );
            connection.subscribe(&tickers);

            tracing::info!(
                connection = %slot.id,
                name = %slot.name,
                tickers = tickers.len(),
                "Configured connection"
            );
            records.insert(
                slot.id,
                ConnectionRecord::new(slot.id, slot.name.clone(), tickers),
            );
            connections.insert(slot.id, Arc::new(connection));
        }

        let configured = records.len();
        {
            let mut state = inner.state.lock();
            state.routing = RoutingTable::rebuild(records.values());
            state.records = records;
            state.publish_gauges();
        }
        *inner.connections.write() = connections;

        if configured == 0 {
            tracing::warn!("No connection configured");
        }
        configured
    }

    /// Connect every configured connection.
    ///
    /// Each connection's subscription set is re-seeded from its assigned
    /// tickers first, so a disconnected pool can be connected again.
    /// Returns `true` if at least one connection is connected afterwards.
    /// A connection that could not connect retries in the background under
    /// its reconnect policy.
    pub async fn connect_all(&self) -> bool {
        let connections = self.inner.connection_list();
        if connections.is_empty() {
            tracing::warn!("connect_all with no configured connections");
            return false;
        }

        for connection in &connections {
            let tickers: Vec<Symbol> = self
                .inner
                .state
                .lock()
                .records
                .get(&connection.id())
                .map(|record| record.assigned_tickers.iter().cloned().collect())
                .unwrap_or_default();
            connection.subscribe(&tickers);
        }

        let results = if self.inner.parallel_connect {
            join_all(connections.iter().map(|connection| connection.connect())).await
        } else {
            let mut results = Vec::with_capacity(connections.len());
            for connection in &connections {
                results.push(connection.connect().await);
            }
            results
        };

        let connected = results.iter().filter(|ok| **ok).count();
        let total = connections.len();
        if connected == 0 {
            tracing::error!(total, "No connection could be established");
            return false;
        }

        if connected < total {
            // Unconnected connections keep retrying; failover moves their
            // tickers only once one of them fails for good.
            tracing::warn!(connected, total, "Pool running degraded");
        } else {
            tracing::info!(connected, total, "All connections established");
        }
        true
    }

    /// Disconnect every connection.
    ///
    /// Teardowns run as separate tasks so one failing teardown cannot stop
    /// the others.
    pub async fn disconnect_all(&self) {
        let handles: Vec<_> = self
            .inner
            .connection_list()
            .into_iter()
            .map(|connection| {
                let id = connection.id();
                (id, tokio::spawn(async move { connection.disconnect().await }))
            })
            .collect();

        for (id, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!(connection = %id, error = %e, "Connection teardown failed");
            }
        }
        self.inner.state.lock().publish_gauges();
        tracing::info!("All connections disconnected");
    }

    /// Route new tickers with the routing strategy and subscribe them.
    ///
    /// Already-routed tickers are left where they are. Returns `true` if
    /// every ticker is routed afterwards.
    pub fn subscribe<I, S>(&self, tickers: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut batches = Batches::new();
        let mut unroutable = Vec::new();
        {
            let mut state = self.inner.state.lock();
            for symbol in tickers
                .into_iter()
                .filter_map(|s| normalize_symbol(s.as_ref()))
            {
                if state.routing.route(&symbol).is_some() {
                    continue;
                }
                let candidates = state.candidates(None);
                match self.inner.strategy.select(&symbol, &candidates) {
                    Some(target) => {
                        state.assign(&symbol, target);
                        batches.entry(target).or_default().push(symbol);
                    }
                    None => unroutable.push(symbol),
                }
            }
            state.publish_gauges();
        }

        if !unroutable.is_empty() {
            tracing::warn!(
                symbols = ?unroutable,
                strategy = self.inner.strategy.name(),
                "No connection available for symbols"
            );
        }
        self.inner.send_subscribes(batches);
        unroutable.is_empty()
    }

    /// Remove tickers from the routing table and unsubscribe them on their
    /// owning connections.
    ///
    /// Unknown tickers are ignored. Returns `true` once the tickers are no
    /// longer routed, even if an owning connection has failed and no
    /// unsubscribe frame could be sent.
    pub fn unsubscribe<I, S>(&self, tickers: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut batches = Batches::new();
        {
            let mut state = self.inner.state.lock();
            for symbol in tickers
                .into_iter()
                .filter_map(|s| normalize_symbol(s.as_ref()))
            {
                let Some(owner) = state.routing.remove(&symbol) else {
                    continue;
                };
                if let Some(record) = state.records.get_mut(&owner) {
                    record.assigned_tickers.remove(&symbol);
                }
                batches.entry(owner).or_default().push(symbol);
            }
            state.publish_gauges();
        }

        for (id, symbols) in batches {
            if let Some(connection) = self.inner.connection(id)
                && !connection.unsubscribe(&symbols)
            {
                tracing::debug!(connection = %id, symbols = ?symbols, "Owner failed; route removed only");
            }
        }
        true
    }

    /// Move tickers owned by connections that are not connected onto
    /// connected ones, then rebuild the routing table.
    ///
    /// Returns the number of moved tickers.
    pub fn rebalance(&self) -> usize {
        let sources: Vec<ConnectionId> = self
            .inner
            .state
            .lock()
            .records
            .values()
            .filter(|record| !record.status.is_connected() && !record.assigned_tickers.is_empty())
            .map(|record| record.id)
            .collect();
        if sources.is_empty() {
            return 0;
        }
        self.inner.move_tickers(&sources)
    }

    /// Owning connection of a ticker.
    #[must_use]
    pub fn route(&self, symbol: &str) -> Option<ConnectionId> {
        let symbol = normalize_symbol(symbol)?;
        self.inner.state.lock().routing.route(&symbol)
    }

    /// Snapshot of the routing table.
    #[must_use]
    pub fn routing_table(&self) -> RoutingTable {
        self.inner.state.lock().routing.clone()
    }

    /// Snapshot of a connection's record.
    #[must_use]
    pub fn record(&self, id: ConnectionId) -> Option<ConnectionRecord> {
        self.inner.state.lock().records.get(&id).cloned()
    }

    /// A configured connection.
    #[must_use]
    pub fn connection(&self, id: ConnectionId) -> Option<Arc<StreamConnection>> {
        self.inner.connection(id)
    }

    /// Number of configured connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.connections.read().len()
    }

    /// Number of connected connections.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.inner.state.lock().connected_count()
    }
}

impl HealthSource for ConnectionPool {
    fn health_snapshot(&self) -> HealthSnapshot {
        let records: Vec<ConnectionRecord> =
            self.inner.state.lock().records.values().cloned().collect();

        let connections = records
            .into_iter()
            .map(|record| {
                let stats = self
                    .inner
                    .connection(record.id)
                    .map(|connection| connection.stats())
                    .unwrap_or_default();
                ConnectionHealth {
                    id: record.id,
                    name: record.name,
                    status: record.status,
                    ticker_count: record.assigned_tickers.len(),
                    message_count: record.message_count,
                    error_count: stats.connection_errors,
                    dropped_frames: stats.dropped_frames,
                    reconnect_attempts: stats.reconnect_attempts,
                    last_message_time: record.last_message_time,
                }
            })
            .collect();

        HealthSnapshot::new(AdapterMode::Pool, connections)
    }
}

fn tick_forwarder(pool: Weak<PoolInner>) -> Arc<TickForward> {
    Arc::new(move |record: TickRecord, connection_id: ConnectionId| {
        if let Some(pool) = pool.upgrade() {
            pool.aggregate_tick(record, connection_id);
        }
    })
}

fn status_forwarder(pool: Weak<PoolInner>) -> Arc<StatusForward> {
    Arc::new(
        move |status: &str, data: StatusData, connection_id: ConnectionId| {
            if let Some(pool) = pool.upgrade() {
                pool.aggregate_status(status, data, connection_id);
            }
        },
    )
}
