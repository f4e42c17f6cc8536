//! Subscription Routing
//!
//! The `RoutingTable` maps every routed ticker to exactly one connection.
//! `RoutingStrategy` implementations decide which connected connection
//! receives a ticker that is subscribed after the pool is configured.
//!
//! # Strategies
//!
//! - `FirstConnected` (default): lowest connection id that is connected
//! - `RoundRobin`: rotates across connected connections
//! - `LeastLoaded`: connected connection with the fewest tickers
//! - `Manual`: explicit ticker → connection assignments

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::connection::{ConnectionId, ConnectionRecord, ConnectionStatus};
use crate::domain::streaming::Symbol;

// =============================================================================
// Routing Table
// =============================================================================

/// Live mapping of ticker symbol to owning connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    routes: BTreeMap<Symbol, ConnectionId>,
}

impl RoutingTable {
    /// Build a table as the union of the records' assigned tickers.
    ///
    /// Records are visited in id order; if two records claim the same
    /// ticker the lower id keeps it.
    pub fn rebuild<'a>(records: impl IntoIterator<Item = &'a ConnectionRecord>) -> Self {
        let mut ordered: Vec<&ConnectionRecord> = records.into_iter().collect();
        ordered.sort_by_key(|record| record.id);

        let mut table = Self::default();
        for record in ordered {
            for ticker in &record.assigned_tickers {
                if let Some(owner) = table.routes.get(ticker) {
                    tracing::warn!(
                        ticker = %ticker,
                        owner = %owner,
                        duplicate = %record.id,
                        "Ticker assigned to more than one connection"
                    );
                    continue;
                }
                table.routes.insert(ticker.clone(), record.id);
            }
        }
        table
    }

    /// Route a ticker to a connection.
    ///
    /// Returns the previous owner, if any.
    pub fn assign(&mut self, symbol: Symbol, connection: ConnectionId) -> Option<ConnectionId> {
        self.routes.insert(symbol, connection)
    }

    /// Remove a ticker's route.
    pub fn remove(&mut self, symbol: &str) -> Option<ConnectionId> {
        self.routes.remove(symbol)
    }

    /// Owning connection of a ticker.
    #[must_use]
    pub fn route(&self, symbol: &str) -> Option<ConnectionId> {
        self.routes.get(symbol).copied()
    }

    /// Tickers routed to a connection.
    #[must_use]
    pub fn symbols_for(&self, connection: ConnectionId) -> Vec<Symbol> {
        self.iter()
            .filter(|&(_, owner)| owner == connection)
            .map(|(symbol, _)| symbol.clone())
            .collect()
    }

    /// Iterate routes in symbol order.
    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, ConnectionId)> {
        self.routes.iter().map(|(symbol, id)| (symbol, *id))
    }

    /// Number of routed tickers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if no ticker is routed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

// =============================================================================
// Routing Strategies
// =============================================================================

/// A connection the strategy may route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteCandidate {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Current status.
    pub status: ConnectionStatus,
    /// Number of tickers already routed to it.
    pub load: usize,
}

/// Policy deciding which connection receives a newly subscribed ticker.
pub trait RoutingStrategy: Send + Sync + fmt::Debug {
    /// Pick a connection for `symbol`, or `None` if no candidate fits.
    ///
    /// `candidates` is sorted by id and may include connections that are
    /// not connected; strategies must only return connected ones.
    fn select(&self, symbol: &str, candidates: &[RouteCandidate]) -> Option<ConnectionId>;

    /// Strategy name for logs.
    fn name(&self) -> &'static str;
}

fn connected(candidates: &[RouteCandidate]) -> impl Iterator<Item = &RouteCandidate> {
    candidates.iter().filter(|c| c.status.is_connected())
}

/// Always the first connected connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstConnected;

impl RoutingStrategy for FirstConnected {
    fn select(&self, _symbol: &str, candidates: &[RouteCandidate]) -> Option<ConnectionId> {
        connected(candidates).map(|c| c.id).next()
    }

    fn name(&self) -> &'static str {
        "first_connected"
    }
}

/// Rotates across connected connections.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoutingStrategy for RoundRobin {
    fn select(&self, _symbol: &str, candidates: &[RouteCandidate]) -> Option<ConnectionId> {
        let live: Vec<ConnectionId> = connected(candidates).map(|c| c.id).collect();
        if live.is_empty() {
            return None;
        }
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % live.len();
        live.get(slot).copied()
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

/// Connected connection with the fewest routed tickers (ties: lowest id).
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastLoaded;

impl RoutingStrategy for LeastLoaded {
    fn select(&self, _symbol: &str, candidates: &[RouteCandidate]) -> Option<ConnectionId> {
        connected(candidates)
            .min_by_key(|c| (c.load, c.id))
            .map(|c| c.id)
    }

    fn name(&self) -> &'static str {
        "least_loaded"
    }
}

/// Explicit ticker → connection assignments.
///
/// An assigned ticker only goes to its connection, and only while that
/// connection is connected. Unassigned tickers fall back to
/// `FirstConnected`.
#[derive(Debug, Clone, Default)]
pub struct Manual {
    assignments: HashMap<Symbol, ConnectionId>,
}

impl Manual {
    /// Create a manual strategy from assignments.
    #[must_use]
    pub const fn new(assignments: HashMap<Symbol, ConnectionId>) -> Self {
        Self { assignments }
    }
}

impl RoutingStrategy for Manual {
    fn select(&self, symbol: &str, candidates: &[RouteCandidate]) -> Option<ConnectionId> {
        match self.assignments.get(symbol) {
            Some(target) => connected(candidates)
                .find(|c| c.id == *target)
                .map(|c| c.id),
            None => FirstConnected.select(symbol, candidates),
        }
    }

    fn name(&self) -> &'static str {
        "manual"
    }
}

/// Configurable routing policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RoutingPolicy {
    /// See [`FirstConnected`].
    #[default]
    FirstConnected,
    /// See [`RoundRobin`].
    RoundRobin,
    /// See [`LeastLoaded`].
    LeastLoaded,
    /// See [`Manual`].
    Manual(HashMap<Symbol, ConnectionId>),
}

impl RoutingPolicy {
    /// Parse a policy name; unknown names fall back to `FirstConnected`.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "round_robin" => Self::RoundRobin,
            "least_loaded" => Self::LeastLoaded,
            _ => Self::FirstConnected,
        }
    }

    /// Instantiate the strategy.
    #[must_use]
    pub fn build(&self) -> Box<dyn RoutingStrategy> {
        match self {
            Self::FirstConnected => Box::new(FirstConnected),
            Self::RoundRobin => Box::new(RoundRobin::default()),
            Self::LeastLoaded => Box::new(LeastLoaded),
            Self::Manual(assignments) => Box::new(Manual::new(assignments.clone())),
        }
    }
}
