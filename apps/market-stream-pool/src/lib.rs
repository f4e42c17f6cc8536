#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Market Stream Pool - Pooled Market Data Ingestion
//!
//! Maintains one or more authenticated WebSocket connections to a market
//! data venue, routes each ticker to exactly one of them, and presents
//! their ticks as a single stream behind two caller callbacks.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `streaming`: Canonical tick records
//!   - `subscription`: Per-connection subscription tracking
//!   - `connection`: Connection lifecycle state machine and records
//!   - `routing`: Routing table and routing strategies
//!
//! - **Application**: Port definitions and health reporting
//!   - `ports`: Transport, universe lookup and callback contracts
//!   - `services`: Health snapshots
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `venue`: WebSocket protocol and the streaming connection
//!   - `pool`: Connection pool with routing, aggregation and failover
//!   - `adapter`: Single/pool facade
//!   - `config`: Environment configuration
//!   - `health`: Health HTTP endpoint and periodic reporter
//!
//! # Data Flow
//!
//! ```text
//! Venue WS #1 ──┐
//!               │     ┌─────────────┐     ┌─────────────┐
//! Venue WS #2 ──┼────►│    Pool     │────►│   Adapter   │──► on_tick
//!               │     │ (aggregate) │     │  (facade)   │──► on_status
//! Venue WS #N ──┘     └─────────────┘     └─────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{ConnectionId, ConnectionRecord, ConnectionStatus};
pub use domain::routing::{RoutingPolicy, RoutingStrategy, RoutingTable};
pub use domain::streaming::{EventType, Symbol, TickRecord};
pub use domain::subscription::{SubscriptionSet, SubscriptionState};

// Ports and health
pub use application::ports::{
    Connector, StatusCallback, StatusData, TickCallback, TransportError, UniverseLookup,
};
pub use application::services::{
    AdapterMode, ConnectionHealth, HealthSnapshot, HealthSource, HealthStatus,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, ConnectionMode, PoolSettings, ServerSettings, SlotConfig, StreamConfig,
    TickerSource, VenueSettings, WebSocketSettings,
};

// Connections, pool and adapter
pub use infrastructure::adapter::MarketDataAdapter;
pub use infrastructure::pool::ConnectionPool;
pub use infrastructure::universe::{StaticUniverse, UniverseError};
pub use infrastructure::venue::{
    Credentials, ReconnectConfig, StreamConnection, StreamConnectionConfig, WebSocketConnector,
};

// Health server
pub use infrastructure::health::{
    HealthReporter, HealthServer, HealthServerError, HealthServerState,
};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
