//! Domain Layer - Core streaming types and business logic.
//!
//! This layer contains the core domain types for market data ingestion
//! with no I/O. All types here are pure Rust with serialization support.

/// Canonical tick records (trades, quotes, aggregates).
pub mod streaming;

/// Per-connection subscription tracking.
pub mod subscription;

/// Connection identity, lifecycle state machine and pool-side records.
pub mod connection;

/// Ticker-to-connection routing table and routing strategies.
pub mod routing;
