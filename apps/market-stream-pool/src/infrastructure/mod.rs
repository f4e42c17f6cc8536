//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Venue WebSocket protocol and the streaming connection.
pub mod venue;

/// Connection pool: routing, aggregation and failover.
pub mod pool;

/// Single/pool facade handed to callers.
pub mod adapter;

/// File-backed symbol universe.
pub mod universe;

/// Configuration and dependency injection.
pub mod config;

/// Health check HTTP endpoint and periodic reporter.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
