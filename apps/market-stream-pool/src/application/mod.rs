//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the port interfaces that define how the domain
//! interacts with external systems, and the health reporting service.

/// Port interfaces for external systems (transport, universe lookup, callbacks).
pub mod ports;

/// Application services for health reporting.
pub mod services;
