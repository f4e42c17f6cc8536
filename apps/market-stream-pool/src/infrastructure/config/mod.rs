//! Configuration Module
//!
//! Configuration loading for the stream pool, from environment variables.

mod settings;

pub use settings::{
    ConfigError, ConnectionMode, PoolSettings, ServerSettings, SlotConfig, StreamConfig,
    TickerSource, VenueSettings, WebSocketSettings,
};
