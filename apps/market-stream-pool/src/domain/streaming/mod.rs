//! Market Data Streaming Types
//!
//! Core domain types for market data: the canonical `TickRecord` produced
//! by a streaming connection for every trade, quote or aggregate bar.
//! These types are codec-agnostic and represent the canonical internal
//! representation of market data.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A symbol string (stock ticker).
pub type Symbol = String;

/// Kind of market event a tick was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Last sale.
    Trade,
    /// Top-of-book quote.
    Quote,
    /// OHLCV aggregate bar.
    Aggregate,
}

impl EventType {
    /// Get the event type name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Quote => "quote",
            Self::Aggregate => "aggregate",
        }
    }
}

/// A single normalized market event.
///
/// Immutable once constructed: fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickRecord {
    symbol: Symbol,
    price: Decimal,
    size: u64,
    timestamp: f64,
    source: String,
    event_type: EventType,
}

impl TickRecord {
    /// Create a new tick record.
    ///
    /// `timestamp` is epoch seconds (see [`normalize_epoch_seconds`]).
    #[must_use]
    pub fn new(
        symbol: impl Into<Symbol>,
        price: Decimal,
        size: u64,
        timestamp: f64,
        source: impl Into<String>,
        event_type: EventType,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            size,
            timestamp,
            source: source.into(),
            event_type,
        }
    }

    /// Ticker symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Event price (trade price, quote midpoint or bar close).
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    /// Event size (shares traded, displayed size or bar volume).
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Event time in fractional epoch seconds.
    #[must_use]
    pub const fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Name of the venue that produced this tick.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Kind of event.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Event time as a UTC date-time, if representable.
    #[must_use]
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        #[allow(clippy::cast_possible_truncation)]
        let micros = (self.timestamp * 1_000_000.0).round() as i64;
        DateTime::from_timestamp_micros(micros)
    }
}

/// Normalize a raw epoch value to fractional seconds.
///
/// The unit is inferred from magnitude: nanoseconds (>= 1e17),
/// microseconds (>= 1e14), milliseconds (>= 1e11), otherwise seconds.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn normalize_epoch_seconds(raw: i64) -> f64 {
    let magnitude = raw.unsigned_abs();
    let value = raw as f64;
    if magnitude >= 100_000_000_000_000_000 {
        value / 1_000_000_000.0
    } else if magnitude >= 100_000_000_000_000 {
        value / 1_000_000.0
    } else if magnitude >= 100_000_000_000 {
        value / 1_000.0
    } else {
        value
    }
}

/// Normalize a ticker symbol: trimmed and upper-cased.
///
/// Returns `None` for empty input.
#[must_use]
pub fn normalize_symbol(raw: &str) -> Option<Symbol> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}
