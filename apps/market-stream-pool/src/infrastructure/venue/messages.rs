//! Venue WebSocket Message Types
//!
//! Wire format types for the venue's JSON stream. Every inbound object
//! carries an `ev` discriminator.
//!
//! # Message Types
//!
//! ## Control Messages
//! - `status`: connection, authentication and subscription acknowledgments
//!
//! ## Market Events
//! - `T`: trades
//! - `Q`: quotes (NBBO)
//! - `AM` / `A`: minute / second aggregate bars
//!
//! ## Outbound
//! - `ControlRequest`: `{"action": "...", "params": "..."}` for auth,
//!   subscribe and unsubscribe

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::streaming::{
    EventType, Symbol, TickRecord, normalize_epoch_seconds, normalize_symbol,
};

// =============================================================================
// Channels
// =============================================================================

/// Per-symbol channel prefixes used in subscribe params (`T.AAPL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamChannel {
    /// Trades (`T`).
    Trades,
    /// Quotes (`Q`).
    Quotes,
    /// Minute aggregates (`AM`).
    MinuteAggregates,
    /// Second aggregates (`A`).
    SecondAggregates,
}

impl StreamChannel {
    /// Default channel set: trades and minute aggregates.
    pub const DEFAULT: [Self; 2] = [Self::Trades, Self::MinuteAggregates];

    /// Wire prefix.
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Trades => "T",
            Self::Quotes => "Q",
            Self::MinuteAggregates => "AM",
            Self::SecondAggregates => "A",
        }
    }

    /// Parse a wire prefix (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "T" => Some(Self::Trades),
            "Q" => Some(Self::Quotes),
            "AM" => Some(Self::MinuteAggregates),
            "A" => Some(Self::SecondAggregates),
            _ => None,
        }
    }

    /// Parse a comma-separated prefix list, skipping unknown entries and
    /// duplicates. An empty result falls back to [`Self::DEFAULT`].
    #[must_use]
    pub fn parse_list(s: &str) -> Vec<Self> {
        let mut channels = Vec::new();
        for channel in s.split(',').filter_map(Self::parse) {
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }
        if channels.is_empty() {
            Self::DEFAULT.to_vec()
        } else {
            channels
        }
    }
}

// =============================================================================
// Status Messages
// =============================================================================

/// Status message from the venue.
///
/// # Wire Format (JSON)
/// ```json
/// {"ev": "status", "status": "auth_success", "message": "authenticated"}
/// {"ev": "status", "status": "success", "message": "subscribed to: T.AAPL"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Status code string.
    pub status: String,

    /// Human-readable detail.
    #[serde(default)]
    pub message: String,
}

/// Interpreted status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusKind {
    /// Socket accepted, authentication expected.
    Connected,
    /// Authentication accepted.
    AuthSuccess,
    /// Authentication rejected.
    AuthFailed,
    /// Authentication not sent in time.
    AuthTimeout,
    /// Account connection limit reached.
    MaxConnections,
    /// Subscription confirmed for these symbols.
    Subscribed(Vec<Symbol>),
    /// Unsubscription confirmed for these symbols.
    Unsubscribed(Vec<Symbol>),
    /// Venue-reported error.
    Error(String),
    /// Anything else.
    Other(String),
}

impl StatusMessage {
    /// Interpret the status.
    #[must_use]
    pub fn kind(&self) -> StatusKind {
        match self.status.as_str() {
            "connected" => StatusKind::Connected,
            "auth_success" => StatusKind::AuthSuccess,
            "auth_failed" => StatusKind::AuthFailed,
            "auth_timeout" => StatusKind::AuthTimeout,
            "max_connections" => StatusKind::MaxConnections,
            "error" => StatusKind::Error(self.message.clone()),
            "success" => {
                let message = self.message.trim();
                if let Some(rest) = message.strip_prefix("subscribed to:") {
                    StatusKind::Subscribed(parse_channel_symbols(rest))
                } else if let Some(rest) = message.strip_prefix("unsubscribed to:") {
                    StatusKind::Unsubscribed(parse_channel_symbols(rest))
                } else {
                    StatusKind::Other(self.message.clone())
                }
            }
            other => StatusKind::Other(other.to_string()),
        }
    }
}

/// Extract symbols from `"T.AAPL,AM.AAPL,T.MSFT"`, dropping prefixes and
/// duplicates while keeping first-seen order.
fn parse_channel_symbols(list: &str) -> Vec<Symbol> {
    let mut symbols: Vec<Symbol> = Vec::new();
    for entry in list.split(',') {
        let raw = entry.split_once('.').map_or(entry, |(_, symbol)| symbol);
        if let Some(symbol) = normalize_symbol(raw)
            && !symbols.contains(&symbol)
        {
            symbols.push(symbol);
        }
    }
    symbols
}

// =============================================================================
// Market Events
// =============================================================================

/// Trade event.
///
/// # Wire Format (JSON)
/// ```json
/// {"ev": "T", "sym": "AAPL", "p": 189.5, "s": 100, "t": 1700000000123, "x": 4}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeMessage {
    /// Symbol
    #[serde(rename = "sym")]
    pub symbol: String,

    /// Trade price
    #[serde(rename = "p")]
    pub price: Decimal,

    /// Trade size
    #[serde(rename = "s", default)]
    pub size: u64,

    /// Epoch timestamp (milliseconds)
    #[serde(rename = "t")]
    pub timestamp: i64,

    /// Exchange ID
    #[serde(rename = "x", default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<i32>,

    /// Trade ID
    #[serde(rename = "i", default, skip_serializing_if = "Option::is_none")]
    pub trade_id: Option<String>,

    /// Trade conditions
    #[serde(rename = "c", default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<i32>,
}

/// Quote event.
///
/// # Wire Format (JSON)
/// ```json
/// {"ev": "Q", "sym": "AAPL", "bp": 189.4, "bs": 2, "ap": 189.6, "as": 3, "t": 1700000000123}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteMessage {
    /// Symbol
    #[serde(rename = "sym")]
    pub symbol: String,

    /// Bid price
    #[serde(rename = "bp")]
    pub bid_price: Decimal,

    /// Bid size
    #[serde(rename = "bs", default)]
    pub bid_size: u64,

    /// Ask price
    #[serde(rename = "ap")]
    pub ask_price: Decimal,

    /// Ask size
    #[serde(rename = "as", default)]
    pub ask_size: u64,

    /// Epoch timestamp (milliseconds)
    #[serde(rename = "t")]
    pub timestamp: i64,
}

impl QuoteMessage {
    /// Bid/ask midpoint. A one-sided quote uses the side that is present.
    #[must_use]
    pub fn midpoint(&self) -> Decimal {
        match (self.bid_price.is_zero(), self.ask_price.is_zero()) {
            (false, false) => (self.bid_price + self.ask_price) / Decimal::TWO,
            (true, false) => self.ask_price,
            _ => self.bid_price,
        }
    }
}

/// Aggregate bar event (minute `AM` or second `A`).
///
/// # Wire Format (JSON)
/// ```json
/// {"ev": "AM", "sym": "AAPL", "o": 189.1, "h": 189.9, "l": 188.7, "c": 189.5,
///  "v": 12000, "vw": 189.3, "s": 1700000000000, "e": 1700000060000}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateMessage {
    /// Symbol
    #[serde(rename = "sym")]
    pub symbol: String,

    /// Open price
    #[serde(rename = "o")]
    pub open: Decimal,

    /// High price
    #[serde(rename = "h")]
    pub high: Decimal,

    /// Low price
    #[serde(rename = "l")]
    pub low: Decimal,

    /// Close price
    #[serde(rename = "c")]
    pub close: Decimal,

    /// Volume
    #[serde(rename = "v", default)]
    pub volume: u64,

    /// Volume-weighted average price
    #[serde(rename = "vw", default, skip_serializing_if = "Option::is_none")]
    pub vwap: Option<Decimal>,

    /// Bar start (epoch milliseconds)
    #[serde(rename = "s")]
    pub start: i64,

    /// Bar end (epoch milliseconds)
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

// =============================================================================
// Unified Message
// =============================================================================

/// One decoded inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenueMessage {
    /// Control/status message.
    Status(StatusMessage),
    /// Trade.
    Trade(TradeMessage),
    /// Quote.
    Quote(QuoteMessage),
    /// Aggregate bar.
    Aggregate(AggregateMessage),
}

/// Coarse frame classification for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Trade event.
    Trade,
    /// Quote event.
    Quote,
    /// Aggregate bar.
    Aggregate,
    /// Connection or authentication status.
    AuthAck,
    /// Subscription confirmation.
    SubscriptionAck,
    /// Venue-reported error.
    VenueError,
    /// Unrecognised or undecodable.
    Unknown,
}

impl FrameKind {
    /// Label value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Quote => "quote",
            Self::Aggregate => "aggregate",
            Self::AuthAck => "auth_ack",
            Self::SubscriptionAck => "subscription_ack",
            Self::VenueError => "venue_error",
            Self::Unknown => "unknown",
        }
    }
}

impl VenueMessage {
    /// Classify this message.
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Trade(_) => FrameKind::Trade,
            Self::Quote(_) => FrameKind::Quote,
            Self::Aggregate(_) => FrameKind::Aggregate,
            Self::Status(status) => match status.kind() {
                StatusKind::Connected
                | StatusKind::AuthSuccess
                | StatusKind::AuthFailed
                | StatusKind::AuthTimeout
                | StatusKind::MaxConnections => FrameKind::AuthAck,
                StatusKind::Subscribed(_) | StatusKind::Unsubscribed(_) => {
                    FrameKind::SubscriptionAck
                }
                StatusKind::Error(_) => FrameKind::VenueError,
                StatusKind::Other(_) => FrameKind::Unknown,
            },
        }
    }

    /// Build the canonical tick for a market event.
    ///
    /// Returns `None` for status messages and events with an empty symbol.
    #[must_use]
    pub fn to_tick(&self, source: &str) -> Option<TickRecord> {
        match self {
            Self::Status(_) => None,
            Self::Trade(trade) => Some(TickRecord::new(
                normalize_symbol(&trade.symbol)?,
                trade.price,
                trade.size,
                normalize_epoch_seconds(trade.timestamp),
                source,
                EventType::Trade,
            )),
            Self::Quote(quote) => Some(TickRecord::new(
                normalize_symbol(&quote.symbol)?,
                quote.midpoint(),
                quote.bid_size.saturating_add(quote.ask_size),
                normalize_epoch_seconds(quote.timestamp),
                source,
                EventType::Quote,
            )),
            Self::Aggregate(bar) => Some(TickRecord::new(
                normalize_symbol(&bar.symbol)?,
                bar.close,
                bar.volume,
                normalize_epoch_seconds(bar.start),
                source,
                EventType::Aggregate,
            )),
        }
    }
}

// =============================================================================
// Outbound Control Requests
// =============================================================================

/// Control request action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    /// Authenticate.
    Auth,
    /// Subscribe.
    Subscribe,
    /// Unsubscribe.
    Unsubscribe,
}

/// Outbound control frame.
///
/// # Wire Format (JSON)
/// ```json
/// {"action": "auth", "params": "API_KEY"}
/// {"action": "subscribe", "params": "T.AAPL,AM.AAPL"}
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    /// Action
    pub action: ControlAction,

    /// Action parameters
    pub params: String,
}

impl ControlRequest {
    /// Authentication request.
    #[must_use]
    pub fn auth(api_key: impl Into<String>) -> Self {
        Self {
            action: ControlAction::Auth,
            params: api_key.into(),
        }
    }

    /// Subscribe one symbol on every channel.
    #[must_use]
    pub fn subscribe(symbol: &str, channels: &[StreamChannel]) -> Self {
        Self {
            action: ControlAction::Subscribe,
            params: channel_params(symbol, channels),
        }
    }

    /// Unsubscribe one symbol from every channel.
    #[must_use]
    pub fn unsubscribe(symbol: &str, channels: &[StreamChannel]) -> Self {
        Self {
            action: ControlAction::Unsubscribe,
            params: channel_params(symbol, channels),
        }
    }
}

impl std::fmt::Debug for ControlRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params = if self.action == ControlAction::Auth {
            "[REDACTED]"
        } else {
            self.params.as_str()
        };
        f.debug_struct("ControlRequest")
            .field("action", &self.action)
            .field("params", &params)
            .finish()
    }
}

fn channel_params(symbol: &str, channels: &[StreamChannel]) -> String {
    channels
        .iter()
        .map(|channel| format!("{}.{symbol}", channel.prefix()))
        .collect::<Vec<_>>()
        .join(",")
}
