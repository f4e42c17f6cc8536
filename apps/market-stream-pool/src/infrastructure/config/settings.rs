//! Stream Pool Configuration Settings
//!
//! Configuration types for the stream pool, loaded from environment
//! variables. Parsing goes through a lookup function so that callers (and
//! tests) can supply values without touching the process environment.
//!
//! Unparseable numeric values fall back to their defaults; values that
//! parse but are out of range are rejected with `ConfigError`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::connection::ConnectionId;
use crate::domain::routing::RoutingPolicy;
use crate::domain::streaming::{Symbol, normalize_symbol};
use crate::infrastructure::venue::{
    Credentials, ReconnectConfig, StreamChannel, StreamConnectionConfig,
};

/// Default venue stream URL.
pub const DEFAULT_STREAM_URL: &str = "wss://socket.polygon.io/stocks";

/// Backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    /// One streaming connection.
    #[default]
    Single,
    /// A pool of streaming connections.
    Pool,
}

impl ConnectionMode {
    /// Get the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Pool => "pool",
        }
    }
}

/// Venue endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueSettings {
    /// API credential; `None` selects no-client mode.
    pub credentials: Option<Credentials>,
    /// WebSocket URL.
    pub url: String,
    /// Source name stamped on ticks.
    pub source: String,
    /// Channels subscribed per symbol.
    pub channels: Vec<StreamChannel>,
    /// Symbols streamed at startup.
    pub symbols: Vec<Symbol>,
}

impl Default for VenueSettings {
    fn default() -> Self {
        Self {
            credentials: None,
            url: DEFAULT_STREAM_URL.to_string(),
            source: "polygon".to_string(),
            channels: StreamChannel::DEFAULT.to_vec(),
            symbols: Vec::new(),
        }
    }
}

/// WebSocket connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WebSocketSettings {
    /// Bound on connect + authenticate.
    pub connect_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Additive jitter as a fraction of the delay.
    pub reconnect_jitter: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            reconnect_delay_initial: Duration::from_millis(1000),
            reconnect_delay_max: Duration::from_secs(60),
            reconnect_delay_multiplier: 2.0,
            reconnect_jitter: 0.1,
            max_reconnect_attempts: 10,
        }
    }
}

/// Where a slot's tickers come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickerSource {
    /// Named universe resolved through the universe lookup.
    Universe(String),
    /// Explicit symbols.
    Symbols(Vec<Symbol>),
}

/// One pool slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotConfig {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Whether the slot is activated.
    pub enabled: bool,
    /// Display name.
    pub name: String,
    /// Ticker source.
    pub tickers: TickerSource,
}

impl SlotConfig {
    /// Enabled slot with explicit symbols.
    #[must_use]
    pub fn symbols<I, S>(id: u16, name: impl Into<String>, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            id: ConnectionId::new(id),
            enabled: true,
            name: name.into(),
            tickers: TickerSource::Symbols(
                symbols
                    .into_iter()
                    .filter_map(|s| normalize_symbol(s.as_ref()))
                    .collect(),
            ),
        }
    }

    /// Enabled slot resolved from a universe key.
    #[must_use]
    pub fn universe(id: u16, name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: ConnectionId::new(id),
            enabled: true,
            name: name.into(),
            tickers: TickerSource::Universe(key.into()),
        }
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Account connection limit.
    pub max_connections: usize,
    /// Routing policy for post-configuration subscribes.
    pub routing: RoutingPolicy,
    /// Re-route tickers away from failed connections.
    pub failover: bool,
    /// Connect slots concurrently.
    pub parallel_connect: bool,
    /// Configured slots.
    pub slots: Vec<SlotConfig>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 3,
            routing: RoutingPolicy::default(),
            failover: true,
            parallel_connect: true,
            slots: Vec::new(),
        }
    }
}

/// Server and reporting settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
    /// Health reporter interval.
    pub health_interval: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            health_port: 8083,
            health_interval: Duration::from_secs(30),
        }
    }
}

/// Complete stream pool configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Venue endpoint.
    pub venue: VenueSettings,
    /// Single or pool backend.
    pub mode: ConnectionMode,
    /// WebSocket settings.
    pub websocket: WebSocketSettings,
    /// Pool settings.
    pub pool: PoolSettings,
    /// Server settings.
    pub server: ServerSettings,
    /// JSON universe file.
    pub universe_file: Option<PathBuf>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            venue: VenueSettings::default(),
            mode: ConnectionMode::default(),
            websocket: WebSocketSettings::default(),
            pool: PoolSettings::default(),
            server: ServerSettings::default(),
            universe_file: None,
        }
    }
}

impl StreamConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let defaults = Self::default();

        let venue = VenueSettings {
            credentials: env
                .string("MARKET_DATA_API_KEY")
                .and_then(|key| Credentials::new(key).ok()),
            url: env
                .string("MARKET_DATA_STREAM_URL")
                .unwrap_or(defaults.venue.url),
            source: env
                .string("MARKET_DATA_SOURCE")
                .unwrap_or(defaults.venue.source),
            channels: env
                .string("MARKET_DATA_CHANNELS")
                .map_or(defaults.venue.channels, |s| StreamChannel::parse_list(&s)),
            symbols: env
                .string("MARKET_DATA_SYMBOLS")
                .map(|list| list.split(',').filter_map(normalize_symbol).collect())
                .unwrap_or_default(),
        };

        let mode = if env.bool("STREAM_POOL_MULTI_CONNECTION", false) {
            ConnectionMode::Pool
        } else {
            ConnectionMode::Single
        };

        let websocket = WebSocketSettings {
            connect_timeout: env.duration_secs(
                "STREAM_POOL_CONNECT_TIMEOUT_SECS",
                defaults.websocket.connect_timeout,
            ),
            reconnect_delay_initial: env.duration_millis(
                "STREAM_POOL_RECONNECT_DELAY_INITIAL_MS",
                defaults.websocket.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_secs(
                "STREAM_POOL_RECONNECT_DELAY_MAX_SECS",
                defaults.websocket.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.parse(
                "STREAM_POOL_RECONNECT_DELAY_MULTIPLIER",
                defaults.websocket.reconnect_delay_multiplier,
            ),
            reconnect_jitter: env.parse(
                "STREAM_POOL_RECONNECT_JITTER",
                defaults.websocket.reconnect_jitter,
            ),
            max_reconnect_attempts: env.parse(
                "STREAM_POOL_MAX_RECONNECT_ATTEMPTS",
                defaults.websocket.max_reconnect_attempts,
            ),
        };
        if websocket.reconnect_delay_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "STREAM_POOL_RECONNECT_DELAY_MULTIPLIER".to_string(),
                reason: "must be at least 1.0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&websocket.reconnect_jitter) {
            return Err(ConfigError::InvalidValue {
                key: "STREAM_POOL_RECONNECT_JITTER".to_string(),
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }

        let max_connections: usize =
            env.parse("STREAM_POOL_MAX_CONNECTIONS", defaults.pool.max_connections);
        if max_connections == 0 || max_connections > usize::from(u16::MAX) {
            return Err(ConfigError::InvalidValue {
                key: "STREAM_POOL_MAX_CONNECTIONS".to_string(),
                reason: "must be between 1 and 65535".to_string(),
            });
        }

        let routing = match env.string("STREAM_POOL_ROUTING") {
            Some(name) if name.eq_ignore_ascii_case("manual") => {
                RoutingPolicy::Manual(parse_manual_routes(
                    &env.string("STREAM_POOL_MANUAL_ROUTES").unwrap_or_default(),
                )?)
            }
            Some(name) => RoutingPolicy::from_str_case_insensitive(&name),
            None => defaults.pool.routing,
        };

        let pool = PoolSettings {
            max_connections,
            routing,
            failover: env.bool("STREAM_POOL_FAILOVER", defaults.pool.failover),
            parallel_connect: env.bool(
                "STREAM_POOL_PARALLEL_CONNECT",
                defaults.pool.parallel_connect,
            ),
            slots: (1..=max_connections)
                .filter_map(|n| u16::try_from(n).ok())
                .filter_map(|n| env.slot(n))
                .collect(),
        };

        let server = ServerSettings {
            health_port: env.parse("STREAM_POOL_HEALTH_PORT", defaults.server.health_port),
            health_interval: env.duration_secs(
                "STREAM_POOL_HEALTH_INTERVAL_SECS",
                defaults.server.health_interval,
            ),
        };

        Ok(Self {
            venue,
            mode,
            websocket,
            pool,
            server,
            universe_file: env.string("UNIVERSE_FILE").map(PathBuf::from),
        })
    }

    /// Check if a venue credential is configured.
    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        self.venue.credentials.is_some()
    }

    /// Build the configuration for one streaming connection.
    ///
    /// Returns `None` without a venue credential.
    #[must_use]
    pub fn connection_config(
        &self,
        id: ConnectionId,
        name: impl Into<String>,
    ) -> Option<StreamConnectionConfig> {
        let credentials = self.venue.credentials.clone()?;
        Some(StreamConnectionConfig {
            id,
            name: name.into(),
            url: self.venue.url.clone(),
            credentials,
            source: self.venue.source.clone(),
            channels: self.venue.channels.clone(),
            connect_timeout: self.websocket.connect_timeout,
            reconnect: ReconnectConfig::from_settings(&self.websocket),
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Value present but not acceptable.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Parse `"AAPL:1,MSFT:2"` into manual route assignments.
fn parse_manual_routes(raw: &str) -> Result<HashMap<Symbol, ConnectionId>, ConfigError> {
    let invalid = |entry: &str| ConfigError::InvalidValue {
        key: "STREAM_POOL_MANUAL_ROUTES".to_string(),
        reason: format!("expected SYMBOL:CONNECTION, got '{entry}'"),
    };

    let mut routes = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (symbol, connection) = entry.split_once(':').ok_or_else(|| invalid(entry))?;
        let symbol = normalize_symbol(symbol).ok_or_else(|| invalid(entry))?;
        let connection: u16 = connection.trim().parse().map_err(|_| invalid(entry))?;
        routes.insert(symbol, ConnectionId::new(connection));
    }
    Ok(routes)
}

/// Typed access over a key lookup.
struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty trimmed value.
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.string(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        match self.string(key).map(|v| v.to_lowercase()).as_deref() {
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => false,
            _ => default,
        }
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.string(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.string(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }

    /// Slot `n`, if it names a universe or symbols.
    fn slot(&self, n: u16) -> Option<SlotConfig> {
        let prefix = format!("STREAM_POOL_CONNECTION_{n}");
        let universe = self.string(&format!("{prefix}_UNIVERSE"));
        let symbols = self.string(&format!("{prefix}_SYMBOLS"));

        let tickers = match (universe, symbols) {
            (Some(key), _) => TickerSource::Universe(key),
            (None, Some(list)) => TickerSource::Symbols(
                list.split(',').filter_map(normalize_symbol).collect(),
            ),
            (None, None) => return None,
        };

        Some(SlotConfig {
            id: ConnectionId::new(n),
            enabled: self.bool(&format!("{prefix}_ENABLED"), true),
            name: self
                .string(&format!("{prefix}_NAME"))
                .unwrap_or_else(|| format!("connection_{n}")),
            tickers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<StreamConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        StreamConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config(&[]).unwrap();

        assert!(!config.has_credentials());
        assert_eq!(config.mode, ConnectionMode::Single);
        assert_eq!(config.venue.url, DEFAULT_STREAM_URL);
        assert_eq!(config.venue.channels, StreamChannel::DEFAULT.to_vec());
        assert_eq!(config.pool.max_connections, 3);
        assert_eq!(config.pool.routing, RoutingPolicy::FirstConnected);
        assert!(config.pool.slots.is_empty());
        assert!(config.venue.symbols.is_empty());
        assert_eq!(config.websocket.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.websocket.max_reconnect_attempts, 10);
        assert_eq!(config.server.health_port, 8083);
        assert!(config.universe_file.is_none());
    }

    #[test]
    fn pool_slots_from_environment() {
        let config = config(&[
            ("MARKET_DATA_API_KEY", "abc"),
            ("STREAM_POOL_MULTI_CONNECTION", "true"),
            ("STREAM_POOL_CONNECTION_1_NAME", "etfs"),
            ("STREAM_POOL_CONNECTION_1_UNIVERSE", "sector_etfs"),
            ("STREAM_POOL_CONNECTION_2_SYMBOLS", "aapl, msft,,"),
            ("STREAM_POOL_CONNECTION_3_ENABLED", "false"),
            ("STREAM_POOL_CONNECTION_3_SYMBOLS", "TSLA"),
            ("STREAM_POOL_CONNECTION_4_SYMBOLS", "NVDA"),
            ("MARKET_DATA_SYMBOLS", "spy,QQQ"),
        ])
        .unwrap();

        assert_eq!(config.venue.symbols, vec!["SPY", "QQQ"]);

        assert!(config.has_credentials());
        assert_eq!(config.mode, ConnectionMode::Pool);
        assert_eq!(
            config.pool.slots,
            vec![
                SlotConfig::universe(1, "etfs", "sector_etfs"),
                SlotConfig::symbols(2, "connection_2", ["AAPL", "MSFT"]),
                SlotConfig {
                    enabled: false,
                    ..SlotConfig::symbols(3, "connection_3", ["TSLA"])
                },
            ]
        );
    }

    #[test]
    fn unparseable_numbers_fall_back_to_defaults() {
        let config = config(&[
            ("STREAM_POOL_HEALTH_PORT", "not-a-port"),
            ("STREAM_POOL_RECONNECT_DELAY_INITIAL_MS", "250"),
        ])
        .unwrap();

        assert_eq!(config.server.health_port, 8083);
        assert_eq!(
            config.websocket.reconnect_delay_initial,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn out_of_range_values_rejected() {
        assert!(matches!(
            config(&[("STREAM_POOL_MAX_CONNECTIONS", "0")]),
            Err(ConfigError::InvalidValue { key, .. }) if key == "STREAM_POOL_MAX_CONNECTIONS"
        ));
        assert!(config(&[("STREAM_POOL_RECONNECT_DELAY_MULTIPLIER", "0.5")]).is_err());
        assert!(config(&[("STREAM_POOL_RECONNECT_JITTER", "1.5")]).is_err());
    }

    #[test]
    fn manual_routing_assignments() {
        let config = config(&[
            ("STREAM_POOL_ROUTING", "Manual"),
            ("STREAM_POOL_MANUAL_ROUTES", "aapl:2, MSFT:1"),
        ])
        .unwrap();

        let RoutingPolicy::Manual(routes) = config.pool.routing else {
            panic!("expected manual routing");
        };
        assert_eq!(routes.get("AAPL"), Some(&ConnectionId::new(2)));
        assert_eq!(routes.get("MSFT"), Some(&ConnectionId::new(1)));

        assert!(
            config_with_routes("AAPL").is_err(),
            "entry without connection is rejected"
        );
    }

    fn config_with_routes(routes: &str) -> Result<StreamConfig, ConfigError> {
        config(&[
            ("STREAM_POOL_ROUTING", "manual"),
            ("STREAM_POOL_MANUAL_ROUTES", routes),
        ])
    }

    #[test]
    fn connection_config_requires_credentials() {
        let without = config(&[]).unwrap();
        assert!(
            without
                .connection_config(ConnectionId::new(1), "primary")
                .is_none()
        );

        let with = config(&[
            ("MARKET_DATA_API_KEY", "abc"),
            ("STREAM_POOL_MAX_RECONNECT_ATTEMPTS", "3"),
        ])
        .unwrap();
        let connection = with
            .connection_config(ConnectionId::new(1), "primary")
            .unwrap();
        assert_eq!(connection.reconnect.max_attempts, 3);
        assert_eq!(connection.url, DEFAULT_STREAM_URL);
    }

    #[test]
    fn credentials_redacted_in_debug() {
        let config = config(&[("MARKET_DATA_API_KEY", "very-secret")]).unwrap();
        assert!(!format!("{config:?}").contains("very-secret"));
    }
}
