//! Reconnection Policy
//!
//! Attempt-bounded exponential backoff for a dropped venue session.
//!
//! The wait before attempt `n` (1-based) is
//! `min(initial * multiplier^(n-1), max)` plus a random amount of up to
//! `jitter_factor` of that base. Jitter is never subtracted, so the total
//! time spent waiting for `n` attempts is at least the sum of the bases.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::WebSocketSettings;

/// Backoff parameters for one streaming connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Wait before the first attempt.
    pub initial_delay: Duration,
    /// Upper bound on the un-jittered wait.
    pub max_delay: Duration,
    /// Growth factor between consecutive attempts.
    pub multiplier: f64,
    /// Fraction of the base wait that may be added at random.
    pub jitter_factor: f64,
    /// Attempts before the connection is marked failed (0 = never give up).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Backoff parameters from the parsed WebSocket settings.
    #[must_use]
    pub const fn from_settings(settings: &WebSocketSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: settings.reconnect_jitter,
            max_attempts: settings.max_reconnect_attempts,
        }
    }

    /// Un-jittered wait before attempt `attempt` (1-based).
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let scaled = self.initial_delay.as_secs_f64() * factor;
        let max = self.max_delay.as_secs_f64();

        if !scaled.is_finite() || scaled >= max {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }

    /// Whether `attempts` already made exhaust the budget.
    #[must_use]
    pub const fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts != 0 && attempts >= self.max_attempts
    }
}

/// Attempt counter over a `ReconnectConfig`.
///
/// One policy covers one outage: the connection creates a fresh policy each
/// time an established session drops.
///
/// ```rust
/// use market_stream_pool::infrastructure::venue::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig {
///     jitter_factor: 0.0,
///     max_attempts: 2,
///     ..ReconnectConfig::default()
/// });
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
/// assert_eq!(policy.next_delay(), None);
/// assert_eq!(policy.attempt_count(), 2);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Start counting attempts from zero.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Claim the next attempt and return how long to wait before it.
    ///
    /// Returns `None` once the attempt budget is spent.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.exhausted(self.attempts) {
            return None;
        }
        self.attempts = self.attempts.saturating_add(1);
        let base = self.config.base_delay(self.attempts);
        Some(base + self.jitter(base))
    }

    /// Attempts claimed so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }

    fn jitter(&self, base: Duration) -> Duration {
        let range = base.as_secs_f64() * self.config.jitter_factor;
        if !range.is_finite() || range <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(rand::rng().random_range(0.0..=range))
    }
}
