//! Subscription Management Types
//!
//! Domain types for tracking which symbols a single streaming connection
//! is subscribed to.
//!
//! # Design
//!
//! Each streaming connection owns exactly one `SubscriptionSet`. A symbol
//! enters the set as `Pending` when a subscribe frame is queued and becomes
//! `Confirmed` once the venue acknowledges it. After a reconnect every
//! entry is reset to `Pending` and re-issued, because venue-side state
//! does not survive a disconnect.
//!
//! The set itself is not synchronized; the owning connection guards it
//! with a single lock.

use std::collections::BTreeMap;

use crate::domain::streaming::{Symbol, normalize_symbol};

// =============================================================================
// Types
// =============================================================================

/// Venue acknowledgement state of a subscribed symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Subscribe frame queued or sent, not yet confirmed.
    Pending,
    /// Venue confirmed the subscription.
    Confirmed,
}

/// Set of symbols one connection is subscribed to.
///
/// # Example
///
/// ```rust
/// use market_stream_pool::domain::subscription::SubscriptionSet;
///
/// let mut set = SubscriptionSet::default();
/// assert_eq!(set.add(["aapl", "MSFT"]), vec!["AAPL", "MSFT"]);
///
/// // Re-subscribing is a no-op
/// assert!(set.add(["AAPL"]).is_empty());
///
/// assert!(set.confirm("AAPL"));
/// assert_eq!(set.confirmed_count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    entries: BTreeMap<Symbol, SubscriptionState>,
}

impl SubscriptionSet {
    /// Add symbols to the set.
    ///
    /// Returns the normalized symbols that were not already present.
    pub fn add<I, S>(&mut self, symbols: I) -> Vec<Symbol>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = Vec::new();
        for raw in symbols {
            let Some(symbol) = normalize_symbol(raw.as_ref()) else {
                continue;
            };
            if self.entries.contains_key(&symbol) {
                continue;
            }
            self.entries.insert(symbol.clone(), SubscriptionState::Pending);
            added.push(symbol);
        }
        added
    }

    /// Remove symbols from the set.
    ///
    /// Returns the normalized symbols that were present and removed.
    pub fn remove<I, S>(&mut self, symbols: I) -> Vec<Symbol>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        symbols
            .into_iter()
            .filter_map(|raw| normalize_symbol(raw.as_ref()))
            .filter(|symbol| self.entries.remove(symbol).is_some())
            .collect()
    }

    /// Mark a symbol as confirmed by the venue.
    ///
    /// Returns `false` if the symbol is not part of the set (e.g. a late
    /// confirmation for a symbol that was already unsubscribed).
    pub fn confirm(&mut self, symbol: &str) -> bool {
        let Some(symbol) = normalize_symbol(symbol) else {
            return false;
        };
        match self.entries.get_mut(&symbol) {
            Some(state) => {
                *state = SubscriptionState::Confirmed;
                true
            }
            None => false,
        }
    }

    /// Reset every entry to `Pending` (used before replaying after reconnect).
    pub fn mark_all_pending(&mut self) {
        for state in self.entries.values_mut() {
            *state = SubscriptionState::Pending;
        }
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Check whether a symbol is in the set.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        normalize_symbol(symbol).is_some_and(|s| self.entries.contains_key(&s))
    }

    /// Get the state of a symbol.
    #[must_use]
    pub fn state(&self, symbol: &str) -> Option<SubscriptionState> {
        normalize_symbol(symbol).and_then(|s| self.entries.get(&s).copied())
    }

    /// All subscribed symbols in sorted order.
    #[must_use]
    pub fn symbols(&self) -> Vec<Symbol> {
        self.entries.keys().cloned().collect()
    }

    /// Symbols still awaiting confirmation.
    #[must_use]
    pub fn pending(&self) -> Vec<Symbol> {
        self.entries
            .iter()
            .filter(|(_, state)| **state == SubscriptionState::Pending)
            .map(|(symbol, _)| symbol.clone())
            .collect()
    }

    /// Number of confirmed symbols.
    #[must_use]
    pub fn confirmed_count(&self) -> usize {
        self.entries
            .values()
            .filter(|state| **state == SubscriptionState::Confirmed)
            .count()
    }

    /// Number of symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are any subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
