//! Static Symbol Universe
//!
//! File-backed `UniverseLookup`. The file is a JSON object mapping universe
//! keys to symbol lists:
//!
//! ```json
//! {"sector_etfs": ["XLK", "XLF", "XLE"], "mega_caps": ["AAPL", "MSFT"]}
//! ```
//!
//! Loaded once at startup and only queried afterwards.

use std::collections::HashMap;
use std::path::Path;

use crate::application::ports::UniverseLookup;
use crate::domain::streaming::{Symbol, normalize_symbol};

/// Universe loading errors.
#[derive(Debug, thiserror::Error)]
pub enum UniverseError {
    /// File could not be read.
    #[error("failed to read universe file: {0}")]
    Io(#[from] std::io::Error),

    /// File is not a JSON object of symbol lists.
    #[error("invalid universe file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Immutable universe map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticUniverse {
    universes: HashMap<String, Vec<Symbol>>,
}

impl StaticUniverse {
    /// Load universes from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, UniverseError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let raw: HashMap<String, Vec<String>> = serde_json::from_str(&text)?;
        let universe = Self::from_map(raw);

        tracing::info!(
            path = %path.display(),
            universes = universe.universes.len(),
            "Loaded symbol universes"
        );
        Ok(universe)
    }

    /// Build from an in-memory map. Symbols are normalized and
    /// de-duplicated, keeping first-seen order.
    #[must_use]
    pub fn from_map<K, S>(raw: HashMap<K, Vec<S>>) -> Self
    where
        K: Into<String>,
        S: AsRef<str>,
    {
        let universes = raw
            .into_iter()
            .map(|(key, symbols)| {
                let mut normalized: Vec<Symbol> = Vec::with_capacity(symbols.len());
                for symbol in symbols.iter().filter_map(|s| normalize_symbol(s.as_ref())) {
                    if !normalized.contains(&symbol) {
                        normalized.push(symbol);
                    }
                }
                (key.into(), normalized)
            })
            .collect();
        Self { universes }
    }

    /// Number of universes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.universes.len()
    }

    /// Check if no universe is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.universes.is_empty()
    }
}

impl UniverseLookup for StaticUniverse {
    fn resolve(&self, key: &str) -> Vec<Symbol> {
        self.universes.get(key).cloned().unwrap_or_default()
    }
}
