// =============================================================================
// Ticker / market-metadata cache — short-TTL fallback for the REST path
// =============================================================================
//
// When the streaming transport is unavailable, the provider falls back to
// request/response with a short TTL cache: tickers <= 5s, OHLCV <= 60s,
// market metadata <= 1h. This mirrors the original engine's `DataCache`
// (tuple-based TTL cache keyed by symbol) but generalised to any value type.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

struct Entry<T> {
    value: T,
    stored_at: Instant,
}

/// A simple per-key TTL cache. One instance per data kind (tickers, OHLCV,
/// markets) rather than one cache with mixed TTLs.
pub struct TickerCache<T: Clone> {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry<T>>>,
}

impl<T: Clone> TickerCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.read();
        entries.get(key).and_then(|e| {
            if e.stored_at.elapsed() < self.ttl {
                Some(e.value.clone())
            } else {
                None
            }
        })
    }

    pub fn set(&self, key: impl Into<String>, value: T) {
        self.entries.write().insert(
            key.into(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// TTLs from the external interface contract.
pub mod ttl {
    use std::time::Duration;
    pub const TICKER: Duration = Duration::from_secs(5);
    pub const OHLCV: Duration = Duration::from_secs(60);
    pub const MARKETS: Duration = Duration::from_secs(3600);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_expires_after_ttl() {
        let cache: TickerCache<f64> = TickerCache::new(Duration::from_millis(20));
        cache.set("XRPUSDC", 0.52);
        assert_eq!(cache.get("XRPUSDC"), Some(0.52));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("XRPUSDC"), None);
    }

    #[test]
    fn missing_key_returns_none() {
        let cache: TickerCache<f64> = TickerCache::new(Duration::from_secs(5));
        assert_eq!(cache.get("nope"), None);
    }
}
