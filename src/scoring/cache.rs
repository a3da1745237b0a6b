// =============================================================================
// Scorer-side OHLCV/ticker cache
// =============================================================================
//
// Scoring a wide symbol universe on every tick would hammer the venue; scores
// are cached for `update_interval` (default 15 min) and only recomputed when
// stale. This mirrors `market_data::TickerCache` but keyed by symbol and
// holding a timestamped `CoinScore` rather than a raw numeric value.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::CoinScore;

pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

struct Entry {
    score: CoinScore,
    stored_at: Instant,
}

pub struct ScoreCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl ScoreCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<CoinScore> {
        let entries = self.entries.read();
        entries.get(symbol).and_then(|e| {
            if e.stored_at.elapsed() < self.ttl {
                Some(e.score.clone())
            } else {
                None
            }
        })
    }

    pub fn set(&self, symbol: impl Into<String>, score: CoinScore) {
        self.entries.write().insert(
            symbol.into(),
            Entry {
                score,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, symbol: &str) {
        self.entries.write().remove(symbol);
    }
}

impl Default for ScoreCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_score(symbol: &str) -> CoinScore {
        CoinScore {
            symbol: symbol.to_string(),
            volatility_score: 50.0,
            liquidity_score: 50.0,
            mean_revert_score: 50.0,
            momentum_score: 50.0,
            stability_score: 50.0,
            final_score: 50.0,
            timestamp: Utc::now(),
            atr_pct: 0.03,
            volume_24h: 1_000_000.0,
            hurst: 0.5,
            adx: 20.0,
            volume_cv: 0.5,
            adf_pvalue: 0.2,
        }
    }

    #[test]
    fn cached_value_expires() {
        let cache = ScoreCache::new(Duration::from_millis(20));
        cache.set("XRPUSDC", sample_score("XRPUSDC"));
        assert!(cache.get("XRPUSDC").is_some());
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get("XRPUSDC").is_none());
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = ScoreCache::default();
        cache.set("ETHUSDC", sample_score("ETHUSDC"));
        cache.invalidate("ETHUSDC");
        assert!(cache.get("ETHUSDC").is_none());
    }
}
