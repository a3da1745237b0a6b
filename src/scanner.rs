// =============================================================================
// Symbol Scanner (C8)
// =============================================================================
//
// Enumerates tradable perpetuals quoted in a chosen currency, excludes a
// blocklist, and ranks survivors by a grid-suitability scalar computed from
// daily amplitude and trend stats. Runs in small batches with an inter-batch
// sleep to stay polite to the venue, and caches the result for 4 hours.
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::exchange::ExchangeClient;
use crate::market_data::Candle;

pub const DEFAULT_BATCH_SIZE: usize = 15;
pub const MIN_INTER_BATCH_SLEEP: Duration = Duration::from_millis(200);
pub const CACHE_TTL: Duration = Duration::from_secs(4 * 60 * 60);
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

/// Substrings matched case-insensitively against the base asset.
pub const DEFAULT_BLOCKLIST: &[&str] = &["LUNA", "UST", "FTT", "1000", "BIFI"];

#[derive(Debug, Clone, Copy)]
pub struct ScanFilters {
    pub min_amplitude: f64,
    pub max_amplitude: f64,
    pub max_total_change: f64,
    pub min_volume_24h: f64,
}

impl Default for ScanFilters {
    fn default() -> Self {
        Self {
            min_amplitude: 3.0,
            max_amplitude: 8.0,
            max_total_change: 50.0,
            min_volume_24h: 50_000_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanCandidate {
    pub symbol: String,
    pub avg_amplitude: f64,
    pub total_change: f64,
    pub volume_24h: f64,
    pub suitability: f64,
}

fn is_blocklisted(symbol: &str, blocklist: &[&str]) -> bool {
    let upper = symbol.to_uppercase();
    blocklist.iter().any(|b| upper.contains(b))
}

/// Per-day amplitude: `(high - low) / open * 100`.
fn daily_amplitude(c: &Candle) -> f64 {
    if c.open == 0.0 {
        0.0
    } else {
        (c.high - c.low) / c.open * 100.0
    }
}

/// Per-day percentage change: `(close - open) / open * 100`.
fn daily_change(c: &Candle) -> f64 {
    if c.open == 0.0 {
        0.0
    } else {
        (c.close - c.open) / c.open * 100.0
    }
}

fn amplitude_score(avg_amplitude: f64) -> f64 {
    if (3.0..=8.0).contains(&avg_amplitude) {
        80.0 + (1.0 - (avg_amplitude - 5.5).abs() / 2.5) * 20.0
    } else if avg_amplitude > 8.0 {
        (80.0 - (avg_amplitude - 8.0) * 5.0).max(40.0)
    } else {
        (avg_amplitude / 3.0 * 60.0).max(0.0)
    }
}

fn trend_score(total_change: f64) -> f64 {
    let abs_change = total_change.abs();
    if abs_change < 10.0 {
        100.0
    } else if abs_change < 30.0 {
        80.0 + (30.0 - abs_change) / 20.0 * 20.0
    } else if abs_change < 50.0 {
        60.0 + (50.0 - abs_change) / 20.0 * 20.0
    } else {
        (60.0 - (abs_change - 50.0) * 1.5).max(0.0)
    }
}

fn grid_suitability(avg_amplitude: f64, total_change: f64) -> f64 {
    0.6 * amplitude_score(avg_amplitude) + 0.4 * trend_score(total_change)
}

struct CachedScan {
    candidates: Vec<ScanCandidate>,
    stored_at: Instant,
}

pub struct Scanner {
    exchange: Arc<ExchangeClient>,
    filters: ScanFilters,
    blocklist: Vec<String>,
    cache: RwLock<Option<CachedScan>>,
}

impl Scanner {
    pub fn new(exchange: Arc<ExchangeClient>, filters: ScanFilters) -> Self {
        Self {
            exchange,
            filters,
            blocklist: DEFAULT_BLOCKLIST.iter().map(|s| s.to_string()).collect(),
            cache: RwLock::new(None),
        }
    }

    /// Scan the given universe of raw symbols, returning the top `limit`
    /// grid-suitable candidates. Results are cached for [`CACHE_TTL`].
    #[instrument(skip(self, universe), fields(universe_size = universe.len()))]
    pub async fn scan(&self, universe: &[String], limit: usize) -> Vec<ScanCandidate> {
        if let Some(cached) = self.cache.read().as_ref() {
            if cached.stored_at.elapsed() < CACHE_TTL {
                let mut out = cached.candidates.clone();
                out.truncate(limit);
                return out;
            }
        }

        let candidates_pool: Vec<String> = universe
            .iter()
            .filter(|s| !is_blocklisted(s, DEFAULT_BLOCKLIST))
            .cloned()
            .collect();

        let mut survivors = Vec::new();
        for (batch_index, batch) in candidates_pool.chunks(DEFAULT_BATCH_SIZE).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(MIN_INTER_BATCH_SLEEP).await;
            }
            for symbol in batch {
                match self.evaluate_symbol(symbol).await {
                    Some(candidate) if self.passes_filters(&candidate) => survivors.push(candidate),
                    Some(_) => {}
                    None => warn!(symbol, "scan: skipping symbol, insufficient daily candle history"),
                }
            }
        }

        survivors.sort_by(|a, b| b.suitability.partial_cmp(&a.suitability).unwrap_or(std::cmp::Ordering::Equal));
        info!(surviving = survivors.len(), "scan complete");

        *self.cache.write() = Some(CachedScan {
            candidates: survivors.clone(),
            stored_at: Instant::now(),
        });

        survivors.truncate(limit);
        survivors
    }

    async fn evaluate_symbol(&self, symbol: &str) -> Option<ScanCandidate> {
        let candles = self.exchange.fetch_ohlcv(symbol, "1d", DEFAULT_LOOKBACK_DAYS).await.ok()?;
        if candles.is_empty() {
            return None;
        }

        let avg_amplitude = candles.iter().map(daily_amplitude).sum::<f64>() / candles.len() as f64;
        let total_change = candles.iter().map(daily_change).sum::<f64>();
        let volume_24h = candles.last()?.quote_volume;

        Some(ScanCandidate {
            symbol: symbol.to_string(),
            avg_amplitude,
            total_change,
            volume_24h,
            suitability: grid_suitability(avg_amplitude, total_change),
        })
    }

    fn passes_filters(&self, c: &ScanCandidate) -> bool {
        c.avg_amplitude >= self.filters.min_amplitude
            && c.avg_amplitude <= self.filters.max_amplitude
            && c.total_change.abs() <= self.filters.max_total_change
            && c.volume_24h >= self.filters.min_volume_24h
    }
}
