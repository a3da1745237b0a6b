// =============================================================================
// Scorer (C7) — per-symbol grid-suitability scoring
// =============================================================================
//
// Combines ATR%, Hurst exponent, ADF p-value, ADX and volume coefficient of
// variation into five component scores in [0,100], then a weighted composite.
// Mirrors the exact piecewise bands the original scoring engine uses so a
// trace replayed against either implementation produces the same numbers.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::exchange::ExchangeClient;
use crate::market_data::Candle;

use super::cache::ScoreCache;
use super::indicators::{adf_p_value, calculate_adx, calculate_atr_pct, hurst_exponent, volume_coefficient_of_variation};

/// Minimum OHLCV points required to compute a non-sentinel score.
pub const MIN_CANDLES: usize = 50;

pub const WEIGHT_VOLATILITY: f64 = 0.15;
pub const WEIGHT_LIQUIDITY: f64 = 0.20;
pub const WEIGHT_MEAN_REVERT: f64 = 0.40;
pub const WEIGHT_MOMENTUM: f64 = 0.15;
pub const WEIGHT_STABILITY: f64 = 0.10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinScore {
    pub symbol: String,
    pub volatility_score: f64,
    pub liquidity_score: f64,
    pub mean_revert_score: f64,
    pub momentum_score: f64,
    pub stability_score: f64,
    pub final_score: f64,
    pub timestamp: DateTime<Utc>,
    pub atr_pct: f64,
    pub volume_24h: f64,
    pub hurst: f64,
    pub adx: f64,
    pub volume_cv: f64,
    pub adf_pvalue: f64,
}

impl CoinScore {
    /// The sentinel empty score returned when there isn't enough OHLCV
    /// history to compute real indicators. Never crashes the caller.
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            volatility_score: 0.0,
            liquidity_score: 0.0,
            mean_revert_score: 0.0,
            momentum_score: 0.0,
            stability_score: 0.0,
            final_score: 0.0,
            timestamp: Utc::now(),
            atr_pct: 0.0,
            volume_24h: 0.0,
            hurst: 0.5,
            adx: 25.0,
            volume_cv: 1.0,
            adf_pvalue: 1.0,
        }
    }
}

fn volatility_score(atr_pct: f64) -> f64 {
    if (0.02..=0.05).contains(&atr_pct) {
        let deviation = (atr_pct - 0.035).abs() / 0.03 * 2.0;
        80.0 + (1.0 - deviation) * 20.0
    } else if (0.01..0.02).contains(&atr_pct) {
        60.0 + 20.0 * (atr_pct - 0.01) / 0.01
    } else if atr_pct > 0.05 && atr_pct <= 0.10 {
        80.0 - 20.0 * (atr_pct - 0.05) / 0.05
    } else if atr_pct < 0.01 {
        (60.0 * atr_pct / 0.01).max(0.0)
    } else {
        (60.0 - 60.0 * (atr_pct - 0.10) / 0.10).max(0.0)
    }
}

fn liquidity_score(volume_24h: f64) -> f64 {
    const M: f64 = 1_000_000.0;
    if volume_24h >= 500.0 * M {
        100.0
    } else if volume_24h >= 100.0 * M {
        80.0 + 20.0 * (volume_24h - 100.0 * M) / (400.0 * M)
    } else if volume_24h >= 50.0 * M {
        60.0 + 20.0 * (volume_24h - 50.0 * M) / (50.0 * M)
    } else {
        (60.0 * volume_24h / (50.0 * M)).max(0.0)
    }
}

fn hurst_component(hurst: f64) -> f64 {
    if hurst < 0.4 {
        80.0 + 15.0 * (0.4 - hurst) / 0.4
    } else if hurst < 0.5 {
        60.0 + 20.0 * (0.5 - hurst) / 0.1
    } else if hurst == 0.5 {
        50.0
    } else {
        (50.0 - 50.0 * (hurst - 0.5) / 0.5).max(0.0)
    }
}

fn adf_bonus(p: f64) -> f64 {
    if p < 0.05 {
        10.0 * (1.0 - p / 0.05)
    } else if p < 0.10 {
        5.0 * (0.10 - p) / 0.05
    } else {
        0.0
    }
}

fn mean_revert_score(hurst: f64, adf_p: f64) -> f64 {
    (hurst_component(hurst) + adf_bonus(adf_p)).min(100.0)
}

fn momentum_score(adx: f64) -> f64 {
    if adx < 20.0 {
        80.0 + 20.0 * (20.0 - adx) / 20.0
    } else if adx <= 25.0 {
        60.0 + 20.0 * (25.0 - adx) / 5.0
    } else {
        (60.0 - 2.0 * (adx - 25.0)).max(0.0)
    }
}

fn volume_cv_component(cv: f64) -> f64 {
    if cv <= 0.5 {
        80.0 + 20.0 * (0.5 - cv) / 0.5
    } else if cv <= 1.0 {
        60.0 + 20.0 * (1.0 - cv) / 0.5
    } else {
        (60.0 - 30.0 * (cv - 1.0)).max(0.0)
    }
}

fn adf_component(p: f64) -> f64 {
    if p < 0.05 {
        90.0 + 10.0 * (0.05 - p) / 0.05
    } else if p < 0.10 {
        70.0 + 20.0 * (0.10 - p) / 0.05
    } else {
        (70.0 - 40.0 * (p - 0.10) / 0.40).max(30.0)
    }
}

fn stability_score(volume_cv: f64, adf_p: f64) -> f64 {
    0.6 * volume_cv_component(volume_cv) + 0.4 * adf_component(adf_p)
}

/// Normalized composite weights; re-normalizes if the table doesn't sum to 1.
fn composite(volatility: f64, liquidity: f64, mean_revert: f64, momentum: f64, stability: f64) -> f64 {
    let total_weight =
        WEIGHT_VOLATILITY + WEIGHT_LIQUIDITY + WEIGHT_MEAN_REVERT + WEIGHT_MOMENTUM + WEIGHT_STABILITY;
    let norm = |w: f64| w / total_weight;
    volatility * norm(WEIGHT_VOLATILITY)
        + liquidity * norm(WEIGHT_LIQUIDITY)
        + mean_revert * norm(WEIGHT_MEAN_REVERT)
        + momentum * norm(WEIGHT_MOMENTUM)
        + stability * norm(WEIGHT_STABILITY)
}

/// Score a single symbol from its OHLCV history and 24h quote volume. Pure
/// function over the indicator values -- the async caller is responsible for
/// fetching candles and volume.
pub fn score_from_candles(symbol: &str, candles: &[Candle], volume_24h: f64) -> CoinScore {
    if candles.len() < MIN_CANDLES {
        return CoinScore::empty(symbol);
    }

    let atr_pct = calculate_atr_pct(candles, 14).map(|p| p / 100.0).unwrap_or(0.0);
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let hurst = hurst_exponent(&closes).unwrap_or(0.5).clamp(0.0, 1.0);
    let adf_pvalue = adf_p_value(&closes).unwrap_or(0.50);
    let adx = calculate_adx(candles, 14).unwrap_or(25.0);
    let quote_volumes: Vec<f64> = candles.iter().map(|c| c.quote_volume).collect();
    let volume_cv = volume_coefficient_of_variation(&quote_volumes);

    let volatility = volatility_score(atr_pct);
    let liquidity = liquidity_score(volume_24h);
    let mean_revert = mean_revert_score(hurst, adf_pvalue);
    let momentum = momentum_score(adx);
    let stability = stability_score(volume_cv, adf_pvalue);
    let final_score = composite(volatility, liquidity, mean_revert, momentum, stability);

    CoinScore {
        symbol: symbol.to_string(),
        volatility_score: volatility,
        liquidity_score: liquidity,
        mean_revert_score: mean_revert,
        momentum_score: momentum,
        stability_score: stability,
        final_score,
        timestamp: Utc::now(),
        atr_pct,
        volume_24h,
        hurst,
        adx,
        volume_cv,
        adf_pvalue,
    }
}

/// Orchestrates batch scoring across a symbol universe: one ticker prefetch,
/// then per-symbol OHLCV fetch with a 15-minute score cache.
pub struct Scorer {
    exchange: Arc<ExchangeClient>,
    cache: ScoreCache,
}

impl Scorer {
    pub fn new(exchange: Arc<ExchangeClient>) -> Self {
        Self {
            exchange,
            cache: ScoreCache::default(),
        }
    }

    #[instrument(skip(self, symbols), fields(count = symbols.len()))]
    pub async fn score_all(&self, symbols: &[String]) -> Vec<CoinScore> {
        let tickers: HashMap<String, f64> = self.exchange.fetch_tickers().await.unwrap_or_default();

        let mut scores = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if let Some(cached) = self.cache.get(symbol) {
                scores.push(cached);
                continue;
            }

            let volume_24h = tickers.get(symbol).copied().unwrap_or(0.0);
            let score = match self.exchange.fetch_ohlcv(symbol, "1h", 168).await {
                Ok(candles) => score_from_candles(symbol, &candles, volume_24h),
                Err(err) => {
                    warn!(symbol, error = %err, "ohlcv fetch failed, using empty score");
                    CoinScore::empty(symbol.clone())
                }
            };

            self.cache.set(symbol.clone(), score.clone());
            scores.push(score);
        }
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_candle(price: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1000.0,
            quote_volume: 100_000.0,
            trades_count: 10,
            taker_buy_volume: 500.0,
            taker_buy_quote_volume: 50_000.0,
            is_closed: true,
        }
    }

    #[test]
    fn insufficient_data_yields_sentinel() {
        let candles = vec![flat_candle(100.0); 10];
        let score = score_from_candles("XRPUSDC", &candles, 10_000_000.0);
        assert_eq!(score.final_score, 0.0);
        assert_eq!(score.hurst, 0.5);
        assert_eq!(score.adx, 25.0);
        assert_eq!(score.volume_cv, 1.0);
        assert_eq!(score.adf_pvalue, 1.0);
    }

    #[test]
    fn flat_zero_volatility_series_scores_near_neutral_mean_revert() {
        let candles = vec![flat_candle(100.0); 200];
        let score = score_from_candles("XRPUSDC", &candles, 10_000_000.0);
        assert!(score.atr_pct < 1e-9);
        // flat series => ADF degenerate => fallback 0.5 p-value, hurst degenerate => fallback 0.5
        assert!((score.mean_revert_score - 50.0).abs() < 1.0);
    }

    #[test]
    fn weighted_final_score_matches_dot_product() {
        let volatility = 70.0;
        let liquidity = 85.0;
        let mean_revert = 60.0;
        let momentum = 50.0;
        let stability = 90.0;
        let expected = volatility * WEIGHT_VOLATILITY
            + liquidity * WEIGHT_LIQUIDITY
            + mean_revert * WEIGHT_MEAN_REVERT
            + momentum * WEIGHT_MOMENTUM
            + stability * WEIGHT_STABILITY;
        let actual = composite(volatility, liquidity, mean_revert, momentum, stability);
        assert!((actual - expected).abs() < 1e-6);
    }

    #[test]
    fn liquidity_score_bands() {
        assert_eq!(liquidity_score(600_000_000.0), 100.0);
        assert!(liquidity_score(20_000_000.0) < 60.0);
        assert!(liquidity_score(75_000_000.0) > 60.0 && liquidity_score(75_000_000.0) < 80.0);
    }

    #[test]
    fn momentum_score_decays_past_25() {
        let low = momentum_score(15.0);
        let mid = momentum_score(22.0);
        let high = momentum_score(40.0);
        assert!(low > mid);
        assert!(mid > high);
    }
}
