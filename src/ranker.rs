// =============================================================================
// Ranker (C9)
// =============================================================================
//
// Maintains a time-stamped history of CoinScore per symbol, derives a trend
// arrow from the two most recent scores, and assigns a recommended action
// tag. History older than 7 days is pruned on every update.
// =============================================================================

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::scoring::{CoinScore, Scorer};

const HISTORY_RETENTION: chrono::Duration = chrono::Duration::days(7);
const DEFAULT_UPDATE_INTERVAL_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let glyph = match self {
            Trend::Up => "\u{2191}",
            Trend::Down => "\u{2193}",
            Trend::Flat => "\u{2192}",
        };
        write!(f, "{glyph}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Hold,
    Watch,
    Monitor,
    Avoid,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Hold => "HOLD",
            Action::Watch => "WATCH",
            Action::Monitor => "MONITOR",
            Action::Avoid => "AVOID",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinRank {
    pub rank: usize,
    pub symbol: String,
    pub score: f64,
    pub trend: Trend,
    pub action: Action,
    pub score_change_24h: f64,
}

struct History {
    entries: Vec<CoinScore>,
}

pub struct Ranker {
    scorer: Scorer,
    history: RwLock<HashMap<String, History>>,
    update_interval: Duration,
    last_update: RwLock<Option<DateTime<Utc>>>,
    cached_rankings: RwLock<Vec<CoinRank>>,
}

impl Ranker {
    pub fn new(scorer: Scorer) -> Self {
        Self {
            scorer,
            history: RwLock::new(HashMap::new()),
            update_interval: Duration::from_secs(DEFAULT_UPDATE_INTERVAL_MINUTES as u64 * 60),
            last_update: RwLock::new(None),
            cached_rankings: RwLock::new(Vec::new()),
        }
    }

    /// Score the given universe, append to history, prune stale entries, and
    /// compute fresh rankings. Returns a cached result if called again
    /// within `update_interval`.
    #[instrument(skip(self, symbols), fields(count = symbols.len()))]
    pub async fn get_rankings(&self, symbols: &[String]) -> Vec<CoinRank> {
        if let Some(last) = *self.last_update.read() {
            if Utc::now().signed_duration_since(last) < chrono::Duration::from_std(self.update_interval).unwrap() {
                return self.cached_rankings.read().clone();
            }
        }

        let scores = self.scorer.score_all(symbols).await;
        let now = Utc::now();

        {
            let mut history = self.history.write();
            for score in &scores {
                let entry = history.entry(score.symbol.clone()).or_insert_with(|| History { entries: Vec::new() });
                entry.entries.push(score.clone());
                entry.entries.retain(|s| now.signed_duration_since(s.timestamp) <= HISTORY_RETENTION);
            }
        }

        let mut ranked: Vec<(String, f64)> = scores.iter().map(|s| (s.symbol.clone(), s.final_score)).collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let history = self.history.read();
        let mut rankings = Vec::with_capacity(ranked.len());
        for (rank_idx, (symbol, score)) in ranked.into_iter().enumerate() {
            let rank = rank_idx + 1;
            let (trend, score_change_24h) = history
                .get(&symbol)
                .map(|h| trend_and_change(&h.entries))
                .unwrap_or((Trend::Flat, 0.0));
            let action = classify_action(score, rank, trend);

            rankings.push(CoinRank {
                rank,
                symbol,
                score,
                trend,
                action,
                score_change_24h,
            });
        }

        *self.last_update.write() = Some(now);
        *self.cached_rankings.write() = rankings.clone();
        rankings
    }
}

fn trend_and_change(entries: &[CoinScore]) -> (Trend, f64) {
    if entries.len() < 2 {
        return (Trend::Flat, 0.0);
    }
    let prev = &entries[entries.len() - 2];
    let curr = &entries[entries.len() - 1];
    let diff = curr.final_score - prev.final_score;
    let trend = if diff > 2.0 {
        Trend::Up
    } else if diff < -2.0 {
        Trend::Down
    } else {
        Trend::Flat
    };
    (trend, diff)
}

fn classify_action(score: f64, rank: usize, trend: Trend) -> Action {
    if score >= 80.0 && rank < 3 {
        if trend == Trend::Down {
            Action::Watch
        } else {
            Action::Hold
        }
    } else if score >= 70.0 && trend == Trend::Up && rank < 5 {
        Action::Watch
    } else if score >= 50.0 {
        Action::Monitor
    } else {
        Action::Avoid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score_at(symbol: &str, final_score: f64, timestamp: DateTime<Utc>) -> CoinScore {
        CoinScore {
            symbol: symbol.to_string(),
            volatility_score: 50.0,
            liquidity_score: 50.0,
            mean_revert_score: 50.0,
            momentum_score: 50.0,
            stability_score: 50.0,
            final_score,
            timestamp,
            atr_pct: 0.03,
            volume_24h: 100_000_000.0,
            hurst: 0.4,
            adx: 15.0,
            volume_cv: 0.4,
            adf_pvalue: 0.02,
        }
    }

    #[test]
    fn trend_up_requires_gain_above_two() {
        let now = Utc::now();
        let entries = vec![score_at("X", 70.0, now - chrono::Duration::hours(1)), score_at("X", 73.5, now)];
        let (trend, diff) = trend_and_change(&entries);
        assert_eq!(trend, Trend::Up);
        assert!((diff - 3.5).abs() < 1e-9);
    }

    #[test]
    fn trend_flat_within_band() {
        let now = Utc::now();
        let entries = vec![score_at("X", 70.0, now - chrono::Duration::hours(1)), score_at("X", 71.0, now)];
        let (trend, _) = trend_and_change(&entries);
        assert_eq!(trend, Trend::Flat);
    }

    #[test]
    fn single_entry_has_no_trend() {
        let entries = vec![score_at("X", 70.0, Utc::now())];
        let (trend, diff) = trend_and_change(&entries);
        assert_eq!(trend, Trend::Flat);
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn action_hold_requires_top_rank_and_high_score() {
        assert_eq!(classify_action(85.0, 1, Trend::Flat), Action::Hold);
        assert_eq!(classify_action(85.0, 1, Trend::Down), Action::Watch);
        assert_eq!(classify_action(85.0, 5, Trend::Flat), Action::Monitor);
    }

    #[test]
    fn action_watch_requires_uptrend_and_top_five() {
        assert_eq!(classify_action(72.0, 4, Trend::Up), Action::Watch);
        assert_eq!(classify_action(72.0, 4, Trend::Flat), Action::Monitor);
        assert_eq!(classify_action(72.0, 8, Trend::Up), Action::Monitor);
    }

    #[test]
    fn action_avoid_below_fifty() {
        assert_eq!(classify_action(30.0, 10, Trend::Flat), Action::Avoid);
    }
}
