// =============================================================================
// Rotator (C10)
// =============================================================================
//
// Decides whether the current grid symbol should be swapped for a better-
// ranked candidate. Five gates must all pass before a signal is emitted:
// cooldown, weekly cap, current-already-top-1 short-circuit, score gap, and
// rejection memory.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Local, Utc, Weekday};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::ranker::CoinRank;

pub const DEFAULT_MIN_COOLDOWN_HOURS: i64 = 24;
pub const DEFAULT_MAX_ROTATIONS_PER_WEEK: u32 = 2;
pub const DEFAULT_SCORE_THRESHOLD: f64 = 15.0;
pub const DEFAULT_REJECTION_COOLDOWN_HOURS: i64 = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationSignal {
    pub from_symbol: String,
    pub to_symbol: String,
    pub score_diff: f64,
    pub reason: String,
    pub from_score: f64,
    pub to_score: f64,
    pub estimated_slippage: f64,
    pub timestamp: DateTime<Utc>,
}

/// Average component inputs used for the slippage estimate; callers derive
/// these from the scored candidates involved in a prospective rotation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlippageInputs {
    pub avg_liquidity_score: f64,
    pub avg_atr_pct: f64,
}

pub struct RotatorConfig {
    pub min_cooldown_hours: i64,
    pub max_rotations_per_week: u32,
    pub score_threshold: f64,
    pub rejection_cooldown_hours: i64,
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            min_cooldown_hours: DEFAULT_MIN_COOLDOWN_HOURS,
            max_rotations_per_week: DEFAULT_MAX_ROTATIONS_PER_WEEK,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            rejection_cooldown_hours: DEFAULT_REJECTION_COOLDOWN_HOURS,
        }
    }
}

struct RotatorInner {
    last_rotation_time: Option<DateTime<Utc>>,
    rotations_this_week: u32,
    week_start: DateTime<Utc>,
    rejected_signals: HashMap<(String, String), DateTime<Utc>>,
}

pub struct Rotator {
    config: RotatorConfig,
    state: RwLock<RotatorInner>,
}

impl Rotator {
    pub fn new(config: RotatorConfig) -> Self {
        Self {
            config,
            state: RwLock::new(RotatorInner {
                last_rotation_time: None,
                rotations_this_week: 0,
                week_start: current_week_start(Utc::now()),
                rejected_signals: HashMap::new(),
            }),
        }
    }

    /// Run the gate sequence and return `Some(signal)` only if every gate
    /// passes. `now` is threaded through for deterministic testing.
    #[instrument(skip(self, rankings, slippage), fields(current_symbol))]
    pub fn evaluate(
        &self,
        current_symbol: &str,
        rankings: &[CoinRank],
        slippage: SlippageInputs,
        now: DateTime<Utc>,
    ) -> Option<RotationSignal> {
        self.roll_week_if_needed(now);

        {
            let state = self.state.read();
            if let Some(last) = state.last_rotation_time {
                if now.signed_duration_since(last) < ChronoDuration::hours(self.config.min_cooldown_hours) {
                    return None;
                }
            }
            if state.rotations_this_week >= self.config.max_rotations_per_week {
                return None;
            }
        }

        let top = rankings.first()?;
        if top.symbol == current_symbol {
            return None;
        }

        let current = rankings.iter().find(|r| r.symbol == current_symbol)?;
        if current.rank == 1 {
            return None;
        }

        let score_diff = top.score - current.score;
        if score_diff < self.config.score_threshold {
            return None;
        }

        {
            let state = self.state.read();
            let key = (current_symbol.to_string(), top.symbol.clone());
            if let Some(rejected_at) = state.rejected_signals.get(&key) {
                if now.signed_duration_since(*rejected_at) < ChronoDuration::hours(self.config.rejection_cooldown_hours) {
                    return None;
                }
            }
        }

        let reason = build_reason(current, top, score_diff);
        let estimated_slippage = estimate_slippage(slippage);

        Some(RotationSignal {
            from_symbol: current_symbol.to_string(),
            to_symbol: top.symbol.clone(),
            score_diff,
            reason,
            from_score: current.score,
            to_score: top.score,
            estimated_slippage,
            timestamp: now,
        })
    }

    pub fn record_rotation(&self, signal: &RotationSignal) {
        let mut state = self.state.write();
        state.last_rotation_time = Some(signal.timestamp);
        state.rotations_this_week += 1;
    }

    pub fn record_rejection(&self, signal: &RotationSignal) {
        let mut state = self.state.write();
        state
            .rejected_signals
            .insert((signal.from_symbol.clone(), signal.to_symbol.clone()), signal.timestamp);
    }

    fn roll_week_if_needed(&self, now: DateTime<Utc>) {
        let mut state = self.state.write();
        let this_week_start = current_week_start(now);
        if this_week_start > state.week_start {
            state.week_start = this_week_start;
            state.rotations_this_week = 0;
        }
    }
}

/// The most recent Monday 00:00 in the engine's local timezone at or before
/// `now`, converted back to UTC for storage. `weekday()`/`date_naive()` run
/// against the local reading of `now`, not the UTC one, so the week boundary
/// lands where an operator watching a wall clock expects it.
fn current_week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let local_now = now.with_timezone(&Local);
    let days_since_monday = local_now.weekday().num_days_from_monday() as i64;
    let local_midnight = (local_now - ChronoDuration::days(days_since_monday))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid");

    local_midnight
        .and_local_timezone(Local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| local_midnight.and_utc())
}

fn build_reason(current: &CoinRank, top: &CoinRank, score_diff: f64) -> String {
    let mut parts = Vec::new();
    if (top.score - current.score).abs() > 10.0 {
        parts.push(format!("composite score gap {:.1}", score_diff));
    }
    if top.trend == crate::ranker::Trend::Up {
        parts.push("top candidate trending up".to_string());
    }
    if current.trend == crate::ranker::Trend::Down {
        parts.push("current symbol trending down".to_string());
    }
    if parts.is_empty() {
        format!("{} ranks above {} by {:.1} points", top.symbol, current.symbol, score_diff)
    } else {
        parts.join("; ")
    }
}

/// base 0.05%, liquidity adjustment applied as an if/else-if chain (the
/// second branch is a strict subset of the first and therefore unreachable),
/// then an independent volatility adjustment on top.
fn estimate_slippage(inputs: SlippageInputs) -> f64 {
    let mut slippage = 0.05;

    if inputs.avg_liquidity_score < 70.0 {
        slippage *= 1.5;
    } else if inputs.avg_liquidity_score < 50.0 {
        slippage *= 2.0;
    }

    if inputs.avg_atr_pct > 0.05 {
        slippage *= 1.2;
    }

    slippage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranker::{Action, Trend};

    fn rank(symbol: &str, rank: usize, score: f64, trend: Trend) -> CoinRank {
        CoinRank {
            rank,
            symbol: symbol.to_string(),
            score,
            trend,
            action: Action::Hold,
            score_change_24h: 0.0,
        }
    }

    #[test]
    fn no_signal_when_current_already_top() {
        let rotator = Rotator::new(RotatorConfig::default());
        let rankings = vec![rank("XRPUSDC", 1, 90.0, Trend::Flat), rank("ETHUSDC", 2, 70.0, Trend::Flat)];
        let signal = rotator.evaluate("XRPUSDC", &rankings, SlippageInputs::default(), Utc::now());
        assert!(signal.is_none());
    }

    #[test]
    fn no_signal_when_score_gap_below_threshold() {
        let rotator = Rotator::new(RotatorConfig::default());
        let rankings = vec![rank("ETHUSDC", 1, 80.0, Trend::Flat), rank("XRPUSDC", 2, 70.0, Trend::Flat)];
        let signal = rotator.evaluate("XRPUSDC", &rankings, SlippageInputs::default(), Utc::now());
        assert!(signal.is_none());
    }

    #[test]
    fn signal_emitted_when_gap_clears_threshold() {
        let rotator = Rotator::new(RotatorConfig::default());
        let rankings = vec![rank("ETHUSDC", 1, 90.0, Trend::Up), rank("XRPUSDC", 2, 70.0, Trend::Flat)];
        let signal = rotator.evaluate("XRPUSDC", &rankings, SlippageInputs::default(), Utc::now());
        assert!(signal.is_some());
        let signal = signal.unwrap();
        assert_eq!(signal.to_symbol, "ETHUSDC");
        assert!((signal.score_diff - 20.0).abs() < 1e-9);
    }

    #[test]
    fn cooldown_blocks_rotation_within_window() {
        // E5: record A->B at t=0, request A->C with a large gap at t=23h -- rejected.
        let rotator = Rotator::new(RotatorConfig::default());
        let t0 = Utc::now();
        let rankings_ab = vec![rank("B", 1, 90.0, Trend::Flat), rank("A", 2, 60.0, Trend::Flat)];
        let signal = rotator.evaluate("A", &rankings_ab, SlippageInputs::default(), t0).unwrap();
        rotator.record_rotation(&signal);

        let rankings_ac = vec![rank("C", 1, 90.0, Trend::Flat), rank("A", 2, 60.0, Trend::Flat)];
        let t_23h = t0 + ChronoDuration::hours(23);
        assert!(rotator.evaluate("A", &rankings_ac, SlippageInputs::default(), t_23h).is_none());

        let t_24h_eps = t0 + ChronoDuration::hours(24) + ChronoDuration::minutes(1);
        assert!(rotator.evaluate("A", &rankings_ac, SlippageInputs::default(), t_24h_eps).is_some());
    }

    #[test]
    fn weekly_cap_blocks_third_rotation() {
        let rotator = Rotator::new(RotatorConfig {
            min_cooldown_hours: 0,
            ..RotatorConfig::default()
        });
        let t0 = Utc::now();
        for i in 0..2 {
            let rankings = vec![rank("TOP", 1, 90.0, Trend::Flat), rank("CUR", 2, 60.0, Trend::Flat)];
            let t = t0 + ChronoDuration::hours(i);
            let signal = rotator.evaluate("CUR", &rankings, SlippageInputs::default(), t);
            if let Some(s) = signal {
                rotator.record_rotation(&s);
            }
        }
        let rankings = vec![rank("TOP", 1, 90.0, Trend::Flat), rank("CUR", 2, 60.0, Trend::Flat)];
        assert!(rotator.evaluate("CUR", &rankings, SlippageInputs::default(), t0 + ChronoDuration::hours(5)).is_none());
    }

    #[test]
    fn rejection_memory_blocks_same_pair_within_window() {
        let rotator = Rotator::new(RotatorConfig::default());
        let t0 = Utc::now();
        let rankings = vec![rank("TOP", 1, 90.0, Trend::Flat), rank("CUR", 2, 60.0, Trend::Flat)];
        let signal = rotator.evaluate("CUR", &rankings, SlippageInputs::default(), t0).unwrap();
        rotator.record_rejection(&signal);

        let t_later = t0 + ChronoDuration::hours(1);
        assert!(rotator.evaluate("CUR", &rankings, SlippageInputs::default(), t_later).is_none());
    }

    #[test]
    fn slippage_second_liquidity_branch_is_unreachable() {
        // Documented elif-bug: liquidity < 50 still only triggers the <70 branch (x1.5),
        // because that branch's condition already matched first.
        let low_liquidity = SlippageInputs { avg_liquidity_score: 30.0, avg_atr_pct: 0.0 };
        let mid_liquidity = SlippageInputs { avg_liquidity_score: 60.0, avg_atr_pct: 0.0 };
        assert!((estimate_slippage(low_liquidity) - estimate_slippage(mid_liquidity)).abs() < 1e-9);
        assert!((estimate_slippage(low_liquidity) - 0.075).abs() < 1e-9);
    }

    #[test]
    fn volatility_adjustment_applies_independently() {
        let inputs = SlippageInputs { avg_liquidity_score: 90.0, avg_atr_pct: 0.08 };
        let slippage = estimate_slippage(inputs);
        assert!((slippage - 0.06).abs() < 1e-9);
    }
}
