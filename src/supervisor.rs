// =============================================================================
// Engine Supervisor (C6)
// =============================================================================
//
// Owns the set of running symbol workers, the single RuntimeConfig instance,
// and a reconciliation loop against the exchange. A failed worker is
// restarted with exponential backoff rather than bringing down its peers;
// the backoff budget is capped per hour so a persistently broken symbol
// degrades to "parked" instead of spinning.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::errors::ErrorKind;
use crate::exchange::ExchangeClient;
use crate::grid::{ExecutionLoop, ExecutionLoopConfig, GridDecision};
use crate::heartbeat::{HeartbeatSnapshot, PositionSnapshot, SymbolSnapshot};
use crate::runtime_config::RuntimeConfig;
use crate::types::{Side, StopReason, TradingMode};

const MAX_RECENT_ERRORS: usize = 50;
const MAX_RECENT_DECISIONS: usize = 100;
const MAX_RESTARTS_PER_HOUR: u32 = 12;
const BACKOFF_BASE: Duration = Duration::from_secs(5);
const BACKOFF_CAP: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct RecentError {
    pub timestamp: chrono::DateTime<Utc>,
    pub symbol: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct RecentDecision {
    pub timestamp: chrono::DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub dead_mode: bool,
}

struct RestartBudget {
    window_start: Instant,
    count: u32,
}

impl RestartBudget {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            count: 0,
        }
    }

    fn try_consume(&mut self) -> bool {
        if self.window_start.elapsed() >= Duration::from_secs(3600) {
            self.window_start = Instant::now();
            self.count = 0;
        }
        if self.count >= MAX_RESTARTS_PER_HOUR {
            return false;
        }
        self.count += 1;
        true
    }
}

struct WorkerHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Owns workers, config, shared balance, and status history for the engine.
pub struct Supervisor {
    config: RwLock<RuntimeConfig>,
    config_path: PathBuf,
    exchange: Arc<ExchangeClient>,
    cash_balance: Arc<RwLock<f64>>,
    workers: RwLock<HashMap<String, WorkerHandle>>,
    halted_symbols: RwLock<HashMap<String, StopReason>>,
    restart_budgets: RwLock<HashMap<String, RestartBudget>>,
    recent_errors: RwLock<VecDeque<RecentError>>,
    recent_decisions: RwLock<VecDeque<RecentDecision>>,
    reconciliation_drift_count: std::sync::atomic::AtomicU64,
    shutting_down: AtomicBool,
}

impl Supervisor {
    pub fn new(config: RuntimeConfig, config_path: impl Into<PathBuf>, exchange: Arc<ExchangeClient>, starting_balance: f64) -> Self {
        Self {
            config: RwLock::new(config),
            config_path: config_path.into(),
            exchange,
            cash_balance: Arc::new(RwLock::new(starting_balance)),
            workers: RwLock::new(HashMap::new()),
            halted_symbols: RwLock::new(HashMap::new()),
            restart_budgets: RwLock::new(HashMap::new()),
            recent_errors: RwLock::new(VecDeque::new()),
            recent_decisions: RwLock::new(VecDeque::new()),
            reconciliation_drift_count: std::sync::atomic::AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn record_error(&self, symbol: impl Into<String>, message: impl Into<String>) {
        let mut errors = self.recent_errors.write();
        if errors.len() >= MAX_RECENT_ERRORS {
            errors.pop_front();
        }
        errors.push_back(RecentError {
            timestamp: Utc::now(),
            symbol: symbol.into(),
            message: message.into(),
        });
    }

    pub fn record_decision(&self, symbol: impl Into<String>, side: Side, decision: &GridDecision) {
        let mut decisions = self.recent_decisions.write();
        if decisions.len() >= MAX_RECENT_DECISIONS {
            decisions.pop_front();
        }
        decisions.push_back(RecentDecision {
            timestamp: Utc::now(),
            symbol: symbol.into(),
            side,
            dead_mode: decision.dead_mode,
        });
    }

    pub fn recent_errors(&self) -> Vec<RecentError> {
        self.recent_errors.read().iter().cloned().collect()
    }

    pub fn recent_decisions(&self) -> Vec<RecentDecision> {
        self.recent_decisions.read().iter().cloned().collect()
    }

    pub fn halt_symbol(&self, symbol: &str, reason: StopReason) {
        warn!(symbol, ?reason, "symbol halted");
        self.halted_symbols.write().insert(symbol.to_string(), reason);
    }

    pub fn is_halted(&self, symbol: &str) -> bool {
        self.halted_symbols.read().contains_key(symbol)
    }

    pub fn halted_symbols_snapshot(&self) -> HashMap<String, StopReason> {
        self.halted_symbols.read().clone()
    }

    /// Whether a worker restart is permitted within this hour's budget.
    fn try_consume_restart_budget(&self, symbol: &str) -> bool {
        let mut budgets = self.restart_budgets.write();
        budgets.entry(symbol.to_string()).or_insert_with(RestartBudget::new).try_consume()
    }

    /// Exponential backoff delay for the given restart attempt, matching the
    /// ambient retry policy's shape (base 5s, cap 5min).
    pub fn restart_backoff_delay(attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(5);
        let scaled = BACKOFF_BASE.saturating_mul(1u32 << exp);
        scaled.min(BACKOFF_CAP)
    }

    /// Stop a running worker, if any, signalling it to finish in-flight I/O
    /// before exiting.
    #[instrument(skip(self))]
    pub async fn stop_symbol(&self, symbol: &str) {
        let handle = self.workers.write().remove(symbol);
        if let Some(handle) = handle {
            let _ = handle.stop_tx.send(true);
            let _ = tokio::time::timeout(Duration::from_secs(30), handle.join).await;
        }
    }

    /// Signal every worker to stop and wait up to 60s total.
    #[instrument(skip(self))]
    pub async fn stop_all(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let symbols: Vec<String> = self.workers.read().keys().cloned().collect();
        let _ = tokio::time::timeout(Duration::from_secs(60), async {
            for symbol in symbols {
                self.stop_symbol(&symbol).await;
            }
        })
        .await;
    }

    pub fn persist_config(&self) -> anyhow::Result<()> {
        self.config.read().save(&self.config_path)
    }

    pub fn config_snapshot(&self) -> RuntimeConfig {
        self.config.read().clone()
    }

    pub fn cash_balance(&self) -> f64 {
        *self.cash_balance.read()
    }

    /// Periodically re-fetch balance and positions from the exchange and
    /// compare against what the symbol loops believe; logs and counts drift
    /// without panicking. The exchange is the source of truth.
    #[instrument(skip(self))]
    pub async fn reconcile_once(&self) -> anyhow::Result<()> {
        let balances = self.exchange.fetch_balance().await?;
        let venue_total: f64 = balances.iter().map(|b| b.free).sum();
        let local = self.cash_balance();

        let drift = (venue_total - local).abs();
        if drift > 1e-6 {
            self.reconciliation_drift_count.fetch_add(1, Ordering::Relaxed);
            warn!(venue_total, local, drift, "balance drift detected during reconciliation");
        }

        let positions = self.exchange.fetch_positions(None).await?;
        info!(open_positions = positions.len(), "reconciliation pass complete");

        Ok(())
    }

    pub fn drift_count(&self) -> u64 {
        self.reconciliation_drift_count.load(Ordering::Relaxed)
    }

    pub fn heartbeat(&self, mark_prices: &HashMap<String, f64>, symbol_states: &HashMap<String, Arc<RwLock<crate::grid::SymbolState>>>) -> HeartbeatSnapshot {
        let config = self.config.read();
        let trading = config.trading_mode == TradingMode::Live;

        let mut positions = Vec::new();
        let mut symbols = Vec::new();
        let mut total_unrealized = 0.0;
        let mut total_realized = 0.0;

        for (symbol, state) in symbol_states {
            let mark = mark_prices.get(symbol).copied().unwrap_or(0.0);
            let state = state.read();
            let unrealized = state.unrealized_pnl(mark);
            total_unrealized += unrealized;
            total_realized += state.realized_pnl;

            for (side, side_state) in [(Side::Long, &state.long), (Side::Short, &state.short)] {
                for lot in &side_state.lots {
                    positions.push(PositionSnapshot {
                        symbol: symbol.clone(),
                        side: side.to_string(),
                        qty: lot.qty,
                        entry_price: lot.entry_price,
                    });
                }
            }

            symbols.push(SymbolSnapshot {
                symbol: symbol.clone(),
                halted: self.halted_symbols.read().get(symbol).map(|r| r.to_string()),
                realized_pnl: state.realized_pnl,
                unrealized_pnl: unrealized,
                equity: state.equity(self.cash_balance(), mark),
            });
        }

        HeartbeatSnapshot {
            status: if trading { "running".to_string() } else { "paused".to_string() },
            is_trading: trading,
            total_pnl: total_realized + total_unrealized,
            unrealized_pnl: total_unrealized,
            equity: self.cash_balance() + total_unrealized,
            available_balance: self.cash_balance(),
            positions,
            symbols,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_supervisor() -> Supervisor {
        let exchange = Arc::new(ExchangeClient::new("key", "secret"));
        Supervisor::new(RuntimeConfig::default(), "grid_config.json", exchange, 1000.0)
    }

    #[test]
    fn restart_backoff_grows_then_caps() {
        let d1 = Supervisor::restart_backoff_delay(1);
        let d2 = Supervisor::restart_backoff_delay(2);
        let d10 = Supervisor::restart_backoff_delay(10);
        assert_eq!(d1, Duration::from_secs(5));
        assert_eq!(d2, Duration::from_secs(10));
        assert_eq!(d10, BACKOFF_CAP);
    }

    #[test]
    fn restart_budget_exhausts_after_twelve_per_hour() {
        let mut budget = RestartBudget::new();
        for _ in 0..MAX_RESTARTS_PER_HOUR {
            assert!(budget.try_consume());
        }
        assert!(!budget.try_consume());
    }

    #[test]
    fn recent_errors_ring_buffer_bounds_at_fifty() {
        let sup = make_supervisor();
        for i in 0..60 {
            sup.record_error("XRPUSDC", format!("error {i}"));
        }
        assert_eq!(sup.recent_errors().len(), MAX_RECENT_ERRORS);
        // Oldest entries are evicted first.
        assert!(sup.recent_errors()[0].message.contains("10"));
    }

    #[test]
    fn recent_decisions_ring_buffer_bounds_at_hundred() {
        let sup = make_supervisor();
        let decision = GridDecision {
            entry_price: Some(99.0),
            tp_price: 101.0,
            tp_qty: 10.0,
            dead_mode: false,
        };
        for _ in 0..150 {
            sup.record_decision("XRPUSDC", Side::Long, &decision);
        }
        assert_eq!(sup.recent_decisions().len(), MAX_RECENT_DECISIONS);
    }

    #[test]
    fn halted_symbol_is_tracked() {
        let sup = make_supervisor();
        assert!(!sup.is_halted("XRPUSDC"));
        sup.halt_symbol("XRPUSDC", StopReason::Drawdown);
        assert!(sup.is_halted("XRPUSDC"));
    }
}
