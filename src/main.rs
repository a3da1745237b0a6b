// =============================================================================
// Gridwatch — Multi-Symbol Perpetual Grid Engine — Main Entry Point
// =============================================================================
//
// Loads runtime configuration, builds the supervisor, and spawns one
// execution-loop worker per enabled symbol plus a scanner/ranker/rotator
// loop on its own interval. Shuts down gracefully on ctrl-c: stops every
// worker, persists configuration, and emits a final heartbeat.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod backtest;
mod errors;
mod exchange;
mod grid;
mod heartbeat;
mod market_data;
mod preview;
mod ranker;
mod retry;
mod rotator;
mod runtime_config;
mod scanner;
mod scoring;
mod supervisor;
mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::interval;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::errors::exit_code;
use crate::exchange::ExchangeClient;
use crate::grid::{ExecutionLoop, ExecutionLoopConfig, SymbolState};
use crate::market_data::{run_kline_stream, CandleBuffer, CandleKey};
use crate::ranker::Ranker;
use crate::rotator::{Rotator, RotatorConfig, SlippageInputs};
use crate::runtime_config::RuntimeConfig;
use crate::scanner::{ScanFilters, Scanner};
use crate::scoring::Scorer;
use crate::supervisor::Supervisor;
use crate::types::TradingMode;

const CONFIG_PATH_ENV: &str = "GRID_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "grid_config.json";
const SCAN_ROTATE_INTERVAL: Duration = Duration::from_secs(15 * 60);
const TICK_POLL_INTERVAL: Duration = Duration::from_secs(1);
const STREAM_STALE_AFTER: Duration = Duration::from_secs(60);
const MAX_STREAM_RECONNECT_ATTEMPTS: u32 = 10;
const CANDLE_BUFFER_DEPTH: usize = 500;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("gridwatch starting up");

    let config_path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load runtime config, using defaults");
        RuntimeConfig::default()
    });

    if config.trading_mode != TradingMode::Live {
        info!(trading_mode = %config.trading_mode, "engine starting in non-live mode");
    }

    // ── 2. Build the exchange client ─────────────────────────────────────
    let api_key = std::env::var("EXCHANGE_API_KEY").unwrap_or_default();
    let api_secret = std::env::var("EXCHANGE_API_SECRET").unwrap_or_default();
    if api_key.is_empty() || api_secret.is_empty() {
        warn!("EXCHANGE_API_KEY / EXCHANGE_API_SECRET not set; signed calls will fail");
    }

    let exchange = Arc::new(ExchangeClient::new(api_key, api_secret));
    let starting_balance = match exchange.fetch_balance().await {
        Ok(balances) => balances.iter().map(|b| b.free).sum(),
        Err(e) => {
            warn!(error = %e, "failed to fetch starting balance, defaulting to 0");
            0.0
        }
    };

    let supervisor = Arc::new(Supervisor::new(config.clone(), config_path.clone(), exchange.clone(), starting_balance));
    let cash_balance = Arc::new(RwLock::new(starting_balance));

    // ── 3. Spawn one execution-loop worker per enabled symbol ───────────
    let mut symbol_states: HashMap<String, Arc<RwLock<SymbolState>>> = HashMap::new();
    let mut workers = Vec::new();

    for (symbol, symbol_cfg) in config.enabled_symbols() {
        let symbol = symbol.clone();
        let params = symbol_cfg.to_grid_parameters();
        let loop_config = ExecutionLoopConfig {
            symbol: symbol.clone(),
            ccxt_symbol: symbol_cfg.ccxt_symbol.clone(),
            long_params: params,
            short_params: params,
            max_positions: config.global.max_positions,
            max_drawdown: config.global.max_drawdown,
        };

        let exec_loop = ExecutionLoop::new(loop_config, exchange.clone(), cash_balance.clone(), starting_balance);
        symbol_states.insert(symbol.clone(), Arc::new(RwLock::new(SymbolState::new(symbol.clone(), starting_balance))));

        let candle_buffer = Arc::new(CandleBuffer::new(CANDLE_BUFFER_DEPTH));

        let stream_buffer = candle_buffer.clone();
        let stream_symbol = symbol.clone();
        workers.push(tokio::spawn(async move {
            run_market_data_stream(&stream_symbol, stream_buffer).await;
        }));

        let exchange_for_task = exchange.clone();
        let supervisor_for_task = supervisor.clone();
        let symbol_for_task = symbol.clone();

        workers.push(tokio::spawn(async move {
            run_symbol_worker(exec_loop, exchange_for_task, supervisor_for_task, candle_buffer, symbol_for_task).await;
        }));
    }

    info!(count = workers.len(), "symbol workers launched");

    // ── 4. Scanner / ranker / rotator loop ───────────────────────────────
    let scanner = Arc::new(Scanner::new(exchange.clone(), ScanFilters::default()));
    let ranker = Arc::new(Ranker::new(Scorer::new(exchange.clone())));
    let rotator = Arc::new(Rotator::new(RotatorConfig::default()));

    let rotation_handle = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            run_rotation_loop(supervisor, scanner, ranker, rotator).await;
        })
    };

    info!("all subsystems running, press ctrl-c to stop");

    // ── 5. Graceful shutdown ──────────────────────────────────────────────
    match tokio::signal::ctrl_c().await {
        Ok(()) => warn!("shutdown signal received, stopping gracefully"),
        Err(e) => error!(error = %e, "failed to listen for ctrl-c"),
    }

    supervisor.stop_all().await;
    rotation_handle.abort();
    for worker in workers {
        worker.abort();
    }

    if let Err(e) = supervisor.persist_config() {
        error!(error = %e, "failed to persist runtime config on shutdown");
    }

    let final_heartbeat = supervisor.heartbeat(&HashMap::new(), &symbol_states);
    info!(equity = final_heartbeat.equity, total_pnl = final_heartbeat.total_pnl, "final heartbeat emitted");

    info!("gridwatch shut down complete");
    std::process::exit(exit_code::USER_SHUTDOWN);
}

/// Keeps a symbol's 1m kline stream connected, reconnecting with exponential
/// backoff. After `MAX_STREAM_RECONNECT_ATTEMPTS` consecutive failures the
/// symbol worker falls back to pull-only (REST) mode permanently for this
/// process lifetime — the stream task simply stops retrying.
async fn run_market_data_stream(symbol: &str, buffer: Arc<CandleBuffer>) {
    let mut attempt: u32 = 0;
    loop {
        match run_kline_stream(symbol, "1m", &buffer).await {
            Ok(()) => attempt = 0,
            Err(e) => {
                attempt += 1;
                warn!(symbol, error = %e, attempt, "kline stream error");
            }
        }

        if attempt >= MAX_STREAM_RECONNECT_ATTEMPTS {
            warn!(symbol, "kline stream unhealthy after max reconnect attempts, falling back to pull-only mode");
            return;
        }

        let delay = Supervisor::restart_backoff_delay(attempt.max(1));
        tokio::time::sleep(delay).await;
    }
}

/// Drives one symbol's execution loop from the pushed mark-price stream,
/// falling back to a direct REST pull when the stream has gone stale.
async fn run_symbol_worker(mut exec_loop: ExecutionLoop, exchange: Arc<ExchangeClient>, supervisor: Arc<Supervisor>, buffer: Arc<CandleBuffer>, symbol: String) {
    let key = CandleKey { symbol: symbol.clone(), interval: "1m".to_string() };
    let mut last_seen = std::time::Instant::now() - STREAM_STALE_AFTER;
    let mut attempt: u32 = 0;

    loop {
        if let Some(reason) = exec_loop.halted() {
            supervisor.halt_symbol(&symbol, reason);
            return;
        }

        let mark = if last_seen.elapsed() < STREAM_STALE_AFTER {
            buffer.last_close(&key)
        } else {
            None
        };

        let mark = match mark {
            Some(price) => {
                last_seen = std::time::Instant::now();
                Some(price)
            }
            None => match exchange.fetch_ohlcv(&symbol, "1m", 1).await {
                Ok(candles) => candles.last().map(|c| c.close),
                Err(e) => {
                    supervisor.record_error(&symbol, e.to_string());
                    attempt += 1;
                    let delay = Supervisor::restart_backoff_delay(attempt);
                    warn!(symbol = %symbol, error = %e, attempt, delay_secs = delay.as_secs(), "mark-price fetch failed, backing off");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            },
        };

        attempt = 0;
        if let Some(mark) = mark {
            if let Err(e) = exec_loop.on_tick(mark).await {
                supervisor.record_error(&symbol, e.to_string());
                warn!(symbol = %symbol, error = %e, "tick processing failed");
            }
        }

        tokio::time::sleep(TICK_POLL_INTERVAL).await;
    }
}

/// Periodically scans the universe, refreshes rankings, and checks the
/// rotator for each currently-enabled symbol.
async fn run_rotation_loop(supervisor: Arc<Supervisor>, scanner: Arc<Scanner>, ranker: Arc<Ranker>, rotator: Arc<Rotator>) {
    let mut ticker = interval(SCAN_ROTATE_INTERVAL);
    loop {
        ticker.tick().await;

        let config = supervisor.config_snapshot();
        let universe: Vec<String> = config.symbols.keys().cloned().collect();
        if universe.is_empty() {
            continue;
        }

        let candidates = scanner.scan(&universe, 50).await;
        let candidate_symbols: Vec<String> = candidates.iter().map(|c| c.symbol.clone()).collect();
        let rankings = ranker.get_rankings(&candidate_symbols).await;

        for (symbol, _symbol_cfg) in config.enabled_symbols() {
            if supervisor.is_halted(symbol) {
                continue;
            }
            if let Some(signal) = rotator.evaluate(symbol, &rankings, SlippageInputs::default(), chrono::Utc::now()) {
                info!(from = %signal.from_symbol, to = %signal.to_symbol, reason = %signal.reason, "rotation signal emitted");
                rotator.record_rotation(&signal);
            }
        }
    }
}
