// =============================================================================
// 30-day preview — fetches recent OHLCV and replays it through the backtester
// =============================================================================
//
// The preview harness is a thin wrapper around `backtest::run_backtest`: it
// differs only in where the tick stream comes from (a fresh OHLCV fetch
// rather than a caller-supplied trace or a live feed), never in how ticks
// are applied. Byte-identical decisions for byte-identical tick streams is
// the three-way equivalence property; this module is the third leg.
// =============================================================================

use std::sync::Arc;

use anyhow::Result;
use tracing::instrument;

use crate::backtest::{run_backtest, BacktestResult, Tick};
use crate::exchange::ExchangeClient;
use crate::grid::GridParameters;

pub const PREVIEW_DEFAULT_DAYS: u32 = 30;

/// Fetch the last `days` of daily candles for `symbol` and replay them
/// through the same decision path the live engine and the backtester use.
#[instrument(skip(exchange, long_params, short_params))]
pub async fn run_preview(
    exchange: &Arc<ExchangeClient>,
    symbol: &str,
    days: u32,
    starting_cash: f64,
    long_params: &GridParameters,
    short_params: &GridParameters,
    max_positions: usize,
    max_drawdown: f64,
) -> Result<BacktestResult> {
    let candles = exchange.fetch_ohlcv(symbol, "1d", days).await?;
    let ticks: Vec<Tick> = candles.iter().map(|c| Tick { price: c.close }).collect();

    Ok(run_backtest(symbol, &ticks, starting_cash, long_params, short_params, max_positions, max_drawdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::Tick as BtTick;
    use crate::types::Side;

    fn params() -> GridParameters {
        GridParameters {
            base_qty: 10.0,
            take_profit_spacing: 0.01,
            grid_spacing: 0.01,
            leverage: 1,
            threshold_multiplier: 20.0,
            limit_multiplier: 5.0,
            fee_pct: 0.0,
        }
    }

    #[test]
    fn preview_tick_construction_matches_backtest_tick_shape() {
        // A preview tick is just a close price, same representation the
        // backtester consumes directly -- no parallel tick type drift.
        let close = 101.01;
        let tick = BtTick { price: close };
        let p = params();
        let result = run_backtest("XRPUSDC", &[BtTick { price: 100.0 }, BtTick { price: 99.0 }, tick], 1000.0, &p, &p, 10, 1.0);
        assert!((result.final_state.realized_pnl - 20.1).abs() < 1e-6);
        assert_eq!(result.final_state.exposure(Side::Long), 0.0);
    }
}
