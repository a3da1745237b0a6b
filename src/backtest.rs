// =============================================================================
// Backtester — replays a historical tick stream through the live decision path
// =============================================================================
//
// Calls the exact same `grid::decision::grid_decision` and `SymbolState`
// mutation methods the live execution loop uses, with no separate
// reimplementation of the grid math. This is what makes the three-way
// equivalence property (live / backtest / preview) a structural guarantee
// rather than something that has to be independently verified on every
// change.
// =============================================================================

use crate::grid::{grid_decision, GridParameters, SymbolState};
use crate::types::{Side, StopReason};

#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub price: f64,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub final_state: SymbolState,
    pub final_cash_balance: f64,
    pub final_equity: f64,
    /// Set if the replay stopped early on the same max-positions /
    /// max-drawdown gates the live loop enforces, mirroring
    /// `ExecutionLoop::halted()`.
    pub halted: Option<StopReason>,
}

/// Replay `ticks` against a fresh `SymbolState`, applying the same ordering
/// rules as the live loop: long before short, take-profit before entry, and
/// the same `max_positions` entry suppression and `max_drawdown` halt the
/// live loop applies, so a tick stream that trips either gate produces the
/// same outcome here as it would live.
pub fn run_backtest(
    symbol: &str,
    ticks: &[Tick],
    starting_cash: f64,
    long_params: &GridParameters,
    short_params: &GridParameters,
    max_positions: usize,
    max_drawdown: f64,
) -> BacktestResult {
    let mut state = SymbolState::new(symbol, starting_cash);
    let mut cash = starting_cash;
    let mut halted: Option<StopReason> = None;
    let mut last_price = 0.0;

    for tick in ticks {
        if halted.is_some() {
            break;
        }
        last_price = tick.price;

        for side in [Side::Long, Side::Short] {
            let params = match side {
                Side::Long => long_params,
                Side::Short => short_params,
            };
            apply_tick(&mut state, &mut cash, side, tick.price, params, max_positions);
        }

        let equity = state.equity(cash, tick.price);
        state.update_high_water(equity);
        let drawdown = state.drawdown_from_high_water(equity);
        if drawdown >= max_drawdown {
            halted = Some(StopReason::Drawdown);
        }
    }

    let final_equity = state.equity(cash, last_price);
    BacktestResult {
        final_state: state,
        final_cash_balance: cash,
        final_equity,
        halted,
    }
}

fn apply_tick(state: &mut SymbolState, cash: &mut f64, side: Side, mark: f64, params: &GridParameters, max_positions: usize) {
    state.seed_anchor(side, mark);
    let anchor = state.side(side).last_anchor_price;
    let my_exposure = state.exposure(side);
    let opposite_exposure = state.exposure(side.opposite());

    let Ok(decision) = grid_decision(side, anchor, my_exposure, opposite_exposure, params) else {
        return;
    };

    // Take-profit before entry, matching the live loop's tie-break.
    let exposure = state.exposure(side);
    let tp_triggered = exposure > 0.0
        && match side {
            Side::Long => mark >= decision.tp_price,
            Side::Short => mark <= decision.tp_price,
        };
    if tp_triggered {
        let qty = decision.tp_qty.min(exposure);
        state.record_take_profit(side, mark, qty, params.fee_pct, cash);
    }

    let open_lot_count = state.side(Side::Long).lots.len() + state.side(Side::Short).lots.len();
    if open_lot_count >= max_positions {
        return;
    }

    if !decision.dead_mode {
        if let Some(entry_price) = decision.entry_price {
            let triggered = match side {
                Side::Long => mark <= entry_price,
                Side::Short => mark >= entry_price,
            };
            if triggered {
                let required_margin = (mark * params.base_qty) / params.leverage.max(1) as f64;
                let fee = mark * params.base_qty * params.fee_pct;
                if *cash >= required_margin + fee {
                    state.record_entry(side, mark, params.base_qty, params.leverage, params.fee_pct, cash);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn e1_single_long_take_profit_scenario() {
        // Anchor starts at the first tick's price (100); descent to 99
        // triggers a long entry; rise to 101.01 closes it for +20.1.
        let ticks = vec![Tick { price: 100.0 }, Tick { price: 99.0 }, Tick { price: 101.01 }];
        let p = params();
        let short_p = GridParameters { leverage: 1, ..p };
        let result = run_backtest("XRPUSDC", &ticks, 1000.0, &p, &short_p, 10, 1.0);

        assert!((result.final_state.realized_pnl - 20.1).abs() < 1e-6);
        assert_eq!(result.final_state.exposure(Side::Long), 0.0);
        assert!((result.final_state.long.last_anchor_price - 101.01).abs() < 1e-9);
        assert!(result.halted.is_none());
    }

    #[test]
    fn determinism_across_repeated_runs() {
        let ticks = vec![Tick { price: 100.0 }, Tick { price: 98.0 }, Tick { price: 102.0 }, Tick { price: 97.0 }];
        let p = params();
        let a = run_backtest("XRPUSDC", &ticks, 1000.0, &p, &p, 10, 1.0);
        let b = run_backtest("XRPUSDC", &ticks, 1000.0, &p, &p, 10, 1.0);
        assert_eq!(a.final_state.realized_pnl, b.final_state.realized_pnl);
        assert_eq!(a.final_cash_balance, b.final_cash_balance);
    }

    #[test]
    fn max_positions_suppresses_further_entries() {
        // Each leg down opens a new long lot; capping max_positions at 1
        // means only the first entry fires, matching `try_entry`'s
        // open_lot_count gate in the live loop.
        let ticks = vec![
            Tick { price: 100.0 },
            Tick { price: 99.0 },
            Tick { price: 98.0 },
            Tick { price: 97.0 },
        ];
        let p = params();
        let result = run_backtest("XRPUSDC", &ticks, 10_000.0, &p, &p, 1, 1.0);
        assert_eq!(result.final_state.exposure(Side::Long), 10.0);
        assert!(result.halted.is_none());
    }

    #[test]
    fn max_drawdown_halts_replay() {
        let ticks = vec![
            Tick { price: 100.0 },
            Tick { price: 50.0 },
            Tick { price: 10.0 },
        ];
        let p = GridParameters { leverage: 1, ..params() };
        let result = run_backtest("XRPUSDC", &ticks, 1000.0, &p, &p, 10, 0.05);
        assert_eq!(result.halted, Some(StopReason::Drawdown));
    }
}
