// =============================================================================
// Symbol Execution Loop (C5)
// =============================================================================
//
// One instance per enabled symbol. Owns its own `SymbolState` (single-writer,
// no lock needed) and drives it from mark-price ticks: calls the pure C1
// decision function for both sides, places orders through the exchange
// adapter, and applies confirmed fills back into state.
//
// Long-side processing always precedes short-side on a tick; within a side,
// take-profit is checked before entry so a pathological same-tick double
// trigger deleverages rather than leverages further.
// =============================================================================

use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::EngineError;
use crate::exchange::ExchangeClient;
use crate::grid::decision::{grid_decision, GridDecision, GridParameters};
use crate::grid::state::SymbolState;
use crate::types::{Side, StopReason};

pub struct ExecutionLoopConfig {
    pub symbol: String,
    pub ccxt_symbol: String,
    pub long_params: GridParameters,
    pub short_params: GridParameters,
    pub max_positions: usize,
    pub max_drawdown: f64,
}

pub struct ExecutionLoop {
    config: ExecutionLoopConfig,
    exchange: Arc<ExchangeClient>,
    cash_balance: Arc<RwLock<f64>>,
    state: SymbolState,
    halted: Option<StopReason>,
}

impl ExecutionLoop {
    pub fn new(config: ExecutionLoopConfig, exchange: Arc<ExchangeClient>, cash_balance: Arc<RwLock<f64>>, starting_equity: f64) -> Self {
        let symbol = config.symbol.clone();
        Self {
            config,
            exchange,
            cash_balance,
            state: SymbolState::new(symbol, starting_equity),
            halted: None,
        }
    }

    pub fn state(&self) -> &SymbolState {
        &self.state
    }

    pub fn halted(&self) -> Option<StopReason> {
        self.halted
    }

    /// Process one mark-price tick: both sides, then drawdown check.
    #[instrument(skip(self), fields(symbol = %self.config.symbol, mark))]
    pub async fn on_tick(&mut self, mark: f64) -> Result<()> {
        if self.halted.is_some() {
            return Ok(());
        }

        self.process_side(Side::Long, mark).await?;
        self.process_side(Side::Short, mark).await?;
        self.check_drawdown(mark);

        Ok(())
    }

    async fn process_side(&mut self, side: Side, mark: f64) -> Result<()> {
        let params = match side {
            Side::Long => self.config.long_params,
            Side::Short => self.config.short_params,
        };

        self.state.seed_anchor(side, mark);
        let anchor = self.state.side(side).last_anchor_price;
        let my_exposure = self.state.exposure(side);
        let opposite_exposure = self.state.exposure(side.opposite());

        let decision = match grid_decision(side, anchor, my_exposure, opposite_exposure, &params) {
            Ok(d) => d,
            Err(err) => {
                warn!(symbol = %self.config.symbol, error = %err, "grid decision rejected, halting symbol");
                self.halted = Some(StopReason::ConfigurationInvalid);
                return Ok(());
            }
        };

        // Take-profit is evaluated before entry so a same-tick double
        // trigger deleverages rather than leverages further.
        self.try_take_profit(side, mark, &decision, &params).await?;
        self.try_entry(side, mark, &decision, &params).await?;

        Ok(())
    }

    async fn try_take_profit(&mut self, side: Side, mark: f64, decision: &GridDecision, params: &GridParameters) -> Result<()> {
        let exposure = self.state.exposure(side);
        if exposure <= 0.0 {
            return Ok(());
        }

        let triggered = match side {
            Side::Long => mark >= decision.tp_price,
            Side::Short => mark <= decision.tp_price,
        };
        if !triggered {
            return Ok(());
        }

        let qty = decision.tp_qty.min(exposure);
        let venue_side = side.opposite();
        let client_order_id = format!("tp-{}", Uuid::new_v4());

        match self
            .exchange
            .create_order(&self.config.ccxt_symbol, venue_side, "LIMIT", qty, Some(mark), Some(&client_order_id))
            .await
        {
            Ok(_) => {
                let mut cash = self.cash_balance.write();
                let net = self.state.record_take_profit(side, mark, qty, params.fee_pct, &mut cash);
                info!(symbol = %self.config.symbol, ?side, qty, price = mark, net, "take-profit filled");
            }
            Err(err) => {
                log_order_error(&self.config.symbol, "take-profit", &err);
            }
        }

        Ok(())
    }

    async fn try_entry(&mut self, side: Side, mark: f64, decision: &GridDecision, params: &GridParameters) -> Result<()> {
        if decision.dead_mode {
            return Ok(());
        }
        let Some(entry_price) = decision.entry_price else {
            return Ok(());
        };

        let open_lot_count = self.state.side(Side::Long).lots.len() + self.state.side(Side::Short).lots.len();
        if open_lot_count >= self.config.max_positions {
            return Ok(());
        }

        let triggered = match side {
            Side::Long => mark <= entry_price,
            Side::Short => mark >= entry_price,
        };
        if !triggered {
            return Ok(());
        }

        let qty = params.base_qty;
        let required_margin = (mark * qty) / params.leverage.max(1) as f64;
        let fee = mark * qty * params.fee_pct;

        {
            let cash = self.cash_balance.read();
            if *cash < required_margin + fee {
                warn!(symbol = %self.config.symbol, ?side, "insufficient margin for entry, skipping silently");
                return Ok(());
            }
        }

        let client_order_id = format!("entry-{}", Uuid::new_v4());

        match self
            .exchange
            .create_order(&self.config.ccxt_symbol, side, "LIMIT", qty, Some(mark), Some(&client_order_id))
            .await
        {
            Ok(_) => {
                let mut cash = self.cash_balance.write();
                self.state.record_entry(side, mark, qty, params.leverage, params.fee_pct, &mut cash);
                info!(symbol = %self.config.symbol, ?side, qty, price = mark, "entry filled");
            }
            Err(err) => {
                log_order_error(&self.config.symbol, "entry", &err);
            }
        }

        Ok(())
    }

    fn check_drawdown(&mut self, mark: f64) {
        let cash = *self.cash_balance.read();
        let equity = self.state.equity(cash, mark);
        self.state.update_high_water(equity);
        let drawdown = self.state.drawdown_from_high_water(equity);

        if drawdown >= self.config.max_drawdown {
            warn!(symbol = %self.config.symbol, drawdown, "max drawdown breached, halting symbol");
            self.halted = Some(StopReason::Drawdown);
        }
    }
}

/// Insufficient funds / invalid order are logged and skipped, never fatal to
/// the loop; every other kind still doesn't crash the worker, but is logged
/// louder since it likely indicates a persistent venue problem.
fn log_order_error(symbol: &str, action: &str, err: &anyhow::Error) {
    if let Some(engine_err) = err.downcast_ref::<EngineError>() {
        match engine_err.kind {
            crate::errors::ErrorKind::InsufficientFunds | crate::errors::ErrorKind::InvalidOrder => {
                warn!(symbol, action, error = %engine_err, "order skipped (non-fatal)");
            }
            _ => {
                warn!(symbol, action, error = %engine_err, "order failed");
            }
        }
    } else {
        warn!(symbol, action, error = %err, "order failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(base_qty: f64) -> GridParameters {
        GridParameters {
            base_qty,
            take_profit_spacing: 0.01,
            grid_spacing: 0.01,
            leverage: 1,
            threshold_multiplier: 20.0,
            limit_multiplier: 5.0,
            fee_pct: 0.0,
        }
    }

    #[test]
    fn ordering_ensures_long_before_short_side_names_match_enum() {
        // Smoke test: Side ordering is a constant of the implementation, not
        // something this unit test can observe across an async I/O boundary;
        // this just pins the enum variant order the loop iterates in.
        assert_eq!(Side::Long.opposite(), Side::Short);
        assert_eq!(Side::Short.opposite(), Side::Long);
    }

    #[test]
    fn decision_dead_mode_suppresses_entry_price() {
        let p = params(10.0);
        let decision = grid_decision(Side::Long, 100.0, 250.0, 0.0, &p).unwrap();
        assert!(decision.dead_mode);
        assert!(decision.entry_price.is_none());
    }
}
