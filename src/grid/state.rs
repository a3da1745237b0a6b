// =============================================================================
// Per-Symbol Grid State — FIFO lots, anchor tracking, realized PnL
// =============================================================================
//
// Owned by exactly one symbol's execution-loop task; no internal locking is
// needed (single-writer). Grounded on the teacher's position-manager shape
// (open/closed bookkeeping, trade log) but reworked around FIFO lot closure
// instead of one position per side.
// =============================================================================

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::Side;

/// A single open grid entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Lot {
    pub entry_price: f64,
    pub qty: f64,
    pub margin: f64,
}

/// A closed-lot (or partial-lot) fill, appended to the trade log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub qty: f64,
    pub gross_pnl: f64,
    pub fee: f64,
    pub net_pnl: f64,
}

/// State for one side (long or short) of one symbol's grid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SideState {
    pub lots: VecDeque<Lot>,
    pub last_anchor_price: f64,
}

impl SideState {
    pub fn exposure(&self) -> f64 {
        self.lots.iter().map(|l| l.qty).sum()
    }

    pub fn open_notional(&self) -> f64 {
        self.lots.iter().map(|l| l.entry_price * l.qty).sum()
    }

    /// Seed the anchor to the first observed market price, once. A no-op
    /// once the anchor has moved off its zero-value default, whether that
    /// happened via this seed or via a real fill.
    fn seed_anchor(&mut self, mark: f64) {
        if self.last_anchor_price == 0.0 {
            self.last_anchor_price = mark;
        }
    }
}

/// Full grid state for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolState {
    pub symbol: String,
    pub long: SideState,
    pub short: SideState,
    pub realized_pnl: f64,
    pub equity_high_water: f64,
    #[serde(skip)]
    pub trade_log: Vec<TradeRecord>,
}

impl SymbolState {
    pub fn new(symbol: impl Into<String>, starting_equity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            long: SideState::default(),
            short: SideState::default(),
            realized_pnl: 0.0,
            equity_high_water: starting_equity,
            trade_log: Vec::new(),
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut SideState {
        match side {
            Side::Long => &mut self.long,
            Side::Short => &mut self.short,
        }
    }

    pub fn side(&self, side: Side) -> &SideState {
        match side {
            Side::Long => &self.long,
            Side::Short => &self.short,
        }
    }

    pub fn exposure(&self, side: Side) -> f64 {
        self.side(side).exposure()
    }

    /// Seed a side's anchor to `mark` the first time it is observed, matching
    /// the reference engine's `_init_orders(price)` behavior of pinning the
    /// initial reference price once, rather than sliding it to every tick.
    pub fn seed_anchor(&mut self, side: Side, mark: f64) {
        self.side_mut(side).seed_anchor(mark);
    }

    /// Record a confirmed entry fill: append a lot, deduct margin + fee from
    /// equity, and move the anchor to this fill price.
    pub fn record_entry(
        &mut self,
        side: Side,
        price: f64,
        qty: f64,
        leverage: u32,
        fee_pct: f64,
        cash_balance: &mut f64,
    ) {
        let margin = (price * qty) / leverage.max(1) as f64;
        let fee = price * qty * fee_pct;
        *cash_balance -= margin + fee;

        let state = self.side_mut(side);
        state.lots.push_back(Lot {
            entry_price: price,
            qty,
            margin,
        });
        state.last_anchor_price = price;
    }

    /// Record a confirmed take-profit fill: close lots FIFO up to
    /// `requested_qty`, crediting margin + net PnL back to equity.
    /// Returns the net PnL realized by this close.
    pub fn record_take_profit(
        &mut self,
        side: Side,
        price: f64,
        requested_qty: f64,
        fee_pct: f64,
        cash_balance: &mut f64,
    ) -> f64 {
        let mut remaining = requested_qty;
        let mut total_net = 0.0;

        let state = self.side_mut(side);

        while remaining > 1e-12 {
            let Some(mut lot) = state.lots.pop_front() else {
                break;
            };

            let closed_qty = lot.qty.min(remaining);
            let gross = match side {
                Side::Long => (price - lot.entry_price) * closed_qty,
                Side::Short => (lot.entry_price - price) * closed_qty,
            };
            let fee = price * closed_qty * fee_pct;
            let net = gross - fee;
            let margin_fraction = lot.margin * (closed_qty / lot.qty);

            *cash_balance += margin_fraction + net;
            total_net += net;
            remaining -= closed_qty;

            if closed_qty < lot.qty {
                // Partial close: shrink the head lot and put it back.
                lot.qty -= closed_qty;
                lot.margin -= margin_fraction;
                state.lots.push_front(lot);
                break;
            }
        }

        state.last_anchor_price = price;
        self.realized_pnl += total_net;

        self.trade_log.push(TradeRecord {
            side,
            entry_price: price,
            exit_price: price,
            qty: requested_qty - remaining,
            gross_pnl: total_net,
            fee: 0.0,
            net_pnl: total_net,
        });

        total_net
    }

    pub fn unrealized_pnl(&self, mark: f64) -> f64 {
        let long_pnl: f64 = self
            .long
            .lots
            .iter()
            .map(|l| (mark - l.entry_price) * l.qty)
            .sum();
        let short_pnl: f64 = self
            .short
            .lots
            .iter()
            .map(|l| (l.entry_price - mark) * l.qty)
            .sum();
        long_pnl + short_pnl
    }

    pub fn equity(&self, cash_balance: f64, mark: f64) -> f64 {
        cash_balance + self.unrealized_pnl(mark)
    }

    /// Update the high-water mark; equity high-water is monotonic
    /// non-decreasing by construction.
    pub fn update_high_water(&mut self, equity: f64) {
        if equity > self.equity_high_water {
            self.equity_high_water = equity;
        }
    }

    pub fn drawdown_from_high_water(&self, equity: f64) -> f64 {
        if self.equity_high_water <= 0.0 {
            return 0.0;
        }
        ((self.equity_high_water - equity) / self.equity_high_water).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_closure_order() {
        let mut state = SymbolState::new("XRPUSDC", 1000.0);
        let mut cash = 1000.0;
        state.record_entry(Side::Long, 100.0, 5.0, 1, 0.0, &mut cash);
        state.record_entry(Side::Long, 99.0, 5.0, 1, 0.0, &mut cash);

        // Closing 5 units must consume the *first* lot (entered at 100), not
        // the second.
        state.record_take_profit(Side::Long, 110.0, 5.0, 0.0, &mut cash);
        assert_eq!(state.long.lots.len(), 1);
        assert!((state.long.lots[0].entry_price - 99.0).abs() < 1e-9);
    }

    #[test]
    fn anchor_only_moves_on_fill() {
        let mut state = SymbolState::new("XRPUSDC", 1000.0);
        let mut cash = 1000.0;
        assert_eq!(state.long.last_anchor_price, 0.0);
        state.record_entry(Side::Long, 100.0, 1.0, 1, 0.0, &mut cash);
        assert_eq!(state.long.last_anchor_price, 100.0);
    }

    #[test]
    fn e1_single_long_take_profit_scenario() {
        // base_qty=10, tp=0.01, gs=0.01, leverage=1, fee_pct=0.
        // Entry at 99 qty 10 margin 990; TP at 101.01; PnL = 20.1.
        let mut state = SymbolState::new("XRPUSDC", 0.0);
        let mut cash = 1000.0;
        state.record_entry(Side::Long, 99.0, 10.0, 1, 0.0, &mut cash);
        assert!((cash - 10.0).abs() < 1e-9); // 1000 - 990 margin
        let net = state.record_take_profit(Side::Long, 101.01, 10.0, 0.0, &mut cash);
        assert!((net - 20.1).abs() < 1e-6);
        assert_eq!(state.exposure(Side::Long), 0.0);
        assert!((state.long.last_anchor_price - 101.01).abs() < 1e-9);
    }

    #[test]
    fn closing_more_than_open_stops_at_zero() {
        let mut state = SymbolState::new("XRPUSDC", 1000.0);
        let mut cash = 1000.0;
        state.record_entry(Side::Long, 100.0, 5.0, 1, 0.0, &mut cash);
        state.record_take_profit(Side::Long, 110.0, 50.0, 0.0, &mut cash);
        assert_eq!(state.exposure(Side::Long), 0.0);
    }

    #[test]
    fn high_water_is_monotonic() {
        let mut state = SymbolState::new("XRPUSDC", 100.0);
        state.update_high_water(150.0);
        assert_eq!(state.equity_high_water, 150.0);
        state.update_high_water(120.0);
        assert_eq!(state.equity_high_water, 150.0);
    }
}
