// =============================================================================
// Grid Decision Function — the one place entry/take-profit prices are derived
// =============================================================================
//
// Pure and side-effect free: given an anchor price and the current exposure
// on both sides, returns the next entry price, take-profit price/quantity,
// and whether dead mode should suppress new entries. The live engine, the
// backtester, and the 30-day preview all call this same function so their
// decisions are identical by construction rather than by parallel
// maintenance.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::Side;

/// Immutable per-side grid configuration for one symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GridParameters {
    pub base_qty: f64,
    pub take_profit_spacing: f64,
    pub grid_spacing: f64,
    pub leverage: u32,
    pub threshold_multiplier: f64,
    pub limit_multiplier: f64,
    pub fee_pct: f64,
}

impl GridParameters {
    pub fn position_threshold(&self) -> f64 {
        self.base_qty * self.threshold_multiplier
    }

    pub fn position_limit(&self) -> f64 {
        self.base_qty * self.limit_multiplier
    }

    /// Reject obviously broken configuration before it ever reaches a
    /// decision call. Mirrors the data-validation edge policy: invalid
    /// configuration is terminal for the symbol, not silently clamped.
    pub fn validate(&self) -> Result<(), GridDecisionError> {
        if self.base_qty <= 0.0 {
            return Err(GridDecisionError::ConfigurationInvalid("base_qty must be > 0"));
        }
        if self.take_profit_spacing <= 0.0 {
            return Err(GridDecisionError::ConfigurationInvalid(
                "take_profit_spacing must be > 0",
            ));
        }
        if self.grid_spacing <= 0.0 {
            return Err(GridDecisionError::ConfigurationInvalid("grid_spacing must be > 0"));
        }
        if self.leverage == 0 {
            return Err(GridDecisionError::ConfigurationInvalid("leverage must be >= 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridDecisionError {
    ConfigurationInvalid(&'static str),
}

impl std::fmt::Display for GridDecisionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridDecisionError::ConfigurationInvalid(reason) => {
                write!(f, "ConfigurationInvalid: {reason}")
            }
        }
    }
}

impl std::error::Error for GridDecisionError {}

/// Output of [`grid_decision`] for one side of one symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridDecision {
    /// `None` when dead mode suppresses new entries.
    pub entry_price: Option<f64>,
    pub tp_price: f64,
    pub tp_qty: f64,
    pub dead_mode: bool,
}

/// Compute the next grid decision for one side of one symbol.
///
/// `price_anchor` is the side's `last_anchor_price`; `my_position` and
/// `opposite_position` are exposures in base units. Deterministic and
/// side-effect free — identical inputs always produce an identical output.
pub fn grid_decision(
    side: Side,
    price_anchor: f64,
    my_position: f64,
    opposite_position: f64,
    params: &GridParameters,
) -> Result<GridDecision, GridDecisionError> {
    params.validate()?;

    let tp = params.take_profit_spacing;
    let gs = params.grid_spacing;

    let tp_price = match side {
        Side::Long => price_anchor * (1.0 + tp),
        Side::Short => price_anchor * (1.0 - tp),
    };

    let raw_entry_price = match side {
        Side::Long => price_anchor * (1.0 - gs),
        Side::Short => price_anchor * (1.0 + gs),
    };

    let position_threshold = params.position_threshold();
    let position_limit = params.position_limit();

    // Dead mode: one-sided accumulation past the threshold. Symmetric by
    // construction it can engage on at most one side at a time, since the
    // strict ">" comparison can't hold both ways simultaneously.
    let dead_mode = my_position >= position_threshold && my_position > opposite_position;

    let entry_price = if dead_mode { None } else { Some(raw_entry_price) };

    let tp_qty = if my_position >= position_limit {
        2.0 * params.base_qty
    } else {
        params.base_qty
    };

    Ok(GridDecision {
        entry_price,
        tp_price,
        tp_qty,
        dead_mode,
    })
}
