// =============================================================================
// Heartbeat — status snapshot consumed by external supervisors
// =============================================================================
//
// A plain serializable value; this crate does not bind a socket or serve
// HTTP for it. An external adapter is responsible for publishing it over
// whatever transport it likes (per the out-of-scope HTTP surfaces).
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub side: String,
    pub qty: f64,
    pub entry_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSnapshot {
    pub symbol: String,
    pub halted: Option<String>,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatSnapshot {
    pub status: String,
    pub is_trading: bool,
    pub total_pnl: f64,
    pub unrealized_pnl: f64,
    pub equity: f64,
    pub available_balance: f64,
    pub positions: Vec<PositionSnapshot>,
    pub symbols: Vec<SymbolSnapshot>,
    pub timestamp: DateTime<Utc>,
}

pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_the_documented_shape() {
        let snapshot = HeartbeatSnapshot {
            status: "running".to_string(),
            is_trading: true,
            total_pnl: 12.5,
            unrealized_pnl: 3.0,
            equity: 1015.5,
            available_balance: 900.0,
            positions: vec![],
            symbols: vec![],
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        for key in ["status", "is_trading", "total_pnl", "unrealized_pnl", "equity", "available_balance", "positions", "symbols", "timestamp"] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
    }
}
