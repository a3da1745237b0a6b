pub mod client;
pub mod rate_limit;

pub use client::ExchangeClient;
pub use rate_limit::{RateLimitSnapshot, RateLimitTracker};

use serde::{Deserialize, Serialize};

/// A confirmed position as reported by the venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub symbol: String,
    pub side: crate::types::Side,
    pub qty: f64,
    pub entry_price: f64,
    pub mark_price: f64,
    pub unrealized_pnl: f64,
}

/// Normalize a raw exchange symbol (`XRPUSDC`) into the `BASE/QUOTE:SETTLE`
/// ccxt-style form used in configuration and logs.
pub fn to_ccxt_symbol(raw: &str, quote: &str, settle: &str) -> String {
    let base = raw.strip_suffix(quote).unwrap_or(raw);
    format!("{base}/{quote}:{settle}")
}

/// Inverse of [`to_ccxt_symbol`].
pub fn to_raw_symbol(ccxt: &str) -> String {
    ccxt.split(':')
        .next()
        .unwrap_or(ccxt)
        .replace('/', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ccxt_symbol_roundtrip() {
        let ccxt = to_ccxt_symbol("XRPUSDC", "USDC", "USDC");
        assert_eq!(ccxt, "XRP/USDC:USDC");
        assert_eq!(to_raw_symbol(&ccxt), "XRPUSDC");
    }
}
