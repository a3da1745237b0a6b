// =============================================================================
// Runtime Configuration — per-symbol grid parameters with atomic save
// =============================================================================
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default = "...")]` so that adding new
// fields never breaks loading an older config file, and unknown keys are
// ignored by serde's default struct deserialization behavior.
// =============================================================================

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::grid::GridParameters;
use crate::types::{AccountMode, TradingMode};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_take_profit_spacing() -> f64 {
    0.004
}

fn default_grid_spacing() -> f64 {
    0.006
}

fn default_initial_quantity() -> f64 {
    10.0
}

fn default_leverage() -> u32 {
    20
}

fn default_limit_multiplier() -> f64 {
    5.0
}

fn default_threshold_multiplier() -> f64 {
    20.0
}

fn default_max_drawdown() -> f64 {
    0.5
}

fn default_max_positions() -> usize {
    50
}

fn default_fee_pct() -> f64 {
    0.0004
}

fn default_symbols() -> HashMap<String, SymbolConfig> {
    HashMap::new()
}

// =============================================================================
// SymbolConfig
// =============================================================================

/// Per-symbol grid tuning, keyed by the raw exchange symbol (e.g. `XRPUSDC`)
/// in `RuntimeConfig::symbols`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub ccxt_symbol: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_take_profit_spacing")]
    pub take_profit_spacing: f64,

    #[serde(default = "default_grid_spacing")]
    pub grid_spacing: f64,

    #[serde(default = "default_initial_quantity")]
    pub initial_quantity: f64,

    #[serde(default = "default_leverage")]
    pub leverage: u32,

    #[serde(default = "default_limit_multiplier")]
    pub limit_multiplier: f64,

    #[serde(default = "default_threshold_multiplier")]
    pub threshold_multiplier: f64,
}

impl SymbolConfig {
    /// Both sides of the grid share the same spacing/leverage parameters; the
    /// symbol's config is the one source of truth for each side's
    /// `GridParameters`.
    pub fn to_grid_parameters(&self) -> GridParameters {
        GridParameters {
            base_qty: self.initial_quantity,
            take_profit_spacing: self.take_profit_spacing,
            grid_spacing: self.grid_spacing,
            leverage: self.leverage,
            threshold_multiplier: self.threshold_multiplier,
            limit_multiplier: self.limit_multiplier,
            fee_pct: default_fee_pct(),
        }
    }
}

// =============================================================================
// GlobalConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default = "default_max_drawdown")]
    pub max_drawdown: f64,

    #[serde(default = "default_max_positions")]
    pub max_positions: usize,

    #[serde(default = "default_fee_pct")]
    pub fee_pct: f64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            max_drawdown: default_max_drawdown(),
            max_positions: default_max_positions(),
            fee_pct: default_fee_pct(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the grid engine.
///
/// Every field has a serde default so that older JSON files missing new
/// fields will still deserialize correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub trading_mode: TradingMode,

    #[serde(default)]
    pub account_mode: AccountMode,

    #[serde(default = "default_symbols")]
    pub symbols: HashMap<String, SymbolConfig>,

    #[serde(default)]
    pub global: GlobalConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::Paused,
            account_mode: AccountMode::Demo,
            symbols: default_symbols(),
            global: GlobalConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols.keys().collect::<Vec<_>>(),
            trading_mode = %config.trading_mode,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self).context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    pub fn enabled_symbols(&self) -> Vec<(&String, &SymbolConfig)> {
        self.symbols.iter().filter(|(_, cfg)| cfg.enabled).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert_eq!(cfg.account_mode, AccountMode::Demo);
        assert!(cfg.symbols.is_empty());
        assert!((cfg.global.max_drawdown - 0.5).abs() < f64::EPSILON);
        assert_eq!(cfg.global.max_positions, 50);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert!(cfg.symbols.is_empty());
        assert_eq!(cfg.global.max_positions, 50);
    }

    #[test]
    fn deserialise_symbol_fills_defaults_for_missing_fields() {
        let json = r#"{
            "symbols": {
                "XRPUSDC": { "ccxt_symbol": "XRP/USDC:USDC" }
            }
        }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        let xrp = cfg.symbols.get("XRPUSDC").unwrap();
        assert!(xrp.enabled);
        assert_eq!(xrp.leverage, 20);
        assert!((xrp.take_profit_spacing - 0.004).abs() < f64::EPSILON);
        assert!((xrp.grid_spacing - 0.006).abs() < f64::EPSILON);
    }

    #[test]
    fn documented_shape_parses_exactly() {
        let json = r#"{
            "symbols": {
                "XRPUSDC": {
                    "ccxt_symbol": "XRP/USDC:USDC",
                    "enabled": true,
                    "take_profit_spacing": 0.004,
                    "grid_spacing": 0.006,
                    "initial_quantity": 30,
                    "leverage": 20,
                    "limit_multiplier": 5.0,
                    "threshold_multiplier": 20.0
                }
            },
            "global": { "max_drawdown": 0.5, "max_positions": 50, "fee_pct": 0.0004 }
        }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbols.len(), 1);
        assert_eq!(cfg.global.max_positions, 50);
        let xrp = cfg.symbols.get("XRPUSDC").unwrap();
        assert_eq!(xrp.ccxt_symbol, "XRP/USDC:USDC");
        assert!((xrp.initial_quantity - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let json = r#"{ "symbols": {}, "future_field": 42 }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert!(cfg.symbols.is_empty());
    }

    #[test]
    fn roundtrip_serialisation() {
        let mut cfg = RuntimeConfig::default();
        cfg.symbols.insert(
            "XRPUSDC".to_string(),
            SymbolConfig {
                ccxt_symbol: "XRP/USDC:USDC".to_string(),
                enabled: true,
                take_profit_spacing: 0.004,
                grid_spacing: 0.006,
                initial_quantity: 30.0,
                leverage: 20,
                limit_multiplier: 5.0,
                threshold_multiplier: 20.0,
            },
        );
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.symbols.len(), cfg2.symbols.len());
        assert_eq!(cfg.trading_mode, cfg2.trading_mode);
    }

    #[test]
    fn symbol_config_translates_to_grid_parameters() {
        let cfg = SymbolConfig {
            ccxt_symbol: "XRP/USDC:USDC".to_string(),
            enabled: true,
            take_profit_spacing: 0.004,
            grid_spacing: 0.006,
            initial_quantity: 30.0,
            leverage: 20,
            limit_multiplier: 5.0,
            threshold_multiplier: 20.0,
        };
        let params = cfg.to_grid_parameters();
        assert_eq!(params.base_qty, 30.0);
        assert_eq!(params.leverage, 20);
        assert!((params.position_threshold() - 600.0).abs() < 1e-9);
    }
}
