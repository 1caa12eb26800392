//! Configuration Module - TOML-based Engine Configuration
//!
//! Loads and validates `config.toml`: engine identity, the markets the
//! engine prices (liquidity and tick geometry), metrics output and an
//! optional scenario of trade steps to replay. Market parameters live
//! here and reach the engine only through the `MarketSource` port.

pub mod loader;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::trade::MarketId;

/// Top-level engine configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before any market tree is created.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Engine identity and logging.
  pub engine: EngineConfig,
  /// Market definitions.
  pub markets: Vec<MarketConfig>,
  /// Metrics output.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Trade steps replayed by the scenario runner, in order.
  #[serde(default)]
  pub scenario: Vec<ScenarioStep>,
}

/// Engine identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
  /// Human-readable engine name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Individual market configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
  /// Market identifier.
  pub id: MarketId,
  /// Human-readable market name.
  pub name: String,
  /// Liquidity parameter α as a decimal string (e.g. "1000").
  pub liquidity: Decimal,
  /// Lowest tick of the market (inclusive).
  pub min_tick: i64,
  /// Highest tick of the market (exclusive).
  pub max_tick: i64,
  /// Ticks per bin.
  #[serde(default = "default_tick_spacing")]
  pub tick_spacing: i64,
  /// Flat fee in basis points; no fee when absent.
  pub fee_bps: Option<u16>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Print the Prometheus text exposition after a run.
  #[serde(default = "default_true")]
  pub enabled: bool,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self { enabled: true }
  }
}

/// One scenario step. Tick ranges are `[lower_tick, upper_tick)`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
  /// Buy `quantity` over the range.
  Open {
    market: MarketId,
    lower_tick: i64,
    upper_tick: i64,
    quantity: Decimal,
  },
  /// Sell `quantity` of the position held over the range.
  Decrease {
    market: MarketId,
    lower_tick: i64,
    upper_tick: i64,
    quantity: Decimal,
  },
  /// Sell the whole position held over the range.
  Close {
    market: MarketId,
    lower_tick: i64,
    upper_tick: i64,
  },
  /// Quote how much a cost budget buys.
  QuantityFromCost {
    market: MarketId,
    lower_tick: i64,
    upper_tick: i64,
    cost: Decimal,
  },
  /// Quote how much of the held position yields the target proceeds.
  QuantityFromProceeds {
    market: MarketId,
    lower_tick: i64,
    upper_tick: i64,
    proceeds: Decimal,
  },
  /// Report the weight held by the range.
  RangeWeight {
    market: MarketId,
    lower_tick: i64,
    upper_tick: i64,
  },
  /// Settle every held position of the market against a winning range.
  Claim {
    market: MarketId,
    lower_tick: i64,
    upper_tick: i64,
  },
}

impl ScenarioStep {
  /// Market the step targets.
  pub const fn market(&self) -> MarketId {
    match self {
      Self::Open { market, .. }
      | Self::Decrease { market, .. }
      | Self::Close { market, .. }
      | Self::QuantityFromCost { market, .. }
      | Self::QuantityFromProceeds { market, .. }
      | Self::RangeWeight { market, .. }
      | Self::Claim { market, .. } => *market,
    }
  }

  /// Step label used in results and logs.
  pub const fn action(&self) -> &'static str {
    match self {
      Self::Open { .. } => "open",
      Self::Decrease { .. } => "decrease",
      Self::Close { .. } => "close",
      Self::QuantityFromCost { .. } => "quantity_from_cost",
      Self::QuantityFromProceeds { .. } => "quantity_from_proceeds",
      Self::RangeWeight { .. } => "range_weight",
      Self::Claim { .. } => "claim",
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

const fn default_true() -> bool {
  true
}

const fn default_tick_spacing() -> i64 {
  1
}
