//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::domain::clmsr::validate_liquidity;
use crate::domain::fees::BPS_DENOMINATOR;
use crate::domain::fixed_point::Wad;
use crate::domain::geometry::BinGeometry;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    name = %config.engine.name,
    markets = config.markets.len(),
    steps = config.scenario.len(),
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-empty market definitions with unique ids
/// - Liquidity within the supported range
/// - Non-empty, aligned tick ranges of at most the maximum bin count
/// - Fee rates of at most 100%
/// - Scenario steps that reference configured markets
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.engine.name.is_empty(),
    "Engine name must not be empty"
  );
  anyhow::ensure!(
    !config.markets.is_empty(),
    "At least one market must be configured"
  );

  let mut ids = HashSet::new();
  for market in &config.markets {
    anyhow::ensure!(
      ids.insert(market.id),
      "Market id {} ({}) is configured more than once",
      market.id,
      market.name
    );

    let liquidity = Wad::from_decimal(market.liquidity)
      .with_context(|| format!("Market {} has unrepresentable liquidity", market.id))?;
    validate_liquidity(liquidity).with_context(|| {
      format!(
        "Market {} liquidity must be in [0.001, 1000000], got {}",
        market.id, market.liquidity
      )
    })?;

    BinGeometry::new(market.min_tick, market.max_tick, market.tick_spacing)
      .with_context(|| format!("Market {} has an invalid tick geometry", market.id))?;

    if let Some(bps) = market.fee_bps {
      anyhow::ensure!(
        bps <= BPS_DENOMINATOR,
        "Market {} fee_bps must be at most {}, got {}",
        market.id,
        BPS_DENOMINATOR,
        bps
      );
    }
  }

  for (i, step) in config.scenario.iter().enumerate() {
    anyhow::ensure!(
      ids.contains(&step.market()),
      "Scenario step {} ({}) references unknown market {}",
      i,
      step.action(),
      step.market()
    );
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ScenarioStep;
  use rust_decimal_macros::dec;

  const VALID: &str = r#"
[engine]
name = "test"

[[markets]]
id = 1
name = "BTC close"
liquidity = "1000"
min_tick = 100000
max_tick = 140000
tick_spacing = 100
fee_bps = 30

[[scenario]]
action = "open"
market = 1
lower_tick = 110000
upper_tick = 111000
quantity = "25.5"

[[scenario]]
action = "claim"
market = 1
lower_tick = 110500
upper_tick = 110600
"#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_parse_valid_config() {
    let config = parse_config(VALID).unwrap();
    assert_eq!(config.engine.log_level, "info");
    assert!(config.metrics.enabled);
    assert_eq!(config.markets[0].liquidity, dec!(1000));
    assert_eq!(config.markets[0].fee_bps, Some(30));
    assert_eq!(config.scenario.len(), 2);
    assert_eq!(
      config.scenario[0],
      ScenarioStep::Open {
        market: 1,
        lower_tick: 110_000,
        upper_tick: 111_000,
        quantity: dec!(25.5),
      }
    );
  }

  #[test]
  fn test_rejects_liquidity_out_of_range() {
    let config = VALID.replace(r#"liquidity = "1000""#, r#"liquidity = "0.0001""#);
    assert!(parse_config(&config).is_err());
  }

  #[test]
  fn test_rejects_misaligned_ticks() {
    let config = VALID.replace("max_tick = 140000", "max_tick = 140050");
    assert!(parse_config(&config).is_err());
  }

  #[test]
  fn test_rejects_unknown_scenario_market() {
    let config = VALID.replace("market = 1\nlower_tick = 110500", "market = 9\nlower_tick = 110500");
    assert!(parse_config(&config).is_err());
  }

  #[test]
  fn test_rejects_excessive_fee() {
    let config = VALID.replace("fee_bps = 30", "fee_bps = 10001");
    assert!(parse_config(&config).is_err());
  }
}
