//! Scenario Runner - Replays Configured Trade Steps
//!
//! Drives a `TradeDesk` through the `[[scenario]]` steps of the
//! configuration, tracking the positions each trade opens so decreases,
//! closes and claims can be checked against what is actually held.
//! A failing step is recorded and the run continues with the next one.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ScenarioStep;
use crate::domain::error::ClmsrError;
use crate::domain::fixed_point::Wad;
use crate::domain::trade::{MarketId, Position, TradeReceipt, TradeRequest};
use crate::ports::market_source::MarketSource;

use super::engine::ClmsrEngine;
use super::trade_desk::TradeDesk;

/// Result line emitted for every step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
  pub step: usize,
  pub action: &'static str,
  pub market: MarketId,
  #[serde(flatten)]
  pub result: StepResult,
}

/// What a step produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
  Trade {
    receipt: TradeReceipt,
    position_after: Wad,
  },
  Inverse {
    quantity: Wad,
    amount: Wad,
  },
  Weight {
    lower_bin: u32,
    upper_bin: u32,
    weight: Wad,
    total: Wad,
  },
  Claim {
    positions: usize,
    payout: Wad,
  },
  Rejected {
    category: String,
    error: String,
  },
}

type PositionKey = (MarketId, u32, u32);

/// Replays scenario steps against a desk.
pub struct ScenarioRunner<M: MarketSource> {
  /// Desk executing trades.
  desk: TradeDesk<M>,
  /// Held quantity per (market, lower bin, upper bin).
  positions: BTreeMap<PositionKey, Wad>,
}

impl<M: MarketSource> ScenarioRunner<M> {
  /// Create a runner with no open positions.
  pub const fn new(desk: TradeDesk<M>) -> Self {
    Self {
      desk,
      positions: BTreeMap::new(),
    }
  }

  pub const fn desk(&self) -> &TradeDesk<M> {
    &self.desk
  }

  /// Quantity held over a bin range.
  pub fn position(&self, market: MarketId, lower_bin: u32, upper_bin: u32) -> Wad {
    self
      .positions
      .get(&(market, lower_bin, upper_bin))
      .copied()
      .unwrap_or(Wad::ZERO)
  }

  /// Run every step in order.
  pub fn run(&mut self, steps: &[ScenarioStep]) -> Vec<StepOutcome> {
    steps
      .iter()
      .enumerate()
      .map(|(i, step)| {
        let result = match self.run_step(step) {
          Ok(result) => {
            info!(step = i, action = step.action(), market = step.market(), "Scenario step completed");
            result
          }
          Err(err) => {
            let category = err
              .downcast_ref::<ClmsrError>()
              .map_or("scenario", |e| e.category().as_str());
            warn!(step = i, action = step.action(), error = %format!("{err:#}"), "Scenario step rejected");
            StepResult::Rejected {
              category: category.to_string(),
              error: format!("{err:#}"),
            }
          }
        };
        StepOutcome {
          step: i,
          action: step.action(),
          market: step.market(),
          result,
        }
      })
      .collect()
  }

  /// Run a single step.
  pub fn run_step(&mut self, step: &ScenarioStep) -> Result<StepResult> {
    match *step {
      ScenarioStep::Open {
        market,
        lower_tick,
        upper_tick,
        quantity,
      } => {
        let (lower, upper) = self.bins(market, lower_tick, upper_tick)?;
        let quantity = Wad::from_decimal(quantity).context("Invalid quantity")?;
        let receipt = self
          .desk
          .execute(&TradeRequest::buy(market, lower, upper, quantity))?;
        let held = self.position(market, lower, upper).try_add(quantity)?;
        self.positions.insert((market, lower, upper), held);
        Ok(StepResult::Trade {
          receipt,
          position_after: held,
        })
      }
      ScenarioStep::Decrease {
        market,
        lower_tick,
        upper_tick,
        quantity,
      } => {
        let (lower, upper) = self.bins(market, lower_tick, upper_tick)?;
        let quantity = Wad::from_decimal(quantity).context("Invalid quantity")?;
        self.sell(market, lower, upper, quantity)
      }
      ScenarioStep::Close {
        market,
        lower_tick,
        upper_tick,
      } => {
        let (lower, upper) = self.bins(market, lower_tick, upper_tick)?;
        let held = self.position(market, lower, upper);
        anyhow::ensure!(!held.is_zero(), "No position held over bins [{lower}, {upper}]");
        self.sell(market, lower, upper, held)
      }
      ScenarioStep::QuantityFromCost {
        market,
        lower_tick,
        upper_tick,
        cost,
      } => {
        let (lower, upper) = self.bins(market, lower_tick, upper_tick)?;
        let cost = Wad::from_decimal(cost).context("Invalid cost")?;
        let quote = self
          .engine()
          .quote_quantity_from_cost(market, lower, upper, cost)?;
        Ok(StepResult::Inverse {
          quantity: quote.quantity,
          amount: quote.amount,
        })
      }
      ScenarioStep::QuantityFromProceeds {
        market,
        lower_tick,
        upper_tick,
        proceeds,
      } => {
        let (lower, upper) = self.bins(market, lower_tick, upper_tick)?;
        let proceeds = Wad::from_decimal(proceeds).context("Invalid proceeds")?;
        let held = self.position(market, lower, upper);
        let quote = self
          .engine()
          .quote_quantity_from_proceeds(market, lower, upper, proceeds, held)?;
        Ok(StepResult::Inverse {
          quantity: quote.quantity,
          amount: quote.amount,
        })
      }
      ScenarioStep::RangeWeight {
        market,
        lower_tick,
        upper_tick,
      } => {
        let (lower, upper) = self.bins(market, lower_tick, upper_tick)?;
        Ok(StepResult::Weight {
          lower_bin: lower,
          upper_bin: upper,
          weight: self.engine().range_weight(market, lower, upper)?,
          total: self.engine().total_weight(market)?,
        })
      }
      ScenarioStep::Claim {
        market,
        lower_tick,
        upper_tick,
      } => {
        let (lower, upper) = self.bins(market, lower_tick, upper_tick)?;
        let settled: Vec<PositionKey> = self
          .positions
          .keys()
          .filter(|key| key.0 == market)
          .copied()
          .collect();
        let mut payout = Wad::ZERO;
        for key in &settled {
          if let Some(quantity) = self.positions.remove(key) {
            let position = Position {
              market_id: market,
              lower_bin: key.1,
              upper_bin: key.2,
              quantity,
            };
            payout = payout.try_add(ClmsrEngine::<M>::claim_amount(&position, lower, upper))?;
          }
        }
        Ok(StepResult::Claim {
          positions: settled.len(),
          payout,
        })
      }
    }
  }

  fn engine(&self) -> &ClmsrEngine<M> {
    self.desk.engine()
  }

  fn bins(&self, market: MarketId, lower_tick: i64, upper_tick: i64) -> Result<(u32, u32)> {
    let geometry = self.engine().markets().geometry(market)?;
    geometry
      .range_to_bins(lower_tick, upper_tick)
      .with_context(|| format!("Market {market} tick range [{lower_tick}, {upper_tick})"))
  }

  fn sell(&mut self, market: MarketId, lower: u32, upper: u32, quantity: Wad) -> Result<StepResult> {
    let held = self.position(market, lower, upper);
    anyhow::ensure!(
      quantity <= held,
      "Cannot sell {quantity} over bins [{lower}, {upper}], only {held} held"
    );
    let receipt = self
      .desk
      .execute(&TradeRequest::sell(market, lower, upper, quantity))?;
    let remaining = held.try_sub(quantity)?;
    if remaining.is_zero() {
      self.positions.remove(&(market, lower, upper));
    } else {
      self.positions.insert((market, lower, upper), remaining);
    }
    Ok(StepResult::Trade {
      receipt,
      position_after: remaining,
    })
  }
}
