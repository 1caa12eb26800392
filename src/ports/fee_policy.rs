//! Fee Policy Port - Fee Quoting Interface
//!
//! Fees are quoted after the engine has priced a trade and are composed
//! with its result by the caller. A policy never alters the engine amount.

use crate::domain::error::Result;
use crate::domain::fees::{NullFeePolicy, PercentFeePolicy};
use crate::domain::fixed_point::Wad;
use crate::domain::trade::{MarketId, TradeSide};

/// Trade details available to a fee policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeContext {
  pub market_id: MarketId,
  pub lower_bin: u32,
  pub upper_bin: u32,
}

/// Pure fee quote: `(side, quantity, base_amount, context) -> fee`.
pub trait FeePolicy: Send + Sync {
  /// Fee owed on top of cost (buy) or out of proceeds (sell).
  fn quote_fee(
    &self,
    side: TradeSide,
    quantity: Wad,
    base_amount: Wad,
    context: &FeeContext,
  ) -> Result<Wad>;

  /// Short identifier recorded on receipts.
  fn name(&self) -> &'static str;
}

impl FeePolicy for NullFeePolicy {
  fn quote_fee(
    &self,
    _side: TradeSide,
    _quantity: Wad,
    base_amount: Wad,
    _context: &FeeContext,
  ) -> Result<Wad> {
    Ok(self.fee(base_amount))
  }

  fn name(&self) -> &'static str {
    "null"
  }
}

impl FeePolicy for PercentFeePolicy {
  fn quote_fee(
    &self,
    _side: TradeSide,
    _quantity: Wad,
    base_amount: Wad,
    _context: &FeeContext,
  ) -> Result<Wad> {
    self.fee(base_amount)
  }

  fn name(&self) -> &'static str {
    "percent"
  }
}
