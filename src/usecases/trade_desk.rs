//! Trade Desk - Fee Composition Around the Engine
//!
//! The desk is the caller the engine expects: it prices a request, asks the
//! market's fee policy for a fee on the base amount, composes the two into a
//! receipt and only then commits the trade. A request that fails at any
//! step, fee composition included, leaves the market untouched.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::error::Result;
use crate::domain::trade::{MarketId, TradeQuote, TradeReceipt, TradeRequest, TradeSide};
use crate::ports::fee_policy::{FeeContext, FeePolicy};
use crate::ports::market_source::MarketSource;
use crate::ports::trade_observer::TradeObserver;

use super::engine::ClmsrEngine;

/// Executes trade requests against an engine with per-market fee policies.
pub struct TradeDesk<M: MarketSource> {
  /// Pricing engine.
  engine: ClmsrEngine<M>,
  /// Fee policy for markets without an override.
  default_policy: Box<dyn FeePolicy>,
  /// Per-market fee overrides.
  policies: HashMap<MarketId, Box<dyn FeePolicy>>,
  /// Receives executed and rejected trades.
  observer: Arc<dyn TradeObserver>,
}

impl<M: MarketSource> TradeDesk<M> {
  /// Create a desk over `engine`.
  pub fn new(
    engine: ClmsrEngine<M>,
    default_policy: Box<dyn FeePolicy>,
    observer: Arc<dyn TradeObserver>,
  ) -> Self {
    Self {
      engine,
      default_policy,
      policies: HashMap::new(),
      observer,
    }
  }

  /// Override the fee policy of one market.
  #[must_use]
  pub fn with_market_policy(mut self, market_id: MarketId, policy: Box<dyn FeePolicy>) -> Self {
    self.policies.insert(market_id, policy);
    self
  }

  pub const fn engine(&self) -> &ClmsrEngine<M> {
    &self.engine
  }

  pub const fn engine_mut(&mut self) -> &mut ClmsrEngine<M> {
    &mut self.engine
  }

  /// Fee policy in force for `market_id`.
  pub fn policy(&self, market_id: MarketId) -> &dyn FeePolicy {
    self
      .policies
      .get(&market_id)
      .map_or(self.default_policy.as_ref(), |policy| policy.as_ref())
  }

  /// Price a request with fees, without committing it.
  pub fn quote(&self, request: &TradeRequest) -> Result<TradeReceipt> {
    let quote = self.engine_quote(request)?;
    self.receipt(request, &quote)
  }

  /// Price, compose fees and commit a request.
  #[instrument(skip(self), fields(market_id = request.market_id, side = %request.side))]
  pub fn execute(&mut self, request: &TradeRequest) -> Result<TradeReceipt> {
    match self.try_execute(request) {
      Ok((receipt, chunks)) => {
        info!(
          base = %receipt.base_amount,
          fee = %receipt.fee,
          net = %receipt.net_amount,
          chunks,
          "Trade executed"
        );
        self.observer.on_trade(&receipt, chunks);
        Ok(receipt)
      }
      Err(err) => {
        warn!(error = %err, category = %err.category(), "Trade rejected");
        self.observer.on_rejection(request.side, &err);
        Err(err)
      }
    }
  }

  fn try_execute(&mut self, request: &TradeRequest) -> Result<(TradeReceipt, u32)> {
    let quote = self.engine_quote(request)?;
    let receipt = self.receipt(request, &quote)?;
    let applied = match request.side {
      TradeSide::Buy => self.engine.apply_open(
        request.market_id,
        request.lower_bin,
        request.upper_bin,
        request.quantity,
      )?,
      TradeSide::Sell => self.engine.apply_decrease(
        request.market_id,
        request.lower_bin,
        request.upper_bin,
        request.quantity,
      )?,
    };
    debug_assert_eq!(applied.amount, quote.amount);
    Ok((receipt, applied.chunks))
  }

  fn engine_quote(&self, request: &TradeRequest) -> Result<TradeQuote> {
    match request.side {
      TradeSide::Buy => self.engine.quote_open_cost(
        request.market_id,
        request.lower_bin,
        request.upper_bin,
        request.quantity,
      ),
      TradeSide::Sell => self.engine.quote_decrease_proceeds(
        request.market_id,
        request.lower_bin,
        request.upper_bin,
        request.quantity,
      ),
    }
  }

  fn receipt(&self, request: &TradeRequest, quote: &TradeQuote) -> Result<TradeReceipt> {
    let policy = self.policy(request.market_id);
    let context = FeeContext {
      market_id: request.market_id,
      lower_bin: request.lower_bin,
      upper_bin: request.upper_bin,
    };
    let fee = policy.quote_fee(request.side, request.quantity, quote.amount, &context)?;
    TradeReceipt::compose(request, quote.amount, fee, policy.name())
  }
}
