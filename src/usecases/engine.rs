//! CLMSR Engine - Per-Market Tree Store and Trade Interface
//!
//! Owns one range tree per market and exposes the quote/apply operations
//! the market and position collaborators call:
//! 1. Snapshot the total and range weight from the market's tree
//! 2. Price the trade with the pure CLMSR formulas
//! 3. Commit every chunk factor to the tree as one atomic step
//!
//! Quotes run the same calculation as applies without committing, so a
//! quote followed by an apply on unchanged state returns the same amount.
//! Calls are synchronous and take `&mut self` to mutate, which serializes
//! every write per engine instance.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::domain::clmsr::{self, DistributionSnapshot, TradeCalculation};
use crate::domain::error::{ClmsrError, Result};
use crate::domain::fixed_point::{Rounding, Wad};
use crate::domain::range_tree::RangeTree;
use crate::domain::trade::{InverseQuote, MarketId, Position, TradeQuote};
use crate::ports::market_source::MarketSource;

/// Arena and flush statistics for one market's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TreeStats {
  pub bin_count: u32,
  pub node_count: usize,
  pub flush_count: u64,
}

/// Pricing engine holding an independent tree per market.
pub struct ClmsrEngine<M: MarketSource> {
  /// Market collaborator supplying α and geometry.
  markets: Arc<M>,
  /// Range trees keyed by market.
  trees: HashMap<MarketId, RangeTree>,
}

impl<M: MarketSource> ClmsrEngine<M> {
  /// Create an engine with no initialized markets.
  pub fn new(markets: Arc<M>) -> Self {
    Self {
      markets,
      trees: HashMap::new(),
    }
  }

  /// Market collaborator backing this engine.
  pub fn markets(&self) -> &M {
    &self.markets
  }

  /// Whether `market_id` has a tree.
  pub fn is_initialized(&self, market_id: MarketId) -> bool {
    self.trees.contains_key(&market_id)
  }

  // ────────────────────────────────────────────
  // Tree lifecycle
  // ────────────────────────────────────────────

  /// Allocate a tree of `bin_count` unit-weight bins for a known market.
  #[instrument(skip(self))]
  pub fn init_tree(&mut self, market_id: MarketId, bin_count: u32) -> Result<()> {
    if self.trees.contains_key(&market_id) {
      return Err(ClmsrError::MarketAlreadyInitialized(market_id));
    }
    clmsr::validate_liquidity(self.markets.liquidity(market_id)?)?;
    let tree = RangeTree::new(bin_count)?;
    self.trees.insert(market_id, tree);
    info!(market_id, bin_count, "Market tree initialized");
    Ok(())
  }

  /// Allocate a tree sized by the market's own geometry.
  pub fn init_market(&mut self, market_id: MarketId) -> Result<()> {
    let geometry = self.markets.geometry(market_id)?;
    self.init_tree(market_id, geometry.bin_count())
  }

  // ────────────────────────────────────────────
  // Forward pricing
  // ────────────────────────────────────────────

  /// Cost of opening `quantity` over `[lower_bin, upper_bin]`. Read-only.
  pub fn quote_open_cost(
    &self,
    market_id: MarketId,
    lower_bin: u32,
    upper_bin: u32,
    quantity: Wad,
  ) -> Result<TradeQuote> {
    let calc = self.price_open(market_id, lower_bin, upper_bin, quantity)?;
    TradeQuote::new(calc.amount, quantity, calc.chunks())
  }

  /// Largest quantity an open over the range accepts right now.
  pub fn max_open_quantity(
    &self,
    market_id: MarketId,
    lower_bin: u32,
    upper_bin: u32,
  ) -> Result<Wad> {
    let alpha = self.markets.liquidity(market_id)?;
    let snapshot = self.snapshot(market_id, lower_bin, upper_bin)?;
    clmsr::max_open_quantity(alpha, snapshot)
  }

  /// Open `quantity` over the range and commit it to the tree.
  #[instrument(skip(self))]
  pub fn apply_open(
    &mut self,
    market_id: MarketId,
    lower_bin: u32,
    upper_bin: u32,
    quantity: Wad,
  ) -> Result<TradeQuote> {
    let calc = self.price_open(market_id, lower_bin, upper_bin, quantity)?;
    self.commit(market_id, lower_bin, upper_bin, &calc)?;
    info!(
      market_id,
      cost = %calc.amount,
      chunks = calc.chunks(),
      "Open applied"
    );
    TradeQuote::new(calc.amount, quantity, calc.chunks())
  }

  /// Proceeds of decreasing `quantity` over the range. Read-only.
  pub fn quote_decrease_proceeds(
    &self,
    market_id: MarketId,
    lower_bin: u32,
    upper_bin: u32,
    quantity: Wad,
  ) -> Result<TradeQuote> {
    let calc = self.price_decrease(market_id, lower_bin, upper_bin, quantity)?;
    TradeQuote::new(calc.amount, quantity, calc.chunks())
  }

  /// Decrease `quantity` over the range and commit it to the tree.
  ///
  /// The caller guarantees `quantity` does not exceed the position.
  #[instrument(skip(self))]
  pub fn apply_decrease(
    &mut self,
    market_id: MarketId,
    lower_bin: u32,
    upper_bin: u32,
    quantity: Wad,
  ) -> Result<TradeQuote> {
    let calc = self.price_decrease(market_id, lower_bin, upper_bin, quantity)?;
    self.commit(market_id, lower_bin, upper_bin, &calc)?;
    info!(
      market_id,
      proceeds = %calc.amount,
      chunks = calc.chunks(),
      "Decrease applied"
    );
    TradeQuote::new(calc.amount, quantity, calc.chunks())
  }

  /// Proceeds of closing a whole position. Read-only.
  pub fn quote_close_proceeds(&self, position: &Position) -> Result<TradeQuote> {
    self.quote_decrease_proceeds(
      position.market_id,
      position.lower_bin,
      position.upper_bin,
      position.quantity,
    )
  }

  /// Close a whole position.
  pub fn apply_close(&mut self, position: &Position) -> Result<TradeQuote> {
    self.apply_decrease(
      position.market_id,
      position.lower_bin,
      position.upper_bin,
      position.quantity,
    )
  }

  // ────────────────────────────────────────────
  // Inverse pricing
  // ────────────────────────────────────────────

  /// Quantity purchasable for `target_cost`, with the cost the forward
  /// calculation actually charges for it.
  pub fn quote_quantity_from_cost(
    &self,
    market_id: MarketId,
    lower_bin: u32,
    upper_bin: u32,
    target_cost: Wad,
  ) -> Result<InverseQuote> {
    let alpha = self.markets.liquidity(market_id)?;
    let snapshot = self.snapshot(market_id, lower_bin, upper_bin)?;
    let quantity = clmsr::quantity_from_cost(alpha, snapshot, target_cost)?;
    let actual = clmsr::open_cost(alpha, snapshot, quantity)?;
    debug!(market_id, %target_cost, %quantity, actual = %actual.amount, "Inverse cost quoted");
    Ok(InverseQuote {
      quantity,
      amount: actual.amount,
    })
  }

  /// Quantity to sell for `target_proceeds`, capped at `position_quantity`,
  /// with the proceeds the forward calculation actually pays for it.
  pub fn quote_quantity_from_proceeds(
    &self,
    market_id: MarketId,
    lower_bin: u32,
    upper_bin: u32,
    target_proceeds: Wad,
    position_quantity: Wad,
  ) -> Result<InverseQuote> {
    let alpha = self.markets.liquidity(market_id)?;
    let snapshot = self.snapshot(market_id, lower_bin, upper_bin)?;
    let quantity =
      clmsr::quantity_from_proceeds(alpha, snapshot, target_proceeds, position_quantity)?;
    let actual = clmsr::decrease_proceeds(alpha, snapshot, quantity)?;
    debug!(market_id, %target_proceeds, %quantity, actual = %actual.amount, "Inverse proceeds quoted");
    Ok(InverseQuote {
      quantity,
      amount: actual.amount,
    })
  }

  // ────────────────────────────────────────────
  // Weights and diagnostics
  // ────────────────────────────────────────────

  /// Sum of bin weights over `[lower_bin, upper_bin]`.
  pub fn range_weight(&self, market_id: MarketId, lower_bin: u32, upper_bin: u32) -> Result<Wad> {
    self.tree(market_id)?.range_sum(lower_bin, upper_bin)
  }

  /// Sum of every bin weight of the market.
  pub fn total_weight(&self, market_id: MarketId) -> Result<Wad> {
    Ok(self.tree(market_id)?.total_sum())
  }

  /// Implied probability of a single bin: `weight / total`, rounded down.
  pub fn bin_probability(&self, market_id: MarketId, bin: u32) -> Result<Wad> {
    let tree = self.tree(market_id)?;
    tree.weight(bin)?.div(tree.total_sum(), Rounding::Down)
  }

  /// Overwrite a single bin weight (point correction).
  #[instrument(skip(self))]
  pub fn update_bin(&mut self, market_id: MarketId, bin: u32, weight: Wad) -> Result<()> {
    self.tree_mut(market_id)?.update(bin, weight)
  }

  /// Arena statistics for the market's tree.
  pub fn tree_stats(&self, market_id: MarketId) -> Result<TreeStats> {
    let tree = self.tree(market_id)?;
    Ok(TreeStats {
      bin_count: tree.bin_count(),
      node_count: tree.node_count(),
      flush_count: tree.flush_count(),
    })
  }

  /// Settlement payout of `position` for the winning bin range.
  pub const fn claim_amount(position: &Position, settlement_lower: u32, settlement_upper: u32) -> Wad {
    clmsr::claim_amount(position, settlement_lower, settlement_upper)
  }

  // ────────────────────────────────────────────
  // Internals
  // ────────────────────────────────────────────

  fn tree(&self, market_id: MarketId) -> Result<&RangeTree> {
    self
      .trees
      .get(&market_id)
      .ok_or(ClmsrError::TreeNotInitialized(market_id))
  }

  fn tree_mut(&mut self, market_id: MarketId) -> Result<&mut RangeTree> {
    self
      .trees
      .get_mut(&market_id)
      .ok_or(ClmsrError::TreeNotInitialized(market_id))
  }

  /// Reads total and range weight together. The range sum is capped at the
  /// total so rounding drift between levels cannot make it exceed the whole.
  fn snapshot(&self, market_id: MarketId, lower_bin: u32, upper_bin: u32) -> Result<DistributionSnapshot> {
    let tree = self.tree(market_id)?;
    let sum_before = tree.total_sum();
    let affected_sum = tree.range_sum(lower_bin, upper_bin)?.min(sum_before);
    Ok(DistributionSnapshot {
      sum_before,
      affected_sum,
    })
  }

  fn price_open(
    &self,
    market_id: MarketId,
    lower_bin: u32,
    upper_bin: u32,
    quantity: Wad,
  ) -> Result<TradeCalculation> {
    let alpha = self.markets.liquidity(market_id)?;
    let snapshot = self.snapshot(market_id, lower_bin, upper_bin)?;
    clmsr::open_cost(alpha, snapshot, quantity)
  }

  fn price_decrease(
    &self,
    market_id: MarketId,
    lower_bin: u32,
    upper_bin: u32,
    quantity: Wad,
  ) -> Result<TradeCalculation> {
    let alpha = self.markets.liquidity(market_id)?;
    let snapshot = self.snapshot(market_id, lower_bin, upper_bin)?;
    clmsr::decrease_proceeds(alpha, snapshot, quantity)
  }

  /// Applies every chunk factor or none of them.
  fn commit(
    &mut self,
    market_id: MarketId,
    lower_bin: u32,
    upper_bin: u32,
    calc: &TradeCalculation,
  ) -> Result<()> {
    let tree = self.tree_mut(market_id)?;
    tree.atomically(|tree| {
      for &factor in &calc.factors {
        tree.apply_range_factor(lower_bin, upper_bin, factor)?;
      }
      Ok(())
    })
  }
}
