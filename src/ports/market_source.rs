//! Market Source Port - Market Parameters Interface
//!
//! The engine does not own market lifecycle. It asks the market
//! collaborator for the two things pricing needs: the liquidity
//! parameter α and the tick/bin geometry.

use crate::domain::error::Result;
use crate::domain::fixed_point::Wad;
use crate::domain::geometry::BinGeometry;
use crate::domain::trade::MarketId;

/// Read-only view of market parameters.
///
/// Implementors return `ClmsrError::UnknownMarket` for ids they do not
/// know. Liquidity is validated by the implementor when the market is
/// created and is not re-checked on every trade.
pub trait MarketSource: Send + Sync {
  /// Liquidity parameter α of the market.
  fn liquidity(&self, market_id: MarketId) -> Result<Wad>;

  /// Tick range and spacing of the market.
  fn geometry(&self, market_id: MarketId) -> Result<BinGeometry>;
}
