//! Domain layer - fixed-point arithmetic, the range tree and CLMSR pricing.
//!
//! Pure, synchronous logic with no I/O. Everything here is deterministic
//! given its inputs and testable in isolation.

pub mod clmsr;
pub mod error;
pub mod fees;
pub mod fixed_point;
pub mod geometry;
pub mod range_tree;
pub mod trade;

// Re-export core types for convenience
pub use clmsr::{DistributionSnapshot, TradeCalculation};
pub use error::{ClmsrError, ErrorCategory, Result};
pub use fees::{NullFeePolicy, PercentFeePolicy};
pub use fixed_point::{Rounding, SignedWad, Wad};
pub use geometry::BinGeometry;
pub use range_tree::RangeTree;
pub use trade::{InverseQuote, MarketId, Position, TradeQuote, TradeReceipt, TradeRequest, TradeSide};
