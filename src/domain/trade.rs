//! Core trading domain types.
//!
//! Requests, positions and the value types returned by quotes and applied
//! trades. Everything here is plain data; pricing lives in `clmsr`.

use serde::{Deserialize, Serialize};

use super::error::{ClmsrError, Result};
use super::fixed_point::{Rounding, Wad};

// ────────────────────────────────────────────
// Identifiers
// ────────────────────────────────────────────

/// Market identifier, assigned by the market collaborator.
pub type MarketId = u64;

/// Direction of a trade against the market maker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// Open or increase exposure; the trader pays cost.
    Buy,
    /// Decrease or close exposure; the trader receives proceeds.
    Sell,
}

impl TradeSide {
    /// Lowercase label used for metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

// ────────────────────────────────────────────
// Requests and positions
// ────────────────────────────────────────────

/// Ephemeral trade request over the inclusive bin range `[lower_bin, upper_bin]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub market_id: MarketId,
    pub lower_bin: u32,
    pub upper_bin: u32,
    pub quantity: Wad,
    pub side: TradeSide,
}

impl TradeRequest {
    pub const fn buy(market_id: MarketId, lower_bin: u32, upper_bin: u32, quantity: Wad) -> Self {
        Self {
            market_id,
            lower_bin,
            upper_bin,
            quantity,
            side: TradeSide::Buy,
        }
    }

    pub const fn sell(market_id: MarketId, lower_bin: u32, upper_bin: u32, quantity: Wad) -> Self {
        Self {
            market_id,
            lower_bin,
            upper_bin,
            quantity,
            side: TradeSide::Sell,
        }
    }
}

/// Exposure held over a bin range. Ownership is tracked by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub market_id: MarketId,
    pub lower_bin: u32,
    pub upper_bin: u32,
    pub quantity: Wad,
}

impl Position {
    /// Whether this position's range intersects `[lower_bin, upper_bin]`.
    pub const fn overlaps(&self, lower_bin: u32, upper_bin: u32) -> bool {
        self.lower_bin <= upper_bin && lower_bin <= self.upper_bin
    }
}

// ────────────────────────────────────────────
// Quote and receipt values
// ────────────────────────────────────────────

/// Result of pricing a forward trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeQuote {
    /// Cost (buy) or proceeds (sell), rounded up.
    pub amount: Wad,
    /// `amount / quantity`, informational only.
    pub average_price: Wad,
    /// Number of chunks the trade was split into.
    pub chunks: u32,
}

impl TradeQuote {
    /// Builds a quote, deriving the average price from `amount / quantity`.
    pub fn new(amount: Wad, quantity: Wad, chunks: u32) -> Result<Self> {
        let average_price = if quantity.is_zero() {
            Wad::ZERO
        } else {
            amount.div(quantity, Rounding::Down)?
        };
        Ok(Self {
            amount,
            average_price,
            chunks,
        })
    }
}

/// Result of an inverse quote: the recovered quantity and the amount the
/// forward calculation actually yields for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InverseQuote {
    pub quantity: Wad,
    pub amount: Wad,
}

/// Outcome of a trade executed through the desk, fees included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub market_id: MarketId,
    pub side: TradeSide,
    pub lower_bin: u32,
    pub upper_bin: u32,
    pub quantity: Wad,
    /// Engine cost or proceeds before fees.
    pub base_amount: Wad,
    pub fee: Wad,
    /// Cost plus fee for buys, proceeds minus fee for sells.
    pub net_amount: Wad,
    pub fee_policy: String,
}

impl TradeReceipt {
    /// Composes a base amount with a fee according to the trade side.
    pub fn compose(
        request: &TradeRequest,
        base_amount: Wad,
        fee: Wad,
        fee_policy: impl Into<String>,
    ) -> Result<Self> {
        let net_amount = match request.side {
            TradeSide::Buy => base_amount.try_add(fee)?,
            TradeSide::Sell => base_amount
                .checked_sub(fee)
                .ok_or(ClmsrError::FeeExceedsProceeds {
                    fee,
                    proceeds: base_amount,
                })?,
        };
        Ok(Self {
            market_id: request.market_id,
            side: request.side,
            lower_bin: request.lower_bin,
            upper_bin: request.upper_bin,
            quantity: request.quantity,
            base_amount,
            fee,
            net_amount,
            fee_policy: fee_policy.into(),
        })
    }
}
