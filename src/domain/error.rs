//! Engine error taxonomy.
//!
//! Every failure the pricing core can produce is a variant of
//! [`ClmsrError`]. Variants are grouped into the categories returned by
//! [`ClmsrError::category`]; none of them is fatal and none is retried
//! internally. A mutating call that fails leaves market state untouched.

use thiserror::Error;

use super::fixed_point::Wad;
use super::trade::MarketId;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ClmsrError>;

/// Coarse classification used for metrics labels and caller policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Caller-correctable input errors (bad range, bad factor, bad domain).
    Domain,
    /// Request magnitude is outside what the engine supports.
    Capacity,
    /// Requested target cannot be reached from the current distribution.
    Consistency,
    /// Market or tree lookup failures.
    Market,
}

impl ErrorCategory {
    /// Stable lowercase label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Capacity => "capacity",
            Self::Consistency => "consistency",
            Self::Market => "market",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the arithmetic layer, the range tree and the pricing engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClmsrError {
    #[error("invalid bin range: lower {lower} > upper {upper}")]
    InvalidRange { lower: u32, upper: u32 },

    #[error("bin index {index} out of bounds for {bin_count} bins")]
    IndexOutOfBounds { index: u32, bin_count: u32 },

    #[error("factor {0} outside the allowed multiplicative bounds")]
    InvalidFactor(Wad),

    #[error("{op} is undefined for input {input}")]
    DomainError { op: &'static str, input: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow in {op}")]
    ArithmeticOverflow { op: &'static str },

    #[error("quantity {quantity} exceeds the supported maximum {max}")]
    QuantityTooLarge { quantity: Wad, max: Wad },

    #[error("trade needs more than {limit} chunks")]
    ChunkLimitExceeded { limit: u32 },

    #[error("distribution has no weight to price against")]
    EmptyDistribution,

    #[error("target {0} is unreachable from the current distribution")]
    InvalidTarget(Wad),

    #[error("target {target} exceeds the maximum obtainable {max}")]
    TargetExceedsMaximum { target: Wad, max: Wad },

    #[error("implied inverse factor {0} outside the allowed bounds")]
    InverseFactorOutOfBounds(Wad),

    #[error("unknown market {0}")]
    UnknownMarket(MarketId),

    #[error("market {0} already has a tree")]
    MarketAlreadyInitialized(MarketId),

    #[error("market {0} has no tree")]
    TreeNotInitialized(MarketId),

    #[error("invalid bin count {0}")]
    InvalidBinCount(u32),

    #[error("liquidity {0} outside the supported range")]
    InvalidLiquidity(Wad),

    #[error("tick {tick} is outside the market or not a multiple of spacing {spacing}")]
    InvalidTick { tick: i64, spacing: i64 },

    #[error("invalid tick range [{lower}, {upper})")]
    InvalidTickRange { lower: i64, upper: i64 },

    #[error("fee {fee} exceeds proceeds {proceeds}")]
    FeeExceedsProceeds { fee: Wad, proceeds: Wad },
}

impl ClmsrError {
    /// Category of this error.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRange { .. }
            | Self::IndexOutOfBounds { .. }
            | Self::InvalidFactor(_)
            | Self::DomainError { .. }
            | Self::DivisionByZero
            | Self::InvalidBinCount(_)
            | Self::InvalidLiquidity(_)
            | Self::InvalidTick { .. }
            | Self::InvalidTickRange { .. } => ErrorCategory::Domain,
            Self::ArithmeticOverflow { .. }
            | Self::QuantityTooLarge { .. }
            | Self::ChunkLimitExceeded { .. } => ErrorCategory::Capacity,
            Self::EmptyDistribution
            | Self::InvalidTarget(_)
            | Self::TargetExceedsMaximum { .. }
            | Self::InverseFactorOutOfBounds(_)
            | Self::FeeExceedsProceeds { .. } => ErrorCategory::Consistency,
            Self::UnknownMarket(_)
            | Self::MarketAlreadyInitialized(_)
            | Self::TreeNotInitialized(_) => ErrorCategory::Market,
        }
    }

    pub(crate) fn overflow(op: &'static str) -> Self {
        Self::ArithmeticOverflow { op }
    }

    pub(crate) fn domain(op: &'static str, input: impl std::fmt::Display) -> Self {
        Self::DomainError {
            op,
            input: input.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(ClmsrError::DivisionByZero.category(), ErrorCategory::Domain);
        assert_eq!(
            ClmsrError::ChunkLimitExceeded { limit: 1000 }.category(),
            ErrorCategory::Capacity
        );
        assert_eq!(
            ClmsrError::InvalidTarget(Wad::ONE).category(),
            ErrorCategory::Consistency
        );
        assert_eq!(ClmsrError::UnknownMarket(7).category(), ErrorCategory::Market);
    }

    #[test]
    fn test_display_uses_wad_formatting() {
        let err = ClmsrError::InvalidFactor(Wad::from_int(200));
        assert_eq!(
            err.to_string(),
            "factor 200.000000000000000000 outside the allowed multiplicative bounds"
        );
    }
}
