//! Fee schedules applied on top of engine cost and proceeds.
//!
//! The pricing core never sees fees. A desk quotes a fee from one of these
//! schedules and composes it with the engine amount: added to cost, taken
//! out of proceeds. Fees round up so fractional wei always go to the venue.

use serde::{Deserialize, Serialize};

use super::error::Result;
use super::fixed_point::{Rounding, Wad};

/// Basis points in one whole.
pub const BPS_DENOMINATOR: u16 = 10_000;

/// Charges nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullFeePolicy;

impl NullFeePolicy {
    pub const fn fee(self, _base_amount: Wad) -> Wad {
        Wad::ZERO
    }
}

/// Charges a flat share of the base amount, in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentFeePolicy {
    bps: u16,
}

impl PercentFeePolicy {
    /// Returns `None` for rates above 100%.
    pub const fn new(bps: u16) -> Option<Self> {
        if bps > BPS_DENOMINATOR {
            return None;
        }
        Some(Self { bps })
    }

    pub const fn bps(self) -> u16 {
        self.bps
    }

    /// `base_amount * bps / 10_000`, rounded up.
    pub fn fee(self, base_amount: Wad) -> Result<Wad> {
        base_amount.mul_div(
            u128::from(self.bps),
            u128::from(BPS_DENOMINATOR),
            Rounding::Up,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_fee() {
        assert_eq!(NullFeePolicy.fee(Wad::from_int(1_000)), Wad::ZERO);
    }

    #[test]
    fn test_percent_fee_rounds_up() {
        let policy = PercentFeePolicy::new(50).unwrap();
        assert_eq!(policy.fee(Wad::from_int(200)).unwrap(), Wad::ONE);
        assert_eq!(policy.fee(Wad::from_raw(1)).unwrap(), Wad::from_raw(1));
        assert_eq!(policy.fee(Wad::ZERO).unwrap(), Wad::ZERO);
    }

    #[test]
    fn test_percent_fee_rejects_rates_above_one() {
        assert!(PercentFeePolicy::new(10_000).is_some());
        assert!(PercentFeePolicy::new(10_001).is_none());
    }
}
