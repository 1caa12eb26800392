//! Continuous LMSR (CLMSR) cost and proceeds formulas.
//!
//! Pricing is a pure function of the liquidity parameter α and a
//! [`DistributionSnapshot`]: the total weight before the trade and the
//! weight held by the traded bin range.
//!
//! Opening `q` over a range multiplies the range's weights by `e^(q/α)`:
//!
//! `cost = α * ln(sum_after / sum_before)`
//!
//! Decreasing mirrors it with `e^(-q/α)`. Trades larger than
//! `α * MAX_EXP_INPUT` are split into chunks priced in sequence, each
//! against the distribution left by the previous one. Each chunk carries
//! its growth, weights and logarithm at 1e36 and rounds up once when
//! scaling by α, so no chunk is ever charged below its exact cost and
//! splitting a trade cannot undercut pricing it whole.

use super::error::{ClmsrError, Result};
use super::fixed_point::{
    MAX_CHUNKS, MAX_FACTOR, MIN_FACTOR, Rounding, WAD, Wad, grow_up, ln, max_chunk, mul_ln_ratio,
    safe_exp, shrink_up,
};
use super::trade::{Position, TradeSide};

/// Smallest accepted liquidity parameter (0.001).
pub const MIN_LIQUIDITY: Wad = Wad::from_raw(WAD / 1_000);

/// Largest accepted liquidity parameter (1,000,000).
pub const MAX_LIQUIDITY: Wad = Wad::from_raw(1_000_000 * WAD);

/// Largest total weight an open may leave behind, a quarter of the `u128`
/// range so tree rescaling keeps headroom.
pub const MAX_TOTAL_WEIGHT: Wad = Wad::from_raw(u128::MAX / 4);

/// Weight totals read at the start of a pricing calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionSnapshot {
    /// Sum of every bin weight.
    pub sum_before: Wad,
    /// Sum of the weights inside the traded range.
    pub affected_sum: Wad,
}

/// Outcome of a forward calculation, including the factors that commit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeCalculation {
    /// Cost or proceeds, the sum of the per-chunk amounts.
    pub amount: Wad,
    /// Range factor for each chunk, in application order.
    pub factors: Vec<Wad>,
    pub sum_after: Wad,
    pub affected_after: Wad,
}

impl TradeCalculation {
    #[allow(clippy::cast_possible_truncation)]
    pub fn chunks(&self) -> u32 {
        // bounded by MAX_CHUNKS
        self.factors.len() as u32
    }
}

/// Rejects a liquidity parameter outside `[MIN_LIQUIDITY, MAX_LIQUIDITY]`.
pub fn validate_liquidity(alpha: Wad) -> Result<()> {
    if alpha < MIN_LIQUIDITY || alpha > MAX_LIQUIDITY {
        return Err(ClmsrError::InvalidLiquidity(alpha));
    }
    Ok(())
}

/// Largest quantity priced in a single chunk: `α * MAX_EXP_INPUT`.
pub fn max_chunk_quantity(alpha: Wad) -> Result<Wad> {
    max_chunk(alpha)
}

/// Largest quantity a single trade may carry: `α * MAX_EXP_INPUT * MAX_CHUNKS`.
pub fn max_trade_quantity(alpha: Wad) -> Result<Wad> {
    max_chunk(alpha)?.mul_div(u128::from(MAX_CHUNKS), 1, Rounding::Down)
}

/// Fails fast with `QuantityTooLarge` before any chunk is priced.
pub fn ensure_tradeable(quantity: Wad, alpha: Wad) -> Result<()> {
    let max = max_trade_quantity(alpha)?;
    if quantity > max {
        return Err(ClmsrError::QuantityTooLarge { quantity, max });
    }
    Ok(())
}

/// Largest quantity an open on `snapshot` may carry before the range
/// weight `affected * e^(q/α)` pushes the total past [`MAX_TOTAL_WEIGHT`],
/// capped by [`max_trade_quantity`].
pub fn max_open_quantity(alpha: Wad, snapshot: DistributionSnapshot) -> Result<Wad> {
    ensure_priceable(snapshot)?;
    let limit = max_trade_quantity(alpha)?;
    let rest = snapshot.sum_before.saturating_sub(snapshot.affected_sum);
    let room = match MAX_TOTAL_WEIGHT.checked_sub(rest) {
        Some(room) if room > snapshot.affected_sum => room,
        _ => return Ok(Wad::ZERO),
    };
    let capacity = mul_ln_ratio(alpha, room, snapshot.affected_sum, Rounding::Down)?;
    Ok(capacity.min(limit))
}

/// Cost of opening or increasing exposure by `quantity`.
pub fn open_cost(
    alpha: Wad,
    snapshot: DistributionSnapshot,
    quantity: Wad,
) -> Result<TradeCalculation> {
    price_chunks(alpha, snapshot, quantity, TradeSide::Buy)
}

/// Proceeds of decreasing exposure by `quantity`.
pub fn decrease_proceeds(
    alpha: Wad,
    snapshot: DistributionSnapshot,
    quantity: Wad,
) -> Result<TradeCalculation> {
    price_chunks(alpha, snapshot, quantity, TradeSide::Sell)
}

fn price_chunks(
    alpha: Wad,
    snapshot: DistributionSnapshot,
    quantity: Wad,
    side: TradeSide,
) -> Result<TradeCalculation> {
    if quantity.is_zero() {
        return Ok(TradeCalculation {
            amount: Wad::ZERO,
            factors: Vec::new(),
            sum_after: snapshot.sum_before,
            affected_after: snapshot.affected_sum,
        });
    }
    ensure_tradeable(quantity, alpha)?;
    ensure_priceable(snapshot)?;
    if side == TradeSide::Buy {
        let max = max_open_quantity(alpha, snapshot)?;
        if quantity > max {
            return Err(ClmsrError::QuantityTooLarge { quantity, max });
        }
    }

    let chunk_cap = max_chunk_quantity(alpha)?;
    let mut sum_before = snapshot.sum_before;
    let mut affected = snapshot.affected_sum;
    let mut remaining = quantity;
    let mut amount = Wad::ZERO;
    let mut factors = Vec::new();

    while !remaining.is_zero() {
        if factors.len() >= MAX_CHUNKS as usize {
            return Err(ClmsrError::ChunkLimitExceeded { limit: MAX_CHUNKS });
        }
        let chunk = remaining.min(chunk_cap);
        let rest = sum_before.saturating_sub(affected);

        // Weights after the chunk are upper bounds, so the next chunk never
        // prices against less weight than the exact curve holds.
        let (factor, affected_after) = match side {
            TradeSide::Buy => (grow_up(Wad::ONE, chunk, alpha)?, grow_up(affected, chunk, alpha)?),
            TradeSide::Sell => (
                shrink_up(Wad::ONE, chunk, alpha)?,
                shrink_up(affected, chunk, alpha)?,
            ),
        };
        let sum_after = rest.try_add(affected_after)?;
        let chunk_amount = match side {
            TradeSide::Buy => mul_ln_ratio(alpha, sum_after, sum_before, Rounding::Up)?,
            TradeSide::Sell => mul_ln_ratio(alpha, sum_before, sum_after, Rounding::Up)?,
        };

        amount = amount.try_add(chunk_amount)?;
        factors.push(factor);
        sum_before = sum_after;
        affected = affected_after;
        remaining = remaining.try_sub(chunk)?;
    }

    Ok(TradeCalculation {
        amount,
        factors,
        sum_after: sum_before,
        affected_after: affected,
    })
}

fn ensure_priceable(snapshot: DistributionSnapshot) -> Result<()> {
    if snapshot.sum_before.is_zero() || snapshot.affected_sum.is_zero() {
        return Err(ClmsrError::EmptyDistribution);
    }
    Ok(())
}

/// Weight outside the traded range; rejects snapshots whose range outweighs the total.
fn untouched_weight(snapshot: DistributionSnapshot, target: Wad) -> Result<Wad> {
    snapshot
        .sum_before
        .checked_sub(snapshot.affected_sum)
        .ok_or(ClmsrError::InvalidTarget(target))
}

/// Quantity whose opening cost is `target_cost`, solved in closed form.
///
/// The result is approximate once the trade would be chunked; callers
/// re-run [`open_cost`] on it to learn the amount actually charged.
pub fn quantity_from_cost(
    alpha: Wad,
    snapshot: DistributionSnapshot,
    target_cost: Wad,
) -> Result<Wad> {
    if target_cost.is_zero() {
        return Ok(Wad::ZERO);
    }
    ensure_priceable(snapshot)?;
    let rest = untouched_weight(snapshot, target_cost)?;

    // Any cost above this would need the total weight past MAX_TOTAL_WEIGHT.
    let max = if snapshot.sum_before < MAX_TOTAL_WEIGHT {
        mul_ln_ratio(alpha, MAX_TOTAL_WEIGHT, snapshot.sum_before, Rounding::Down)?
    } else {
        Wad::ZERO
    };
    if target_cost > max {
        return Err(ClmsrError::TargetExceedsMaximum {
            target: target_cost,
            max,
        });
    }

    let growth = safe_exp(target_cost, alpha)?;
    let target_sum_after = snapshot.sum_before.mul(growth, Rounding::Nearest)?;
    let required = target_sum_after
        .checked_sub(rest)
        .filter(|required| !required.is_zero())
        .ok_or(ClmsrError::InvalidTarget(target_cost))?;

    let factor = required.div(snapshot.affected_sum, Rounding::Down)?;
    if factor < Wad::ONE {
        return Err(ClmsrError::InvalidTarget(target_cost));
    }
    let quantity = alpha.mul(ln(factor)?.to_wad()?, Rounding::Down)?;
    ensure_tradeable(quantity, alpha)?;
    Ok(quantity)
}

/// Quantity whose decrease yields `target_proceeds`, never more than
/// `position_quantity`.
///
/// # Errors
/// `TargetExceedsMaximum` when even selling the whole position falls short,
/// `InverseFactorOutOfBounds` when the implied shrink factor of the range
/// leaves `[MIN_FACTOR, MAX_FACTOR]`.
pub fn quantity_from_proceeds(
    alpha: Wad,
    snapshot: DistributionSnapshot,
    target_proceeds: Wad,
    position_quantity: Wad,
) -> Result<Wad> {
    if target_proceeds.is_zero() {
        return Ok(Wad::ZERO);
    }
    ensure_priceable(snapshot)?;
    let rest = untouched_weight(snapshot, target_proceeds)?;

    let max = decrease_proceeds(alpha, snapshot, position_quantity)?.amount;
    if target_proceeds > max {
        return Err(ClmsrError::TargetExceedsMaximum {
            target: target_proceeds,
            max,
        });
    }

    let shrink = safe_exp(target_proceeds, alpha)?;
    let target_sum_after = snapshot.sum_before.div(shrink, Rounding::Up)?;
    let required = target_sum_after
        .checked_sub(rest)
        .filter(|required| !required.is_zero())
        .ok_or(ClmsrError::InvalidTarget(target_proceeds))?;

    let inverse_factor = required.div(snapshot.affected_sum, Rounding::Up)?;
    if inverse_factor < MIN_FACTOR || inverse_factor > MAX_FACTOR {
        return Err(ClmsrError::InverseFactorOutOfBounds(inverse_factor));
    }
    if inverse_factor >= Wad::ONE {
        return Ok(Wad::ZERO);
    }
    let quantity = alpha.mul(ln(inverse_factor)?.magnitude(), Rounding::Down)?;
    Ok(quantity.min(position_quantity))
}

/// Settlement payout: the full quantity if the position's range meets the
/// settlement range, otherwise nothing.
pub const fn claim_amount(position: &Position, settlement_lower: u32, settlement_upper: u32) -> Wad {
    if position.overlaps(settlement_lower, settlement_upper) {
        position.quantity
    } else {
        Wad::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(sum_before: u64, affected_sum: u64) -> DistributionSnapshot {
        DistributionSnapshot {
            sum_before: Wad::from_int(sum_before),
            affected_sum: Wad::from_int(affected_sum),
        }
    }

    fn closed_form_cost(alpha: f64, sum: f64, affected: f64, quantity: f64) -> f64 {
        alpha * ((sum - affected + affected * (quantity / alpha).exp()) / sum).ln()
    }

    fn assert_relative(actual: Wad, expected: f64, tolerance: f64) {
        let relative = (actual.to_f64() - expected).abs() / expected;
        assert!(relative < tolerance, "expected {expected}, got {actual}");
    }

    #[test]
    fn test_zero_quantity_short_circuits() {
        let calc = open_cost(Wad::from_int(100), snapshot(100, 10), Wad::ZERO).unwrap();
        assert_eq!(calc.amount, Wad::ZERO);
        assert_eq!(calc.chunks(), 0);

        let empty = DistributionSnapshot {
            sum_before: Wad::ZERO,
            affected_sum: Wad::ZERO,
        };
        assert_eq!(open_cost(Wad::ONE, empty, Wad::ZERO).unwrap().amount, Wad::ZERO);
    }

    #[test]
    fn test_single_chunk_cost_matches_closed_form() {
        let alpha = Wad::from_int(100);
        let calc = open_cost(alpha, snapshot(100, 10), Wad::from_int(10)).unwrap();
        assert_eq!(calc.chunks(), 1);
        assert_relative(calc.amount, closed_form_cost(100.0, 100.0, 10.0, 10.0), 1e-9);
        assert_eq!(calc.sum_after.try_sub(calc.affected_after).unwrap(), Wad::from_int(90));
    }

    #[test]
    fn test_chunked_cost_matches_closed_form() {
        let alpha = Wad::from_int(10);
        let calc = open_cost(alpha, snapshot(100, 10), Wad::from_int(5)).unwrap();
        assert_eq!(calc.chunks(), 4);
        assert_relative(calc.amount, closed_form_cost(10.0, 100.0, 10.0, 5.0), 1e-9);
    }

    #[test]
    fn test_cost_is_monotone_and_convex() {
        let alpha = Wad::from_int(50);
        let one = open_cost(alpha, snapshot(100, 20), Wad::from_int(4)).unwrap().amount;
        let two = open_cost(alpha, snapshot(100, 20), Wad::from_int(8)).unwrap().amount;
        assert!(two > one);
        assert!(two > one.try_add(one).unwrap());
    }

    #[test]
    fn test_rejects_oversized_quantity() {
        let alpha = Wad::ONE;
        let max = max_trade_quantity(alpha).unwrap();
        assert_eq!(max, Wad::from_int(130));
        let over = Wad::from_raw(max.raw() + 1);
        assert!(matches!(
            open_cost(alpha, snapshot(100, 10), over),
            Err(ClmsrError::QuantityTooLarge { .. })
        ));
    }

    #[test]
    fn test_split_open_never_undercuts_whole() {
        let alpha = Wad::from_int(100);
        let state = snapshot(100, 10);
        let split_cost = |first: Wad, second: Wad| {
            let head = open_cost(alpha, state, first).unwrap();
            let after = DistributionSnapshot {
                sum_before: head.sum_after,
                affected_sum: head.affected_after,
            };
            let tail = open_cost(alpha, after, second).unwrap();
            head.amount.try_add(tail.amount).unwrap()
        };

        // A whole trade priced in one chunk is never beaten by any split.
        let whole_quantity = Wad::from_raw(12_500_000_000_000_000_001);
        let whole = open_cost(alpha, state, whole_quantity).unwrap();
        assert_eq!(whole.chunks(), 1);
        let firsts = [1, 3_141_592_653_589_793, 7_300_000_000_000_000_000, 12_500_000_000_000_000_000];
        for first in firsts.map(Wad::from_raw) {
            let second = whole_quantity.try_sub(first).unwrap();
            assert!(split_cost(first, second) >= whole.amount);
        }

        // Once the whole trade is itself chunked it may exceed a split by a
        // few wei of ceiling per chunk, never more.
        let whole_quantity = Wad::from_raw(16_616_000_000_000_000_000);
        let first = Wad::from_raw(10_753_000_000_000_000_000);
        let whole = open_cost(alpha, state, whole_quantity).unwrap();
        assert_eq!(whole.chunks(), 2);
        let split = split_cost(first, whole_quantity.try_sub(first).unwrap());
        let slack = Wad::from_raw(4 * u128::from(whole.chunks()));
        assert!(split.try_add(slack).unwrap() >= whole.amount);
        assert_relative(split, whole.amount.to_f64(), 1e-15);
    }

    #[test]
    fn test_open_beyond_weight_capacity_is_rejected() {
        let alpha = Wad::ONE;
        let state = snapshot(100, 1);
        let err = open_cost(alpha, state, Wad::from_int(60)).unwrap_err();
        let ClmsrError::QuantityTooLarge { quantity, max } = err else {
            panic!("expected QuantityTooLarge, got {err:?}");
        };
        assert_eq!(quantity, Wad::from_int(60));
        // ln((u128::MAX / 4 - 99) / 1) in WAD units
        assert!(max.to_f64() > 45.8 && max.to_f64() < 46.0, "max {max}");
        assert_eq!(max_open_quantity(alpha, state).unwrap(), max);

        let at_capacity = open_cost(alpha, state, max).unwrap();
        assert!(at_capacity.sum_after.to_f64() <= MAX_TOTAL_WEIGHT.to_f64() * (1.0 + 1e-9));
        assert!(decrease_proceeds(alpha, state, Wad::from_int(60)).is_ok());
    }

    #[test]
    fn test_capacity_shrinks_with_existing_weight() {
        let alpha = Wad::ONE;
        let light = max_open_quantity(alpha, snapshot(100, 1)).unwrap();
        let heavy = max_open_quantity(alpha, snapshot(100, 50)).unwrap();
        assert!(heavy < light);
        // 100 * ln((u128::MAX / 4 - 90) / 10) in WAD units
        let wide = max_open_quantity(Wad::from_int(100), snapshot(100, 10)).unwrap();
        assert!(wide.to_f64() > 4_358.0 && wide.to_f64() < 4_359.5, "capacity {wide}");
        let saturated = DistributionSnapshot {
            sum_before: MAX_TOTAL_WEIGHT,
            affected_sum: Wad::ONE,
        };
        assert_eq!(max_open_quantity(alpha, saturated).unwrap(), Wad::ZERO);
    }

    #[test]
    fn test_empty_distribution() {
        let alpha = Wad::from_int(100);
        assert_eq!(
            open_cost(alpha, snapshot(100, 0), Wad::ONE),
            Err(ClmsrError::EmptyDistribution)
        );
        assert_eq!(
            decrease_proceeds(alpha, snapshot(0, 0), Wad::ONE),
            Err(ClmsrError::EmptyDistribution)
        );
    }

    #[test]
    fn test_open_then_decrease_never_profits() {
        let alpha = Wad::from_int(100);
        let before = snapshot(100, 10);
        let quantity = Wad::from_int(10);
        let buy = open_cost(alpha, before, quantity).unwrap();
        let after = DistributionSnapshot {
            sum_before: buy.sum_after,
            affected_sum: buy.affected_after,
        };
        let sell = decrease_proceeds(alpha, after, quantity).unwrap();
        assert!(sell.amount <= buy.amount);
        assert!(sell.affected_after >= before.affected_sum);
        assert_relative(sell.amount, buy.amount.to_f64(), 1e-9);
    }

    #[test]
    fn test_quantity_from_cost_recovers_quantity() {
        let alpha = Wad::from_int(100);
        let state = snapshot(100, 10);
        let cost = open_cost(alpha, state, Wad::from_int(10)).unwrap().amount;
        let quantity = quantity_from_cost(alpha, state, cost).unwrap();
        assert_relative(quantity, 10.0, 1e-9);
        assert_eq!(quantity_from_cost(alpha, state, Wad::ZERO).unwrap(), Wad::ZERO);
    }

    #[test]
    fn test_quantity_from_cost_rejects_unreachable_target() {
        let inconsistent = snapshot(10, 20);
        assert_eq!(
            quantity_from_cost(Wad::from_int(100), inconsistent, Wad::ONE),
            Err(ClmsrError::InvalidTarget(Wad::ONE))
        );
    }

    #[test]
    fn test_quantity_from_cost_rejects_cost_beyond_capacity() {
        let alpha = Wad::ONE;
        let state = snapshot(100, 1);
        assert!(matches!(
            quantity_from_cost(alpha, state, Wad::from_int(50)),
            Err(ClmsrError::TargetExceedsMaximum { .. })
        ));
        assert!(quantity_from_cost(alpha, state, Wad::from_int(5)).is_ok());
    }

    #[test]
    fn test_quantity_from_proceeds_recovers_quantity() {
        let alpha = Wad::from_int(100);
        let state = snapshot(110, 20);
        let position = Wad::from_int(5);
        let proceeds = decrease_proceeds(alpha, state, Wad::from_int(3)).unwrap().amount;
        let quantity = quantity_from_proceeds(alpha, state, proceeds, position).unwrap();
        assert_relative(quantity, 3.0, 1e-9);
        assert!(quantity <= position);
    }

    #[test]
    fn test_quantity_from_proceeds_bounds() {
        let alpha = Wad::ONE;
        let state = snapshot(100, 10);
        let position = Wad::from_int(10);

        let max = decrease_proceeds(alpha, state, position).unwrap().amount;
        let over = Wad::from_raw(max.raw() + 1);
        assert!(matches!(
            quantity_from_proceeds(alpha, state, over, position),
            Err(ClmsrError::TargetExceedsMaximum { .. })
        ));

        let near_max = Wad::from_raw(105_300_000_000_000_000);
        assert!(near_max < max);
        assert!(matches!(
            quantity_from_proceeds(alpha, state, near_max, position),
            Err(ClmsrError::InverseFactorOutOfBounds(_))
        ));
    }

    #[test]
    fn test_claim_amount() {
        let position = Position {
            market_id: 1,
            lower_bin: 10,
            upper_bin: 20,
            quantity: Wad::from_int(3),
        };
        assert_eq!(claim_amount(&position, 15, 15), Wad::from_int(3));
        assert_eq!(claim_amount(&position, 20, 25), Wad::from_int(3));
        assert_eq!(claim_amount(&position, 21, 25), Wad::ZERO);
    }

    #[test]
    fn test_liquidity_bounds() {
        assert!(validate_liquidity(MIN_LIQUIDITY).is_ok());
        assert!(validate_liquidity(MAX_LIQUIDITY).is_ok());
        assert!(validate_liquidity(Wad::from_raw(WAD / 10_000)).is_err());
        assert!(validate_liquidity(Wad::from_int(1_000_001)).is_err());
    }
}
