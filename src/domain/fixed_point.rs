//! Fixed-point (WAD) arithmetic for the CLMSR engine.
//!
//! Every weight, quantity, cost and factor is a non-negative integer
//! scaled by [`WAD`] (1e18). Products and quotients are computed through a
//! 256-bit intermediate and rejected with `ArithmeticOverflow` when the
//! result does not fit back into `u128`; nothing wraps or saturates.
//!
//! `exp` is only defined on `[0, MAX_EXP_INPUT]`. `safe_exp` extends it to
//! arbitrary non-negative inputs by multiplying bounded chunks together,
//! which is what lets a single trade exceed the native exponential domain.
//! `exp` and `ln` evaluate their series at 1e36 internal precision and
//! round once on the way back to WAD.

use std::fmt;

use alloy_primitives::U256;
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::{ClmsrError, Result};

/// Fixed-point unit: 1.0 == 1e18.
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Largest input accepted by [`exp`] (0.13).
pub const MAX_EXP_INPUT: Wad = Wad(130_000_000_000_000_000);

/// Hard cap on the number of chunks `safe_exp` and the trade loop may take.
pub const MAX_CHUNKS: u32 = 1_000;

/// Smallest factor a single range multiply may apply (0.01).
pub const MIN_FACTOR: Wad = Wad(10_000_000_000_000_000);

/// Largest factor a single range multiply may apply (100).
pub const MAX_FACTOR: Wad = Wad(100 * WAD);

/// A composed pending factor below this value (0.001) forces a flush.
pub const FLUSH_THRESHOLD: Wad = Wad(1_000_000_000_000_000);

const HI_SCALE: u128 = WAD * WAD;

/// ln(2) at 1e36 precision.
const LN2_HI: i128 = 693_147_180_559_945_309_417_232_121_458_176_568;

/// Rounding applied to the single post-scaling step of `mul`/`div`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Truncate toward zero.
    Down,
    /// Ceiling; used for every user-facing cost and proceeds amount.
    Up,
    /// Round half up; used for internal rebalancing of tree weights.
    Nearest,
}

/// Non-negative fixed-point number with 18 fractional digits.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Wad(u128);

impl Wad {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(WAD);

    /// Wraps an already-scaled raw value.
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Converts a whole number; cannot overflow since `u64::MAX * 1e18 < u128::MAX`.
    pub const fn from_int(value: u64) -> Self {
        Self(value as u128 * WAD)
    }

    /// Raw scaled integer.
    pub const fn raw(self) -> u128 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Addition that reports overflow as an engine error.
    pub fn try_add(self, rhs: Self) -> Result<Self> {
        self.checked_add(rhs).ok_or_else(|| ClmsrError::overflow("add"))
    }

    /// Subtraction that reports underflow as an engine error.
    pub fn try_sub(self, rhs: Self) -> Result<Self> {
        self.checked_sub(rhs).ok_or_else(|| ClmsrError::overflow("sub"))
    }

    /// `self * rhs / WAD` with the requested rounding.
    pub fn mul(self, rhs: Self, rounding: Rounding) -> Result<Self> {
        mul_div(self.0, rhs.0, WAD, rounding, "mul").map(Self)
    }

    /// `self * WAD / rhs` with the requested rounding.
    ///
    /// # Errors
    /// `DivisionByZero` when `rhs` is zero.
    pub fn div(self, rhs: Self, rounding: Rounding) -> Result<Self> {
        mul_div(self.0, WAD, rhs.0, rounding, "div").map(Self)
    }

    /// `self * numerator / denominator` on raw integers (no WAD rescaling).
    pub fn mul_div(self, numerator: u128, denominator: u128, rounding: Rounding) -> Result<Self> {
        mul_div(self.0, numerator, denominator, rounding, "mul_div").map(Self)
    }

    /// Parses a non-negative decimal, truncating digits beyond the 18th.
    pub fn from_decimal(value: Decimal) -> Result<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(ClmsrError::domain("from_decimal", value));
        }
        let whole = value
            .trunc()
            .to_u128()
            .ok_or_else(|| ClmsrError::overflow("from_decimal"))?;
        let fraction = (value.fract() * Decimal::from(1_000_000_000_000_000_000_u64))
            .trunc()
            .to_u128()
            .ok_or_else(|| ClmsrError::overflow("from_decimal"))?;
        whole
            .checked_mul(WAD)
            .and_then(|scaled| scaled.checked_add(fraction))
            .map(Self)
            .ok_or_else(|| ClmsrError::overflow("from_decimal"))
    }

    /// Exact decimal view; `None` once the value outgrows `Decimal`'s 96-bit mantissa.
    pub fn to_decimal(self) -> Option<Decimal> {
        let raw = i128::try_from(self.0).ok()?;
        Decimal::try_from_i128_with_scale(raw, 18).ok()
    }

    /// Lossy float view for metrics and logs.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / WAD as f64
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:018}", self.0 / WAD, self.0 % WAD)
    }
}

/// Signed fixed-point number, produced by `ln` and accepted by `sqrt`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignedWad(i128);

impl SignedWad {
    pub const ZERO: Self = Self(0);

    pub const fn from_raw(raw: i128) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i128 {
        self.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Magnitude as an unsigned value.
    pub const fn magnitude(self) -> Wad {
        Wad(self.0.unsigned_abs())
    }

    /// Converts to `Wad`, rejecting negative values.
    pub fn to_wad(self) -> Result<Wad> {
        if self.is_negative() {
            return Err(ClmsrError::domain("to_wad", self));
        }
        Ok(self.magnitude())
    }
}

impl TryFrom<Wad> for SignedWad {
    type Error = ClmsrError;

    /// Fails with `ArithmeticOverflow` above `i128::MAX` raw.
    fn try_from(value: Wad) -> Result<Self> {
        i128::try_from(value.0)
            .map(Self)
            .map_err(|_| ClmsrError::overflow("signed"))
    }
}

impl fmt::Display for SignedWad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        write!(f, "{sign}{}", self.magnitude())
    }
}

fn mul_div(
    a: u128,
    b: u128,
    denominator: u128,
    rounding: Rounding,
    op: &'static str,
) -> Result<u128> {
    if denominator == 0 {
        return Err(ClmsrError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    let denominator = U256::from(denominator);
    let quotient = product / denominator;
    let remainder = product % denominator;
    let rounded = match rounding {
        Rounding::Down => quotient,
        Rounding::Up if remainder.is_zero() => quotient,
        Rounding::Up => quotient + U256::from(1u8),
        Rounding::Nearest if remainder * U256::from(2u8) >= denominator => {
            quotient + U256::from(1u8)
        }
        Rounding::Nearest => quotient,
    };
    u128::try_from(rounded).map_err(|_| ClmsrError::overflow(op))
}

/// Rescales a 1e36 intermediate back to WAD, rounding to nearest.
fn hi_to_wad(value: U256, op: &'static str) -> Result<Wad> {
    let unit = U256::from(WAD);
    let quotient = value / unit;
    let rounded = if (value % unit) * U256::from(2u8) >= unit {
        quotient + U256::from(1u8)
    } else {
        quotient
    };
    u128::try_from(rounded)
        .map(Wad)
        .map_err(|_| ClmsrError::overflow(op))
}

/// Headroom added to a truncated 1e36 series result to make it an upper bound.
const HI_SLACK: u128 = 1_000;

fn ceil_div(numerator: U256, denominator: U256) -> U256 {
    let quotient = numerator / denominator;
    if (numerator % denominator).is_zero() {
        quotient
    } else {
        quotient + U256::from(1u8)
    }
}

/// Taylor series of e^x on a 1e36-scaled input.
///
/// Every term truncates, so the result never exceeds the true value and
/// undershoots it by at most a few dozen units.
fn exp_hi(x_hi: U256) -> U256 {
    let scale = U256::from(HI_SCALE);
    let mut term = scale;
    let mut sum = scale;
    let mut k: u64 = 1;
    while !term.is_zero() {
        term = term * x_hi / (scale * U256::from(k));
        sum += term;
        k += 1;
    }
    sum
}

/// ln(m / 1e36) at 1e36 precision for `m > 0`.
///
/// Normalizes `m` into `[1, 2)` by powers of two and evaluates
/// `2 * atanh((m - 1) / (m + 1))`. Every step truncates toward a smaller
/// logarithm and the shortfall stays under a few hundred units.
fn ln_hi(mut m: U256) -> Result<i128> {
    let one = U256::from(HI_SCALE);
    let two = one + one;
    let mut k: i128 = 0;
    while m >= two {
        m >>= 1usize;
        k += 1;
    }
    while m < one {
        m <<= 1usize;
        k -= 1;
    }

    let z = (m - one) * one / (m + one);
    let z_squared = z * z / one;
    let mut term = z;
    let mut series = U256::ZERO;
    let mut n: u64 = 1;
    while !term.is_zero() {
        series += term / U256::from(n);
        term = term * z_squared / one;
        n += 2;
    }
    let ln_m = i128::try_from(series + series).map_err(|_| ClmsrError::overflow("ln"))?;
    Ok(k * LN2_HI + ln_m)
}

/// e^x for `0 <= x <= MAX_EXP_INPUT`.
///
/// # Errors
/// `DomainError` when `x` exceeds [`MAX_EXP_INPUT`].
pub fn exp(x: Wad) -> Result<Wad> {
    if x > MAX_EXP_INPUT {
        return Err(ClmsrError::domain("exp", x));
    }
    // x <= 0.13 so the series terms vanish after ~20 steps.
    hi_to_wad(exp_hi(U256::from(x.raw()) * U256::from(WAD)), "exp")
}

/// Natural logarithm for `x > 0`.
///
/// # Errors
/// `DomainError` when `x` is zero.
pub fn ln(x: Wad) -> Result<SignedWad> {
    if x.is_zero() {
        return Err(ClmsrError::domain("ln", x));
    }
    let total = ln_hi(U256::from(x.raw()) * U256::from(WAD))?;
    let unit = WAD as i128;
    let quotient = total / unit;
    let remainder = total % unit;
    let rounded = if remainder.unsigned_abs() * 2 >= WAD {
        quotient + remainder.signum()
    } else {
        quotient
    };
    Ok(SignedWad(rounded))
}

/// Exponent `quantity / scale` at 1e36, checked against the `exp` domain.
fn exponent_hi(quantity: Wad, scale: Wad, rounding: Rounding) -> Result<U256> {
    if scale.is_zero() {
        return Err(ClmsrError::DivisionByZero);
    }
    let numerator = U256::from(quantity.raw()) * U256::from(HI_SCALE);
    let denominator = U256::from(scale.raw());
    let x_hi = match rounding {
        Rounding::Up => ceil_div(numerator, denominator),
        Rounding::Down | Rounding::Nearest => numerator / denominator,
    };
    if x_hi > U256::from(MAX_EXP_INPUT.raw()) * U256::from(WAD) {
        return Err(ClmsrError::domain("exp", quantity));
    }
    Ok(x_hi)
}

/// `weight * e^(quantity / scale)`, never below the exact value.
///
/// The exponent is rounded up, the series result is lifted into an upper
/// bound and the product is rounded up once.
///
/// # Errors
/// `DomainError` when `quantity / scale` exceeds [`MAX_EXP_INPUT`],
/// `ArithmeticOverflow` when the result does not fit.
pub fn grow_up(weight: Wad, quantity: Wad, scale: Wad) -> Result<Wad> {
    let x_hi = exponent_hi(quantity, scale, Rounding::Up)?;
    let growth = exp_hi(x_hi) + U256::from(HI_SLACK);
    let scaled = ceil_div(U256::from(weight.raw()) * growth, U256::from(HI_SCALE));
    u128::try_from(scaled)
        .map(Wad)
        .map_err(|_| ClmsrError::overflow("grow"))
}

/// `weight * e^-(quantity / scale)`, never below the exact value.
///
/// Divides by a lower bound of the growth and rounds the quotient up.
///
/// # Errors
/// `DomainError` when `quantity / scale` exceeds [`MAX_EXP_INPUT`].
pub fn shrink_up(weight: Wad, quantity: Wad, scale: Wad) -> Result<Wad> {
    let x_hi = exponent_hi(quantity, scale, Rounding::Down)?;
    let growth = exp_hi(x_hi);
    let scaled = ceil_div(U256::from(weight.raw()) * U256::from(HI_SCALE), growth);
    u128::try_from(scaled)
        .map(Wad)
        .map_err(|_| ClmsrError::overflow("shrink"))
}

/// `scale * ln(numerator / denominator)` for `numerator >= denominator`.
///
/// The ratio and its logarithm stay at 1e36 and `scale` is applied before
/// the only rounding back to WAD. `Up` lifts the logarithm into an upper
/// bound and takes the ceiling, so the result never falls short of the
/// exact value; `Down` keeps the truncated logarithm and floors, so it
/// never exceeds it. `Nearest` rounds the truncated value to nearest.
///
/// # Errors
/// `DivisionByZero` when `denominator` is zero, `DomainError` when the
/// ratio is below one.
pub fn mul_ln_ratio(
    scale: Wad,
    numerator: Wad,
    denominator: Wad,
    rounding: Rounding,
) -> Result<Wad> {
    if denominator.is_zero() {
        return Err(ClmsrError::DivisionByZero);
    }
    if numerator < denominator {
        return Err(ClmsrError::domain("ln_ratio", numerator));
    }
    if numerator == denominator {
        return Ok(Wad::ZERO);
    }
    let one = U256::from(HI_SCALE);
    let numerator = U256::from(numerator.raw()) * one;
    let denominator = U256::from(denominator.raw());
    let ratio = match rounding {
        Rounding::Up => ceil_div(numerator, denominator),
        Rounding::Down | Rounding::Nearest => numerator / denominator,
    };
    let log = u128::try_from(ln_hi(ratio)?.max(0)).map_err(|_| ClmsrError::overflow("ln_ratio"))?;
    let log = match rounding {
        Rounding::Up => U256::from(log) + U256::from(HI_SLACK),
        Rounding::Down | Rounding::Nearest => U256::from(log),
    };
    let product = U256::from(scale.raw()) * log;
    let scaled = match rounding {
        Rounding::Up => ceil_div(product, one),
        Rounding::Down => product / one,
        Rounding::Nearest => (product + one / U256::from(2u8)) / one,
    };
    u128::try_from(scaled)
        .map(Wad)
        .map_err(|_| ClmsrError::overflow("ln_ratio"))
}

/// Square root, rounded down.
///
/// # Errors
/// `DomainError` for negative input.
pub fn sqrt(x: SignedWad) -> Result<Wad> {
    if x.is_negative() {
        return Err(ClmsrError::domain("sqrt", x));
    }
    let n = U256::from(x.magnitude().raw()) * U256::from(WAD);
    if n.is_zero() {
        return Ok(Wad::ZERO);
    }
    let mut current = n;
    let mut next = (current + U256::from(1u8)) >> 1usize;
    while next < current {
        current = next;
        next = (current + n / current) >> 1usize;
    }
    u128::try_from(current)
        .map(Wad)
        .map_err(|_| ClmsrError::overflow("sqrt"))
}

/// Largest quantity whose `quantity / scale` stays inside the `exp` domain.
pub fn max_chunk(scale: Wad) -> Result<Wad> {
    scale.mul(MAX_EXP_INPUT, Rounding::Down)
}

/// e^(x / scale) for arbitrary non-negative `x`.
///
/// Peels chunks of at most `MAX_EXP_INPUT * scale` off `x`, exponentiates
/// each normalized chunk and multiplies the partial results.
///
/// # Errors
/// `QuantityTooLarge` when more than [`MAX_CHUNKS`] chunks would be needed,
/// `DivisionByZero` when `scale` is zero.
pub fn safe_exp(x: Wad, scale: Wad) -> Result<Wad> {
    if scale.is_zero() {
        return Err(ClmsrError::DivisionByZero);
    }
    let chunk_cap = max_chunk(scale)?;
    let limit = chunk_cap.mul_div(u128::from(MAX_CHUNKS), 1, Rounding::Down)?;
    if x > limit {
        return Err(ClmsrError::QuantityTooLarge {
            quantity: x,
            max: limit,
        });
    }

    let mut result = Wad::ONE;
    let mut remaining = x;
    while !remaining.is_zero() {
        let chunk = remaining.min(chunk_cap);
        let ratio = chunk.div(scale, Rounding::Down)?;
        result = result.mul(exp(ratio)?, Rounding::Nearest)?;
        remaining = remaining.try_sub(chunk)?;
    }
    Ok(result)
}

/// Rejects factors outside `[MIN_FACTOR, MAX_FACTOR]`.
pub fn validate_factor(factor: Wad) -> Result<()> {
    if factor < MIN_FACTOR || factor > MAX_FACTOR {
        return Err(ClmsrError::InvalidFactor(factor));
    }
    Ok(())
}

/// Outcome of folding a new factor into a node's pending factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composition {
    /// The combined factor is safe to keep deferred.
    Combined(Wad),
    /// The combined factor would fall under [`FLUSH_THRESHOLD`]: the old
    /// pending factor must be pushed to the children first, after which
    /// the carried factor becomes the node's only pending factor.
    Flush(Wad),
}

/// Composes `pending` with `factor`, flagging compositions that underflow.
pub fn compose_factors(pending: Wad, factor: Wad) -> Result<Composition> {
    let combined = pending.mul(factor, Rounding::Nearest)?;
    if combined < FLUSH_THRESHOLD {
        return Ok(Composition::Flush(factor));
    }
    Ok(Composition::Combined(combined))
}
