//! trl-math
//!
//! Fixed-point arithmetic for the tranche reward ledger.
//!
//! # Scales
//!
//! Two fixed-point representations are used throughout the workspace:
//!
//! - **Standard** ([`UNIT`] = 1e18): token amounts, reward rates, relative
//!   weights, rebalance ratios, reward weights.
//! - **High precision** ([`PRECISE_UNIT`] = 1e27): the rate-over-weight
//!   integral.  Per-second emissions divided by a large total weight are tiny;
//!   the extra nine digits keep them from rounding to zero step after step.
//!   The integral itself is an [`Integral`], 256 bits wide: emission over a
//!   dust-sized total weight is huge and must still accumulate.
//!
//! # Arithmetic
//!
//! Every helper is checked.  [`mul_div`] multiplies into a 256-bit
//! intermediate, so `a * b / d` never loses the product regardless of operand
//! magnitude; the only failure is a quotient that does not fit `u128`.
//! Nothing here wraps or saturates silently: overflow is a [`MathError`] and
//! the caller aborts.
//!
//! Pure deterministic logic. No IO, no time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[allow(clippy::assign_op_pattern, clippy::ptr_offset_with_cast, clippy::manual_div_ceil)]
mod wide {
    uint::construct_uint! {
        /// 256-bit unsigned integer: `mul_div` scratch and [`Integral`] storage.
        pub struct U256(4);
    }
}

use wide::U256;

/// Standard fixed-point scale (1.0 == 1e18).
pub const UNIT: u128 = 1_000_000_000_000_000_000;

/// High-precision fixed-point scale (1.0 == 1e27).
pub const PRECISE_UNIT: u128 = 1_000_000_000_000_000_000_000_000_000;

/// Ratio between the two scales.
pub const UNIT_TO_PRECISE_FACTOR: u128 = PRECISE_UNIT / UNIT;

const UNIT_DECIMALS: usize = 18;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced by the checked fixed-point helpers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    /// A result does not fit in `u128`.
    Overflow,
    /// A subtraction would go below zero.
    Underflow,
    /// Division by zero.
    DivisionByZero,
    /// A decimal string could not be parsed at 1e18 scale.
    InvalidDecimal(String),
}

impl fmt::Display for MathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow => write!(f, "fixed-point overflow"),
            Self::Underflow => write!(f, "fixed-point underflow"),
            Self::DivisionByZero => write!(f, "fixed-point division by zero"),
            Self::InvalidDecimal(raw) => write!(f, "invalid decimal literal '{raw}'"),
        }
    }
}

impl std::error::Error for MathError {}

// ---------------------------------------------------------------------------
// Checked primitives
// ---------------------------------------------------------------------------

#[inline]
pub fn checked_add(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

#[inline]
pub fn checked_sub(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

#[inline]
pub fn checked_mul(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_mul(b).ok_or(MathError::Overflow)
}

/// `floor(a * b / d)` with a 256-bit intermediate product.
///
/// The product of two `u128` values always fits in 256 bits, so the only
/// failure modes are `d == 0` and a quotient wider than 128 bits.
pub fn mul_div(a: u128, b: u128, d: u128) -> Result<u128, MathError> {
    if d == 0 {
        return Err(MathError::DivisionByZero);
    }
    if a == 0 || b == 0 {
        return Ok(0);
    }
    // Fast path: the product already fits.
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / d);
    }
    let product = U256::from(a) * U256::from(b);
    let quotient = product / U256::from(d);
    if quotient.bits() > 128 {
        return Err(MathError::Overflow);
    }
    Ok(quotient.low_u128())
}

// ---------------------------------------------------------------------------
// Scale helpers
// ---------------------------------------------------------------------------

/// `a * b / UNIT`.
#[inline]
pub fn multiply_decimal(a: u128, b: u128) -> Result<u128, MathError> {
    mul_div(a, b, UNIT)
}

/// `a * UNIT / b`.
#[inline]
pub fn divide_decimal(a: u128, b: u128) -> Result<u128, MathError> {
    mul_div(a, UNIT, b)
}

/// `a * b / PRECISE_UNIT`.  Used to turn an integral delta back into an
/// amount at standard scale.
#[inline]
pub fn multiply_decimal_precise(a: u128, b: u128) -> Result<u128, MathError> {
    mul_div(a, b, PRECISE_UNIT)
}

/// `a * PRECISE_UNIT / b`.  Result is at high-precision scale when `a` and
/// `b` share a scale.
#[inline]
pub fn divide_decimal_precise(a: u128, b: u128) -> Result<u128, MathError> {
    mul_div(a, PRECISE_UNIT, b)
}

/// Lift a standard-scale value to high-precision scale.
#[inline]
pub fn decimal_to_precise(a: u128) -> Result<u128, MathError> {
    checked_mul(a, UNIT_TO_PRECISE_FACTOR)
}

/// Drop a high-precision value to standard scale, rounding half up.
#[inline]
pub fn precise_to_decimal(a: u128) -> u128 {
    let q = a / UNIT_TO_PRECISE_FACTOR;
    if a % UNIT_TO_PRECISE_FACTOR >= UNIT_TO_PRECISE_FACTOR / 2 {
        q + 1
    } else {
        q
    }
}

// ---------------------------------------------------------------------------
// Integral (1e27, 256-bit)
// ---------------------------------------------------------------------------

/// Accumulated `emission / weight` at [`PRECISE_UNIT`] scale.
///
/// One step adds at most `u128::MAX * 1e27`, about 2^218, so the 256-bit
/// accumulator has room for 2^38 worst-case steps. Only turning an integral
/// delta back into an amount ([`Integral::mul_amount`]) can overflow.
///
/// Serialized as a decimal string.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Integral(U256);

impl Integral {
    pub const ZERO: Integral = Integral(U256([0; 4]));

    /// `emission * PRECISE_UNIT / weight`.
    pub fn ratio(emission: u128, weight: u128) -> Result<Integral, MathError> {
        if weight == 0 {
            return Err(MathError::DivisionByZero);
        }
        Ok(Integral(
            U256::from(emission) * U256::from(PRECISE_UNIT) / U256::from(weight),
        ))
    }

    /// `weight * self / PRECISE_UNIT`, back at standard scale.
    pub fn mul_amount(self, weight: u128) -> Result<u128, MathError> {
        let product = self
            .0
            .checked_mul(U256::from(weight))
            .ok_or(MathError::Overflow)?;
        let quotient = product / U256::from(PRECISE_UNIT);
        if quotient.bits() > 128 {
            return Err(MathError::Overflow);
        }
        Ok(quotient.low_u128())
    }

    pub fn checked_add(self, other: Integral) -> Result<Integral, MathError> {
        self.0
            .checked_add(other.0)
            .map(Integral)
            .ok_or(MathError::Overflow)
    }

    pub fn checked_sub(self, other: Integral) -> Result<Integral, MathError> {
        self.0
            .checked_sub(other.0)
            .map(Integral)
            .ok_or(MathError::Underflow)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<u128> for Integral {
    fn from(v: u128) -> Self {
        Integral(U256::from(v))
    }
}

impl fmt::Display for Integral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Integral {
    type Err = MathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
            return Err(MathError::InvalidDecimal(s.to_string()));
        }
        U256::from_dec_str(raw)
            .map(Integral)
            .map_err(|_| MathError::InvalidDecimal(s.to_string()))
    }
}

impl Serialize for Integral {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Integral {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Decimal (1e18) display / parse
// ---------------------------------------------------------------------------

/// A standard-scale value for display and parsing.
///
/// `Decimal(1_500_000_000_000_000_000)` displays as `1.5`.  Parsing accepts
/// plain decimal literals with at most 18 fractional digits.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Decimal(pub u128);

impl Decimal {
    pub const ZERO: Decimal = Decimal(0);

    /// Whole units (`Decimal::units(5)` == 5.0).
    pub fn units(n: u64) -> Decimal {
        Decimal(n as u128 * UNIT)
    }

    #[inline]
    pub const fn raw(self) -> u128 {
        self.0
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / UNIT;
        let frac = self.0 % UNIT;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:018}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Decimal {
    type Err = MathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = || MathError::InvalidDecimal(s.to_string());
        let (whole, frac) = match raw.split_once('.') {
            Some((w, f)) => (w, f),
            None => (raw, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.len() > UNIT_DECIMALS
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac_scaled: u128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<width$}", width = UNIT_DECIMALS);
            padded.parse().map_err(|_| invalid())?
        };
        let scaled = checked_add(checked_mul(whole, UNIT)?, frac_scaled)?;
        Ok(Decimal(scaled))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div_small_operands_take_fast_path() {
        assert_eq!(mul_div(10, 20, 3), Ok(66));
    }

    #[test]
    fn mul_div_keeps_wide_intermediate() {
        // u128::MAX * 2 overflows u128 but the quotient fits.
        assert_eq!(mul_div(u128::MAX, 2, 4), Ok(u128::MAX / 2));
    }

    #[test]
    fn mul_div_rejects_oversized_quotient() {
        assert_eq!(mul_div(u128::MAX, 3, 2), Err(MathError::Overflow));
    }

    #[test]
    fn mul_div_zero_denominator() {
        assert_eq!(mul_div(1, 1, 0), Err(MathError::DivisionByZero));
        // Zero denominator is rejected even when the product is zero.
        assert_eq!(mul_div(0, 1, 0), Err(MathError::DivisionByZero));
    }

    #[test]
    fn precise_division_of_emission_over_weight() {
        // 50 tokens emitted over a weight of 100 tokens -> 0.5 at 1e27.
        let r = divide_decimal_precise(50 * UNIT, 100 * UNIT).unwrap();
        assert_eq!(r, PRECISE_UNIT / 2);
        assert_eq!(multiply_decimal_precise(100 * UNIT, r).unwrap(), 50 * UNIT);
    }

    #[test]
    fn multiply_decimal_applies_ratio() {
        assert_eq!(multiply_decimal(100 * UNIT, 2 * UNIT), Ok(200 * UNIT));
        assert_eq!(divide_decimal(UNIT, 4 * UNIT), Ok(UNIT / 4));
    }

    #[test]
    fn precise_to_decimal_rounds_half_up() {
        assert_eq!(precise_to_decimal(1_500_000_000), 2);
        assert_eq!(precise_to_decimal(1_499_999_999), 1);
        assert_eq!(decimal_to_precise(3).unwrap(), 3_000_000_000);
    }

    #[test]
    fn checked_sub_reports_underflow() {
        assert_eq!(checked_sub(1, 2), Err(MathError::Underflow));
        assert_eq!(checked_add(u128::MAX, 1), Err(MathError::Overflow));
    }

    #[test]
    fn decimal_display() {
        assert_eq!(Decimal(UNIT + UNIT / 2).to_string(), "1.5");
        assert_eq!(Decimal::units(42).to_string(), "42");
        assert_eq!(Decimal(1).to_string(), "0.000000000000000001");
    }

    #[test]
    fn decimal_parse() {
        assert_eq!("100".parse::<Decimal>(), Ok(Decimal(100 * UNIT)));
        assert_eq!("0.25".parse::<Decimal>(), Ok(Decimal(UNIT / 4)));
        assert_eq!(".5".parse::<Decimal>(), Ok(Decimal(UNIT / 2)));
        assert!("1.0000000000000000001".parse::<Decimal>().is_err());
        assert!("-1".parse::<Decimal>().is_err());
        assert!("".parse::<Decimal>().is_err());
        assert!("1e18".parse::<Decimal>().is_err());
    }

    #[test]
    fn integral_ratio_over_dust_weight_exceeds_u128() {
        // A week of 10/s emission over a weight of one base unit.
        let step = Integral::ratio(10 * UNIT * 604_800, 1).unwrap();
        assert!(step > Integral::from(u128::MAX));
        let twice = step.checked_add(step).unwrap();
        assert_eq!(twice.checked_sub(step), Ok(step));
        // Back to an amount it is 6_048_000 tokens per base unit of weight.
        assert_eq!(step.mul_amount(1), Ok(6_048_000 * UNIT));
        assert_eq!(step.mul_amount(u128::MAX), Err(MathError::Overflow));
    }

    #[test]
    fn integral_matches_narrow_helpers() {
        let i = Integral::ratio(50 * UNIT, 100 * UNIT).unwrap();
        assert_eq!(i, Integral::from(PRECISE_UNIT / 2));
        assert_eq!(i.mul_amount(100 * UNIT), Ok(50 * UNIT));
        assert_eq!(Integral::ratio(1, 0), Err(MathError::DivisionByZero));
        assert_eq!(
            Integral::ZERO.checked_sub(Integral::from(1)),
            Err(MathError::Underflow)
        );
    }

    #[test]
    fn integral_serializes_as_decimal_string() {
        let big = Integral::ratio(u128::MAX, 1).unwrap();
        let json = serde_json::to_string(&big).unwrap();
        assert!(json.starts_with('"'));
        let back: Integral = serde_json::from_str(&json).unwrap();
        assert_eq!(back, big);
        assert_eq!(Integral::from(PRECISE_UNIT / 2).to_string(), "500000000000000000000000000");
        assert!("12x".parse::<Integral>().is_err());
    }
}
