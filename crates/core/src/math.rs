//! Checked U256 fixed-point arithmetic for lending calculations.
//!
//! Fractions, rates, exchange rates, prices and USD values are WAD
//! (18-decimal) fixed point. Token balances are integer base units.
//!
//! Every helper comes in a `_down` and an `_up` flavour so callers pick the
//! rounding direction explicitly: round down what the protocol pays out,
//! round up what the protocol is owed.

use alloy::primitives::U256;

use crate::error::{LeverageError, Result};

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Number of fractional digits carried by a WAD value.
pub const WAD_DECIMALS: usize = 18;

/// Seconds in a year, assuming 365 days.
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Pre-computed powers of 10 for fast decimal conversion
const POW10: [u128; 39] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
    10_000_000_000_000_000_000,
    100_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000_000,
];

/// Fast power of 10 lookup (up to 10^38)
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    if exp < 39 {
        U256::from(POW10[exp as usize])
    } else {
        U256::from(10u64).pow(U256::from(exp))
    }
}

/// Checked addition.
#[inline]
pub fn add(a: U256, b: U256) -> Result<U256> {
    a.checked_add(b).ok_or(LeverageError::MathOverflow)
}

/// Checked subtraction.
#[inline]
pub fn sub(a: U256, b: U256) -> Result<U256> {
    a.checked_sub(b).ok_or(LeverageError::MathOverflow)
}

/// `a * b / denominator`, rounded down.
#[inline]
pub fn mul_div_down(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(LeverageError::MathOverflow);
    }
    let product = a.checked_mul(b).ok_or(LeverageError::MathOverflow)?;
    Ok(product / denominator)
}

/// `a * b / denominator`, rounded up.
#[inline]
pub fn mul_div_up(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(LeverageError::MathOverflow);
    }
    let product = a.checked_mul(b).ok_or(LeverageError::MathOverflow)?;
    let quotient = product / denominator;
    if (product % denominator).is_zero() {
        Ok(quotient)
    } else {
        add(quotient, U256::from(1u8))
    }
}

/// Multiply two WAD values: (a * b) / WAD, rounded down.
#[inline]
pub fn wad_mul_down(a: U256, b: U256) -> Result<U256> {
    mul_div_down(a, b, WAD)
}

/// Multiply two WAD values: (a * b) / WAD, rounded up.
#[inline]
pub fn wad_mul_up(a: U256, b: U256) -> Result<U256> {
    mul_div_up(a, b, WAD)
}

/// Divide two WAD values: (a * WAD) / b, rounded down.
#[inline]
pub fn wad_div_down(a: U256, b: U256) -> Result<U256> {
    mul_div_down(a, WAD, b)
}

/// Divide two WAD values: (a * WAD) / b, rounded up.
#[inline]
pub fn wad_div_up(a: U256, b: U256) -> Result<U256> {
    mul_div_up(a, WAD, b)
}

/// WAD fraction `numerator / denominator`, rounded down.
#[inline]
pub fn from_ratio(numerator: U256, denominator: U256) -> Result<U256> {
    wad_div_down(numerator, denominator)
}

/// USD value (WAD) of `amount` base units at `price` per display unit.
///
/// Formula: amount * price / 10^exponent
///
/// Example: 2_500_000 uumee (exponent 6) at $0.04 = 0.1 * 10^18
#[inline]
pub fn value_down(amount: U256, price: U256, exponent: u8) -> Result<U256> {
    if amount.is_zero() || price.is_zero() {
        return Ok(U256::ZERO);
    }
    mul_div_down(amount, price, pow10(exponent))
}

/// Same as [`value_down`] but rounded up. Used for debt.
#[inline]
pub fn value_up(amount: U256, price: U256, exponent: u8) -> Result<U256> {
    if amount.is_zero() || price.is_zero() {
        return Ok(U256::ZERO);
    }
    mul_div_up(amount, price, pow10(exponent))
}

/// Base units worth `value` USD (WAD) at `price`, rounded down.
#[inline]
pub fn amount_from_value_down(value: U256, price: U256, exponent: u8) -> Result<U256> {
    mul_div_down(value, pow10(exponent), price)
}

/// Parse a non-negative decimal string ("0.85", "12", "1.5e0" is rejected)
/// into a WAD value.
pub fn parse_decimal(s: &str) -> std::result::Result<U256, DecimalParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DecimalParseError::Empty);
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(DecimalParseError::Malformed(s.to_string()));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(DecimalParseError::Malformed(s.to_string()));
    }
    if frac_part.len() > WAD_DECIMALS {
        return Err(DecimalParseError::TooPrecise(s.to_string()));
    }

    let int_value = if int_part.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(int_part, 10).map_err(|_| DecimalParseError::Malformed(s.to_string()))?
    };

    let frac_value = if frac_part.is_empty() {
        U256::ZERO
    } else {
        let padded = format!("{:0<width$}", frac_part, width = WAD_DECIMALS);
        U256::from_str_radix(&padded, 10).map_err(|_| DecimalParseError::Malformed(s.to_string()))?
    };

    int_value
        .checked_mul(WAD)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(|| DecimalParseError::Malformed(s.to_string()))
}

/// Render a WAD value as a decimal string with trailing zeros trimmed.
pub fn format_decimal(value: U256) -> String {
    let int_part = value / WAD;
    let frac_part = value % WAD;
    if frac_part.is_zero() {
        return int_part.to_string();
    }
    let frac = format!("{:0>width$}", frac_part.to_string(), width = WAD_DECIMALS);
    format!("{}.{}", int_part, frac.trim_end_matches('0'))
}

/// Convert WAD (18 decimals) to f64.
/// Use only for display/logging, not for computation.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    if wad <= U256::from(u128::MAX) {
        let value: u128 = wad.to();
        value as f64 / 1e18
    } else {
        let limbs = wad.as_limbs();
        let high = limbs[1] as f64 * (u64::MAX as f64 + 1.0);
        let low = limbs[0] as f64;
        (high + low) / 1e18
    }
}

/// Errors from [`parse_decimal`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecimalParseError {
    #[error("empty decimal string")]
    Empty,
    #[error("malformed decimal '{0}'")]
    Malformed(String),
    #[error("decimal '{0}' has more than 18 fractional digits")]
    TooPrecise(String),
}

/// Serde adapter that reads and writes WAD values as decimal strings.
///
/// ```rust,ignore
/// #[serde(with = "crate::math::serde_decimal")]
/// pub collateral_weight: U256,
/// ```
pub mod serde_decimal {
    use alloy::primitives::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_decimal(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_decimal(&s).map_err(D::Error::custom)
    }
}

/// Optional WAD value; `None` is written as null.
pub mod serde_decimal_opt {
    use alloy::primitives::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&super::format_decimal(*v)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<U256>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| super::parse_decimal(&s).map_err(D::Error::custom))
            .transpose()
    }
}

/// Serde adapter for integer amounts written as base-10 strings.
pub mod serde_amount {
    use alloy::primitives::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_str_radix(s.trim(), 10).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wad(s: &str) -> U256 {
        parse_decimal(s).unwrap()
    }

    #[test]
    fn test_rounding_directions() {
        let seven = U256::from(7u64);
        let two = U256::from(2u64);
        assert_eq!(mul_div_down(seven, U256::from(1u64), two).unwrap(), U256::from(3u64));
        assert_eq!(mul_div_up(seven, U256::from(1u64), two).unwrap(), U256::from(4u64));

        // Exact division rounds the same both ways
        assert_eq!(mul_div_up(U256::from(8u64), U256::from(1u64), two).unwrap(), U256::from(4u64));
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        assert_eq!(
            mul_div_down(U256::from(1u64), U256::from(1u64), U256::ZERO),
            Err(LeverageError::MathOverflow)
        );
        assert_eq!(wad_div_up(WAD, U256::ZERO), Err(LeverageError::MathOverflow));
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert_eq!(wad_mul_down(U256::MAX, U256::from(2u64) * WAD), Err(LeverageError::MathOverflow));
        assert_eq!(add(U256::MAX, U256::from(1u64)), Err(LeverageError::MathOverflow));
        assert_eq!(sub(U256::ZERO, U256::from(1u64)), Err(LeverageError::MathOverflow));
    }

    #[test]
    fn test_value_with_exponent() {
        // 2.5 UMEE (exponent 6) at $0.04
        let amount = U256::from(2_500_000u64);
        let value = value_down(amount, wad("0.04"), 6).unwrap();
        assert_eq!(value, wad("0.1"));

        // Base units back from the same value
        assert_eq!(amount_from_value_down(value, wad("0.04"), 6).unwrap(), amount);
    }

    #[test]
    fn test_value_rounding() {
        // One base unit at 1e-18 USD per display unit is below WAD precision
        let tiny = U256::from(1u64);
        assert_eq!(value_down(U256::from(1u64), tiny, 6).unwrap(), U256::ZERO);
        assert_eq!(value_up(U256::from(1u64), tiny, 6).unwrap(), U256::from(1u64));
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(wad("1"), WAD);
        assert_eq!(wad("0.85"), U256::from(850_000_000_000_000_000u64));
        assert_eq!(wad(".5"), WAD / U256::from(2u64));
        assert_eq!(wad("12.000000000000000001"), U256::from(12u64) * WAD + U256::from(1u64));

        assert!(matches!(parse_decimal(""), Err(DecimalParseError::Empty)));
        assert!(matches!(parse_decimal("-1"), Err(DecimalParseError::Malformed(_))));
        assert!(matches!(parse_decimal("1.2.3"), Err(DecimalParseError::Malformed(_))));
        assert!(matches!(
            parse_decimal("0.0000000000000000001"),
            Err(DecimalParseError::TooPrecise(_))
        ));
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(WAD), "1");
        assert_eq!(format_decimal(wad("0.85")), "0.85");
        assert_eq!(format_decimal(wad("1054.000000000000000001")), "1054.000000000000000001");
        assert_eq!(format_decimal(U256::ZERO), "0");
    }

    #[test]
    fn test_wad_to_f64() {
        let wad = U256::from(1000u64) * WAD;
        let f64_val = wad_to_f64(wad);
        assert!((f64_val - 1000.0).abs() < 0.001);
    }

    #[test]
    fn test_pow10_lookup() {
        assert_eq!(pow10(0), U256::from(1u64));
        assert_eq!(pow10(6), U256::from(1_000_000u64));
        assert_eq!(pow10(18), WAD);
    }
}
