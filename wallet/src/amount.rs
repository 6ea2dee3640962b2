//! Fixed-point amount arithmetic.
//!
//! Native amounts are `i64` photons (10^-7 NOVA). Outside-currency amounts
//! and exchange rates are decimal strings parsed into `i128` values scaled
//! by the same 10^7, so every conversion is exact integer math. No floating
//! point anywhere near money.
//!
//! Conversions into the native asset truncate toward zero at the seventh
//! decimal. Outside-currency display rounds (half away from zero) or
//! truncates to two decimals depending on [`FormatMode`].

use std::cmp::Ordering;

use thiserror::Error;
use tracing::debug;

use crate::config::{BASE_FEE_PHOTONS, NATIVE_ASSET_CODE, NATIVE_DECIMALS, PHOTONS_PER_UNIT};
use crate::types::OutsideCurrencyCode;

/// Scale shared by photons, outside amounts and rates.
const SCALE: i128 = PHOTONS_PER_UNIT as i128;

/// Outside currencies are displayed with two decimals.
const OUTSIDE_DISPLAY_DECIMALS: u32 = 2;

/// Errors produced by amount parsing and conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// The text is not a decimal number.
    #[error("invalid amount: {0:?}")]
    Invalid(String),

    /// A native amount has more than seven decimal places.
    #[error("amount has too many decimal places: {0:?}")]
    TooPrecise(String),

    /// The value does not fit the target representation.
    #[error("amount out of range")]
    Overflow,

    /// The exchange rate is zero, negative or unparsable.
    #[error("invalid exchange rate: {0:?}")]
    InvalidRate(String),
}

/// Rounding applied when displaying outside-currency amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode {
    /// Round half away from zero.
    Round,
    /// Truncate toward zero. Used for balances, which must never overstate.
    Truncate,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Returns `true` when `text` represents exactly zero or nothing at all:
/// optional zeros, at most one decimal point, optional zeros (`""`, `"0"`,
/// `"."`, `"00.000"`).
pub fn is_zero_or_blank(text: &str) -> bool {
    let mut seen_point = false;
    text.chars().all(|c| match c {
        '0' => true,
        '.' if !seen_point => {
            seen_point = true;
            true
        }
        _ => false,
    })
}

/// Parses a decimal into a value scaled by 10^7.
///
/// With `strict`, more than seven decimals is an error; otherwise the extra
/// digits are truncated.
fn parse_scaled(text: &str, strict: bool) -> Result<i128, AmountError> {
    let invalid = || AmountError::Invalid(text.to_string());

    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }
    if strict && frac_part.len() > NATIVE_DECIMALS as usize {
        return Err(AmountError::TooPrecise(text.to_string()));
    }

    let mut value: i128 = 0;
    for b in int_part.bytes() {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(i128::from(b - b'0')))
            .ok_or(AmountError::Overflow)?;
    }
    value = value.checked_mul(SCALE).ok_or(AmountError::Overflow)?;

    let kept = &frac_part[..frac_part.len().min(NATIVE_DECIMALS as usize)];
    let mut frac: i128 = 0;
    for b in kept.bytes() {
        frac = frac * 10 + i128::from(b - b'0');
    }
    frac *= 10i128.pow(NATIVE_DECIMALS - kept.len() as u32);
    value = value.checked_add(frac).ok_or(AmountError::Overflow)?;

    Ok(if negative { -value } else { value })
}

/// Parses a native amount (`"12.5"`) into photons.
pub fn parse_native(text: &str) -> Result<i64, AmountError> {
    let scaled = parse_scaled(text, true)?;
    i64::try_from(scaled).map_err(|_| AmountError::Overflow)
}

/// Parses an outside-currency decimal of any precision. Digits past the
/// seventh decimal are dropped.
pub fn parse_outside(text: &str) -> Result<i128, AmountError> {
    parse_scaled(text, false)
}

/// Compares two native amount strings numerically.
pub fn compare_native(a: &str, b: &str) -> Result<Ordering, AmountError> {
    Ok(parse_native(a)?.cmp(&parse_native(b)?))
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

fn parse_rate(rate: &str) -> Result<i128, AmountError> {
    match parse_outside(rate) {
        Ok(r) if r > 0 => Ok(r),
        _ => Err(AmountError::InvalidRate(rate.to_string())),
    }
}

/// Converts an outside-currency amount into a native amount string.
pub fn convert_outside_to_native(outside: &str, rate: &str) -> Result<String, AmountError> {
    let outside = parse_outside(outside)?;
    let rate = parse_rate(rate)?;
    let photons = outside.checked_mul(SCALE).ok_or(AmountError::Overflow)? / rate;
    let photons = i64::try_from(photons).map_err(|_| AmountError::Overflow)?;
    Ok(photons_to_string(photons))
}

/// Converts a native amount into an outside-currency amount string.
pub fn convert_native_to_outside(native: &str, rate: &str) -> Result<String, AmountError> {
    let photons = i128::from(parse_native(native)?);
    let rate = parse_rate(rate)?;
    let outside = photons.checked_mul(rate).ok_or(AmountError::Overflow)? / SCALE;
    Ok(scaled_to_string(outside))
}

/// Subtracts one base fee from an available balance, floored at zero.
///
/// Shows the balance that is really sendable with a single-operation
/// transaction. An unparsable balance is returned unchanged.
pub fn subtract_fee_soft(available: &str) -> String {
    match parse_native(available) {
        Ok(photons) => photons_to_string((photons - BASE_FEE_PHOTONS).max(0)),
        Err(e) => {
            debug!(available, error = %e, "could not parse available balance");
            available.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

fn scaled_to_string(value: i128) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    let scale = SCALE as u128;
    format!(
        "{}{}.{:0>width$}",
        sign,
        abs / scale,
        abs % scale,
        width = NATIVE_DECIMALS as usize
    )
}

/// Canonical seven-decimal string for a photon amount (`"1.5000000"`).
pub fn photons_to_string(photons: i64) -> String {
    scaled_to_string(i128::from(photons))
}

/// Trims trailing fractional zeros: `"1.5000000"` → `"1.5"`, `"2.0"` → `"2"`.
fn trim_fraction(s: &str) -> &str {
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.')
}

/// Describes a native amount for display (`"1.5 NOVA"`).
pub fn format_native_description(amount: &str) -> Result<String, AmountError> {
    let canonical = photons_to_string(parse_native(amount)?);
    Ok(format!("{} {}", trim_fraction(&canonical), NATIVE_ASSET_CODE))
}

/// Formats a native amount without a suffix, trailing zeros removed.
pub fn format_native(amount: &str) -> Result<String, AmountError> {
    let canonical = photons_to_string(parse_native(amount)?);
    Ok(trim_fraction(&canonical).to_string())
}

/// Formats an outside-currency amount with two decimals and a code suffix
/// (`"12.35 USD"`).
pub fn format_outside(
    amount: &str,
    currency: &OutsideCurrencyCode,
    mode: FormatMode,
) -> Result<String, AmountError> {
    let value = parse_outside(amount)?;
    let unit = 10i128.pow(NATIVE_DECIMALS - OUTSIDE_DISPLAY_DECIMALS);
    let mut cents = value / unit;
    let rem = value % unit;
    if mode == FormatMode::Round && rem.abs() * 2 >= unit {
        cents += value.signum();
    }

    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    Ok(format!("{}{}.{:02} {}", sign, abs / 100, abs % 100, currency))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn usd() -> OutsideCurrencyCode {
        OutsideCurrencyCode::new("USD")
    }

    #[test]
    fn zero_or_blank_detection() {
        for text in ["", "0", "0.0", "0.00", ".", "000", "00.000", ".0", "0."] {
            assert!(is_zero_or_blank(text), "{text:?} should be zero");
        }
        for text in ["1", "0.01", "0.0.0", "-0", "abc", " 0", "10"] {
            assert!(!is_zero_or_blank(text), "{text:?} should not be zero");
        }
    }

    #[test]
    fn parse_native_amounts() {
        assert_eq!(parse_native("1").unwrap(), PHOTONS_PER_UNIT);
        assert_eq!(parse_native("2.01").unwrap(), 20_100_000);
        assert_eq!(parse_native("0.0000001").unwrap(), 1);
        assert_eq!(parse_native(".5").unwrap(), 5_000_000);
        assert_eq!(parse_native("3.").unwrap(), 30_000_000);
        assert_eq!(parse_native("-1").unwrap(), -10_000_000);
    }

    #[test]
    fn parse_native_rejects_bad_input() {
        assert!(matches!(parse_native(""), Err(AmountError::Invalid(_))));
        assert!(matches!(parse_native("-"), Err(AmountError::Invalid(_))));
        assert!(matches!(parse_native("1.2.3"), Err(AmountError::Invalid(_))));
        assert!(matches!(parse_native("1e5"), Err(AmountError::Invalid(_))));
        assert!(matches!(parse_native(" 1"), Err(AmountError::Invalid(_))));
        assert!(matches!(
            parse_native("0.00000001"),
            Err(AmountError::TooPrecise(_))
        ));
        assert_eq!(
            parse_native("99999999999999999999"),
            Err(AmountError::Overflow)
        );
    }

    #[test]
    fn parse_outside_truncates_extra_precision() {
        assert_eq!(parse_outside("0.123456789").unwrap(), 1_234_567);
    }

    #[test]
    fn parse_outside_overflow_in_fraction() {
        // The integer part scales to just below i128::MAX; the fraction
        // pushes it over.
        assert_eq!(
            parse_outside("17014118346046923173168730371588.9999999"),
            Err(AmountError::Overflow)
        );
        assert_eq!(
            parse_outside("17014118346046923173168730371588").unwrap(),
            17014118346046923173168730371588 * SCALE
        );
    }

    #[test]
    fn compare_native_is_numeric() {
        assert_eq!(compare_native("2.01", "2.010").unwrap(), Ordering::Equal);
        assert_eq!(compare_native("2", "10").unwrap(), Ordering::Less);
        assert!(compare_native("x", "1").is_err());
    }

    #[test]
    fn outside_to_native_conversion() {
        assert_eq!(convert_outside_to_native("10", "0.5").unwrap(), "20.0000000");
        assert_eq!(convert_outside_to_native("1", "3").unwrap(), "0.3333333");
        assert_eq!(convert_outside_to_native("0", "0.25").unwrap(), "0.0000000");
    }

    #[test]
    fn conversion_rejects_bad_rates() {
        assert!(matches!(
            convert_outside_to_native("1", "0"),
            Err(AmountError::InvalidRate(_))
        ));
        assert!(matches!(
            convert_native_to_outside("1", "-2"),
            Err(AmountError::InvalidRate(_))
        ));
    }

    #[test]
    fn native_to_outside_conversion() {
        assert_eq!(convert_native_to_outside("20", "0.5").unwrap(), "10.0000000");
        assert_eq!(
            convert_native_to_outside("0.0000001", "0.3").unwrap(),
            "0.0000000"
        );
    }

    #[test]
    fn subtract_fee_soft_floors_at_zero() {
        assert_eq!(subtract_fee_soft("10"), "9.9999900");
        assert_eq!(subtract_fee_soft("0.0000100"), "0.0000000");
        assert_eq!(subtract_fee_soft("0"), "0.0000000");
        assert_eq!(subtract_fee_soft("garbage"), "garbage");
    }

    #[test]
    fn native_formatting() {
        assert_eq!(format_native_description("1.5").unwrap(), "1.5 NOVA");
        assert_eq!(format_native_description("20.0000000").unwrap(), "20 NOVA");
        assert_eq!(format_native_description("0").unwrap(), "0 NOVA");
        assert_eq!(format_native("9.9999900").unwrap(), "9.99999");
    }

    #[test]
    fn outside_formatting_modes() {
        assert_eq!(
            format_outside("12.345", &usd(), FormatMode::Round).unwrap(),
            "12.35 USD"
        );
        assert_eq!(
            format_outside("12.345", &usd(), FormatMode::Truncate).unwrap(),
            "12.34 USD"
        );
        assert_eq!(format_outside("0", &usd(), FormatMode::Round).unwrap(), "0.00 USD");
        assert_eq!(
            format_outside("2.9999999", &usd(), FormatMode::Round).unwrap(),
            "3.00 USD"
        );
    }
}
