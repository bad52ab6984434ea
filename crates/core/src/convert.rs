//! Fixed-point conversion between the three numeric domains the keeper
//! touches: oracle feed units (integer, per-instrument decimal count),
//! ledger units (integer, fixed 18 decimals), and human-readable decimal
//! strings. All arithmetic is integer or exact-decimal; no binary floats.

use rust_decimal::Decimal;
use thiserror::Error;

/// Decimal count of the ledger's fixed-point domain.
pub const LEDGER_DECIMALS: u8 = 18;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConvertError {
    #[error("value overflows the 1e18 ledger domain")]
    Overflow,
}

fn pow10(exp: u32) -> Option<u128> {
    10u128.checked_pow(exp)
}

/// Rescales a feed-unit integer into the ledger's 1e18 domain.
///
/// Multiplies by `10^(18 - feed_decimals)` when the feed is coarser than the
/// ledger, integer-divides by `10^(feed_decimals - 18)` otherwise.
///
/// # Errors
/// Returns `ConvertError::Overflow` when the rescaled value does not fit.
pub fn feed_to_ledger(value: u128, feed_decimals: u8) -> Result<u128, ConvertError> {
    if feed_decimals <= LEDGER_DECIMALS {
        let factor =
            pow10(u32::from(LEDGER_DECIMALS - feed_decimals)).ok_or(ConvertError::Overflow)?;
        value.checked_mul(factor).ok_or(ConvertError::Overflow)
    } else {
        let divisor =
            pow10(u32::from(feed_decimals - LEDGER_DECIMALS)).ok_or(ConvertError::Overflow)?;
        Ok(value / divisor)
    }
}

/// Parses human decimal text into a feed-unit integer at the feed's
/// precision.
///
/// Returns the zero/unset sentinel for malformed input, negative values, and
/// values with more fractional digits than the feed carries — "unset
/// threshold" is a valid input state, so this never errors.
#[must_use]
pub fn display_to_feed_units(text: &str, feed_decimals: u8) -> u128 {
    let Ok(parsed) = Decimal::from_str_exact(text.trim()) else {
        return 0;
    };
    if parsed.is_sign_negative() {
        return 0;
    }
    let scale = parsed.scale();
    if scale > u32::from(feed_decimals) {
        return 0;
    }
    let Ok(mantissa) = u128::try_from(parsed.mantissa()) else {
        return 0;
    };
    let Some(factor) = pow10(u32::from(feed_decimals) - scale) else {
        return 0;
    };
    mantissa.checked_mul(factor).unwrap_or(0)
}

/// Renders a feed-unit integer as decimal text, trimming trailing zeros.
#[must_use]
pub fn feed_to_display(value: u128, feed_decimals: u8) -> String {
    if feed_decimals == 0 {
        return value.to_string();
    }
    let factor = pow10(u32::from(feed_decimals)).unwrap_or(u128::MAX);
    let whole = value / factor;
    let frac = value % factor;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0width$}", width = feed_decimals as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_to_ledger_scales_up_for_coarse_feeds() {
        // 1.0850 at 8 decimals -> 1.0850 at 18 decimals
        assert_eq!(
            feed_to_ledger(108_500_000, 8),
            Ok(1_085_000_000_000_000_000)
        );
    }

    #[test]
    fn feed_to_ledger_divides_down_for_fine_feeds() {
        assert_eq!(feed_to_ledger(1_085_000_000_000_000_000_000, 21), Ok(1_085_000_000_000_000_000));
    }

    #[test]
    fn feed_to_ledger_reports_overflow() {
        assert_eq!(feed_to_ledger(u128::MAX, 8), Err(ConvertError::Overflow));
    }

    #[test]
    fn display_parsing_is_exact_at_feed_precision() {
        assert_eq!(display_to_feed_units("1.0850", 8), 108_500_000);
        assert_eq!(display_to_feed_units("1.36200", 8), 136_200_000);
        assert_eq!(display_to_feed_units("2", 8), 200_000_000);
        assert_eq!(display_to_feed_units("0", 8), 0);
    }

    #[test]
    fn malformed_input_yields_unset_sentinel() {
        assert_eq!(display_to_feed_units("", 8), 0);
        assert_eq!(display_to_feed_units("abc", 8), 0);
        assert_eq!(display_to_feed_units("-1.5", 8), 0);
        // more fractional digits than the feed carries
        assert_eq!(display_to_feed_units("1.123456789", 8), 0);
    }

    #[test]
    fn round_trip_matches_direct_18_decimal_parse() {
        for text in ["1.0850", "1.36200", "0.00000001", "42", "1.5"] {
            let via_feed = feed_to_ledger(display_to_feed_units(text, 8), 8).unwrap();
            let direct = display_to_feed_units(text, LEDGER_DECIMALS);
            assert_eq!(via_feed, direct, "round trip diverged for {text}");
        }
    }

    #[test]
    fn display_rendering_trims_trailing_zeros() {
        assert_eq!(feed_to_display(136_200_000, 8), "1.362");
        assert_eq!(feed_to_display(200_000_000, 8), "2");
        assert_eq!(feed_to_display(1, 8), "0.00000001");
        assert_eq!(feed_to_display(42, 0), "42");
    }
}
