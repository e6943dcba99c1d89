//! Money helpers. Amounts are persisted as integer minor units (cents) and
//! surfaced as two-decimal `Decimal` values.

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};

/// Number of decimal places of the store currency.
pub const MINOR_UNIT_SCALE: u32 = 2;

/// Rounds an amount to the currency's minor unit, midpoint to even.
pub fn round_to_minor(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// Converts an amount to minor units after rounding; `None` on overflow.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (round_to_minor(amount) * Decimal::ONE_HUNDRED)
        .trunc()
        .to_i64()
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, MINOR_UNIT_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_midpoints_to_even() {
        assert_eq!(round_to_minor(dec!(0.125)), dec!(0.12));
        assert_eq!(round_to_minor(dec!(0.135)), dec!(0.14));
        assert_eq!(round_to_minor(dec!(10.004)), dec!(10.00));
    }

    #[test]
    fn converts_to_and_from_minor_units() {
        assert_eq!(to_minor_units(dec!(25.00)), Some(2500));
        assert_eq!(to_minor_units(dec!(19.99)), Some(1999));
        assert_eq!(from_minor_units(2500), dec!(25.00));
        assert_eq!(from_minor_units(1), dec!(0.01));
    }

    #[test]
    fn minor_conversion_keeps_scale_two() {
        assert_eq!(from_minor_units(1999).scale(), 2);
        assert_eq!(from_minor_units(1999).to_string(), "19.99");
    }
}
