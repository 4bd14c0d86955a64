//! Conversion between decimal major units and integer minor units
//!
//! Callers hand the ledger decimal amounts (e.g. `100.00`); internally every
//! balance and transaction amount is an `i64` count of minor units (cents),
//! which keeps arithmetic exact. The rounding rule is round-half-up
//! (midpoint away from zero) at two decimal places, applied uniformly.

use crate::error::{Error, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places carried by the minor unit
pub const MINOR_UNIT_SCALE: u32 = 2;

/// Minor units per major unit (100 cents to the unit)
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Convert a caller-supplied decimal amount into minor units.
///
/// Fails with [`Error::InvalidAmount`] when the amount is non-positive,
/// rounds to zero minor units, or does not fit in an `i64`.
pub fn to_minor_units(amount: Decimal) -> Result<i64> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount(format!(
            "amount must be positive, got {amount}"
        )));
    }

    let rounded =
        amount.round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointAwayFromZero);

    let minor = rounded
        .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))
        .and_then(|scaled| scaled.to_i64())
        .ok_or_else(|| {
            Error::InvalidAmount(format!("amount out of range: {amount}"))
        })?;

    if minor == 0 {
        return Err(Error::InvalidAmount(format!(
            "amount rounds to zero minor units: {amount}"
        )));
    }

    Ok(minor)
}

/// Convert minor units back to a decimal amount for display.
///
/// Exact inverse of [`to_minor_units`] for representable values; total
/// function, no failure mode.
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, MINOR_UNIT_SCALE)
}
