//! Conversion between raw on-chain integers and human-scale decimals
//!
//! Prices on DeepBook are fixed point with `FLOAT_SCALAR` and expressed in
//! raw quote units per raw base unit, so a human price needs both coin scalars.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use super::{QueryError, QueryResult};

pub const FLOAT_SCALAR: u64 = 1_000_000_000;
pub const DEEP_SCALAR: u64 = 1_000_000;

fn to_decimal(raw: u128) -> QueryResult<Decimal> {
    Decimal::from_u128(raw)
        .ok_or_else(|| QueryError::InvalidInput(format!("{} exceeds decimal range", raw)))
}

fn nonzero(scalar: u64) -> QueryResult<Decimal> {
    if scalar == 0 {
        return Err(QueryError::InvalidInput("scalar must be non-zero".into()));
    }
    Ok(Decimal::from(scalar))
}

/// `raw / scalar`
pub fn normalize(raw: impl Into<u128>, scalar: u64) -> QueryResult<Decimal> {
    let scalar = nonzero(scalar)?;
    to_decimal(raw.into())?
        .checked_div(scalar)
        .ok_or_else(|| QueryError::InvalidInput("normalization overflow".into()))
}

/// `(raw * base_scalar) / quote_scalar / FLOAT_SCALAR`, multiplying first.
///
/// The product can exceed `Decimal`'s range, so the division happens in
/// `u128` and only the quotient and remainder become decimals.
pub fn normalize_price(raw: u64, base_scalar: u64, quote_scalar: u64) -> QueryResult<Decimal> {
    nonzero(base_scalar)?;
    nonzero(quote_scalar)?;

    let numerator = raw as u128 * base_scalar as u128;
    let denominator = quote_scalar as u128 * FLOAT_SCALAR as u128;

    let whole = to_decimal(numerator / denominator)?;
    let fraction = to_decimal(numerator % denominator)?
        .checked_div(to_decimal(denominator)?)
        .ok_or_else(|| QueryError::InvalidInput("price normalization overflow".into()))?;
    whole
        .checked_add(fraction)
        .ok_or_else(|| QueryError::InvalidInput("price normalization overflow".into()))
}

fn round_to_u64(value: Decimal, what: &str) -> QueryResult<u64> {
    if value.is_sign_negative() {
        return Err(QueryError::InvalidInput(format!("{} must not be negative", what)));
    }
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .ok_or_else(|| QueryError::InvalidInput(format!("{} {} out of range", what, value)))
}

/// `round(amount * scalar)`, for quantities passed to a view call.
pub fn to_raw(amount: Decimal, scalar: u64) -> QueryResult<u64> {
    let scaled = amount
        .checked_mul(nonzero(scalar)?)
        .ok_or_else(|| QueryError::InvalidInput(format!("amount {} out of range", amount)))?;
    round_to_u64(scaled, "amount")
}

/// `round(price * FLOAT_SCALAR * quote_scalar / base_scalar)`
pub fn price_to_raw(price: Decimal, base_scalar: u64, quote_scalar: u64) -> QueryResult<u64> {
    let base = nonzero(base_scalar)?;
    let quote = nonzero(quote_scalar)?;

    let scaled = price
        .checked_mul(Decimal::from(FLOAT_SCALAR))
        .and_then(|v| v.checked_mul(quote))
        .and_then(|v| v.checked_div(base))
        .ok_or_else(|| QueryError::InvalidInput(format!("price {} out of range", price)))?;
    round_to_u64(scaled, "price")
}
