//! Fixed-point helpers.
//!
//! All share, ratio and price conversions go through [`mul_div`] so the
//! rounding direction is always stated at the call site.

use crate::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Rounding {
    Floor,
    Ceil,
}

/// Computes `x * y / denominator` on non-negative operands.
pub fn mul_div(x: i128, y: i128, denominator: i128, rounding: Rounding) -> Result<i128, Error> {
    if x < 0 || y < 0 || denominator <= 0 {
        return Err(Error::MathOverflow);
    }
    let product = x.checked_mul(y).ok_or(Error::MathOverflow)?;
    let quotient = product / denominator;
    match rounding {
        Rounding::Ceil if product % denominator != 0 => Ok(quotient + 1),
        _ => Ok(quotient),
    }
}

pub fn mul_div_floor(x: i128, y: i128, denominator: i128) -> Result<i128, Error> {
    mul_div(x, y, denominator, Rounding::Floor)
}

pub fn mul_div_ceil(x: i128, y: i128, denominator: i128) -> Result<i128, Error> {
    mul_div(x, y, denominator, Rounding::Ceil)
}

pub fn checked_add(x: i128, y: i128) -> Result<i128, Error> {
    x.checked_add(y).ok_or(Error::MathOverflow)
}

pub fn checked_sub(x: i128, y: i128) -> Result<i128, Error> {
    x.checked_sub(y).ok_or(Error::MathOverflow)
}
