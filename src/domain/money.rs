//! Monetary types for price and quantity representation.

use rust_decimal::Decimal;

/// Price represented as a Decimal for precision.
pub type Price = Decimal;

/// Order or position size in base units of the instrument.
pub type Quantity = Decimal;

/// Floor `value` to a multiple of `step`. A non-positive step leaves `value` unchanged.
#[must_use]
pub fn floor_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    ((value / step).floor() * step).normalize()
}

/// Ceil `value` to a multiple of `step`. A non-positive step leaves `value` unchanged.
#[must_use]
pub fn ceil_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    ((value / step).ceil() * step).normalize()
}
