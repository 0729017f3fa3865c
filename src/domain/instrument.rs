//! Exchange trading rules for a single instrument.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::{ceil_to_step, floor_to_step};
use super::{Price, Quantity, Side, Symbol};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: Symbol,
    /// Minimum price increment.
    pub tick_size: Price,
    /// Quantity increment; every order size is a multiple of this.
    pub lot_step: Quantity,
    pub min_notional: Decimal,
    pub max_notional: Decimal,
    /// Stops closer than `tick_size * min_stop_ticks` are refused.
    pub min_stop_ticks: u32,
}

impl InstrumentSpec {
    #[must_use]
    pub fn min_stop_distance(&self) -> Price {
        self.tick_size * Decimal::from(self.min_stop_ticks)
    }

    /// Floor a quantity to the lot step.
    #[must_use]
    pub fn round_quantity(&self, quantity: Quantity) -> Quantity {
        floor_to_step(quantity, self.lot_step)
    }

    /// Snap a protective price to the tick grid, moving it away from the entry.
    ///
    /// A long stop below entry rounds down and a long target above entry
    /// rounds up; shorts mirror this. `below_entry` says which side of
    /// the entry the price sits on.
    #[must_use]
    pub fn round_away(&self, price: Price, below_entry: bool) -> Price {
        if below_entry {
            floor_to_step(price, self.tick_size)
        } else {
            ceil_to_step(price, self.tick_size)
        }
    }

    /// Stop price for a position entered at `entry` on `side`.
    #[must_use]
    pub fn stop_price(&self, entry: Price, side: Side, distance: Price) -> Price {
        match side {
            Side::Long => self.round_away(entry - distance, true),
            Side::Short => self.round_away(entry + distance, false),
        }
    }

    /// Take-profit price for a position entered at `entry` on `side`.
    #[must_use]
    pub fn target_price(&self, entry: Price, side: Side, distance: Price) -> Price {
        match side {
            Side::Long => self.round_away(entry + distance, false),
            Side::Short => self.round_away(entry - distance, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sol() -> InstrumentSpec {
        InstrumentSpec {
            symbol: Symbol::new("SOLUSDT"),
            tick_size: dec!(0.01),
            lot_step: dec!(0.1),
            min_notional: dec!(5),
            max_notional: dec!(100000),
            min_stop_ticks: 5,
        }
    }

    #[test]
    fn min_stop_distance_scales_with_ticks() {
        assert_eq!(sol().min_stop_distance(), dec!(0.05));
    }

    #[test]
    fn stop_and_target_round_away_from_entry() {
        let spec = sol();
        assert_eq!(spec.stop_price(dec!(100), Side::Long, dec!(0.305)), dec!(99.69));
        assert_eq!(spec.stop_price(dec!(100), Side::Short, dec!(0.305)), dec!(100.31));
        assert_eq!(spec.target_price(dec!(100), Side::Long, dec!(0.305)), dec!(100.31));
        assert_eq!(spec.target_price(dec!(100), Side::Short, dec!(0.305)), dec!(99.69));
    }

    #[test]
    fn quantity_floors_to_lot() {
        assert_eq!(sol().round_quantity(dec!(19.0476)), dec!(19.0));
    }
}
