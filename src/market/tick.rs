//! Tick size rules and price rounding.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

/// How the venue's minimum price increment is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickSizeRule {
    /// One increment for every price.
    Fixed(Decimal),
    /// KRW market tiers: the increment grows with the price.
    KrwTiered,
}

/// (upper bound exclusive, tick) pairs for KRW markets.
const KRW_TIERS: &[(Decimal, Decimal)] = &[
    (dec!(1), dec!(0.0001)),
    (dec!(10), dec!(0.001)),
    (dec!(100), dec!(0.01)),
    (dec!(1000), dec!(0.1)),
    (dec!(10000), dec!(1)),
    (dec!(100000), dec!(5)),
    (dec!(500000), dec!(10)),
    (dec!(1000000), dec!(50)),
    (dec!(2000000), dec!(100)),
];
const KRW_TOP_TICK: Decimal = dec!(500);

impl TickSizeRule {
    pub fn from_config(fixed: Option<Decimal>) -> Self {
        match fixed {
            Some(t) => TickSizeRule::Fixed(t),
            None => TickSizeRule::KrwTiered,
        }
    }

    /// Tick size in effect at `price`.
    pub fn tick_for(&self, price: Decimal) -> Decimal {
        match self {
            TickSizeRule::Fixed(t) => *t,
            TickSizeRule::KrwTiered => KRW_TIERS
                .iter()
                .find(|(bound, _)| price < *bound)
                .map(|(_, tick)| *tick)
                .unwrap_or(KRW_TOP_TICK),
        }
    }
}

/// Round `price` to the nearest multiple of `tick`, halves away from zero.
pub fn round_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    if tick <= Decimal::ZERO {
        return price;
    }
    let steps = (price / tick).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    (steps * tick).normalize()
}

/// Truncate a quantity to `scale` decimal places.
pub fn truncate_quantity(quantity: Decimal, scale: u32) -> Decimal {
    quantity
        .round_dp_with_strategy(scale, RoundingStrategy::ToZero)
        .normalize()
}
