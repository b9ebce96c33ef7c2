//! Repricing policy.
//!
//! Decides, for the order resting on one side, whether to keep it, replace
//! it, or (when nothing rests) where to place a fresh one. The decision is
//! a pure function of the snapshot and the tracked order.
//!
//! An order must stay inside the reward band measured from both the live
//! price and its own reference price, and must keep a minimum gap to the
//! live price so it is not about to be executed.

use rust_decimal::Decimal;
use std::fmt;
use tracing::debug;

use crate::market::tick::round_to_tick;
use crate::types::{MarketSnapshot, Side, TrackedOrder};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RepricingConfig {
    /// Maximum fractional distance from the market that keeps an order
    /// eligible for the maker reward.
    pub reward_threshold: Decimal,
    /// Fractional distance from the market for a new order.
    pub order_offset: Decimal,
    /// Minimum fractional gap from the market an order must keep.
    pub execution_risk_threshold: Decimal,
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceReason {
    RangeViolation,
    ExecutionRisk,
}

impl fmt::Display for ReplaceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplaceReason::RangeViolation => write!(f, "RANGE_VIOLATION"),
            ReplaceReason::ExecutionRisk => write!(f, "EXECUTION_RISK"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Keep,
    /// Cancel the resting order; `new_price` is where a fresh order would go now.
    Replace { reason: ReplaceReason, new_price: Decimal },
    /// Nothing rests on this side; place at `price` (already on the tick grid).
    Place { price: Decimal },
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Keep => write!(f, "KEEP"),
            Decision::Replace { reason, new_price } => write!(f, "REPLACE({reason}) -> {new_price}"),
            Decision::Place { price } => write!(f, "PLACE @ {price}"),
        }
    }
}

/// Band and risk checks for one order against the live price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub in_range: bool,
    pub risk_safe: bool,
    /// Signed fractional distance from the market, positive when the
    /// order sits on the passive side.
    pub gap: Decimal,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

pub struct RepricingPolicy {
    config: RepricingConfig,
}

impl RepricingPolicy {
    pub fn new(config: RepricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RepricingConfig {
        &self.config
    }

    pub fn decide(
        &self,
        snapshot: &MarketSnapshot,
        tracked: Option<&TrackedOrder>,
        side: Side,
    ) -> Decision {
        let Some(order) = tracked else {
            return Decision::Place {
                price: self.placement_price(snapshot, side),
            };
        };

        let a = self.assess(snapshot.last_price, order.placed_price, order.reference_price, side);
        let gap_pct = (a.gap * Decimal::ONE_HUNDRED).round_dp(3);
        debug!(
            order_id = %order.order_id,
            side = %side,
            last = %snapshot.last_price,
            placed = %order.placed_price,
            gap_pct = %gap_pct,
            in_range = a.in_range,
            risk_safe = a.risk_safe,
            "Order assessed"
        );

        if a.in_range && a.risk_safe {
            return Decision::Keep;
        }
        // Execution risk is the more urgent of the two
        let reason = if !a.risk_safe {
            ReplaceReason::ExecutionRisk
        } else {
            ReplaceReason::RangeViolation
        };
        Decision::Replace {
            reason,
            new_price: self.placement_price(snapshot, side),
        }
    }

    /// Check an order priced at `placed` (anchored at `reference`) against `last`.
    pub fn assess(&self, last: Decimal, placed: Decimal, reference: Decimal, side: Side) -> Assessment {
        let rt = self.config.reward_threshold;
        let (in_range, gap) = match side {
            Side::Buy => {
                let current_floor = last * (Decimal::ONE - rt);
                let original_floor = reference * (Decimal::ONE - rt);
                (
                    placed >= current_floor && placed >= original_floor,
                    (last - placed) / last,
                )
            }
            Side::Sell => {
                let current_ceiling = last * (Decimal::ONE + rt);
                let original_ceiling = reference * (Decimal::ONE + rt);
                (
                    placed <= current_ceiling && placed <= original_ceiling,
                    (placed - last) / last,
                )
            }
        };
        Assessment {
            in_range,
            risk_safe: gap >= self.config.execution_risk_threshold,
            gap,
        }
    }

    /// Price for a new order on `side`, rounded to the snapshot's tick.
    ///
    /// Nearest rounding can land one tick on the wrong side of a threshold;
    /// the price is then moved one tick so the new order passes its own
    /// acceptance test.
    pub fn placement_price(&self, snapshot: &MarketSnapshot, side: Side) -> Decimal {
        let last = snapshot.last_price;
        let tick = snapshot.tick_size;
        let raw = match side {
            Side::Buy => last * (Decimal::ONE - self.config.order_offset),
            Side::Sell => last * (Decimal::ONE + self.config.order_offset),
        };
        let price = round_to_tick(raw, tick);

        let a = self.assess(last, price, last, side);
        let away = match side {
            Side::Buy => -tick,
            Side::Sell => tick,
        };
        if !a.risk_safe {
            price + away
        } else if !a.in_range {
            price - away
        } else {
            price
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
