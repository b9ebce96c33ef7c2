//! Liquidation pricing.
//!
//! Prices the liquidity-taking sell that unwinds filled inventory: close
//! enough to the touch to fill quickly, never more than one tick through
//! the spread on the first attempt. The retry after a failed placement
//! goes deeper by a percentage.

use rust_decimal::Decimal;

use crate::market::tick::round_to_tick;
use crate::types::{MarketSnapshot, Side};

#[derive(Debug, Clone)]
pub struct LiquidationConfig {
    /// Ticks below the best bid for the first attempt.
    pub slippage_ticks: u32,
    /// Discount off the last price when the book is unavailable.
    pub fallback_discount: Decimal,
    /// Discount off the best bid (or last price) for the retry.
    pub retry_discount: Decimal,
    /// Start the cascade with a market order.
    pub use_market_order: bool,
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            slippage_ticks: 1,
            fallback_discount: Decimal::new(1, 2), // 1%
            retry_discount: Decimal::new(5, 2),    // 5%
            use_market_order: false,
        }
    }
}

/// Clamp a liquidity-taking price so it crosses the spread by at most one tick.
pub fn clamp_taker_price(side: Side, price: Decimal, snapshot: &MarketSnapshot) -> Decimal {
    let tick = snapshot.tick_size;
    match side {
        Side::Sell => match snapshot.best_bid {
            Some(bid) => price.max(bid - tick),
            None => price,
        },
        Side::Buy => match snapshot.best_ask {
            Some(ask) => price.min(ask + tick),
            None => price,
        },
    }
}

pub struct LiquidationPricer {
    config: LiquidationConfig,
}

impl LiquidationPricer {
    pub fn new(config: LiquidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LiquidationConfig {
        &self.config
    }

    /// Limit price for liquidation attempt `attempt` (0 = first, 1 = retry).
    pub fn sell_price(&self, snapshot: &MarketSnapshot, attempt: u32) -> Decimal {
        let tick = snapshot.tick_size;
        let raw = if attempt == 0 {
            match snapshot.best_bid {
                Some(bid) => {
                    let below = bid - tick * Decimal::from(self.config.slippage_ticks);
                    clamp_taker_price(Side::Sell, below, snapshot)
                }
                None => snapshot.last_price * (Decimal::ONE - self.config.fallback_discount),
            }
        } else {
            let reference = snapshot.best_bid.unwrap_or(snapshot.last_price);
            reference * (Decimal::ONE - self.config.retry_discount)
        };
        round_to_tick(raw, tick).max(tick)
    }
}
