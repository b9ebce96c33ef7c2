//! Market snapshot reader.
//!
//! Turns gateway responses into a typed `MarketSnapshot` once per tick.
//! Anything that does not yield a usable positive last price is reported
//! as `KeeperError::TransientFetch`; retrying is the controller's job.

pub mod tick;

use rust_decimal::Decimal;
use tracing::debug;

use crate::exchange::ExchangeGateway;
use crate::types::{KeeperError, MarketSnapshot};
use tick::TickSizeRule;

pub struct SnapshotReader {
    symbol: String,
    tick_rule: TickSizeRule,
}

impl SnapshotReader {
    pub fn new(symbol: impl Into<String>, tick_rule: TickSizeRule) -> Self {
        Self {
            symbol: symbol.into(),
            tick_rule,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub async fn read(&self, gateway: &dyn ExchangeGateway) -> Result<MarketSnapshot, KeeperError> {
        let last_price = gateway
            .get_market_price(&self.symbol)
            .await
            .map_err(|e| KeeperError::TransientFetch(format!("price: {e}")))?
            .ok_or_else(|| KeeperError::TransientFetch("price: missing".into()))?;

        if last_price <= Decimal::ZERO {
            return Err(KeeperError::TransientFetch(format!(
                "price: non-positive last price {last_price}"
            )));
        }

        let book = gateway
            .get_order_book(&self.symbol)
            .await
            .map_err(|e| KeeperError::TransientFetch(format!("order book: {e}")))?;

        let (best_bid, best_ask) = match &book {
            Some(b) if b.is_crossed() => {
                return Err(KeeperError::TransientFetch(format!(
                    "order book: crossed (bid {:?} >= ask {:?})",
                    b.best_bid(),
                    b.best_ask()
                )));
            }
            Some(b) => (b.best_bid(), b.best_ask()),
            None => (None, None),
        };

        let snapshot = MarketSnapshot {
            last_price,
            best_bid,
            best_ask,
            tick_size: self.tick_rule.tick_for(last_price),
        };
        debug!(symbol = %self.symbol, %snapshot, "Snapshot read");
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
