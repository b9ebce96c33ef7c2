//! Paper trading exchange with simulated fills.
//!
//! `PaperExchange` delegates market data to an inner gateway (usually the
//! Coinone public feed) and simulates the account side in memory:
//!
//! - Limit orders reserve funds and fill in full once the observed last
//!   price trades through them (buy: last <= price, sell: last >= price)
//! - Market orders fill immediately at the last observed price
//! - Cancels release the reservation
//! - A proportional fee is taken from whatever the fill delivers
//!
//! Partial fills and market impact are not simulated.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::exchange::{ExchangeGateway, GatewayError};
use crate::types::{AssetBalance, Balances, OrderBook, Side};

/// Configuration for the paper exchange.
#[derive(Debug, Clone)]
pub struct PaperConfig {
    /// Traded asset, e.g. "VIRTUAL".
    pub base_asset: String,
    /// Pricing asset, e.g. "KRW".
    pub quote_asset: String,
    pub quote_balance: Decimal,
    pub base_balance: Decimal,
    /// Fee rate (0.001 = 0.1%).
    pub fee_rate: Decimal,
}

#[derive(Debug, Clone)]
struct PaperOrder {
    side: Side,
    price: Decimal,
    quantity: Decimal,
}

#[derive(Debug, Default)]
struct Ledger {
    quote_free: Decimal,
    quote_reserved: Decimal,
    base_free: Decimal,
    base_reserved: Decimal,
    orders: HashMap<String, PaperOrder>,
    last_price: Option<Decimal>,
    fills: u64,
}

pub struct PaperExchange {
    feed: Arc<dyn ExchangeGateway>,
    config: PaperConfig,
    ledger: Mutex<Ledger>,
}

impl PaperExchange {
    pub fn new(feed: Arc<dyn ExchangeGateway>, config: PaperConfig) -> Self {
        let ledger = Ledger {
            quote_free: config.quote_balance,
            base_free: config.base_balance,
            ..Ledger::default()
        };
        Self {
            feed,
            config,
            ledger: Mutex::new(ledger),
        }
    }

    /// Number of simulated fills so far.
    pub fn fill_count(&self) -> u64 {
        self.ledger.lock().fills
    }

    fn check_symbol(&self, symbol: &str) -> Result<(), GatewayError> {
        if symbol.eq_ignore_ascii_case(&self.config.base_asset) {
            Ok(())
        } else {
            Err(GatewayError::OrderRejected(format!(
                "paper exchange only trades {}",
                self.config.base_asset
            )))
        }
    }

    /// Fill every resting order the given price trades through.
    fn match_resting(&self, ledger: &mut Ledger, last: Decimal) {
        let fee_keep = Decimal::ONE - self.config.fee_rate;
        let crossed: Vec<String> = ledger
            .orders
            .iter()
            .filter(|(_, o)| match o.side {
                Side::Buy => last <= o.price,
                Side::Sell => last >= o.price,
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in crossed {
            let Some(order) = ledger.orders.remove(&id) else {
                continue;
            };
            let notional = order.price * order.quantity;
            match order.side {
                Side::Buy => {
                    ledger.quote_reserved -= notional;
                    ledger.base_free += order.quantity * fee_keep;
                }
                Side::Sell => {
                    ledger.base_reserved -= order.quantity;
                    ledger.quote_free += notional * fee_keep;
                }
            }
            ledger.fills += 1;
            info!(
                order_id = %id,
                side = %order.side,
                price = %order.price,
                quantity = %order.quantity,
                "[PAPER] Order filled"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// ExchangeGateway trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ExchangeGateway for PaperExchange {
    async fn get_market_price(&self, symbol: &str) -> Result<Option<Decimal>, GatewayError> {
        let price = self.feed.get_market_price(symbol).await?;
        if let Some(last) = price.filter(|p| *p > Decimal::ZERO) {
            let mut ledger = self.ledger.lock();
            ledger.last_price = Some(last);
            self.match_resting(&mut ledger, last);
        }
        Ok(price)
    }

    async fn get_order_book(&self, symbol: &str) -> Result<Option<OrderBook>, GatewayError> {
        self.feed.get_order_book(symbol).await
    }

    async fn get_balances(&self) -> Result<Balances, GatewayError> {
        let ledger = self.ledger.lock();
        let mut balances = Balances::default();
        balances.set(
            &self.config.quote_asset,
            AssetBalance {
                available: ledger.quote_free,
                total: ledger.quote_free + ledger.quote_reserved,
            },
        );
        balances.set(
            &self.config.base_asset,
            AssetBalance {
                available: ledger.base_free,
                total: ledger.base_free + ledger.base_reserved,
            },
        );
        Ok(balances)
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<String, GatewayError> {
        self.check_symbol(symbol)?;
        if price <= Decimal::ZERO || quantity <= Decimal::ZERO {
            return Err(GatewayError::OrderRejected(format!(
                "invalid order: price={price} qty={quantity}"
            )));
        }

        let mut ledger = self.ledger.lock();
        match side {
            Side::Buy => {
                let notional = price * quantity;
                if notional > ledger.quote_free {
                    return Err(GatewayError::OrderRejected(format!(
                        "insufficient {} balance: need {notional}, have {}",
                        self.config.quote_asset, ledger.quote_free
                    )));
                }
                ledger.quote_free -= notional;
                ledger.quote_reserved += notional;
            }
            Side::Sell => {
                if quantity > ledger.base_free {
                    return Err(GatewayError::OrderRejected(format!(
                        "insufficient {} balance: need {quantity}, have {}",
                        self.config.base_asset, ledger.base_free
                    )));
                }
                ledger.base_free -= quantity;
                ledger.base_reserved += quantity;
            }
        }

        let order_id = format!("paper-{}", Uuid::new_v4());
        ledger
            .orders
            .insert(order_id.clone(), PaperOrder { side, price, quantity });
        debug!(order_id = %order_id, side = %side, %price, %quantity, "[PAPER] Limit order resting");

        // A marketable order fills against the last observed price right away
        if let Some(last) = ledger.last_price {
            self.match_resting(&mut ledger, last);
        }
        Ok(order_id)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<(), GatewayError> {
        self.check_symbol(symbol)?;
        let fee_keep = Decimal::ONE - self.config.fee_rate;
        let mut ledger = self.ledger.lock();
        let last = ledger
            .last_price
            .ok_or_else(|| GatewayError::OrderRejected("no reference price yet".into()))?;

        match side {
            Side::Buy => {
                let cost = last * quantity;
                if cost > ledger.quote_free {
                    return Err(GatewayError::OrderRejected(format!(
                        "insufficient {} balance",
                        self.config.quote_asset
                    )));
                }
                ledger.quote_free -= cost;
                ledger.base_free += quantity * fee_keep;
            }
            Side::Sell => {
                if quantity > ledger.base_free {
                    return Err(GatewayError::OrderRejected(format!(
                        "insufficient {} balance",
                        self.config.base_asset
                    )));
                }
                ledger.base_free -= quantity;
                ledger.quote_free += last * quantity * fee_keep;
            }
        }
        ledger.fills += 1;
        info!(side = %side, price = %last, %quantity, "[PAPER] Market order filled");
        Ok(())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), GatewayError> {
        let mut ledger = self.ledger.lock();
        let order = ledger
            .orders
            .remove(order_id)
            .ok_or_else(|| GatewayError::CancelRejected(format!("order not found: {order_id}")))?;

        match order.side {
            Side::Buy => {
                let notional = order.price * order.quantity;
                ledger.quote_reserved -= notional;
                ledger.quote_free += notional;
            }
            Side::Sell => {
                ledger.base_reserved -= order.quantity;
                ledger.base_free += order.quantity;
            }
        }
        debug!(order_id, "[PAPER] Order cancelled");
        Ok(())
    }

    async fn list_open_orders(&self, symbol: &str) -> Result<Vec<String>, GatewayError> {
        self.check_symbol(symbol)?;
        Ok(self.ledger.lock().orders.keys().cloned().collect())
    }

    fn is_executable(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockExchangeGateway;
    use rust_decimal_macros::dec;

    /// Paper exchange over a mocked feed whose price is set from the test.
    fn paper(quote: Decimal, base: Decimal) -> (PaperExchange, Arc<Mutex<Decimal>>) {
        let price = Arc::new(Mutex::new(dec!(1000)));
        let feed_price = price.clone();
        let mut feed = MockExchangeGateway::new();
        feed.expect_get_market_price()
            .returning(move |_| Ok(Some(*feed_price.lock())));
        feed.expect_get_order_book().returning(|_| Ok(None));

        let exchange = PaperExchange::new(
            Arc::new(feed),
            PaperConfig {
                base_asset: "COIN".into(),
                quote_asset: "KRW".into(),
                quote_balance: quote,
                base_balance: base,
                fee_rate: Decimal::ZERO,
            },
        );
        (exchange, price)
    }

    #[tokio::test]
    async fn test_limit_buy_reserves_and_fills() {
        let (ex, price) = paper(dec!(10000), Decimal::ZERO);
        ex.get_market_price("COIN").await.unwrap();

        let id = ex.place_limit_order("COIN", Side::Buy, dec!(990), dec!(5)).await.unwrap();
        let balances = ex.get_balances().await.unwrap();
        assert_eq!(balances.get("KRW").available, dec!(5050));
        assert_eq!(balances.get("KRW").total, dec!(10000));
        assert_eq!(ex.list_open_orders("COIN").await.unwrap(), vec![id.clone()]);

        *price.lock() = dec!(985);
        ex.get_market_price("COIN").await.unwrap();

        assert!(ex.list_open_orders("COIN").await.unwrap().is_empty());
        let balances = ex.get_balances().await.unwrap();
        assert_eq!(balances.get("KRW").total, dec!(5050));
        assert_eq!(balances.available("COIN"), dec!(5));
        assert_eq!(ex.fill_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_releases_reservation() {
        let (ex, _) = paper(dec!(10000), Decimal::ZERO);
        ex.get_market_price("COIN").await.unwrap();
        let id = ex.place_limit_order("COIN", Side::Buy, dec!(900), dec!(10)).await.unwrap();

        ex.cancel_order(&id).await.unwrap();
        assert_eq!(ex.get_balances().await.unwrap().available("KRW"), dec!(10000));

        let again = ex.cancel_order(&id).await;
        assert!(matches!(again, Err(GatewayError::CancelRejected(_))));
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejected() {
        let (ex, _) = paper(dec!(100), Decimal::ZERO);
        let err = ex
            .place_limit_order("COIN", Side::Buy, dec!(990), dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::OrderRejected(ref r) if r.contains("insufficient")));
    }

    #[tokio::test]
    async fn test_marketable_sell_fills_immediately() {
        let (ex, _) = paper(Decimal::ZERO, dec!(2));
        ex.get_market_price("COIN").await.unwrap();

        ex.place_limit_order("COIN", Side::Sell, dec!(999), dec!(2)).await.unwrap();
        assert!(ex.list_open_orders("COIN").await.unwrap().is_empty());
        assert_eq!(ex.get_balances().await.unwrap().available("KRW"), dec!(1998));
    }

    #[tokio::test]
    async fn test_market_sell_needs_reference_price() {
        let (ex, _) = paper(Decimal::ZERO, dec!(1));
        assert!(ex.place_market_order("COIN", Side::Sell, dec!(1)).await.is_err());

        ex.get_market_price("COIN").await.unwrap();
        ex.place_market_order("COIN", Side::Sell, dec!(1)).await.unwrap();
        assert_eq!(ex.get_balances().await.unwrap().available("KRW"), dec!(1000));
    }

    #[tokio::test]
    async fn test_wrong_symbol_rejected() {
        let (ex, _) = paper(dec!(10000), Decimal::ZERO);
        assert!(ex.place_limit_order("BTC", Side::Buy, dec!(1), dec!(1)).await.is_err());
    }
}
