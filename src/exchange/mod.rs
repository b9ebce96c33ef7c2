//! Exchange integrations.
//!
//! Defines the `ExchangeGateway` trait the keeper consumes and provides:
//! - Coinone public market data (read-only ticker and order book)
//! - Paper exchange: simulated order execution over any market-data source

pub mod coinone;
pub mod paper;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{Balances, OrderBook, Side};

/// Failures reported by a gateway.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    /// The venue answered, but without a success indicator or with an
    /// unparseable payload.
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("cancel rejected: {0}")]
    CancelRejected(String),
}

/// Abstraction over a trading venue.
///
/// Implementors supply market data, balances and order lifecycle calls.
/// Read-only venues return `OrderRejected` for write operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Last trade price; `None` if the venue has none.
    async fn get_market_price(&self, symbol: &str) -> Result<Option<Decimal>, GatewayError>;

    /// Current order book; `None` if unavailable.
    async fn get_order_book(&self, symbol: &str) -> Result<Option<OrderBook>, GatewayError>;

    async fn get_balances(&self) -> Result<Balances, GatewayError>;

    /// Place a limit order, returning the venue's order id.
    async fn place_limit_order(
        &self,
        symbol: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<String, GatewayError>;

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<(), GatewayError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), GatewayError>;

    /// Ids of the orders currently resting for `symbol`.
    async fn list_open_orders(&self, symbol: &str) -> Result<Vec<String>, GatewayError>;

    /// Whether this gateway can place real orders.
    fn is_executable(&self) -> bool;
}
