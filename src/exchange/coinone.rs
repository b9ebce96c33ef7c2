//! Coinone public market data.
//!
//! Reads the unauthenticated ticker and order book endpoints. Every
//! response must carry `"result": "success"`; prices and quantities arrive
//! as decimal strings and are parsed straight into `Decimal`.
//!
//! Order placement needs signed requests, which this client does not do:
//! all write operations are rejected. Wrap it in a `PaperExchange` to trade
//! against live prices.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::exchange::{ExchangeGateway, GatewayError};
use crate::types::{Balances, OrderBook, PriceLevel, Side};

pub const DEFAULT_BASE_URL: &str = "https://api.coinone.co.kr";

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    last: Option<String>,
    #[serde(default, rename = "errorCode")]
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderBookResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    bid: Vec<RawLevel>,
    #[serde(default)]
    ask: Vec<RawLevel>,
    #[serde(default, rename = "errorCode")]
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLevel {
    price: String,
    qty: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct CoinoneMarketData {
    http: Client,
    base_url: String,
}

impl CoinoneMarketData {
    pub fn new(base_url: Option<&str>, timeout: Duration) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
        })
    }

    async fn get_text(&self, path: &str, symbol: &str) -> Result<String, GatewayError> {
        let url = format!("{}/{path}/", self.base_url);
        debug!(url = %url, symbol, "Coinone request");

        let resp = self
            .http
            .get(&url)
            .query(&[("currency", symbol.to_lowercase())])
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("{path} request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| GatewayError::Transport(format!("{path} body read failed: {e}")))?;

        if !status.is_success() {
            return Err(GatewayError::Transport(format!("{path} HTTP {status}: {body}")));
        }
        Ok(body)
    }

    /// Parse a ticker payload into the last trade price.
    pub fn parse_ticker(body: &str) -> Result<Option<Decimal>, GatewayError> {
        let resp: TickerResponse = serde_json::from_str(body)
            .map_err(|e| GatewayError::Malformed(format!("ticker: {e}")))?;
        check_success(resp.result.as_deref(), resp.error_code.as_deref(), "ticker")?;

        resp.last.as_deref().map(|s| parse_decimal(s, "ticker.last")).transpose()
    }

    /// Parse an order book payload, sorting bids descending and asks ascending.
    pub fn parse_order_book(body: &str) -> Result<Option<OrderBook>, GatewayError> {
        let resp: OrderBookResponse = serde_json::from_str(body)
            .map_err(|e| GatewayError::Malformed(format!("orderbook: {e}")))?;
        check_success(resp.result.as_deref(), resp.error_code.as_deref(), "orderbook")?;

        let mut bids = parse_levels(&resp.bid)?;
        let mut asks = parse_levels(&resp.ask)?;
        if bids.is_empty() && asks.is_empty() {
            return Ok(None);
        }
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        Ok(Some(OrderBook { bids, asks }))
    }
}

fn check_success(
    result: Option<&str>,
    error_code: Option<&str>,
    what: &str,
) -> Result<(), GatewayError> {
    match result {
        Some("success") => Ok(()),
        other => Err(GatewayError::Malformed(format!(
            "{what}: result={} errorCode={}",
            other.unwrap_or("missing"),
            error_code.unwrap_or("none"),
        ))),
    }
}

fn parse_decimal(s: &str, field: &str) -> Result<Decimal, GatewayError> {
    Decimal::from_str(s.trim().replace(',', "").as_str())
        .map_err(|e| GatewayError::Malformed(format!("{field}={s:?}: {e}")))
}

fn parse_levels(raw: &[RawLevel]) -> Result<Vec<PriceLevel>, GatewayError> {
    raw.iter()
        .map(|l| {
            Ok(PriceLevel::new(
                parse_decimal(&l.price, "level.price")?,
                parse_decimal(&l.qty, "level.qty")?,
            ))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ExchangeGateway trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ExchangeGateway for CoinoneMarketData {
    async fn get_market_price(&self, symbol: &str) -> Result<Option<Decimal>, GatewayError> {
        let body = self.get_text("ticker", symbol).await?;
        Self::parse_ticker(&body)
    }

    async fn get_order_book(&self, symbol: &str) -> Result<Option<OrderBook>, GatewayError> {
        let body = self.get_text("orderbook", symbol).await?;
        Self::parse_order_book(&body)
    }

    async fn get_balances(&self) -> Result<Balances, GatewayError> {
        // No account access without signed requests
        Ok(Balances::default())
    }

    async fn place_limit_order(
        &self,
        _symbol: &str,
        _side: Side,
        _price: Decimal,
        _quantity: Decimal,
    ) -> Result<String, GatewayError> {
        Err(GatewayError::OrderRejected("coinone market data is read-only".into()))
    }

    async fn place_market_order(
        &self,
        _symbol: &str,
        _side: Side,
        _quantity: Decimal,
    ) -> Result<(), GatewayError> {
        Err(GatewayError::OrderRejected("coinone market data is read-only".into()))
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<(), GatewayError> {
        Err(GatewayError::CancelRejected("coinone market data is read-only".into()))
    }

    async fn list_open_orders(&self, _symbol: &str) -> Result<Vec<String>, GatewayError> {
        Ok(Vec::new())
    }

    fn is_executable(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_ticker_success() {
        let body = r#"{"result":"success","errorCode":"0","currency":"virtual","last":"1523.5"}"#;
        assert_eq!(CoinoneMarketData::parse_ticker(body).unwrap(), Some(dec!(1523.5)));
    }

    #[test]
    fn test_parse_ticker_missing_last() {
        let body = r#"{"result":"success","errorCode":"0"}"#;
        assert_eq!(CoinoneMarketData::parse_ticker(body).unwrap(), None);
    }

    #[test]
    fn test_parse_ticker_error_result() {
        let body = r#"{"result":"error","errorCode":"104"}"#;
        let err = CoinoneMarketData::parse_ticker(body).unwrap_err();
        assert!(matches!(err, GatewayError::Malformed(_)));
        assert!(err.to_string().contains("104"));
    }

    #[test]
    fn test_parse_ticker_no_result_field() {
        let body = r#"{"last":"100"}"#;
        assert!(matches!(
            CoinoneMarketData::parse_ticker(body),
            Err(GatewayError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_ticker_garbage() {
        assert!(matches!(
            CoinoneMarketData::parse_ticker("<html>502</html>"),
            Err(GatewayError::Malformed(_))
        ));
        assert!(matches!(
            CoinoneMarketData::parse_ticker(r#"{"result":"success","last":"abc"}"#),
            Err(GatewayError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_ticker_thousands_separator() {
        let body = r#"{"result":"success","last":"100,000"}"#;
        assert_eq!(CoinoneMarketData::parse_ticker(body).unwrap(), Some(dec!(100000)));
    }

    #[test]
    fn test_parse_order_book_sorted() {
        let body = r#"{
            "result":"success","errorCode":"0",
            "bid":[{"price":"990","qty":"1.5"},{"price":"995","qty":"2"}],
            "ask":[{"price":"1010","qty":"3"},{"price":"1005","qty":"0.5"}]
        }"#;
        let book = CoinoneMarketData::parse_order_book(body).unwrap().unwrap();
        assert_eq!(book.best_bid(), Some(dec!(995)));
        assert_eq!(book.best_ask(), Some(dec!(1005)));
        assert_eq!(book.bids[1].quantity, dec!(1.5));
    }

    #[test]
    fn test_parse_order_book_empty() {
        let body = r#"{"result":"success","bid":[],"ask":[]}"#;
        assert_eq!(CoinoneMarketData::parse_order_book(body).unwrap(), None);
    }

    #[test]
    fn test_client_construction() {
        let client =
            CoinoneMarketData::new(Some("https://example.com/"), Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url, "https://example.com");
        assert!(!client.is_executable());
    }
}
