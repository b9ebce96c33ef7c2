//! Scripted exchange for lifecycle testing.
//!
//! Provides a deterministic `ExchangeGateway` whose market, balances and
//! open orders are fully controllable from test code. Limit orders that
//! are marketable against the scripted book fill on placement; everything
//! else rests until the test fills or cancels it.

#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Mutex;
use std::time::Duration;

use keeper::engine::ControllerConfig;
use keeper::exchange::{ExchangeGateway, GatewayError};
use keeper::strategy::RepricingConfig;
use keeper::types::{AssetBalance, Balances, OrderBook, PriceLevel, Side};

pub const SYMBOL: &str = "COIN";
pub const QUOTE: &str = "KRW";

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedOrder {
    pub order_id: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Default)]
struct Script {
    price: Option<Decimal>,
    book: Option<OrderBook>,
    balances: Balances,
    open: Vec<ScriptedOrder>,
    placed: Vec<ScriptedOrder>,
    market_sells: Vec<Decimal>,
    cancelled: Vec<String>,
    next_id: u64,
    reject_place: Option<String>,
    reject_cancel: Option<String>,
    fail_listing: bool,
}

pub struct ScriptedExchange {
    script: Mutex<Script>,
}

impl ScriptedExchange {
    pub fn new(price: Decimal, krw: Decimal, coin: Decimal) -> Self {
        let mut balances = Balances::default();
        balances.set(QUOTE, AssetBalance { available: krw, total: krw });
        balances.set(SYMBOL, AssetBalance { available: coin, total: coin });
        Self {
            script: Mutex::new(Script {
                price: Some(price),
                balances,
                ..Script::default()
            }),
        }
    }

    // -- Scripting ---------------------------------------------------------

    pub fn set_price(&self, price: Option<Decimal>) {
        self.script.lock().unwrap().price = price;
    }

    pub fn set_book(&self, bid: Decimal, ask: Decimal) {
        self.script.lock().unwrap().book = Some(OrderBook {
            bids: vec![PriceLevel::new(bid, dec!(10))],
            asks: vec![PriceLevel::new(ask, dec!(10))],
        });
    }

    pub fn reject_place(&self, reason: Option<&str>) {
        self.script.lock().unwrap().reject_place = reason.map(str::to_string);
    }

    pub fn reject_cancel(&self, reason: Option<&str>) {
        self.script.lock().unwrap().reject_cancel = reason.map(str::to_string);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.script.lock().unwrap().fail_listing = fail;
    }

    /// Fill a resting order in full at its limit price.
    pub fn fill(&self, order_id: &str) {
        let mut s = self.script.lock().unwrap();
        let Some(pos) = s.open.iter().position(|o| o.order_id == order_id) else {
            panic!("no open order {order_id}");
        };
        let order = s.open.remove(pos);
        settle(&mut s.balances, &order);
    }

    // -- Inspection --------------------------------------------------------

    pub fn placed(&self) -> Vec<ScriptedOrder> {
        self.script.lock().unwrap().placed.clone()
    }

    pub fn placed_on(&self, side: Side) -> Vec<ScriptedOrder> {
        self.placed().into_iter().filter(|o| o.side == side).collect()
    }

    pub fn open_ids(&self) -> Vec<String> {
        self.script.lock().unwrap().open.iter().map(|o| o.order_id.clone()).collect()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.script.lock().unwrap().cancelled.clone()
    }

    pub fn market_sells(&self) -> Vec<Decimal> {
        self.script.lock().unwrap().market_sells.clone()
    }

    pub fn balance(&self, asset: &str) -> AssetBalance {
        self.script.lock().unwrap().balances.get(asset)
    }
}

fn adjust(balances: &mut Balances, asset: &str, available: Decimal, total: Decimal) {
    let mut b = balances.get(asset);
    b.available += available;
    b.total += total;
    balances.set(asset, b);
}

fn settle(balances: &mut Balances, order: &ScriptedOrder) {
    let notional = order.price * order.quantity;
    match order.side {
        Side::Buy => {
            adjust(balances, QUOTE, Decimal::ZERO, -notional);
            adjust(balances, SYMBOL, order.quantity, order.quantity);
        }
        Side::Sell => {
            adjust(balances, SYMBOL, Decimal::ZERO, -order.quantity);
            adjust(balances, QUOTE, notional, notional);
        }
    }
}

#[async_trait]
impl ExchangeGateway for ScriptedExchange {
    async fn get_market_price(&self, _symbol: &str) -> Result<Option<Decimal>, GatewayError> {
        Ok(self.script.lock().unwrap().price)
    }

    async fn get_order_book(&self, _symbol: &str) -> Result<Option<OrderBook>, GatewayError> {
        Ok(self.script.lock().unwrap().book.clone())
    }

    async fn get_balances(&self) -> Result<Balances, GatewayError> {
        Ok(self.script.lock().unwrap().balances.clone())
    }

    async fn place_limit_order(
        &self,
        _symbol: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<String, GatewayError> {
        let mut s = self.script.lock().unwrap();
        if let Some(reason) = &s.reject_place {
            return Err(GatewayError::OrderRejected(reason.clone()));
        }
        s.next_id += 1;
        let order = ScriptedOrder {
            order_id: format!("O{}", s.next_id),
            side,
            price,
            quantity,
        };
        s.placed.push(order.clone());

        // Reserve
        match side {
            Side::Buy => adjust(&mut s.balances, QUOTE, -(price * quantity), Decimal::ZERO),
            Side::Sell => adjust(&mut s.balances, SYMBOL, -quantity, Decimal::ZERO),
        }

        let marketable = match (&s.book, side) {
            (Some(book), Side::Sell) => book.best_bid().is_some_and(|bid| price <= bid),
            (Some(book), Side::Buy) => book.best_ask().is_some_and(|ask| price >= ask),
            (None, _) => false,
        };
        if marketable {
            settle(&mut s.balances, &order);
        } else {
            s.open.push(order.clone());
        }
        Ok(order.order_id)
    }

    async fn place_market_order(
        &self,
        _symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<(), GatewayError> {
        let mut s = self.script.lock().unwrap();
        if let Some(reason) = &s.reject_place {
            return Err(GatewayError::OrderRejected(reason.clone()));
        }
        let Some(price) = s.price else {
            return Err(GatewayError::OrderRejected("no price".into()));
        };
        let order = ScriptedOrder {
            order_id: "market".into(),
            side,
            price,
            quantity,
        };
        match side {
            Side::Buy => adjust(&mut s.balances, QUOTE, -(price * quantity), Decimal::ZERO),
            Side::Sell => adjust(&mut s.balances, SYMBOL, -quantity, Decimal::ZERO),
        }
        settle(&mut s.balances, &order);
        s.market_sells.push(quantity);
        Ok(())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), GatewayError> {
        let mut s = self.script.lock().unwrap();
        if let Some(reason) = &s.reject_cancel {
            return Err(GatewayError::CancelRejected(reason.clone()));
        }
        let Some(pos) = s.open.iter().position(|o| o.order_id == order_id) else {
            return Err(GatewayError::CancelRejected("order not found".into()));
        };
        let order = s.open.remove(pos);
        match order.side {
            Side::Buy => adjust(&mut s.balances, QUOTE, order.price * order.quantity, Decimal::ZERO),
            Side::Sell => adjust(&mut s.balances, SYMBOL, order.quantity, Decimal::ZERO),
        }
        s.cancelled.push(order_id.to_string());
        Ok(())
    }

    async fn list_open_orders(&self, _symbol: &str) -> Result<Vec<String>, GatewayError> {
        let s = self.script.lock().unwrap();
        if s.fail_listing {
            return Err(GatewayError::Transport("listing timed out".into()));
        }
        Ok(s.open.iter().map(|o| o.order_id.clone()).collect())
    }

    fn is_executable(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Controller fixtures
// ---------------------------------------------------------------------------

pub fn controller_config() -> ControllerConfig {
    ControllerConfig {
        symbol: SYMBOL.into(),
        quote_currency: QUOTE.into(),
        order_notional: dec!(10000),
        min_order_notional: dec!(5000),
        fee_buffer: Decimal::ZERO,
        quantity_scale: 4,
        tick_interval: Duration::ZERO,
        settle_delay: Duration::ZERO,
        sell_poll_interval: Duration::ZERO,
        sell_poll_attempts: 2,
        place_attempts: 2,
        place_retry_delay: Duration::ZERO,
        max_consecutive_errors: 5,
    }
}

pub fn repricing() -> RepricingConfig {
    RepricingConfig {
        reward_threshold: dec!(0.005),
        order_offset: dec!(0.003),
        execution_risk_threshold: dec!(0.001),
    }
}
