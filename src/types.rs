//! Shared types for the KEEPER agent.
//!
//! These types form the data model used across all modules: order sides,
//! order books and balances as seen through the gateway, the per-tick
//! market snapshot, the tracked order and the controller's cycle state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use crate::exchange::GatewayError;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Order book & balances
// ---------------------------------------------------------------------------

/// One price level of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Order book as reported by the venue.
///
/// `bids` are sorted by price descending and `asks` ascending, so the
/// first element of each is the touch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Whether the book has crossed (best bid at or above best ask).
    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(b), Some(a)) if b >= a)
    }
}

/// Balance of one asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalance {
    /// Free to use for new orders.
    pub available: Decimal,
    /// Available plus whatever is reserved by resting orders.
    pub total: Decimal,
}

/// Balances per asset, keyed by upper-case asset code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balances {
    pub assets: HashMap<String, AssetBalance>,
}

impl Balances {
    /// Balance for an asset; a missing asset reads as zero.
    pub fn get(&self, asset: &str) -> AssetBalance {
        self.assets
            .get(&asset.to_uppercase())
            .copied()
            .unwrap_or_default()
    }

    pub fn set(&mut self, asset: &str, balance: AssetBalance) {
        self.assets.insert(asset.to_uppercase(), balance);
    }

    pub fn available(&self, asset: &str) -> Decimal {
        self.get(asset).available
    }
}

// ---------------------------------------------------------------------------
// Market snapshot
// ---------------------------------------------------------------------------

/// Immutable view of the market, rebuilt every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub last_price: Decimal,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub tick_size: Decimal,
}

impl fmt::Display for MarketSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |p: Option<Decimal>| p.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
        write!(
            f,
            "last={} bid={} ask={} tick={}",
            self.last_price,
            show(self.best_bid),
            show(self.best_ask),
            self.tick_size,
        )
    }
}

// ---------------------------------------------------------------------------
// Tracked order
// ---------------------------------------------------------------------------

/// The single resting order the keeper manages on one side.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedOrder {
    pub order_id: String,
    pub side: Side,
    pub placed_price: Decimal,
    /// Market price when the order was placed. Never changes.
    pub reference_price: Decimal,
    pub quantity: Decimal,
    /// When the venue acknowledged the placement.
    pub acknowledged_at: Instant,
}

impl fmt::Display for TrackedOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} @ {} (ref {})",
            self.side, self.order_id, self.quantity, self.placed_price, self.reference_price,
        )
    }
}

/// Open order ids as listed by the venue, stamped with the fetch time.
#[derive(Debug, Clone)]
pub struct OpenOrderListing {
    pub order_ids: Vec<String>,
    pub fetched_at: Instant,
}

impl OpenOrderListing {
    /// Listing fetched just now.
    pub fn fetched_now(order_ids: Vec<String>) -> Self {
        Self {
            order_ids,
            fetched_at: Instant::now(),
        }
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.order_ids.iter().any(|id| id == order_id)
    }
}

// ---------------------------------------------------------------------------
// Cycle state
// ---------------------------------------------------------------------------

/// Which side the controller is currently managing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleState {
    Idle,
    BuyPending,
    BuyFilledAwaitingSell,
    SellPending,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleState::Idle => write!(f, "IDLE"),
            CycleState::BuyPending => write!(f, "BUY_PENDING"),
            CycleState::BuyFilledAwaitingSell => write!(f, "BUY_FILLED_AWAITING_SELL"),
            CycleState::SellPending => write!(f, "SELL_PENDING"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for KEEPER.
#[derive(Debug, thiserror::Error)]
pub enum KeeperError {
    #[error("Transient fetch error: {0}")]
    TransientFetch(String),

    #[error("Order rejected: {reason}")]
    OrderRejected { reason: String },

    #[error("Cancel rejected for {order_id}: {reason}")]
    CancelRejected { order_id: String, reason: String },

    #[error("Reconciliation ambiguous: {0}")]
    ReconciliationAmbiguous(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("{side} side already tracks order {order_id}")]
    SideOccupied { side: Side, order_id: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Error budget exhausted after {failures} consecutive failures (last: {last})")]
    ErrorBudgetExhausted { failures: u32, last: String },
}

impl KeeperError {
    /// Whether a venue rejection reason means "not enough funds".
    pub fn is_insufficient_funds(reason: &str) -> bool {
        let r = reason.to_lowercase();
        r.contains("insufficient") || r.contains("not enough") || r.contains("balance")
    }

    /// Whether this failure counts against the consecutive-error budget.
    /// A venue rejection leaves no order behind and is not counted.
    pub fn counts_against_budget(&self) -> bool {
        !matches!(self, KeeperError::OrderRejected { .. })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
