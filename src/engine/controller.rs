//! Cycle controller: the buy → sell state machine.
//!
//! One tick at a time: read a snapshot, reconcile the managed side, apply
//! the repricing decision. A detected buy fill hands management straight
//! to the sell side, which liquidates the inventory before any new buy.

use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::budget::ErrorBudget;
use crate::engine::stats::SessionStats;
use crate::engine::tracker::{OrderStateTracker, Reconciliation};
use crate::exchange::{ExchangeGateway, GatewayError};
use crate::market::tick::{truncate_quantity, TickSizeRule};
use crate::market::SnapshotReader;
use crate::strategy::liquidation::{LiquidationConfig, LiquidationPricer};
use crate::strategy::repricing::{Decision, ReplaceReason, RepricingConfig, RepricingPolicy};
use crate::types::{CycleState, KeeperError, MarketSnapshot, OpenOrderListing, Side};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Traded asset, e.g. "VIRTUAL".
    pub symbol: String,
    /// Asset the buy is paid in, e.g. "KRW".
    pub quote_currency: String,
    pub order_notional: Decimal,
    /// Venue minimum order value; also the dust threshold for inventory.
    pub min_order_notional: Decimal,
    /// Fraction of the notional held back for fees.
    pub fee_buffer: Decimal,
    pub quantity_scale: u32,
    pub tick_interval: Duration,
    pub settle_delay: Duration,
    pub sell_poll_interval: Duration,
    pub sell_poll_attempts: u32,
    /// Total attempts for a limit placement that fails in transport.
    pub place_attempts: u32,
    pub place_retry_delay: Duration,
    pub max_consecutive_errors: u32,
}

// ---------------------------------------------------------------------------
// Tick outcome
// ---------------------------------------------------------------------------

/// What one tick accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Placed { side: Side, order_id: String, price: Decimal },
    Kept { side: Side },
    Replaced { side: Side, reason: ReplaceReason },
    /// A sell completed the cycle.
    Filled { side: Side },
    /// The liquidation sell did not fill within the poll budget and
    /// keeps resting.
    SellTracked { order_id: String },
    WaitingForFunds,
    /// Nothing to act on this tick.
    Holding,
}

impl TickOutcome {
    /// Successful terminal steps reset the error budget.
    pub fn is_progress(&self) -> bool {
        !matches!(self, TickOutcome::WaitingForFunds | TickOutcome::Holding)
    }
}

impl fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickOutcome::Placed { side, order_id, price } => {
                write!(f, "PLACED {side} {order_id} @ {price}")
            }
            TickOutcome::Kept { side } => write!(f, "KEPT {side}"),
            TickOutcome::Replaced { side, reason } => write!(f, "REPLACED {side} ({reason})"),
            TickOutcome::Filled { side } => write!(f, "FILLED {side}"),
            TickOutcome::SellTracked { order_id } => write!(f, "SELL_TRACKED {order_id}"),
            TickOutcome::WaitingForFunds => write!(f, "WAITING_FOR_FUNDS"),
            TickOutcome::Holding => write!(f, "HOLDING"),
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct CycleController {
    gateway: Arc<dyn ExchangeGateway>,
    config: ControllerConfig,
    reader: SnapshotReader,
    policy: RepricingPolicy,
    pricer: LiquidationPricer,
    tracker: OrderStateTracker,
    state: CycleState,
    budget: ErrorBudget,
    stats: SessionStats,
}

impl CycleController {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        config: ControllerConfig,
        repricing: RepricingConfig,
        liquidation: LiquidationConfig,
        tick_rule: TickSizeRule,
    ) -> Self {
        Self {
            reader: SnapshotReader::new(config.symbol.clone(), tick_rule),
            policy: RepricingPolicy::new(repricing),
            pricer: LiquidationPricer::new(liquidation),
            tracker: OrderStateTracker::new(),
            state: CycleState::Idle,
            budget: ErrorBudget::new(config.max_consecutive_errors),
            stats: SessionStats::default(),
            gateway,
            config,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn tracker(&self) -> &OrderStateTracker {
        &self.tracker
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn budget(&self) -> &ErrorBudget {
        &self.budget
    }

    /// Run ticks until `shutdown` fires or the error budget runs out.
    /// Tracked orders are cancelled on the way out either way.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), KeeperError> {
        info!(
            symbol = %self.config.symbol,
            tick_interval_ms = self.config.tick_interval.as_millis() as u64,
            max_consecutive_errors = self.config.max_consecutive_errors,
            "Cycle controller started"
        );

        let result = loop {
            if shutdown.is_cancelled() {
                break Ok(());
            }

            match self.tick(&shutdown).await {
                Ok(outcome) => {
                    if outcome.is_progress() {
                        self.budget.record_success();
                    }
                    debug!(outcome = %outcome, state = %self.state, "Tick complete");
                }
                Err(e) if e.counts_against_budget() => {
                    warn!(error = %e, state = %self.state, "Tick failed");
                    if self.budget.record_failure(&e.to_string()) {
                        error!(
                            failures = self.budget.consecutive(),
                            "Error budget exhausted, stopping"
                        );
                        break Err(KeeperError::ErrorBudgetExhausted {
                            failures: self.budget.consecutive(),
                            last: e.to_string(),
                        });
                    }
                }
                Err(e) => warn!(error = %e, state = %self.state, "Venue rejected the order"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                _ = tokio::time::sleep(self.config.tick_interval) => {}
            }
        };

        self.shutdown_cleanup().await;
        self.stats.log_summary();
        result
    }

    /// Advance the state machine by one tick.
    pub async fn tick(&mut self, shutdown: &CancellationToken) -> Result<TickOutcome, KeeperError> {
        self.stats.ticks += 1;
        match self.state {
            CycleState::Idle => self.tick_idle(shutdown).await,
            CycleState::BuyPending => self.tick_pending(Side::Buy, shutdown).await,
            CycleState::SellPending => self.tick_pending(Side::Sell, shutdown).await,
            CycleState::BuyFilledAwaitingSell => self.liquidate(None, shutdown).await,
        }
    }

    /// Best-effort cancel of every tracked order. Failures are only logged.
    pub async fn shutdown_cleanup(&mut self) {
        for order in self.tracker.tracked() {
            match self.gateway.cancel_order(&order.order_id).await {
                Ok(()) => {
                    self.stats.record_cancel(true);
                    self.tracker.clear(order.side);
                    info!(order_id = %order.order_id, side = %order.side, "Cancelled on shutdown");
                }
                Err(e) => {
                    self.stats.record_cancel(false);
                    warn!(order_id = %order.order_id, error = %e, "Shutdown cancel failed");
                }
            }
        }
    }

    // -- States ------------------------------------------------------------

    async fn tick_idle(&mut self, shutdown: &CancellationToken) -> Result<TickOutcome, KeeperError> {
        // A sell left resting by an earlier cycle is resolved first
        if self.tracker.get(Side::Sell).is_some() {
            self.transition(CycleState::SellPending);
            return self.tick_pending(Side::Sell, shutdown).await;
        }
        if self.tracker.get(Side::Buy).is_some() {
            self.transition(CycleState::BuyPending);
            return self.tick_pending(Side::Buy, shutdown).await;
        }

        let snapshot = self.reader.read(self.gateway.as_ref()).await?;
        let balances = self
            .gateway
            .get_balances()
            .await
            .map_err(|e| KeeperError::TransientFetch(format!("balances: {e}")))?;

        let inventory = balances.available(&self.config.symbol);
        if !self.is_dust(inventory, snapshot.last_price) {
            info!(quantity = %inventory, "Unsold inventory found, liquidating before any new buy");
            self.transition(CycleState::BuyFilledAwaitingSell);
            return self.liquidate(Some(snapshot), shutdown).await;
        }

        let Decision::Place { price } = self.policy.decide(&snapshot, None, Side::Buy) else {
            return Ok(TickOutcome::Holding);
        };

        let quote = balances.available(&self.config.quote_currency);
        let notional = self.config.order_notional.min(quote) * (Decimal::ONE - self.config.fee_buffer);
        let quantity = if price > Decimal::ZERO {
            truncate_quantity(notional / price, self.config.quantity_scale)
        } else {
            Decimal::ZERO
        };
        if notional < self.config.min_order_notional || quantity <= Decimal::ZERO {
            info!(
                available = %quote,
                currency = %self.config.quote_currency,
                minimum = %self.config.min_order_notional,
                "Insufficient funds for a buy, waiting"
            );
            return Ok(TickOutcome::WaitingForFunds);
        }

        match self.place_limit(Side::Buy, price, quantity).await {
            Ok(order_id) => {
                self.tracker.record(
                    order_id.clone(),
                    price,
                    snapshot.last_price,
                    Side::Buy,
                    quantity,
                )?;
                self.stats.record_placement(Side::Buy);
                self.transition(CycleState::BuyPending);
                Ok(TickOutcome::Placed {
                    side: Side::Buy,
                    order_id,
                    price,
                })
            }
            Err(GatewayError::OrderRejected(reason)) if KeeperError::is_insufficient_funds(&reason) => {
                info!(reason = %reason, "Buy rejected for insufficient funds, waiting");
                Ok(TickOutcome::WaitingForFunds)
            }
            Err(e) => Err(placement_error(e)),
        }
    }

    async fn tick_pending(
        &mut self,
        side: Side,
        shutdown: &CancellationToken,
    ) -> Result<TickOutcome, KeeperError> {
        let snapshot = self.reader.read(self.gateway.as_ref()).await?;
        let listing = self.fetch_listing().await?;

        match self.tracker.reconcile(side, &listing) {
            Reconciliation::NoOrder => {
                self.transition(CycleState::Idle);
                Ok(TickOutcome::Holding)
            }
            Reconciliation::Filled(order) => {
                self.stats.record_fill(side);
                info!(order = %order, last = %snapshot.last_price, "Order filled");
                match side {
                    Side::Buy => {
                        self.transition(CycleState::BuyFilledAwaitingSell);
                        self.liquidate(Some(snapshot), shutdown).await
                    }
                    Side::Sell => {
                        self.transition(CycleState::Idle);
                        Ok(TickOutcome::Filled { side })
                    }
                }
            }
            Reconciliation::StillOpen => {
                match self.policy.decide(&snapshot, self.tracker.get(side), side) {
                    Decision::Keep => {
                        self.stats.keeps += 1;
                        Ok(TickOutcome::Kept { side })
                    }
                    Decision::Replace { reason, new_price } => {
                        info!(
                            side = %side,
                            reason = %reason,
                            new_price = %new_price,
                            last = %snapshot.last_price,
                            "Replacing order"
                        );
                        self.cancel_tracked(side).await?;
                        self.stats.replaces += 1;
                        self.pause(self.config.settle_delay, shutdown).await;
                        self.transition(CycleState::Idle);
                        Ok(TickOutcome::Replaced { side, reason })
                    }
                    Decision::Place { .. } => Ok(TickOutcome::Holding),
                }
            }
        }
    }

    /// Sell the coin balance at a price meant to fill quickly.
    async fn liquidate(
        &mut self,
        snapshot: Option<MarketSnapshot>,
        shutdown: &CancellationToken,
    ) -> Result<TickOutcome, KeeperError> {
        let snapshot = match snapshot {
            Some(s) => s,
            None => self.reader.read(self.gateway.as_ref()).await?,
        };
        let balances = self
            .gateway
            .get_balances()
            .await
            .map_err(|e| KeeperError::TransientFetch(format!("balances: {e}")))?;
        let quantity = truncate_quantity(
            balances.available(&self.config.symbol),
            self.config.quantity_scale,
        );

        if let Some(resting) = self.tracker.get(Side::Sell) {
            let order_id = resting.order_id.clone();
            self.transition(CycleState::Idle);
            return Err(KeeperError::SideOccupied {
                side: Side::Sell,
                order_id,
            });
        }
        if self.is_dust(quantity, snapshot.last_price) {
            info!(quantity = %quantity, "Nothing to liquidate");
            self.transition(CycleState::Idle);
            return Ok(TickOutcome::Holding);
        }

        if self.pricer.config().use_market_order {
            match self
                .gateway
                .place_market_order(&self.config.symbol, Side::Sell, quantity)
                .await
            {
                Ok(()) => {
                    info!(quantity = %quantity, "Inventory sold at market");
                    self.stats.record_placement(Side::Sell);
                    self.stats.record_fill(Side::Sell);
                    self.transition(CycleState::Idle);
                    return Ok(TickOutcome::Filled { side: Side::Sell });
                }
                Err(e) => warn!(error = %e, "Market sell failed, falling back to limit"),
            }
        }

        let first = match self.place_liquidation_sell(&snapshot, 0, quantity).await {
            Ok(order_id) => return self.await_sell_fill(order_id, shutdown).await,
            Err(e) => e,
        };
        warn!(error = %first, "Liquidation sell failed, retrying deeper");

        let retry = match self.place_liquidation_sell(&snapshot, 1, quantity).await {
            Ok(order_id) => return self.await_sell_fill(order_id, shutdown).await,
            Err(e) => e,
        };
        error!(error = %retry, quantity = %quantity, "Liquidation failed, inventory left for next cycle");
        self.stats.liquidation_failures += 1;
        self.transition(CycleState::Idle);
        Err(retry)
    }

    async fn place_liquidation_sell(
        &mut self,
        snapshot: &MarketSnapshot,
        attempt: u32,
        quantity: Decimal,
    ) -> Result<String, KeeperError> {
        let price = self.pricer.sell_price(snapshot, attempt);
        let order_id = self
            .place_limit(Side::Sell, price, quantity)
            .await
            .map_err(placement_error)?;
        self.stats.record_placement(Side::Sell);
        self.tracker
            .record(order_id.clone(), price, snapshot.last_price, Side::Sell, quantity)?;
        Ok(order_id)
    }

    /// Poll the listing until the sell leaves it or the poll budget runs out.
    async fn await_sell_fill(
        &mut self,
        order_id: String,
        shutdown: &CancellationToken,
    ) -> Result<TickOutcome, KeeperError> {
        for poll in 1..=self.config.sell_poll_attempts {
            if !self.pause(self.config.sell_poll_interval, shutdown).await {
                break;
            }
            let listing = match self.fetch_listing().await {
                Ok(l) => l,
                Err(e) => {
                    warn!(poll, error = %e, "Sell poll failed");
                    continue;
                }
            };
            if let Reconciliation::Filled(order) = self.tracker.reconcile(Side::Sell, &listing) {
                info!(order = %order, polls = poll, "Liquidation sell filled");
                self.stats.record_fill(Side::Sell);
                self.transition(CycleState::Idle);
                return Ok(TickOutcome::Filled { side: Side::Sell });
            }
            debug!(poll, order_id = %order_id, "Liquidation sell still open");
        }

        info!(order_id = %order_id, "Sell still resting after poll budget, tracking it");
        self.transition(CycleState::Idle);
        Ok(TickOutcome::SellTracked { order_id })
    }

    // -- Helpers -----------------------------------------------------------

    /// Place a limit order, retrying transport and malformed failures.
    async fn place_limit(
        &self,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<String, GatewayError> {
        let mut attempt = 1;
        loop {
            match self
                .gateway
                .place_limit_order(&self.config.symbol, side, price, quantity)
                .await
            {
                Ok(order_id) => {
                    info!(
                        order_id = %order_id,
                        side = %side,
                        price = %price,
                        quantity = %quantity,
                        "Order placed"
                    );
                    return Ok(order_id);
                }
                Err(e @ (GatewayError::Transport(_) | GatewayError::Malformed(_)))
                    if attempt < self.config.place_attempts =>
                {
                    warn!(attempt, side = %side, error = %e, "Placement failed, retrying");
                    tokio::time::sleep(self.config.place_retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn cancel_tracked(&mut self, side: Side) -> Result<(), KeeperError> {
        let Some(order_id) = self.tracker.get(side).map(|o| o.order_id.clone()) else {
            return Ok(());
        };
        match self.gateway.cancel_order(&order_id).await {
            Ok(()) => {
                self.stats.record_cancel(true);
                self.tracker.clear(side);
                Ok(())
            }
            Err(e) => {
                self.stats.record_cancel(false);
                Err(KeeperError::CancelRejected {
                    order_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn fetch_listing(&self) -> Result<OpenOrderListing, KeeperError> {
        let ids = self
            .gateway
            .list_open_orders(&self.config.symbol)
            .await
            .map_err(|e| KeeperError::ReconciliationAmbiguous(e.to_string()))?;
        Ok(OpenOrderListing::fetched_now(ids))
    }

    /// Sleep unless shutdown fires first. Returns false when interrupted.
    async fn pause(&self, duration: Duration, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn is_dust(&self, quantity: Decimal, price: Decimal) -> bool {
        quantity <= Decimal::ZERO || quantity * price < self.config.min_order_notional
    }

    fn transition(&mut self, next: CycleState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "State transition");
            self.state = next;
        }
    }
}

/// Venue rejections stay uncounted; anything else is a gateway failure.
fn placement_error(e: GatewayError) -> KeeperError {
    match e {
        GatewayError::OrderRejected(reason) => KeeperError::OrderRejected { reason },
        other => KeeperError::Gateway(other),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
