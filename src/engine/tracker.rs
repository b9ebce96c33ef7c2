//! Order state tracker.
//!
//! Owns the (at most one) resting order per side and reconciles it against
//! the venue's open-order listing. An order that disappears from a fresh
//! listing is treated as filled.

use rust_decimal::Decimal;
use std::time::Instant;
use tracing::{debug, info};

use crate::types::{KeeperError, OpenOrderListing, Side, TrackedOrder};

/// Outcome of reconciling one side against a listing.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    StillOpen,
    /// The order left the listing; the slot has been cleared.
    Filled(TrackedOrder),
    NoOrder,
}

#[derive(Debug, Default)]
pub struct OrderStateTracker {
    buy: Option<TrackedOrder>,
    sell: Option<TrackedOrder>,
}

impl OrderStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, side: Side) -> &Option<TrackedOrder> {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    fn slot_mut(&mut self, side: Side) -> &mut Option<TrackedOrder> {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }

    /// Start tracking an acknowledged placement.
    pub fn record(
        &mut self,
        order_id: impl Into<String>,
        placed_price: Decimal,
        reference_price: Decimal,
        side: Side,
        quantity: Decimal,
    ) -> Result<(), KeeperError> {
        self.record_at(order_id, placed_price, reference_price, side, quantity, Instant::now())
    }

    pub(crate) fn record_at(
        &mut self,
        order_id: impl Into<String>,
        placed_price: Decimal,
        reference_price: Decimal,
        side: Side,
        quantity: Decimal,
        acknowledged_at: Instant,
    ) -> Result<(), KeeperError> {
        let slot = self.slot_mut(side);
        if let Some(existing) = slot {
            return Err(KeeperError::SideOccupied {
                side,
                order_id: existing.order_id.clone(),
            });
        }
        let order = TrackedOrder {
            order_id: order_id.into(),
            side,
            placed_price,
            reference_price,
            quantity,
            acknowledged_at,
        };
        info!(order = %order, "Tracking order");
        *slot = Some(order);
        Ok(())
    }

    pub fn reconcile(&mut self, side: Side, listing: &OpenOrderListing) -> Reconciliation {
        let Some(order) = self.slot(side) else {
            return Reconciliation::NoOrder;
        };

        if listing.fetched_at < order.acknowledged_at {
            debug!(order_id = %order.order_id, "Listing predates placement ack, ignoring");
            return Reconciliation::StillOpen;
        }
        if listing.contains(&order.order_id) {
            return Reconciliation::StillOpen;
        }

        match self.slot_mut(side).take() {
            Some(filled) => {
                info!(order = %filled, "Order no longer open, treating as filled");
                Reconciliation::Filled(filled)
            }
            None => Reconciliation::NoOrder,
        }
    }

    pub fn clear(&mut self, side: Side) -> Option<TrackedOrder> {
        let cleared = self.slot_mut(side).take();
        if let Some(order) = &cleared {
            debug!(order_id = %order.order_id, side = %side, "Tracked order cleared");
        }
        cleared
    }

    pub fn get(&self, side: Side) -> Option<&TrackedOrder> {
        self.slot(side).as_ref()
    }

    /// Every tracked order, buy side first.
    pub fn tracked(&self) -> Vec<TrackedOrder> {
        self.buy.iter().chain(self.sell.iter()).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn tracker_with_buy(id: &str) -> OrderStateTracker {
        let mut t = OrderStateTracker::new();
        t.record(id, dec!(99700), dec!(100000), Side::Buy, dec!(0.05)).unwrap();
        t
    }

    #[test]
    fn test_record_and_get() {
        let t = tracker_with_buy("B1");
        let order = t.get(Side::Buy).unwrap();
        assert_eq!(order.order_id, "B1");
        assert_eq!(order.reference_price, dec!(100000));
        assert!(t.get(Side::Sell).is_none());
    }

    #[test]
    fn test_second_record_on_same_side_is_rejected() {
        let mut t = tracker_with_buy("B1");
        let err = t
            .record("B2", dec!(99600), dec!(99900), Side::Buy, dec!(0.05))
            .unwrap_err();
        assert!(matches!(err, KeeperError::SideOccupied { ref order_id, .. } if order_id == "B1"));
        assert_eq!(t.get(Side::Buy).unwrap().order_id, "B1");

        // The other side is independent
        t.record("S1", dec!(100300), dec!(100000), Side::Sell, dec!(0.05)).unwrap();
        assert_eq!(t.tracked().len(), 2);
    }

    #[test]
    fn test_reconcile_still_open() {
        let mut t = tracker_with_buy("B1");
        let listing = OpenOrderListing::fetched_now(vec!["X".into(), "B1".into()]);
        assert_eq!(t.reconcile(Side::Buy, &listing), Reconciliation::StillOpen);
        assert!(t.get(Side::Buy).is_some());
    }

    #[test]
    fn test_reconcile_missing_id_is_filled_and_clears() {
        let mut t = tracker_with_buy("B1");
        let listing = OpenOrderListing::fetched_now(vec![]);
        match t.reconcile(Side::Buy, &listing) {
            Reconciliation::Filled(order) => assert_eq!(order.order_id, "B1"),
            other => panic!("expected Filled, got {other:?}"),
        }
        assert!(t.get(Side::Buy).is_none());
        assert_eq!(t.reconcile(Side::Buy, &listing), Reconciliation::NoOrder);
    }

    #[test]
    fn test_stale_listing_is_never_a_fill() {
        let mut t = OrderStateTracker::new();
        let ack = Instant::now() + Duration::from_secs(60);
        t.record_at("B1", dec!(99700), dec!(100000), Side::Buy, dec!(1), ack).unwrap();

        let stale = OpenOrderListing::fetched_now(vec![]);
        assert_eq!(t.reconcile(Side::Buy, &stale), Reconciliation::StillOpen);
        assert!(t.get(Side::Buy).is_some());
    }

    #[test]
    fn test_clear() {
        let mut t = tracker_with_buy("B1");
        assert_eq!(t.clear(Side::Buy).map(|o| o.order_id), Some("B1".to_string()));
        assert!(t.clear(Side::Buy).is_none());
        assert!(t.tracked().is_empty());
    }
}
