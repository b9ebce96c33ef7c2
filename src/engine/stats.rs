//! Session statistics.
//!
//! In-memory counters for one run, logged as a summary on exit.

use chrono::{DateTime, Utc};
use std::fmt;
use tracing::info;

use crate::types::Side;

#[derive(Debug, Clone)]
pub struct SessionStats {
    pub started_at: DateTime<Utc>,
    pub ticks: u64,
    pub buys_placed: u64,
    pub sells_placed: u64,
    pub keeps: u64,
    pub replaces: u64,
    pub buy_fills: u64,
    pub sell_fills: u64,
    pub cancel_attempts: u64,
    pub cancel_successes: u64,
    pub liquidation_failures: u64,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            ticks: 0,
            buys_placed: 0,
            sells_placed: 0,
            keeps: 0,
            replaces: 0,
            buy_fills: 0,
            sell_fills: 0,
            cancel_attempts: 0,
            cancel_successes: 0,
            liquidation_failures: 0,
        }
    }
}

impl SessionStats {
    pub fn record_placement(&mut self, side: Side) {
        match side {
            Side::Buy => self.buys_placed += 1,
            Side::Sell => self.sells_placed += 1,
        }
    }

    pub fn record_fill(&mut self, side: Side) {
        match side {
            Side::Buy => self.buy_fills += 1,
            Side::Sell => self.sell_fills += 1,
        }
    }

    pub fn record_cancel(&mut self, succeeded: bool) {
        self.cancel_attempts += 1;
        if succeeded {
            self.cancel_successes += 1;
        }
    }

    pub fn log_summary(&self) {
        let runtime_secs = (Utc::now() - self.started_at).num_seconds();
        info!(
            runtime_secs,
            ticks = self.ticks,
            buys_placed = self.buys_placed,
            sells_placed = self.sells_placed,
            keeps = self.keeps,
            replaces = self.replaces,
            buy_fills = self.buy_fills,
            sell_fills = self.sell_fills,
            cancel_attempts = self.cancel_attempts,
            cancel_successes = self.cancel_successes,
            liquidation_failures = self.liquidation_failures,
            "Session summary"
        );
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ticks={} placed={}/{} fills={}/{} keeps={} replaces={} cancels={}/{}",
            self.ticks,
            self.buys_placed,
            self.sells_placed,
            self.buy_fills,
            self.sell_fills,
            self.keeps,
            self.replaces,
            self.cancel_successes,
            self.cancel_attempts,
        )
    }
}
