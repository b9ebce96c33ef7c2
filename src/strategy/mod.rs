//! Pricing strategy: the repricing decision and liquidation pricing.

pub mod liquidation;
pub mod repricing;

pub use liquidation::{LiquidationConfig, LiquidationPricer};
pub use repricing::{Decision, ReplaceReason, RepricingConfig, RepricingPolicy};
