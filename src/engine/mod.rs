//! Core engine: order tracking, error budget and the cycle controller.

pub mod budget;
pub mod controller;
pub mod stats;
pub mod tracker;

pub use controller::{ControllerConfig, CycleController, TickOutcome};
