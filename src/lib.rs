//! KEEPER: reward-band maker order keeper
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod exchange;
pub mod market;
pub mod strategy;
pub mod engine;
