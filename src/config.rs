//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Money and ratio values are written as strings and parsed straight into
//! `Decimal`. Every section except `[bot]` has defaults.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::ControllerConfig;
use crate::exchange::paper::PaperConfig;
use crate::market::tick::TickSizeRule;
use crate::strategy::{LiquidationConfig, RepricingConfig};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub bot: BotConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub liquidation: LiquidationSection,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub paper: PaperSection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub name: String,
    /// Traded asset, e.g. "VIRTUAL".
    pub symbol: String,
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StrategyConfig {
    pub reward_threshold: Decimal,
    pub order_offset: Decimal,
    pub execution_risk_threshold: Decimal,
    pub order_notional: Decimal,
    pub min_order_notional: Decimal,
    pub fee_buffer: Decimal,
    pub quantity_scale: u32,
    /// Fixed tick size. Absent means the KRW tier table.
    pub tick_size: Option<Decimal>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            reward_threshold: dec!(0.005),
            order_offset: dec!(0.003),
            execution_risk_threshold: dec!(0.001),
            order_notional: dec!(10000),
            min_order_notional: dec!(5000),
            fee_buffer: dec!(0.002),
            quantity_scale: 4,
            tick_size: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingConfig {
    pub tick_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub sell_poll_interval_ms: u64,
    pub sell_poll_attempts: u32,
    pub place_attempts: u32,
    pub place_retry_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 3000,
            settle_delay_ms: 1000,
            sell_poll_interval_ms: 1000,
            sell_poll_attempts: 10,
            place_attempts: 3,
            place_retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RiskConfig {
    pub max_consecutive_errors: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_consecutive_errors: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LiquidationSection {
    pub slippage_ticks: u32,
    pub fallback_discount: Decimal,
    pub retry_discount: Decimal,
    pub use_market_order: bool,
}

impl Default for LiquidationSection {
    fn default() -> Self {
        let d = LiquidationConfig::default();
        Self {
            slippage_ticks: d.slippage_ticks,
            fallback_discount: d.fallback_discount,
            retry_discount: d.retry_discount,
            use_market_order: d.use_market_order,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketDataConfig {
    pub provider: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            provider: "coinone".into(),
            base_url: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PaperSection {
    pub quote_balance: Decimal,
    pub base_balance: Decimal,
    pub fee_rate: Decimal,
}

impl Default for PaperSection {
    fn default() -> Self {
        Self {
            quote_balance: dec!(1000000),
            base_balance: Decimal::ZERO,
            fee_rate: dec!(0.002),
        }
    }
}

fn default_quote_currency() -> String {
    "KRW".into()
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.strategy;
        if s.execution_risk_threshold < Decimal::ZERO {
            bail!("execution_risk_threshold must not be negative");
        }
        if s.execution_risk_threshold > s.order_offset {
            bail!(
                "execution_risk_threshold ({}) must not exceed order_offset ({})",
                s.execution_risk_threshold,
                s.order_offset
            );
        }
        if s.order_offset > s.reward_threshold {
            bail!(
                "order_offset ({}) must not exceed reward_threshold ({})",
                s.order_offset,
                s.reward_threshold
            );
        }
        if s.reward_threshold >= Decimal::ONE {
            bail!("reward_threshold must be below 1");
        }
        if s.order_notional <= Decimal::ZERO {
            bail!("order_notional must be positive");
        }
        if s.min_order_notional < Decimal::ZERO {
            bail!("min_order_notional must not be negative");
        }
        if s.fee_buffer < Decimal::ZERO || s.fee_buffer >= Decimal::ONE {
            bail!("fee_buffer must be in [0, 1)");
        }
        if matches!(s.tick_size, Some(t) if t <= Decimal::ZERO) {
            bail!("tick_size must be positive when set");
        }
        if self.risk.max_consecutive_errors < 1 {
            bail!("max_consecutive_errors must be at least 1");
        }
        if self.timing.place_attempts < 1 {
            bail!("place_attempts must be at least 1");
        }
        let l = &self.liquidation;
        if l.retry_discount < l.fallback_discount {
            bail!(
                "retry_discount ({}) must be at least fallback_discount ({})",
                l.retry_discount,
                l.fallback_discount
            );
        }
        if l.retry_discount >= Decimal::ONE {
            bail!("retry_discount must be below 1");
        }
        Ok(())
    }

    pub fn repricing(&self) -> RepricingConfig {
        RepricingConfig {
            reward_threshold: self.strategy.reward_threshold,
            order_offset: self.strategy.order_offset,
            execution_risk_threshold: self.strategy.execution_risk_threshold,
        }
    }

    pub fn liquidation(&self) -> LiquidationConfig {
        LiquidationConfig {
            slippage_ticks: self.liquidation.slippage_ticks,
            fallback_discount: self.liquidation.fallback_discount,
            retry_discount: self.liquidation.retry_discount,
            use_market_order: self.liquidation.use_market_order,
        }
    }

    pub fn tick_rule(&self) -> TickSizeRule {
        TickSizeRule::from_config(self.strategy.tick_size)
    }

    pub fn controller(&self) -> ControllerConfig {
        let t = &self.timing;
        ControllerConfig {
            symbol: self.bot.symbol.to_uppercase(),
            quote_currency: self.bot.quote_currency.to_uppercase(),
            order_notional: self.strategy.order_notional,
            min_order_notional: self.strategy.min_order_notional,
            fee_buffer: self.strategy.fee_buffer,
            quantity_scale: self.strategy.quantity_scale,
            tick_interval: Duration::from_millis(t.tick_interval_ms),
            settle_delay: Duration::from_millis(t.settle_delay_ms),
            sell_poll_interval: Duration::from_millis(t.sell_poll_interval_ms),
            sell_poll_attempts: t.sell_poll_attempts,
            place_attempts: t.place_attempts,
            place_retry_delay: Duration::from_millis(t.place_retry_delay_ms),
            max_consecutive_errors: self.risk.max_consecutive_errors,
        }
    }

    pub fn paper(&self) -> PaperConfig {
        PaperConfig {
            base_asset: self.bot.symbol.to_uppercase(),
            quote_asset: self.bot.quote_currency.to_uppercase(),
            quote_balance: self.paper.quote_balance,
            base_balance: self.paper.base_balance,
            fee_rate: self.paper.fee_rate,
        }
    }
}
