//! Trading strategies: pure signal logic over closed klines.
//!
//! This is a pure logic crate. It has no knowledge of databases, APIs, or
//! execution. It depends only on `core-types` and `configuration`, and the
//! engine consumes it exclusively through the [`Strategy`] trait so that
//! strategy internals stay swappable.

pub mod custom;
pub mod error;
pub mod facts;
pub mod rules;

pub use custom::RuleStrategy;
pub use error::StrategyError;
pub use facts::{FactEngine, FactSet};
pub use rules::RuleExpr;

use configuration::ProfileConfig;
use core_types::{Kline, SignalKind};
use rust_decimal::Decimal;

/// What a strategy wants done after seeing a closed kline.
#[derive(Debug, Clone, PartialEq)]
pub struct TradingSignal {
    pub signal: SignalKind,
    pub confidence: Decimal,
    pub reason: String,
}

/// The core trait all trading strategies implement.
///
/// `&mut self` is deliberate: strategies carry indicator state between
/// klines. `Send + Sync` lets a strategy live inside its symbol's engine
/// task.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// How many historical klines the strategy wants replayed through
    /// [`observe`](Self::observe) before live evaluation starts.
    fn required_history(&self) -> usize;

    /// Feeds one historical kline during warm-up. No signal is produced.
    fn observe(&mut self, kline: &Kline) -> Result<(), StrategyError>;

    /// Evaluates one live closed kline and returns the verdict.
    fn analyze(&mut self, kline: &Kline) -> Result<TradingSignal, StrategyError>;
}

/// Constructs the strategy for a trading profile.
pub fn build_strategy(profile: &ProfileConfig) -> Result<Box<dyn Strategy>, StrategyError> {
    let strategy = RuleStrategy::new(profile.name.clone(), &profile.rules)?;
    Ok(Box::new(strategy))
}
