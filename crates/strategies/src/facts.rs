//! Turns a kline stream into the named boolean facts the rule language
//! references.
//!
//! The `ta` crate works in `f64`; the `Decimal` to `f64` conversion at this
//! boundary is a controlled and accepted precision trade-off for using the
//! library. All money math elsewhere stays in `Decimal`.

use crate::error::StrategyError;
use core_types::Kline;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use ta::indicators::{
    ExponentialMovingAverage, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
};
use ta::Next;

const RSI_PERIOD: usize = 14;
const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;
const EMA_PERIOD: usize = 50;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;

/// The boolean facts derived from one closed kline.
#[derive(Debug, Clone, Default)]
pub struct FactSet {
    values: HashMap<String, bool>,
}

impl FactSet {
    pub fn set(&mut self, name: &str, value: bool) {
        self.values.insert(name.to_string(), value);
    }

    /// Unknown facts read as `false`.
    pub fn is_true(&self, name: &str) -> bool {
        self.values.get(name).copied().unwrap_or(false)
    }

    pub fn known(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// The facts that currently hold, for logging.
    pub fn active(&self) -> Vec<&str> {
        let mut active: Vec<&str> = self
            .values
            .iter()
            .filter(|(_, &v)| v)
            .map(|(k, _)| k.as_str())
            .collect();
        active.sort_unstable();
        active
    }
}

/// Streams kline closes through the indicators and emits a [`FactSet`]
/// per update. Facts stay empty until the slowest indicator has seen a
/// full warm-up window, so early rules simply never fire.
pub struct FactEngine {
    rsi: RelativeStrengthIndex,
    ema: ExponentialMovingAverage,
    macd: MovingAverageConvergenceDivergence,
    observed: usize,
}

impl FactEngine {
    pub fn new() -> Result<Self, StrategyError> {
        Ok(Self {
            rsi: RelativeStrengthIndex::new(RSI_PERIOD)
                .map_err(|e| StrategyError::IndicatorError(e.to_string()))?,
            ema: ExponentialMovingAverage::new(EMA_PERIOD)
                .map_err(|e| StrategyError::IndicatorError(e.to_string()))?,
            macd: MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)
                .map_err(|e| StrategyError::IndicatorError(e.to_string()))?,
            observed: 0,
        })
    }

    /// Klines needed before the slowest indicator output is trustworthy.
    pub fn warmup(&self) -> usize {
        EMA_PERIOD.max(MACD_SLOW + MACD_SIGNAL)
    }

    /// Feeds one closed kline and returns the updated facts.
    pub fn update(&mut self, kline: &Kline) -> Result<FactSet, StrategyError> {
        let close = kline.close.to_f64().ok_or_else(|| {
            StrategyError::IndicatorError(format!("close {} not representable", kline.close))
        })?;

        let rsi = self.rsi.next(close);
        let ema = self.ema.next(close);
        let macd = self.macd.next(close);
        self.observed += 1;

        let mut facts = FactSet::default();
        if self.observed < self.warmup() {
            return Ok(facts);
        }

        facts.set("RSI.oversold", rsi < RSI_OVERSOLD);
        facts.set("RSI.overbought", rsi > RSI_OVERBOUGHT);
        facts.set("MACD.bullish", macd.macd > macd.signal);
        facts.set("MACD.bearish", macd.macd < macd.signal);
        facts.set("PRICE.above_ema", close > ema);
        facts.set("PRICE.below_ema", close < ema);

        tracing::trace!(rsi, ema, macd = macd.macd, macd_signal = macd.signal, "facts updated");
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn kline(close: Decimal) -> Kline {
        Kline {
            open_time: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume: Decimal::ONE,
            close_time: Utc::now(),
            interval: "1m".to_string(),
        }
    }

    #[test]
    fn no_facts_before_warmup() {
        let mut engine = FactEngine::new().unwrap();
        let facts = engine.update(&kline(Decimal::from(100))).unwrap();
        assert!(!facts.known("RSI.oversold"));
        assert!(!facts.is_true("RSI.oversold"));
    }

    #[test]
    fn steady_decline_reads_oversold_and_below_ema() {
        let mut engine = FactEngine::new().unwrap();
        let mut facts = FactSet::default();
        for i in 0..80 {
            facts = engine.update(&kline(Decimal::from(1000 - i * 5))).unwrap();
        }
        assert!(facts.is_true("RSI.oversold"));
        assert!(facts.is_true("PRICE.below_ema"));
        assert!(facts.is_true("MACD.bearish"));
        assert!(!facts.is_true("RSI.overbought"));
    }

    #[test]
    fn steady_rally_reads_overbought_and_above_ema() {
        let mut engine = FactEngine::new().unwrap();
        let mut facts = FactSet::default();
        for i in 0..80 {
            facts = engine.update(&kline(Decimal::from(100 + i * 5))).unwrap();
        }
        assert!(facts.is_true("RSI.overbought"));
        assert!(facts.is_true("PRICE.above_ema"));
        assert!(facts.is_true("MACD.bullish"));
    }
}
