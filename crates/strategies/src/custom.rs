use crate::error::StrategyError;
use crate::facts::FactEngine;
use crate::rules::RuleExpr;
use crate::{Strategy, TradingSignal};
use configuration::RuleConfig;
use core_types::{Kline, SignalKind};
use rust_decimal_macros::dec;

struct CompiledRule {
    name: String,
    expr: RuleExpr,
    signal: SignalKind,
}

/// A rule-driven strategy: named boolean conditions over indicator facts,
/// evaluated top to bottom. The first rule whose condition holds decides
/// the signal for the cycle; with no match the strategy holds.
pub struct RuleStrategy {
    name: String,
    rules: Vec<CompiledRule>,
    facts: FactEngine,
}

impl RuleStrategy {
    /// Compiles the configured rules. A condition that fails to parse is a
    /// startup error, so a broken rule can never reach live evaluation.
    pub fn new(name: impl Into<String>, rules: &[RuleConfig]) -> Result<Self, StrategyError> {
        if rules.is_empty() {
            return Err(StrategyError::InvalidParameters(
                "at least one rule is required".to_string(),
            ));
        }
        let compiled = rules
            .iter()
            .map(|rule| {
                Ok(CompiledRule {
                    name: rule.name.clone(),
                    expr: RuleExpr::parse(&rule.condition)?,
                    signal: rule.signal,
                })
            })
            .collect::<Result<Vec<_>, StrategyError>>()?;

        Ok(Self {
            name: name.into(),
            rules: compiled,
            facts: FactEngine::new()?,
        })
    }
}

impl Strategy for RuleStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_history(&self) -> usize {
        self.facts.warmup()
    }

    fn observe(&mut self, kline: &Kline) -> Result<(), StrategyError> {
        self.facts.update(kline)?;
        Ok(())
    }

    fn analyze(&mut self, kline: &Kline) -> Result<TradingSignal, StrategyError> {
        let facts = self.facts.update(kline)?;

        for rule in &self.rules {
            if rule.expr.evaluate(&facts) {
                tracing::debug!(strategy = %self.name, rule = %rule.name, active = ?facts.active(), "rule matched");
                return Ok(TradingSignal {
                    signal: rule.signal,
                    confidence: dec!(1.0),
                    reason: format!("rule '{}' matched", rule.name),
                });
            }
        }

        Ok(TradingSignal {
            signal: SignalKind::Hold,
            confidence: dec!(1.0),
            reason: "no rule matched".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn rule(name: &str, condition: &str, signal: SignalKind) -> RuleConfig {
        RuleConfig {
            name: name.to_string(),
            condition: condition.to_string(),
            signal,
        }
    }

    fn kline(close: i64) -> Kline {
        let close = Decimal::from(close);
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
    fn broken_condition_is_a_startup_error() {
        let result = RuleStrategy::new(
            "test",
            &[rule("bad", "RSI.oversold AND", SignalKind::Buy)],
        );
        assert!(matches!(result, Err(StrategyError::RuleParse { .. })));
    }

    #[test]
    fn no_rules_is_rejected() {
        assert!(RuleStrategy::new("test", &[]).is_err());
    }

    #[test]
    fn holds_until_a_rule_matches() {
        let mut strategy = RuleStrategy::new(
            "dip buyer",
            &[rule("dip", "RSI.oversold", SignalKind::Buy)],
        )
        .unwrap();

        // Flat prices: warmed up but no rule fires.
        let mut last = TradingSignal {
            signal: SignalKind::Hold,
            confidence: dec!(1.0),
            reason: String::new(),
        };
        for _ in 0..80 {
            last = strategy.analyze(&kline(1000)).unwrap();
        }
        assert_eq!(last.signal, SignalKind::Hold);

        // A hard decline trips the RSI rule.
        for i in 1..=30 {
            last = strategy.analyze(&kline(1000 - i * 10)).unwrap();
        }
        assert_eq!(last.signal, SignalKind::Buy);
        assert!(last.reason.contains("dip"));
    }

    #[test]
    fn first_matching_rule_wins() {
        let mut strategy = RuleStrategy::new(
            "ordered",
            &[
                rule("exit", "PRICE.below_ema", SignalKind::Sell),
                rule("also below", "PRICE.below_ema", SignalKind::Buy),
            ],
        )
        .unwrap();

        let mut last = strategy.analyze(&kline(1000)).unwrap();
        for i in 1..=80 {
            last = strategy.analyze(&kline(1000 - i * 5)).unwrap();
        }
        assert_eq!(last.signal, SignalKind::Sell);
        assert!(last.reason.contains("exit"));
    }
}
