use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The tagged outcome of a risk validation call.
///
/// Most variants block the proposed order. The three exit triggers
/// (`StopLoss`, `TakeProfit`, `MinProfit`) are different: they signal
/// "sell now", not "forbid sell"; the coordinator treats them as
/// permission to exit. `Hold` means the sell is withheld by loss
/// protection and nothing should execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskDecision {
    Allow,
    /// Loss protection: a discretionary sell at a loss with
    /// `allow_loss_sells` disabled. No execution.
    Hold,
    PositionExists,
    NoPosition,
    InsufficientBalance,
    PositionSize,
    DailyLossLimit,
    StopLoss,
    TakeProfit,
    MinProfit,
}

impl RiskDecision {
    /// True for the conditions whose satisfaction should cause an exit.
    pub fn is_exit_trigger(&self) -> bool {
        matches!(
            self,
            RiskDecision::StopLoss | RiskDecision::TakeProfit | RiskDecision::MinProfit
        )
    }

    /// Whether a BUY carrying this decision may be executed.
    pub fn permits_buy(&self) -> bool {
        matches!(self, RiskDecision::Allow)
    }

    /// Whether a SELL carrying this decision may be executed. Exit triggers
    /// count as permission; `Hold` and the blocking variants do not.
    pub fn permits_sell(&self) -> bool {
        matches!(self, RiskDecision::Allow) || self.is_exit_trigger()
    }
}

/// Result of a risk validation: the decision plus the numbers that
/// produced it. A value type, never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskCheckResult {
    pub decision: RiskDecision,
    pub reason: String,
    /// Unrealized P&L at the evaluated price (sell checks only).
    pub pnl: Option<Decimal>,
    /// Price change ratio relative to entry (sell checks only).
    pub ratio: Option<Decimal>,
    /// Normalized `cost / max_position_size` measure (buy checks only).
    pub risk_score: Option<Decimal>,
}

impl RiskCheckResult {
    pub fn blocked(decision: RiskDecision, reason: impl Into<String>) -> Self {
        Self {
            decision,
            reason: reason.into(),
            pnl: None,
            ratio: None,
            risk_score: None,
        }
    }

    pub fn with_ratio(
        decision: RiskDecision,
        reason: impl Into<String>,
        pnl: Decimal,
        ratio: Decimal,
    ) -> Self {
        Self {
            decision,
            reason: reason.into(),
            pnl: Some(pnl),
            ratio: Some(ratio),
            risk_score: None,
        }
    }
}
