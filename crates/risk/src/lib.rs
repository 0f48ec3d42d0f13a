//! Risk management for the trading core.
//!
//! The [`RiskGate`] is a pure decision function: given a price, an amount,
//! a position snapshot, and the configured limits it answers whether a
//! prospective BUY or SELL should proceed. It performs no I/O and mutates
//! nothing, which keeps it fully unit-testable without mocks.
//!
//! The [`DailyLossTracker`] is the one mutable piece of risk state: the
//! order coordinator feeds realized losses into it, and the gate reads the
//! running total when validating buys.

pub mod daily_loss;
pub mod decision;
pub mod error;
pub mod gate;

pub use daily_loss::DailyLossTracker;
pub use decision::{RiskCheckResult, RiskDecision};
pub use error::RiskError;
pub use gate::RiskGate;
