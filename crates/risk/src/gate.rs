use crate::decision::{RiskCheckResult, RiskDecision};
use crate::error::RiskError;
use configuration::RiskProfile;
use core_types::Position;
use rust_decimal::Decimal;

/// Pure, side-effect-free validation of prospective orders against the
/// configured limits and a position/balance snapshot.
///
/// The gate never mutates state and never performs I/O; callers hand it
/// snapshots and read back a [`RiskCheckResult`].
#[derive(Debug, Clone)]
pub struct RiskGate {
    profile: RiskProfile,
}

impl RiskGate {
    /// Creates a new `RiskGate`, rejecting illogical risk parameters.
    pub fn new(profile: RiskProfile) -> Result<Self, RiskError> {
        profile
            .validate("risk gate")
            .map_err(|e| RiskError::InvalidParameters(e.to_string()))?;
        Ok(Self { profile })
    }

    pub fn profile(&self) -> &RiskProfile {
        &self.profile
    }

    /// Validates a prospective BUY.
    ///
    /// Checks, in order: existing position, minimum trade amount, maximum
    /// position size, available balance, and the daily loss limit. An
    /// approved buy carries a `risk_score` of `cost / max_position_size`
    /// for observability.
    pub fn validate_buy(
        &self,
        symbol: &str,
        position: Option<&Position>,
        quantity: Decimal,
        price: Decimal,
        available_balance: Decimal,
        daily_loss: Decimal,
    ) -> RiskCheckResult {
        if position.is_some() {
            return RiskCheckResult::blocked(
                RiskDecision::PositionExists,
                format!("Position already exists for {symbol}. Cannot buy again."),
            );
        }

        let cost = quantity * price;

        if cost < self.profile.min_trade_amount {
            return RiskCheckResult::blocked(
                RiskDecision::PositionSize,
                format!(
                    "Trade amount {cost} below minimum {}",
                    self.profile.min_trade_amount
                ),
            );
        }

        if cost > self.profile.max_position_size {
            return RiskCheckResult::blocked(
                RiskDecision::PositionSize,
                format!(
                    "Trade amount {cost} exceeds maximum {}",
                    self.profile.max_position_size
                ),
            );
        }

        if cost > available_balance {
            return RiskCheckResult::blocked(
                RiskDecision::InsufficientBalance,
                format!("Insufficient balance. Need {cost}, have {available_balance}"),
            );
        }

        if daily_loss >= self.profile.max_daily_loss {
            return RiskCheckResult::blocked(
                RiskDecision::DailyLossLimit,
                format!(
                    "Daily loss {daily_loss} has reached the limit {}",
                    self.profile.max_daily_loss
                ),
            );
        }

        let risk_score = cost / self.profile.max_position_size;
        tracing::debug!(%symbol, %quantity, %price, %cost, %risk_score, "buy validation passed");

        RiskCheckResult {
            decision: RiskDecision::Allow,
            reason: format!("BUY order validated: {symbol} @ {price}"),
            pnl: None,
            ratio: None,
            risk_score: Some(risk_score),
        }
    }

    /// Validates a prospective SELL.
    ///
    /// Exit triggers are evaluated in fixed order (stop-loss, then
    /// take-profit, then min-profit) and the first match wins. Ratio
    /// comparisons are inclusive at the boundary. A losing sell with
    /// `allow_loss_sells` disabled yields [`RiskDecision::Hold`]: the
    /// order must not execute.
    ///
    /// `force` bypasses every check after the position lookup; the computed
    /// ratio and P&L still ride along for logging.
    pub fn validate_sell(
        &self,
        symbol: &str,
        position: Option<&Position>,
        current_price: Decimal,
        force: bool,
    ) -> RiskCheckResult {
        let position = match position {
            Some(p) => p,
            None => {
                return RiskCheckResult::blocked(
                    RiskDecision::NoPosition,
                    format!("No position exists for {symbol}. Cannot sell."),
                );
            }
        };

        let pnl = position.unrealized_pnl(current_price);
        let ratio = position.price_change_ratio(current_price);

        if force {
            tracing::warn!(%symbol, %pnl, %ratio, "force sell requested, bypassing risk checks");
            return RiskCheckResult::with_ratio(
                RiskDecision::Allow,
                format!("Force sell: {symbol} @ {current_price}"),
                pnl,
                ratio,
            );
        }

        if self.profile.use_stop_loss && ratio <= self.profile.stop_loss_ratio {
            tracing::warn!(%symbol, %current_price, entry = %position.entry_price, %ratio, "stop-loss triggered");
            return RiskCheckResult::with_ratio(
                RiskDecision::StopLoss,
                format!("Stop-loss triggered: {symbol} @ {current_price}"),
                pnl,
                ratio,
            );
        }

        if self.profile.use_take_profit && ratio >= self.profile.take_profit_ratio {
            tracing::info!(%symbol, %current_price, entry = %position.entry_price, %ratio, "take-profit triggered");
            return RiskCheckResult::with_ratio(
                RiskDecision::TakeProfit,
                format!("Take-profit triggered: {symbol} @ {current_price}"),
                pnl,
                ratio,
            );
        }

        if self.profile.use_min_profit && ratio >= self.profile.min_profit_ratio {
            tracing::info!(%symbol, %current_price, entry = %position.entry_price, %ratio, "minimum profit reached");
            return RiskCheckResult::with_ratio(
                RiskDecision::MinProfit,
                format!("Minimum profit reached: {symbol} @ {current_price}"),
                pnl,
                ratio,
            );
        }

        if ratio < Decimal::ZERO && !self.profile.allow_loss_sells {
            tracing::info!(%symbol, %current_price, %ratio, "sell withheld by loss protection");
            return RiskCheckResult::with_ratio(
                RiskDecision::Hold,
                format!("Sell at loss withheld (loss protection): {symbol} @ {current_price}"),
                pnl,
                ratio,
            );
        }

        RiskCheckResult::with_ratio(
            RiskDecision::Allow,
            format!("Sell order validated: {symbol} @ {current_price}"),
            pnl,
            ratio,
        )
    }
}
