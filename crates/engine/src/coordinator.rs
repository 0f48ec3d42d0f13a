//! The order coordinator: the one place that turns a trade intent into an
//! exchange order and a ledger entry.
//!
//! Every lifecycle runs under the symbol's ledger lock, held from the first
//! position read until the fill is recorded, so two decisions for the same
//! symbol can never interleave. The ledger is only touched after the
//! exchange confirms a fill; a rejection or transport failure leaves it
//! untouched. If the ledger disagrees with a confirmed fill afterwards,
//! that is a reconciliation anomaly: it is reported loudly and the fill is
//! never reversed.

use alerter::Notifier;
use core_types::{OrderSide, Position, TradeRecord};
use exchange::{BalanceCache, ExchangeClient, FillResult};
use ledger::{LedgerError, PositionLedger};
use risk::{DailyLossTracker, RiskGate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

// Held back from the balance to absorb fees and price drift between
// sizing and execution.
const BALANCE_HEADROOM: Decimal = dec!(0.999);

/// The result of one order lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    /// The exchange confirmed the fill and the ledger was updated.
    Executed {
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
        order_id: String,
        profit: Option<Decimal>,
    },
    /// The order was not placed, or the exchange declined it. No state
    /// changed.
    Rejected { reason: String },
    /// Something failed along the way. No ledger change was recorded.
    Failed { reason: String },
}

pub struct OrderCoordinator {
    ledger: Arc<PositionLedger>,
    exchange: Arc<dyn ExchangeClient>,
    notifier: Arc<dyn Notifier>,
    balance: Arc<BalanceCache>,
    daily_loss: Arc<DailyLossTracker>,
}

impl OrderCoordinator {
    pub fn new(
        ledger: Arc<PositionLedger>,
        exchange: Arc<dyn ExchangeClient>,
        notifier: Arc<dyn Notifier>,
        balance: Arc<BalanceCache>,
        daily_loss: Arc<DailyLossTracker>,
    ) -> Self {
        Self {
            ledger,
            exchange,
            notifier,
            balance,
            daily_loss,
        }
    }

    pub fn daily_loss(&self) -> &Arc<DailyLossTracker> {
        &self.daily_loss
    }

    /// Runs a full BUY lifecycle for the symbol.
    pub async fn execute_buy(&self, symbol: &str, gate: &RiskGate, reason: &str) -> OrderOutcome {
        let _guard = self.ledger.acquire(symbol).await;

        let position = match self.ledger.position(symbol).await {
            Ok(p) => p,
            Err(e) => return self.failed(symbol, "position lookup", e.to_string()).await,
        };

        let price = match self.exchange.current_price(symbol).await {
            Ok(p) => p,
            Err(e) => return self.failed(symbol, "price fetch", e.to_string()).await,
        };
        if price <= Decimal::ZERO {
            return self
                .failed(symbol, "price fetch", format!("non-positive price {price}"))
                .await;
        }

        // The balance is re-fetched right before validation so the risk
        // check never runs against a stale number.
        let available = match self.balance.fresh().await {
            Ok(b) => b,
            Err(e) => return self.failed(symbol, "balance fetch", e.to_string()).await,
        };

        let quantity = match self.size_buy(symbol, gate, price, available).await {
            Ok(q) => q,
            Err(outcome) => return outcome,
        };

        let daily_loss = self.daily_loss.current().await;
        let check = gate.validate_buy(
            symbol,
            position.as_ref(),
            quantity,
            price,
            available,
            daily_loss,
        );
        if !check.decision.permits_buy() {
            tracing::info!(%symbol, decision = ?check.decision, reason = %check.reason, "buy rejected");
            return OrderOutcome::Rejected {
                reason: check.reason,
            };
        }

        let fill = match self.exchange.market_buy(symbol, quantity).await {
            Ok(f) => f,
            Err(e) => return self.failed(symbol, "buy order", e.to_string()).await,
        };
        if !fill.is_filled() {
            return self.unfilled(symbol, "buy order", &fill).await;
        }

        self.record_buy(symbol, &fill, price, quantity, reason).await
    }

    /// Resolves the buy quantity: budget capped by the position size limit,
    /// rounded down to the symbol's lot step.
    async fn size_buy(
        &self,
        symbol: &str,
        gate: &RiskGate,
        price: Decimal,
        available: Decimal,
    ) -> Result<Decimal, OrderOutcome> {
        let lot = match self.exchange.lot_size(symbol).await {
            Ok(l) => l,
            Err(e) => {
                return Err(self.failed(symbol, "lot size fetch", e.to_string()).await);
            }
        };

        let budget = gate
            .profile()
            .max_position_size
            .min(available * BALANCE_HEADROOM);
        let quantity = lot.round_down(budget / price);
        if quantity.is_zero() {
            tracing::info!(%symbol, %budget, %price, "buy skipped, quantity below exchange minimum");
            return Err(OrderOutcome::Rejected {
                reason: format!("budget {budget} buys less than the minimum lot at {price}"),
            });
        }
        Ok(quantity)
    }

    async fn record_buy(
        &self,
        symbol: &str,
        fill: &FillResult,
        quoted_price: Decimal,
        requested_qty: Decimal,
        reason: &str,
    ) -> OrderOutcome {
        let entry_price = fill.average_price().unwrap_or(quoted_price);
        let quantity = if fill.executed_qty.is_zero() {
            requested_qty
        } else {
            fill.executed_qty
        };

        let trade = TradeRecord::new(
            symbol,
            OrderSide::Buy,
            entry_price,
            quantity,
            None,
            &fill.order_id,
        );
        let position = Position {
            symbol: symbol.to_string(),
            entry_price,
            quantity,
            opened_at: trade.executed_at,
        };

        match self.ledger.open_position(position, trade.clone()).await {
            Ok(()) => {
                self.notifier.trade_executed(&trade, reason).await;
            }
            Err(LedgerError::AlreadyOpen(_)) => {
                // The fill is real; the stale record is the problem. Report
                // and leave both for the operator.
                let message = format!(
                    "buy order {} filled but a position was already recorded; manual review required",
                    fill.order_id
                );
                tracing::error!(%symbol, %message);
                self.notifier.anomaly(symbol, &message).await;
            }
            Err(e) => {
                let message =
                    format!("buy order {} filled but could not be recorded: {e}", fill.order_id);
                tracing::error!(%symbol, %message);
                self.notifier.anomaly(symbol, &message).await;
            }
        }

        self.balance.invalidate().await;
        OrderOutcome::Executed {
            side: OrderSide::Buy,
            price: entry_price,
            quantity,
            order_id: fill.order_id.clone(),
            profit: None,
        }
    }

    /// Runs a full SELL lifecycle for the symbol. With `force` the risk
    /// checks are bypassed (the position must still exist).
    pub async fn execute_sell(
        &self,
        symbol: &str,
        gate: &RiskGate,
        force: bool,
        reason: &str,
    ) -> OrderOutcome {
        let _guard = self.ledger.acquire(symbol).await;
        self.sell_locked(symbol, gate, force, false, reason).await
    }

    /// Evaluates the exit triggers against the current price and sells only
    /// if one fires. Returns `None` when there is no position or no trigger.
    pub async fn check_exit_triggers(
        &self,
        symbol: &str,
        gate: &RiskGate,
    ) -> Option<OrderOutcome> {
        let _guard = self.ledger.acquire(symbol).await;

        match self.ledger.position(symbol).await {
            Ok(Some(_)) => {}
            Ok(None) => return None,
            Err(e) => {
                return Some(self.failed(symbol, "position lookup", e.to_string()).await);
            }
        }

        match self.sell_locked(symbol, gate, false, true, "exit trigger").await {
            OrderOutcome::Rejected { .. } => None,
            outcome => Some(outcome),
        }
    }

    async fn sell_locked(
        &self,
        symbol: &str,
        gate: &RiskGate,
        force: bool,
        require_trigger: bool,
        reason: &str,
    ) -> OrderOutcome {
        let position = match self.ledger.position(symbol).await {
            Ok(p) => p,
            Err(e) => return self.failed(symbol, "position lookup", e.to_string()).await,
        };

        let price = match self.exchange.current_price(symbol).await {
            Ok(p) => p,
            Err(e) => return self.failed(symbol, "price fetch", e.to_string()).await,
        };

        let check = gate.validate_sell(symbol, position.as_ref(), price, force);
        let permitted = if require_trigger {
            check.decision.is_exit_trigger()
        } else {
            check.decision.permits_sell()
        };
        if !permitted {
            tracing::debug!(%symbol, decision = ?check.decision, reason = %check.reason, "sell not executed");
            return OrderOutcome::Rejected {
                reason: check.reason,
            };
        }

        // The gate only permits a sell when a position exists.
        let position = match position {
            Some(p) => p,
            None => {
                return OrderOutcome::Rejected {
                    reason: check.reason,
                };
            }
        };

        let fill = match self.exchange.market_sell(symbol, position.quantity).await {
            Ok(f) => f,
            Err(e) => return self.failed(symbol, "sell order", e.to_string()).await,
        };
        if !fill.is_filled() {
            return self.unfilled(symbol, "sell order", &fill).await;
        }

        let exit_price = fill.average_price().unwrap_or(price);
        let sell_reason = format!("{reason}: {}", check.reason);

        // The ledger owns the profit computation; the snapshot from the top
        // of this lifecycle only backs the anomaly paths below.
        let profit = match self
            .ledger
            .close_position(symbol, exit_price, &fill.order_id)
            .await
        {
            Ok(trade) => {
                let profit = trade.profit.unwrap_or(Decimal::ZERO);
                self.notifier.trade_executed(&trade, &sell_reason).await;
                profit
            }
            Err(LedgerError::NotFound(_)) => {
                let message = format!(
                    "sell order {} filled but no position was recorded; manual review required",
                    fill.order_id
                );
                tracing::error!(%symbol, %message);
                self.notifier.anomaly(symbol, &message).await;
                (exit_price - position.entry_price) * position.quantity
            }
            Err(e) => {
                let message = format!(
                    "sell order {} filled but could not be recorded: {e}",
                    fill.order_id
                );
                tracing::error!(%symbol, %message);
                self.notifier.anomaly(symbol, &message).await;
                (exit_price - position.entry_price) * position.quantity
            }
        };

        if profit < Decimal::ZERO {
            self.daily_loss.record_loss(-profit).await;
        }
        self.balance.invalidate().await;

        OrderOutcome::Executed {
            side: OrderSide::Sell,
            price: exit_price,
            quantity: position.quantity,
            order_id: fill.order_id.clone(),
            profit: Some(profit),
        }
    }

    /// The exchange accepted the order but did not confirm a full fill.
    /// A non-FILLED status can still carry partial executions; those left
    /// the account in a state the ledger knows nothing about, so they are
    /// escalated as a reconciliation anomaly.
    async fn unfilled(&self, symbol: &str, stage: &str, fill: &FillResult) -> OrderOutcome {
        if !fill.executed_qty.is_zero() {
            let message = format!(
                "{stage} {} returned {} with {} executed; manual review required",
                fill.order_id, fill.raw_status, fill.executed_qty
            );
            tracing::error!(%symbol, %message);
            self.notifier.anomaly(symbol, &message).await;
        }
        self.failed(
            symbol,
            stage,
            format!("order not filled: {}", fill.raw_status),
        )
        .await
    }

    async fn failed(&self, symbol: &str, stage: &str, message: String) -> OrderOutcome {
        tracing::error!(%symbol, %stage, %message, "order lifecycle failed");
        self.notifier
            .error(&format!("{symbol} {stage}"), &message)
            .await;
        OrderOutcome::Failed {
            reason: format!("{stage}: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerter::{DailySummary, Notifier, NullNotifier};
    use async_trait::async_trait;
    use configuration::RiskProfile;
    use core_types::{Kline, LotSize};
    use exchange::error::ExchangeError;
    use exchange::{Fill, FillStatus};
    use ledger::{MemoryStore, PositionStore};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum OrderBehavior {
        Fill,
        Expire,
        PartialExpire,
        Error,
    }

    struct MockExchange {
        price: Decimal,
        balance: Decimal,
        behavior: OrderBehavior,
        orders: StdMutex<Vec<(String, String, Decimal)>>,
    }

    impl MockExchange {
        fn new(price: Decimal, balance: Decimal, behavior: OrderBehavior) -> Self {
            Self {
                price,
                balance,
                behavior,
                orders: StdMutex::new(Vec::new()),
            }
        }

        fn order_count(&self) -> usize {
            self.orders.lock().unwrap().len()
        }

        fn respond(&self, quantity: Decimal) -> Result<FillResult, ExchangeError> {
            match self.behavior {
                OrderBehavior::Fill => Ok(FillResult {
                    status: FillStatus::Filled,
                    raw_status: "FILLED".to_string(),
                    order_id: "42".to_string(),
                    executed_qty: quantity,
                    fills: vec![Fill {
                        price: self.price,
                        quantity,
                    }],
                }),
                OrderBehavior::Expire => Ok(FillResult {
                    status: FillStatus::Rejected,
                    raw_status: "EXPIRED".to_string(),
                    order_id: "42".to_string(),
                    executed_qty: Decimal::ZERO,
                    fills: Vec::new(),
                }),
                OrderBehavior::PartialExpire => Ok(FillResult {
                    status: FillStatus::Rejected,
                    raw_status: "EXPIRED".to_string(),
                    order_id: "42".to_string(),
                    executed_qty: dec!(1),
                    fills: vec![Fill {
                        price: self.price,
                        quantity: dec!(1),
                    }],
                }),
                OrderBehavior::Error => Err(ExchangeError::InvalidData("boom".to_string())),
            }
        }
    }

    #[async_trait]
    impl ExchangeClient for MockExchange {
        async fn current_price(&self, _symbol: &str) -> Result<Decimal, ExchangeError> {
            Ok(self.price)
        }
        async fn klines(
            &self,
            _symbol: &str,
            _interval: &str,
            _limit: u32,
        ) -> Result<Vec<Kline>, ExchangeError> {
            Ok(Vec::new())
        }
        async fn balance(&self, _asset: &str) -> Result<Decimal, ExchangeError> {
            Ok(self.balance)
        }
        async fn lot_size(&self, _symbol: &str) -> Result<LotSize, ExchangeError> {
            Ok(LotSize {
                step_size: dec!(0.001),
                min_qty: dec!(0.001),
            })
        }
        async fn market_buy(
            &self,
            symbol: &str,
            quantity: Decimal,
        ) -> Result<FillResult, ExchangeError> {
            self.orders
                .lock()
                .unwrap()
                .push((symbol.to_string(), "BUY".to_string(), quantity));
            self.respond(quantity)
        }
        async fn market_sell(
            &self,
            symbol: &str,
            quantity: Decimal,
        ) -> Result<FillResult, ExchangeError> {
            self.orders
                .lock()
                .unwrap()
                .push((symbol.to_string(), "SELL".to_string(), quantity));
            self.respond(quantity)
        }
    }

    /// Captures anomaly and error notifications for assertions.
    #[derive(Default)]
    struct RecordingNotifier {
        anomalies: StdMutex<Vec<String>>,
        errors: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn trade_executed(&self, _trade: &TradeRecord, _reason: &str) {}
        async fn anomaly(&self, _symbol: &str, message: &str) {
            self.anomalies.lock().unwrap().push(message.to_string());
        }
        async fn error(&self, _context: &str, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
        async fn daily_summary(&self, _summary: &DailySummary) {}
        async fn startup(&self, _mode: &str) {}
        async fn shutdown(&self) {}
    }

    /// Delegates to a MemoryStore but pretends every open loses the race.
    struct StolenSlotStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl PositionStore for StolenSlotStore {
        async fn get(&self, symbol: &str) -> Result<Option<Position>, LedgerError> {
            self.inner.get(symbol).await
        }
        async fn all(&self) -> Result<Vec<Position>, LedgerError> {
            self.inner.all().await
        }
        async fn insert_open(
            &self,
            _position: &Position,
            _trade: &TradeRecord,
        ) -> Result<bool, LedgerError> {
            Ok(false)
        }
        async fn delete_close(
            &self,
            symbol: &str,
            trade: &TradeRecord,
        ) -> Result<bool, LedgerError> {
            self.inner.delete_close(symbol, trade).await
        }
        async fn trades_since(
            &self,
            since: chrono::DateTime<chrono::Utc>,
        ) -> Result<Vec<TradeRecord>, LedgerError> {
            self.inner.trades_since(since).await
        }
        async fn recent_trades(&self, limit: i64) -> Result<Vec<TradeRecord>, LedgerError> {
            self.inner.recent_trades(limit).await
        }
    }

    fn profile() -> RiskProfile {
        RiskProfile {
            use_stop_loss: true,
            stop_loss_ratio: dec!(-0.02),
            use_take_profit: true,
            take_profit_ratio: dec!(0.05),
            use_min_profit: true,
            min_profit_ratio: dec!(0.01),
            max_position_size: dec!(500),
            min_trade_amount: dec!(10),
            max_daily_loss: dec!(1000),
            allow_loss_sells: false,
        }
    }

    struct Harness {
        coordinator: OrderCoordinator,
        ledger: Arc<PositionLedger>,
        exchange: Arc<MockExchange>,
        gate: RiskGate,
    }

    fn harness_with(
        exchange: MockExchange,
        store: Arc<dyn PositionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Harness {
        let exchange = Arc::new(exchange);
        let ledger = Arc::new(PositionLedger::new(store));
        let balance = Arc::new(BalanceCache::new(
            exchange.clone(),
            "USDT",
            Duration::from_secs(30),
        ));
        let coordinator = OrderCoordinator::new(
            ledger.clone(),
            exchange.clone(),
            notifier,
            balance,
            Arc::new(DailyLossTracker::new()),
        );
        Harness {
            coordinator,
            ledger,
            exchange,
            gate: RiskGate::new(profile()).unwrap(),
        }
    }

    fn harness_with_store(exchange: MockExchange, store: Arc<dyn PositionStore>) -> Harness {
        harness_with(exchange, store, Arc::new(NullNotifier))
    }

    fn harness(exchange: MockExchange) -> Harness {
        harness_with_store(exchange, Arc::new(MemoryStore::new()))
    }

    async fn seed_position(ledger: &PositionLedger, entry: Decimal, quantity: Decimal) {
        ledger
            .open_position(
                Position {
                    symbol: "BTCUSDT".to_string(),
                    entry_price: entry,
                    quantity,
                    opened_at: chrono::Utc::now(),
                },
                TradeRecord::new("BTCUSDT", OrderSide::Buy, entry, quantity, None, "seed"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn buy_fills_and_records_the_position() {
        let h = harness(MockExchange::new(dec!(100), dec!(1000), OrderBehavior::Fill));
        let outcome = h
            .coordinator
            .execute_buy("BTCUSDT", &h.gate, "rule matched")
            .await;

        match outcome {
            OrderOutcome::Executed {
                side,
                price,
                quantity,
                ..
            } => {
                assert_eq!(side, OrderSide::Buy);
                assert_eq!(price, dec!(100));
                // budget = min(500, 1000*0.999) = 500 -> 5 units
                assert_eq!(quantity, dec!(5.000));
            }
            other => panic!("expected Executed, got {other:?}"),
        }

        let position = h.ledger.position("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(position.entry_price, dec!(100));
        assert_eq!(h.ledger.recent_trades(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unfilled_order_is_failed_and_leaves_the_ledger_untouched() {
        let h = harness(MockExchange::new(dec!(100), dec!(1000), OrderBehavior::Expire));
        let outcome = h.coordinator.execute_buy("BTCUSDT", &h.gate, "test").await;

        // The exchange was called, so this is a failure of the attempt,
        // not a pre-order rejection.
        assert!(matches!(outcome, OrderOutcome::Failed { .. }));
        assert_eq!(h.exchange.order_count(), 1);
        assert!(h.ledger.position("BTCUSDT").await.unwrap().is_none());
        assert!(h.ledger.recent_trades(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn partial_execution_on_unfilled_order_raises_an_anomaly() {
        let notifier = Arc::new(RecordingNotifier::default());
        let h = harness_with(
            MockExchange::new(dec!(100), dec!(1000), OrderBehavior::PartialExpire),
            Arc::new(MemoryStore::new()),
            notifier.clone(),
        );

        let outcome = h.coordinator.execute_buy("BTCUSDT", &h.gate, "test").await;
        assert!(matches!(outcome, OrderOutcome::Failed { .. }));
        assert!(h.ledger.position("BTCUSDT").await.unwrap().is_none());

        let anomalies = notifier.anomalies.lock().unwrap();
        assert_eq!(anomalies.len(), 1);
        assert!(anomalies[0].contains("EXPIRED"));
    }

    #[tokio::test]
    async fn unfilled_exit_sell_surfaces_as_failed() {
        let notifier = Arc::new(RecordingNotifier::default());
        let h = harness_with(
            MockExchange::new(dec!(95), dec!(1000), OrderBehavior::Expire),
            Arc::new(MemoryStore::new()),
            notifier.clone(),
        );
        seed_position(&h.ledger, dec!(100), dec!(2)).await;

        let outcome = h.coordinator.check_exit_triggers("BTCUSDT", &h.gate).await;
        // A stop-loss the venue failed to fill must not be swallowed.
        assert!(matches!(outcome, Some(OrderOutcome::Failed { .. })));
        assert!(h.ledger.position("BTCUSDT").await.unwrap().is_some());
        assert_eq!(notifier.errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transport_error_leaves_the_ledger_untouched() {
        let h = harness(MockExchange::new(dec!(100), dec!(1000), OrderBehavior::Error));
        let outcome = h.coordinator.execute_buy("BTCUSDT", &h.gate, "test").await;

        assert!(matches!(outcome, OrderOutcome::Failed { .. }));
        assert!(h.ledger.position("BTCUSDT").await.unwrap().is_none());
        assert!(h.ledger.recent_trades(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_buy_is_rejected_without_an_order() {
        let h = harness(MockExchange::new(dec!(100), dec!(1000), OrderBehavior::Fill));
        seed_position(&h.ledger, dec!(100), dec!(1)).await;

        let outcome = h.coordinator.execute_buy("BTCUSDT", &h.gate, "test").await;
        assert!(matches!(outcome, OrderOutcome::Rejected { .. }));
        assert_eq!(h.exchange.order_count(), 0);
    }

    #[tokio::test]
    async fn lost_insert_race_reports_anomaly_but_never_reverses() {
        let h = harness_with_store(
            MockExchange::new(dec!(100), dec!(1000), OrderBehavior::Fill),
            Arc::new(StolenSlotStore {
                inner: MemoryStore::new(),
            }),
        );

        let outcome = h.coordinator.execute_buy("BTCUSDT", &h.gate, "test").await;
        // The fill is confirmed, so the outcome stays Executed even though
        // the record was refused; no counter-order is placed.
        assert!(matches!(outcome, OrderOutcome::Executed { .. }));
        assert_eq!(h.exchange.order_count(), 1);
    }

    #[tokio::test]
    async fn stop_loss_sell_realizes_the_loss() {
        let h = harness(MockExchange::new(dec!(95), dec!(1000), OrderBehavior::Fill));
        seed_position(&h.ledger, dec!(100), dec!(2)).await;

        let outcome = h.coordinator.check_exit_triggers("BTCUSDT", &h.gate).await;
        match outcome {
            Some(OrderOutcome::Executed { profit, .. }) => {
                assert_eq!(profit, Some(dec!(-10)));
            }
            other => panic!("expected Executed, got {other:?}"),
        }

        assert!(h.ledger.position("BTCUSDT").await.unwrap().is_none());
        assert_eq!(h.coordinator.daily_loss().current().await, dec!(10));
    }

    #[tokio::test]
    async fn no_trigger_means_no_exit_order() {
        // Price up 0.5%: below min-profit, above stop-loss.
        let h = harness(MockExchange::new(dec!(100.5), dec!(1000), OrderBehavior::Fill));
        seed_position(&h.ledger, dec!(100), dec!(2)).await;

        let outcome = h.coordinator.check_exit_triggers("BTCUSDT", &h.gate).await;
        assert!(outcome.is_none());
        assert_eq!(h.exchange.order_count(), 0);
        assert!(h.ledger.position("BTCUSDT").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn held_loss_sell_keeps_the_position() {
        // Down 1%: no stop-loss, allow_loss_sells=false -> hold.
        let h = harness(MockExchange::new(dec!(99), dec!(1000), OrderBehavior::Fill));
        seed_position(&h.ledger, dec!(100), dec!(2)).await;

        let outcome = h
            .coordinator
            .execute_sell("BTCUSDT", &h.gate, false, "strategy sell")
            .await;
        assert!(matches!(outcome, OrderOutcome::Rejected { .. }));
        assert_eq!(h.exchange.order_count(), 0);
        assert!(h.ledger.position("BTCUSDT").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn force_sell_executes_despite_the_loss() {
        let h = harness(MockExchange::new(dec!(99), dec!(1000), OrderBehavior::Fill));
        seed_position(&h.ledger, dec!(100), dec!(2)).await;

        let outcome = h
            .coordinator
            .execute_sell("BTCUSDT", &h.gate, true, "manual close")
            .await;
        match outcome {
            OrderOutcome::Executed { profit, .. } => assert_eq!(profit, Some(dec!(-2))),
            other => panic!("expected Executed, got {other:?}"),
        }
        assert!(h.ledger.position("BTCUSDT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn profitable_close_does_not_count_toward_daily_loss() {
        let h = harness(MockExchange::new(dec!(110), dec!(1000), OrderBehavior::Fill));
        seed_position(&h.ledger, dec!(100), dec!(2)).await;

        let outcome = h.coordinator.check_exit_triggers("BTCUSDT", &h.gate).await;
        assert!(matches!(outcome, Some(OrderOutcome::Executed { .. })));
        assert_eq!(h.coordinator.daily_loss().current().await, Decimal::ZERO);
    }
}
