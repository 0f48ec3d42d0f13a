//! The position ledger: the single source of truth for open positions and
//! the append-only trade history.
//!
//! Two rules hold everywhere:
//!
//! 1. At most one position exists per symbol. The storage layer enforces it
//!    on write, and the [`PositionLedger`] hands out a per-symbol async lock
//!    so a caller can hold the gap between "check the position" and "record
//!    the order" closed across its own await points.
//! 2. The ledger only changes after an order is confirmed filled. Callers
//!    place the order first and record it here second; a rejected or failed
//!    order never touches storage.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::LedgerError;
pub use memory::MemoryStore;
pub use postgres::{connect, run_migrations, PgStore};
pub use store::PositionStore;

use chrono::{DateTime, Utc};
use core_types::{OrderSide, Position, TradeRecord};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Serialized access to positions, backed by a pluggable [`PositionStore`].
pub struct PositionLedger {
    store: Arc<dyn PositionStore>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PositionLedger {
    pub fn new(store: Arc<dyn PositionStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires the per-symbol lock. The caller holds the returned guard
    /// across its entire check-then-act sequence, including order placement,
    /// so that no second order lifecycle for the same symbol can interleave.
    pub async fn acquire(&self, symbol: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                locks
                    .entry(symbol.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    pub async fn position(&self, symbol: &str) -> Result<Option<Position>, LedgerError> {
        self.store.get(symbol).await
    }

    pub async fn positions(&self) -> Result<Vec<Position>, LedgerError> {
        self.store.all().await
    }

    /// Records a confirmed BUY fill: stores the position and its opening
    /// trade atomically. Returns [`LedgerError::AlreadyOpen`] if a position
    /// for the symbol exists; nothing is written in that case.
    pub async fn open_position(
        &self,
        position: Position,
        trade: TradeRecord,
    ) -> Result<(), LedgerError> {
        let symbol = position.symbol.clone();
        if self.store.insert_open(&position, &trade).await? {
            tracing::info!(%symbol, entry = %position.entry_price, quantity = %position.quantity, "position opened");
            Ok(())
        } else {
            Err(LedgerError::AlreadyOpen(symbol))
        }
    }

    /// Records a confirmed SELL fill: computes the realized profit
    /// `(exit_price - entry_price) * quantity` from the stored entry,
    /// removes the position, and appends the closing trade atomically.
    /// Returns [`LedgerError::NotFound`] if no position exists for the
    /// symbol. The caller is expected to hold the symbol lock from
    /// [`acquire`](Self::acquire) across the whole lifecycle.
    pub async fn close_position(
        &self,
        symbol: &str,
        exit_price: Decimal,
        order_id: &str,
    ) -> Result<TradeRecord, LedgerError> {
        let position = self
            .store
            .get(symbol)
            .await?
            .ok_or_else(|| LedgerError::NotFound(symbol.to_string()))?;
        let profit = (exit_price - position.entry_price) * position.quantity;
        let trade = TradeRecord::new(
            symbol,
            OrderSide::Sell,
            exit_price,
            position.quantity,
            Some(profit),
            order_id,
        );
        if self.store.delete_close(symbol, &trade).await? {
            tracing::info!(%symbol, %profit, "position closed");
            Ok(trade)
        } else {
            Err(LedgerError::NotFound(symbol.to_string()))
        }
    }

    pub async fn trades_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TradeRecord>, LedgerError> {
        self.store.trades_since(since).await
    }

    pub async fn recent_trades(&self, limit: i64) -> Result<Vec<TradeRecord>, LedgerError> {
        self.store.recent_trades(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::OrderSide;
    use rust_decimal_macros::dec;

    fn ledger() -> PositionLedger {
        PositionLedger::new(Arc::new(MemoryStore::new()))
    }

    fn position(symbol: &str, quantity: Decimal) -> Position {
        Position {
            symbol: symbol.to_string(),
            entry_price: dec!(100),
            quantity,
            opened_at: Utc::now(),
        }
    }

    fn buy_trade(symbol: &str) -> TradeRecord {
        TradeRecord::new(symbol, OrderSide::Buy, dec!(100), dec!(1), None, "1")
    }

    #[tokio::test]
    async fn second_open_for_same_symbol_is_rejected() {
        let ledger = ledger();
        ledger
            .open_position(position("BTCUSDT", dec!(1)), buy_trade("BTCUSDT"))
            .await
            .unwrap();

        let err = ledger
            .open_position(position("BTCUSDT", dec!(1)), buy_trade("BTCUSDT"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyOpen(_)));

        // The rejected open must not have left a second trade behind.
        let trades = ledger.recent_trades(10).await.unwrap();
        assert_eq!(trades.len(), 1);
    }

    #[tokio::test]
    async fn positions_on_different_symbols_are_independent() {
        let ledger = ledger();
        ledger
            .open_position(position("BTCUSDT", dec!(1)), buy_trade("BTCUSDT"))
            .await
            .unwrap();
        ledger
            .open_position(position("ETHUSDT", dec!(1)), buy_trade("ETHUSDT"))
            .await
            .unwrap();
        assert_eq!(ledger.positions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn close_computes_the_profit_and_records_the_trade() {
        let ledger = ledger();
        ledger
            .open_position(position("BTCUSDT", dec!(2)), buy_trade("BTCUSDT"))
            .await
            .unwrap();
        let trade = ledger
            .close_position("BTCUSDT", dec!(110), "2")
            .await
            .unwrap();

        // (110 - 100) * 2, exact decimal arithmetic.
        assert_eq!(trade.profit, Some(dec!(20)));
        assert_eq!(trade.side, OrderSide::Sell);
        assert_eq!(trade.quantity, dec!(2));

        assert!(ledger.position("BTCUSDT").await.unwrap().is_none());
        let trades = ledger.recent_trades(10).await.unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].profit, Some(dec!(20)));
    }

    #[tokio::test]
    async fn close_without_position_is_not_found() {
        let ledger = ledger();
        let err = ledger
            .close_position("BTCUSDT", dec!(100), "2")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
        assert!(ledger.recent_trades(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_opens_produce_exactly_one_position() {
        // Two tasks race through the full check-then-act sequence under the
        // symbol lock. Exactly one may observe "no position" and open.
        let ledger = Arc::new(ledger());
        let mut handles = Vec::new();
        for _ in 0..2 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                let _guard = ledger.acquire("BTCUSDT").await;
                if ledger.position("BTCUSDT").await.unwrap().is_some() {
                    return false;
                }
                tokio::task::yield_now().await;
                ledger
                    .open_position(position("BTCUSDT", dec!(1)), buy_trade("BTCUSDT"))
                    .await
                    .unwrap();
                true
            }));
        }

        let mut opened = 0;
        for handle in handles {
            if handle.await.unwrap() {
                opened += 1;
            }
        }
        assert_eq!(opened, 1);
        assert_eq!(ledger.positions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn trades_since_filters_by_timestamp() {
        let ledger = ledger();
        let mut old = buy_trade("BTCUSDT");
        old.executed_at = Utc::now() - chrono::Duration::days(2);
        ledger
            .open_position(position("BTCUSDT", dec!(1)), old)
            .await
            .unwrap();
        ledger
            .close_position("BTCUSDT", dec!(105), "2")
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let recent = ledger.trades_since(cutoff).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].side, OrderSide::Sell);
    }
}
