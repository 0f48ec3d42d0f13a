use crate::error::LedgerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Position, TradeRecord};

/// Storage backend for positions and the trade history.
///
/// Implementations must make `insert_open` and `delete_close` atomic: the
/// position change and its trade record land together or not at all. They do
/// NOT need to serialize concurrent callers per symbol; the
/// [`PositionLedger`](crate::PositionLedger) holds a per-symbol lock around
/// every mutation, and the `bool` returns let it detect a lost race anyway.
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn get(&self, symbol: &str) -> Result<Option<Position>, LedgerError>;

    async fn all(&self) -> Result<Vec<Position>, LedgerError>;

    /// Inserts the position and its opening trade. Returns `false` when a
    /// position for the symbol already existed, in which case nothing is
    /// written.
    async fn insert_open(
        &self,
        position: &Position,
        trade: &TradeRecord,
    ) -> Result<bool, LedgerError>;

    /// Removes the position and records the closing trade. Returns `false`
    /// when no position existed, in which case nothing is written.
    async fn delete_close(&self, symbol: &str, trade: &TradeRecord)
        -> Result<bool, LedgerError>;

    /// Trade records executed at or after `since`, oldest first.
    async fn trades_since(&self, since: DateTime<Utc>) -> Result<Vec<TradeRecord>, LedgerError>;

    /// The most recent trade records, newest first.
    async fn recent_trades(&self, limit: i64) -> Result<Vec<TradeRecord>, LedgerError>;
}
