use crate::error::LedgerError;
use crate::store::PositionStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Position, TradeRecord};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory [`PositionStore`] used for paper trading and tests. Nothing
/// survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    positions: RwLock<HashMap<String, Position>>,
    trades: RwLock<Vec<TradeRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn get(&self, symbol: &str) -> Result<Option<Position>, LedgerError> {
        Ok(self.positions.read().await.get(symbol).cloned())
    }

    async fn all(&self) -> Result<Vec<Position>, LedgerError> {
        let mut positions: Vec<Position> = self.positions.read().await.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    async fn insert_open(
        &self,
        position: &Position,
        trade: &TradeRecord,
    ) -> Result<bool, LedgerError> {
        let mut positions = self.positions.write().await;
        if positions.contains_key(&position.symbol) {
            return Ok(false);
        }
        positions.insert(position.symbol.clone(), position.clone());
        self.trades.write().await.push(trade.clone());
        Ok(true)
    }

    async fn delete_close(
        &self,
        symbol: &str,
        trade: &TradeRecord,
    ) -> Result<bool, LedgerError> {
        let mut positions = self.positions.write().await;
        if positions.remove(symbol).is_none() {
            return Ok(false);
        }
        self.trades.write().await.push(trade.clone());
        Ok(true)
    }

    async fn trades_since(&self, since: DateTime<Utc>) -> Result<Vec<TradeRecord>, LedgerError> {
        let trades = self.trades.read().await;
        Ok(trades
            .iter()
            .filter(|t| t.executed_at >= since)
            .cloned()
            .collect())
    }

    async fn recent_trades(&self, limit: i64) -> Result<Vec<TradeRecord>, LedgerError> {
        let trades = self.trades.read().await;
        Ok(trades.iter().rev().take(limit as usize).cloned().collect())
    }
}
