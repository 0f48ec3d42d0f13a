use crate::error::LedgerError;
use crate::store::PositionStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{OrderSide, Position, TradeRecord};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;

/// Creates a PostgreSQL connection pool.
pub async fn connect(database_url: &str) -> Result<PgPool, LedgerError> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    tracing::info!("database connection pool established");
    Ok(pool)
}

/// Applies any pending migrations from the `migrations/` directory.
pub async fn run_migrations(pool: &PgPool) -> Result<(), LedgerError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("database migrations are up to date");
    Ok(())
}

/// PostgreSQL-backed [`PositionStore`] for live trading.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn position_from_row(row: &PgRow) -> Result<Position, LedgerError> {
    Ok(Position {
        symbol: row.try_get("symbol")?,
        entry_price: row.try_get("entry_price")?,
        quantity: row.try_get("quantity")?,
        opened_at: row.try_get("opened_at")?,
    })
}

fn trade_from_row(row: &PgRow) -> Result<TradeRecord, LedgerError> {
    let side_raw: String = row.try_get("side")?;
    let side = OrderSide::from_wire(&side_raw)
        .ok_or_else(|| LedgerError::Decode(format!("unknown order side '{side_raw}'")))?;
    Ok(TradeRecord {
        trade_id: row.try_get("trade_id")?,
        symbol: row.try_get("symbol")?,
        side,
        price: row.try_get("price")?,
        quantity: row.try_get("quantity")?,
        profit: row.try_get("profit")?,
        order_id: row.try_get("order_id")?,
        executed_at: row.try_get("executed_at")?,
    })
}

async fn insert_trade(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    trade: &TradeRecord,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        INSERT INTO trades (trade_id, symbol, side, price, quantity, profit, order_id, executed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(trade.trade_id)
    .bind(&trade.symbol)
    .bind(trade.side.as_wire())
    .bind(trade.price)
    .bind(trade.quantity)
    .bind(trade.profit)
    .bind(&trade.order_id)
    .bind(trade.executed_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl PositionStore for PgStore {
    async fn get(&self, symbol: &str) -> Result<Option<Position>, LedgerError> {
        let row = sqlx::query(
            "SELECT symbol, entry_price, quantity, opened_at FROM positions WHERE symbol = $1",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(position_from_row).transpose()
    }

    async fn all(&self) -> Result<Vec<Position>, LedgerError> {
        let rows = sqlx::query(
            "SELECT symbol, entry_price, quantity, opened_at FROM positions ORDER BY symbol",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(position_from_row).collect()
    }

    async fn insert_open(
        &self,
        position: &Position,
        trade: &TradeRecord,
    ) -> Result<bool, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO positions (symbol, entry_price, quantity, opened_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (symbol) DO NOTHING
            "#,
        )
        .bind(&position.symbol)
        .bind(position.entry_price)
        .bind(position.quantity)
        .bind(position.opened_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_trade(&mut tx, trade).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn delete_close(
        &self,
        symbol: &str,
        trade: &TradeRecord,
    ) -> Result<bool, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM positions WHERE symbol = $1")
            .bind(symbol)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_trade(&mut tx, trade).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn trades_since(&self, since: DateTime<Utc>) -> Result<Vec<TradeRecord>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT trade_id, symbol, side, price, quantity, profit, order_id, executed_at
            FROM trades
            WHERE executed_at >= $1
            ORDER BY executed_at ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(trade_from_row).collect()
    }

    async fn recent_trades(&self, limit: i64) -> Result<Vec<TradeRecord>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT trade_id, symbol, side, price, quantity, profit, order_id, executed_at
            FROM trades
            ORDER BY executed_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(trade_from_row).collect()
    }
}
