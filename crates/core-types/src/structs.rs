use crate::enums::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An open, unrealized holding in one symbol. At most one exists per symbol
/// at any time; the ledger enforces that invariant.
///
/// `entry_price` and `quantity` are immutable once set. Closing removes the
/// record entirely, there is no partial-close support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Fractional price change relative to the entry price.
    pub fn price_change_ratio(&self, current_price: Decimal) -> Decimal {
        (current_price - self.entry_price) / self.entry_price
    }

    /// `(current - entry) * quantity`, the P&L a close at `current_price`
    /// would realize.
    pub fn unrealized_pnl(&self, current_price: Decimal) -> Decimal {
        (current_price - self.entry_price) * self.quantity
    }
}

/// Append-only audit entry for every completed order. Immutable once written.
///
/// `profit` is populated for SELL records only, carrying the realized P&L of
/// the position the sell closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub profit: Option<Decimal>,
    pub order_id: String,
    pub executed_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn new(
        symbol: &str,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
        profit: Option<Decimal>,
        order_id: &str,
    ) -> Self {
        Self {
            trade_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            price,
            quantity,
            profit,
            order_id: order_id.to_string(),
            executed_at: Utc::now(),
        }
    }
}

/// A single OHLCV candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: DateTime<Utc>,
    pub interval: String,
}

/// The exchange's quantity constraints for a symbol. Orders must be a
/// multiple of `step_size` and no smaller than `min_qty`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LotSize {
    pub step_size: Decimal,
    pub min_qty: Decimal,
}

impl LotSize {
    /// Rounds `quantity` down to the nearest step. Returns `Decimal::ZERO`
    /// when the rounded value falls below `min_qty`, which callers must
    /// treat as an invalid quantity.
    pub fn round_down(&self, quantity: Decimal) -> Decimal {
        if self.step_size.is_zero() {
            return quantity;
        }
        let rounded = (quantity / self.step_size).floor() * self.step_size;
        if rounded < self.min_qty {
            Decimal::ZERO
        } else {
            rounded
        }
    }
}
