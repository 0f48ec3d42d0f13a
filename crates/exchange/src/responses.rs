use rust_decimal::Decimal;
use serde::Deserialize;

// Using `#[serde(rename_all = "camelCase")]` to automatically map from JSON
// camelCase to Rust snake_case.

/// The response from a successful `POST /api/v3/order` request with
/// `newOrderRespType=FULL`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub symbol: String,
    pub order_id: i64,
    pub client_order_id: String,
    pub transact_time: i64,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    // Binance spells this with the double "m".
    #[serde(rename = "cummulativeQuoteQty")]
    pub cumulative_quote_qty: Decimal,
    pub status: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    #[serde(default)]
    pub fills: Vec<FillEntry>,
}

/// One partial execution inside a FULL order response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillEntry {
    pub price: Decimal,
    pub qty: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
}

/// The account snapshot from `GET /api/v3/account`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    pub balances: Vec<BalanceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceEntry {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

/// One symbol's metadata from `GET /api/v3/exchangeInfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfoResponse {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub filters: Vec<SymbolFilter>,
}

/// Filters carry heterogeneous fields keyed by `filterType`; only the
/// LOT_SIZE fields matter here, the rest deserialize as `None`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolFilter {
    pub filter_type: String,
    #[serde(default)]
    pub step_size: Option<Decimal>,
    #[serde(default)]
    pub min_qty: Option<Decimal>,
}

/// The response from `GET /api/v3/ticker/price`.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: Decimal,
}

/// Represents an error response from the Binance API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub code: i64,
    pub msg: String,
}

/// Whether the exchange confirmed the order as fully executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    Filled,
    Rejected,
}

/// The distilled outcome of an order placement, in the shape the
/// coordinator works with.
#[derive(Debug, Clone)]
pub struct FillResult {
    pub status: FillStatus,
    /// The exchange's status string, kept for logging.
    pub raw_status: String,
    pub order_id: String,
    pub executed_qty: Decimal,
    pub fills: Vec<Fill>,
}

#[derive(Debug, Clone)]
pub struct Fill {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl FillResult {
    pub fn from_response(response: OrderResponse) -> Self {
        let status = if response.status == "FILLED" {
            FillStatus::Filled
        } else {
            FillStatus::Rejected
        };
        Self {
            status,
            raw_status: response.status,
            order_id: response.order_id.to_string(),
            executed_qty: response.executed_qty,
            fills: response
                .fills
                .into_iter()
                .map(|f| Fill {
                    price: f.price,
                    quantity: f.qty,
                })
                .collect(),
        }
    }

    pub fn is_filled(&self) -> bool {
        self.status == FillStatus::Filled
    }

    /// The volume-weighted average price across all fills. `None` when the
    /// response carried no usable fills; the caller falls back to the price
    /// it quoted the order at.
    pub fn average_price(&self) -> Option<Decimal> {
        let total_qty: Decimal = self.fills.iter().map(|f| f.quantity).sum();
        if total_qty.is_zero() {
            return None;
        }
        let total_quote: Decimal = self.fills.iter().map(|f| f.price * f.quantity).sum();
        Some(total_quote / total_qty)
    }
}
