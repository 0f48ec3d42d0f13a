use crate::error::ExchangeError;
use crate::responses::{Fill, FillResult, FillStatus};
use crate::ExchangeClient;
use async_trait::async_trait;
use core_types::{Kline, LotSize};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

// Binance's standard taker fee.
const FEE_RATE: Decimal = dec!(0.001);

/// A paper-trading [`ExchangeClient`]: real market data, simulated fills
/// against a virtual balance sheet. Orders fill instantly at the live
/// ticker price minus the standard taker fee; an order the virtual balance
/// cannot cover is rejected, mirroring what the venue would do.
pub struct PaperExchange {
    inner: Arc<dyn ExchangeClient>,
    quote_asset: String,
    balances: Mutex<HashMap<String, Decimal>>,
    next_order_id: AtomicU64,
}

impl PaperExchange {
    pub fn new(
        inner: Arc<dyn ExchangeClient>,
        quote_asset: impl Into<String>,
        starting_balance: Decimal,
    ) -> Self {
        let quote_asset = quote_asset.into();
        let mut balances = HashMap::new();
        balances.insert(quote_asset.clone(), starting_balance);
        Self {
            inner,
            quote_asset,
            balances: Mutex::new(balances),
            next_order_id: AtomicU64::new(1),
        }
    }

    fn base_asset<'a>(&self, symbol: &'a str) -> Result<&'a str, ExchangeError> {
        symbol
            .strip_suffix(self.quote_asset.as_str())
            .filter(|base| !base.is_empty())
            .ok_or_else(|| {
                ExchangeError::InvalidData(format!(
                    "symbol '{symbol}' does not trade against {}",
                    self.quote_asset
                ))
            })
    }

    fn next_order_id(&self) -> String {
        format!("PAPER-{}", self.next_order_id.fetch_add(1, Ordering::SeqCst))
    }

    fn filled(&self, price: Decimal, quantity: Decimal) -> FillResult {
        FillResult {
            status: FillStatus::Filled,
            raw_status: "FILLED".to_string(),
            order_id: self.next_order_id(),
            executed_qty: quantity,
            fills: vec![Fill { price, quantity }],
        }
    }

    fn rejected(&self, reason: &str) -> FillResult {
        FillResult {
            status: FillStatus::Rejected,
            raw_status: reason.to_string(),
            order_id: self.next_order_id(),
            executed_qty: Decimal::ZERO,
            fills: Vec::new(),
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn current_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        self.inner.current_price(symbol).await
    }

    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, ExchangeError> {
        self.inner.klines(symbol, interval, limit).await
    }

    async fn balance(&self, asset: &str) -> Result<Decimal, ExchangeError> {
        Ok(self
            .balances
            .lock()
            .await
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn lot_size(&self, symbol: &str) -> Result<LotSize, ExchangeError> {
        self.inner.lot_size(symbol).await
    }

    async fn market_buy(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<FillResult, ExchangeError> {
        let base = self.base_asset(symbol)?.to_string();
        let price = self.inner.current_price(symbol).await?;
        let cost = quantity * price;
        let total = cost * (Decimal::ONE + FEE_RATE);

        let mut balances = self.balances.lock().await;
        let quote = balances
            .get(&self.quote_asset)
            .copied()
            .unwrap_or(Decimal::ZERO);
        if quote < total {
            tracing::warn!(%symbol, %total, available = %quote, "paper buy rejected, insufficient balance");
            return Ok(self.rejected("REJECTED"));
        }

        balances.insert(self.quote_asset.clone(), quote - total);
        *balances.entry(base).or_insert(Decimal::ZERO) += quantity;
        tracing::info!(%symbol, %quantity, %price, "paper buy filled");
        Ok(self.filled(price, quantity))
    }

    async fn market_sell(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<FillResult, ExchangeError> {
        let base = self.base_asset(symbol)?.to_string();
        let price = self.inner.current_price(symbol).await?;

        let mut balances = self.balances.lock().await;
        let held = balances.get(&base).copied().unwrap_or(Decimal::ZERO);
        if held < quantity {
            tracing::warn!(%symbol, %quantity, available = %held, "paper sell rejected, insufficient holdings");
            return Ok(self.rejected("REJECTED"));
        }

        let proceeds = quantity * price * (Decimal::ONE - FEE_RATE);
        balances.insert(base, held - quantity);
        *balances
            .entry(self.quote_asset.clone())
            .or_insert(Decimal::ZERO) += proceeds;
        tracing::info!(%symbol, %quantity, %price, "paper sell filled");
        Ok(self.filled(price, quantity))
    }
}
