//! The exchange adapter: typed access to Binance spot market data and order
//! placement, plus a paper-trading simulator that shares the same interface.
//!
//! All order placement goes through the [`ExchangeClient`] trait so the
//! engine never knows whether it is talking to the live venue, the paper
//! simulator, or a test double. Read endpoints retry transient failures a
//! bounded number of times; order placement is never retried, since a
//! timed-out order may still have executed.

use crate::auth::sign_request;
use crate::error::ExchangeError;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use configuration::ExchangeConfig;
use core_types::{Kline, LotSize};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::RwLock;

mod auth;
pub mod balance;
pub mod error;
pub mod paper;
pub mod responses;
pub mod stream;

pub use balance::BalanceCache;
pub use paper::PaperExchange;
pub use responses::{Fill, FillResult, FillStatus};
pub use stream::MarketStream;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const READ_RETRIES: u32 = 3;
const READ_RETRY_DELAY: Duration = Duration::from_millis(500);

/// The generic, abstract interface for a spot exchange.
///
/// This trait is the contract the engine uses, allowing the underlying
/// implementation (live, paper, or mock) to be swapped out.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// The latest traded price for a symbol.
    async fn current_price(&self, symbol: &str) -> Result<Decimal, ExchangeError>;

    /// The most recent closed klines, oldest first.
    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, ExchangeError>;

    /// The free balance of one asset. (Authenticated)
    async fn balance(&self, asset: &str) -> Result<Decimal, ExchangeError>;

    /// The quantity constraints for a symbol.
    async fn lot_size(&self, symbol: &str) -> Result<LotSize, ExchangeError>;

    /// Places a market BUY and reports the confirmed fill. (Authenticated)
    async fn market_buy(&self, symbol: &str, quantity: Decimal)
        -> Result<FillResult, ExchangeError>;

    /// Places a market SELL and reports the confirmed fill. (Authenticated)
    async fn market_sell(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<FillResult, ExchangeError>;
}

/// A concrete [`ExchangeClient`] for the Binance spot API.
pub struct BinanceSpotClient {
    client: reqwest::Client,
    base_url: String,
    api_secret: String,
    // exchangeInfo rarely changes; cache the lot sizes per symbol.
    lot_sizes: RwLock<HashMap<String, LotSize>>,
}

impl BinanceSpotClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self, ExchangeError> {
        let base_url = if config.testnet {
            "https://testnet.binance.vision".to_string()
        } else {
            "https://api.binance.com".to_string()
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-MBX-APIKEY",
            HeaderValue::from_str(&config.api_key)
                .map_err(|e| ExchangeError::ClientBuild(format!("invalid API key: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExchangeError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_secret: config.api_secret.clone(),
            lot_sizes: RwLock::new(HashMap::new()),
        })
    }

    fn signed_url(
        &self,
        path: &str,
        params: &mut BTreeMap<&str, String>,
    ) -> Result<String, ExchangeError> {
        params.insert("timestamp", Utc::now().timestamp_millis().to_string());
        let query_string = serde_qs::to_string(params)
            .map_err(|e| ExchangeError::InvalidData(format!("query encoding failed: {e}")))?;
        let signature = sign_request(&self.api_secret, &query_string);
        Ok(format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query_string, signature
        ))
    }

    async fn decode_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ExchangeError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str::<T>(&text)
                .map_err(|e| ExchangeError::Deserialization(e.to_string()))
        } else {
            let api_error: responses::ApiErrorResponse =
                serde_json::from_str(&text).map_err(|e| {
                    ExchangeError::Deserialization(format!(
                        "failed to deserialize error response: {e}. Original text: {text}"
                    ))
                })?;
            Err(ExchangeError::Api {
                code: api_error.code,
                message: api_error.msg,
            })
        }
    }

    async fn get_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &mut BTreeMap<&str, String>,
    ) -> Result<T, ExchangeError> {
        let url = self.signed_url(path, params)?;
        let response = self.client.get(&url).send().await?;
        Self::decode_response(response).await
    }

    async fn post_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &mut BTreeMap<&str, String>,
    ) -> Result<T, ExchangeError> {
        let url = self.signed_url(path, params)?;
        let response = self.client.post(&url).send().await?;
        Self::decode_response(response).await
    }

    /// Runs a read request, retrying transient failures a bounded number of
    /// times. Never used for order placement.
    async fn retry_read<T, F, Fut>(&self, what: &str, mut request: F) -> Result<T, ExchangeError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ExchangeError>>,
    {
        let mut delay = READ_RETRY_DELAY;
        let mut attempt = 1;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < READ_RETRIES => {
                    tracing::warn!(%what, %attempt, error = %e, "transient API failure, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: &str,
        quantity: Decimal,
    ) -> Result<FillResult, ExchangeError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", symbol.to_string());
        params.insert("side", side.to_string());
        params.insert("type", "MARKET".to_string());
        params.insert("quantity", quantity.to_string());
        // FULL responses carry the individual fills needed for the
        // volume-weighted entry price.
        params.insert("newOrderRespType", "FULL".to_string());

        let response: responses::OrderResponse =
            self.post_signed("/api/v3/order", &mut params).await?;
        let result = FillResult::from_response(response);
        tracing::info!(%symbol, %side, %quantity, status = %result.raw_status, order_id = %result.order_id, "market order placed");
        Ok(result)
    }
}

// Intermediate struct for deserializing klines from the Binance API.
#[derive(Deserialize)]
struct RawKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    i64,
    String,
    String,
    String,
);

fn kline_from_raw(raw: RawKline, interval: &str) -> Result<Kline, ExchangeError> {
    let parse = |field: &str, value: &str| {
        Decimal::from_str(value)
            .map_err(|e| ExchangeError::Deserialization(format!("bad {field}: {e}")))
    };
    Ok(Kline {
        open_time: Utc
            .timestamp_millis_opt(raw.0)
            .single()
            .ok_or_else(|| ExchangeError::InvalidData(format!("invalid open_time: {}", raw.0)))?,
        open: parse("open", &raw.1)?,
        high: parse("high", &raw.2)?,
        low: parse("low", &raw.3)?,
        close: parse("close", &raw.4)?,
        volume: parse("volume", &raw.5)?,
        close_time: Utc
            .timestamp_millis_opt(raw.6)
            .single()
            .ok_or_else(|| ExchangeError::InvalidData(format!("invalid close_time: {}", raw.6)))?,
        interval: interval.to_string(),
    })
}

#[async_trait]
impl ExchangeClient for BinanceSpotClient {
    async fn current_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let url = url.as_str();
        let ticker: responses::TickerPrice = self
            .retry_read("ticker price", move || async move {
                let response = self
                    .client
                    .get(url)
                    .query(&[("symbol", symbol)])
                    .send()
                    .await?;
                Self::decode_response(response).await
            })
            .await?;
        Ok(ticker.price)
    }

    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, ExchangeError> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let url = url.as_str();
        let limit = limit.to_string();
        let limit = limit.as_str();
        let raw: Vec<RawKline> = self
            .retry_read("klines", move || async move {
                let response = self
                    .client
                    .get(url)
                    .query(&[
                        ("symbol", symbol),
                        ("interval", interval),
                        ("limit", limit),
                    ])
                    .send()
                    .await?;
                Self::decode_response(response).await
            })
            .await?;

        raw.into_iter()
            .map(|r| kline_from_raw(r, interval))
            .collect()
    }

    async fn balance(&self, asset: &str) -> Result<Decimal, ExchangeError> {
        let account: responses::AccountResponse = self
            .retry_read("account balance", move || async move {
                let mut params = BTreeMap::new();
                self.get_signed("/api/v3/account", &mut params).await
            })
            .await?;

        Ok(account
            .balances
            .iter()
            .find(|b| b.asset == asset)
            .map(|b| b.free)
            .unwrap_or(Decimal::ZERO))
    }

    async fn lot_size(&self, symbol: &str) -> Result<LotSize, ExchangeError> {
        if let Some(lot) = self.lot_sizes.read().await.get(symbol) {
            return Ok(*lot);
        }

        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let url = url.as_str();
        let info: responses::ExchangeInfoResponse = self
            .retry_read("exchange info", move || async move {
                let response = self
                    .client
                    .get(url)
                    .query(&[("symbol", symbol)])
                    .send()
                    .await?;
                Self::decode_response(response).await
            })
            .await?;

        let symbol_info = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| ExchangeError::SymbolNotFound(symbol.to_string()))?;

        let lot = symbol_info
            .filters
            .iter()
            .find(|f| f.filter_type == "LOT_SIZE")
            .and_then(|f| {
                Some(LotSize {
                    step_size: f.step_size?,
                    min_qty: f.min_qty?,
                })
            })
            .ok_or_else(|| {
                ExchangeError::InvalidData(format!("no LOT_SIZE filter for {symbol}"))
            })?;

        self.lot_sizes
            .write()
            .await
            .insert(symbol.to_string(), lot);
        Ok(lot)
    }

    async fn market_buy(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<FillResult, ExchangeError> {
        self.place_market_order(symbol, "BUY", quantity).await
    }

    async fn market_sell(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<FillResult, ExchangeError> {
        self.place_market_order(symbol, "SELL", quantity).await
    }
}
