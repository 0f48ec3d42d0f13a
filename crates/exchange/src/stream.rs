use crate::error::ExchangeError;
use chrono::{TimeZone, Utc};
use core_types::Kline;
use futures_util::stream::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

const RECONNECT_BASE: Duration = Duration::from_secs(5);
const RECONNECT_CAP: Duration = Duration::from_secs(60);
const MAX_CONSECUTIVE_FAILURES: u32 = 10;

#[derive(Debug, Deserialize)]
struct WsStreamWrapper<T> {
    #[allow(dead_code)]
    stream: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct WsKlineEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "k")]
    kline: WsKline,
}

#[derive(Debug, Deserialize)]
struct WsKline {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(rename = "i")]
    interval: String,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "x")]
    is_closed: bool,
}

impl WsKline {
    fn into_kline(self) -> Result<Kline, ExchangeError> {
        let parse = |field: &str, value: &str| {
            Decimal::from_str(value)
                .map_err(|e| ExchangeError::Deserialization(format!("bad {field}: {e}")))
        };
        Ok(Kline {
            open_time: Utc.timestamp_millis_opt(self.open_time).single().ok_or_else(|| {
                ExchangeError::InvalidData(format!("invalid open_time: {}", self.open_time))
            })?,
            open: parse("open", &self.open)?,
            high: parse("high", &self.high)?,
            low: parse("low", &self.low)?,
            close: parse("close", &self.close)?,
            volume: parse("volume", &self.volume)?,
            close_time: Utc.timestamp_millis_opt(self.close_time).single().ok_or_else(
                || ExchangeError::InvalidData(format!("invalid close_time: {}", self.close_time)),
            )?,
            interval: self.interval,
        })
    }
}

/// Handles the connection to the exchange's WebSocket API and manages kline
/// stream subscriptions.
pub struct MarketStream {
    base_url: Url,
}

impl MarketStream {
    pub fn new(testnet: bool) -> Result<Self, ExchangeError> {
        let base_url = if testnet {
            "wss://stream.testnet.binance.vision"
        } else {
            "wss://stream.binance.com:9443"
        };
        Ok(Self {
            base_url: Url::parse(base_url)
                .map_err(|e| ExchangeError::ClientBuild(format!("bad WebSocket URL: {e}")))?,
        })
    }

    /// Subscribes to kline streams for the given symbols and returns a
    /// receiver of `(symbol, kline)` pairs. Only CLOSED klines are forwarded.
    ///
    /// The spawned task reconnects with exponential backoff, starting at 5s
    /// and capped at 60s, and gives up after too many consecutive failures
    /// so a dead feed surfaces as a closed channel instead of a silent
    /// retry loop. Flipping `shutdown` to `true` ends the task promptly.
    pub fn subscribe_klines(
        &self,
        symbols: &[String],
        interval: &str,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<mpsc::Receiver<(String, Kline)>, ExchangeError> {
        let (tx, rx) = mpsc::channel(1024);

        let streams = symbols
            .iter()
            .map(|s| format!("{}@kline_{}", s.to_lowercase(), interval))
            .collect::<Vec<_>>()
            .join("/");

        let mut url = self.base_url.clone();
        url.set_path("/stream");
        url.set_query(Some(&format!("streams={streams}")));

        tokio::spawn(async move {
            let mut backoff = RECONNECT_BASE;
            let mut failures: u32 = 0;

            loop {
                if *shutdown.borrow() {
                    tracing::info!("market stream shutting down");
                    return;
                }

                tracing::info!(%url, "connecting market data stream");
                match connect_async(url.as_str()).await {
                    Ok((mut stream, _)) => {
                        tracing::info!("market data stream connected");
                        failures = 0;
                        backoff = RECONNECT_BASE;

                        loop {
                            tokio::select! {
                                _ = shutdown.changed() => {
                                    if *shutdown.borrow() {
                                        tracing::info!("market stream shutting down");
                                        return;
                                    }
                                }
                                msg = stream.next() => {
                                    match msg {
                                        Some(Ok(Message::Text(text))) => {
                                            if !handle_text(&text, &tx).await {
                                                return;
                                            }
                                        }
                                        Some(Ok(Message::Close(frame))) => {
                                            tracing::info!(?frame, "stream closed by server");
                                            break;
                                        }
                                        Some(Ok(_)) => {}
                                        Some(Err(e)) => {
                                            tracing::error!(error = %e, "stream read error");
                                            break;
                                        }
                                        None => break,
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "stream connection failed");
                    }
                }

                failures += 1;
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    tracing::error!(
                        failures,
                        "market stream abandoned after repeated failures"
                    );
                    return;
                }

                tracing::warn!(delay = ?backoff, "stream disconnected, reconnecting");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
                backoff = (backoff * 2).min(RECONNECT_CAP);
            }
        });

        Ok(rx)
    }
}

/// Parses one text frame and forwards any closed kline. Returns `false`
/// when the receiver is gone and the task should exit.
async fn handle_text(text: &str, tx: &mpsc::Sender<(String, Kline)>) -> bool {
    let wrapper: WsStreamWrapper<WsKlineEvent> = match serde_json::from_str(text) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable stream message");
            return true;
        }
    };

    if wrapper.data.event_type != "kline" || !wrapper.data.kline.is_closed {
        return true;
    }

    let symbol = wrapper.data.symbol;
    match wrapper.data.kline.into_kline() {
        Ok(kline) => {
            if tx.send((symbol, kline)).await.is_err() {
                tracing::info!("kline receiver dropped, closing stream");
                return false;
            }
        }
        Err(e) => {
            tracing::warn!(%symbol, error = %e, "dropping malformed kline");
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const CLOSED_KLINE: &str = r#"{
        "stream": "btcusdt@kline_1m",
        "data": {
            "e": "kline", "E": 1672515782136, "s": "BTCUSDT",
            "k": {
                "t": 1672515720000, "T": 1672515779999, "s": "BTCUSDT",
                "i": "1m", "f": 100, "L": 200,
                "o": "16500.00", "c": "16510.50", "h": "16512.00",
                "l": "16498.00", "v": "12.5", "n": 100,
                "x": true, "q": "206000.0", "V": "6.2", "Q": "102000.0", "B": "0"
            }
        }
    }"#;

    #[tokio::test]
    async fn closed_klines_are_forwarded() {
        let (tx, mut rx) = mpsc::channel(8);
        assert!(handle_text(CLOSED_KLINE, &tx).await);

        let (symbol, kline) = rx.try_recv().unwrap();
        assert_eq!(symbol, "BTCUSDT");
        assert_eq!(kline.close, dec!(16510.50));
        assert_eq!(kline.interval, "1m");
    }

    #[tokio::test]
    async fn open_klines_are_skipped() {
        let open = CLOSED_KLINE.replace("\"x\": true", "\"x\": false");
        let (tx, mut rx) = mpsc::channel(8);
        assert!(handle_text(&open, &tx).await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn garbage_messages_are_ignored() {
        let (tx, mut rx) = mpsc::channel(8);
        assert!(handle_text("not json at all", &tx).await);
        assert!(rx.try_recv().is_err());
    }
}
