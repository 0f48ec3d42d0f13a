//! Operator notifications over Telegram.
//!
//! Delivery is strictly best-effort: a failed alert is logged and dropped,
//! and must never affect an order lifecycle. The engine talks to the
//! [`Notifier`] trait; [`TelegramAlerter`] is the real implementation and
//! [`NullNotifier`] stands in when no credentials are configured.

use async_trait::async_trait;
use chrono::NaiveDate;
use configuration::TelegramConfig;
use core_types::{OrderSide, TradeRecord};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;

pub mod error;

pub use error::AlerterError;

/// One day's trading activity, condensed for the periodic summary alert.
#[derive(Debug, Clone)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub realized_pnl: Decimal,
}

/// Best-effort notification sink. Implementations log their own failures
/// and always return; callers never branch on delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn trade_executed(&self, trade: &TradeRecord, reason: &str);

    /// A reconciliation anomaly: state that disagrees with what the
    /// exchange confirmed. Needs operator eyes, not automatic repair.
    async fn anomaly(&self, symbol: &str, message: &str);

    async fn error(&self, context: &str, message: &str);

    async fn daily_summary(&self, summary: &DailySummary);

    async fn startup(&self, mode: &str);

    async fn shutdown(&self);
}

/// The JSON payload for the Telegram `sendMessage` endpoint.
#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// A client for sending messages to the Telegram Bot API.
pub struct TelegramAlerter {
    client: Client,
    token: String,
    chat_id: String,
}

impl TelegramAlerter {
    /// Creates a new `TelegramAlerter`.
    ///
    /// Returns `None` if the token or chat_id is missing from the
    /// configuration, allowing the system to gracefully disable alerting.
    pub fn new(config: &TelegramConfig) -> Option<Self> {
        if config.token.is_empty() || config.chat_id.is_empty() {
            tracing::warn!("Telegram alerter is not configured (missing token or chat_id).");
            return None;
        }
        Some(Self {
            client: Client::new(),
            token: config.token.clone(),
            chat_id: config.chat_id.clone(),
        })
    }

    /// Sends a text message to the configured Telegram chat.
    pub async fn send_message(&self, message: &str) -> Result<(), AlerterError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);

        let payload = SendMessagePayload {
            chat_id: &self.chat_id,
            text: message,
            parse_mode: "MarkdownV2",
        };

        let response = self.client.post(&url).json(&payload).send().await?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to decode error response".to_string());
            return Err(AlerterError::Api(error_text));
        }

        Ok(())
    }

    async fn deliver(&self, message: &str) {
        if let Err(e) = self.send_message(message).await {
            tracing::error!(error = ?e, "Failed to send Telegram alert.");
        }
    }
}

#[async_trait]
impl Notifier for TelegramAlerter {
    async fn trade_executed(&self, trade: &TradeRecord, reason: &str) {
        let icon = match trade.side {
            OrderSide::Buy => "📈",
            OrderSide::Sell => "📉",
        };
        let mut message = format!(
            "{} *{} {}* `@{}`\n`{}` units",
            icon,
            trade.side.as_wire(),
            escape_markdown(&trade.symbol),
            trade.price,
            trade.quantity,
        );
        if let Some(profit) = trade.profit {
            message.push_str(&format!("\nP&L: `{profit}`"));
        }
        message.push_str(&format!("\n_{}_", escape_markdown(reason)));
        self.deliver(&message).await;
    }

    async fn anomaly(&self, symbol: &str, message: &str) {
        self.deliver(&format!(
            "🚨 *RECONCILIATION {}*: {}",
            escape_markdown(symbol),
            escape_markdown(message)
        ))
        .await;
    }

    async fn error(&self, context: &str, message: &str) {
        self.deliver(&format!(
            "⚠️ *ERROR* \\({}\\): {}",
            escape_markdown(context),
            escape_markdown(message)
        ))
        .await;
    }

    async fn daily_summary(&self, summary: &DailySummary) {
        self.deliver(&format!(
            "📊 *Daily Summary {}*\nTrades: `{}`\nWins: `{}` / Losses: `{}`\nRealized P&L: `{}`",
            escape_markdown(&summary.date.to_string()),
            summary.total_trades,
            summary.wins,
            summary.losses,
            summary.realized_pnl,
        ))
        .await;
    }

    async fn startup(&self, mode: &str) {
        self.deliver(&format!("✅ *Trading engine started* \\({}\\)", escape_markdown(mode)))
            .await;
    }

    async fn shutdown(&self) {
        self.deliver("🛑 *Trading engine stopped*").await;
    }
}

/// Sink for running without Telegram credentials; alerts go to the log only.
#[derive(Debug, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn trade_executed(&self, trade: &TradeRecord, reason: &str) {
        tracing::info!(symbol = %trade.symbol, side = trade.side.as_wire(), price = %trade.price, %reason, "trade executed");
    }

    async fn anomaly(&self, symbol: &str, message: &str) {
        tracing::error!(%symbol, %message, "reconciliation anomaly");
    }

    async fn error(&self, context: &str, message: &str) {
        tracing::error!(%context, %message, "alert");
    }

    async fn daily_summary(&self, summary: &DailySummary) {
        tracing::info!(?summary, "daily summary");
    }

    async fn startup(&self, mode: &str) {
        tracing::info!(%mode, "engine started");
    }

    async fn shutdown(&self) {
        tracing::info!("engine stopped");
    }
}

/// Escapes characters with special meaning in Telegram's MarkdownV2.
fn escape_markdown(text: &str) -> String {
    let special_chars = r"_*[]()~`>#+-=|{}.!";
    special_chars
        .chars()
        .fold(text.to_string(), |s, c| s.replace(c, &format!("\\{c}")))
}
