use crate::error::ConfigError;
use core_types::SignalKind;
use rust_decimal::Decimal;
use serde::Deserialize;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub engine: EngineSettings,
    pub profiles: Vec<ProfileConfig>,
}

/// Exchange API credentials and environment selection.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub api_secret: String,
    /// When true, the client talks to the exchange's testnet endpoints.
    #[serde(default)]
    pub testnet: bool,
}

/// Telegram bot credentials. Either field may be left empty to disable
/// alerting; the alerter handles that gracefully.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub chat_id: String,
}

/// Database settings. The URL is usually supplied via the `DATABASE_URL`
/// environment variable and left unset here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
}

/// Engine-wide settings shared by all trading profiles.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// Kline interval the signal loops subscribe to (e.g. "1m", "1h").
    pub interval: String,
    /// The quote asset all profiles trade against (e.g. "USDT").
    pub quote_asset: String,
    /// When true, orders are simulated against a virtual balance instead of
    /// being sent to the exchange. The price feed stays real.
    #[serde(default)]
    pub paper_trading: bool,
    /// Starting virtual balance for paper trading, in the quote asset.
    #[serde(default = "default_paper_balance")]
    pub paper_balance: Decimal,
    /// How long a cached balance stays trustworthy before a re-fetch.
    #[serde(default = "default_balance_ttl")]
    pub balance_cache_ttl_secs: u64,
    /// How often the daily trading summary is sent.
    #[serde(default = "default_summary_interval")]
    pub summary_interval_secs: u64,
}

fn default_paper_balance() -> Decimal {
    Decimal::from(1000)
}

fn default_balance_ttl() -> u64 {
    30
}

fn default_summary_interval() -> u64 {
    86_400
}

/// One trading profile: a symbol, its risk limits, and the rules that turn
/// indicator facts into signals. Immutable during a session; a profile edit
/// replaces the whole struct.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub risk: RiskProfile,
    pub rules: Vec<RuleConfig>,
}

fn default_enabled() -> bool {
    true
}

/// A single trading rule: a boolean condition over named indicator facts
/// (e.g. `"RSI.oversold AND MACD.bullish"`) and the signal it emits when the
/// condition holds.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    pub condition: String,
    pub signal: SignalKind,
}

/// Contains parameters for trade-level risk management.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskProfile {
    /// Exit trigger: sell when the price ratio drops to this (negative) level.
    #[serde(default = "default_true")]
    pub use_stop_loss: bool,
    pub stop_loss_ratio: Decimal,

    /// Exit trigger: sell when the price ratio reaches this (positive) level.
    #[serde(default = "default_true")]
    pub use_take_profit: bool,
    pub take_profit_ratio: Decimal,

    /// Exit trigger: sell once at least this much profit is locked in.
    #[serde(default = "default_true")]
    pub use_min_profit: bool,
    pub min_profit_ratio: Decimal,

    /// Maximum quote-asset value of a single position.
    pub max_position_size: Decimal,
    /// Minimum quote-asset value of a single trade.
    pub min_trade_amount: Decimal,
    /// Realized losses beyond this amount halt new buys for the day.
    pub max_daily_loss: Decimal,

    /// When false, a discretionary sell at a loss is held back unless a
    /// stop-loss trigger or a forced sell demands it.
    #[serde(default)]
    pub allow_loss_sells: bool,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Validates that all profiles carry logical risk parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.interval.is_empty() {
            return Err(ConfigError::Validation(
                "engine.interval must not be empty".to_string(),
            ));
        }
        for profile in &self.profiles {
            profile.risk.validate(&profile.name)?;
            if profile.symbol.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "profile '{}' has an empty symbol",
                    profile.name
                )));
            }
        }
        Ok(())
    }

    /// The enabled profiles, in configuration order.
    pub fn active_profiles(&self) -> impl Iterator<Item = &ProfileConfig> {
        self.profiles.iter().filter(|p| p.enabled)
    }
}

impl RiskProfile {
    pub fn validate(&self, profile_name: &str) -> Result<(), ConfigError> {
        if self.stop_loss_ratio >= Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "profile '{}': stop_loss_ratio must be negative",
                profile_name
            )));
        }
        if self.take_profit_ratio <= Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "profile '{}': take_profit_ratio must be positive",
                profile_name
            )));
        }
        if self.min_profit_ratio < Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "profile '{}': min_profit_ratio must not be negative",
                profile_name
            )));
        }
        if self.min_trade_amount <= Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "profile '{}': min_trade_amount must be positive",
                profile_name
            )));
        }
        if self.max_position_size <= Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "profile '{}': max_position_size must be positive",
                profile_name
            )));
        }
        if self.max_daily_loss <= Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "profile '{}': max_daily_loss must be positive",
                profile_name
            )));
        }
        Ok(())
    }
}
