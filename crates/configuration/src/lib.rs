use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{
    Config, DatabaseConfig, EngineSettings, ExchangeConfig, ProfileConfig, RiskProfile,
    RuleConfig, TelegramConfig,
};

/// Loads the application configuration from the given path.
///
/// This function is the primary entry point for this crate. It reads the
/// configuration file, deserializes it into our strongly-typed `Config`
/// struct, validates the risk parameters, and returns it.
pub fn load_config_from(path: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path))
        // Environment variables (e.g. APP_EXCHANGE__API_KEY) override the file,
        // so secrets never have to live in config.toml.
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()?;

    let cfg = builder.try_deserialize::<Config>()?;
    cfg.validate()?;
    Ok(cfg)
}
