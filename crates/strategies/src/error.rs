use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Strategy received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Failed to parse rule condition '{condition}': {message}")]
    RuleParse { condition: String, message: String },

    #[error("An error occurred during indicator calculation: {0}")]
    IndicatorError(String),
}
