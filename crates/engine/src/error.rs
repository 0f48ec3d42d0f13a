use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] exchange::error::ExchangeError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger::LedgerError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Risk management error: {0}")]
    Risk(#[from] risk::RiskError),
}
