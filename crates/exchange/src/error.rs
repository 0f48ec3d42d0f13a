use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Exchange rejected the request (code {code}): {message}")]
    Api { code: i64, message: String },

    #[error("Failed to deserialize the API response: {0}")]
    Deserialization(String),

    #[error("Invalid data from the API: {0}")]
    InvalidData(String),

    #[error("Exchange does not list symbol '{0}'")]
    SymbolNotFound(String),

    #[error("Failed to build the API client: {0}")]
    ClientBuild(String),
}

impl ExchangeError {
    /// Whether retrying the same request may succeed. Covers network-level
    /// failures and the exchange's rate-limit and internal-timeout codes.
    pub fn is_transient(&self) -> bool {
        match self {
            ExchangeError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            // -1001 DISCONNECTED, -1003 TOO_MANY_REQUESTS, -1007 TIMEOUT.
            ExchangeError::Api { code, .. } => matches!(code, -1001 | -1003 | -1007),
            _ => false,
        }
    }
}
