use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlerterError {
    #[error("Failed to send the request to the Telegram API: {0}")]
    Request(#[from] reqwest::Error),

    #[error("The Telegram API returned an error: {0}")]
    Api(String),
}
