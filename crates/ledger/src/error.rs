use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("A position for '{0}' is already open")]
    AlreadyOpen(String),

    #[error("No open position for '{0}'")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to decode a stored row: {0}")]
    Decode(String),
}
