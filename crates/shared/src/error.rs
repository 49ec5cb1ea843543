//! Error types shared across the billing core crates

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SharedError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid decimal literal: {0}")]
    InvalidDecimal(String),

    #[error("Bus error: {0}")]
    Bus(String),
}

impl From<sqlx::Error> for SharedError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => SharedError::NotFound("row not found".to_string()),
            other => SharedError::Database(other.to_string()),
        }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
