//! Recorder error types (SPEC_FULL.md §7)

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("Columnar encoding error: {0}")]
    Columnar(String),

    #[error("Bus error: {0}")]
    Bus(String),
}

impl From<sqlx::Error> for RecorderError {
    fn from(err: sqlx::Error) -> Self {
        RecorderError::Database(err.to_string())
    }
}

impl From<object_store::Error> for RecorderError {
    fn from(err: object_store::Error) -> Self {
        RecorderError::ObjectStore(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for RecorderError {
    fn from(err: arrow::error::ArrowError) -> Self {
        RecorderError::Columnar(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for RecorderError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        RecorderError::Columnar(err.to_string())
    }
}

impl From<billing_shared::SharedError> for RecorderError {
    fn from(err: billing_shared::SharedError) -> Self {
        RecorderError::Bus(err.to_string())
    }
}

pub type RecorderResult<T> = Result<T, RecorderError>;
