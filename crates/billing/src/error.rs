//! Billing error types (SPEC_FULL.md §7: `BillingError` taxonomy)

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid price table: {0}")]
    InvalidPriceTable(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Reconciliation failed for subscription {subscription_id}: {source}")]
    Reconcile {
        subscription_id: u64,
        source: String,
    },
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => BillingError::NotFound("row not found".to_string()),
            other => BillingError::Database(other.to_string()),
        }
    }
}

impl From<billing_shared::SharedError> for BillingError {
    fn from(err: billing_shared::SharedError) -> Self {
        match err {
            billing_shared::SharedError::NotFound(msg) => BillingError::NotFound(msg),
            billing_shared::SharedError::Database(msg) => BillingError::Database(msg),
            billing_shared::SharedError::InvalidDecimal(msg) => BillingError::InvalidPriceTable(msg),
            billing_shared::SharedError::Bus(msg) => BillingError::Bus(msg),
        }
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
