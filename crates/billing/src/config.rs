//! Invoice CLI configuration (SPEC_FULL.md §6)

use std::env;

use billing_shared::TaxRate;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,

    /// AMQP URL is optional: the invoice CLI can run with notifications
    /// disabled (e.g. in a backfill/dry-run context) by omitting it.
    pub amqp_url: Option<String>,
    pub amqp_notify_queue_name: String,

    pub default_tax_rate: TaxRate,
    pub publish_max_retries: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),

            amqp_url: env::var("AMQP_URL").ok(),
            amqp_notify_queue_name: env::var("AMQP_NOTIFY_QUEUE_NAME")
                .unwrap_or_else(|_| "invoice_notify_queue".to_string()),

            default_tax_rate: env::var("DEFAULT_TAX_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(TaxRate)
                .unwrap_or_default(),

            publish_max_retries: env::var("PUBLISH_MAX_RETRIES")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn missing_database_url_fails() {
        env::remove_var("DATABASE_URL");
        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    #[serial]
    fn default_tax_rate_is_ten_percent() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::remove_var("DEFAULT_TAX_RATE");
        let config = Config::from_env().unwrap();
        assert_eq!(config.default_tax_rate, TaxRate(10));
        env::remove_var("DATABASE_URL");
    }
}
