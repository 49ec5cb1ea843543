//! Application configuration

use std::env;

/// Application configuration loaded from environment variables (SPEC_FULL.md §6).
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,

    pub database_url: String,
    pub database_max_connections: u32,

    pub amqp_url: String,
    pub amqp_queue_name: String,

    pub credential_cache_ttl_secs: u64,
    pub credential_cache_max_entries: usize,

    pub publish_max_retries: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),

            amqp_url: env::var("AMQP_URL").map_err(|_| ConfigError::Missing("AMQP_URL"))?,
            amqp_queue_name: env::var("AMQP_QUEUE_NAME")
                .unwrap_or_else(|_| "api1_queue".to_string()),

            credential_cache_ttl_secs: env::var("CREDENTIAL_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            credential_cache_max_entries: env::var("CREDENTIAL_CACHE_MAX_ENTRIES")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .unwrap_or(10000),

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
        env::set_var("AMQP_URL", "amqp://localhost");
        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));
        env::remove_var("AMQP_URL");
    }

    #[test]
    #[serial]
    fn defaults_are_applied() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var("AMQP_URL", "amqp://localhost");
        let config = Config::from_env().unwrap();
        assert_eq!(config.amqp_queue_name, "api1_queue");
        assert_eq!(config.publish_max_retries, 5);
        env::remove_var("DATABASE_URL");
        env::remove_var("AMQP_URL");
    }
}
