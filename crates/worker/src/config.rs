//! Access log recorder configuration (SPEC_FULL.md §6)

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,

    pub amqp_url: String,
    pub amqp_queue_name: String,

    /// Flush-by-count threshold (spec.md §4.3 `bufferSize`).
    pub recorder_buffer_size: usize,
    /// Flush-by-time period (spec.md §4.3 `flushInterval`).
    pub recorder_flush_interval: Duration,

    /// spec.md §4.3 `bucketName`; object-store credentials themselves are
    /// consumed by `object_store`'s own builder from the process
    /// environment (`AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY`/`AWS_REGION`),
    /// not re-parsed here (SPEC_FULL.md §6).
    pub object_store_bucket: String,
    pub object_store_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let recorder_buffer_size = env::var("RECORDER_BUFFER_SIZE")
            .unwrap_or_else(|_| "500".to_string())
            .parse()
            .unwrap_or(500);

        Ok(Self {
            database_url: env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            amqp_url: env::var("AMQP_URL").map_err(|_| ConfigError::Missing("AMQP_URL"))?,
            amqp_queue_name: env::var("AMQP_QUEUE_NAME").unwrap_or_else(|_| "api1_queue".to_string()),

            recorder_buffer_size,
            recorder_flush_interval: Duration::from_secs(
                env::var("RECORDER_FLUSH_INTERVAL_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            ),

            object_store_bucket: env::var("OBJECT_STORE_BUCKET")
                .unwrap_or_else(|_| "api-access-log".to_string()),
            object_store_endpoint: env::var("OBJECT_STORE_ENDPOINT").ok(),
        })
    }

    /// spec.md §4.3: `channelCapacity = 2 × bufferSize`.
    pub fn channel_capacity(&self) -> usize {
        self.recorder_buffer_size * 2
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
    fn missing_amqp_url_fails() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::remove_var("AMQP_URL");
        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::Missing("AMQP_URL"))));
        env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial]
    fn channel_capacity_is_double_buffer_size() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var("AMQP_URL", "amqp://localhost");
        env::set_var("RECORDER_BUFFER_SIZE", "500");
        let config = Config::from_env().unwrap();
        assert_eq!(config.channel_capacity(), 1000);
        env::remove_var("DATABASE_URL");
        env::remove_var("AMQP_URL");
        env::remove_var("RECORDER_BUFFER_SIZE");
    }
}
