//! Shared AMQP bus client
//!
//! Used by the audit middleware (publishing access records, spec.md §4.2),
//! the invoice engine (publishing notifications, spec.md §4.5), and the
//! access log recorder (consuming access records, spec.md §4.3). Connection
//! setup is shared here; the consumer loop itself lives in `billing-worker`
//! since only the recorder consumes.

use lapin::{
    options::{BasicPublishOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::Mutex;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;

use crate::error::{SharedError, SharedResult};

/// Durable queue name carrying access records (spec.md §6).
pub const ACCESS_RECORD_QUEUE: &str = "api1_queue";

/// A serialized publish handle on one AMQP channel.
///
/// spec.md §5: "a per-connection publish mutex is acceptable" since a single
/// AMQP channel is not safe for concurrent publishers.
pub struct BusClient {
    channel: Mutex<Channel>,
}

impl BusClient {
    /// Connect to the broker and declare the durable queue used for
    /// publishing. The default exchange is used, matching spec.md §6.
    pub async fn connect(amqp_url: &str, queue_name: &str) -> SharedResult<Self> {
        let connection = Connection::connect(
            amqp_url,
            ConnectionProperties::default()
                .with_executor(tokio_executor_trait::Tokio::current())
                .with_reactor(tokio_reactor_trait::Tokio),
        )
        .await
        .map_err(|e| SharedError::Bus(e.to_string()))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| SharedError::Bus(e.to_string()))?;

        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| SharedError::Bus(e.to_string()))?;

        Ok(Self {
            channel: Mutex::new(channel),
        })
    }

    /// Publish `body` as a persistent JSON message to `queue_name` on the
    /// default exchange, with exponential-backoff retry capped at
    /// `max_retries` attempts (spec.md §4.2, §5).
    ///
    /// A final failure is returned to the caller, who is responsible for
    /// logging it and NOT letting it affect work already completed (spec.md
    /// §4.2: the HTTP response must already have been emitted to the client).
    pub async fn publish_with_retry(
        &self,
        queue_name: &str,
        body: &[u8],
        timestamp_ms: i64,
        max_retries: usize,
    ) -> SharedResult<()> {
        let strategy = ExponentialBackoff::from_millis(100).take(max_retries);

        Retry::spawn(strategy, || async {
            let channel = self.channel.lock().await;
            channel
                .basic_publish(
                    "", // default exchange
                    queue_name,
                    BasicPublishOptions::default(),
                    body,
                    BasicProperties::default()
                        .with_content_type("application/json".into())
                        .with_delivery_mode(2) // persistent
                        .with_timestamp(timestamp_ms as u64),
                )
                .await
                .map_err(|e| SharedError::Bus(e.to_string()))?
                .await
                .map_err(|e| SharedError::Bus(e.to_string()))?;
            Ok::<(), SharedError>(())
        })
        .await
    }

    /// Expose the underlying channel for consumer wiring (basic_qos,
    /// basic_consume) which is specific to the worker crate.
    pub async fn channel(&self) -> tokio::sync::MutexGuard<'_, Channel> {
        self.channel.lock().await
    }
}
