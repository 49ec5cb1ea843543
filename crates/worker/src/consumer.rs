//! AMQP consumer feeding the recorder's ingest channel (SPEC_FULL.md §4.3
//! supplemental feature, grounded in `original_source/worker/worker.go` +
//! `pkg/rabbitmq`).
//!
//! Durable queue `api1_queue`, prefetch 1 (fair dispatch), manual ack
//! (spec.md §6). A message that fails to parse as [`AccessRecord`] JSON is
//! rejected without requeue (spec.md §7 "Parse" taxonomy) rather than
//! poisoning the queue with a message that will never parse.

use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicQosOptions, BasicRejectOptions};
use lapin::types::FieldTable;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use billing_shared::{AccessRecord, BusClient};

use crate::error::{RecorderError, RecorderResult};

pub async fn run_consumer(
    bus: &BusClient,
    queue_name: &str,
    ingest: mpsc::Sender<AccessRecord>,
    shutdown: CancellationToken,
) -> RecorderResult<()> {
    let mut consumer = {
        let channel = bus.channel().await;
        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(|err| RecorderError::Bus(err.to_string()))?;

        channel
            .basic_consume(
                queue_name,
                "access-log-recorder",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|err| RecorderError::Bus(err.to_string()))?
    };

    info!(queue = queue_name, "consuming access records");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("consumer stopping on shutdown signal");
                return Ok(());
            }
            delivery = consumer.next() => {
                let Some(delivery) = delivery else {
                    info!("consumer stream ended");
                    return Ok(());
                };
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(err) => {
                        error!(error = %err, "error receiving delivery from broker");
                        continue;
                    }
                };

                match serde_json::from_slice::<AccessRecord>(&delivery.data) {
                    Ok(record) => {
                        if ingest.send(record).await.is_err() {
                            warn!("ingest channel closed, stopping consumer");
                            return Ok(());
                        }
                        if let Err(err) = delivery.ack(BasicAckOptions::default()).await {
                            error!(error = %err, "failed to ack delivery");
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to parse AccessRecord JSON, rejecting without requeue");
                        if let Err(err) = delivery.reject(BasicRejectOptions { requeue: false }).await {
                            error!(error = %err, "failed to reject unparsable delivery");
                        }
                    }
                }
            }
        }
    }
}
