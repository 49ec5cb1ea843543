//! `receiverWorker` CLI command (spec.md §6): runs the AMQP consumer and the
//! access log recorder loop until SIGTERM/SIGINT, then performs a final
//! flush before exiting (spec.md §5).

use std::sync::Arc;

use anyhow::Result;
use billing_shared::{create_pool, BusClient};
use billing_worker::{config::Config, consumer::run_consumer, AccessLogRecorder};
use object_store::aws::AmazonS3Builder;
use object_store::ObjectStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, starting graceful shutdown");
}

fn build_object_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.object_store_bucket);
    if let Some(endpoint) = &config.object_store_endpoint {
        builder = builder.with_endpoint(endpoint).with_allow_http(true);
    }
    Ok(Arc::new(builder.build()?))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = Arc::new(Config::from_env()?);
    info!("starting receiver_worker");

    let pool = create_pool(&config.database_url, config.database_max_connections).await?;
    let bus = BusClient::connect(&config.amqp_url, &config.amqp_queue_name).await?;
    let object_store = build_object_store(&config)?;

    let shutdown = CancellationToken::new();
    let (ingest_tx, ingest_rx) = mpsc::channel(config.channel_capacity());

    let recorder = AccessLogRecorder::new(config.clone(), pool, object_store);
    let recorder_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { recorder.run(ingest_rx, shutdown).await })
    };

    let consumer_handle = {
        let queue_name = config.amqp_queue_name.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = run_consumer(&bus, &queue_name, ingest_tx, shutdown).await {
                error!(error = %err, "consumer loop exited with an error");
            }
        })
    };

    shutdown_signal().await;
    shutdown.cancel();

    let _ = consumer_handle.await;
    let _ = recorder_handle.await;

    info!("receiver_worker shutdown completed");
    Ok(())
}
