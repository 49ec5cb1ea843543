//! `createDailyInvoice` CLI command (spec.md §6).
//!
//! Runs one `create_invoice_daily(now_utc())` pass and exits: `0` on a clean
//! run (including a run where every subscription was individually
//! skipped — spec.md §4.5's failure policy only makes stage 1 fatal), or a
//! non-zero code if stage 1 itself fails.

use anyhow::Result;
use billing_core::{reconcile::AggregateReconciler, Config, InvoiceEngine};
use billing_shared::{create_pool, BusClient};
use time::OffsetDateTime;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = Config::from_env()?;
    info!("starting create_daily_invoice");

    let pool = create_pool(&config.database_url, config.database_max_connections).await?;

    let bus = match &config.amqp_url {
        Some(amqp_url) => Some(BusClient::connect(amqp_url, &config.amqp_notify_queue_name).await?),
        None => {
            info!("AMQP_URL not set, invoice notifications are disabled for this run");
            None
        }
    };

    let reconciler = Box::new(AggregateReconciler::new(pool.clone()));
    let engine = InvoiceEngine::new(
        pool,
        reconciler,
        bus,
        config.amqp_notify_queue_name.clone(),
        config.publish_max_retries,
        config.default_tax_rate,
    );

    match engine.create_invoice_daily(OffsetDateTime::now_utc()).await {
        Ok(()) => {
            info!("daily invoice run completed");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "daily invoice run failed at enumeration stage");
            Err(err.into())
        }
    }
}
