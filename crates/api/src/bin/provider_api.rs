use std::time::Duration;

use anyhow::Result;
use billing_api::{config::Config, routes::create_router, state::AppState};
use billing_shared::{create_pool, BusClient};
use tokio_util::sync::CancellationToken;
use tracing::info;

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

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = Config::from_env()?;
    info!(bind_address = %config.bind_address, "starting provider_api");

    let pool = create_pool(&config.database_url, config.database_max_connections).await?;
    let bus = BusClient::connect(&config.amqp_url, &config.amqp_queue_name).await?;

    let state = AppState::new(pool, config.clone(), bus);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(addr = %config.bind_address, "listening");

    let shutdown = CancellationToken::new();
    let server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        })
    };
    let abort_handle = server.abort_handle();

    shutdown_signal().await;
    shutdown.cancel();

    // spec.md §5: in-flight requests get a 20-second deadline to drain before
    // the listener task is forced to stop.
    if tokio::time::timeout(Duration::from_secs(20), server).await.is_err() {
        info!("graceful shutdown deadline elapsed, forcing exit");
        abort_handle.abort();
    }

    info!("server shutdown completed");
    Ok(())
}
