//! Shared application state

use std::sync::Arc;
use std::time::Duration;

use billing_shared::BusClient;
use sqlx::PgPool;

use crate::{auth::CredentialCache, config::Config};

/// Application state shared across all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub credential_cache: Arc<CredentialCache>,
    pub bus: Arc<BusClient>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, bus: BusClient) -> Self {
        let credential_cache = CredentialCache::new(
            Duration::from_secs(config.credential_cache_ttl_secs),
            config.credential_cache_max_entries,
        );

        Self {
            pool,
            config: Arc::new(config),
            credential_cache: Arc::new(credential_cache),
            bus: Arc::new(bus),
        }
    }
}
