//! API routes

pub mod health;
pub mod protected;

use axum::{middleware, routing::get, Router};

use crate::{middleware::audit_middleware, state::AppState};

/// Create all API routes (spec.md §6).
pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/api/v1/health", get(health::health))
        .route("/api/v1/health/live", get(health::liveness))
        .route("/api/v1/health/ready", get(health::readiness));

    let protected_routes = Router::new()
        .route("/api/v1/one", get(protected::one))
        .route("/api/v1/two", get(protected::two))
        .layer(middleware::from_fn_with_state(state.clone(), audit_middleware));

    Router::new()
        .merge(health_routes)
        .merge(protected_routes)
        .with_state(state)
}
