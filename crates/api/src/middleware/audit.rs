//! Audit Middleware (SPEC_FULL.md §4.2)
//!
//! Grounded in `original_source/provider/middleware.go`: extracts the
//! `x-api-key` header, resolves it through the credential cache, and — only
//! when the inner handler's response status falls in `[200, 300)` —
//! publishes a structured [`AccessRecord`] to the durable bus with bounded
//! retry. A publish failure is logged but never turns into an HTTP error;
//! the response has already left the building by the time we publish.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use billing_shared::AccessRecord;
use serde_json::json;
use time::OffsetDateTime;

use crate::state::AppState;

const API_KEY_HEADER: &str = "x-api-key";

pub async fn audit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let now = OffsetDateTime::now_utc();
    let start = Instant::now();

    let api_key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let Some(api_key) = api_key else {
        return unauthorized_response();
    };

    let account_id = match state.credential_cache.check(&state.pool, &api_key, now).await {
        Ok(account_id) => account_id,
        Err(_) => return unauthorized_response(),
    };

    let client_ip = extract_client_ip(req.headers()).unwrap_or_else(|| "unknown".to_string());
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let user_agent = req
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let response = next.run(req).await;

    let status_code = response.status().as_u16() as i32;
    tracing::info!(path = %path, account_id = %account_id, status_code, "audit: handler completed");

    if !(200..300).contains(&status_code) {
        return response;
    }

    let record = AccessRecord {
        account_id,
        timestamp: now,
        client_ip,
        method,
        path,
        status_code,
        latency: start.elapsed().as_nanos() as i64,
        user_agent,
    };

    let bus = state.bus.clone();
    let queue_name = state.config.amqp_queue_name.clone();
    let max_retries = state.config.publish_max_retries;
    let timestamp_ms = (now.unix_timestamp_nanos() / 1_000_000) as i64;

    tokio::spawn(async move {
        let payload = match serde_json::to_vec(&record) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, "failed to marshal AccessRecord");
                return;
            }
        };

        if let Err(err) = bus
            .publish_with_retry(&queue_name, &payload, timestamp_ms, max_retries)
            .await
        {
            tracing::error!(error = %err, "failed to publish AccessRecord after retries");
        }
    });

    response
}

fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": { "code": "UNAUTHORIZED", "message": "missing or invalid api key" }
        })),
    )
        .into_response()
}

/// Extract the client IP from common proxy headers, in order of preference.
fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|h| h.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
}
