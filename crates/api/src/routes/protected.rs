//! The two sample protected endpoints wrapped by the audit middleware
//! (spec.md §6). Their own logic is out of scope; they exist to give the
//! audit middleware something to wrap and audit.

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

pub async fn one() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "route": "one" })))
}

pub async fn two() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "route": "two" })))
}
