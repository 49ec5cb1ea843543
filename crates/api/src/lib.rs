//! Usage Billing Core — Provider API
//!
//! Ingress authorization (C1) and audit emission (C2), per SPEC_FULL.md §4.1–4.2.

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
