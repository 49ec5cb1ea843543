//! Usage Billing Core — Price Model & Invoice Engine
//!
//! Implements C4 (price model / exact-rational invoice calculation) and C5
//! (daily invoice engine), per SPEC_FULL.md §4.4–4.5.

pub mod config;
pub mod engine;
pub mod error;
pub mod invoice;
pub mod price;
pub mod reconcile;

pub use config::Config;
pub use engine::InvoiceEngine;
pub use error::{BillingError, BillingResult};
