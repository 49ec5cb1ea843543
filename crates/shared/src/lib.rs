//! Usage Billing Core — Shared Types and Utilities
//!
//! This crate contains types, errors, and utilities shared across the
//! billing core platform: the domain model (§3), the database pool
//! bootstrap, and the AMQP bus client used by both the audit middleware and
//! the invoice engine.

pub mod bus;
pub mod credential;
pub mod db;
pub mod error;
pub mod types;

pub use bus::*;
pub use db::*;
pub use error::*;
pub use types::*;
