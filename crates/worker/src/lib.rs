//! Usage Billing Core — Access Log Recorder
//!
//! C3, per SPEC_FULL.md §4.3: the AMQP consumer, the buffered recorder loop,
//! and its two concurrent sinks (columnar object storage, minute-aggregate
//! upsert).

pub mod config;
pub mod consumer;
pub mod error;
pub mod recorder;

pub use config::Config;
pub use error::{RecorderError, RecorderResult};
pub use recorder::AccessLogRecorder;
