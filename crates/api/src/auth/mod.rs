//! Authentication for the billing core's ingress (SPEC_FULL.md §4.1)

pub mod credential_cache;

pub use credential_cache::CredentialCache;
