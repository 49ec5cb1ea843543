//! Core domain types shared across the billing core crates
//!
//! See `SPEC_FULL.md` §3 for the data model this module implements.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

// =============================================================================
// Account identifiers
// =============================================================================

/// Unsigned 64-bit account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl From<u64> for AccountId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Account
// =============================================================================

/// An account, created out-of-band by the seeding utility; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub display_name: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<i64> for AccountId {
    fn from(id: i64) -> Self {
        AccountId(id as u64)
    }
}

// =============================================================================
// ActiveApiKey
// =============================================================================

/// An opaque API key bound to one owning account, valid until `expires_at`.
///
/// Invariant (spec.md §3): the key is valid iff `expires_at` is strictly
/// greater than the current instant — checked by [`ActiveApiKey::is_valid_at`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveApiKey {
    /// SHA-256 hex digest of the presented key, never the plaintext key.
    pub key_hash: String,
    pub account_id: AccountId,
    pub expires_at: OffsetDateTime,
}

impl ActiveApiKey {
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// A billing window `[from, estimated_end]` for one account.
///
/// Invariant (spec.md §3): `from <= estimated_end`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub account_id: AccountId,
    pub from: OffsetDateTime,
    pub estimated_end: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl From<u64> for SubscriptionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<i64> for SubscriptionId {
    fn from(id: i64) -> Self {
        Self(id as u64)
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Subscription {
    /// True iff `estimated_end` falls on the given local day, per spec.md §3
    /// ("compared at local-midnight boundary"). This core treats UTC as the
    /// authoritative local timezone — see DESIGN.md Open Questions.
    pub fn is_billable_on(&self, day: Date) -> bool {
        self.estimated_end.date() == day
    }
}

// =============================================================================
// DailyApiUsage / EveryMinuteApiUsage
// =============================================================================

/// Daily usage count for one account, unique per `(account_id, date)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyApiUsage {
    pub account_id: AccountId,
    pub date: Date,
    pub usage: u64,
}

/// `YYYYMMDDhhmm` UTC minute bucket. Lexical order matches chronological
/// order, so no timezone arithmetic beyond formatting is ever needed
/// (spec.md §9).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MinuteKey(String);

impl MinuteKey {
    /// Derive the minute-key for the UTC minute containing `instant`.
    pub fn from_instant(instant: OffsetDateTime) -> Self {
        let instant = instant.to_offset(time::UtcOffset::UTC);
        Self(format!(
            "{:04}{:02}{:02}{:02}{:02}",
            instant.year(),
            u8::from(instant.month()),
            instant.day(),
            instant.hour(),
            instant.minute(),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MinuteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid minute key: {0}")]
pub struct InvalidMinuteKey(String);

impl std::str::FromStr for MinuteKey {
    type Err = InvalidMinuteKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 12 && s.chars().all(|c| c.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidMinuteKey(s.to_string()))
        }
    }
}

/// Per-minute usage count for one account, additively merged on conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EveryMinuteApiUsage {
    pub account_id: AccountId,
    pub minute: MinuteKey,
    pub usage: u64,
}

impl TryFrom<String> for MinuteKey {
    type Error = InvalidMinuteKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// =============================================================================
// AccessRecord — wire format on the bus, input to the recorder
// =============================================================================

/// Structured access record emitted by the audit middleware and consumed by
/// the access log recorder. Field names match the wire JSON in spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRecord {
    pub account_id: AccountId,
    /// Event timestamp, millisecond precision once it passes through the
    /// columnar sink; carried as full nanosecond `OffsetDateTime` on the wire.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub client_ip: String,
    pub method: String,
    pub path: String,
    pub status_code: i32,
    /// Latency in nanoseconds.
    pub latency: i64,
    pub user_agent: String,
}

// =============================================================================
// TaxRate
// =============================================================================

/// A tax rate expressed in whole percentage points (e.g. `10` for 10%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxRate(pub u8);

impl Default for TaxRate {
    fn default() -> Self {
        Self(10)
    }
}

impl std::fmt::Display for TaxRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaxRate {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// =============================================================================
// FreeCreditBalance
// =============================================================================

/// A free-credit balance snapshot; the most recent by `created_at` is
/// authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreeCreditBalance {
    pub account_id: AccountId,
    pub balance: u64,
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn minute_key_formats_as_utc_yyyymmddhhmm() {
        let key = MinuteKey::from_instant(datetime!(2025-01-01 00:00:30 UTC));
        assert_eq!(key.as_str(), "202501010000");

        let key = MinuteKey::from_instant(datetime!(2025-01-01 00:01:10 UTC));
        assert_eq!(key.as_str(), "202501010001");
    }

    #[test]
    fn minute_key_lexical_order_matches_chronological_order() {
        let earlier = MinuteKey::from_instant(datetime!(2025-01-01 00:00:00 UTC));
        let later = MinuteKey::from_instant(datetime!(2025-01-01 00:01:00 UTC));
        assert!(earlier < later);
    }

    #[test]
    fn active_api_key_validity_is_strict_inequality() {
        let now = datetime!(2025-01-01 00:20:00 UTC);
        let key = ActiveApiKey {
            key_hash: "hash".to_string(),
            account_id: AccountId(1),
            expires_at: now,
        };
        assert!(!key.is_valid_at(now), "expiration equal to now must not be valid");

        let key = ActiveApiKey {
            expires_at: now + time::Duration::nanoseconds(1),
            ..key
        };
        assert!(key.is_valid_at(now));
    }

    #[test]
    fn subscription_is_billable_only_on_its_estimated_end_day() {
        let sub = Subscription {
            id: SubscriptionId(1),
            account_id: AccountId(1),
            from: datetime!(2024-12-01 00:00:00 UTC),
            estimated_end: datetime!(2025-01-01 00:00:00 UTC),
        };
        assert!(sub.is_billable_on(datetime!(2025-01-01 00:00:00 UTC).date()));
        assert!(!sub.is_billable_on(datetime!(2025-01-02 00:00:00 UTC).date()));
    }
}
