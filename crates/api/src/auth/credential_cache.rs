//! Credential Cache (SPEC_FULL.md §4.1)
//!
//! Maps an opaque API key to an account identifier with time-bounded
//! caching, grounded in the teacher's `routing::cache::DomainCache`
//! read-write-lock-over-hashmap shape. The lookup algorithm and the
//! cache-admission predicate are this core's own, per spec.md §4.1.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use billing_shared::{AccountId, SharedResult};
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
struct CacheEntry {
    account_id: AccountId,
    /// Wall-clock instant (not monotonic `Instant`) this entry expires from
    /// the cache; distinct from the credential's own `expires_at` in Postgres.
    cached_until: OffsetDateTime,
}

/// Thread-safe in-memory credential cache.
pub struct CredentialCache {
    cache: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl CredentialCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    /// C1 contract: `check(apiKey) -> accountId | Unauthorized`.
    pub async fn check(&self, pool: &PgPool, api_key: &str, now: OffsetDateTime) -> ApiResult<AccountId> {
        let key_hash = billing_shared::credential::hash_key(api_key);

        if let Some(account_id) = self.get(&key_hash, now) {
            return Ok(account_id);
        }

        let row = self
            .load_active_key(pool, &key_hash, now)
            .await
            .map_err(ApiError::from)?;

        let (account_id, expires_at) = row.ok_or(ApiError::Unauthorized)?;

        // Cache admission predicate (spec.md §4.1 step 4): only cache if the
        // credential still outlives the cache TTL — otherwise the cache could
        // serve a revoked/expired key for up to one TTL past expiration.
        let cache_ttl = time::Duration::seconds(self.ttl.as_secs() as i64);
        if now + cache_ttl < expires_at {
            self.set(key_hash, account_id, now);
        }

        Ok(account_id)
    }

    async fn load_active_key(
        &self,
        pool: &PgPool,
        key_hash: &str,
        now: OffsetDateTime,
    ) -> SharedResult<Option<(AccountId, OffsetDateTime)>> {
        let row: Option<(i64, OffsetDateTime)> = sqlx::query_as(
            r#"
            SELECT account_id, expires_at
            FROM active_api_keys
            WHERE key_hash = $1 AND expires_at > $2
            "#,
        )
        .bind(key_hash)
        .bind(now)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|(account_id, expires_at)| (AccountId::from(account_id), expires_at)))
    }

    fn get(&self, key_hash: &str, now: OffsetDateTime) -> Option<AccountId> {
        let cache = self.cache.read().ok()?;
        let entry = cache.get(key_hash)?;
        if entry.cached_until <= now {
            None
        } else {
            Some(entry.account_id)
        }
    }

    fn set(&self, key_hash: String, account_id: AccountId, now: OffsetDateTime) {
        let Ok(mut cache) = self.cache.write() else {
            return;
        };
        if cache.len() >= self.max_entries && !cache.contains_key(&key_hash) {
            // Evict one expired entry if possible; otherwise skip admission
            // rather than grow unbounded.
            let expired_key = cache
                .iter()
                .find(|(_, entry)| entry.cached_until <= now)
                .map(|(k, _)| k.clone());
            match expired_key {
                Some(k) => {
                    cache.remove(&k);
                }
                None => return,
            }
        }
        let cache_ttl = time::Duration::seconds(self.ttl.as_secs() as i64);
        cache.insert(
            key_hash,
            CacheEntry {
                account_id,
                cached_until: now + cache_ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn get_returns_none_when_absent() {
        let cache = CredentialCache::new(Duration::from_secs(300), 10);
        assert!(cache.get("nope", datetime!(2025-01-01 00:00:00 UTC)).is_none());
    }

    #[test]
    fn set_then_get_within_ttl_hits() {
        let cache = CredentialCache::new(Duration::from_secs(300), 10);
        let now = datetime!(2025-01-01 00:00:00 UTC);
        cache.set("hash".to_string(), AccountId(7), now);
        assert_eq!(cache.get("hash", now + time::Duration::seconds(100)), Some(AccountId(7)));
    }

    #[test]
    fn entry_expires_after_ttl() {
        let cache = CredentialCache::new(Duration::from_secs(300), 10);
        let now = datetime!(2025-01-01 00:00:00 UTC);
        cache.set("hash".to_string(), AccountId(7), now);
        assert!(cache.get("hash", now + time::Duration::seconds(301)).is_none());
    }
}
