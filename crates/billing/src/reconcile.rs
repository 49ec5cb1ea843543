//! Usage reconciliation (spec.md §4.5 stage 2)
//!
//! spec.md frames the reconciler as an external collaborator: "given
//! `(baseDate, subscription)`, ensure `DailyApiUsage` rows covering
//! `[subscription.from, subscription.estimatedEnd]` are present and
//! consistent (source of truth is the columnar store under
//! `logs/YYYY/MM/DD/`)." `original_source/invoice/reconciler.go`'s
//! `UsageReconciler.Do` is an unimplemented stub (`// todo`) guarding an S3
//! client it never uses — this core resolves that stub (DESIGN.md Open
//! Questions) with a concrete `AggregateReconciler` that rolls
//! `EveryMinuteApiUsage` rows up into `DailyApiUsage`, since the minute
//! aggregate table is already the latency-optimized mirror of the columnar
//! partitions (spec.md §4.3).

use async_trait::async_trait;
use sqlx::PgPool;
use time::{Date, OffsetDateTime};

use billing_shared::AccountId;

use crate::error::BillingResult;

/// The stage-2 collaborator contract (spec.md §4.5): idempotent, logs and
/// continues on a per-subscription failure rather than aborting the run.
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(&self, base_date: Date, account_id: AccountId, from: OffsetDateTime, to: OffsetDateTime) -> BillingResult<()>;
}

/// Rolls up `every_minute_api_usage` rows into `daily_api_usage` rows for the
/// given account and window. Re-running over the same window is a no-op
/// beyond re-writing identical totals (idempotent, per spec.md §4.5).
pub struct AggregateReconciler {
    pool: PgPool,
}

impl AggregateReconciler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Reconciler for AggregateReconciler {
    async fn reconcile(&self, _base_date: Date, account_id: AccountId, from: OffsetDateTime, to: OffsetDateTime) -> BillingResult<()> {
        let from_key = format!("{:04}{:02}{:02}", from.year(), u8::from(from.month()), from.day());
        let to_key = format!("{:04}{:02}{:02}", to.year(), u8::from(to.month()), to.day());

        sqlx::query(
            r#"
            INSERT INTO daily_api_usage (account_id, date, usage)
            SELECT
                $1,
                to_date(substr(minute, 1, 8), 'YYYYMMDD'),
                SUM(usage)
            FROM every_minute_api_usage
            WHERE account_id = $1
              AND substr(minute, 1, 8) BETWEEN $2 AND $3
            GROUP BY to_date(substr(minute, 1, 8), 'YYYYMMDD')
            ON CONFLICT (account_id, date) DO UPDATE
                SET usage = EXCLUDED.usage
            "#,
        )
        .bind(account_id.0 as i64)
        .bind(&from_key)
        .bind(&to_key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
