//! Daily Invoice Engine (C5, spec.md §4.5)
//!
//! `InvoiceEngine::create_invoice_daily` is the linear enumerate → reconcile
//! → compute → notify pipeline, grounded in
//! `original_source/invoice/invoice_maker.go`'s `InvoiceMaker.CreateInvoiceDaily`
//! (itself built on `gopipeline.New3`/`ForEach`/`Map`). The Rust translation
//! walks the subscription list directly rather than reaching for a generic
//! pipeline combinator library — `gopipeline` has no equivalent already in
//! this workspace's dependency surface, and the per-subscription fan-out is
//! simple enough that a `for` loop over `Vec<Subscription>` reads more
//! plainly than introducing one (see DESIGN.md).
//!
//! Per spec.md §4.5's failure policy: a failure enumerating subscriptions
//! (stage 1) is fatal for the run; a failure at any later stage for a single
//! subscription is logged and skipped, and the run continues.

use sqlx::PgPool;
use time::{Date, Duration, OffsetDateTime};
use tracing::{error, info, warn};

use billing_shared::{AccountId, BusClient, DailyApiUsage, Subscription, SubscriptionId, TaxRate};

use crate::error::{BillingError, BillingResult};
use crate::invoice::{calculate_invoice, persist_invoice};
use crate::price::AccountPriceTableBuilder;
use crate::reconcile::Reconciler;

/// Queue invoice-ready notifications land on (spec.md §4.5 stage 4); distinct
/// from the access-record queue (`ACCESS_RECORD_QUEUE`) the audit middleware
/// publishes to.
pub const INVOICE_NOTIFY_QUEUE: &str = "invoice_notify_queue";

pub struct InvoiceEngine {
    pool: PgPool,
    reconciler: Box<dyn Reconciler>,
    bus: Option<BusClient>,
    notify_queue: String,
    publish_max_retries: usize,
    default_tax_rate: TaxRate,
}

impl InvoiceEngine {
    pub fn new(
        pool: PgPool,
        reconciler: Box<dyn Reconciler>,
        bus: Option<BusClient>,
        notify_queue: impl Into<String>,
        publish_max_retries: usize,
        default_tax_rate: TaxRate,
    ) -> Self {
        Self {
            pool,
            reconciler,
            bus,
            notify_queue: notify_queue.into(),
            publish_max_retries,
            default_tax_rate,
        }
    }

    /// Entry point (spec.md §4.5). `now` is threaded in explicitly — nothing
    /// below this call reads wall-clock time — so a run is reproducible given
    /// a fixed `now`, matching `original_source/pkg/now`'s context-injectable
    /// clock.
    pub async fn create_invoice_daily(&self, now: OffsetDateTime) -> BillingResult<()> {
        let base_date = (now - Duration::days(1)).date();
        let cutoff = base_date;

        let subscriptions = self.list_billable_subscriptions(cutoff).await.map_err(|err| {
            error!(error = %err, "failed to enumerate billable subscriptions, aborting run");
            err
        })?;

        info!(count = subscriptions.len(), cutoff = %cutoff, "enumerated billable subscriptions");
        if subscriptions.is_empty() {
            return Ok(());
        }

        for subscription in subscriptions {
            if let Err(err) = self.process_subscription(base_date, &subscription).await {
                warn!(
                    subscription_id = %subscription.id,
                    account_id = %subscription.account_id,
                    error = %err,
                    "skipping subscription after stage failure"
                );
            }
        }

        Ok(())
    }

    async fn process_subscription(&self, base_date: Date, subscription: &Subscription) -> BillingResult<()> {
        self.reconciler
            .reconcile(base_date, subscription.account_id, subscription.from, subscription.estimated_end)
            .await
            .map_err(|err| BillingError::Reconcile {
                subscription_id: subscription.id.0,
                source: err.to_string(),
            })?;

        let calc = self.compute_invoice(subscription).await?;
        persist_invoice(&self.pool, subscription.account_id, subscription.id, &calc).await?;

        info!(
            subscription_id = %subscription.id,
            account_id = %subscription.account_id,
            total_usage = calc.total_usage,
            tax_included_total_price = calc.tax_included_total_price,
            "invoice created"
        );

        self.notify(subscription.account_id, subscription.id).await;

        Ok(())
    }

    async fn compute_invoice(&self, subscription: &Subscription) -> BillingResult<crate::invoice::InvoiceCalculation> {
        let price_table = self.load_price_table(subscription.account_id).await?;
        let free_credit = self.load_free_credit_balance(subscription.account_id).await?;
        let daily_usages = self
            .load_daily_usages(subscription.account_id, subscription.from.date(), subscription.estimated_end.date())
            .await?;

        Ok(calculate_invoice(&daily_usages, free_credit, self.default_tax_rate, &price_table))
    }

    /// spec.md §4.5 stage 1: subscriptions whose `estimatedEnd` falls on `cutoff`.
    async fn list_billable_subscriptions(&self, cutoff: Date) -> BillingResult<Vec<Subscription>> {
        let cutoff_start = cutoff.with_time(time::Time::MIDNIGHT).assume_utc();
        let cutoff_end = cutoff_start + Duration::days(1);

        let rows: Vec<(i64, i64, OffsetDateTime, OffsetDateTime)> = sqlx::query_as(
            r#"
            SELECT s.id, s.account_id, s."from", s.estimated_end
            FROM subscription s
            JOIN account a ON a.id = s.account_id
            WHERE s.estimated_end >= $1 AND s.estimated_end < $2
            "#,
        )
        .bind(cutoff_start)
        .bind(cutoff_end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, account_id, from, estimated_end)| Subscription {
                id: SubscriptionId::from(id),
                account_id: AccountId::from(account_id),
                from,
                estimated_end,
            })
            .collect())
    }

    async fn load_price_table(&self, account_id: AccountId) -> BillingResult<crate::price::AccountPriceTable> {
        let rows: Vec<(i64, Option<i64>, String)> = sqlx::query_as(
            r#"
            SELECT min_usage, max_usage, price_per_usage
            FROM account_price_table
            WHERE account_id = $1
            ORDER BY min_usage ASC
            "#,
        )
        .bind(account_id.0 as i64)
        .fetch_all(&self.pool)
        .await?;

        let base_row: Option<(String,)> = sqlx::query_as(
            "SELECT base_price_per_usage FROM account_price_table_base WHERE account_id = $1",
        )
        .bind(account_id.0 as i64)
        .fetch_optional(&self.pool)
        .await?;

        let mut builder = AccountPriceTableBuilder::new();
        if let Some((base,)) = base_row {
            builder = builder.base_price(base);
        }
        for (min_usage, max_usage, price_per_usage) in rows {
            builder = builder.tier(min_usage, max_usage, price_per_usage);
        }

        Ok(builder.build()?)
    }

    /// spec.md §3: "zero if none".
    async fn load_free_credit_balance(&self, account_id: AccountId) -> BillingResult<u64> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT balance
            FROM account_free_credit_balance_snapshot
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(account_id.0 as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(balance,)| balance as u64).unwrap_or(0))
    }

    async fn load_daily_usages(&self, account_id: AccountId, from: Date, to: Date) -> BillingResult<Vec<DailyApiUsage>> {
        let rows: Vec<(Date, i64)> = sqlx::query_as(
            r#"
            SELECT date, usage
            FROM daily_api_usage
            WHERE account_id = $1 AND date >= $2 AND date <= $3
            "#,
        )
        .bind(account_id.0 as i64)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(date, usage)| DailyApiUsage {
                account_id,
                date,
                usage: usage as u64,
            })
            .collect())
    }

    /// spec.md §4.5 stage 4: notify with the same retry policy as C2. A
    /// publish failure here is logged-and-skipped, matching the "soft skip"
    /// error taxonomy of spec.md §7 — a lost notification does not unwind
    /// the invoice that was already persisted.
    async fn notify(&self, account_id: AccountId, subscription_id: SubscriptionId) {
        let Some(bus) = &self.bus else {
            return;
        };

        let payload = serde_json::json!({
            "account_id": account_id.0,
            "subscription_id": subscription_id.0,
        });
        let Ok(body) = serde_json::to_vec(&payload) else {
            error!("failed to marshal invoice notification payload");
            return;
        };

        let timestamp_ms = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        if let Err(err) = bus
            .publish_with_retry(&self.notify_queue, &body, timestamp_ms, self.publish_max_retries)
            .await
        {
            error!(error = %err, account_id = %account_id, subscription_id = %subscription_id, "failed to publish invoice notification after retries");
        }
    }
}
