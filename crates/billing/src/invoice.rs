//! Invoice computation and persistence (spec.md §4.4, §3 `Invoice`)
//!
//! Grounded in `original_source/invoice/model/invoice.go`'s `NewInvoice` for
//! the calculation shape, resolving the two-draft `taxAmount` ambiguity
//! (spec.md §9(b)) as `taxIncludedTotalPrice − totalPrice`, matching the
//! worked scenarios in spec.md §8 and `invoice_test.go`.

use num_bigint::BigInt;
use num_rational::BigRational;
use sqlx::PgPool;

use billing_shared::{AccountId, DailyApiUsage, SubscriptionId, TaxRate};

use crate::error::BillingResult;
use crate::price::{format_fixed, AccountPriceTable};

/// Exact-rational result of pricing one subscription's usage window. All
/// monetary fields are `BigRational` until persistence, when they are
/// rendered to fixed-point strings (spec.md §4.4).
#[derive(Debug, Clone)]
pub struct InvoiceCalculation {
    pub total_usage: u64,
    pub free_credit_discount: u64,
    pub subtotal: BigRational,
    pub total_price: BigRational,
    pub tax_rate: TaxRate,
    pub tax_amount: BigRational,
    pub tax_included_total_price: u64,
}

/// Compute an invoice for one subscription's daily usage rows against a
/// free-credit balance, a tax rate, and a price table.
///
/// Steps follow spec.md §4.4 verbatim:
/// 1. `total_usage = Σ usage`
/// 2. `free_credit_usage = min(balance, total_usage)`; `billable = total - free_credit_usage`
/// 3. `subtotal = billable × base_price_per_usage` (tiers are round-tripped, not applied — §9(a))
/// 4. `total_price = subtotal`
/// 5. `tax_included = floor(total_price × (tax_rate + 100) / 100)`
/// 6. `tax_amount = tax_included − total_price`
///
/// No floating point is used anywhere in this calculation; `BigRational`
/// carries exact values through to the final integer floor.
pub fn calculate_invoice(
    daily_usages: &[DailyApiUsage],
    free_credit_balance: u64,
    tax_rate: TaxRate,
    price_table: &AccountPriceTable,
) -> InvoiceCalculation {
    let total_usage: u64 = daily_usages.iter().map(|u| u.usage).sum();
    let free_credit_discount = free_credit_balance.min(total_usage);
    let billable_usage = total_usage.saturating_sub(free_credit_discount);

    let subtotal = BigRational::from_integer(BigInt::from(billable_usage)) * &price_table.base_price_per_usage;
    let total_price = subtotal.clone();

    let hundred = BigRational::from_integer(BigInt::from(100));
    let tax_multiplier =
        (BigRational::from_integer(BigInt::from(tax_rate.0)) + &hundred) / &hundred;
    let tax_included_rational = &total_price * &tax_multiplier;
    let tax_included_total_price = floor_to_u64(&tax_included_rational);

    let tax_amount = BigRational::from_integer(BigInt::from(tax_included_total_price)) - &total_price;

    InvoiceCalculation {
        total_usage,
        free_credit_discount,
        subtotal,
        total_price,
        tax_rate,
        tax_amount,
        tax_included_total_price,
    }
}

/// Exact-rational floor to a non-negative integer, as `BigRational::floor`
/// rather than via an `f64` round-trip (spec.md §4.4 only requires the float
/// conversion at this step; an exact integer floor is strictly more precise
/// and equally deterministic).
fn floor_to_u64(value: &BigRational) -> u64 {
    value
        .floor()
        .to_integer()
        .try_into()
        .unwrap_or(0)
}

/// Persist the computed invoice row (spec.md §3 `Invoice`, §6 `invoice` table).
pub async fn persist_invoice(
    pool: &PgPool,
    account_id: AccountId,
    subscription_id: SubscriptionId,
    calc: &InvoiceCalculation,
) -> BillingResult<()> {
    sqlx::query(
        r#"
        INSERT INTO invoice
            (account_id, subscription_id, total_usage, free_credit_discount,
             subtotal, tax_rate, tax_amount, total_price, tax_included_total_price)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(account_id.0 as i64)
    .bind(subscription_id.0 as i64)
    .bind(calc.total_usage as i64)
    .bind(calc.free_credit_discount as i64)
    .bind(format_fixed(&calc.subtotal, 5))
    .bind(calc.tax_rate.0 as i16)
    .bind(format_fixed(&calc.tax_amount, 5))
    .bind(format_fixed(&calc.total_price, 5))
    .bind(calc.tax_included_total_price as i64)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price::AccountPriceTableBuilder;
    use time::macros::date;

    fn usage(date: time::Date, usage: u64) -> DailyApiUsage {
        DailyApiUsage {
            account_id: AccountId(1),
            date,
            usage,
        }
    }

    fn default_price_table() -> AccountPriceTable {
        AccountPriceTableBuilder::new().build().unwrap()
    }

    /// spec.md §8 scenario 1.
    #[test]
    fn scenario_one_no_free_credit() {
        let usages = vec![usage(date!(2025-01-01), 10000), usage(date!(2025-01-02), 10000)];
        let calc = calculate_invoice(&usages, 0, TaxRate(10), &default_price_table());

        assert_eq!(calc.total_usage, 20000);
        assert_eq!(format_fixed(&calc.subtotal, 5), "20.00000");
        assert_eq!(calc.tax_included_total_price, 22);
        assert_eq!(format_fixed(&calc.tax_amount, 5), "2.00000");
    }

    /// spec.md §8 scenario 2.
    #[test]
    fn scenario_two_larger_usage() {
        let usages = vec![usage(date!(2025-01-01), 100000), usage(date!(2025-01-02), 100000)];
        let calc = calculate_invoice(&usages, 0, TaxRate(10), &default_price_table());

        assert_eq!(format_fixed(&calc.subtotal, 5), "200.00000");
        assert_eq!(calc.tax_included_total_price, 220);
        assert_eq!(format_fixed(&calc.tax_amount, 5), "20.00000");
    }

    /// spec.md §8 scenario 3: free credit smaller than total usage.
    #[test]
    fn scenario_three_free_credit_applied() {
        let usages = vec![
            usage(date!(2025-01-01), 100000),
            usage(date!(2025-01-01), 100000),
            usage(date!(2025-01-01), 100000),
        ];
        let calc = calculate_invoice(&usages, 100000, TaxRate(10), &default_price_table());

        assert_eq!(calc.total_usage, 300000);
        assert_eq!(calc.free_credit_discount, 100000);
        assert_eq!(format_fixed(&calc.subtotal, 5), "200.00000");
        assert_eq!(calc.tax_included_total_price, 220);
    }

    /// spec.md §8 scenario 4: irregular usage amounts.
    #[test]
    fn scenario_four_irregular_usage() {
        let usages = vec![usage(date!(2025-01-01), 123450), usage(date!(2025-01-02), 133333)];
        let calc = calculate_invoice(&usages, 0, TaxRate(10), &default_price_table());

        assert_eq!(format_fixed(&calc.subtotal, 5), "256.78300");
        assert_eq!(calc.tax_included_total_price, 282);
        assert_eq!(format_fixed(&calc.tax_amount, 5), "25.21700");
    }

    /// spec.md §8 boundary case: free credit exceeding total usage.
    #[test]
    fn free_credit_exceeding_usage_yields_zero_subtotal() {
        let usages = vec![usage(date!(2025-01-01), 100)];
        let calc = calculate_invoice(&usages, 1_000_000, TaxRate(10), &default_price_table());

        assert_eq!(calc.free_credit_discount, 100);
        assert_eq!(format_fixed(&calc.subtotal, 5), "0.00000");
        assert_eq!(calc.tax_included_total_price, 0);
    }

    #[test]
    fn idempotent_given_identical_inputs() {
        let usages = vec![usage(date!(2025-01-01), 123450), usage(date!(2025-01-02), 133333)];
        let a = calculate_invoice(&usages, 0, TaxRate(10), &default_price_table());
        let b = calculate_invoice(&usages, 0, TaxRate(10), &default_price_table());

        assert_eq!(a.subtotal, b.subtotal);
        assert_eq!(a.tax_amount, b.tax_amount);
        assert_eq!(a.tax_included_total_price, b.tax_included_total_price);
    }
}
