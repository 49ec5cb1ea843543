//! Price Model (SPEC_FULL.md / spec.md §4.4)
//!
//! Tariff representation and exact-rational invoice calculation, grounded in
//! `original_source/invoice/model/invoice.go`'s `PriceTable`/`PriceTableItem`
//! and resolved per spec.md §9(a): tier rows are parsed, validated, and kept
//! on the table for round-trip, but only `base_price_per_usage` is applied
//! during calculation — tiered pricing is a declared extension point, not
//! silently dropped.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::Signed;

use crate::error::{BillingError, BillingResult};

/// A non-overlapping usage tier. `max_usage = None` is the "unbounded"
/// sentinel for the table's last tier (spec.md §3).
#[derive(Debug, Clone)]
pub struct PriceTier {
    pub min_usage: i64,
    pub max_usage: Option<i64>,
    pub price_per_usage: BigRational,
}

/// Per-account tariff: a flat base price plus round-tripped (not yet applied)
/// tier rows.
#[derive(Debug, Clone)]
pub struct AccountPriceTable {
    pub base_price_per_usage: BigRational,
    pub tiers: Vec<PriceTier>,
}

/// Default base price per usage unit, matching `original_source`'s
/// commented default and spec.md §4.4.
pub const DEFAULT_BASE_PRICE_LITERAL: &str = "0.001";

/// Parse a decimal literal (e.g. `"0.001"`, `"-12"`, `"3.5"`) into an exact
/// `BigRational`. This core accepts only decimal literals, not the full
/// infix-expression grammar of the out-of-scope rational expression parser
/// (spec.md §1).
pub fn parse_decimal(literal: &str) -> BillingResult<BigRational> {
    let literal = literal.trim();
    let negative = literal.starts_with('-');
    let unsigned = literal.trim_start_matches(['+', '-']);

    let mut parts = unsigned.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(BillingError::InvalidPriceTable(format!(
            "empty decimal literal: {literal:?}"
        )));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(BillingError::InvalidPriceTable(format!(
            "invalid decimal literal: {literal:?}"
        )));
    }

    let int_value: BigInt = if int_part.is_empty() {
        BigInt::from(0)
    } else {
        int_part
            .parse()
            .map_err(|_| BillingError::InvalidPriceTable(format!("invalid decimal literal: {literal:?}")))?
    };
    let frac_value: BigInt = if frac_part.is_empty() {
        BigInt::from(0)
    } else {
        frac_part
            .parse()
            .map_err(|_| BillingError::InvalidPriceTable(format!("invalid decimal literal: {literal:?}")))?
    };

    let denom = BigInt::from(10u32).pow(frac_part.len() as u32);
    let numer = int_value * &denom + frac_value;
    let mut rational = BigRational::new(numer, denom);
    if negative {
        rational = -rational;
    }
    Ok(rational)
}

/// Render a `BigRational` as a fixed-point decimal string with exactly
/// `decimals` fractional digits, rounding half-away-from-zero on any
/// further precision — matching Go's `big.Rat.FloatString`, which rounds
/// to nearest (ties away from zero), not truncates.
pub fn format_fixed(value: &BigRational, decimals: u32) -> String {
    let sign = if value.is_negative() { "-" } else { "" };
    let abs = value.abs();
    let scale = BigInt::from(10u32).pow(decimals);
    let numer = abs.numer() * &scale;
    let denom = abs.denom();
    let quotient = &numer / denom;
    let remainder = &numer % denom;
    let scaled = if &remainder * 2 >= *denom { quotient + 1 } else { quotient };
    let digits = scaled.to_str_radix(10);
    let padded = format!("{digits:0>width$}", width = decimals as usize + 1);
    let split_at = padded.len() - decimals as usize;
    format!("{sign}{}.{}", &padded[..split_at], &padded[split_at..])
}

/// Collects tier rows and the base price, accumulating every parse error
/// before failing the whole table (spec.md §4.4: "The builder collects
/// errors and fails the whole table if any tier's price string fails to
/// parse").
#[derive(Debug, Default)]
pub struct AccountPriceTableBuilder {
    base_price_literal: Option<String>,
    tier_rows: Vec<(i64, Option<i64>, String)>,
}

impl AccountPriceTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_price(mut self, literal: impl Into<String>) -> Self {
        self.base_price_literal = Some(literal.into());
        self
    }

    pub fn tier(mut self, min_usage: i64, max_usage: Option<i64>, price_literal: impl Into<String>) -> Self {
        self.tier_rows.push((min_usage, max_usage, price_literal.into()));
        self
    }

    pub fn build(self) -> BillingResult<AccountPriceTable> {
        let mut errors = Vec::new();

        let base_price_per_usage = match self.base_price_literal {
            Some(literal) => match parse_decimal(&literal) {
                Ok(rational) => Some(rational),
                Err(err) => {
                    errors.push(err.to_string());
                    None
                }
            },
            None => Some(parse_decimal(DEFAULT_BASE_PRICE_LITERAL).expect("default base price literal is valid")),
        };

        let mut tiers = Vec::with_capacity(self.tier_rows.len());
        for (min_usage, max_usage, literal) in self.tier_rows {
            match parse_decimal(&literal) {
                Ok(price_per_usage) => tiers.push(PriceTier {
                    min_usage,
                    max_usage,
                    price_per_usage,
                }),
                Err(err) => errors.push(format!("tier [{min_usage}, {max_usage:?}]: {err}")),
            }
        }

        if !errors.is_empty() {
            return Err(BillingError::InvalidPriceTable(errors.join("; ")));
        }

        tiers.sort_by_key(|t| t.min_usage);
        validate_tiers(&tiers)?;

        Ok(AccountPriceTable {
            base_price_per_usage: base_price_per_usage.expect("collected above or defaulted"),
            tiers,
        })
    }
}

fn validate_tiers(tiers: &[PriceTier]) -> BillingResult<()> {
    for pair in tiers.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let a_max = a.max_usage.unwrap_or(i64::MAX);
        if a_max >= b.min_usage {
            return Err(BillingError::InvalidPriceTable(format!(
                "overlapping tiers: [{}, {:?}] and [{}, {:?}]",
                a.min_usage, a.max_usage, b.min_usage, b.max_usage
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_decimal() {
        let r = parse_decimal("0.001").unwrap();
        assert_eq!(r, BigRational::new(BigInt::from(1), BigInt::from(1000)));
    }

    #[test]
    fn parses_integer_literal() {
        let r = parse_decimal("10").unwrap();
        assert_eq!(r, BigRational::from_integer(BigInt::from(10)));
    }

    #[test]
    fn parses_negative_decimal() {
        let r = parse_decimal("-0.5").unwrap();
        assert_eq!(r, BigRational::new(BigInt::from(-1), BigInt::from(2)));
    }

    #[test]
    fn rejects_garbage_literal() {
        assert!(parse_decimal("abc").is_err());
        assert!(parse_decimal("").is_err());
        assert!(parse_decimal("1.2.3").is_err());
    }

    #[test]
    fn format_fixed_renders_five_digits() {
        let r = parse_decimal("20").unwrap();
        assert_eq!(format_fixed(&r, 5), "20.00000");

        let r = parse_decimal("256.783").unwrap();
        assert_eq!(format_fixed(&r, 5), "256.78300");
    }

    #[test]
    fn format_fixed_rounds_half_away_from_zero_beyond_the_requested_digits() {
        let r = parse_decimal("0.000005").unwrap();
        assert_eq!(format_fixed(&r, 5), "0.00001");

        let r = parse_decimal("0.0000049").unwrap();
        assert_eq!(format_fixed(&r, 5), "0.00000");

        let r = parse_decimal("-0.000005").unwrap();
        assert_eq!(format_fixed(&r, 5), "-0.00001");
    }

    #[test]
    fn builder_defaults_base_price_and_accepts_no_tiers() {
        let table = AccountPriceTableBuilder::new().build().unwrap();
        assert_eq!(table.base_price_per_usage, parse_decimal("0.001").unwrap());
        assert!(table.tiers.is_empty());
    }

    #[test]
    fn builder_collects_all_tier_parse_errors_before_failing() {
        let err = AccountPriceTableBuilder::new()
            .tier(0, Some(999), "bad-one")
            .tier(1000, None, "bad-two")
            .build()
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("bad-one") || message.contains("[0, Some(999)]"));
        assert!(message.contains("bad-two") || message.contains("[1000, None]"));
    }

    #[test]
    fn builder_rejects_overlapping_tiers() {
        let err = AccountPriceTableBuilder::new()
            .tier(0, Some(1000), "0.001")
            .tier(500, Some(2000), "0.0005")
            .build()
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidPriceTable(_)));
    }

    #[test]
    fn builder_accepts_sorted_non_overlapping_tiers_with_unbounded_last() {
        let table = AccountPriceTableBuilder::new()
            .tier(1000, Some(1999), "0.0009")
            .tier(0, Some(999), "0.001")
            .tier(2000, None, "0.0008")
            .build()
            .unwrap();
        assert_eq!(table.tiers[0].min_usage, 0);
        assert_eq!(table.tiers[2].max_usage, None);
    }
}
