//! Per-line monetary breakdown.
//!
//! Two tax conventions are supported, selected per product:
//!
//! - **Exclusive**: discount and tax are applied to the net amount.
//! - **Inclusive**: the discount is taken off the gross amount first, then the
//!   discounted gross figure is split back into net + tax.
//!
//! Every monetary field is rounded once, when it is produced, so that
//! `line_total_with_tax == line_total + tax_amount` holds exactly.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use billforge_core::{DomainError, DomainResult, ValueObject, percent_of, round_money};
use billforge_products::TaxMode;

/// Monetary breakdown of a single invoice line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedLine {
    pub quantity: Decimal,
    /// Catalog price as stored: net for exclusive lines, gross for inclusive lines.
    pub unit_price: Decimal,
    pub discount_rate_percent: Decimal,
    pub discount_amount: Decimal,
    /// Exclusive: net amount before discount. Inclusive: net amount after discount.
    pub line_subtotal: Decimal,
    /// Net amount after discount.
    pub line_total: Decimal,
    pub tax_rate_percent: Decimal,
    pub tax_amount: Decimal,
    pub line_total_with_tax: Decimal,
    pub tax_mode: TaxMode,
}

impl ValueObject for ComputedLine {}

/// Reject inputs outside the calculator's domain.
///
/// [`compute_line`] itself never fails; callers validate first.
pub fn validate_line_amounts(
    quantity: Decimal,
    unit_price: Decimal,
    tax_rate_percent: Decimal,
    discount_rate_percent: Decimal,
) -> DomainResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::validation("line quantity must be positive"));
    }
    if unit_price < Decimal::ZERO {
        return Err(DomainError::validation("line unit price must not be negative"));
    }
    if tax_rate_percent < Decimal::ZERO {
        return Err(DomainError::validation("line tax rate must not be negative"));
    }
    if discount_rate_percent < Decimal::ZERO || discount_rate_percent > Decimal::ONE_HUNDRED {
        return Err(DomainError::validation(
            "line discount rate must be between 0 and 100",
        ));
    }
    // Largest intermediate product is amount × (100 + tax rate).
    Decimal::ONE_HUNDRED
        .checked_add(tax_rate_percent)
        .and_then(|factor| quantity.checked_mul(unit_price)?.checked_mul(factor))
        .ok_or_else(|| DomainError::validation("line amount out of range"))?;
    Ok(())
}

/// Compute the monetary breakdown of one line.
///
/// Pure and deterministic: identical inputs always yield an identical result.
pub fn compute_line(
    quantity: Decimal,
    unit_price: Decimal,
    tax_rate_percent: Decimal,
    discount_rate_percent: Decimal,
    tax_mode: TaxMode,
) -> ComputedLine {
    // Net amount for exclusive lines, gross amount for inclusive lines.
    let base = round_money(quantity * unit_price);
    let discount_amount = if discount_rate_percent.is_zero() {
        Decimal::ZERO
    } else {
        percent_of(base, discount_rate_percent)
    };
    let after_discount = base - discount_amount;

    let (line_subtotal, line_total) = match tax_mode {
        TaxMode::Exclusive => (base, after_discount),
        TaxMode::Inclusive => {
            let divisor = Decimal::ONE + tax_rate_percent / Decimal::ONE_HUNDRED;
            let net = round_money(after_discount / divisor);
            (net, net)
        }
    };

    let tax_amount = percent_of(line_total, tax_rate_percent);

    ComputedLine {
        quantity,
        unit_price,
        discount_rate_percent,
        discount_amount,
        line_subtotal,
        line_total,
        tax_rate_percent,
        tax_amount,
        line_total_with_tax: line_total + tax_amount,
        tax_mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn exclusive_without_discount() {
        let line = compute_line(dec!(4), dec!(600), dec!(20), dec!(0), TaxMode::Exclusive);
        assert_eq!(line.line_subtotal, dec!(2400));
        assert_eq!(line.discount_amount, dec!(0));
        assert_eq!(line.line_total, dec!(2400));
        assert_eq!(line.tax_amount, dec!(480));
        assert_eq!(line.line_total_with_tax, dec!(2880));
        assert_eq!(line.unit_price, dec!(600));
    }

    #[test]
    fn exclusive_with_discount() {
        let line = compute_line(dec!(2), dec!(100), dec!(20), dec!(10), TaxMode::Exclusive);
        assert_eq!(line.line_subtotal, dec!(200));
        assert_eq!(line.discount_amount, dec!(20));
        assert_eq!(line.line_total, dec!(180));
        assert_eq!(line.tax_amount, dec!(36));
        assert_eq!(line.line_total_with_tax, dec!(216));
    }

    #[test]
    fn tax_exempt_line() {
        let line = compute_line(dec!(3), dec!(50), dec!(0), dec!(0), TaxMode::Exclusive);
        assert_eq!(line.line_subtotal, dec!(150));
        assert_eq!(line.tax_amount, dec!(0));
        assert_eq!(line.line_total_with_tax, dec!(150));
    }

    #[test]
    fn inclusive_without_discount() {
        let line = compute_line(dec!(2), dec!(120), dec!(20), dec!(0), TaxMode::Inclusive);
        assert_eq!(line.line_subtotal, dec!(200));
        assert_eq!(line.line_total, dec!(200));
        assert_eq!(line.tax_amount, dec!(40));
        assert_eq!(line.line_total_with_tax, dec!(240));
        // Gross price is stored as given.
        assert_eq!(line.unit_price, dec!(120));
    }

    #[test]
    fn inclusive_with_discount_discounts_the_gross_amount() {
        let line = compute_line(dec!(2), dec!(120), dec!(20), dec!(10), TaxMode::Inclusive);
        assert_eq!(line.discount_amount, dec!(24));
        assert_eq!(line.line_subtotal, dec!(180));
        assert_eq!(line.line_total, dec!(180));
        assert_eq!(line.tax_amount, dec!(36));
        assert_eq!(line.line_total_with_tax, dec!(216));
    }

    #[test]
    fn zero_tax_rate_makes_modes_agree() {
        let excl = compute_line(dec!(3), dec!(19.99), dec!(0), dec!(0), TaxMode::Exclusive);
        let incl = compute_line(dec!(3), dec!(19.99), dec!(0), dec!(0), TaxMode::Inclusive);
        assert_eq!(excl.line_subtotal, incl.line_subtotal);
        assert_eq!(excl.line_total, incl.line_total);
        assert_eq!(excl.tax_amount, incl.tax_amount);
        assert_eq!(excl.line_total_with_tax, incl.line_total_with_tax);

        // With a discount only the meaning of `line_subtotal` differs.
        let excl = compute_line(dec!(3), dec!(19.99), dec!(0), dec!(15), TaxMode::Exclusive);
        let incl = compute_line(dec!(3), dec!(19.99), dec!(0), dec!(15), TaxMode::Inclusive);
        assert_eq!(excl.discount_amount, incl.discount_amount);
        assert_eq!(excl.line_total, incl.line_total);
        assert_eq!(excl.line_total_with_tax, incl.line_total_with_tax);
    }

    #[test]
    fn half_cent_rounds_away_from_zero() {
        // 3 × 0.335 = 1.005 -> 1.01
        let line = compute_line(dec!(3), dec!(0.335), dec!(0), dec!(0), TaxMode::Exclusive);
        assert_eq!(line.line_subtotal, dec!(1.01));
    }

    #[test]
    fn inclusive_split_rounds_net_then_tax() {
        // 100 / 1.07 = 93.457... -> 93.46, tax 93.46 × 7% = 6.5422 -> 6.54
        let line = compute_line(dec!(1), dec!(100), dec!(7), dec!(0), TaxMode::Inclusive);
        assert_eq!(line.line_total, dec!(93.46));
        assert_eq!(line.tax_amount, dec!(6.54));
        assert_eq!(line.line_total_with_tax, dec!(100.00));
    }

    #[test]
    fn inclusive_split_can_lose_a_cent_of_gross() {
        // 1.01 / 1.21 = 0.8347... -> 0.83, tax 0.83 × 21% = 0.1743 -> 0.17
        let line = compute_line(dec!(1), dec!(1.01), dec!(21), dec!(0), TaxMode::Inclusive);
        assert_eq!(line.line_subtotal, dec!(0.83));
        assert_eq!(line.line_total, dec!(0.83));
        assert_eq!(line.tax_amount, dec!(0.17));
        assert_eq!(line.line_total_with_tax, dec!(1.00));
    }

    #[test]
    fn validation_rejects_out_of_range_inputs() {
        assert!(validate_line_amounts(dec!(0), dec!(1), dec!(0), dec!(0)).is_err());
        assert!(validate_line_amounts(dec!(-1), dec!(1), dec!(0), dec!(0)).is_err());
        assert!(validate_line_amounts(dec!(1), dec!(-0.01), dec!(0), dec!(0)).is_err());
        assert!(validate_line_amounts(dec!(1), dec!(1), dec!(-1), dec!(0)).is_err());
        assert!(validate_line_amounts(dec!(1), dec!(1), dec!(0), dec!(100.01)).is_err());
        assert!(validate_line_amounts(dec!(1), dec!(1), dec!(0), dec!(-0.5)).is_err());
        assert!(validate_line_amounts(dec!(1), dec!(1), dec!(0), dec!(100)).is_ok());
        assert!(validate_line_amounts(dec!(0.5), dec!(0), dec!(0), dec!(0)).is_ok());
    }

    #[test]
    fn amounts_out_of_range_are_rejected() {
        let err = validate_line_amounts(Decimal::MAX, Decimal::MAX, dec!(0), dec!(0)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        // Fits on its own, but not once tax is applied.
        let big = Decimal::MAX / dec!(10);
        assert!(validate_line_amounts(dec!(1), big, dec!(0), dec!(0)).is_err());
        assert!(validate_line_amounts(dec!(1), dec!(1000), dec!(20), dec!(0)).is_ok());
    }

    fn amount() -> impl Strategy<Value = Decimal> {
        (0i64..10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
    }

    fn quantity() -> impl Strategy<Value = Decimal> {
        (1i64..100_000i64).prop_map(|milli| Decimal::new(milli, 3))
    }

    fn rate() -> impl Strategy<Value = Decimal> {
        (0i64..=10_000i64).prop_map(|basis| Decimal::new(basis, 2))
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 1000,
            ..ProptestConfig::default()
        })]

        /// Property: exclusive lines add up field by field.
        #[test]
        fn exclusive_lines_are_consistent(
            q in quantity(),
            p in amount(),
            t in rate(),
            d in rate(),
        ) {
            let line = compute_line(q, p, t, d, TaxMode::Exclusive);
            prop_assert_eq!(line.line_total_with_tax, line.line_total + line.tax_amount);
            prop_assert_eq!(line.line_total, line.line_subtotal - line.discount_amount);
            prop_assert_eq!(line.line_subtotal, round_money(q * p));
            prop_assert_eq!(line.tax_amount, percent_of(line.line_total, t));
        }

        /// Property: inclusive lines preserve the discounted gross amount to the cent.
        #[test]
        fn inclusive_lines_preserve_gross(
            q in quantity(),
            p in amount(),
            t in rate(),
            d in rate(),
        ) {
            let line = compute_line(q, p, t, d, TaxMode::Inclusive);
            let gross = round_money(q * p);
            let expected = gross - percent_of(gross, d);
            prop_assert!((line.line_total_with_tax - expected).abs() <= dec!(0.01));
            prop_assert_eq!(line.line_total_with_tax, line.line_total + line.tax_amount);
            prop_assert_eq!(line.line_subtotal, line.line_total);
            prop_assert_eq!(line.tax_amount, percent_of(line.line_total, t));
        }

        /// Property: the calculator has no hidden state.
        #[test]
        fn compute_line_is_deterministic(
            q in quantity(),
            p in amount(),
            t in rate(),
            d in rate(),
            inclusive in any::<bool>(),
        ) {
            let mode = if inclusive { TaxMode::Inclusive } else { TaxMode::Exclusive };
            let first = compute_line(q, p, t, d, mode);
            let second = compute_line(q, p, t, d, mode);
            prop_assert_eq!(first, second);
        }
    }
}
