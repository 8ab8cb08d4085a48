//! Invoice-level totals.
//!
//! Totals are the sums of already-rounded line fields, accumulated in line
//! order. Rounding a sum of unrounded amounts can differ by cents, so the
//! per-line rounding in [`crate::calculator`] is what the header reflects.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use billforge_core::{ValueObject, round_money};

use crate::calculator::ComputedLine;

/// Header totals of an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    /// Σ `line_subtotal`.
    pub subtotal: Decimal,
    /// Σ `discount_amount`.
    pub discount_total: Decimal,
    /// Σ `tax_amount`.
    pub tax_total: Decimal,
    /// Σ `line_total_with_tax`.
    pub total: Decimal,
}

impl ValueObject for InvoiceTotals {}

impl InvoiceTotals {
    pub fn zero() -> Self {
        Self {
            subtotal: Decimal::ZERO,
            discount_total: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }
}

impl Default for InvoiceTotals {
    fn default() -> Self {
        Self::zero()
    }
}

/// Sum line fields into invoice totals.
pub fn aggregate<'a, I>(lines: I) -> InvoiceTotals
where
    I: IntoIterator<Item = &'a ComputedLine>,
{
    lines
        .into_iter()
        .fold(InvoiceTotals::zero(), |acc, line| InvoiceTotals {
            subtotal: round_money(acc.subtotal + line.line_subtotal),
            discount_total: round_money(acc.discount_total + line.discount_amount),
            tax_total: round_money(acc.tax_total + line.tax_amount),
            total: round_money(acc.total + line.line_total_with_tax),
        })
}
