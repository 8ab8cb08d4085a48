//! Human-readable invoice numbers.
//!
//! An invoice number is the period key followed by the zero-padded sequence
//! number allocated for that period: period `"2025"`, sequence `1` -> `"202500001"`.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Default zero-padding width of the sequence part.
pub const DEFAULT_NUMBER_WIDTH: usize = 5;

/// Formatted, unique invoice number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
    /// `period_key ++ zero_pad(sequence, width)`.
    ///
    /// A sequence wider than `width` is printed in full, never truncated.
    pub fn format(period_key: &str, sequence: u64, width: usize) -> Self {
        Self(format!("{period_key}{sequence:0>width$}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Period key used to scope invoice sequences: the calendar year of the invoice date.
pub fn period_key_for(invoice_date: NaiveDate) -> String {
    invoice_date.year().to_string()
}
