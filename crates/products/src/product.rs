use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use billforge_core::{AggregateId, DomainError, DomainResult, ValueObject};

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// How a catalog price relates to tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaxMode {
    /// Price excludes tax; tax is added on top.
    #[default]
    Exclusive,
    /// Price already includes tax; tax is extracted from the gross amount.
    Inclusive,
}

/// Pricing attributes of a product, frozen at calculation time.
///
/// Copied onto invoice lines so later catalog price changes never alter
/// historical invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPricingSnapshot {
    pub product_id: ProductId,
    pub sku: String,
    pub display_name: String,
    /// Net price for [`TaxMode::Exclusive`], gross price for [`TaxMode::Inclusive`].
    pub unit_price: Decimal,
    pub tax_rate_percent: Decimal,
    pub tax_mode: TaxMode,
}

impl ValueObject for ProductPricingSnapshot {}

impl ProductPricingSnapshot {
    pub fn new(
        product_id: ProductId,
        sku: impl Into<String>,
        display_name: impl Into<String>,
        unit_price: Decimal,
        tax_rate_percent: Decimal,
        tax_mode: TaxMode,
    ) -> DomainResult<Self> {
        let snapshot = Self {
            product_id,
            sku: sku.into(),
            display_name: display_name.into(),
            unit_price,
            tax_rate_percent,
            tax_mode,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check the snapshot's own invariants (non-negative price and tax rate).
    ///
    /// Collaborators may build snapshots with struct literals, so the
    /// assembler re-checks every snapshot it receives.
    pub fn validate(&self) -> DomainResult<()> {
        if self.unit_price < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "product {} has a negative unit price",
                self.product_id
            )));
        }
        if self.tax_rate_percent < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "product {} has a negative tax rate",
                self.product_id
            )));
        }
        Ok(())
    }
}
