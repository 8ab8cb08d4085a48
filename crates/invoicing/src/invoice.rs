use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use billforge_core::{
    AggregateId, AggregateRoot, ChannelId, CompanyId, CustomerId, DomainError, DomainResult,
    RepresentativeId,
};
use billforge_products::{ProductId, ProductPricingSnapshot, TaxMode};

use crate::aggregator::{InvoiceTotals, aggregate};
use crate::calculator::{ComputedLine, compute_line, validate_line_amounts};
use crate::numbering::{InvoiceNumber, period_key_for};

/// Invoice identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

fn in_line(line_no: u32, err: DomainError) -> DomainError {
    match err {
        DomainError::Validation(msg) => DomainError::Validation(format!("line {line_no}: {msg}")),
        DomainError::InvariantViolation(msg) => {
            DomainError::InvariantViolation(format!("line {line_no}: {msg}"))
        }
        other => other,
    }
}

/// Requested invoice line: a catalog product or a free-text line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub product_id: Option<ProductId>,
    pub quantity: Decimal,
    #[serde(default)]
    pub discount_rate_percent: Decimal,
    #[serde(default)]
    pub custom_description: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    /// Manual unit price, only for free-text lines.
    #[serde(default)]
    pub unit_price_override: Option<Decimal>,
}

impl LineInput {
    pub fn catalog(product_id: ProductId, quantity: Decimal) -> Self {
        Self {
            product_id: Some(product_id),
            quantity,
            discount_rate_percent: Decimal::ZERO,
            custom_description: None,
            note: None,
            unit_price_override: None,
        }
    }

    pub fn free_text(description: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            product_id: None,
            quantity,
            discount_rate_percent: Decimal::ZERO,
            custom_description: Some(description.into()),
            note: None,
            unit_price_override: None,
        }
    }

    pub fn with_discount(mut self, discount_rate_percent: Decimal) -> Self {
        self.discount_rate_percent = discount_rate_percent;
        self
    }

    pub fn with_unit_price(mut self, unit_price: Decimal) -> Self {
        self.unit_price_override = Some(unit_price);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.custom_description = Some(description.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    fn description(&self) -> Option<&str> {
        self.custom_description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    /// Invariant: a line must describe itself or reference a catalog item.
    pub fn validate(&self, line_no: u32) -> DomainResult<()> {
        if self.product_id.is_none() && self.description().is_none() {
            return Err(DomainError::validation(format!(
                "line {line_no}: a free-text line requires a description"
            )));
        }
        if self.product_id.is_some() && self.unit_price_override.is_some() {
            return Err(DomainError::validation(format!(
                "line {line_no}: unit price override is only allowed on free-text lines"
            )));
        }
        validate_line_amounts(
            self.quantity,
            self.unit_price_override.unwrap_or(Decimal::ZERO),
            Decimal::ZERO,
            self.discount_rate_percent,
        )
        .map_err(|e| in_line(line_no, e))
    }
}

/// Line as stored on an invoice: descriptive snapshot + monetary breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_no: u32,
    pub product_id: Option<ProductId>,
    pub sku: Option<String>,
    pub description: String,
    pub note: Option<String>,
    pub amounts: ComputedLine,
}

impl InvoiceLine {
    /// Price a requested line against its (optional) catalog snapshot.
    ///
    /// Catalog lines require the snapshot of their product; a missing snapshot
    /// is reported as `NotFound`. Free-text lines are priced at their manual
    /// unit price (or zero), tax-free.
    pub fn price(
        line_no: u32,
        input: &LineInput,
        snapshot: Option<&ProductPricingSnapshot>,
    ) -> DomainResult<Self> {
        input.validate(line_no)?;

        match (input.product_id, snapshot) {
            (Some(product_id), Some(snapshot)) => {
                if snapshot.product_id != product_id {
                    return Err(DomainError::invariant(format!(
                        "line {line_no}: snapshot for product {} given for product {product_id}",
                        snapshot.product_id
                    )));
                }
                snapshot.validate().map_err(|e| in_line(line_no, e))?;
                validate_line_amounts(
                    input.quantity,
                    snapshot.unit_price,
                    snapshot.tax_rate_percent,
                    input.discount_rate_percent,
                )
                .map_err(|e| in_line(line_no, e))?;

                let amounts = compute_line(
                    input.quantity,
                    snapshot.unit_price,
                    snapshot.tax_rate_percent,
                    input.discount_rate_percent,
                    snapshot.tax_mode,
                );
                Ok(Self {
                    line_no,
                    product_id: Some(product_id),
                    sku: Some(snapshot.sku.clone()),
                    description: input
                        .description()
                        .unwrap_or(snapshot.display_name.as_str())
                        .to_string(),
                    note: input.note.clone(),
                    amounts,
                })
            }
            (Some(product_id), None) => Err(DomainError::not_found(format!(
                "line {line_no}: product {product_id}"
            ))),
            (None, _) => {
                let amounts = compute_line(
                    input.quantity,
                    input.unit_price_override.unwrap_or(Decimal::ZERO),
                    Decimal::ZERO,
                    input.discount_rate_percent,
                    TaxMode::Exclusive,
                );
                Ok(Self {
                    line_no,
                    product_id: None,
                    sku: None,
                    description: input.description().unwrap_or_default().to_string(),
                    note: input.note.clone(),
                    amounts,
                })
            }
        }
    }
}

/// Header fields of an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceHeader {
    pub company_id: CompanyId,
    pub customer_id: Option<CustomerId>,
    pub channel_id: Option<ChannelId>,
    pub representative_id: Option<RepresentativeId>,
    pub invoice_date: NaiveDate,
    /// ISO 4217 code, upper case.
    pub currency_code: String,
    /// Carried as-is; no conversion is performed.
    pub exchange_rate: Decimal,
}

/// Command: CreateInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub company_id: CompanyId,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    #[serde(default)]
    pub representative_id: Option<RepresentativeId>,
    pub invoice_date: NaiveDate,
    pub currency_code: String,
    #[serde(default)]
    pub exchange_rate: Option<Decimal>,
    pub lines: Vec<LineInput>,
}

impl CreateInvoice {
    pub fn new(
        company_id: CompanyId,
        invoice_date: NaiveDate,
        currency_code: impl Into<String>,
    ) -> Self {
        Self {
            company_id,
            customer_id: None,
            channel_id: None,
            representative_id: None,
            invoice_date,
            currency_code: currency_code.into(),
            exchange_rate: None,
            lines: Vec::new(),
        }
    }

    pub fn with_customer(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_channel(mut self, channel_id: ChannelId) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    pub fn with_representative(mut self, representative_id: RepresentativeId) -> Self {
        self.representative_id = Some(representative_id);
        self
    }

    pub fn with_exchange_rate(mut self, exchange_rate: Decimal) -> Self {
        self.exchange_rate = Some(exchange_rate);
        self
    }

    pub fn with_line(mut self, line: LineInput) -> Self {
        self.lines.push(line);
        self
    }

    /// Shape validation that needs no collaborator: lines, currency, exchange rate.
    pub fn validate(&self) -> DomainResult<()> {
        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot create invoice without lines"));
        }

        let code = self.currency_code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::validation(format!(
                "invalid currency code '{}'",
                self.currency_code
            )));
        }

        if let Some(rate) = self.exchange_rate {
            if rate <= Decimal::ZERO {
                return Err(DomainError::validation("exchange rate must be positive"));
            }
        }

        for (idx, line) in self.lines.iter().enumerate() {
            line.validate(idx as u32 + 1)?;
        }
        Ok(())
    }

    pub fn header(&self) -> InvoiceHeader {
        InvoiceHeader {
            company_id: self.company_id,
            customer_id: self.customer_id,
            channel_id: self.channel_id,
            representative_id: self.representative_id,
            invoice_date: self.invoice_date,
            currency_code: self.currency_code.trim().to_ascii_uppercase(),
            exchange_rate: self.exchange_rate.unwrap_or(Decimal::ONE),
        }
    }

    /// Distinct product references, in first-seen order.
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = Vec::new();
        for id in self.lines.iter().filter_map(|l| l.product_id) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    pub fn period_key(&self) -> String {
        period_key_for(self.invoice_date)
    }
}

/// Fully priced invoice that has not been assigned a number yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftInvoice {
    header: InvoiceHeader,
    lines: Vec<InvoiceLine>,
    totals: InvoiceTotals,
}

impl DraftInvoice {
    pub fn new(header: InvoiceHeader, lines: Vec<InvoiceLine>) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("cannot create invoice without lines"));
        }
        let totals = aggregate(lines.iter().map(|l| &l.amounts));
        Ok(Self {
            header,
            lines,
            totals,
        })
    }

    pub fn header(&self) -> &InvoiceHeader {
        &self.header
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn totals(&self) -> &InvoiceTotals {
        &self.totals
    }

    pub fn period_key(&self) -> String {
        period_key_for(self.header.invoice_date)
    }

    /// Attach an allocated sequence number and turn the draft into an invoice.
    pub fn issue(
        self,
        id: InvoiceId,
        sequence: u64,
        number_width: usize,
    ) -> DomainResult<InvoiceAggregate> {
        if sequence == 0 {
            return Err(DomainError::invariant("invoice sequence numbers start at 1"));
        }
        let period_key = self.period_key();
        let invoice_number = InvoiceNumber::format(&period_key, sequence, number_width);
        Ok(InvoiceAggregate {
            id,
            header: self.header,
            period_key,
            sequence,
            invoice_number,
            lines: self.lines,
            totals: self.totals,
            version: 1,
        })
    }
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceAggregate {
    id: InvoiceId,
    header: InvoiceHeader,
    period_key: String,
    sequence: u64,
    invoice_number: InvoiceNumber,
    lines: Vec<InvoiceLine>,
    totals: InvoiceTotals,
    version: u64,
}

impl InvoiceAggregate {
    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn header(&self) -> &InvoiceHeader {
        &self.header
    }

    pub fn period_key(&self) -> &str {
        &self.period_key
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn invoice_number(&self) -> &InvoiceNumber {
        &self.invoice_number
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn totals(&self) -> &InvoiceTotals {
        &self.totals
    }

    /// Invariant: header totals are the sums of the line fields.
    pub fn verify_totals(&self) -> DomainResult<()> {
        let recomputed = aggregate(self.lines.iter().map(|l| &l.amounts));
        if recomputed != self.totals {
            return Err(DomainError::invariant(format!(
                "invoice {} totals do not match its lines",
                self.invoice_number
            )));
        }
        for line in &self.lines {
            let amounts = &line.amounts;
            if amounts.line_total_with_tax != amounts.line_total + amounts.tax_amount {
                return Err(DomainError::invariant(format!(
                    "invoice {} line {} does not add up",
                    self.invoice_number, line.line_no
                )));
            }
        }
        Ok(())
    }
}

impl AggregateRoot for InvoiceAggregate {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
