//! Invoice assembly: from a `CreateInvoice` request to a numbered invoice.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, instrument, warn};

use billforge_core::AggregateId;
use billforge_invoicing::{
    CreateInvoice, DEFAULT_NUMBER_WIDTH, DraftInvoice, InvoiceAggregate, InvoiceId, InvoiceLine,
};
use billforge_products::{ProductId, ProductPricingSnapshot};

use crate::collaborators::{HeaderReferences, HeaderValidator, InvoiceRepository, ProductCatalog};
use crate::error::InvoicingError;
use crate::sequence::SequenceAllocator;

/// Orchestrates header validation, product lookup, line pricing, aggregation
/// and number allocation for one invoice.
///
/// ## Execution Guarantees
///
/// - **All-or-nothing**: every validation (request shape, header references,
///   products, line amounts) happens before the sequence allocator is called,
///   so invalid input never consumes a number.
/// - **One lookup**: all distinct products of a request are resolved with a
///   single catalog call; the snapshots are not re-read afterwards.
/// - **One allocation**: `allocate_next` is called exactly once per issued invoice.
/// - **Cancellation**: the token is honoured up to the moment a number is
///   returned, including while waiting on the allocator.
/// - **Order**: output lines keep the input order and are numbered from 1.
///
/// ## Gaps
///
/// A number allocated for an invoice that is then cancelled or fails to
/// persist is not returned to the sequence. Gaps are accepted; duplicates are not.
pub struct InvoiceAssembler<C, H, A> {
    catalog: C,
    headers: H,
    allocator: A,
    number_width: usize,
}

impl<C, H, A> InvoiceAssembler<C, H, A> {
    pub fn new(catalog: C, headers: H, allocator: A) -> Self {
        Self {
            catalog,
            headers,
            allocator,
            number_width: DEFAULT_NUMBER_WIDTH,
        }
    }

    /// Zero-padding width of the sequence part of invoice numbers.
    pub fn with_number_width(mut self, number_width: usize) -> Self {
        self.number_width = number_width;
        self
    }

    pub fn number_width(&self) -> usize {
        self.number_width
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }
}

impl<C, H, A> InvoiceAssembler<C, H, A>
where
    C: ProductCatalog,
    H: HeaderValidator,
    A: SequenceAllocator,
{
    /// Price, total and number a new invoice.
    ///
    /// Returns the assembled aggregate; storing it is the caller's business
    /// (see [`InvoiceAssembler::create_and_store`]).
    #[instrument(
        skip(self, request, cancel),
        fields(
            company_id = %request.company_id,
            invoice_date = %request.invoice_date,
            line_count = request.lines.len(),
            invoice_number = tracing::field::Empty,
        ),
        err
    )]
    pub async fn create_invoice(
        &self,
        request: &CreateInvoice,
        cancel: &CancellationToken,
    ) -> Result<InvoiceAggregate, InvoicingError> {
        if cancel.is_cancelled() {
            return Err(InvoicingError::Cancelled);
        }

        request.validate()?;
        let header = request.header();

        self.headers
            .validate(&HeaderReferences::from(&header))
            .await?;

        let snapshots = self.resolve_products(request).await?;

        let lines = request
            .lines
            .iter()
            .enumerate()
            .map(|(idx, input)| {
                let snapshot = input.product_id.and_then(|id| snapshots.get(&id));
                InvoiceLine::price(idx as u32 + 1, input, snapshot)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let draft = DraftInvoice::new(header, lines)?;
        let period_key = draft.period_key();

        // Cancellation also wins while queued on the period lock or backing
        // off; a write already durable when the token fires becomes a gap.
        let sequence = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%period_key, "invoice creation cancelled before a number was issued");
                return Err(InvoicingError::Cancelled);
            }
            allocated = self.allocator.allocate_next(&period_key) => allocated?,
        };
        let invoice = draft.issue(
            InvoiceId::new(AggregateId::new()),
            sequence,
            self.number_width,
        )?;

        Span::current().record("invoice_number", invoice.invoice_number().as_str());
        info!(
            invoice_id = %invoice.id_typed(),
            invoice_number = %invoice.invoice_number(),
            total = %invoice.totals().total,
            "invoice assembled"
        );
        Ok(invoice)
    }

    /// Assemble an invoice and hand it to `repository`.
    ///
    /// A storage failure after allocation surfaces as
    /// [`InvoicingError::Persistence`]; the number is not reused.
    pub async fn create_and_store<R>(
        &self,
        repository: &R,
        request: &CreateInvoice,
        cancel: &CancellationToken,
    ) -> Result<InvoiceAggregate, InvoicingError>
    where
        R: InvoiceRepository + ?Sized,
    {
        let invoice = self.create_invoice(request, cancel).await?;

        if let Err(err) = repository.insert(&invoice).await {
            warn!(
                invoice_number = %invoice.invoice_number(),
                error = %err,
                "failed to persist invoice; sequence number is lost"
            );
            return Err(InvoicingError::Persistence(err.to_string()));
        }
        Ok(invoice)
    }

    async fn resolve_products(
        &self,
        request: &CreateInvoice,
    ) -> Result<HashMap<ProductId, ProductPricingSnapshot>, InvoicingError> {
        let ids = request.product_ids();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let snapshots = self.catalog.lookup(&ids).await?;

        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !snapshots.contains_key(id))
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(InvoicingError::ReferenceNotFound(format!(
                "product(s) {}",
                missing.join(", ")
            )));
        }
        Ok(snapshots)
    }
}
