//! Invoicing domain module.
//!
//! Line pricing, invoice totals and invoice numbering, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). Orchestration with
//! the product catalog and the sequence allocator lives in `billforge-infra`.

pub mod aggregator;
pub mod calculator;
pub mod invoice;
pub mod numbering;

pub use aggregator::{InvoiceTotals, aggregate};
pub use calculator::{ComputedLine, compute_line, validate_line_amounts};
pub use invoice::{
    CreateInvoice, DraftInvoice, InvoiceAggregate, InvoiceHeader, InvoiceId, InvoiceLine,
    LineInput,
};
pub use numbering::{DEFAULT_NUMBER_WIDTH, InvoiceNumber, period_key_for};
