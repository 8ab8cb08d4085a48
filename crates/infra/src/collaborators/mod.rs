//! Ports to the systems surrounding the engine.
//!
//! The engine never reads products, companies or customers itself and never
//! writes invoice rows; it talks to these traits. In-memory implementations
//! live in [`in_memory`].

pub mod in_memory;

pub use in_memory::{InMemoryInvoiceRepository, InMemoryProductCatalog, InMemoryReferenceDirectory};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use billforge_core::{ChannelId, CompanyId, CustomerId, RepresentativeId};
use billforge_invoicing::{InvoiceAggregate, InvoiceHeader};
use billforge_products::{ProductId, ProductPricingSnapshot};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("invoice number already stored: {0}")]
    DuplicateInvoiceNumber(String),
}

/// Kind of party referenced from an invoice header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Customer,
    Channel,
    Representative,
}

impl core::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            ReferenceKind::Customer => "customer",
            ReferenceKind::Channel => "channel",
            ReferenceKind::Representative => "representative",
        };
        f.write_str(name)
    }
}

/// Header references that must exist (and belong together) before an invoice
/// may be issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderReferences {
    pub company_id: CompanyId,
    pub customer_id: Option<CustomerId>,
    pub channel_id: Option<ChannelId>,
    pub representative_id: Option<RepresentativeId>,
}

impl From<&InvoiceHeader> for HeaderReferences {
    fn from(header: &InvoiceHeader) -> Self {
        Self {
            company_id: header.company_id,
            customer_id: header.customer_id,
            channel_id: header.channel_id,
            representative_id: header.representative_id,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderRejection {
    #[error("company {0} not found")]
    CompanyNotFound(CompanyId),

    #[error("{kind} {id} not found")]
    NotFound { kind: ReferenceKind, id: String },

    #[error("{kind} {id} does not belong to company {company_id}")]
    ForeignReference {
        kind: ReferenceKind,
        id: String,
        company_id: CompanyId,
    },

    #[error("header validation unavailable: {0}")]
    Unavailable(String),
}

/// Batch product lookup.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Resolve all `ids` in one call. Unknown ids are absent from the result.
    async fn lookup(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, ProductPricingSnapshot>, CollaboratorError>;
}

/// Existence and ownership checks for header references.
#[async_trait]
pub trait HeaderValidator: Send + Sync {
    async fn validate(&self, references: &HeaderReferences) -> Result<(), HeaderRejection>;
}

/// Persistence of issued invoices.
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Store a newly issued invoice. Rejects a second invoice with the same number.
    async fn insert(&self, invoice: &InvoiceAggregate) -> Result<(), CollaboratorError>;
}

#[async_trait]
impl<C> ProductCatalog for Arc<C>
where
    C: ProductCatalog + ?Sized,
{
    async fn lookup(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, ProductPricingSnapshot>, CollaboratorError> {
        (**self).lookup(ids).await
    }
}

#[async_trait]
impl<H> HeaderValidator for Arc<H>
where
    H: HeaderValidator + ?Sized,
{
    async fn validate(&self, references: &HeaderReferences) -> Result<(), HeaderRejection> {
        (**self).validate(references).await
    }
}

#[async_trait]
impl<R> InvoiceRepository for Arc<R>
where
    R: InvoiceRepository + ?Sized,
{
    async fn insert(&self, invoice: &InvoiceAggregate) -> Result<(), CollaboratorError> {
        (**self).insert(invoice).await
    }
}
