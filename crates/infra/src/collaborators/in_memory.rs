use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use billforge_core::{ChannelId, CompanyId, CustomerId, RepresentativeId};
use billforge_invoicing::InvoiceAggregate;
use billforge_products::{ProductId, ProductPricingSnapshot};

use super::{
    CollaboratorError, HeaderReferences, HeaderRejection, HeaderValidator, InvoiceRepository,
    ProductCatalog, ReferenceKind,
};

/// In-memory product catalog.
///
/// Counts lookup calls so tests can assert that products are resolved in one batch.
#[derive(Debug, Default)]
pub struct InMemoryProductCatalog {
    products: RwLock<HashMap<ProductId, ProductPricingSnapshot>>,
    lookups: AtomicUsize,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(self, snapshot: ProductPricingSnapshot) -> Self {
        self.upsert(snapshot);
        self
    }

    /// Insert or replace a product. Already issued invoices are unaffected.
    pub fn upsert(&self, snapshot: ProductPricingSnapshot) {
        if let Ok(mut products) = self.products.write() {
            products.insert(snapshot.product_id, snapshot);
        }
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn lookup(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, ProductPricingSnapshot>, CollaboratorError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let products = self
            .products
            .read()
            .map_err(|_| CollaboratorError::Unavailable("lock poisoned".to_string()))?;

        Ok(ids
            .iter()
            .filter_map(|id| products.get(id).map(|p| (*id, p.clone())))
            .collect())
    }
}

/// In-memory directory of companies and the parties that belong to them.
#[derive(Debug, Default, Clone)]
pub struct InMemoryReferenceDirectory {
    companies: HashSet<CompanyId>,
    customers: HashMap<CustomerId, CompanyId>,
    channels: HashMap<ChannelId, CompanyId>,
    representatives: HashMap<RepresentativeId, CompanyId>,
}

impl InMemoryReferenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company(mut self, company_id: CompanyId) -> Self {
        self.companies.insert(company_id);
        self
    }

    pub fn with_customer(mut self, customer_id: CustomerId, company_id: CompanyId) -> Self {
        self.customers.insert(customer_id, company_id);
        self
    }

    pub fn with_channel(mut self, channel_id: ChannelId, company_id: CompanyId) -> Self {
        self.channels.insert(channel_id, company_id);
        self
    }

    pub fn with_representative(
        mut self,
        representative_id: RepresentativeId,
        company_id: CompanyId,
    ) -> Self {
        self.representatives.insert(representative_id, company_id);
        self
    }
}

fn check_owner<K>(
    owners: &HashMap<K, CompanyId>,
    id: Option<K>,
    kind: ReferenceKind,
    company_id: CompanyId,
) -> Result<(), HeaderRejection>
where
    K: Eq + core::hash::Hash + core::fmt::Display,
{
    let Some(id) = id else {
        return Ok(());
    };
    match owners.get(&id) {
        None => Err(HeaderRejection::NotFound {
            kind,
            id: id.to_string(),
        }),
        Some(owner) if *owner != company_id => Err(HeaderRejection::ForeignReference {
            kind,
            id: id.to_string(),
            company_id,
        }),
        Some(_) => Ok(()),
    }
}

#[async_trait]
impl HeaderValidator for InMemoryReferenceDirectory {
    async fn validate(&self, references: &HeaderReferences) -> Result<(), HeaderRejection> {
        let company_id = references.company_id;
        if !self.companies.contains(&company_id) {
            return Err(HeaderRejection::CompanyNotFound(company_id));
        }

        check_owner(&self.customers, references.customer_id, ReferenceKind::Customer, company_id)?;
        check_owner(&self.channels, references.channel_id, ReferenceKind::Channel, company_id)?;
        check_owner(
            &self.representatives,
            references.representative_id,
            ReferenceKind::Representative,
            company_id,
        )
    }
}

/// In-memory invoice repository keyed by invoice number.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceRepository {
    invoices: RwLock<BTreeMap<String, InvoiceAggregate>>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, invoice_number: &str) -> Option<InvoiceAggregate> {
        self.invoices.read().ok()?.get(invoice_number).cloned()
    }

    pub fn len(&self) -> usize {
        self.invoices.read().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored invoice numbers in ascending order.
    pub fn invoice_numbers(&self) -> Vec<String> {
        self.invoices
            .read()
            .map(|i| i.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn insert(&self, invoice: &InvoiceAggregate) -> Result<(), CollaboratorError> {
        let mut invoices = self
            .invoices
            .write()
            .map_err(|_| CollaboratorError::Unavailable("lock poisoned".to_string()))?;

        let number = invoice.invoice_number().as_str();
        if invoices.contains_key(number) {
            return Err(CollaboratorError::DuplicateInvoiceNumber(number.to_string()));
        }
        invoices.insert(number.to_string(), invoice.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use billforge_core::AggregateId;
    use billforge_products::TaxMode;

    use super::*;

    fn snapshot(price: rust_decimal::Decimal) -> ProductPricingSnapshot {
        ProductPricingSnapshot::new(
            ProductId::new(AggregateId::new()),
            "SKU-1",
            "Widget",
            price,
            dec!(20),
            TaxMode::Exclusive,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn lookup_returns_only_known_products() {
        let known = snapshot(dec!(10));
        let catalog = InMemoryProductCatalog::new().with_product(known.clone());
        let unknown = ProductId::new(AggregateId::new());

        let found = catalog.lookup(&[known.product_id, unknown]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found.get(&known.product_id), Some(&known));
        assert_eq!(catalog.lookup_calls(), 1);
    }

    #[tokio::test]
    async fn directory_checks_company_then_ownership() {
        let company = CompanyId::new();
        let other_company = CompanyId::new();
        let customer = CustomerId::new();
        let foreign_customer = CustomerId::new();

        let directory = InMemoryReferenceDirectory::new()
            .with_company(company)
            .with_company(other_company)
            .with_customer(customer, company)
            .with_customer(foreign_customer, other_company);

        let refs = |company_id, customer_id| HeaderReferences {
            company_id,
            customer_id,
            channel_id: None,
            representative_id: None,
        };

        assert!(directory.validate(&refs(company, Some(customer))).await.is_ok());
        assert!(directory.validate(&refs(company, None)).await.is_ok());

        let missing_company = CompanyId::new();
        assert_eq!(
            directory.validate(&refs(missing_company, None)).await,
            Err(HeaderRejection::CompanyNotFound(missing_company))
        );

        assert!(matches!(
            directory.validate(&refs(company, Some(foreign_customer))).await,
            Err(HeaderRejection::ForeignReference {
                kind: ReferenceKind::Customer,
                ..
            })
        ));

        assert!(matches!(
            directory.validate(&refs(company, Some(CustomerId::new()))).await,
            Err(HeaderRejection::NotFound {
                kind: ReferenceKind::Customer,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn unknown_channel_is_rejected() {
        let company = CompanyId::new();
        let directory = InMemoryReferenceDirectory::new().with_company(company);
        let refs = HeaderReferences {
            company_id: company,
            customer_id: None,
            channel_id: Some(ChannelId::new()),
            representative_id: None,
        };

        let err = directory.validate(&refs).await.unwrap_err();
        assert!(matches!(
            err,
            HeaderRejection::NotFound {
                kind: ReferenceKind::Channel,
                ..
            }
        ));
        assert!(err.to_string().starts_with("channel "));
    }
}
