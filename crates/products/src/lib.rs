//! Products domain module.
//!
//! Only the slice of the catalog that invoicing needs: product identity and the
//! immutable pricing snapshot copied onto invoice lines.

pub mod product;

pub use product::{ProductId, ProductPricingSnapshot, TaxMode};
