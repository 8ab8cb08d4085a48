//! `billforge-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, aggregate/value-object markers and the
//! monetary rounding rules shared by every calculation.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, ChannelId, CompanyId, CustomerId, RepresentativeId};
pub use money::{MONEY_SCALE, percent_of, round_money};
pub use value_object::ValueObject;
