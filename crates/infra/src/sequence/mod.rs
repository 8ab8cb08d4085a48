//! Period-scoped invoice sequence allocation.
//!
//! The only shared mutable state of the engine is one counter per period key
//! (`SequenceRecord`). Every mutation goes through a [`SequenceAllocator`],
//! which performs an atomic read-increment-write cycle against a
//! [`SequenceStore`]:
//!
//! - [`LockingSequenceAllocator`]: pessimistic; one async mutex per period key
//!   serialises the cycle inside the process. A write lost to another process
//!   is re-read and retried under the held lock.
//! - [`OptimisticSequenceAllocator`]: compare-and-set against the store,
//!   retried with exponential backoff on conflict up to a bounded budget.
//!
//! Guarantees, for a given period key:
//! - numbers are strictly increasing in the order allocations complete
//! - no two callers ever receive the same number
//! - a number is durable in the store before it is handed out; gaps (burned
//!   numbers) are acceptable, duplicates are not
//!
//! Scanning issued invoices for the maximum and adding one, without
//! serialisation, does NOT satisfy these guarantees.

pub mod in_memory;
pub mod locking;
pub mod optimistic;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod retry;
pub mod store;

pub use in_memory::InMemorySequenceStore;
pub use locking::LockingSequenceAllocator;
pub use optimistic::OptimisticSequenceAllocator;
#[cfg(feature = "postgres")]
pub use postgres::PostgresSequenceStore;
pub use retry::RetryPolicy;
pub use store::{SequenceRecord, SequenceStore, SequenceStoreError};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Sequence allocation failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// Lost the race for the period's record too many times.
    #[error("sequence allocation for period '{period_key}' conflicted after {attempts} attempt(s)")]
    Conflict { period_key: String, attempts: u32 },

    /// The period's counter cannot be incremented any further.
    #[error("sequence for period '{0}' is exhausted")]
    Exhausted(String),

    /// The backing store failed.
    #[error("sequence store error: {0}")]
    Store(String),
}

/// Allocator of the next sequence number for a period key.
#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    /// Allocate, durably record and return the next number for `period_key`.
    async fn allocate_next(&self, period_key: &str) -> Result<u64, AllocationError>;
}

#[async_trait]
impl<A> SequenceAllocator for Arc<A>
where
    A: SequenceAllocator + ?Sized,
{
    async fn allocate_next(&self, period_key: &str) -> Result<u64, AllocationError> {
        (**self).allocate_next(period_key).await
    }
}

pub(crate) fn next_after(period_key: &str, current: Option<u64>) -> Result<u64, AllocationError> {
    current
        .unwrap_or(0)
        .checked_add(1)
        .ok_or_else(|| AllocationError::Exhausted(period_key.to_string()))
}
