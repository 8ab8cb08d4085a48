use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use billforge_core::ExpectedVersion;

use super::AllocationError;

/// Persisted counter of one period key.
///
/// Created lazily on the first allocation for the period, mutated once per
/// successful allocation, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub period_key: String,
    pub last_issued: u64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SequenceStoreError {
    /// The record no longer matches the expected value.
    #[error("sequence record changed concurrently: {0}")]
    Conflict(String),

    #[error("sequence store unavailable: {0}")]
    Unavailable(String),
}

impl SequenceStoreError {
    pub(crate) fn into_allocation(self, period_key: &str, attempts: u32) -> AllocationError {
        match self {
            SequenceStoreError::Conflict(_) => AllocationError::Conflict {
                period_key: period_key.to_string(),
                attempts,
            },
            SequenceStoreError::Unavailable(msg) => AllocationError::Store(msg),
        }
    }
}

/// Minimal storage primitive behind the sequence allocators.
///
/// Implementations must make `compare_and_set` atomic: the write happens only
/// if the stored value still matches `expected`, and is durable when `Ok`
/// is returned.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Highest number issued for the period, or `None` if none ever was.
    ///
    /// Stores that know of numbers issued before the record existed (e.g.
    /// migrated invoices) report that maximum here.
    async fn load(&self, period_key: &str) -> Result<Option<u64>, SequenceStoreError>;

    /// Atomically replace the period's value with `next` if it matches `expected`.
    async fn compare_and_set(
        &self,
        period_key: &str,
        expected: ExpectedVersion,
        next: u64,
    ) -> Result<(), SequenceStoreError>;
}

#[async_trait]
impl<S> SequenceStore for Arc<S>
where
    S: SequenceStore + ?Sized,
{
    async fn load(&self, period_key: &str) -> Result<Option<u64>, SequenceStoreError> {
        (**self).load(period_key).await
    }

    async fn compare_and_set(
        &self,
        period_key: &str,
        expected: ExpectedVersion,
        next: u64,
    ) -> Result<(), SequenceStoreError> {
        (**self).compare_and_set(period_key, expected, next).await
    }
}
