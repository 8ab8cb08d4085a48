use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use billforge_core::ExpectedVersion;

use super::retry::RetryPolicy;
use super::store::{SequenceStore, SequenceStoreError};
use super::{AllocationError, SequenceAllocator, next_after};

/// Optimistic allocator: reads the period's current value, then writes
/// `current + 1` with a compare-and-set. A lost race retries with backoff.
///
/// Holds no lock across awaits, so it works equally well when several
/// processes share the same store.
pub struct OptimisticSequenceAllocator<S> {
    store: S,
    policy: RetryPolicy,
}

impl<S> OptimisticSequenceAllocator<S>
where
    S: SequenceStore,
{
    pub fn new(store: S) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: S, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl<S> SequenceAllocator for OptimisticSequenceAllocator<S>
where
    S: SequenceStore,
{
    #[instrument(skip(self), err)]
    async fn allocate_next(&self, period_key: &str) -> Result<u64, AllocationError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let current = self
                .store
                .load(period_key)
                .await
                .map_err(|e| e.into_allocation(period_key, attempt))?;
            let next = next_after(period_key, current)?;

            match self
                .store
                .compare_and_set(period_key, ExpectedVersion::from_current(current), next)
                .await
            {
                Ok(()) => {
                    debug!(period_key, sequence = next, attempt, "sequence number allocated");
                    return Ok(next);
                }
                Err(SequenceStoreError::Conflict(reason)) if attempt < max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    debug!(
                        period_key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "sequence conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if matches!(err, SequenceStoreError::Conflict(_)) {
                        warn!(period_key, attempts = attempt, "sequence retry budget exhausted");
                    }
                    return Err(err.into_allocation(period_key, attempt));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::sequence::InMemorySequenceStore;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_micros(50),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn sequential_allocations_increase() {
        let allocator = OptimisticSequenceAllocator::new(InMemorySequenceStore::new());
        for expected in 1..=5 {
            assert_eq!(allocator.allocate_next("2025").await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn continues_after_seeded_maximum() {
        let allocator =
            OptimisticSequenceAllocator::new(InMemorySequenceStore::new().with_issued("2025", 41));
        assert_eq!(allocator.allocate_next("2025").await.unwrap(), 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_allocations_never_duplicate() {
        let allocator = Arc::new(OptimisticSequenceAllocator::with_policy(
            InMemorySequenceStore::new(),
            fast_policy(10_000),
        ));

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                tokio::spawn(async move { allocator.allocate_next("2025").await })
            })
            .collect();

        let mut issued = HashSet::new();
        for handle in handles {
            let number = handle.await.unwrap().unwrap();
            assert!(issued.insert(number), "number {number} issued twice");
        }

        assert_eq!(issued, (1..=100).collect::<HashSet<u64>>());
    }

    /// Store where every write loses the race.
    #[derive(Default)]
    struct AlwaysConflicting {
        writes: AtomicU32,
    }

    #[async_trait]
    impl SequenceStore for AlwaysConflicting {
        async fn load(&self, _period_key: &str) -> Result<Option<u64>, SequenceStoreError> {
            Ok(Some(7))
        }

        async fn compare_and_set(
            &self,
            _period_key: &str,
            _expected: ExpectedVersion,
            _next: u64,
        ) -> Result<(), SequenceStoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(SequenceStoreError::Conflict("someone else won".to_string()))
        }
    }

    #[tokio::test]
    async fn exhausting_the_budget_is_a_conflict() {
        let allocator =
            OptimisticSequenceAllocator::with_policy(AlwaysConflicting::default(), fast_policy(3));

        assert_eq!(
            allocator.allocate_next("2025").await,
            Err(AllocationError::Conflict {
                period_key: "2025".to_string(),
                attempts: 3
            })
        );
        assert_eq!(allocator.store().writes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_attempt_budget_still_tries_once() {
        let allocator =
            OptimisticSequenceAllocator::with_policy(AlwaysConflicting::default(), fast_policy(0));
        assert!(allocator.allocate_next("2025").await.is_err());
        assert_eq!(allocator.store().writes.load(Ordering::SeqCst), 1);
    }
}
