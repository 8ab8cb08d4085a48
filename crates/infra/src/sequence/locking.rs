use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use billforge_core::ExpectedVersion;

use super::retry::RetryPolicy;
use super::store::{SequenceStore, SequenceStoreError};
use super::{AllocationError, SequenceAllocator, next_after};

/// Pessimistic allocator: the read-increment-write cycle of a period key runs
/// under an async mutex dedicated to that key.
///
/// Serialisation is per process. When several processes share one store, the
/// store's compare-and-set can still reject a write; the allocator then
/// re-reads and retries under the held lock until the [`RetryPolicy`] budget
/// runs out, which surfaces as [`AllocationError::Conflict`].
pub struct LockingSequenceAllocator<S> {
    store: S,
    policy: RetryPolicy,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S> LockingSequenceAllocator<S>
where
    S: SequenceStore,
{
    pub fn new(store: S) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: S, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    fn lock_for(&self, period_key: &str) -> Result<Arc<tokio::sync::Mutex<()>>, AllocationError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| AllocationError::Store("period lock table poisoned".to_string()))?;
        Ok(locks
            .entry(period_key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }
}

#[async_trait]
impl<S> SequenceAllocator for LockingSequenceAllocator<S>
where
    S: SequenceStore,
{
    #[instrument(skip(self), err)]
    async fn allocate_next(&self, period_key: &str) -> Result<u64, AllocationError> {
        let lock = self.lock_for(period_key)?;
        let _guard = lock.lock().await;

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
                // Another process wrote the record since our load.
                Err(SequenceStoreError::Conflict(reason)) if attempt < max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    debug!(
                        period_key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "sequence written elsewhere, re-reading under lock"
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
    async fn first_allocation_of_a_period_is_one() {
        let allocator = LockingSequenceAllocator::new(InMemorySequenceStore::new());
        assert_eq!(allocator.allocate_next("2025").await.unwrap(), 1);
        assert_eq!(allocator.allocate_next("2025").await.unwrap(), 2);
        assert_eq!(allocator.allocate_next("2024").await.unwrap(), 1);
        assert_eq!(allocator.store().record("2025").unwrap().last_issued, 2);
    }

    #[tokio::test]
    async fn continues_after_seeded_maximum() {
        let allocator =
            LockingSequenceAllocator::new(InMemorySequenceStore::new().with_issued("2025", 41));
        assert_eq!(allocator.allocate_next("2025").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn exhausted_counter_is_reported() {
        let allocator = LockingSequenceAllocator::new(
            InMemorySequenceStore::new().with_issued("2025", u64::MAX),
        );
        assert_eq!(
            allocator.allocate_next("2025").await,
            Err(AllocationError::Exhausted("2025".to_string()))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_allocations_are_distinct_and_gapless() {
        let allocator = Arc::new(LockingSequenceAllocator::new(InMemorySequenceStore::new()));

        let handles: Vec<_> = (0..128)
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

        assert_eq!(issued, (1..=128).collect::<HashSet<u64>>());
        assert_eq!(allocator.store().record("2025").unwrap().last_issued, 128);
    }

    /// Shared store where another process slips in ahead of the first
    /// `conflicts` writes.
    struct SharedWithAnotherProcess {
        inner: InMemorySequenceStore,
        conflicts: AtomicU32,
        writes: AtomicU32,
    }

    impl SharedWithAnotherProcess {
        fn new(conflicts: u32) -> Self {
            Self {
                inner: InMemorySequenceStore::new(),
                conflicts: AtomicU32::new(conflicts),
                writes: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SequenceStore for SharedWithAnotherProcess {
        async fn load(&self, period_key: &str) -> Result<Option<u64>, SequenceStoreError> {
            self.inner.load(period_key).await
        }

        async fn compare_and_set(
            &self,
            period_key: &str,
            expected: ExpectedVersion,
            next: u64,
        ) -> Result<(), SequenceStoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                // The other process takes the number we were about to write.
                self.inner.compare_and_set(period_key, expected, next).await?;
                return Err(SequenceStoreError::Conflict(format!(
                    "'{period_key}' moved past {next}"
                )));
            }
            self.inner.compare_and_set(period_key, expected, next).await
        }
    }

    #[tokio::test]
    async fn lost_write_is_retried_under_the_lock() {
        let allocator =
            LockingSequenceAllocator::with_policy(SharedWithAnotherProcess::new(1), fast_policy(3));

        assert_eq!(allocator.allocate_next("2025").await, Ok(2));
        assert_eq!(allocator.store().writes.load(Ordering::SeqCst), 2);
        assert_eq!(allocator.store().inner.record("2025").unwrap().last_issued, 2);
    }

    #[tokio::test]
    async fn persistent_conflicts_exhaust_the_budget() {
        let allocator = LockingSequenceAllocator::with_policy(
            SharedWithAnotherProcess::new(u32::MAX),
            fast_policy(3),
        );

        assert_eq!(
            allocator.allocate_next("2025").await,
            Err(AllocationError::Conflict {
                period_key: "2025".to_string(),
                attempts: 3
            })
        );
        assert_eq!(allocator.store().writes.load(Ordering::SeqCst), 3);
    }

    struct UnavailableStore;

    #[async_trait]
    impl SequenceStore for UnavailableStore {
        async fn load(&self, _period_key: &str) -> Result<Option<u64>, SequenceStoreError> {
            Err(SequenceStoreError::Unavailable("connection refused".to_string()))
        }

        async fn compare_and_set(
            &self,
            _period_key: &str,
            _expected: ExpectedVersion,
            _next: u64,
        ) -> Result<(), SequenceStoreError> {
            unreachable!("load always fails")
        }
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let allocator = LockingSequenceAllocator::new(UnavailableStore);
        assert_eq!(
            allocator.allocate_next("2025").await,
            Err(AllocationError::Store("connection refused".to_string()))
        );
    }
}
