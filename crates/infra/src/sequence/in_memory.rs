use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use billforge_core::ExpectedVersion;

use super::store::{SequenceRecord, SequenceStore, SequenceStoreError};

#[derive(Debug, Default)]
struct State {
    records: HashMap<String, u64>,
    /// Highest numbers issued before a record existed (read at first use).
    seeds: HashMap<String, u64>,
}

impl State {
    fn current(&self, period_key: &str) -> Option<u64> {
        self.records
            .get(period_key)
            .or_else(|| self.seeds.get(period_key))
            .copied()
    }
}

/// In-memory sequence store for tests and single-process deployments.
///
/// Durability is the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemorySequenceStore {
    state: RwLock<State>,
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known highest issued number for `period_key`.
    pub fn with_issued(mut self, period_key: impl Into<String>, highest_issued: u64) -> Self {
        if let Ok(state) = self.state.get_mut() {
            state.seeds.insert(period_key.into(), highest_issued);
        }
        self
    }

    /// Persisted record of a period, if any allocation happened.
    pub fn record(&self, period_key: &str) -> Option<SequenceRecord> {
        let state = self.state.read().ok()?;
        state.records.get(period_key).map(|last_issued| SequenceRecord {
            period_key: period_key.to_string(),
            last_issued: *last_issued,
        })
    }
}

#[async_trait]
impl SequenceStore for InMemorySequenceStore {
    async fn load(&self, period_key: &str) -> Result<Option<u64>, SequenceStoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| SequenceStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(state.current(period_key))
    }

    async fn compare_and_set(
        &self,
        period_key: &str,
        expected: ExpectedVersion,
        next: u64,
    ) -> Result<(), SequenceStoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| SequenceStoreError::Unavailable("lock poisoned".to_string()))?;

        let current = state.current(period_key);
        expected
            .check(current)
            .map_err(|e| SequenceStoreError::Conflict(e.to_string()))?;

        if current.is_some_and(|c| next <= c) {
            return Err(SequenceStoreError::Conflict(format!(
                "sequence for '{period_key}' must increase (current {current:?}, attempted {next})"
            )));
        }

        state.records.insert(period_key.to_string(), next);
        Ok(())
    }
}
