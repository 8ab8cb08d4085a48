//! Engine configuration and wiring from environment variables.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `BILLFORGE_SEQUENCE_STRATEGY` | `locking` | `locking` or `optimistic` |
//! | `BILLFORGE_SEQUENCE_MAX_RETRIES` | `8` | store writes tried per allocation |
//! | `BILLFORGE_SEQUENCE_BACKOFF_MS` | `5` | first retry backoff, doubled per retry |
//! | `BILLFORGE_INVOICE_NUMBER_WIDTH` | `5` | zero-padding of the sequence part |
//! | `USE_PERSISTENT_STORES` | `false` | keep sequences in Postgres |
//! | `DATABASE_URL` | none | required when `USE_PERSISTENT_STORES=true` |

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use billforge_invoicing::DEFAULT_NUMBER_WIDTH;

use crate::sequence::{
    InMemorySequenceStore, LockingSequenceAllocator, OptimisticSequenceAllocator, RetryPolicy,
    SequenceAllocator, SequenceStore,
};

/// Upper bound of the conflict backoff.
const MAX_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceStrategy {
    #[default]
    Locking,
    Optimistic,
}

impl FromStr for SequenceStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "locking" | "pessimistic" => Ok(SequenceStrategy::Locking),
            "optimistic" => Ok(SequenceStrategy::Optimistic),
            other => {
                bail!("unknown sequence strategy '{other}' (expected 'locking' or 'optimistic')")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sequence_strategy: SequenceStrategy,
    pub sequence_max_retries: u32,
    pub sequence_backoff_ms: u64,
    pub invoice_number_width: usize,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sequence_strategy: SequenceStrategy::Locking,
            sequence_max_retries: 8,
            sequence_backoff_ms: 5,
            invoice_number_width: DEFAULT_NUMBER_WIDTH,
            use_persistent_stores: false,
            database_url: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("BILLFORGE_SEQUENCE_STRATEGY") {
            config.sequence_strategy = v.parse()?;
        }
        if let Some(v) = lookup("BILLFORGE_SEQUENCE_MAX_RETRIES") {
            config.sequence_max_retries = v
                .trim()
                .parse()
                .with_context(|| format!("invalid BILLFORGE_SEQUENCE_MAX_RETRIES '{v}'"))?;
        }
        if let Some(v) = lookup("BILLFORGE_SEQUENCE_BACKOFF_MS") {
            config.sequence_backoff_ms = v
                .trim()
                .parse()
                .with_context(|| format!("invalid BILLFORGE_SEQUENCE_BACKOFF_MS '{v}'"))?;
        }
        if let Some(v) = lookup("BILLFORGE_INVOICE_NUMBER_WIDTH") {
            config.invoice_number_width = v
                .trim()
                .parse()
                .with_context(|| format!("invalid BILLFORGE_INVOICE_NUMBER_WIDTH '{v}'"))?;
        }
        if let Some(v) = lookup("USE_PERSISTENT_STORES") {
            config.use_persistent_stores = v.trim().parse::<bool>().unwrap_or(false);
        }
        config.database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        if config.use_persistent_stores && config.database_url.is_none() {
            bail!("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
        }
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.sequence_max_retries.max(1),
            initial_backoff: Duration::from_millis(self.sequence_backoff_ms),
            max_backoff: MAX_BACKOFF.max(Duration::from_millis(self.sequence_backoff_ms)),
        }
    }
}

/// Allocator for the configured strategy over `store`.
pub fn build_allocator<S>(config: &EngineConfig, store: S) -> Arc<dyn SequenceAllocator>
where
    S: SequenceStore + 'static,
{
    match config.sequence_strategy {
        SequenceStrategy::Locking => Arc::new(LockingSequenceAllocator::with_policy(
            store,
            config.retry_policy(),
        )),
        SequenceStrategy::Optimistic => Arc::new(OptimisticSequenceAllocator::with_policy(
            store,
            config.retry_policy(),
        )),
    }
}

/// Sequence store selected by `USE_PERSISTENT_STORES`.
pub async fn build_sequence_store(config: &EngineConfig) -> anyhow::Result<Arc<dyn SequenceStore>> {
    if config.use_persistent_stores {
        #[cfg(feature = "postgres")]
        {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
            let store = crate::sequence::PostgresSequenceStore::connect(url)
                .await
                .context("failed to connect to Postgres")?;
            store
                .ensure_schema()
                .await
                .context("failed to create invoice_sequences table")?;
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "postgres"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true without the postgres feature, using in-memory store"
            );
        }
    }

    Ok(Arc::new(InMemorySequenceStore::new()))
}
