//! Postgres-backed sequence store.
//!
//! One row per period key in `invoice_sequences`. Compare-and-set is a
//! conditional `UPDATE` (or an `INSERT ... ON CONFLICT DO NOTHING` for the
//! first allocation of a period); zero affected rows means another writer got
//! there first.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | SequenceStoreError |
//! |------------|----------------------|--------------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (serialization failure) | `40001` | `Conflict` |
//! | Database (other) | Any other | `Unavailable` |
//! | PoolClosed / Io / other | N/A | `Unavailable` |

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use billforge_core::ExpectedVersion;

use super::store::{SequenceStore, SequenceStoreError};

/// Postgres-backed sequence store.
#[derive(Debug, Clone)]
pub struct PostgresSequenceStore {
    pool: Arc<PgPool>,
    /// Query returning the highest number already issued for `$1` when the
    /// period has no row yet. Must yield one nullable BIGINT column.
    seed_query: Option<String>,
}

impl PostgresSequenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            seed_query: None,
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, SequenceStoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Seed periods without a row from already issued invoices, e.g.
    /// `SELECT MAX(sequence) FROM invoices WHERE period_key = $1`.
    pub fn with_seed_query(mut self, sql: impl Into<String>) -> Self {
        self.seed_query = Some(sql.into());
        self
    }

    /// Create the sequence table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), SequenceStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS invoice_sequences (
                period_key  TEXT PRIMARY KEY,
                last_issued BIGINT NOT NULL CHECK (last_issued >= 0),
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn seed(&self, period_key: &str) -> Result<Option<u64>, SequenceStoreError> {
        let Some(sql) = self.seed_query.as_deref() else {
            return Ok(None);
        };

        let row = sqlx::query(sql)
            .bind(period_key)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("seed", e))?;

        let value: Option<i64> = match row {
            Some(row) => row.try_get(0).map_err(|e| map_sqlx_error("seed", e))?,
            None => None,
        };
        value.map(from_db).transpose()
    }

    async fn insert_first(&self, period_key: &str, next: i64) -> Result<(), SequenceStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO invoice_sequences (period_key, last_issued)
            VALUES ($1, $2)
            ON CONFLICT (period_key) DO NOTHING
            "#,
        )
        .bind(period_key)
        .bind(next)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_sequence", e))?;

        if result.rows_affected() == 0 {
            return Err(SequenceStoreError::Conflict(format!(
                "period '{period_key}' was created concurrently"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SequenceStore for PostgresSequenceStore {
    #[instrument(skip(self), err)]
    async fn load(&self, period_key: &str) -> Result<Option<u64>, SequenceStoreError> {
        let row = sqlx::query("SELECT last_issued FROM invoice_sequences WHERE period_key = $1")
            .bind(period_key)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_sequence", e))?;

        match row {
            Some(row) => {
                let value: i64 = row
                    .try_get("last_issued")
                    .map_err(|e| map_sqlx_error("load_sequence", e))?;
                from_db(value).map(Some)
            }
            None => self.seed(period_key).await,
        }
    }

    #[instrument(skip(self), err)]
    async fn compare_and_set(
        &self,
        period_key: &str,
        expected: ExpectedVersion,
        next: u64,
    ) -> Result<(), SequenceStoreError> {
        let next = to_db(next)?;

        match expected {
            ExpectedVersion::Absent => self.insert_first(period_key, next).await,
            ExpectedVersion::Exact(current) => {
                let result = sqlx::query(
                    r#"
                    UPDATE invoice_sequences
                    SET last_issued = $3, updated_at = now()
                    WHERE period_key = $1 AND last_issued = $2
                    "#,
                )
                .bind(period_key)
                .bind(to_db(current)?)
                .bind(next)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("update_sequence", e))?;

                if result.rows_affected() == 1 {
                    return Ok(());
                }
                // No matching row: either the value moved on, or the current
                // value came from the seed and the row does not exist yet.
                self.insert_first(period_key, next).await
            }
            ExpectedVersion::Any => {
                sqlx::query(
                    r#"
                    INSERT INTO invoice_sequences (period_key, last_issued)
                    VALUES ($1, $2)
                    ON CONFLICT (period_key)
                    DO UPDATE SET
                        last_issued = GREATEST(invoice_sequences.last_issued, EXCLUDED.last_issued),
                        updated_at = now()
                    "#,
                )
                .bind(period_key)
                .bind(next)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("upsert_sequence", e))?;
                Ok(())
            }
        }
    }
}

fn to_db(value: u64) -> Result<i64, SequenceStoreError> {
    i64::try_from(value).map_err(|_| {
        SequenceStoreError::Unavailable(format!("sequence value {value} exceeds BIGINT range"))
    })
}

fn from_db(value: i64) -> Result<u64, SequenceStoreError> {
    u64::try_from(value).map_err(|_| {
        SequenceStoreError::Unavailable(format!("negative sequence value {value} in store"))
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> SequenceStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") => SequenceStoreError::Conflict(msg),
                _ => SequenceStoreError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            SequenceStoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        _ => SequenceStoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}
