//! PostgreSQL quote store.
//!
//! Uses `PostgreSQL` via `SQLx`. Column names match the `real_time_prices`
//! table read by the existing analysis notebooks.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use crate::application::ports::{QuoteStore, StoreError};
use crate::domain::quote::Batch;

/// Target table.
pub const TABLE_NAME: &str = "real_time_prices";

const CREATE_TABLE: &str = r"
    CREATE TABLE IF NOT EXISTS real_time_prices (
        id BIGSERIAL PRIMARY KEY,
        ticker TEXT NOT NULL,
        price DOUBLE PRECISION NOT NULL,
        volume BIGINT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        fetch_time TIMESTAMPTZ NOT NULL
    )
";

/// Postgres caps a statement at 65535 bind parameters; five per row.
const MAX_ROWS_PER_STATEMENT: usize = 10_000;

/// `QuoteStore` backed by a `PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresQuoteStore {
    pool: PgPool,
}

impl PostgresQuoteStore {
    /// Connect with a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!(max_connections, "PostgreSQL connection pool initialized");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Server version string (`SELECT version()`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the query fails.
    pub async fn server_version(&self) -> Result<String, StoreError> {
        sqlx::query_scalar::<_, String>("SELECT version()")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl QuoteStore for PostgresQuoteStore {
    async fn ensure_table(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        debug!(table = TABLE_NAME, "Table ensured");
        Ok(())
    }

    async fn append_batch(&self, batch: &Batch) -> Result<u64, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut written = 0;

        for chunk in batch.as_slice().chunks(MAX_ROWS_PER_STATEMENT) {
            let mut insert: QueryBuilder<'_, Postgres> = QueryBuilder::new(
                "INSERT INTO real_time_prices (ticker, price, volume, timestamp, fetch_time) ",
            );
            insert.push_values(chunk, |mut row, obs| {
                row.push_bind(obs.ticker().as_str())
                    .push_bind(obs.price())
                    .push_bind(obs.volume())
                    .push_bind(obs.event_timestamp())
                    .push_bind(obs.fetch_timestamp());
            });

            let result = insert
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            written += result.rows_affected();
        }

        // Dropping `tx` on an early return above rolls the batch back.
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(rows = written, "Batch committed");
        Ok(written)
    }

    async fn row_count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM real_time_prices")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let count: i64 = row.try_get("n").map_err(map_sqlx_error)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Connection(err.to_string()),
        other => StoreError::Query(other.to_string()),
    }
}
