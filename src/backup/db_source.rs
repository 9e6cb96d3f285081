// collection-backup/src/backup/db_source.rs
use async_trait::async_trait;
use backon::Retryable;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::errors::{BackupError, Result};
use crate::utils::redact_db_url;
use crate::utils::retry::RetryPolicy;

/// One schema-less document. The pipeline never looks inside it.
pub type Record = serde_json::Value;

/// Something that can be connected to for the duration of a run.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn SourceConnection>>;
}

/// A live handle on the source. Dropped through `close`, exactly once.
#[async_trait]
pub trait SourceConnection: Send + Sync {
    /// Point-in-time list of partition names, in discovery order.
    async fn list_partitions(&self) -> Result<Vec<String>>;

    /// Every record of `partition`, in one logical read.
    async fn read_all(&self, partition: &str) -> Result<Vec<Record>>;

    async fn close(self: Box<Self>);
}

/// PostgreSQL database whose `public` base tables are the partitions.
pub struct PgSource {
    db_url: String,
    retry: RetryPolicy,
}

impl PgSource {
    pub fn new(db_url: impl Into<String>, retry: RetryPolicy) -> Self {
        PgSource {
            db_url: db_url.into(),
            retry,
        }
    }
}

#[async_trait]
impl RecordSource for PgSource {
    async fn connect(&self) -> Result<Box<dyn SourceConnection>> {
        let shown_url = redact_db_url(&self.db_url);
        tracing::info!(url = %shown_url, "Connecting to source database");

        let pool = (|| async {
            PgPoolOptions::new()
                .max_connections(1)
                .connect(&self.db_url)
                .await
        })
        .retry(self.retry.backoff())
        .notify(|err, dur| {
            tracing::warn!(
                error = %err,
                url = %shown_url,
                "Source connection failed. Retrying in {:.1}s",
                dur.as_secs_f32()
            );
        })
        .await
        .map_err(|e| BackupError::SourceConnection(format!("{}: {}", shown_url, e)))?;

        tracing::info!(url = %shown_url, "✅ Connected to source database");
        Ok(Box::new(PgConnection { pool }))
    }
}

struct PgConnection {
    pool: PgPool,
}

#[async_trait]
impl SourceConnection for PgConnection {
    async fn list_partitions(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(LIST_PARTITIONS_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BackupError::Enumeration(e.to_string()))?;

        tracing::info!(count = names.len(), "Found partitions: {:?}", names);
        Ok(names)
    }

    async fn read_all(&self, partition: &str) -> Result<Vec<Record>> {
        let query = read_all_sql(partition);
        let records: Vec<Record> = sqlx::query_scalar(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BackupError::Extraction {
                partition: partition.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(partition, records = records.len(), "Fetched partition records");
        Ok(records)
    }

    async fn close(self: Box<Self>) {
        self.pool.close().await;
        tracing::info!("Source database connection closed");
    }
}

const LIST_PARTITIONS_SQL: &str = "SELECT table_name::text FROM information_schema.tables \
     WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
     ORDER BY table_name";

/// Whole-row extraction. `t.*` always means the row, even when the table has
/// a column named `t`.
fn read_all_sql(partition: &str) -> String {
    format!(
        "SELECT to_jsonb(t.*) AS record FROM {} AS t",
        quote_identifier(partition)
    )
}

/// Quotes a table name for interpolation into SQL.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
