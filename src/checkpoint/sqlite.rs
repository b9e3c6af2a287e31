//! SQLite checkpoint backend.

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::info;

use super::CheckpointStore;
use crate::error::{Error, Result};
use crate::models::{ReplicationOutcome, ReplicationRecord};

/// SQLITE_NOTADB
const NOT_A_DATABASE: &str = "26";

pub struct SqliteStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredRecord {
    remote_order_id: String,
    processed_at: String,
    outcome: String,
    replicated_size: Option<String>,
    order_id: Option<String>,
    detail: Option<String>,
}

impl SqliteStore {
    /// Connect to `database_url` (e.g. `sqlite:state.db`), creating the
    /// database if needed.
    pub async fn open(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| Error::Configuration(format!("invalid database url: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        // One connection: a single writer, and `sqlite::memory:` stays one database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(classify)?;

        let store = Self { pool };
        store.run_migrations().await?;

        info!(url = %database_url, "SQLite checkpoint store opened");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS replication_records (
                remote_order_id TEXT PRIMARY KEY,
                processed_at TEXT NOT NULL,
                outcome TEXT NOT NULL,
                replicated_size TEXT,
                order_id TEXT,
                detail TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn load(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT remote_order_id FROM replication_records")
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn has(&self, remote_order_id: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM replication_records WHERE remote_order_id = ?")
                .bind(remote_order_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(classify)?;

        Ok(row.is_some())
    }

    async fn record(&self, record: &ReplicationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO replication_records
                (remote_order_id, processed_at, outcome, replicated_size, order_id, detail)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.remote_order_id)
        .bind(record.processed_at.to_rfc3339())
        .bind(record.outcome.as_str())
        .bind(record.replicated_size.map(|d| d.to_string()))
        .bind(&record.order_id)
        .bind(&record.detail)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn records(&self) -> Result<Vec<ReplicationRecord>> {
        let rows = sqlx::query_as::<_, StoredRecord>(
            "SELECT * FROM replication_records ORDER BY processed_at, rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        rows.into_iter().map(StoredRecord::into_record).collect()
    }
}

impl StoredRecord {
    fn into_record(self) -> Result<ReplicationRecord> {
        let corrupt = |what: &str, e: &dyn std::fmt::Display| {
            Error::CorruptState(format!("record {}: bad {}: {}", self.remote_order_id, what, e))
        };

        let processed_at = DateTime::parse_from_rfc3339(&self.processed_at)
            .map_err(|e| corrupt("processed_at", &e))?
            .with_timezone(&Utc);
        let outcome =
            ReplicationOutcome::from_str(&self.outcome).map_err(|e| corrupt("outcome", &e))?;
        let replicated_size = self
            .replicated_size
            .as_deref()
            .map(Decimal::from_str)
            .transpose()
            .map_err(|e| corrupt("replicated_size", &e))?;

        Ok(ReplicationRecord {
            remote_order_id: self.remote_order_id,
            processed_at,
            outcome,
            replicated_size,
            order_id: self.order_id,
            detail: self.detail,
        })
    }
}

fn classify(e: sqlx::Error) -> Error {
    let not_a_database = e
        .as_database_error()
        .and_then(|d| d.code())
        .is_some_and(|code| code == NOT_A_DATABASE);

    if not_a_database {
        Error::CorruptState(e.to_string())
    } else {
        e.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn memory_store() -> SqliteStore {
        SqliteStore::open("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = memory_store().await;
        assert!(store.load().await.unwrap().is_empty());
        assert!(!store.has("a").await.unwrap());
        assert!(store.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_and_load() {
        let store = memory_store().await;
        store
            .record(&ReplicationRecord::replicated("a", dec!(42.5), "0x1"))
            .await
            .unwrap();
        store
            .record(&ReplicationRecord::failed("b", "REJECTED: market closed"))
            .await
            .unwrap();

        let ids = store.load().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(store.has("a").await.unwrap());

        let records = store.records().await.unwrap();
        let a = records.iter().find(|r| r.remote_order_id == "a").unwrap();
        assert_eq!(a.outcome, ReplicationOutcome::Replicated);
        assert_eq!(a.replicated_size, Some(dec!(42.5)));
        assert_eq!(a.order_id.as_deref(), Some("0x1"));
    }

    #[tokio::test]
    async fn test_first_record_wins() {
        let store = memory_store().await;
        store
            .record(&ReplicationRecord::skipped("a", "BELOW_MIN"))
            .await
            .unwrap();
        store
            .record(&ReplicationRecord::replicated("a", dec!(1), "0x1"))
            .await
            .unwrap();

        let records = store.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, ReplicationOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_unparseable_row_is_corrupt() {
        let store = memory_store().await;
        sqlx::query(
            "INSERT INTO replication_records (remote_order_id, processed_at, outcome) VALUES ('x', 'yesterday', 'SKIPPED')",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let err = store.records().await.unwrap_err();
        assert!(matches!(err, Error::CorruptState(_)));
    }

    #[tokio::test]
    async fn test_non_database_file_is_corrupt() {
        let path = std::env::temp_dir().join(format!("state-{}.db", uuid::Uuid::new_v4()));
        std::fs::write(&path, vec![b'x'; 4096]).unwrap();

        let result = SqliteStore::open(&format!("sqlite:{}", path.display())).await;
        assert!(matches!(result, Err(Error::CorruptState(_))));

        let _ = std::fs::remove_file(&path);
    }
}
