//! Durable record of which remote orders have been handled.
//!
//! A successful [`CheckpointStore::record`] survives a process crash. The
//! content only ever grows.

mod journal;
mod sqlite;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ReplicationRecord;

pub use journal::JournalStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Ids of every durably recorded remote order. A missing or empty store
    /// is an empty set.
    async fn load(&self) -> Result<HashSet<String>>;

    async fn has(&self, remote_order_id: &str) -> Result<bool>;

    /// Persist `record` before returning. Recording an id that is already
    /// present leaves the first record in place.
    async fn record(&self, record: &ReplicationRecord) -> Result<()>;

    /// Every record, oldest first.
    async fn records(&self) -> Result<Vec<ReplicationRecord>>;
}

/// Open the store at `location`: a `sqlite:` URL or a journal file path.
pub async fn open(location: &str) -> Result<Box<dyn CheckpointStore>> {
    if location.starts_with("sqlite:") {
        Ok(Box::new(SqliteStore::open(location).await?))
    } else {
        Ok(Box::new(JournalStore::open(location).await?))
    }
}
