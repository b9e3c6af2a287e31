//! Append-only JSON-lines journal.
//!
//! Each record is one line, flushed to disk before `record` returns. A final
//! line without its newline is a write that never completed; it is ignored on
//! read and cut off when the journal is opened.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::CheckpointStore;
use crate::error::{Error, Result};
use crate::models::ReplicationRecord;

pub struct JournalStore {
    path: PathBuf,
    inner: Mutex<Journal>,
}

struct Journal {
    file: File,
    /// Length of the journal up to the last complete line
    len: u64,
    index: HashSet<String>,
}

/// Records parsed from journal text, plus the byte length they cover.
struct Parsed {
    records: Vec<ReplicationRecord>,
    valid_len: usize,
    torn: bool,
}

impl JournalStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let existed = fs::try_exists(&path).await?;

        let content = read_journal(&path).await?;
        let parsed = parse(&content)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        if parsed.torn {
            warn!(
                path = %path.display(),
                bytes = content.len() - parsed.valid_len,
                "Discarding incomplete trailing journal entry"
            );
            file.set_len(parsed.valid_len as u64).await?;
            file.sync_all().await?;
        }

        if !existed {
            sync_parent_dir(&path).await?;
        }

        let index: HashSet<String> = parsed
            .records
            .iter()
            .map(|r| r.remote_order_id.clone())
            .collect();

        info!(path = %path.display(), records = index.len(), "Journal opened");

        Ok(Self {
            path,
            inner: Mutex::new(Journal {
                file,
                len: parsed.valid_len as u64,
                index,
            }),
        })
    }
}

#[async_trait]
impl CheckpointStore for JournalStore {
    async fn load(&self) -> Result<HashSet<String>> {
        let content = read_journal(&self.path).await?;
        Ok(parse(&content)?
            .records
            .into_iter()
            .map(|r| r.remote_order_id)
            .collect())
    }

    async fn has(&self, remote_order_id: &str) -> Result<bool> {
        Ok(self.inner.lock().await.index.contains(remote_order_id))
    }

    async fn record(&self, record: &ReplicationRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| Error::Storage(format!("failed to encode record: {}", e)))?;
        line.push('\n');

        let mut journal = self.inner.lock().await;
        if journal.index.contains(&record.remote_order_id) {
            debug!(id = %record.remote_order_id, "Already recorded");
            return Ok(());
        }

        if let Err(e) = append(&mut journal.file, line.as_bytes()).await {
            // Cut off a partial line so the next append starts clean
            let len = journal.len;
            if let Err(rollback) = journal.file.set_len(len).await {
                warn!(error = %rollback, "Failed to roll back partial journal write");
            }
            return Err(e.into());
        }

        journal.len += line.len() as u64;
        journal.index.insert(record.remote_order_id.clone());
        Ok(())
    }

    async fn records(&self) -> Result<Vec<ReplicationRecord>> {
        let content = read_journal(&self.path).await?;
        Ok(parse(&content)?.records)
    }
}

async fn append(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_data().await
}

async fn read_journal(path: &Path) -> Result<String> {
    match fs::read(path).await {
        Ok(bytes) => String::from_utf8(bytes)
            .map_err(|e| Error::CorruptState(format!("{}: not UTF-8: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

fn parse(content: &str) -> Result<Parsed> {
    let (complete, torn) = match content.rfind('\n') {
        Some(i) => (&content[..=i], i + 1 < content.len()),
        None => ("", !content.is_empty()),
    };

    let mut records = Vec::new();
    for (n, line) in complete.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: ReplicationRecord = serde_json::from_str(line).map_err(|e| {
            Error::CorruptState(format!("journal line {}: {}", n + 1, e))
        })?;
        records.push(record);
    }

    Ok(Parsed {
        records,
        valid_len: complete.len(),
        torn,
    })
}

#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(parent).await?.sync_all().await?;
    Ok(())
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}
