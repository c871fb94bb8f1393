//! Append-only durable index of processed keys.
//!
//! The on-disk file is newline-delimited JSON, one record per key. It doubles
//! as a write-ahead log: the append is fsynced before the in-memory set is
//! updated, and the orchestrator only appends after the corresponding output
//! is durably written, making the index entry the commit marker for an item.
//!
//! The in-memory set is deliberately decoupled from the durability logic so
//! it can be swapped for another structure without touching the file format.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::retry::RetryFs;

/// Errors that can occur with the index
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt index line {line} in {path}: {reason}")]
    Corrupt {
        path: String,
        line: usize,
        reason: String,
    },
}

/// One record per uniquely processed item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecord {
    /// The dedupe key (content hash or lemma)
    #[serde(alias = "hash")]
    pub key: String,

    /// When the item was first committed
    pub first_seen_at: DateTime<Utc>,

    /// Where the item came from (filename, inbox line, ...)
    pub source_descriptor: String,
}

/// Crash-safe membership record hydrated into memory at startup.
pub struct DurableIndex {
    path: PathBuf,
    fs: RetryFs,
    keys: HashSet<String>,
}

impl DurableIndex {
    /// Load the index from disk, treating a missing file as empty.
    ///
    /// A malformed final line is the signature of a crash mid-append and is
    /// discarded with a warning; a malformed line anywhere else means real
    /// corruption and fails the load.
    pub async fn load(path: PathBuf, fs: RetryFs) -> Result<Self, IndexError> {
        let mut keys = HashSet::new();

        if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            let lines: Vec<&str> = content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .collect();

            for (i, line) in lines.iter().enumerate() {
                match serde_json::from_str::<IndexRecord>(line) {
                    Ok(record) => {
                        keys.insert(record.key);
                    }
                    Err(e) if i == lines.len() - 1 => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "Discarding truncated tail line in index"
                        );
                    }
                    Err(e) => {
                        return Err(IndexError::Corrupt {
                            path: path.display().to_string(),
                            line: i + 1,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        debug!(path = %path.display(), keys = keys.len(), "Index loaded");
        Ok(Self { path, fs, keys })
    }

    /// O(1) membership test against the hydrated set.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Number of indexed keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the index holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Durably append a key. Returns `false` if the key was already present
    /// (a no-op, not an error). The on-disk append is fsynced before the
    /// in-memory set is updated.
    pub async fn append(&mut self, key: &str, source: &str) -> Result<bool, IndexError> {
        if self.keys.contains(key) {
            return Ok(false);
        }

        let record = IndexRecord {
            key: key.to_string(),
            first_seen_at: Utc::now(),
            source_descriptor: source.to_string(),
        };

        let json = serde_json::to_string(&record)?;
        self.fs.append_line(&self.path, &json).await?;
        self.keys.insert(record.key);

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open(path: PathBuf) -> DurableIndex {
        DurableIndex::load(path, RetryFs::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let index = open(temp.path().join("index.jsonl")).await;
        assert!(index.is_empty());
        assert!(!index.contains("anything"));
    }

    #[tokio::test]
    async fn test_append_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.jsonl");

        let mut index = open(path.clone()).await;
        assert!(index.append("abc123", "clip.m4a").await.unwrap());
        assert!(index.contains("abc123"));

        // Fresh load sees the same key
        let reloaded = open(path).await;
        assert!(reloaded.contains("abc123"));
        assert_eq!(reloaded.len(), 1);
    }

    #[tokio::test]
    async fn test_append_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.jsonl");

        let mut index = open(path.clone()).await;
        assert!(index.append("dup", "first").await.unwrap());
        assert!(!index.append("dup", "second").await.unwrap());

        // Only one physical record
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_tail_is_discarded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.jsonl");

        let mut index = open(path.clone()).await;
        index.append("good", "a").await.unwrap();

        // Simulate a crash mid-append
        let mut content = tokio::fs::read_to_string(&path).await.unwrap();
        content.push_str("{\"key\": \"half-writ");
        tokio::fs::write(&path, content).await.unwrap();

        let reloaded = open(path).await;
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.contains("good"));
    }

    #[tokio::test]
    async fn test_malformed_interior_line_fails_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.jsonl");

        tokio::fs::write(&path, "not json at all\n{\"key\":\"k\",\"firstSeenAt\":\"2025-01-01T00:00:00Z\",\"sourceDescriptor\":\"s\"}\n")
            .await
            .unwrap();

        let result = DurableIndex::load(path, RetryFs::default()).await;
        assert!(matches!(result, Err(IndexError::Corrupt { line: 1, .. })));
    }

    #[tokio::test]
    async fn test_reads_hash_field_alias() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.jsonl");

        tokio::fs::write(
            &path,
            "{\"hash\":\"deadbeef\",\"firstSeenAt\":\"2025-01-01T00:00:00Z\",\"sourceDescriptor\":\"old.m4a\"}\n",
        )
        .await
        .unwrap();

        let index = open(path).await;
        assert!(index.contains("deadbeef"));
    }
}
