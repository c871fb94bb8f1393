//! Bounded-retry wrappers for filesystem mutations.
//!
//! The inbox and state files live in a cloud-synced directory whose sync
//! daemon takes short-lived exclusive locks, so a write or rename can fail
//! transiently and succeed a moment later. Every mutating operation goes
//! through [`RetryFs`]; reads are never retried.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Retry policy for transient filesystem failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    4
}
fn default_initial_delay() -> u64 {
    250
}
fn default_max_delay() -> u64 {
    2000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Calculate delay for a specific attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms);
        }

        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Filesystem mutations with bounded retry.
#[derive(Debug, Clone, Default)]
pub struct RetryFs {
    policy: RetryPolicy,
}

impl RetryFs {
    /// Create with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run a mutating operation, retrying on any error until the policy is
    /// exhausted. The final error is returned unchanged.
    async fn retrying<T, F, Fut>(&self, what: &str, path: &Path, mut op: F) -> std::io::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::io::Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if self.policy.should_retry(attempt) => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        op = what,
                        path = %path.display(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Filesystem mutation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Write a whole file (created or fully replaced) and fsync it.
    pub async fn write(&self, path: &Path, contents: &[u8]) -> std::io::Result<()> {
        self.retrying("write", path, || async move {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)
                .await?;
            file.write_all(contents).await?;
            file.sync_all().await
        })
        .await
    }

    /// Append one line to a file, fsynced before returning.
    ///
    /// The caller must not include the trailing newline.
    pub async fn append_line(&self, path: &Path, line: &str) -> std::io::Result<()> {
        self.retrying("append", path, || async move {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(format!("{}\n", line).as_bytes()).await?;
            file.sync_all().await
        })
        .await
    }

    /// Rename (move) a file.
    pub async fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        self.retrying("rename", from, || async move {
            tokio::fs::rename(from, to).await
        })
        .await
    }

    /// Copy a file, returning bytes copied.
    pub async fn copy(&self, from: &Path, to: &Path) -> std::io::Result<u64> {
        self.retrying("copy", from, || async move { tokio::fs::copy(from, to).await })
            .await
    }

    /// Truncate a file to empty without deleting it.
    pub async fn truncate(&self, path: &Path) -> std::io::Result<()> {
        self.retrying("truncate", path, || async move {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)
                .await?;
            file.sync_all().await
        })
        .await
    }
}
