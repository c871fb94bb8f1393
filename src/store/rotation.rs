//! Once-daily rotation of the raw text inbox.
//!
//! Rotation runs only after a fully clean pass and at most once per calendar
//! day. The order is fixed: archive the inbox under a timestamped backup,
//! truncate it to empty, then write the day's stamp. The stamp is written
//! last so a crash between steps can never cause double rotation, and the
//! backup is retained so truncation is always recoverable.

use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDate};
use thiserror::Error;
use tracing::{info, warn};

use super::retry::RetryFs;

/// Stamp filename prefix; the date is the suffix
const STAMP_PREFIX: &str = "rotated_";

/// Errors that can occur during rotation
#[derive(Debug, Error)]
pub enum RotationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a rotation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// Inbox archived and truncated; stamp written
    Rotated { backup: Option<PathBuf> },

    /// Today's stamp already exists; nothing touched
    AlreadyRotated,
}

/// Gates inbox truncation on a daily stamp.
pub struct RotationController {
    /// Directory holding stamp files
    state_dir: PathBuf,

    /// The raw text inbox being rotated
    inbox: PathBuf,

    /// Where timestamped inbox backups land
    archive_dir: PathBuf,

    fs: RetryFs,
}

impl RotationController {
    /// Create a controller for one inbox file.
    pub fn new(state_dir: PathBuf, inbox: PathBuf, archive_dir: PathBuf, fs: RetryFs) -> Self {
        Self {
            state_dir,
            inbox,
            archive_dir,
            fs,
        }
    }

    fn stamp_path(&self, date: NaiveDate) -> PathBuf {
        self.state_dir
            .join(format!("{}{}", STAMP_PREFIX, date.format("%Y-%m-%d")))
    }

    /// Whether today's rotation already happened.
    pub fn is_rotated(&self, today: NaiveDate) -> bool {
        self.stamp_path(today).exists()
    }

    /// Remove stamps from prior days so exactly one stamp can exist.
    ///
    /// Called at the start of every run. Returns how many were purged.
    pub async fn purge_stale(&self, today: NaiveDate) -> Result<usize, RotationError> {
        if !self.state_dir.exists() {
            return Ok(0);
        }

        let keep = self.stamp_path(today);
        let mut purged = 0usize;

        let mut entries = tokio::fs::read_dir(&self.state_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if name.starts_with(STAMP_PREFIX) && path != keep {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "Failed to purge stale stamp");
                } else {
                    purged += 1;
                }
            }
        }

        Ok(purged)
    }

    /// Rotate the inbox unless today's stamp already exists.
    ///
    /// The caller is responsible for only invoking this after a clean pass.
    pub async fn rotate_if_due(
        &self,
        now: DateTime<Local>,
    ) -> Result<RotationOutcome, RotationError> {
        let today = now.date_naive();
        if self.is_rotated(today) {
            return Ok(RotationOutcome::AlreadyRotated);
        }

        let backup = if self.inbox.exists() {
            tokio::fs::create_dir_all(&self.archive_dir).await?;
            let backup = self.backup_path(now);
            self.fs.copy(&self.inbox, &backup).await?;
            self.fs.truncate(&self.inbox).await?;
            Some(backup)
        } else {
            None
        };

        // Stamp write is last: it is the sole gate the next run checks
        tokio::fs::create_dir_all(&self.state_dir).await?;
        self.fs
            .write(
                &self.stamp_path(today),
                format!("{}\n", today.format("%Y-%m-%d")).as_bytes(),
            )
            .await?;

        info!(inbox = %self.inbox.display(), backup = ?backup, "Inbox rotated");

        Ok(RotationOutcome::Rotated { backup })
    }

    fn backup_path(&self, now: DateTime<Local>) -> PathBuf {
        let stem = self
            .inbox
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "inbox".to_string());
        let ext = self
            .inbox
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        self.archive_dir.join(format!(
            "{}_{}{}",
            stem,
            now.format("%Y%m%d-%H%M%S"),
            ext
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn controller(temp: &TempDir) -> RotationController {
        RotationController::new(
            temp.path().join("state"),
            temp.path().join("words_inbox.jsonl"),
            temp.path().join("archive"),
            RetryFs::default(),
        )
    }

    fn local(date: &str, time: &str) -> DateTime<Local> {
        let naive = format!("{}T{}", date, time)
            .parse::<chrono::NaiveDateTime>()
            .unwrap();
        naive.and_local_timezone(Local).unwrap()
    }

    #[tokio::test]
    async fn test_rotate_archives_truncates_and_stamps() {
        let temp = TempDir::new().unwrap();
        let ctl = controller(&temp);
        let inbox = temp.path().join("words_inbox.jsonl");
        tokio::fs::write(&inbox, "{\"word\":\"airport\"}\n").await.unwrap();

        let now = local("2025-06-01", "09:30:00");
        let outcome = ctl.rotate_if_due(now).await.unwrap();

        let RotationOutcome::Rotated { backup: Some(backup) } = outcome else {
            panic!("expected rotation with backup");
        };

        // Backup holds the original content, inbox is empty but present
        let archived = tokio::fs::read_to_string(&backup).await.unwrap();
        assert_eq!(archived, "{\"word\":\"airport\"}\n");
        assert!(inbox.exists());
        assert_eq!(tokio::fs::read(&inbox).await.unwrap().len(), 0);

        assert!(ctl.is_rotated(now.date_naive()));
    }

    #[tokio::test]
    async fn test_at_most_once_per_day() {
        let temp = TempDir::new().unwrap();
        let ctl = controller(&temp);
        let inbox = temp.path().join("words_inbox.jsonl");
        tokio::fs::write(&inbox, "line one\n").await.unwrap();

        let now = local("2025-06-01", "09:30:00");
        assert!(matches!(
            ctl.rotate_if_due(now).await.unwrap(),
            RotationOutcome::Rotated { .. }
        ));

        // Inbox refills during the day; later runs must not rotate again
        tokio::fs::write(&inbox, "line two\n").await.unwrap();
        let later = local("2025-06-01", "21:00:00");
        assert_eq!(
            ctl.rotate_if_due(later).await.unwrap(),
            RotationOutcome::AlreadyRotated
        );
        assert_eq!(
            tokio::fs::read_to_string(&inbox).await.unwrap(),
            "line two\n"
        );
    }

    #[tokio::test]
    async fn test_next_day_resets_to_pending() {
        let temp = TempDir::new().unwrap();
        let ctl = controller(&temp);
        tokio::fs::write(temp.path().join("words_inbox.jsonl"), "x\n")
            .await
            .unwrap();

        let day_one = local("2025-06-01", "12:00:00");
        ctl.rotate_if_due(day_one).await.unwrap();

        let day_two = local("2025-06-02", "12:00:00");
        ctl.purge_stale(day_two.date_naive()).await.unwrap();
        assert!(!ctl.is_rotated(day_two.date_naive()));
        assert!(matches!(
            ctl.rotate_if_due(day_two).await.unwrap(),
            RotationOutcome::Rotated { .. }
        ));
    }

    #[tokio::test]
    async fn test_purge_keeps_only_todays_stamp() {
        let temp = TempDir::new().unwrap();
        let ctl = controller(&temp);
        let state = temp.path().join("state");
        tokio::fs::create_dir_all(&state).await.unwrap();
        tokio::fs::write(state.join("rotated_2025-05-30"), "").await.unwrap();
        tokio::fs::write(state.join("rotated_2025-05-31"), "").await.unwrap();
        tokio::fs::write(state.join("rotated_2025-06-01"), "").await.unwrap();

        let purged = ctl
            .purge_stale("2025-06-01".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(purged, 2);
        assert!(state.join("rotated_2025-06-01").exists());
    }

    #[tokio::test]
    async fn test_missing_inbox_still_stamps() {
        let temp = TempDir::new().unwrap();
        let ctl = controller(&temp);

        let now = local("2025-06-01", "08:00:00");
        assert_eq!(
            ctl.rotate_if_due(now).await.unwrap(),
            RotationOutcome::Rotated { backup: None }
        );
        assert!(ctl.is_rotated(now.date_naive()));
    }
}
