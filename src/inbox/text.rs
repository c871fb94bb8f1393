//! The newline-delimited JSON word inbox.
//!
//! One object per line, minimally `{"word": "..."}`; unknown keys are
//! ignored. Malformed lines are logged and skipped, never fatal.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur reading an inbox
#[derive(Debug, Error)]
pub enum InboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire shape of one inbox line
#[derive(Debug, Deserialize)]
struct CaptureLine {
    word: String,

    #[serde(default)]
    captured_at: Option<DateTime<Utc>>,
}

/// One raw text capture, read-only to the engine.
#[derive(Debug, Clone)]
pub struct TextCapture {
    /// The captured text, as written
    pub text: String,

    /// Optional capture timestamp from the capture side
    pub captured_at: Option<DateTime<Utc>>,

    /// 1-based line number, for log context
    pub line_no: usize,
}

/// Read all well-formed captures from the inbox.
///
/// A missing file is an empty inbox. Each malformed or empty line is skipped
/// with a warning carrying its line number so it can be replayed by hand.
pub async fn read_captures(path: &Path) -> Result<Vec<TextCapture>, InboxError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = tokio::fs::read_to_string(path).await?;
    let mut captures = Vec::new();

    for (i, line) in content.lines().enumerate() {
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<CaptureLine>(line) {
            Ok(parsed) if !parsed.word.trim().is_empty() => {
                captures.push(TextCapture {
                    text: parsed.word,
                    captured_at: parsed.captured_at,
                    line_no,
                });
            }
            Ok(_) => {
                warn!(path = %path.display(), line_no, "Skipping capture with empty word");
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line_no,
                    error = %e,
                    "Skipping malformed inbox line"
                );
            }
        }
    }

    Ok(captures)
}
