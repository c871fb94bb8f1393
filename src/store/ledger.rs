//! Append-only CSV ledger of enriched vocabulary rows.
//!
//! One physical line per logical row, RFC 4180 quoting, fixed header
//! validated on every open. Rows are never rewritten or reordered; the only
//! overwrite this component performs is the latest-batch snapshot, which is
//! fully replaced on each pass.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use super::retry::RetryFs;

/// Fixed ledger header, validated on open
pub const LEDGER_HEADER: &str = "word_en,word_pt,sentence_pt,sentence_en,date_added";

/// Errors that can occur with the ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger header mismatch in {path}: found {found:?}")]
    BadHeader { path: String, found: String },

    #[error("Malformed ledger row at line {line}: {reason}")]
    BadRow { line: usize, reason: String },

    #[error("Row has an empty required field: {field}")]
    EmptyField { field: &'static str },
}

/// One accepted vocabulary record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub word_en: String,
    pub word_pt: String,
    pub sentence_pt: String,
    pub sentence_en: String,
    pub date_added: String,
}

impl LedgerRow {
    fn validate(&self) -> Result<(), LedgerError> {
        for (field, value) in [
            ("word_en", &self.word_en),
            ("word_pt", &self.word_pt),
            ("sentence_pt", &self.sentence_pt),
            ("sentence_en", &self.sentence_en),
            ("date_added", &self.date_added),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::EmptyField { field });
            }
        }
        Ok(())
    }

    fn to_line(&self) -> String {
        [
            &self.word_en,
            &self.word_pt,
            &self.sentence_pt,
            &self.sentence_en,
            &self.date_added,
        ]
        .iter()
        .map(|f| quote_field(f))
        .collect::<Vec<_>>()
        .join(",")
    }
}

/// Result of an append attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Row was written
    Appended,

    /// A historical row already carries this first field; nothing written
    Duplicate,
}

/// The canonical vocabulary table plus its latest-batch snapshot.
pub struct Ledger {
    path: PathBuf,
    snapshot_path: PathBuf,
    fs: RetryFs,

    /// Lowercased first fields of every historical row
    seen_words: HashSet<String>,

    /// Rows appended during this pass
    batch: Vec<LedgerRow>,
}

impl Ledger {
    /// Open the ledger, creating it with the fixed header when missing.
    ///
    /// An existing file must start with the exact header; every historical
    /// row's first field is hydrated for the coarse duplicate check. A
    /// malformed final row is the signature of a crash mid-append and is
    /// dropped from the file with a warning; a malformed row anywhere else
    /// means real corruption and fails the open.
    pub async fn open(
        path: PathBuf,
        snapshot_path: PathBuf,
        fs: RetryFs,
    ) -> Result<Self, LedgerError> {
        let mut seen_words = HashSet::new();

        if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            let mut lines = content.lines();

            match lines.next() {
                Some(header) if header == LEDGER_HEADER => {}
                Some(header) => {
                    return Err(LedgerError::BadHeader {
                        path: path.display().to_string(),
                        found: header.to_string(),
                    });
                }
                None => {
                    // Zero-byte file: rewrite the header
                    fs.write(&path, format!("{}\n", LEDGER_HEADER).as_bytes())
                        .await?;
                }
            }

            let data: Vec<(usize, &str)> = content
                .lines()
                .enumerate()
                .skip(1)
                .filter(|(_, l)| !l.trim().is_empty())
                .collect();

            let mut dropped_tail = None;
            for (pos, (i, line)) in data.iter().enumerate() {
                match parse_line(line).filter(|f| f.len() == 5) {
                    Some(fields) => {
                        seen_words.insert(fields[0].trim().to_lowercase());
                    }
                    None if pos + 1 == data.len() => {
                        warn!(
                            path = %path.display(),
                            line = i + 1,
                            "Discarding truncated tail row in ledger"
                        );
                        dropped_tail = Some(*i);
                    }
                    None => {
                        let reason = match parse_line(line) {
                            None => "unbalanced quoting".to_string(),
                            Some(f) => format!("expected 5 fields, found {}", f.len()),
                        };
                        return Err(LedgerError::BadRow { line: i + 1, reason });
                    }
                }
            }

            // Drop the partial tail on disk too, so the next append starts
            // on a fresh physical line instead of extending the fragment
            if let Some(drop) = dropped_tail {
                let repaired: String = content
                    .lines()
                    .enumerate()
                    .filter(|(i, _)| *i != drop)
                    .map(|(_, l)| format!("{}\n", l))
                    .collect();
                fs.write(&path, repaired.as_bytes()).await?;
            }
        } else {
            fs.write(&path, format!("{}\n", LEDGER_HEADER).as_bytes())
                .await?;
        }

        debug!(path = %path.display(), words = seen_words.len(), "Ledger opened");

        Ok(Self {
            path,
            snapshot_path,
            fs,
            seen_words,
            batch: Vec::new(),
        })
    }

    /// Count distinct historical words without opening the ledger for
    /// writing. A missing file is zero; malformed rows are not counted.
    ///
    /// For inspection only (`status` and the like): nothing on disk is
    /// created or repaired.
    pub async fn word_count(path: &Path) -> Result<usize, LedgerError> {
        if !path.exists() {
            return Ok(0);
        }

        let content = tokio::fs::read_to_string(path).await?;
        let mut words = HashSet::new();
        for line in content.lines().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(fields) = parse_line(line).filter(|f| f.len() == 5) {
                words.insert(fields[0].trim().to_lowercase());
            }
        }
        Ok(words.len())
    }

    /// Whether a word already exists as a first-field match.
    pub fn contains_word(&self, word: &str) -> bool {
        self.seen_words.contains(&word.trim().to_lowercase())
    }

    /// Number of historical rows (by distinct first field).
    pub fn len(&self) -> usize {
        self.seen_words.len()
    }

    /// Whether the ledger holds no rows.
    pub fn is_empty(&self) -> bool {
        self.seen_words.is_empty()
    }

    /// Append one row. A first-field duplicate is skipped with a
    /// distinguishable outcome, not an error.
    pub async fn append_row(&mut self, row: LedgerRow) -> Result<AppendOutcome, LedgerError> {
        row.validate()?;

        let word_key = row.word_en.trim().to_lowercase();
        if self.seen_words.contains(&word_key) {
            return Ok(AppendOutcome::Duplicate);
        }

        self.fs.append_line(&self.path, &row.to_line()).await?;
        self.seen_words.insert(word_key);
        self.batch.push(row);

        Ok(AppendOutcome::Appended)
    }

    /// Rows appended during this pass.
    pub fn batch(&self) -> &[LedgerRow] {
        &self.batch
    }

    /// Replace the latest-batch snapshot with this pass's rows.
    ///
    /// This is the single place in the engine permitted to overwrite rather
    /// than append.
    pub async fn write_snapshot(&self) -> Result<(), LedgerError> {
        let mut out = String::from(LEDGER_HEADER);
        out.push('\n');
        for row in &self.batch {
            out.push_str(&row.to_line());
            out.push('\n');
        }

        self.fs.write(&self.snapshot_path, out.as_bytes()).await?;
        Ok(())
    }
}

/// Quote a field per RFC 4180: wrap when it contains a comma, quote, or
/// newline, doubling embedded quotes.
fn quote_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Parse one physical CSV line. Returns `None` on unbalanced quoting.
fn parse_line(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }

    if in_quotes {
        return None;
    }

    fields.push(current);
    Some(fields)
}
