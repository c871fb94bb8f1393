//! Main orchestrator: one ingestion pass over both capture streams.
//!
//! Per item the order is fixed and load-bearing for crash safety: derive the
//! key, check the index, enrich via the collaborator, durably commit the
//! output, and only then append the key to the index. The index entry is the
//! commit marker — a crash after commit but before the index append costs
//! one repeated collaborator call on the next pass, never a duplicate
//! output, because the ledger's first-field check and the transcript
//! collision suffix both hold.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{media, CardClient, CardSyncReport, Enricher, Transcriber};
use crate::config::ResolvedConfig;
use crate::inbox::{
    date_stamp, load_urls, read_captures, safe_stem, scan_audio, unique_transcript_path,
};
use crate::keys::{hash_file, EnglishLemma, LemmaOutcome, LemmaStrategy};
use crate::store::{
    AppendOutcome, DurableIndex, Ledger, LedgerRow, RetryFs, RotationController, RotationOutcome,
};

/// Per-stream counters for one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamReport {
    pub ok: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StreamReport {
    /// Zero unrecovered errors in this stream
    pub fn clean(&self) -> bool {
        self.failed == 0
    }
}

/// Outcome of one full pass
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub vocab: StreamReport,
    pub audio: StreamReport,
    pub rotated: bool,
    pub cards: Option<CardSyncReport>,
}

/// Drives one pass: enumerate → normalize → check index → enrich → commit →
/// index → maybe rotate.
pub struct Orchestrator {
    config: ResolvedConfig,
    enricher: Box<dyn Enricher>,
    transcriber: Box<dyn Transcriber>,
    cards: Option<CardClient>,
    lemma: Box<dyn LemmaStrategy>,
    fs: RetryFs,
}

impl Orchestrator {
    /// Create an orchestrator from resolved configuration and collaborators.
    pub fn new(
        config: ResolvedConfig,
        enricher: Box<dyn Enricher>,
        transcriber: Box<dyn Transcriber>,
        cards: Option<CardClient>,
    ) -> Self {
        let fs = RetryFs::new(config.retry.clone());
        Self {
            config,
            enricher,
            transcriber,
            cards,
            lemma: Box::new(EnglishLemma::new()),
            fs,
        }
    }

    /// Swap the lemma strategy (e.g. for another language).
    pub fn with_lemma_strategy(mut self, strategy: Box<dyn LemmaStrategy>) -> Self {
        self.lemma = strategy;
        self
    }

    /// Verify required collaborators before any mutation.
    ///
    /// Failure here is a setup failure and aborts the whole pass.
    pub async fn preflight(&self) -> Result<()> {
        if let Some(cards) = &self.cards {
            let version = cards
                .version()
                .await
                .context("Card service preflight failed")?;
            debug!(version, "Card service reachable");
        }
        Ok(())
    }

    /// Run one full ingestion pass. Safe to invoke at any time, including
    /// right after a crash mid-pass.
    #[instrument(skip_all)]
    pub async fn run_pass(&self) -> Result<PassReport> {
        let pass_id = Uuid::new_v4();
        info!(%pass_id, "Starting ingestion pass");

        self.ensure_directories().await?;

        let rotation = RotationController::new(
            self.config.home.clone(),
            self.config.words_inbox(),
            self.config.archive_dir(),
            self.fs.clone(),
        );
        let now = Local::now();
        rotation.purge_stale(now.date_naive()).await?;

        let audio = self.process_audio().await?;
        let (vocab, batch) = self.process_vocab().await?;

        // Rotation is gated strictly on a clean text stream
        let rotated = if vocab.clean() {
            matches!(
                rotation.rotate_if_due(Local::now()).await?,
                RotationOutcome::Rotated { .. }
            )
        } else {
            info!(
                failed = vocab.failed,
                "Skipping rotation: text stream had failures"
            );
            false
        };

        let cards = self.sync_cards(&vocab, &batch).await;

        info!(
            %pass_id,
            vocab_ok = vocab.ok,
            vocab_skipped = vocab.skipped,
            vocab_failed = vocab.failed,
            audio_ok = audio.ok,
            audio_skipped = audio.skipped,
            audio_failed = audio.failed,
            rotated,
            "Pass finished"
        );

        Ok(PassReport {
            vocab,
            audio,
            rotated,
            cards,
        })
    }

    async fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.config.home.clone(),
            self.config.inbox_dir.clone(),
            self.config.transcripts_dir(),
            self.config.archive_dir(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    /// Process the text inbox: one ledger row per newly accepted lemma.
    async fn process_vocab(&self) -> Result<(StreamReport, Vec<LedgerRow>)> {
        let mut index = DurableIndex::load(self.config.vocab_index(), self.fs.clone())
            .await
            .context("Failed to load vocabulary index")?;
        let mut ledger = Ledger::open(
            self.config.ledger_path.clone(),
            self.config.snapshot_path(),
            self.fs.clone(),
        )
        .await
        .context("Failed to open ledger")?;

        // Bounded snapshot: lines arriving mid-pass wait for the next pass
        let captures = read_captures(&self.config.words_inbox()).await?;
        let today = Local::now().format("%Y-%m-%d").to_string();

        let mut report = StreamReport::default();

        for capture in captures {
            let key = match self.lemma.derive(&capture.text) {
                LemmaOutcome::Key(key) => key,
                LemmaOutcome::Skip => {
                    info!(
                        line_no = capture.line_no,
                        text = %capture.text,
                        "No extractable content, skipping"
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            if index.contains(&key) {
                debug!(key = %key, "Already processed, skipping");
                report.skipped += 1;
                continue;
            }

            // Collaborator failure fails only this item
            let entry = match self.enricher.enrich(&key).await {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(key = %key, error = %e, "Enrichment failed");
                    report.failed += 1;
                    continue;
                }
            };

            let row = LedgerRow {
                word_en: entry.word_en,
                word_pt: entry.word_pt,
                sentence_pt: entry.sentence_pt,
                sentence_en: entry.sentence_en,
                date_added: today.clone(),
            };

            // Commit the output first; the index append is the commit marker
            let outcome = match ledger.append_row(row).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(key = %key, error = %e, "Ledger append failed");
                    report.failed += 1;
                    continue;
                }
            };

            let source = format!("words_inbox.jsonl:{}", capture.line_no);
            if let Err(e) = index.append(&key, &source).await {
                warn!(
                    key = %key,
                    error = %e,
                    "Output committed but index append failed; item retries next pass"
                );
                report.failed += 1;
                continue;
            }

            match outcome {
                AppendOutcome::Appended => report.ok += 1,
                AppendOutcome::Duplicate => {
                    info!(key = %key, "Lemma already in ledger, indexed as duplicate");
                    report.skipped += 1;
                }
            }
        }

        ledger
            .write_snapshot()
            .await
            .context("Failed to write latest-batch snapshot")?;

        Ok((report, ledger.batch().to_vec()))
    }

    /// Process the audio inbox: one transcript file per newly seen hash.
    async fn process_audio(&self) -> Result<StreamReport> {
        self.download_queued_urls().await;

        let mut index = DurableIndex::load(self.config.audio_index(), self.fs.clone())
            .await
            .context("Failed to load audio index")?;

        let files = scan_audio(&self.config.inbox_dir).await?;
        let mut report = StreamReport::default();

        for audio in files {
            let file_name = audio
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();

            let hash = match hash_file(&audio).await {
                Ok(hash) => hash,
                Err(e) => {
                    warn!(file = %file_name, error = %e, "Failed to hash audio file");
                    report.failed += 1;
                    continue;
                }
            };

            if index.contains(&hash) {
                debug!(file = %file_name, key = %hash, "Already transcribed, skipping");
                report.skipped += 1;
                // Archive anyway so the inbox does not reaccumulate duplicates
                self.archive_audio(&audio, &file_name).await;
                continue;
            }

            match self.transcribe_one(&audio, &hash).await {
                Ok(transcript) => {
                    if let Err(e) = index.append(&hash, &file_name).await {
                        warn!(
                            file = %file_name,
                            error = %e,
                            "Transcript committed but index append failed; item retries next pass"
                        );
                        report.failed += 1;
                        continue;
                    }
                    info!(file = %file_name, transcript = %transcript.display(), "Transcribed");
                    report.ok += 1;
                    self.archive_audio(&audio, &file_name).await;
                }
                Err(e) => {
                    warn!(file = %file_name, error = %e, "Transcription failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Fetch queued URLs into the inbox. A downloader failure is logged and
    /// the pass continues with whatever audio is already on disk.
    async fn download_queued_urls(&self) {
        let urls = match load_urls(&self.config.urls_file()).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!(error = %e, "Failed to read URL queue");
                return;
            }
        };

        if urls.is_empty() {
            return;
        }

        if let Err(e) = media::download_audio(
            &self.config.tools.ytdlp,
            &urls,
            &self.config.inbox_dir,
            &self.config.download_archive(),
            self.config.tools.timeout,
        )
        .await
        {
            warn!(error = %e, "URL download failed; continuing with files on disk");
        }
    }

    /// Transcribe one file and durably write its transcript.
    async fn transcribe_one(&self, audio: &Path, hash: &str) -> Result<PathBuf> {
        let stamp = date_stamp(audio).await?;
        let stem = safe_stem(
            &audio
                .file_stem()
                .unwrap_or_default()
                .to_string_lossy(),
        );
        let base = format!("{} {}", stamp, stem);
        let txt_path = unique_transcript_path(&self.config.transcripts_dir(), &base).await;

        let size = tokio::fs::metadata(audio).await?.len();
        let mut working = audio.to_path_buf();
        let mut temp: Option<PathBuf> = None;

        if size > self.config.api.max_upload_bytes {
            info!(file = %audio.display(), size, "Compressing oversize audio for upload");
            working = media::compress_for_upload(
                &self.config.tools.ffmpeg,
                audio,
                self.config.tools.timeout,
            )
            .await?;
            temp = Some(working.clone());
        }

        let language = self.config.api.language.as_deref();
        let result = self.transcriber.transcribe(&working, language).await;

        // The compressed copy is throwaway either way
        if let Some(temp) = temp {
            if let Err(e) = tokio::fs::remove_file(&temp).await {
                warn!(path = %temp.display(), error = %e, "Failed to remove compressed copy");
            }
        }

        let text = result?;

        let file_name = audio
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let content = format!(
            "DateStamp {}\nAudioFile {}\nSha256 {}\nModel {}\nLanguageHint {}\n\n{}\n",
            stamp,
            file_name,
            hash,
            self.config.api.transcribe_model,
            language.unwrap_or("auto"),
            text,
        );

        self.fs
            .write(&txt_path, content.as_bytes())
            .await
            .with_context(|| format!("Failed to write transcript: {}", txt_path.display()))?;

        Ok(txt_path)
    }

    /// Move processed audio out of the inbox; a failed move is logged only.
    async fn archive_audio(&self, audio: &Path, file_name: &str) {
        let dest = self.config.archive_dir().join(file_name);
        if let Err(e) = self.fs.rename(audio, &dest).await {
            warn!(file = %file_name, error = %e, "Failed to archive audio file");
        }
    }

    /// Offer this pass's new rows to the card service.
    async fn sync_cards(&self, vocab: &StreamReport, batch: &[LedgerRow]) -> Option<CardSyncReport> {
        let cards = self.cards.as_ref()?;

        if !vocab.clean() || batch.is_empty() {
            return None;
        }

        match cards.push_rows(batch).await {
            Ok(report) => {
                info!(
                    accepted = report.accepted,
                    duplicates = report.duplicates,
                    "Card sync finished"
                );
                Some(report)
            }
            Err(e) => {
                // At-least-once: the rows stay in the ledger and can be
                // offered again from the snapshot
                warn!(error = %e, "Card sync failed");
                None
            }
        }
    }
}
