//! End-to-end idempotency tests for the ingestion pass.
//!
//! The contract under test: re-running a pass over already-processed input
//! produces no new ledger rows, no new transcripts, and no repeated
//! collaborator calls, and a crash between output commit and index append
//! costs at most one repeated collaborator call, never a duplicate output.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use lexipipe::adapters::{EnrichedEntry, Enricher, Transcriber};
use lexipipe::config::{ApiSettings, ResolvedConfig, ToolPaths};
use lexipipe::store::RetryPolicy;
use lexipipe::Orchestrator;

/// Deterministic enricher that records how often it was called.
#[derive(Clone, Default)]
struct FakeEnricher {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Enricher for FakeEnricher {
    async fn enrich(&self, lemma: &str) -> anyhow::Result<EnrichedEntry> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(EnrichedEntry {
            word_en: lemma.to_string(),
            word_pt: format!("{}-pt", lemma),
            sentence_pt: format!("Uma frase com {}.", lemma),
            sentence_en: format!("A sentence with {}.", lemma),
        })
    }
}

/// Fixed-text transcriber that records how often it was called.
#[derive(Clone, Default)]
struct FakeTranscriber {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _audio: &Path, _language: Option<&str>) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("olá mundo".to_string())
    }
}

fn test_config(temp: &TempDir) -> ResolvedConfig {
    let home = temp.path().join("state");
    ResolvedConfig {
        home: home.clone(),
        inbox_dir: temp.path().join("inbox"),
        config_file: None,
        api: ApiSettings::default(),
        cards: None,
        retry: RetryPolicy::default(),
        tools: ToolPaths::default(),
        ledger_path: home.join("ledger.csv"),
    }
}

fn orchestrator(
    config: ResolvedConfig,
    enricher: &FakeEnricher,
    transcriber: &FakeTranscriber,
) -> Orchestrator {
    Orchestrator::new(
        config,
        Box::new(enricher.clone()),
        Box::new(transcriber.clone()),
        None,
    )
}

async fn write_inbox_line(config: &ResolvedConfig, word: &str) {
    tokio::fs::create_dir_all(&config.inbox_dir).await.unwrap();
    let mut content = tokio::fs::read_to_string(config.words_inbox())
        .await
        .unwrap_or_default();
    content.push_str(&format!("{{\"word\": \"{}\"}}\n", word));
    tokio::fs::write(config.words_inbox(), content).await.unwrap();
}

async fn ledger_lines(config: &ResolvedConfig) -> Vec<String> {
    tokio::fs::read_to_string(&config.ledger_path)
        .await
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

async fn transcripts(config: &ResolvedConfig) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(config.transcripts_dir()).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        if entry.path().extension().map(|e| e == "txt").unwrap_or(false) {
            found.push(entry.path());
        }
    }
    found.sort();
    found
}

#[tokio::test]
async fn test_vocab_reprocessing_adds_nothing() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let enricher = FakeEnricher::default();
    let transcriber = FakeTranscriber::default();

    write_inbox_line(&config, "I have to print this page.").await;

    let engine = orchestrator(config.clone(), &enricher, &transcriber);
    let first = engine.run_pass().await.unwrap();
    assert_eq!(first.vocab.ok, 1);
    assert_eq!(first.vocab.failed, 0);
    assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);

    let lines = ledger_lines(&config).await;
    assert_eq!(lines.len(), 2); // header + one row
    assert!(lines[1].starts_with("print,"));

    // A later capture of the same verb dedupes against the index
    write_inbox_line(&config, "to print").await;
    let second = engine.run_pass().await.unwrap();
    assert_eq!(second.vocab.ok, 0);
    assert_eq!(second.vocab.skipped, 1);
    assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(ledger_lines(&config).await.len(), 2);
}

#[tokio::test]
async fn test_duplicate_lemma_within_one_pass() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let enricher = FakeEnricher::default();
    let transcriber = FakeTranscriber::default();

    write_inbox_line(&config, "I have to print this page.").await;
    write_inbox_line(&config, "remember to print the tickets tomorrow morning ok").await;

    let engine = orchestrator(config.clone(), &enricher, &transcriber);
    let report = engine.run_pass().await.unwrap();

    // The second capture reduces to the same lemma and hits the index
    // entry the first one just wrote
    assert_eq!(report.vocab.ok, 1);
    assert_eq!(report.vocab.skipped, 1);
    assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(ledger_lines(&config).await.len(), 2);
}

#[tokio::test]
async fn test_committed_row_without_index_entry_recovers() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let enricher = FakeEnricher::default();
    let transcriber = FakeTranscriber::default();

    // Simulate a crash after the ledger append but before the index append:
    // the row exists, the index does not know about it
    tokio::fs::create_dir_all(&config.home).await.unwrap();
    tokio::fs::write(
        &config.ledger_path,
        "word_en,word_pt,sentence_pt,sentence_en,date_added\n\
         print,imprimir,Uma frase.,A sentence.,2026-08-01\n",
    )
    .await
    .unwrap();

    write_inbox_line(&config, "I have to print this page.").await;

    let engine = orchestrator(config.clone(), &enricher, &transcriber);
    let report = engine.run_pass().await.unwrap();

    // One repeated enrichment call, but the ledger's first-field check
    // refuses a second row and the index entry is backfilled
    assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.vocab.ok, 0);
    assert_eq!(report.vocab.skipped, 1);
    assert_eq!(report.vocab.failed, 0);
    assert_eq!(ledger_lines(&config).await.len(), 2);

    // From here on the key is fully committed: no more collaborator calls
    write_inbox_line(&config, "to print").await;
    let again = engine.run_pass().await.unwrap();
    assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(again.vocab.skipped, 1);
}

#[tokio::test]
async fn test_truncated_ledger_tail_does_not_block_passes() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let enricher = FakeEnricher::default();
    let transcriber = FakeTranscriber::default();

    // Crash mid-append left a partial row with no trailing newline
    tokio::fs::create_dir_all(&config.home).await.unwrap();
    tokio::fs::write(
        &config.ledger_path,
        "word_en,word_pt,sentence_pt,sentence_en,date_added\n\
         print,imprimir,Uma frase.,A sentence.,2026-08-01\n\
         airport,aerop",
    )
    .await
    .unwrap();

    write_inbox_line(&config, "we will be at the airport").await;

    // The pass must not be wedged by the fragment: it is dropped and the
    // interrupted item goes through again
    let engine = orchestrator(config.clone(), &enricher, &transcriber);
    let report = engine.run_pass().await.unwrap();
    assert_eq!(report.vocab.ok, 1);
    assert_eq!(report.vocab.failed, 0);

    let lines = ledger_lines(&config).await;
    assert_eq!(lines.len(), 3); // header + print + fresh airport row
    assert!(lines[2].starts_with("airport,airport-pt"));

    // And the next pass sees it as fully committed
    write_inbox_line(&config, "to the airport now").await;
    let again = engine.run_pass().await.unwrap();
    assert_eq!(again.vocab.skipped, 1);
    assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_audio_dedupe_by_content_hash() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let enricher = FakeEnricher::default();
    let transcriber = FakeTranscriber::default();

    tokio::fs::create_dir_all(&config.inbox_dir).await.unwrap();
    let audio = config.inbox_dir.join("aula de portugues.m4a");
    tokio::fs::write(&audio, b"fake audio bytes").await.unwrap();

    let engine = orchestrator(config.clone(), &enricher, &transcriber);
    let first = engine.run_pass().await.unwrap();
    assert_eq!(first.audio.ok, 1);
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 1);

    // Processed audio leaves the inbox
    assert!(!audio.exists());
    assert!(config.archive_dir().join("aula de portugues.m4a").exists());

    let transcript = transcripts(&config).await;
    assert_eq!(transcript.len(), 1);
    let content = tokio::fs::read_to_string(&transcript[0]).await.unwrap();
    assert!(content.contains("Sha256 "));
    assert!(content.ends_with("olá mundo\n"));

    // The same bytes under a new name dedupe by content hash
    let renamed = config.inbox_dir.join("same talk again.m4a");
    tokio::fs::write(&renamed, b"fake audio bytes").await.unwrap();

    let second = engine.run_pass().await.unwrap();
    assert_eq!(second.audio.ok, 0);
    assert_eq!(second.audio.skipped, 1);
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 1);
    assert_eq!(transcripts(&config).await.len(), 1);

    // The duplicate is archived too so the inbox stays clean
    assert!(!renamed.exists());
    assert!(config.archive_dir().join("same talk again.m4a").exists());
}

#[tokio::test]
async fn test_failed_transcription_retries_next_pass() {
    /// Fails the first call, succeeds afterwards.
    struct FlakyTranscriber {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transcriber for FlakyTranscriber {
        async fn transcribe(
            &self,
            _audio: &Path,
            _language: Option<&str>,
        ) -> anyhow::Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("service unavailable");
            }
            Ok("segunda tentativa".to_string())
        }
    }

    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let calls = Arc::new(AtomicUsize::new(0));

    tokio::fs::create_dir_all(&config.inbox_dir).await.unwrap();
    let audio = config.inbox_dir.join("flaky.m4a");
    tokio::fs::write(&audio, b"some bytes").await.unwrap();

    let engine = Orchestrator::new(
        config.clone(),
        Box::new(FakeEnricher::default()),
        Box::new(FlakyTranscriber { calls: calls.clone() }),
        None,
    );

    // First pass fails the item; the file stays in the inbox for retry
    let first = engine.run_pass().await.unwrap();
    assert_eq!(first.audio.failed, 1);
    assert!(audio.exists());

    // Second pass picks it up again and commits it
    let second = engine.run_pass().await.unwrap();
    assert_eq!(second.audio.ok, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!audio.exists());
}
