//! Adapters for external collaborators.
//!
//! Each collaborator has a narrow contract and is replaceable: enrichment
//! returns exactly four strings for a lemma, transcription returns plain
//! text for an audio file, card sync creates-if-absent, and the media tools
//! are shell-outs. Failures here are per-item; nothing in this module
//! touches the engine's durable state.

pub mod cards;
pub mod enrichment;
pub mod media;
pub mod transcription;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

pub use cards::{CardClient, CardSyncReport};
pub use enrichment::OpenAiEnricher;
pub use transcription::{normalize_language, OpenAiTranscriber};

/// Canonical-form result for a lemma. All four fields are required; a
/// response missing any of them is a hard failure for that item.
#[derive(Debug, Clone)]
pub struct EnrichedEntry {
    pub word_en: String,
    pub word_pt: String,
    pub sentence_pt: String,
    pub sentence_en: String,
}

/// Collaborator that enriches a lemma into a four-field entry.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, lemma: &str) -> Result<EnrichedEntry>;
}

/// Collaborator that transcribes an audio byte stream to plain text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<String>;
}
