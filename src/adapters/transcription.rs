//! Transcription collaborator: audio bytes in, plain text out.
//!
//! Uploads the file to an OpenAI-compatible `audio/transcriptions` endpoint
//! as multipart form data, with an optional ISO-639-1 language hint that
//! biases the model strongly toward that language.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use super::Transcriber;

/// Wire shape of the transcription response
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper-style HTTP transcriber.
pub struct OpenAiTranscriber {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiTranscriber {
    /// Create a transcriber against an OpenAI-compatible base URL.
    pub fn new(base_url: String, api_key: String, model: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            timeout,
        }
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<String> {
        let url = format!("{}/audio/transcriptions", self.base_url);

        let file_name = audio
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let bytes = tokio::fs::read(audio)
            .await
            .with_context(|| format!("Failed to read audio file: {}", audio.display()))?;

        let file_part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;

        let mut form = Form::new()
            .text("model", self.model.clone())
            .part("file", file_part);
        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .context("Failed to reach transcription API")?
            .error_for_status()
            .context("Transcription API returned an error status")?;

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .context("Failed to parse transcription response")?;

        let text = parsed.text.trim().to_string();
        if text.is_empty() {
            anyhow::bail!("No transcript text returned by API");
        }

        Ok(text)
    }
}

/// Reduce a configured language preference to its ISO-639-1 head.
///
/// The API expects two-letter codes, so "pt-PT", "pt_BR" and "português" all
/// normalize to "pt". An empty input falls back to "pt".
pub fn normalize_language(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();

    match lower.as_str() {
        "pt-pt" | "pt_pt" | "ptpt" | "pt-br" | "pt_br" | "ptbr" | "portuguese" | "português" => {
            return "pt".to_string();
        }
        _ => {}
    }

    let head = lower
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .to_string();

    if head.is_empty() {
        "pt".to_string()
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_language_variants() {
        assert_eq!(normalize_language("pt-PT"), "pt");
        assert_eq!(normalize_language("pt_BR"), "pt");
        assert_eq!(normalize_language("Portuguese"), "pt");
        assert_eq!(normalize_language("en-US"), "en");
        assert_eq!(normalize_language("fr"), "fr");
        assert_eq!(normalize_language("  "), "pt");
    }
}
