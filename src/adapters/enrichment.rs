//! Enrichment collaborator: lemma in, four canonical fields out.
//!
//! Talks to an OpenAI-compatible chat completions endpoint and asks for a
//! strict JSON object. The response contract is the four ledger fields;
//! anything missing or empty fails the item.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{EnrichedEntry, Enricher};

const SYSTEM_PROMPT: &str = "You are a European Portuguese vocabulary assistant. \
Given an English word or phrase, reply with a JSON object containing exactly \
these string fields: word_en (the canonical English form), word_pt (the \
European Portuguese translation), sentence_pt (a natural example sentence in \
European Portuguese using word_pt), sentence_en (its English translation). \
Reply with the JSON object only.";

/// Wire shape of the chat completions response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// The four-field payload the model must return
#[derive(Debug, Deserialize)]
struct EntryPayload {
    word_en: String,
    word_pt: String,
    sentence_pt: String,
    sentence_en: String,
}

/// Chat-API-backed enricher.
pub struct OpenAiEnricher {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiEnricher {
    /// Create an enricher against an OpenAI-compatible base URL.
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
impl Enricher for OpenAiEnricher {
    async fn enrich(&self, lemma: &str) -> Result<EnrichedEntry> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": lemma },
                ],
                "response_format": { "type": "json_object" },
            }))
            .send()
            .await
            .context("Failed to reach enrichment API")?
            .error_for_status()
            .context("Enrichment API returned an error status")?;

        let chat: ChatResponse = response
            .json()
            .await
            .context("Failed to parse enrichment response")?;

        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .context("Enrichment response had no choices")?;

        parse_entry(content)
    }
}

/// Parse and validate the model's JSON payload.
fn parse_entry(content: &str) -> Result<EnrichedEntry> {
    let payload: EntryPayload = serde_json::from_str(content.trim())
        .context("Enrichment payload was not the expected JSON object")?;

    for (name, value) in [
        ("word_en", &payload.word_en),
        ("word_pt", &payload.word_pt),
        ("sentence_pt", &payload.sentence_pt),
        ("sentence_en", &payload.sentence_en),
    ] {
        if value.trim().is_empty() {
            anyhow::bail!("Enrichment payload field '{}' is empty", name);
        }
    }

    Ok(EnrichedEntry {
        word_en: payload.word_en,
        word_pt: payload.word_pt,
        sentence_pt: payload.sentence_pt,
        sentence_en: payload.sentence_en,
    })
}
