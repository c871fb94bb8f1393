//! Card sync collaborator (AnkiConnect-style local service).
//!
//! Create-if-absent semantics: the service dedupes on the note's first field
//! (word_en), so offering the same row twice is harmless. The engine treats
//! this as at-least-once delivery; the index and ledger remain the source of
//! truth.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::store::LedgerRow;

/// Wire shape of an AnkiConnect response
#[derive(Debug, Deserialize)]
struct ConnectResponse<T> {
    result: Option<T>,
    error: Option<String>,
}

/// Accepted/duplicate counts from one sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardSyncReport {
    pub accepted: usize,
    pub duplicates: usize,
}

/// Client for the local card service.
pub struct CardClient {
    client: reqwest::Client,
    endpoint: String,
    deck: String,
    note_model: String,
    timeout: Duration,
}

impl CardClient {
    /// Create a client for a local AnkiConnect endpoint.
    pub fn new(endpoint: String, deck: String, note_model: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            deck,
            note_model,
            timeout,
        }
    }

    async fn invoke<T: serde::de::DeserializeOwned>(
        &self,
        action: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&json!({
                "action": action,
                "version": 6,
                "params": params,
            }))
            .send()
            .await
            .with_context(|| format!("Failed to reach card service at {}", self.endpoint))?
            .error_for_status()
            .context("Card service returned an error status")?;

        let parsed: ConnectResponse<T> = response
            .json()
            .await
            .context("Failed to parse card service response")?;

        if let Some(error) = parsed.error {
            anyhow::bail!("Card service error: {}", error);
        }

        parsed
            .result
            .context("Card service response had no result")
    }

    /// Preflight check: the service must be reachable before a pass that
    /// intends to sync. Returns the protocol version.
    pub async fn version(&self) -> Result<u64> {
        self.invoke("version", json!({})).await
    }

    /// Offer rows as notes; existing notes (by first-field match) come back
    /// as duplicates, not errors.
    pub async fn push_rows(&self, rows: &[LedgerRow]) -> Result<CardSyncReport> {
        if rows.is_empty() {
            return Ok(CardSyncReport::default());
        }

        let notes: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| {
                json!({
                    "deckName": self.deck,
                    "modelName": self.note_model,
                    "fields": {
                        "word_en": row.word_en,
                        "word_pt": row.word_pt,
                        "sentence_pt": row.sentence_pt,
                        "sentence_en": row.sentence_en,
                    },
                    "options": {
                        "allowDuplicate": false,
                        "duplicateScope": "deck",
                    },
                })
            })
            .collect();

        let ids: Vec<Option<u64>> = self
            .invoke("addNotes", json!({ "notes": notes }))
            .await?;

        let accepted = ids.iter().filter(|id| id.is_some()).count();
        let report = CardSyncReport {
            accepted,
            duplicates: ids.len() - accepted,
        };

        debug!(
            accepted = report.accepted,
            duplicates = report.duplicates,
            "Card sync finished"
        );

        Ok(report)
    }
}
