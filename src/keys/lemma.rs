//! Lemma extraction for free-text captures.
//!
//! A capture like "I have to print this page." should dedupe against every
//! other capture of the verb "print", so the key is a normalized lemma, not
//! the raw text. The rules are deliberately English-only; anything the rules
//! cannot reduce degrades to the verbatim-phrase or fallback branches.
//!
//! The strategy is a trait so per-language rules can be swapped in without
//! touching the orchestrator.

use std::collections::HashSet;

/// Result of lemma derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LemmaOutcome {
    /// A usable dedupe key
    Key(String),

    /// The capture carries no extractable content (e.g. a long sentence of
    /// stopwords ending in terminal punctuation) and should be dropped
    Skip,
}

/// Strategy for reducing raw captured text to a canonical key.
pub trait LemmaStrategy: Send + Sync {
    /// Derive the lemma for a raw capture.
    fn derive(&self, text: &str) -> LemmaOutcome;
}

/// Fixed English stopword set used by [`EnglishLemma`].
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "i", "you", "he", "she", "it", "we", "they", "am", "is",
    "are", "was", "were", "be", "been", "being", "do", "does", "did", "have",
    "has", "had", "will", "would", "shall", "should", "can", "could", "may",
    "might", "must", "to", "of", "in", "on", "at", "by", "for", "with",
    "from", "as", "and", "or", "but", "not", "no", "so", "if", "then",
    "than", "that", "this", "these", "those", "there", "here", "my", "your",
    "his", "her", "its", "our", "their", "me", "him", "us", "them", "what",
    "when", "where", "who", "whom", "why", "how",
];

/// Rule-based English lemma extraction.
///
/// Branch order, first match wins:
/// 1. Three tokens or fewer: the trimmed phrase verbatim (idioms survive)
/// 2. "to \<verb\>" present: that verb
/// 3. Exactly one token survives stopword removal: that token
/// 4. Five to eight tokens: the trimmed phrase verbatim (instructions and
///    commands are kept whole)
/// 5. Otherwise: the preferred target token if it survived, else the longest
///    survivor (first in original order on a length tie); with no survivors,
///    skip when the sentence ends in terminal punctuation, else fall back to
///    the first three raw tokens
pub struct EnglishLemma {
    stopwords: HashSet<&'static str>,

    /// Literal token that wins over the longest-survivor rule when present
    target: Option<String>,
}

impl Default for EnglishLemma {
    fn default() -> Self {
        Self::new()
    }
}

impl EnglishLemma {
    /// Create the strategy with the fixed stopword set and no target token.
    pub fn new() -> Self {
        Self {
            stopwords: STOPWORDS.iter().copied().collect(),
            target: None,
        }
    }

    /// Prefer a specific literal token whenever it survives stopword removal.
    pub fn with_target(mut self, token: &str) -> Self {
        self.target = Some(normalize(token));
        self
    }

    fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    /// Find the verb in the first "to <verb>" pattern, if any.
    ///
    /// A stopword after "to" is not treated as a verb ("to the store" must
    /// not yield "the"), so scanning continues past it.
    fn to_verb(&self, tokens: &[&str]) -> Option<String> {
        for pair in tokens.windows(2) {
            if normalize(pair[0]) == "to" {
                let candidate = normalize(pair[1]);
                if !candidate.is_empty()
                    && candidate.chars().all(|c| c.is_alphabetic())
                    && !self.is_stopword(&candidate)
                {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

impl LemmaStrategy for EnglishLemma {
    fn derive(&self, text: &str) -> LemmaOutcome {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return LemmaOutcome::Skip;
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();

        // Short idiomatic phrases are preserved intact
        if tokens.len() <= 3 {
            return LemmaOutcome::Key(trimmed.to_string());
        }

        if let Some(verb) = self.to_verb(&tokens) {
            return LemmaOutcome::Key(verb);
        }

        let survivors: Vec<String> = tokens
            .iter()
            .map(|t| normalize(t))
            .filter(|t| !t.is_empty() && !self.is_stopword(t))
            .collect();

        // A lone content word is the lemma regardless of phrase length
        if let [only] = survivors.as_slice() {
            return LemmaOutcome::Key(only.clone());
        }

        // Instruction/command length: keep the phrase whole
        if (5..=8).contains(&tokens.len()) {
            return LemmaOutcome::Key(trimmed.to_string());
        }

        if survivors.is_empty() {
            // Nothing content-bearing left; a finished sentence is dropped,
            // a fragment keeps its first three raw tokens
            if trimmed.ends_with(['.', '!', '?']) {
                return LemmaOutcome::Skip;
            }
            return LemmaOutcome::Key(tokens[..3].join(" "));
        }

        if let Some(target) = &self.target {
            if let Some(hit) = survivors.iter().find(|s| *s == target) {
                return LemmaOutcome::Key(hit.clone());
            }
        }

        // Longest survivor as a proxy for the most content-bearing word;
        // ties resolve to the first in original order, so only a strictly
        // longer token displaces the current pick
        let mut longest = &survivors[0];
        for s in &survivors[1..] {
            if s.chars().count() > longest.chars().count() {
                longest = s;
            }
        }
        LemmaOutcome::Key(longest.clone())
    }
}

/// Lowercase a token and trim surrounding punctuation, keeping internal
/// apostrophes ("that's" stays whole).
fn normalize(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}
