//! Canonical dedupe key derivation.
//!
//! Every raw item is reduced to a single key before the index is consulted:
//! - Audio: a streaming SHA-256 digest over the file bytes (`content_hash`)
//! - Text: a lemma chosen by a pluggable normalization strategy (`lemma`)

pub mod content_hash;
pub mod lemma;

pub use content_hash::hash_file;
pub use lemma::{EnglishLemma, LemmaOutcome, LemmaStrategy};
