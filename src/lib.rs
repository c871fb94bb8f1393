//! lexipipe - idempotent ingestion of captured vocabulary and audio
//!
//! Two append-only capture streams (short vocabulary snippets and long-form
//! audio) are converted exactly once into durable records: ledger rows for
//! accepted words, transcript files for accepted audio.
//!
//! # Architecture
//!
//! Correctness rests on two invariants:
//! - Every item is reduced to a canonical dedupe key (content hash or lemma)
//!   before any work happens
//! - The durable index is appended only after the output is committed, so an
//!   index entry is the commit marker for an item
//!
//! The pipeline is re-triggered on a schedule and is safe to re-run at any
//! time, including right after a crash mid-pass.
//!
//! # Modules
//!
//! - `keys`: dedupe key derivation (content hash, lemma heuristic)
//! - `store`: durable state (index, ledger, rotation, retrying filesystem)
//! - `inbox`: raw item enumeration for both streams
//! - `adapters`: external collaborators (enrichment, transcription, cards,
//!   media tools)
//! - `pipeline`: run lock and the pass orchestrator
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # One ingestion pass (the scheduled entry point)
//! lexipipe run
//!
//! # Inspect durable state
//! lexipipe status
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod inbox;
pub mod keys;
pub mod pipeline;
pub mod store;

// Re-export main types at crate root for convenience
pub use adapters::{CardClient, CardSyncReport, EnrichedEntry, Enricher, Transcriber};
pub use config::{ResolvedConfig, Secrets};
pub use keys::{EnglishLemma, LemmaOutcome, LemmaStrategy};
pub use pipeline::{Orchestrator, PassReport, RunLock, StreamReport};
pub use store::{
    AppendOutcome, DurableIndex, Ledger, LedgerRow, RetryFs, RetryPolicy, RotationController,
    RotationOutcome,
};
