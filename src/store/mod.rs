//! Durable state for the ingestion engine.
//!
//! Everything here lives on a cloud-synced filesystem, so every mutation
//! goes through [`RetryFs`] to absorb the sync daemon's transient locks:
//! - `index`: append-only record of fully processed keys
//! - `ledger`: the ever-growing CSV of enriched vocabulary rows
//! - `rotation`: once-daily archive-and-truncate of the raw text inbox

pub mod index;
pub mod ledger;
pub mod retry;
pub mod rotation;

pub use index::{DurableIndex, IndexError, IndexRecord};
pub use ledger::{AppendOutcome, Ledger, LedgerError, LedgerRow};
pub use retry::{RetryFs, RetryPolicy};
pub use rotation::{RotationController, RotationError, RotationOutcome};
