//! Pass orchestration.
//!
//! One scheduled invocation = one pass. The lock prevents overlapping
//! invocations; the orchestrator drives both capture streams through
//! normalize → index check → enrich → commit → index, then gates rotation.

pub mod lock;
pub mod orchestrator;

pub use lock::{LockError, RunLock};
pub use orchestrator::{Orchestrator, PassReport, StreamReport};
