//! Raw item enumeration for both capture streams.
//!
//! The inboxes are produced by external capture mechanisms and are read-only
//! to this engine (the text inbox is truncated only by rotation). Each pass
//! works on a bounded snapshot of what enumeration saw; items arriving
//! mid-pass are picked up next time.

pub mod audio;
pub mod text;

pub use audio::{
    date_stamp, load_urls, safe_stem, scan_audio, unique_transcript_path, AUDIO_EXTS,
};
pub use text::{read_captures, InboxError, TextCapture};
