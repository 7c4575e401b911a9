//! Session runners for the Zork parity oracle.
//!
//! A runner plays a command sequence on one engine and returns the raw
//! transcript. [`TranscriptDirRunner`] replays transcripts recorded on disk;
//! [`ProcessRunner`] drives live engine processes over stdin/stdout.

pub mod dir;
pub mod process;

pub use dir::{RecordingRunner, TranscriptDir, TranscriptDirRunner};
pub use process::{EngineCommand, ProcessRunner, DEFAULT_PROMPT};
