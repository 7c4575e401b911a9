//! Transcript parity oracle for a Zork reimplementation vs the reference engine.
//!
//! Compares two session transcripts for the same command sequence, classifies
//! every differing command as an RNG difference, a state divergence, or a
//! logic difference, aggregates parity across seeds, and gates regressions
//! against a persisted baseline.
//!
//! The only comparison entry point is [`TranscriptComparator`]; the
//! classifier is not reachable from outside this crate.

pub mod aggregate;
pub mod baseline;
mod classify;
pub mod compare;
pub mod error;
pub mod extract;
pub mod patterns;
pub mod pools;
pub mod recommend;
pub mod report;
pub mod runner;
pub mod transcript;

pub use aggregate::{
    AggregatorConfig, CommandPlan, ParityAggregator, ParityResult, RegressionVerdict, SeedResult,
    SeedStatus, UnavailableSeed, Verdict, check_regression,
};
pub use baseline::{Baseline, BaselineLock, BaselineStore, next_baseline};
pub use classify::Classification;
pub use compare::{
    ClassifiedDifference, Comparison, DifferenceSignature, MISSING_ENTRY_REASON,
    TranscriptComparator,
};
pub use error::{ParityError, RunnerError};
pub use extract::{ExtractedMessage, extract, extract_at, is_movement_command};
pub use pools::PoolId;
pub use report::ParityReport;
pub use runner::SessionRunner;
pub use transcript::{RawOutputBlock, Side, Transcript};
