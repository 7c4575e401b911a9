//! Error types for the parity oracle.

use std::path::PathBuf;

use crate::transcript::Side;

/// Errors from persistence and run setup.
///
/// Comparison itself never fails; see [`crate::extract`] and
/// [`crate::compare`] for how bad input is reported.
#[derive(Debug, thiserror::Error)]
pub enum ParityError {
    #[error(
        "baseline {} is locked by another validation run ({holder}); \
         remove {} if that run is no longer alive",
        path.display(),
        lock_path.display()
    )]
    BaselineLocked {
        path: PathBuf,
        lock_path: PathBuf,
        /// Holder recorded in the lock file, e.g. "pid 4242".
        holder: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("could not start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl ParityError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ParityError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a session runner could not produce a transcript.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("{side} engine unavailable for seed {seed}: {reason}")]
    Unavailable { side: Side, seed: u64, reason: String },

    #[error("I/O error talking to {side} engine: {source}")]
    Io {
        side: Side,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {side} transcript for seed {seed}: {reason}")]
    Malformed { side: Side, seed: u64, reason: String },
}

impl RunnerError {
    pub fn side(&self) -> Side {
        match self {
            RunnerError::Unavailable { side, .. }
            | RunnerError::Io { side, .. }
            | RunnerError::Malformed { side, .. } => *side,
        }
    }
}
