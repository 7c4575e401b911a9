//! Accepted difference profile and its persistence.
//!
//! The baseline is the only durable state of a validation run. It is read
//! once at the start of a run and written at most once at the end, while the
//! run holds an exclusive lock file next to it.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{ParityResult, RegressionVerdict, Verdict};
use crate::classify::Classification;
use crate::compare::DifferenceSignature;
use crate::error::ParityError;

pub const BASELINE_VERSION: u32 = 1;

/// Persisted summary of the last accepted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub total_commands: usize,
    pub logic_parity_percentage: f64,
    pub counts: BTreeMap<Classification, usize>,
    pub signatures: BTreeSet<DifferenceSignature>,
}

impl Baseline {
    pub fn from_result(result: &ParityResult) -> Self {
        Self {
            version: BASELINE_VERSION,
            created_at: Utc::now(),
            total_commands: result.total_commands,
            logic_parity_percentage: result.logic_parity_percentage,
            counts: result.counts(),
            signatures: result.signatures(),
        }
    }

    pub fn count(&self, classification: Classification) -> usize {
        self.counts.get(&classification).copied().unwrap_or(0)
    }
}

/// The baseline to store after a run, if the run may replace `previous`.
///
/// Returns `None` when the regression check failed, when the run was not
/// complete, when transcripts differed in length, or when logic parity
/// would decrease.
pub fn next_baseline(
    current: &ParityResult,
    verdict: Option<&RegressionVerdict>,
    previous: Option<&Baseline>,
) -> Option<Baseline> {
    if !current.is_complete() || current.length_mismatches > 0 {
        return None;
    }
    if current.verdict == Verdict::Incomplete || verdict.is_some_and(|v| !v.passed) {
        return None;
    }
    if let Some(previous) = previous
        && current.logic_parity_percentage < previous.logic_parity_percentage
    {
        return None;
    }
    Some(Baseline::from_result(current))
}

/// Location of a baseline document on disk.
#[derive(Debug, Clone)]
pub struct BaselineStore {
    path: PathBuf,
}

impl BaselineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Take exclusive access to the baseline for one validation run.
    pub fn lock(&self) -> Result<BaselineLock, ParityError> {
        let lock_path = self.lock_path();
        match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(mut file) => {
                let lock = BaselineLock {
                    path: self.path.clone(),
                    lock_path,
                };
                // On failure the lock is dropped, which removes the file again.
                writeln!(file, "{}", std::process::id())
                    .map_err(|e| ParityError::io(&lock.lock_path, e))?;
                Ok(lock)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(ParityError::BaselineLocked {
                holder: lock_holder(&lock_path),
                path: self.path.clone(),
                lock_path,
            }),
            Err(e) => Err(ParityError::io(lock_path, e)),
        }
    }
}

fn lock_holder(lock_path: &Path) -> String {
    fs::read_to_string(lock_path)
        .ok()
        .and_then(|text| text.trim().parse::<u32>().ok())
        .map_or_else(|| "unknown pid".to_string(), |pid| format!("pid {pid}"))
}

/// Exclusive access to a baseline, released on drop.
#[derive(Debug)]
pub struct BaselineLock {
    path: PathBuf,
    lock_path: PathBuf,
}

impl BaselineLock {
    /// Read the baseline. A missing or corrupt document is treated as no
    /// baseline.
    pub fn load(&self) -> Option<Baseline> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    path = %self.path.display(),
                    "no baseline, reporting absolute results"
                );
                return None;
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "unreadable baseline ignored"
                );
                return None;
            }
        };
        match serde_json::from_str::<Baseline>(&text) {
            Ok(baseline) => Some(baseline),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt baseline ignored");
                None
            }
        }
    }

    /// Replace the baseline atomically. Consumes the lock: a run writes at
    /// most once.
    pub fn save(self, baseline: &Baseline) -> Result<(), ParityError> {
        let json = serde_json::to_string_pretty(baseline)?;
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        fs::write(&tmp, json).map_err(|e| ParityError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| ParityError::io(&self.path, e))?;
        tracing::info!(path = %self.path.display(), "baseline updated");
        Ok(())
    }
}

impl Drop for BaselineLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}
