//! Cross-run difference pattern tracking.
//!
//! A [`PatternRepository`] remembers which difference signatures appeared in
//! which validation runs. Patterns that show up every run are stable defects;
//! patterns that come and go usually point at unmodelled nondeterminism.
//! The repository is an ordinary value: callers load it, record runs, and
//! save it explicitly.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::ParityResult;
use crate::compare::DifferenceSignature;
use crate::error::ParityError;

/// History of one difference signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub signature: DifferenceSignature,
    /// Number of recorded runs that contained this signature.
    pub runs_seen: u32,
    /// Total occurrences across all runs and seeds.
    pub occurrences: u64,
    pub seeds: BTreeSet<u64>,
    /// 1-based run number of the first and most recent sighting.
    pub first_seen_run: u32,
    pub last_seen_run: u32,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternRepository {
    runs_recorded: u32,
    patterns: BTreeMap<String, PatternRecord>,
}

impl PatternRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`; a missing file yields an empty repository.
    pub fn load(path: &Path) -> Result<Self, ParityError> {
        match fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| ParityError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(ParityError::io(path, e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ParityError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| ParityError::io(path, e))
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.runs_recorded = 0;
        self.patterns.clear();
    }

    pub fn runs_recorded(&self) -> u32 {
        self.runs_recorded
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn get(&self, signature: &DifferenceSignature) -> Option<&PatternRecord> {
        self.patterns.get(&signature.to_string())
    }

    /// Record every difference of one validation run.
    pub fn record_run(&mut self, result: &ParityResult) {
        self.runs_recorded += 1;
        let run = self.runs_recorded;
        let now = Utc::now();

        for seed in &result.seeds {
            for diff in &seed.differences {
                let signature = diff.signature();
                let record = self
                    .patterns
                    .entry(signature.to_string())
                    .or_insert_with(|| PatternRecord {
                        signature,
                        runs_seen: 0,
                        occurrences: 0,
                        seeds: BTreeSet::new(),
                        first_seen_run: run,
                        last_seen_run: 0,
                        first_seen_at: now,
                        last_seen_at: now,
                    });
                if record.last_seen_run != run {
                    record.runs_seen += 1;
                    record.last_seen_run = run;
                    record.last_seen_at = now;
                }
                record.occurrences += 1;
                record.seeds.insert(seed.seed);
            }
        }
    }

    /// Fraction of runs since first sighting in which the pattern appeared.
    pub fn consistency(&self, record: &PatternRecord) -> f64 {
        let window = self.runs_recorded.saturating_sub(record.first_seen_run) + 1;
        f64::from(record.runs_seen) / f64::from(window)
    }

    /// Patterns seen in at least `min_ratio` of the runs since they appeared.
    pub fn consistent(&self, min_ratio: f64) -> Vec<&PatternRecord> {
        self.patterns
            .values()
            .filter(|r| self.consistency(r) >= min_ratio)
            .collect()
    }

    /// Patterns that skipped at least one run after first appearing.
    pub fn intermittent(&self) -> Vec<&PatternRecord> {
        self.patterns
            .values()
            .filter(|r| self.consistency(r) < 1.0 && r.last_seen_run == self.runs_recorded)
            .collect()
    }

    /// Patterns absent from the most recent run.
    pub fn resolved(&self) -> Vec<&PatternRecord> {
        self.patterns
            .values()
            .filter(|r| r.last_seen_run < self.runs_recorded)
            .collect()
    }
}
