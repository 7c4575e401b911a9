//! Parity aggregation across seeds and regression gating.
//!
//! Each seed is compared independently on a worker pool; the per-seed
//! results are merged only after every seed has finished. Counts are summed
//! across seeds before percentages are computed.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::baseline::Baseline;
use crate::classify::Classification;
use crate::compare::{
    ClassifiedDifference, Comparison, DEFAULT_FORK_HORIZON, DifferenceSignature,
    TranscriptComparator,
};
use crate::error::ParityError;
use crate::runner::SessionRunner;
use crate::transcript::Side;

/// `part / total` as a percentage; an empty run counts as full parity.
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Command sequences to play, with optional per-seed overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandPlan {
    pub default: Vec<String>,
    #[serde(default)]
    pub per_seed: BTreeMap<u64, Vec<String>>,
}

impl CommandPlan {
    pub fn new(default: Vec<String>) -> Self {
        Self {
            default,
            per_seed: BTreeMap::new(),
        }
    }

    pub fn with_seed(mut self, seed: u64, commands: Vec<String>) -> Self {
        self.per_seed.insert(seed, commands);
        self
    }

    pub fn commands_for(&self, seed: u64) -> &[String] {
        self.per_seed.get(&seed).unwrap_or(&self.default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedStatus {
    Completed,
    /// The seed deadline passed; unplayed commands are execution errors.
    TimedOut,
}

/// Comparison outcome for one seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedResult {
    pub seed: u64,
    pub total_commands: usize,
    pub matching: usize,
    pub status_bar_only_differences: usize,
    pub execution_errors: usize,
    pub differences: Vec<ClassifiedDifference>,
    pub parity_percentage: f64,
    pub logic_parity_percentage: f64,
    /// Exact matches only: status-bar differences count against this one.
    pub visual_parity_percentage: f64,
    pub status: SeedStatus,
}

impl SeedResult {
    pub fn from_comparison(seed: u64, comparison: Comparison) -> Self {
        let total = comparison.total_commands;
        let rng = comparison.count(Classification::RngDifference);
        let state = comparison.count(Classification::StateDivergence);
        let matching = comparison.matching;
        Self {
            seed,
            total_commands: total,
            matching,
            status_bar_only_differences: comparison.status_bar_only_differences,
            execution_errors: comparison.execution_errors,
            parity_percentage: percentage(matching, total),
            logic_parity_percentage: percentage(matching + rng + state, total),
            visual_parity_percentage: percentage(
                matching - comparison.status_bar_only_differences,
                total,
            ),
            status: if comparison.timed_out {
                SeedStatus::TimedOut
            } else {
                SeedStatus::Completed
            },
            differences: comparison.differences,
        }
    }

    pub fn count(&self, classification: Classification) -> usize {
        self.differences
            .iter()
            .filter(|d| d.classification == classification)
            .count()
    }
}

/// A seed that could not be compared because an engine was unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableSeed {
    pub seed: u64,
    pub side: Side,
    pub reason: String,
    /// Commands that were never played for this seed.
    pub commands: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Every seed compared in full with no logic differences.
    Pass,
    /// Logic differences remain or transcripts differ in length.
    Fail,
    /// Some seeds were unavailable or timed out.
    Incomplete,
}

impl core::fmt::Display for Verdict {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
            Verdict::Incomplete => write!(f, "INCOMPLETE"),
        }
    }
}

/// Aggregate over all seeds of a validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityResult {
    pub seeds: Vec<SeedResult>,
    pub unavailable: Vec<UnavailableSeed>,
    pub total_commands: usize,
    pub matching: usize,
    pub status_bar_only_differences: usize,
    pub execution_errors: usize,
    pub rng_differences: usize,
    pub state_divergences: usize,
    pub logic_differences: usize,
    pub length_mismatches: usize,
    pub parity_percentage: f64,
    pub logic_parity_percentage: f64,
    pub verdict: Verdict,
}

impl ParityResult {
    /// Merge completed seeds. Unavailable seeds add their commands as
    /// unexecuted, so an incomplete run never reaches 100%.
    pub fn from_seeds(seeds: Vec<SeedResult>, unavailable: Vec<UnavailableSeed>) -> Self {
        let unexecuted: usize = unavailable.iter().map(|u| u.commands.max(1)).sum();
        let total_commands = seeds.iter().map(|s| s.total_commands).sum::<usize>() + unexecuted;
        let matching = seeds.iter().map(|s| s.matching).sum();
        let status_bar_only_differences = seeds.iter().map(|s| s.status_bar_only_differences).sum();
        let execution_errors = seeds.iter().map(|s| s.execution_errors).sum::<usize>() + unexecuted;
        let sum_of = |c: Classification| seeds.iter().map(|s| s.count(c)).sum::<usize>();
        let rng_differences = sum_of(Classification::RngDifference);
        let state_divergences = sum_of(Classification::StateDivergence);
        let logic_differences = sum_of(Classification::LogicDifference);
        let length_mismatches = seeds
            .iter()
            .flat_map(|s| &s.differences)
            .filter(|d| d.is_length_mismatch())
            .count();

        let verdict = if length_mismatches > 0 {
            Verdict::Fail
        } else if !unavailable.is_empty() || execution_errors > 0 {
            Verdict::Incomplete
        } else if logic_differences > 0 {
            Verdict::Fail
        } else {
            Verdict::Pass
        };

        Self {
            parity_percentage: percentage(matching, total_commands),
            logic_parity_percentage: percentage(
                matching + rng_differences + state_divergences,
                total_commands,
            ),
            seeds,
            unavailable,
            total_commands,
            matching,
            status_bar_only_differences,
            execution_errors,
            rng_differences,
            state_divergences,
            logic_differences,
            length_mismatches,
            verdict,
        }
    }

    pub fn differences(&self) -> impl Iterator<Item = &ClassifiedDifference> {
        self.seeds.iter().flat_map(|s| s.differences.iter())
    }

    pub fn signatures(&self) -> BTreeSet<DifferenceSignature> {
        self.differences().map(ClassifiedDifference::signature).collect()
    }

    pub fn counts(&self) -> BTreeMap<Classification, usize> {
        BTreeMap::from([
            (Classification::RngDifference, self.rng_differences),
            (Classification::StateDivergence, self.state_divergences),
            (Classification::LogicDifference, self.logic_differences),
        ])
    }

    pub fn is_complete(&self) -> bool {
        self.unavailable.is_empty() && self.execution_errors == 0
    }
}

/// Outcome of comparing a run against the accepted baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionVerdict {
    pub passed: bool,
    /// Signatures absent from the baseline.
    pub new_signatures: Vec<DifferenceSignature>,
    /// Baseline signatures no longer observed.
    pub resolved_signatures: Vec<DifferenceSignature>,
    pub baseline_logic_differences: usize,
    pub current_logic_differences: usize,
    pub baseline_logic_parity: f64,
    pub current_logic_parity: f64,
}

/// Fail if any signature is new or the logic difference count rose.
///
/// A new signature fails the check even when totals are unchanged, so one
/// fix cannot mask another regression.
pub fn check_regression(current: &ParityResult, baseline: &Baseline) -> RegressionVerdict {
    let current_signatures = current.signatures();
    let new_signatures: Vec<_> = current_signatures
        .difference(&baseline.signatures)
        .cloned()
        .collect();
    let resolved_signatures: Vec<_> = baseline
        .signatures
        .difference(&current_signatures)
        .cloned()
        .collect();
    let baseline_logic = baseline.count(Classification::LogicDifference);

    RegressionVerdict {
        passed: new_signatures.is_empty() && current.logic_differences <= baseline_logic,
        new_signatures,
        resolved_signatures,
        baseline_logic_differences: baseline_logic,
        current_logic_differences: current.logic_differences,
        baseline_logic_parity: baseline.logic_parity_percentage,
        current_logic_parity: current.logic_parity_percentage,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    pub seed_timeout: Duration,
    /// Worker threads; 0 lets rayon decide.
    pub workers: usize,
    pub fork_horizon: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            seed_timeout: Duration::from_secs(60),
            workers: 0,
            fork_horizon: DEFAULT_FORK_HORIZON,
        }
    }
}

enum SeedOutcome {
    Compared(SeedResult),
    Unavailable(UnavailableSeed),
}

/// Runs the comparator over a seed matrix.
#[derive(Debug, Clone, Default)]
pub struct ParityAggregator {
    config: AggregatorConfig,
}

impl ParityAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn run(
        &self,
        seeds: &[u64],
        plan: &CommandPlan,
        runner: &dyn SessionRunner,
    ) -> Result<ParityResult, ParityError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()?;
        tracing::info!(
            seeds = seeds.len(),
            workers = pool.current_num_threads(),
            "starting parity run"
        );

        let outcomes: Vec<SeedOutcome> = pool.install(|| {
            seeds
                .par_iter()
                .map(|&seed| self.run_seed(seed, plan.commands_for(seed), runner))
                .collect()
        });

        let mut completed = Vec::new();
        let mut unavailable = Vec::new();
        for outcome in outcomes {
            match outcome {
                SeedOutcome::Compared(result) => completed.push(result),
                SeedOutcome::Unavailable(seed) => unavailable.push(seed),
            }
        }

        let result = ParityResult::from_seeds(completed, unavailable);
        tracing::info!(
            verdict = %result.verdict,
            parity = result.parity_percentage,
            logic_parity = result.logic_parity_percentage,
            logic_differences = result.logic_differences,
            "parity run finished"
        );
        Ok(result)
    }

    fn run_seed(&self, seed: u64, commands: &[String], runner: &dyn SessionRunner) -> SeedOutcome {
        let deadline = Instant::now() + self.config.seed_timeout;
        let (left, right) = rayon::join(
            || runner.run(Side::Left, seed, commands, deadline),
            || runner.run(Side::Right, seed, commands, deadline),
        );
        let (left, right) = match (left, right) {
            (Ok(l), Ok(r)) => (l, r),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(seed, error = %e, "skipping seed");
                return SeedOutcome::Unavailable(UnavailableSeed {
                    seed,
                    side: e.side(),
                    reason: e.to_string(),
                    commands: commands.len(),
                });
            }
        };

        // The deadline bounds the engines only; whatever they captured is compared.
        let comparison = TranscriptComparator::new()
            .with_fork_horizon(self.config.fork_horizon)
            .compare(&left, &right, commands);
        let result = SeedResult::from_comparison(seed, comparison);
        tracing::info!(
            seed,
            matching = result.matching,
            total = result.total_commands,
            logic_parity = result.logic_parity_percentage,
            "seed compared"
        );
        SeedOutcome::Compared(result)
    }
}
