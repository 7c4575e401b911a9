//! Triage recommendations derived from a parity run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::ParityResult;
use crate::classify::Classification;
use crate::compare::{ClassifiedDifference, DifferenceSignature};
use crate::patterns::PatternRepository;
use crate::pools;

/// How urgently a recommendation should be acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl core::fmt::Display for Severity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Transcripts of unequal length: a crash or control-flow split.
    MissingEntries,
    LogicDefect,
    /// A response that probably belongs in an RNG pool.
    RngPoolCandidate,
    StateDivergence,
    /// Unavailable engines and timeouts.
    Infrastructure,
    /// Status-bar-only differences.
    Presentation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub severity: Severity,
    pub category: Category,
    pub title: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<DifferenceSignature>,
}

impl core::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.title, self.detail)
    }
}

/// Patterns seen in at least this share of runs are treated as stable.
const STABLE_PATTERN_RATIO: f64 = 0.8;

/// Build recommendations, most severe first.
pub fn recommend(
    result: &ParityResult,
    patterns: Option<&PatternRepository>,
) -> Vec<Recommendation> {
    let mut out = Vec::new();

    for seed in &result.seeds {
        let missing = seed.differences.iter().filter(|d| d.is_length_mismatch()).count();
        if missing > 0 {
            out.push(Recommendation {
                severity: Severity::Critical,
                category: Category::MissingEntries,
                title: format!("seed {}: transcripts differ in length", seed.seed),
                detail: format!(
                    "{missing} entries missing; one engine likely crashed or stopped early"
                ),
                signatures: Vec::new(),
            });
        }
    }

    if !result.unavailable.is_empty() {
        let seeds: Vec<String> = result.unavailable.iter().map(|u| u.seed.to_string()).collect();
        out.push(Recommendation {
            severity: Severity::High,
            category: Category::Infrastructure,
            title: "engines unavailable".into(),
            detail: format!("seeds {} were skipped", seeds.join(", ")),
            signatures: Vec::new(),
        });
    }
    let timed_out = result
        .execution_errors
        .saturating_sub(result.unavailable.iter().map(|u| u.commands.max(1)).sum());
    if timed_out > 0 {
        out.push(Recommendation {
            severity: Severity::High,
            category: Category::Infrastructure,
            title: "seed timeouts".into(),
            detail: format!("{timed_out} commands were not compared before the deadline"),
            signatures: Vec::new(),
        });
    }

    out.extend(logic_recommendations(result, patterns));

    if result.state_divergences > 0 {
        out.push(Recommendation {
            severity: Severity::Low,
            category: Category::StateDivergence,
            title: "state divergence after RNG forks".into(),
            detail: format!(
                "{} commands diverged after an RNG difference; seed both engines identically to remove them",
                result.state_divergences
            ),
            signatures: Vec::new(),
        });
    }
    if result.status_bar_only_differences > 0 {
        out.push(Recommendation {
            severity: Severity::Low,
            category: Category::Presentation,
            title: "status bar differences".into(),
            detail: format!(
                "{} commands match but show a different status bar",
                result.status_bar_only_differences
            ),
            signatures: Vec::new(),
        });
    }

    out.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.category.cmp(&b.category)));
    out
}

fn logic_recommendations(
    result: &ParityResult,
    patterns: Option<&PatternRepository>,
) -> Vec<Recommendation> {
    let mut groups: BTreeMap<DifferenceSignature, Vec<(u64, &ClassifiedDifference)>> =
        BTreeMap::new();
    for seed in &result.seeds {
        for diff in &seed.differences {
            if diff.classification == Classification::LogicDifference
                && !diff.is_length_mismatch()
            {
                groups.entry(diff.signature()).or_default().push((seed.seed, diff));
            }
        }
    }

    let mut out = Vec::new();
    for (signature, hits) in groups {
        let (_, example) = hits[0];
        let seeds = hits.iter().map(|(s, _)| *s).collect::<std::collections::BTreeSet<_>>();

        if let Some(pool) = half_pool_member(example) {
            out.push(Recommendation {
                severity: Severity::Medium,
                category: Category::RngPoolCandidate,
                title: format!("{:?} may belong to pool '{pool}'", signature.command),
                detail: format!(
                    "one side answered from pool '{pool}', the other with {:?}",
                    if pools::pool_of(&example.left_output).is_some() {
                        &example.right_output
                    } else {
                        &example.left_output
                    }
                ),
                signatures: vec![signature],
            });
            continue;
        }

        let record = patterns.and_then(|p| p.get(&signature).map(|r| (p, r)));
        let intermittent = record.is_some_and(|(p, r)| p.consistency(r) < STABLE_PATTERN_RATIO);
        if intermittent {
            out.push(Recommendation {
                severity: Severity::Medium,
                category: Category::RngPoolCandidate,
                title: format!("{:?} differs intermittently", signature.command),
                detail: "pattern comes and goes between runs; check for unmodelled randomness".into(),
                signatures: vec![signature],
            });
            continue;
        }

        let stable = record.is_some_and(|(_, r)| r.runs_seen >= 2) || seeds.len() >= 2;
        out.push(Recommendation {
            severity: if stable { Severity::High } else { Severity::Medium },
            category: Category::LogicDefect,
            title: format!("{:?}: {}", signature.command, signature.reason),
            detail: format!(
                "{} occurrence(s) across {} seed(s); left={:?} right={:?}",
                hits.len(),
                seeds.len(),
                example.left_output,
                example.right_output
            ),
            signatures: vec![signature],
        });
    }
    out
}

/// The pool one side's response belongs to when the other side's does not.
fn half_pool_member(diff: &ClassifiedDifference) -> Option<pools::PoolId> {
    match (pools::pool_of(&diff.left_output), pools::pool_of(&diff.right_output)) {
        (Some(pool), None) | (None, Some(pool)) => Some(pool),
        _ => None,
    }
}
