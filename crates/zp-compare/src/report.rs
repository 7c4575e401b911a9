//! Parity reporting: human-readable summaries and JSON reports of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{ParityResult, RegressionVerdict, Verdict};
use crate::recommend::Recommendation;

/// Everything a reporting layer needs about one validation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParityReport {
    /// Descriptive label (e.g. "walkthrough seeds 1-8").
    pub label: String,
    pub generated_at: DateTime<Utc>,
    pub result: ParityResult,
    /// None when no baseline was available.
    pub regression: Option<RegressionVerdict>,
    pub recommendations: Vec<Recommendation>,
}

impl ParityReport {
    pub fn new(
        label: impl Into<String>,
        result: ParityResult,
        regression: Option<RegressionVerdict>,
        recommendations: Vec<Recommendation>,
    ) -> Self {
        Self {
            label: label.into(),
            generated_at: Utc::now(),
            result,
            regression,
            recommendations,
        }
    }

    /// Overall pass: complete, no hard failures, and no regression.
    pub fn passed(&self) -> bool {
        self.result.verdict != Verdict::Incomplete
            && self.result.length_mismatches == 0
            && self.regression.as_ref().is_none_or(|r| r.passed)
    }

    /// Render a human-readable summary.
    pub fn summary(&self) -> String {
        let r = &self.result;
        let mut out = String::new();
        let mut line = |s: String| {
            out.push_str(&s);
            out.push('\n');
        };

        line("============================================================".into());
        line(format!("Parity Report: {}", self.label));
        line(format!(
            "Seeds: {} compared, {} unavailable; Commands: {}",
            r.seeds.len(),
            r.unavailable.len(),
            r.total_commands
        ));
        line(format!("Verdict: {}", r.verdict));
        line(format!(
            "Parity: {:.2}% (logic {:.2}%)",
            r.parity_percentage, r.logic_parity_percentage
        ));
        line(format!(
            "Differences: {} logic, {} rng, {} state divergence; {} status-bar only; {} execution errors",
            r.logic_differences,
            r.rng_differences,
            r.state_divergences,
            r.status_bar_only_differences,
            r.execution_errors
        ));

        for u in &r.unavailable {
            line(format!("  seed {} unavailable ({}): {}", u.seed, u.side, u.reason));
        }

        match &self.regression {
            Some(reg) => {
                line(format!(
                    "Regression: {} (logic {} -> {}, parity {:.2}% -> {:.2}%)",
                    if reg.passed { "PASS" } else { "FAIL" },
                    reg.baseline_logic_differences,
                    reg.current_logic_differences,
                    reg.baseline_logic_parity,
                    reg.current_logic_parity
                ));
                for sig in &reg.new_signatures {
                    line(format!("  new: {sig}"));
                }
                if !reg.resolved_signatures.is_empty() {
                    line(format!("  resolved: {}", reg.resolved_signatures.len()));
                }
            }
            None => line("Regression: no baseline".into()),
        }

        // First few logic differences
        let logic: Vec<_> = r
            .seeds
            .iter()
            .flat_map(|s| s.differences.iter().map(move |d| (s.seed, d)))
            .filter(|(_, d)| d.classification.is_logic())
            .collect();
        let show = logic.len().min(10);
        if show > 0 {
            line(format!("\nFirst {show} logic differences:"));
            for (seed, d) in &logic[..show] {
                line(format!("  seed {seed}: {d}"));
            }
            if logic.len() > show {
                line(format!("  ... and {} more", logic.len() - show));
            }
        }

        if !self.recommendations.is_empty() {
            line("\nRecommendations:".into());
            for rec in &self.recommendations {
                line(format!("  {rec}"));
            }
        }

        line("============================================================".into());
        out
    }

    /// Print the summary to stdout.
    pub fn print_summary(&self) {
        println!("\n{}", self.summary());
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}
