//! Transcript comparison.
//!
//! Walks two transcripts command by command, extracting and classifying each
//! pair. This is the only public way to compare engine output: raw blocks and
//! extracted messages cannot be classified directly from outside the crate.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::classify::{self, Classification, ForkTracker, Outcome};
use crate::extract::extract_at;
use crate::pools::PoolId;
use crate::transcript::Transcript;

/// Reason recorded when one transcript has fewer blocks than the other.
pub const MISSING_ENTRY_REASON: &str = "missing transcript entry";

/// Reason recorded when both transcripts have a block but no command produced it.
pub const UNEXPECTED_ENTRY_REASON: &str = "unexpected transcript entry";

/// Commands an RNG fork stays open without further RNG or state events.
pub const DEFAULT_FORK_HORIZON: usize = 10;

/// A single command whose outcomes differ between the two engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedDifference {
    pub command_index: usize,
    pub command: String,
    pub left_output: String,
    pub right_output: String,
    pub classification: Classification,
    pub reason: String,
    /// Pool both responses were drawn from, for RNG differences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolId>,
    /// Command index of the RNG difference that opened the active fork.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forked_at: Option<usize>,
}

impl ClassifiedDifference {
    pub fn signature(&self) -> DifferenceSignature {
        DifferenceSignature {
            command: self.command.clone(),
            classification: self.classification,
            reason: self.reason.clone(),
        }
    }

    /// True for differences caused by transcripts of unequal length.
    pub fn is_length_mismatch(&self) -> bool {
        self.reason == MISSING_ENTRY_REASON || self.reason == UNEXPECTED_ENTRY_REASON
    }
}

impl core::fmt::Display for ClassifiedDifference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "[{}] #{} {:?}: {} (left={:?}, right={:?})",
            self.classification,
            self.command_index,
            self.command,
            self.reason,
            self.left_output,
            self.right_output
        )
    }
}

/// Identity of a difference across runs: command, classification and reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DifferenceSignature {
    pub command: String,
    pub classification: Classification,
    pub reason: String,
}

impl core::fmt::Display for DifferenceSignature {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}|{}|{}", self.command, self.classification, self.reason)
    }
}

/// Result of comparing one pair of transcripts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub total_commands: usize,
    /// Commands whose extracted responses match, including status-bar-only
    /// differences.
    pub matching: usize,
    pub status_bar_only_differences: usize,
    /// Commands never compared because a deadline passed.
    pub execution_errors: usize,
    pub differences: Vec<ClassifiedDifference>,
    /// Indices classified as RNG differences; each may open a fork.
    pub rng_indices: Vec<usize>,
    pub timed_out: bool,
}

impl Comparison {
    pub fn count(&self, classification: Classification) -> usize {
        self.differences
            .iter()
            .filter(|d| d.classification == classification)
            .count()
    }

    pub fn length_mismatches(&self) -> usize {
        self.differences
            .iter()
            .filter(|d| d.is_length_mismatch())
            .count()
    }
}

/// Compares transcripts produced by the two engines.
#[derive(Debug, Clone)]
pub struct TranscriptComparator {
    fork_horizon: usize,
    deadline: Option<Instant>,
}

impl Default for TranscriptComparator {
    fn default() -> Self {
        Self {
            fork_horizon: DEFAULT_FORK_HORIZON,
            deadline: None,
        }
    }
}

impl TranscriptComparator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fork_horizon(mut self, horizon: usize) -> Self {
        self.fork_horizon = horizon;
        self
    }

    /// Stop comparing once `deadline` passes; the rest become execution errors.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Compare `left` and `right`, both produced by `commands`.
    pub fn compare(
        &self,
        left: &Transcript,
        right: &Transcript,
        commands: &[String],
    ) -> Comparison {
        let total = commands.len().max(left.len()).max(right.len());
        let mut result = Comparison {
            total_commands: total,
            ..Default::default()
        };
        let mut forks = ForkTracker::new(self.fork_horizon);

        for index in 0..total {
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                result.execution_errors += total - index;
                result.timed_out = true;
                tracing::warn!(index, remaining = total - index, "comparison deadline passed");
                break;
            }

            let command = commands.get(index).map(String::as_str);
            let (left_block, right_block) = match (left.get(index), right.get(index)) {
                (Some(l), Some(r)) => (l, r),
                (l, r) => {
                    let cut_short =
                        (l.is_none() && left.timed_out) || (r.is_none() && right.timed_out);
                    if cut_short {
                        result.execution_errors += 1;
                        result.timed_out = true;
                    } else {
                        result.differences.push(ClassifiedDifference {
                            command_index: index,
                            command: command.unwrap_or_default().to_string(),
                            left_output: l.map(|b| b.text().to_string()).unwrap_or_default(),
                            right_output: r.map(|b| b.text().to_string()).unwrap_or_default(),
                            classification: Classification::LogicDifference,
                            reason: MISSING_ENTRY_REASON.to_string(),
                            pool: None,
                            forked_at: None,
                        });
                    }
                    continue;
                }
            };

            let Some(command) = command else {
                result.differences.push(ClassifiedDifference {
                    command_index: index,
                    command: String::new(),
                    left_output: left_block.text().to_string(),
                    right_output: right_block.text().to_string(),
                    classification: Classification::LogicDifference,
                    reason: UNEXPECTED_ENTRY_REASON.to_string(),
                    pool: None,
                    forked_at: None,
                });
                continue;
            };

            let left_msg = extract_at(left_block, command, index);
            let right_msg = extract_at(right_block, command, index);
            let context = forks.context(index);
            let outcome = classify::classify(&left_msg, &right_msg, context);
            forks.observe(index, &left_msg, &right_msg, &outcome);

            match outcome {
                Outcome::Match => {
                    result.matching += 1;
                    if left_msg.status_line != right_msg.status_line {
                        result.status_bar_only_differences += 1;
                    }
                }
                Outcome::Differs {
                    classification,
                    reason,
                    pool,
                } => {
                    tracing::debug!(index, command, %classification, reason, "difference");
                    result.differences.push(ClassifiedDifference {
                        command_index: index,
                        command: command.to_string(),
                        left_output: left_msg.response,
                        right_output: right_msg.response,
                        classification,
                        reason,
                        pool,
                        forked_at: context.forked_at,
                    });
                }
            }
        }

        result.rng_indices = forks.rng_indices().to_vec();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cmds(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identical_transcripts_all_match() {
        let t = Transcript::from_texts(["Taken.\n>", "Dropped.\n>"]);
        let c = TranscriptComparator::new().compare(&t, &t, &cmds(&["take lamp", "drop lamp"]));
        assert_eq!(c.matching, 2);
        assert!(c.differences.is_empty());
        assert_eq!(c.status_bar_only_differences, 0);
    }

    #[test]
    fn test_missing_entries_are_logic_differences() {
        let left = Transcript::from_texts(["Taken.\n>", "Dropped.\n>", "Done.\n>"]);
        let right = Transcript::from_texts(["Taken.\n>"]);
        let c = TranscriptComparator::new().compare(&left, &right, &cmds(&["a", "b", "c"]));
        assert_eq!(c.matching, 1);
        assert_eq!(c.differences.len(), 2);
        assert!(c.differences.iter().all(|d| d.reason == MISSING_ENTRY_REASON
            && d.classification == Classification::LogicDifference));
        assert_eq!(c.length_mismatches(), 2);
    }

    #[test]
    fn test_timed_out_side_counts_execution_errors() {
        let left = Transcript::from_texts(["Taken.\n>", "Dropped.\n>"]);
        let right = Transcript::from_texts(["Taken.\n>"]).into_timed_out();
        let c = TranscriptComparator::new().compare(&left, &right, &cmds(&["a", "b"]));
        assert_eq!(c.matching, 1);
        assert_eq!(c.execution_errors, 1);
        assert!(c.differences.is_empty());
        assert!(c.timed_out);
    }

    #[test]
    fn test_expired_deadline_stops_comparison() {
        let t = Transcript::from_texts(["Taken.\n>", "Dropped.\n>"]);
        let past = Instant::now() - Duration::from_secs(1);
        let c = TranscriptComparator::new()
            .with_deadline(past)
            .compare(&t, &t, &cmds(&["a", "b"]));
        assert_eq!(c.matching, 0);
        assert_eq!(c.execution_errors, 2);
    }

    #[test]
    fn test_version_banner_after_opening_is_compared() {
        let left = Transcript::from_texts([
            "Taken.\n>",
            "ZORK I: The Great Underground Empire\nRevision 88 / Serial number 840726\n>",
        ]);
        let right = Transcript::from_texts([
            "Taken.\n>",
            "ZORK I: The Great Underground Empire\nRevision 119 / Serial number 880429\n>",
        ]);
        let c = TranscriptComparator::new()
            .compare(&left, &right, &cmds(&["take lamp", "version"]));
        assert_eq!(c.matching, 1);
        assert_eq!(c.differences.len(), 1);
        assert_eq!(c.differences[0].command, "version");
        assert_eq!(c.differences[0].classification, Classification::LogicDifference);
    }

    #[test]
    fn test_extra_blocks_without_commands() {
        let t = Transcript::from_texts(["Taken.\n>", "Dropped.\n>"]);
        let c = TranscriptComparator::new().compare(&t, &t, &cmds(&["take lamp"]));
        assert_eq!(c.total_commands, 2);
        assert_eq!(c.differences[0].reason, UNEXPECTED_ENTRY_REASON);
    }

    #[test]
    fn test_state_divergence_follows_rng_fork() {
        let left = Transcript::from_texts([
            "A hollow voice says 'Fool.'\n>",
            "You can't go that way.\n>",
        ]);
        let right = Transcript::from_texts([
            "A hollow voice says 'Plugh.'\n>",
            "Kitchen\nYou are in the kitchen.\n>",
        ]);
        let c = TranscriptComparator::new().compare(&left, &right, &cmds(&["xyzzy", "west"]));
        assert_eq!(c.count(Classification::RngDifference), 1);
        assert_eq!(c.count(Classification::StateDivergence), 1);
        assert_eq!(c.differences[1].forked_at, Some(0));
        assert_eq!(c.rng_indices, [0]);
    }

    #[test]
    fn test_signature_display() {
        let sig = DifferenceSignature {
            command: "north".into(),
            classification: Classification::LogicDifference,
            reason: "responses differ".into(),
        };
        assert_eq!(sig.to_string(), "north|LOGIC_DIFFERENCE|responses differ");
    }
}
