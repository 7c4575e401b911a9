//! Difference classification.
//!
//! Decides, for one pair of extracted messages, whether the two engines
//! behaved the same. Decision order, first match wins:
//!
//! 1. normalized responses (and arrival rooms) equal: match
//! 2. both responses come from the same RNG pool: [`Classification::RngDifference`]
//! 3. an earlier RNG difference forked the sessions and this difference is
//!    explained by the fork: [`Classification::StateDivergence`]
//! 4. anything else: [`Classification::LogicDifference`]
//!
//! Only the transcript comparator calls into this module.

use serde::{Deserialize, Serialize};

use crate::extract::ExtractedMessage;
use crate::pools::{self, PoolId};

/// Kind of a non-matching command outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// Both sides printed members of the same random response pool.
    RngDifference,
    /// The sides took different but valid paths after an RNG difference.
    StateDivergence,
    /// Unexplained behavioral mismatch.
    LogicDifference,
}

impl Classification {
    pub const ALL: [Classification; 3] = [
        Classification::RngDifference,
        Classification::StateDivergence,
        Classification::LogicDifference,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Classification::RngDifference => "RNG_DIFFERENCE",
            Classification::StateDivergence => "STATE_DIVERGENCE",
            Classification::LogicDifference => "LOGIC_DIFFERENCE",
        }
    }

    /// Whether this kind of difference lowers logic parity.
    pub const fn is_logic(self) -> bool {
        matches!(self, Classification::LogicDifference)
    }
}

impl core::fmt::Display for Classification {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Match,
    Differs {
        classification: Classification,
        reason: String,
        pool: Option<PoolId>,
    },
}

/// Fork state visible to the classifier at one command index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ForkContext {
    /// Index of the RNG difference that opened the active fork.
    pub forked_at: Option<usize>,
}

/// Tracks forks opened by RNG differences across one transcript pair.
///
/// A fork opens at the first RNG difference. It stays open while RNG
/// differences or state divergences keep occurring within `horizon`
/// commands of each other, and closes early when a movement command lands
/// both sides in the same room.
#[derive(Debug, Clone)]
pub(crate) struct ForkTracker {
    horizon: usize,
    forked_at: Option<usize>,
    last_event: Option<usize>,
    rng_indices: Vec<usize>,
}

impl ForkTracker {
    pub fn new(horizon: usize) -> Self {
        Self {
            horizon,
            forked_at: None,
            last_event: None,
            rng_indices: Vec::new(),
        }
    }

    pub fn context(&self, index: usize) -> ForkContext {
        let active = self
            .last_event
            .is_some_and(|last| index.saturating_sub(last) <= self.horizon);
        ForkContext {
            forked_at: if active { self.forked_at } else { None },
        }
    }

    /// Record the outcome at `index`. Must be called in index order.
    pub fn observe(
        &mut self,
        index: usize,
        left: &ExtractedMessage,
        right: &ExtractedMessage,
        outcome: &Outcome,
    ) {
        if self.context(index).forked_at.is_none() {
            self.forked_at = None;
            self.last_event = None;
        }
        match outcome {
            Outcome::Differs {
                classification: Classification::RngDifference,
                ..
            } => {
                self.rng_indices.push(index);
                self.forked_at.get_or_insert(index);
                self.last_event = Some(index);
            }
            Outcome::Differs {
                classification: Classification::StateDivergence,
                ..
            } => {
                self.last_event = Some(index);
            }
            _ => {
                let reconverged = left.is_movement
                    && right.is_movement
                    && left.room_name.is_some()
                    && left.room_name == right.room_name;
                if reconverged {
                    self.forked_at = None;
                    self.last_event = None;
                }
            }
        }
    }

    /// Command indices classified as RNG differences so far.
    pub fn rng_indices(&self) -> &[usize] {
        &self.rng_indices
    }
}

/// Classify one pair of extracted messages.
pub(crate) fn classify(
    left: &ExtractedMessage,
    right: &ExtractedMessage,
    context: ForkContext,
) -> Outcome {
    let left_text = pools::normalize(&left.response);
    let right_text = pools::normalize(&right.response);
    let same_room = left.room_name == right.room_name;

    if left_text == right_text && same_room {
        return Outcome::Match;
    }

    if left_text != right_text
        && let Some(pool) = pools::pool_of(&left_text)
        && pools::pool_of(&right_text) == Some(pool)
    {
        return Outcome::Differs {
            classification: Classification::RngDifference,
            reason: format!("both responses drawn from pool '{pool}'"),
            pool: Some(pool),
        };
    }

    if context.forked_at.is_some()
        && let Some(reason) = fork_explanation(left, right)
    {
        return Outcome::Differs {
            classification: Classification::StateDivergence,
            reason,
            pool: None,
        };
    }

    Outcome::Differs {
        classification: Classification::LogicDifference,
        reason: logic_reason(left, right, &left_text, &right_text),
        pool: None,
    }
}

fn fork_explanation(left: &ExtractedMessage, right: &ExtractedMessage) -> Option<String> {
    match (
        pools::is_blocked_exit(&left.response),
        pools::is_blocked_exit(&right.response),
    ) {
        (true, false) => return Some("blocked exit on left side after fork".into()),
        (false, true) => return Some("blocked exit on right side after fork".into()),
        _ => {}
    }
    if left.is_movement && right.is_movement {
        if let (Some(l), Some(r)) = (&left.room_name, &right.room_name) {
            if l != r {
                return Some("sides arrived in different rooms after fork".into());
            }
        }
    }
    None
}

fn logic_reason(
    left: &ExtractedMessage,
    right: &ExtractedMessage,
    left_text: &str,
    right_text: &str,
) -> String {
    if left.room_name != right.room_name {
        return format!(
            "room differs: {} vs {}",
            left.room_name.as_deref().unwrap_or("<none>"),
            right.room_name.as_deref().unwrap_or("<none>")
        );
    }
    match (left_text.is_empty(), right_text.is_empty()) {
        (true, false) => "no response on left side".into(),
        (false, true) => "no response on right side".into(),
        _ => "responses differ".into(),
    }
}
