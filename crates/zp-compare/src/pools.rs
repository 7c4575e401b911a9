//! RNG response pools.
//!
//! Zork picks some responses at random from small fixed tables. Two engines
//! that consume randomness differently can legitimately print different
//! members of the same table for the same command. Each table is modelled as
//! a named pool of canonical strings; membership is exact after whitespace
//! normalization, so case and punctuation stay significant.
//!
//! The registry is built once on first use and never mutated.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

/// Identifier of a named response pool.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
pub enum PoolId {
    /// Refusals for impossible actions ("yuks").
    MiscFailure,
    /// Replies to greeting the game.
    Greeting,
    /// Magic words spoken in the wrong place.
    HollowVoice,
    /// Jumping in place.
    JumpLoss,
    /// Acting on something that is not there.
    Dummy,
    /// Swearing at the game.
    Offended,
    /// The troll's sword blows that miss.
    TrollMiss,
}

impl PoolId {
    pub const fn name(self) -> &'static str {
        match self {
            PoolId::MiscFailure => "misc-failure",
            PoolId::Greeting => "greeting",
            PoolId::HollowVoice => "hollow-voice",
            PoolId::JumpLoss => "jump-loss",
            PoolId::Dummy => "dummy",
            PoolId::Offended => "offended",
            PoolId::TrollMiss => "troll-miss",
        }
    }

    /// Canonical members of this pool.
    pub const fn members(self) -> &'static [&'static str] {
        match self {
            PoolId::MiscFailure => MISC_FAILURE,
            PoolId::Greeting => GREETING,
            PoolId::HollowVoice => HOLLOW_VOICE,
            PoolId::JumpLoss => JUMP_LOSS,
            PoolId::Dummy => DUMMY,
            PoolId::Offended => OFFENDED,
            PoolId::TrollMiss => TROLL_MISS,
        }
    }
}

impl core::fmt::Display for PoolId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

const MISC_FAILURE: &[&str] = &[
    "A valiant attempt.",
    "You can't be serious.",
    "An interesting idea...",
    "What a concept!",
];

const GREETING: &[&str] = &[
    "Hello.",
    "Good day.",
    "Nice weather we've been having lately.",
    "Goodbye.",
    "Hello, sailor!",
    "Nice day, isn't it?",
    "Greetings.",
    "Hi.",
    "How do you do?",
    "Pleased to meet you.",
    "Well, hello there.",
    "Good to see you.",
];

const HOLLOW_VOICE: &[&str] = &[
    "A hollow voice says 'Fool.'",
    "A hollow voice says 'Plugh.'",
    "A hollow voice says 'Xyzzy.'",
    "A hollow voice says \"Fool.\"",
];

const JUMP_LOSS: &[&str] = &[
    "Very good. Now you can go to the second grade.",
    "Are you enjoying yourself?",
    "Wheeeeeeeeee!!!!!",
    "Do you expect me to applaud?",
];

const DUMMY: &[&str] = &[
    "Look around.",
    "Too late for that.",
    "Have your eyes checked.",
];

const OFFENDED: &[&str] = &[
    "Such language in a high-class establishment like this!",
    "You ought to be ashamed of yourself.",
    "It's not so bad. You could have been killed already.",
];

const TROLL_MISS: &[&str] = &[
    "The troll swings his axe, but it misses.",
    "The troll's axe barely misses your ear.",
    "The axe sweeps past as you jump aside.",
    "The axe crashes against the rock, throwing sparks!",
];

/// Fixed notices printed when an exit cannot be taken.
///
/// Not an RNG pool: used by the classifier to recognize a side that took a
/// blocked branch after the sessions forked.
const BLOCKED_EXITS: &[&str] = &[
    "You can't go that way.",
    "There is a wall there.",
    "The door is closed.",
    "The door is locked.",
    "The window is closed.",
    "The kitchen window is closed.",
    "The trap door is closed.",
    "The grating is closed!",
    "The grating is locked.",
    "You cannot go upstairs.",
    "You cannot go downstairs.",
    "The chimney is too narrow for you to climb.",
    "You can't fit through the crack.",
];

static INDEX: LazyLock<HashMap<String, PoolId>> = LazyLock::new(|| {
    let mut index = HashMap::new();
    for pool in PoolId::iter() {
        for member in pool.members() {
            index.insert(normalize(member), pool);
        }
    }
    index
});

/// Trim and collapse internal whitespace runs to a single space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The pool `text` belongs to, if any.
pub fn pool_of(text: &str) -> Option<PoolId> {
    INDEX.get(&normalize(text)).copied()
}

/// True iff both texts are members of one and the same pool.
pub fn same_named_pool(a: &str, b: &str) -> bool {
    match (pool_of(a), pool_of(b)) {
        (Some(pa), Some(pb)) => pa == pb,
        _ => false,
    }
}

/// True if `text` is a notice that an exit could not be taken.
pub fn is_blocked_exit(text: &str) -> bool {
    let text = normalize(text);
    if BLOCKED_EXITS.contains(&text.as_str()) {
        return true;
    }
    // "The <thing> is closed." / "The <thing> is locked." for named doors.
    text.starts_with("The ")
        && (text.ends_with(" is closed.") || text.ends_with(" is locked."))
        && text.split(' ').count() <= 6
}
