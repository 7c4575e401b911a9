//! Captured session transcripts.
//!
//! A transcript is the raw output of one engine for one seed and command
//! sequence, split into one block per command. Blocks are stored exactly as
//! captured; all normalization happens in [`crate::extract`].

use serde::{Deserialize, Serialize};

/// Which implementation produced a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The reimplemented engine under test.
    Left,
    /// The reference engine.
    Right,
}

impl Side {
    pub const fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl core::fmt::Display for Side {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete text produced by one engine in response to one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawOutputBlock {
    text: String,
}

impl RawOutputBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl From<&str> for RawOutputBlock {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for RawOutputBlock {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// Ordered output blocks for one (engine, seed, command sequence).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub blocks: Vec<RawOutputBlock>,
    /// Set when the runner stopped early because the seed deadline passed.
    /// Blocks captured before the deadline are kept.
    #[serde(default)]
    pub timed_out: bool,
}

impl Transcript {
    pub fn new(blocks: Vec<RawOutputBlock>) -> Self {
        Self {
            blocks,
            timed_out: false,
        }
    }

    /// Build a transcript from plain strings.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(RawOutputBlock::new).collect())
    }

    /// Mark this transcript as cut short by a deadline.
    pub fn into_timed_out(mut self) -> Self {
        self.timed_out = true;
        self
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RawOutputBlock> {
        self.blocks.get(index)
    }
}
