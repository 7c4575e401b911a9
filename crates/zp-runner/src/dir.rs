//! Transcripts recorded on disk.
//!
//! Layout: `<root>/<side>/seed-<n>.json`, each file a serialized
//! [`Transcript`].

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use zp_compare::{RunnerError, SessionRunner, Side, Transcript};

/// A directory of recorded transcripts.
#[derive(Debug, Clone)]
pub struct TranscriptDir {
    root: PathBuf,
}

impl TranscriptDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, side: Side, seed: u64) -> PathBuf {
        self.root.join(side.as_str()).join(format!("seed-{seed}.json"))
    }

    pub fn load(&self, side: Side, seed: u64) -> Result<Transcript, RunnerError> {
        let path = self.path_for(side, seed);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RunnerError::Unavailable {
                    side,
                    seed,
                    reason: format!("no transcript at {}", path.display()),
                });
            }
            Err(source) => return Err(RunnerError::Io { side, source }),
        };
        serde_json::from_str(&text).map_err(|e| RunnerError::Malformed {
            side,
            seed,
            reason: format!("{}: {e}", path.display()),
        })
    }

    pub fn save(&self, side: Side, seed: u64, transcript: &Transcript) -> Result<PathBuf> {
        let path = self.path_for(side, seed);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(transcript)?;
        fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// Replays transcripts recorded in a [`TranscriptDir`].
///
/// Recorded transcripts are returned as-is, even when they hold more or
/// fewer blocks than there are commands; the comparator reports the
/// mismatch.
#[derive(Debug, Clone)]
pub struct TranscriptDirRunner {
    dir: TranscriptDir,
}

impl TranscriptDirRunner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            dir: TranscriptDir::new(root),
        }
    }

    pub fn dir(&self) -> &TranscriptDir {
        &self.dir
    }
}

impl SessionRunner for TranscriptDirRunner {
    fn run(
        &self,
        side: Side,
        seed: u64,
        commands: &[String],
        _deadline: Instant,
    ) -> Result<Transcript, RunnerError> {
        let transcript = self.dir.load(side, seed)?;
        if transcript.len() != commands.len() {
            tracing::debug!(
                %side,
                seed,
                blocks = transcript.len(),
                commands = commands.len(),
                "recorded transcript length differs from command count"
            );
        }
        Ok(transcript)
    }
}

/// Wraps a runner and saves every transcript it produces.
pub struct RecordingRunner<R> {
    inner: R,
    dir: TranscriptDir,
}

impl<R: SessionRunner> RecordingRunner<R> {
    pub fn new(inner: R, root: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            dir: TranscriptDir::new(root),
        }
    }
}

impl<R: SessionRunner> SessionRunner for RecordingRunner<R> {
    fn run(
        &self,
        side: Side,
        seed: u64,
        commands: &[String],
        deadline: Instant,
    ) -> Result<Transcript, RunnerError> {
        let transcript = self.inner.run(side, seed, commands, deadline)?;
        match self.dir.save(side, seed, &transcript) {
            Ok(path) => tracing::debug!(path = %path.display(), "transcript recorded"),
            Err(e) => tracing::warn!(
                %side,
                seed,
                error = %format!("{e:#}"),
                "could not record transcript"
            ),
        }
        Ok(transcript)
    }
}
