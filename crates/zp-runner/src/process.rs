//! Subprocess engine runner.
//!
//! Spawns one engine process per (side, seed), writes each command to its
//! stdin as a line, and cuts stdout into blocks at the input prompt. The
//! output printed before the first prompt (banner and opening room) is
//! prepended to the first block, which is how the game presents it.
//!
//! stdout is read on a helper thread so the session can stop waiting when
//! the seed deadline passes.

use std::io::{BufWriter, ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use zp_compare::{RawOutputBlock, RunnerError, SessionRunner, Side, Transcript};

/// Prompt printed by Infocom interpreters when waiting for input.
pub const DEFAULT_PROMPT: &str = ">";

/// How to start one engine. `{seed}` in any argument is replaced by the
/// seed; the seed is also exported as `ZP_SEED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl EngineCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args_for(&self, seed: u64) -> Vec<String> {
        let seed = seed.to_string();
        self.args.iter().map(|a| a.replace("{seed}", &seed)).collect()
    }
}

/// Runs both engines as subprocesses.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    left: EngineCommand,
    right: EngineCommand,
    prompt: String,
}

impl ProcessRunner {
    pub fn new(left: EngineCommand, right: EngineCommand) -> Self {
        Self {
            left,
            right,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn engine(&self, side: Side) -> &EngineCommand {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

impl SessionRunner for ProcessRunner {
    fn run(
        &self,
        side: Side,
        seed: u64,
        commands: &[String],
        deadline: Instant,
    ) -> Result<Transcript, RunnerError> {
        let engine = self.engine(side);
        let session = EngineSession::spawn(engine, seed).map_err(|e| RunnerError::Unavailable {
            side,
            seed,
            reason: format!("{e:#}"),
        })?;
        session.play(side, seed, commands, &self.prompt, deadline)
    }
}

enum BlockRead {
    Block(String),
    /// stdout closed; carries any trailing output without a prompt.
    Closed(Option<String>),
    TimedOut,
}

struct EngineSession {
    child: Child,
    writer: Option<BufWriter<ChildStdin>>,
    output: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl EngineSession {
    fn spawn(engine: &EngineCommand, seed: u64) -> Result<Self> {
        let mut child = Command::new(&engine.program)
            .args(engine.args_for(seed))
            .env("ZP_SEED", seed.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn {}", engine.program))?;

        let stdin = child.stdin.take().context("engine stdin not captured")?;
        let stdout = child.stdout.take().context("engine stdout not captured")?;
        tracing::debug!(program = %engine.program, seed, pid = child.id(), "engine started");

        Ok(Self {
            child,
            writer: Some(BufWriter::new(stdin)),
            output: stdout_thread(stdout),
            pending: Vec::new(),
        })
    }

    fn play(
        mut self,
        side: Side,
        seed: u64,
        commands: &[String],
        prompt: &str,
        deadline: Instant,
    ) -> Result<Transcript, RunnerError> {
        let mut startup = match self.read_block(prompt, deadline) {
            BlockRead::Block(text) => strip_prompt(&text, prompt).to_string(),
            BlockRead::Closed(_) => {
                return Err(RunnerError::Unavailable {
                    side,
                    seed,
                    reason: "engine exited before its first prompt".into(),
                });
            }
            BlockRead::TimedOut => {
                tracing::warn!(%side, seed, "engine never prompted before the deadline");
                return Ok(Transcript::default().into_timed_out());
            }
        };

        let mut blocks = Vec::with_capacity(commands.len());
        let mut timed_out = false;
        for command in commands {
            match self.send(command) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    tracing::debug!(%side, seed, "engine closed its input");
                }
                Err(source) => return Err(RunnerError::Io { side, source }),
            }

            let text = match self.read_block(prompt, deadline) {
                BlockRead::Block(text) => text,
                BlockRead::Closed(rest) => {
                    if let Some(rest) = rest {
                        blocks.push(RawOutputBlock::new(std::mem::take(&mut startup) + &rest));
                    }
                    tracing::debug!(%side, seed, played = blocks.len(), "engine exited");
                    break;
                }
                BlockRead::TimedOut => {
                    timed_out = true;
                    tracing::warn!(%side, seed, played = blocks.len(), "seed deadline passed");
                    break;
                }
            };
            blocks.push(RawOutputBlock::new(std::mem::take(&mut startup) + &text));
        }

        let transcript = Transcript::new(blocks);
        Ok(if timed_out {
            transcript.into_timed_out()
        } else {
            transcript
        })
    }

    fn send(&mut self, command: &str) -> std::io::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(ErrorKind::BrokenPipe.into());
        };
        let written = writer
            .write_all(command.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush());
        if written.is_err() {
            self.writer = None;
        }
        written
    }

    fn read_block(&mut self, prompt: &str, deadline: Instant) -> BlockRead {
        loop {
            if ends_with_prompt(&self.pending, prompt.as_bytes()) {
                let block = std::mem::take(&mut self.pending);
                return BlockRead::Block(String::from_utf8_lossy(&block).into_owned());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return BlockRead::TimedOut;
            }
            match self.output.recv_timeout(remaining) {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Timeout) => return BlockRead::TimedOut,
                Err(RecvTimeoutError::Disconnected) => {
                    let rest = std::mem::take(&mut self.pending);
                    let rest = (!rest.iter().all(u8::is_ascii_whitespace))
                        .then(|| String::from_utf8_lossy(&rest).into_owned());
                    return BlockRead::Closed(rest);
                }
            }
        }
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        // Closing stdin lets a well-behaved engine exit on its own.
        self.writer = None;
        if !matches!(self.child.try_wait(), Ok(Some(_))) {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

fn stdout_thread(mut stdout: impl Read + Send + 'static) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match stdout.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

/// True when the last line of `buf`, ignoring trailing blanks, is the prompt.
fn ends_with_prompt(buf: &[u8], prompt: &[u8]) -> bool {
    let end = buf
        .iter()
        .rposition(|b| !matches!(b, b' ' | b'\t'))
        .map_or(0, |i| i + 1);
    let buf = &buf[..end];
    if prompt.is_empty() || !buf.ends_with(prompt) {
        return false;
    }
    let start = buf.len() - prompt.len();
    start == 0 || buf[start - 1] == b'\n'
}

fn strip_prompt<'a>(text: &'a str, prompt: &str) -> &'a str {
    let trimmed = text.trim_end_matches([' ', '\t']);
    trimmed.strip_suffix(prompt).unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_detection() {
        assert!(ends_with_prompt(b">", b">"));
        assert!(ends_with_prompt(b"Taken.\n> ", b">"));
        assert!(ends_with_prompt(b"Taken.\n\n>", b">"));
        assert!(!ends_with_prompt(b"Taken.\n", b">"));
        assert!(!ends_with_prompt(b"a -> b", b">"));
        assert!(!ends_with_prompt(b"", b">"));
    }

    #[test]
    fn test_strip_prompt_keeps_text() {
        assert_eq!(strip_prompt("West of House\n\n> ", ">"), "West of House\n\n");
        assert_eq!(strip_prompt(">", ">"), "");
    }

    #[test]
    fn test_seed_substitution() {
        let engine = EngineCommand::new("zork").arg("--seed").arg("{seed}").arg("game-{seed}.z3");
        assert_eq!(engine.args_for(42), ["--seed", "42", "game-42.z3"]);
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let engine = EngineCommand::new("/nonexistent/zork-engine");
        let runner = ProcessRunner::new(engine.clone(), engine);
        let deadline = Instant::now() + std::time::Duration::from_secs(1);
        let err = runner.run(Side::Left, 1, &[], deadline).unwrap_err();
        assert!(matches!(err, RunnerError::Unavailable { side: Side::Left, .. }));
    }
}
