//! Run configuration.
//!
//! Loaded from an optional JSON file; every field has a default, and
//! command-line flags override whatever the file sets.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use zp_compare::compare::DEFAULT_FORK_HORIZON;
use zp_compare::{AggregatorConfig, CommandPlan};
use zp_runner::{DEFAULT_PROMPT, EngineCommand};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParityConfig {
    /// Label shown in reports.
    pub label: String,
    pub seeds: Vec<u64>,
    /// Command file: one command per line, `#` starts a comment.
    pub commands_file: Option<PathBuf>,
    /// Inline commands, used when no command file is given.
    pub commands: Vec<String>,
    /// Per-seed command files that replace the default sequence.
    pub seed_commands: BTreeMap<u64, PathBuf>,
    /// Replay recorded transcripts from `<dir>/<side>/seed-<n>.json`.
    pub transcript_dir: Option<PathBuf>,
    pub left_engine: Option<EngineCommand>,
    pub right_engine: Option<EngineCommand>,
    pub prompt: String,
    /// Save every transcript captured from live engines here.
    pub record_dir: Option<PathBuf>,
    pub seed_timeout_secs: u64,
    /// Worker threads; 0 picks one per core.
    pub workers: usize,
    pub fork_horizon: usize,
    pub baseline: PathBuf,
    /// Pattern repository tracking signatures across runs.
    pub patterns: Option<PathBuf>,
    /// Write the JSON report here.
    pub report: Option<PathBuf>,
    pub require_zero_logic: bool,
    pub update_baseline: bool,
}

impl Default for ParityConfig {
    fn default() -> Self {
        Self {
            label: "zork parity".to_string(),
            seeds: vec![1],
            commands_file: None,
            commands: Vec::new(),
            seed_commands: BTreeMap::new(),
            transcript_dir: None,
            left_engine: None,
            right_engine: None,
            prompt: DEFAULT_PROMPT.to_string(),
            record_dir: None,
            seed_timeout_secs: 60,
            workers: 0,
            fork_horizon: DEFAULT_FORK_HORIZON,
            baseline: PathBuf::from("parity-baseline.json"),
            patterns: None,
            report: None,
            require_zero_logic: false,
            update_baseline: false,
        }
    }
}

impl ParityConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.seeds.is_empty() {
            bail!("no seeds selected");
        }
        let engines = self.left_engine.is_some() && self.right_engine.is_some();
        if self.transcript_dir.is_none() && !engines {
            bail!("configure a transcript directory or both engine commands");
        }
        if self.seed_timeout_secs == 0 {
            bail!("seed timeout must be at least one second");
        }
        Ok(())
    }

    pub fn command_plan(&self) -> Result<CommandPlan> {
        let default = match &self.commands_file {
            Some(path) => read_commands(path)?,
            None => self.commands.clone(),
        };
        if default.is_empty() && self.seed_commands.is_empty() {
            bail!("no commands to play");
        }
        let mut plan = CommandPlan::new(default);
        for (&seed, path) in &self.seed_commands {
            plan = plan.with_seed(seed, read_commands(path)?);
        }
        Ok(plan)
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            seed_timeout: Duration::from_secs(self.seed_timeout_secs),
            workers: self.workers,
            fork_horizon: self.fork_horizon,
        }
    }
}

pub fn read_commands(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read commands {}", path.display()))?;
    Ok(parse_commands(&text))
}

fn parse_commands(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Parse "1,2,5-8" into seeds.
pub fn parse_seeds(list: &str) -> Result<Vec<u64>> {
    let mut seeds = Vec::new();
    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let bound = |s: &str| -> Result<u64> {
                    s.trim().parse().with_context(|| format!("bad seed range {part:?}"))
                };
                let (lo, hi) = (bound(lo)?, bound(hi)?);
                if lo > hi {
                    bail!("empty seed range {part:?}");
                }
                seeds.extend(lo..=hi);
            }
            None => seeds.push(part.parse().with_context(|| format!("bad seed {part:?}"))?),
        }
    }
    seeds.sort_unstable();
    seeds.dedup();
    Ok(seeds)
}
