//! Zork parity gate
//!
//! Plays the configured seeds on both engines, classifies every difference,
//! checks the run against the accepted baseline and prints a report.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use zp_compare::patterns::PatternRepository;
use zp_compare::recommend::recommend;
use zp_compare::{
    BaselineStore, ParityAggregator, ParityReport, SessionRunner, check_regression,
    next_baseline,
};
use zp_runner::{ProcessRunner, RecordingRunner, TranscriptDirRunner};

use crate::config::{ParityConfig, parse_seeds};

/// Behavioral parity check between a Zork reimplementation and the
/// reference engine
#[derive(Parser, Debug)]
#[command(name = "zork-parity")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Seeds to play, e.g. "1-8" or "1,4,9"
    #[arg(short = 's', long = "seeds")]
    seeds: Option<String>,

    /// Command file, one command per line
    #[arg(short = 'f', long = "commands")]
    commands: Option<PathBuf>,

    /// Replay recorded transcripts from this directory
    #[arg(short = 't', long = "transcripts")]
    transcripts: Option<PathBuf>,

    /// Save transcripts captured from live engines here
    #[arg(long = "record")]
    record: Option<PathBuf>,

    /// Baseline file
    #[arg(short = 'b', long = "baseline")]
    baseline: Option<PathBuf>,

    /// Pattern repository file
    #[arg(long = "patterns")]
    patterns: Option<PathBuf>,

    /// Write the JSON report here
    #[arg(short = 'o', long = "report")]
    report: Option<PathBuf>,

    /// Per-seed timeout in seconds
    #[arg(long = "timeout")]
    timeout: Option<u64>,

    /// Worker threads (0 = one per core)
    #[arg(short = 'j', long = "workers")]
    workers: Option<usize>,

    /// Commands an RNG fork stays open without further divergence
    #[arg(long = "fork-horizon")]
    fork_horizon: Option<usize>,

    /// Fail while any logic difference remains, even if the baseline accepts it
    #[arg(long = "require-zero-logic")]
    require_zero_logic: bool,

    /// Store this run as the new baseline when it qualifies
    #[arg(short = 'u', long = "update-baseline")]
    update_baseline: bool,

    /// More logging (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn into_config(self) -> Result<ParityConfig> {
        let mut config = match &self.config {
            Some(path) => ParityConfig::load(path)?,
            None => ParityConfig::default(),
        };
        if let Some(seeds) = &self.seeds {
            config.seeds = parse_seeds(seeds)?;
        }
        if let Some(path) = self.commands {
            config.commands_file = Some(path);
        }
        if let Some(dir) = self.transcripts {
            config.transcript_dir = Some(dir);
        }
        if let Some(dir) = self.record {
            config.record_dir = Some(dir);
        }
        if let Some(path) = self.baseline {
            config.baseline = path;
        }
        if let Some(path) = self.patterns {
            config.patterns = Some(path);
        }
        if let Some(path) = self.report {
            config.report = Some(path);
        }
        if let Some(secs) = self.timeout {
            config.seed_timeout_secs = secs;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(horizon) = self.fork_horizon {
            config.fork_horizon = horizon;
        }
        config.require_zero_logic |= self.require_zero_logic;
        config.update_baseline |= self.update_baseline;
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn build_runner(config: &ParityConfig) -> Result<Box<dyn SessionRunner>> {
    if let Some(dir) = &config.transcript_dir {
        return Ok(Box::new(TranscriptDirRunner::new(dir)));
    }
    let left = config.left_engine.clone().context("left engine command missing")?;
    let right = config.right_engine.clone().context("right engine command missing")?;
    let runner = ProcessRunner::new(left, right).with_prompt(&config.prompt);
    Ok(match &config.record_dir {
        Some(dir) => Box::new(RecordingRunner::new(runner, dir)),
        None => Box::new(runner),
    })
}

/// Returns whether the run passed the gate.
fn run(args: Args) -> Result<bool> {
    let config = args.into_config()?;
    let plan = config.command_plan()?;
    let runner = build_runner(&config)?;

    let store = BaselineStore::new(&config.baseline);
    let lock = store.lock()?;
    let baseline = lock.load();

    let mut patterns = config
        .patterns
        .as_deref()
        .map(PatternRepository::load)
        .transpose()?;

    let result =
        ParityAggregator::new(config.aggregator_config()).run(&config.seeds, &plan, &*runner)?;
    let regression = baseline.as_ref().map(|b| check_regression(&result, b));

    if let (Some(repo), Some(path)) = (patterns.as_mut(), config.patterns.as_deref()) {
        if result.is_complete() {
            repo.record_run(&result);
            repo.save(path)?;
        } else {
            tracing::warn!("incomplete run not recorded in pattern repository");
        }
    }

    let recommendations = recommend(&result, patterns.as_ref());
    let report = ParityReport::new(config.label.clone(), result, regression, recommendations);
    report.print_summary();

    if let Some(path) = &config.report {
        std::fs::write(path, report.to_json())
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }

    if config.update_baseline {
        match next_baseline(&report.result, report.regression.as_ref(), baseline.as_ref()) {
            Some(next) => {
                lock.save(&next)?;
                println!("Baseline updated: {}", store.path().display());
            }
            None => println!("Baseline unchanged"),
        }
    }

    Ok(gate_passed(&report, config.require_zero_logic))
}

fn gate_passed(report: &ParityReport, require_zero_logic: bool) -> bool {
    if !report.passed() {
        return false;
    }
    if require_zero_logic && report.result.logic_differences > 0 {
        tracing::warn!(
            logic_differences = report.result.logic_differences,
            "logic differences remain"
        );
        return false;
    }
    true
}
