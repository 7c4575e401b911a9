//! End-to-end runs of the subprocess runner against the replay engine.

use std::path::Path;
use std::time::{Duration, Instant};

use zp_compare::{
    AggregatorConfig, CommandPlan, ParityAggregator, SeedStatus, SessionRunner, Side, Transcript,
    Verdict,
};
use zp_runner::{EngineCommand, ProcessRunner, TranscriptDir};

const REPLAY: &str = env!("CARGO_BIN_EXE_zp-replay-engine");

const BANNER: &str = "ZORK I: The Great Underground Empire\n\
Copyright (c) 1981, 1982, 1983 Infocom, Inc. All rights reserved.\n\
Revision 88 / Serial number 840726\n";

fn commands() -> Vec<String> {
    ["open mailbox", "take leaflet", "xyzzy"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn record(root: &Path, side: Side, blocks: &[&str]) {
    TranscriptDir::new(root)
        .save(side, 1, &Transcript::from_texts(blocks.iter().copied()))
        .unwrap();
}

fn engine(root: &Path, side: Side, extra: &[&str]) -> EngineCommand {
    let path = root.join(side.as_str()).join("seed-{seed}.json");
    let mut engine = EngineCommand::new(REPLAY).arg(path.to_string_lossy());
    for arg in extra {
        engine = engine.arg(*arg);
    }
    engine
}

fn session_blocks() -> [&'static str; 3] {
    [
        "Opening the small mailbox reveals a leaflet.\n>",
        "Taken.\n>",
        "A hollow voice says 'Fool.'\n>",
    ]
}

fn aggregator(timeout: Duration) -> ParityAggregator {
    ParityAggregator::new(AggregatorConfig {
        seed_timeout: timeout,
        workers: 2,
        ..Default::default()
    })
}

#[test]
fn test_replayed_sessions_match() {
    let tmp = tempfile::tempdir().unwrap();
    record(tmp.path(), Side::Left, &session_blocks());
    let mut right = session_blocks();
    right[2] = "A hollow voice says 'Plugh.'\n>";
    record(tmp.path(), Side::Right, &right);

    let runner = ProcessRunner::new(
        engine(tmp.path(), Side::Left, &[]),
        engine(tmp.path(), Side::Right, &["--banner", BANNER]),
    );
    let result = aggregator(Duration::from_secs(20))
        .run(&[1], &CommandPlan::new(commands()), &runner)
        .unwrap();

    assert_eq!(result.total_commands, 3);
    assert_eq!(result.matching, 2);
    assert_eq!(result.rng_differences, 1);
    assert_eq!(result.logic_parity_percentage, 100.0);
    assert_eq!(result.verdict, Verdict::Pass);
}

#[test]
fn test_banner_lands_in_first_block() {
    let tmp = tempfile::tempdir().unwrap();
    record(tmp.path(), Side::Left, &session_blocks());
    let left = engine(tmp.path(), Side::Left, &["--banner", BANNER]);
    let runner = ProcessRunner::new(left.clone(), left);

    let deadline = Instant::now() + Duration::from_secs(20);
    let transcript = runner.run(Side::Left, 1, &commands(), deadline).unwrap();
    assert_eq!(transcript.len(), 3);
    assert!(!transcript.timed_out);
    assert!(transcript.blocks[0].text().contains("Serial number"));
    assert!(transcript.blocks[0].text().contains("reveals a leaflet"));
    assert!(!transcript.blocks[1].text().contains("Infocom"));
}

#[test]
fn test_crashed_engine_is_a_length_mismatch() {
    let tmp = tempfile::tempdir().unwrap();
    record(tmp.path(), Side::Left, &session_blocks());
    record(tmp.path(), Side::Right, &session_blocks());

    let runner = ProcessRunner::new(
        engine(tmp.path(), Side::Left, &["--crash-after", "1"]),
        engine(tmp.path(), Side::Right, &[]),
    );
    let result = aggregator(Duration::from_secs(20))
        .run(&[1], &CommandPlan::new(commands()), &runner)
        .unwrap();

    assert_eq!(result.matching, 1);
    assert_eq!(result.length_mismatches, 2);
    assert_eq!(result.verdict, Verdict::Fail);
}

#[test]
fn test_slow_engine_times_out() {
    let tmp = tempfile::tempdir().unwrap();
    record(tmp.path(), Side::Left, &session_blocks());
    record(tmp.path(), Side::Right, &session_blocks());

    let runner = ProcessRunner::new(
        engine(tmp.path(), Side::Left, &[]),
        engine(tmp.path(), Side::Right, &["--delay-ms", "5000"]),
    );
    let result = aggregator(Duration::from_millis(500))
        .run(&[1], &CommandPlan::new(commands()), &runner)
        .unwrap();

    assert_eq!(result.seeds[0].status, SeedStatus::TimedOut);
    assert_eq!(result.execution_errors, 3);
    assert_eq!(result.logic_differences, 0);
    assert_eq!(result.verdict, Verdict::Incomplete);
}

#[test]
fn test_missing_recording_makes_engine_unavailable() {
    let tmp = tempfile::tempdir().unwrap();
    record(tmp.path(), Side::Left, &session_blocks());

    let runner = ProcessRunner::new(
        engine(tmp.path(), Side::Left, &[]),
        engine(tmp.path(), Side::Right, &[]),
    );
    let result = aggregator(Duration::from_secs(20))
        .run(&[1], &CommandPlan::new(commands()), &runner)
        .unwrap();

    assert_eq!(result.unavailable.len(), 1);
    assert_eq!(result.unavailable[0].side, Side::Right);
    assert_eq!(result.verdict, Verdict::Incomplete);
}
