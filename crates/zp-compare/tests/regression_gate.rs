//! Regression gate: fixed scenarios, the seed aggregator, and baseline
//! persistence.
//!
//! Scenarios run through the public comparator and aggregator only, with a
//! scripted runner standing in for the two engines.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use zp_compare::{
    AggregatorConfig, Baseline, BaselineStore, Classification, CommandPlan, ParityAggregator,
    ParityError, ParityResult, RunnerError, SeedResult, SeedStatus, SessionRunner, Side,
    Transcript, TranscriptComparator, Verdict, check_regression, next_baseline,
};

// ============================================================================
// Scripted runner
// ============================================================================

/// Serves canned transcripts; seeds without one are unavailable.
#[derive(Default)]
struct ScriptedRunner {
    transcripts: HashMap<(Side, u64), Transcript>,
}

impl ScriptedRunner {
    fn with(mut self, seed: u64, left: Transcript, right: Transcript) -> Self {
        self.transcripts.insert((Side::Left, seed), left);
        self.transcripts.insert((Side::Right, seed), right);
        self
    }

    fn with_side(mut self, side: Side, seed: u64, transcript: Transcript) -> Self {
        self.transcripts.insert((side, seed), transcript);
        self
    }
}

impl SessionRunner for ScriptedRunner {
    fn run(
        &self,
        side: Side,
        seed: u64,
        _commands: &[String],
        _deadline: Instant,
    ) -> Result<Transcript, RunnerError> {
        self.transcripts
            .get(&(side, seed))
            .cloned()
            .ok_or_else(|| RunnerError::Unavailable {
                side,
                seed,
                reason: "no transcript recorded".into(),
            })
    }
}

fn commands(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn run(seeds: &[u64], plan: &CommandPlan, runner: &ScriptedRunner) -> ParityResult {
    let aggregator = ParityAggregator::new(AggregatorConfig {
        workers: 2,
        ..Default::default()
    });
    aggregator.run(seeds, plan, runner).unwrap()
}

// ============================================================================
// Fixed scenarios
// ============================================================================

struct Scenario {
    label: &'static str,
    commands: &'static [&'static str],
    left: &'static [&'static str],
    right: &'static [&'static str],
    matching: usize,
    status_bar_only: usize,
    rng: usize,
    state: usize,
    logic: usize,
    logic_parity: f64,
}

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            label: "magic word answered from the hollow voice pool",
            commands: &["xyzzy"],
            left: &["A hollow voice says 'Fool.'\n>"],
            right: &["A hollow voice says 'Plugh.'\n>"],
            matching: 0,
            status_bar_only: 0,
            rng: 1,
            state: 0,
            logic: 0,
            logic_parity: 100.0,
        },
        Scenario {
            label: "score differs only in the status bar",
            commands: &["take leaflet"],
            left: &["Score: 10\nTaken.\n>"],
            right: &["Score: 15\nTaken.\n>"],
            matching: 1,
            status_bar_only: 1,
            rng: 0,
            state: 0,
            logic: 0,
            logic_parity: 100.0,
        },
        Scenario {
            label: "blocked exit after a fork is a state divergence",
            commands: &["jump", "north"],
            left: &["Wheeeeeeeeee!!!!!\n>", "The door is closed.\n>"],
            right: &[
                "Are you enjoying yourself?\n>",
                "North of House\nYou are facing the north side of a white house.\n>",
            ],
            matching: 0,
            status_bar_only: 0,
            rng: 1,
            state: 1,
            logic: 0,
            logic_parity: 100.0,
        },
        Scenario {
            label: "blocked exit without a fork is a logic difference",
            commands: &["open mailbox", "north"],
            left: &["Opening the small mailbox reveals a leaflet.\n>", "The door is closed.\n>"],
            right: &[
                "Opening the small mailbox reveals a leaflet.\n>",
                "North of House\nYou are facing the north side of a white house.\n>",
            ],
            matching: 1,
            status_bar_only: 0,
            rng: 0,
            state: 0,
            logic: 1,
            logic_parity: 50.0,
        },
        Scenario {
            label: "banner and prompt are not behavior",
            commands: &["look"],
            left: &["West of House    Score: 0    Moves: 0\n\
ZORK I: The Great Underground Empire\n\
Copyright (c) 1981, 1982, 1983 Infocom, Inc. All rights reserved.\n\
\n\
West of House\nYou are standing in an open field west of a white house.\n\n>"],
            right: &["West of House\nYou are standing in an open field west of a white house.\n>"],
            matching: 1,
            status_bar_only: 1,
            rng: 0,
            state: 0,
            logic: 0,
            logic_parity: 100.0,
        },
    ]
}

#[test]
fn test_fixed_scenarios() {
    for s in scenarios() {
        let comparison = TranscriptComparator::new().compare(
            &Transcript::from_texts(s.left.iter().copied()),
            &Transcript::from_texts(s.right.iter().copied()),
            &commands(s.commands),
        );
        let result = SeedResult::from_comparison(1, comparison);
        assert_eq!(result.matching, s.matching, "{}: matching", s.label);
        assert_eq!(
            result.status_bar_only_differences, s.status_bar_only,
            "{}: status bar", s.label
        );
        assert_eq!(result.count(Classification::RngDifference), s.rng, "{}: rng", s.label);
        assert_eq!(result.count(Classification::StateDivergence), s.state, "{}: state", s.label);
        assert_eq!(result.count(Classification::LogicDifference), s.logic, "{}: logic", s.label);
        assert_eq!(result.logic_parity_percentage, s.logic_parity, "{}: logic parity", s.label);
    }
}

#[test]
fn test_hollow_voice_pool_member_recorded() {
    let c = TranscriptComparator::new().compare(
        &Transcript::from_texts(["A hollow voice says 'Fool.'\n>"]),
        &Transcript::from_texts(["A hollow voice says 'Plugh.'\n>"]),
        &commands(&["xyzzy"]),
    );
    assert_eq!(c.differences[0].pool, Some(zp_compare::PoolId::HollowVoice));
    assert_eq!(c.rng_indices, [0]);
}

// ============================================================================
// Aggregator
// ============================================================================

#[test]
fn test_aggregator_merges_seeds() {
    let plan = CommandPlan::new(commands(&["xyzzy", "take leaflet"]));
    let runner = ScriptedRunner::default()
        .with(
            1,
            Transcript::from_texts(["A hollow voice says 'Fool.'\n>", "Taken.\n>"]),
            Transcript::from_texts(["A hollow voice says 'Plugh.'\n>", "Taken.\n>"]),
        )
        .with(
            2,
            Transcript::from_texts(["A hollow voice says 'Fool.'\n>", "Taken.\n>"]),
            Transcript::from_texts(["A hollow voice says 'Fool.'\n>", "What leaflet?\n>"]),
        );
    let result = run(&[1, 2], &plan, &runner);

    assert_eq!(result.seeds.len(), 2);
    assert_eq!(result.total_commands, 4);
    assert_eq!(result.matching, 2);
    assert_eq!(result.rng_differences, 1);
    assert_eq!(result.logic_differences, 1);
    assert_eq!(result.logic_parity_percentage, 75.0);
    assert_eq!(result.verdict, Verdict::Fail);
}

#[test]
fn test_aggregator_reports_unavailable_seed() {
    let plan = CommandPlan::new(commands(&["wait"]));
    let runner = ScriptedRunner::default()
        .with(
            1,
            Transcript::from_texts(["Time passes...\n>"]),
            Transcript::from_texts(["Time passes...\n>"]),
        )
        .with_side(Side::Left, 2, Transcript::from_texts(["Time passes...\n>"]));
    let result = run(&[1, 2], &plan, &runner);

    assert_eq!(result.seeds.len(), 1);
    assert_eq!(result.unavailable.len(), 1);
    assert_eq!(result.unavailable[0].seed, 2);
    assert_eq!(result.unavailable[0].side, Side::Right);
    assert_eq!(result.verdict, Verdict::Incomplete);
    assert!(result.parity_percentage < 100.0);
}

#[test]
fn test_aggregator_counts_timed_out_transcript() {
    let plan = CommandPlan::new(commands(&["wait", "wait", "wait"]));
    let runner = ScriptedRunner::default().with(
        1,
        Transcript::from_texts(["Time passes...\n>"; 3]),
        Transcript::from_texts(["Time passes...\n>"]).into_timed_out(),
    );
    let result = run(&[1], &plan, &runner);

    assert_eq!(result.seeds[0].status, SeedStatus::TimedOut);
    assert_eq!(result.execution_errors, 2);
    assert_eq!(result.logic_differences, 0);
    assert_eq!(result.verdict, Verdict::Incomplete);
}

/// Answers the left side at once; the right side stalls until the seed
/// deadline and returns only the blocks it managed to produce.
struct StallingRunner {
    left: Transcript,
    right_partial: Transcript,
}

impl SessionRunner for StallingRunner {
    fn run(
        &self,
        side: Side,
        _seed: u64,
        _commands: &[String],
        deadline: Instant,
    ) -> Result<Transcript, RunnerError> {
        match side {
            Side::Left => Ok(self.left.clone()),
            Side::Right => {
                std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                Ok(self.right_partial.clone().into_timed_out())
            }
        }
    }
}

#[test]
fn test_seed_timeout_keeps_partial_results() {
    let plan = CommandPlan::new(commands(&["take lamp", "drop lamp", "wait"]));
    let runner = StallingRunner {
        left: Transcript::from_texts(["Taken.\n>", "Dropped.\n>", "Time passes...\n>"]),
        right_partial: Transcript::from_texts(["Taken.\n>", "Dropped.\n>"]),
    };
    let aggregator = ParityAggregator::new(AggregatorConfig {
        seed_timeout: Duration::from_millis(200),
        workers: 1,
        ..Default::default()
    });
    let result = aggregator.run(&[1], &plan, &runner).unwrap();

    assert_eq!(result.seeds[0].status, SeedStatus::TimedOut);
    assert_eq!(result.matching, 2);
    assert_eq!(result.execution_errors, 1);
    assert_eq!(result.logic_differences, 0);
    assert_eq!(result.verdict, Verdict::Incomplete);
}

#[test]
fn test_per_seed_command_override() {
    let plan = CommandPlan::new(commands(&["wait"])).with_seed(3, commands(&["wait", "wait"]));
    let runner = ScriptedRunner::default().with(
        3,
        Transcript::from_texts(["Time passes...\n>"; 2]),
        Transcript::from_texts(["Time passes...\n>"; 2]),
    );
    let result = run(&[3], &plan, &runner);
    assert_eq!(result.total_commands, 2);
    assert_eq!(result.verdict, Verdict::Pass);
}

// ============================================================================
// Regression check and baseline
// ============================================================================

fn single_seed(left: &[&str], right: &[&str], cmds: &[&str]) -> ParityResult {
    let comparison = TranscriptComparator::new().compare(
        &Transcript::from_texts(left.iter().copied()),
        &Transcript::from_texts(right.iter().copied()),
        &commands(cmds),
    );
    ParityResult::from_seeds(vec![SeedResult::from_comparison(1, comparison)], vec![])
}

#[test]
fn test_new_logic_signature_fails_regression() {
    let accepted = single_seed(
        &["Taken.\n>", "Dropped.\n>"],
        &["Taken.\n>", "Dropped.\n>"],
        &["take lamp", "drop lamp"],
    );
    let baseline = Baseline::from_result(&accepted);

    let current = single_seed(
        &["Taken.\n>", "Dropped.\n>"],
        &["Taken.\n>", "You don't have that.\n>"],
        &["take lamp", "drop lamp"],
    );
    let verdict = check_regression(&current, &baseline);
    assert!(!verdict.passed);
    assert_eq!(verdict.new_signatures.len(), 1);
    assert_eq!(verdict.new_signatures[0].command, "drop lamp");
    assert!(next_baseline(&current, Some(&verdict), Some(&baseline)).is_none());
}

#[test]
fn test_swapped_signature_with_same_count_fails() {
    let before = single_seed(&["Taken.\n>"], &["What lamp?\n>"], &["take lamp"]);
    let after = single_seed(&["Dropped.\n>"], &["What sword?\n>"], &["drop sword"]);
    let baseline = Baseline::from_result(&before);
    let verdict = check_regression(&after, &baseline);
    assert_eq!(verdict.current_logic_differences, verdict.baseline_logic_differences);
    assert!(!verdict.passed);
    assert_eq!(verdict.resolved_signatures.len(), 1);
}

#[test]
fn test_resolved_difference_updates_baseline() {
    let before = single_seed(&["Taken.\n>"], &["What lamp?\n>"], &["take lamp"]);
    let baseline = Baseline::from_result(&before);
    let after = single_seed(&["Taken.\n>"], &["Taken.\n>"], &["take lamp"]);

    let verdict = check_regression(&after, &baseline);
    assert!(verdict.passed);
    let next = next_baseline(&after, Some(&verdict), Some(&baseline)).unwrap();
    assert!(next.logic_parity_percentage >= baseline.logic_parity_percentage);
    assert!(next.signatures.is_empty());
}

#[test]
fn test_incomplete_run_never_becomes_baseline() {
    let result = ParityResult::from_seeds(
        vec![],
        vec![zp_compare::UnavailableSeed {
            seed: 4,
            side: Side::Left,
            reason: "engine missing".into(),
            commands: 5,
        }],
    );
    assert!(next_baseline(&result, None, None).is_none());
}

#[test]
fn test_baseline_lock_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let store = BaselineStore::new(dir.path().join("baseline.json"));

    let lock = store.lock().unwrap();
    let Err(err) = store.lock() else {
        panic!("second lock must fail");
    };
    let ParityError::BaselineLocked { lock_path, holder, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(lock_path, &dir.path().join("baseline.json.lock"));
    assert_eq!(holder, &format!("pid {}", std::process::id()));
    assert!(err.to_string().contains("baseline.json.lock"));
    drop(lock);
    assert!(store.lock().is_ok());
}

#[test]
fn test_stale_lock_names_its_holder() {
    let dir = tempfile::tempdir().unwrap();
    let store = BaselineStore::new(dir.path().join("baseline.json"));
    std::fs::write(dir.path().join("baseline.json.lock"), "4242\n").unwrap();

    let message = store.lock().unwrap_err().to_string();
    assert!(message.contains("pid 4242"), "{message}");
    assert!(message.contains("remove"), "{message}");

    std::fs::remove_file(dir.path().join("baseline.json.lock")).unwrap();
    assert!(store.lock().is_ok());
}

#[test]
fn test_baseline_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = BaselineStore::new(dir.path().join("baseline.json"));
    let result = single_seed(&["Taken.\n>"], &["What lamp?\n>"], &["take lamp"]);
    let baseline = Baseline::from_result(&result);

    let lock = store.lock().unwrap();
    assert!(lock.load().is_none());
    lock.save(&baseline).unwrap();

    let lock = store.lock().unwrap();
    let loaded = lock.load().unwrap();
    assert_eq!(loaded, baseline);
    assert_eq!(loaded.count(Classification::LogicDifference), 1);
}

#[test]
fn test_corrupt_baseline_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("baseline.json");
    std::fs::write(&path, "{ not json").unwrap();

    let lock = BaselineStore::new(&path).lock().unwrap();
    assert!(lock.load().is_none());
}
