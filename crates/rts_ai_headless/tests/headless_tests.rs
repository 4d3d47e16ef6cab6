//! Full runs of the AI against the mock engine, with and without faults.

use rts_ai::capture::{CaptureBridge, TickCapture};
use rts_ai::config::AiConfig;
use rts_ai::driver::TickDriver;
use rts_ai_headless::{HeadlessRunner, RunConfig, RunSummary, Scenario};
use rts_test_utils::determinism::verify_capture_replay;
use rts_test_utils::fixtures::{BUILDER_TYPE, FACTORY_TYPE};
use tracing_subscriber::filter::LevelFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(LevelFilter::DEBUG)
        .try_init();
}

fn run_config(ticks: u32) -> RunConfig {
    RunConfig {
        ticks,
        frames_per_tick: 15,
        capture: false,
    }
}

fn runner(ticks: u32) -> HeadlessRunner {
    init_tracing();
    HeadlessRunner::new(&Scenario::skirmish(), AiConfig::default(), run_config(ticks)).unwrap()
}

fn scenario_path() -> String {
    format!("{}/scenarios/skirmish.ron", env!("CARGO_MANIFEST_DIR"))
}

// =============================================================================
// Clean runs
// =============================================================================

#[test]
fn test_builders_start_factories() {
    let mut runner = runner(30);
    let summary = runner.run().summary;

    assert_eq!(summary.skipped_ticks, 0);
    assert_eq!(summary.input_failures, 0);
    assert_eq!(summary.boundary_failures, 0);
    assert!(runner.engine().units().any(|u| u.def_id == FACTORY_TYPE));
    assert!(summary.final_metal < 1000.0);
}

#[test]
fn test_every_planned_command_is_accounted_for() {
    let mut runner = runner(40);
    let summary = runner.run().summary;
    assert_eq!(
        summary.commands_succeeded + summary.commands_failed,
        summary.commands_planned
    );
    assert_eq!(summary.final_frame, 40 * 15);
}

#[test]
fn test_scenario_file_matches_builtin() {
    let loaded = Scenario::load(scenario_path()).unwrap();
    assert_eq!(loaded, Scenario::skirmish());
}

#[test]
fn test_runner_from_files() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let ai_path = dir.path().join("ai.ron");
    std::fs::write(&ai_path, "(max_batch_size: 4, tick_budget_ms: None)").unwrap();

    let mut runner = HeadlessRunner::from_files(scenario_path(), &ai_path, run_config(10)).unwrap();
    assert_eq!(runner.driver().config().max_batch_size, 4);
    let summary = runner.run().summary;
    assert_eq!(summary.scenario, "Skirmish");
    assert_eq!(summary.budget_overruns, 0);
}

#[test]
fn test_summary_saved_as_json() {
    let mut runner = runner(5);
    let summary = runner.run().summary;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("summary.json");
    summary.save_json(&path).unwrap();

    let back: RunSummary = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(back, summary);
}

// =============================================================================
// Fault injection
// =============================================================================

#[test]
fn test_unavailable_input_skips_every_tick() {
    let mut runner = runner(10);
    runner.engine_mut().faults_mut().input_unavailable = true;
    let summary = runner.run().summary;

    assert_eq!(summary.ticks_run, 10);
    assert_eq!(summary.input_failures, 10);
    assert_eq!(summary.commands_planned, 0);
    assert!(runner.driver().snapshot().is_none());
}

#[test]
fn test_duplicate_units_skip_ticks() {
    let mut runner = runner(8);
    runner.engine_mut().faults_mut().duplicate_report = true;
    let summary = runner.run().summary;

    assert_eq!(summary.skipped_ticks, 8);
    assert!(runner.engine().executed().is_empty());
}

#[test]
fn test_execution_timeout_fails_whole_ticks() {
    let mut runner = runner(6);
    runner.engine_mut().faults_mut().execution_timeout = true;
    let summary = runner.run().summary;

    assert_eq!(summary.boundary_failures, 6);
    assert_eq!(summary.commands_succeeded, 0);
    assert_eq!(summary.commands_failed, summary.commands_planned);
    // The snapshot is still replaced even though nothing executed.
    assert_eq!(runner.driver().snapshot().map(|s| s.tick()), Some(5 * 15));
}

#[test]
fn test_rejected_builders_build_nothing() {
    let mut runner = runner(10);
    let builders: Vec<i32> = runner
        .engine()
        .units()
        .filter(|u| u.def_id == BUILDER_TYPE)
        .map(|u| u.id)
        .collect();
    runner.engine_mut().faults_mut().rejected_units.extend(builders);
    let summary = runner.run().summary;

    assert!(summary.commands_failed >= 2);
    assert!(runner.engine().units().all(|u| u.def_id != FACTORY_TYPE));
}

#[test]
fn test_engine_advancing_mid_tick_abandons_later_batches() {
    init_tracing();
    let ai = AiConfig {
        max_batch_size: 1,
        ..AiConfig::default()
    };
    let mut runner = HeadlessRunner::new(&Scenario::skirmish(), ai, run_config(1)).unwrap();
    runner.engine_mut().faults_mut().advance_during_execution = true;
    let summary = runner.run().summary;

    assert_eq!(summary.stale_abandons, 1);
    assert_eq!(runner.engine().batches(), 1);
    assert_eq!(summary.commands_succeeded, 1);
    assert_eq!(summary.commands_failed, summary.commands_planned - 1);
}

#[test]
fn test_slow_batches_exhaust_tick_budget() {
    init_tracing();
    let ai = AiConfig {
        max_batch_size: 2,
        tick_budget_ms: Some(33),
        ..AiConfig::default()
    };
    let mut runner = HeadlessRunner::new(&Scenario::skirmish(), ai, run_config(1)).unwrap();
    runner.engine_mut().faults_mut().batch_elapsed_ms = 40.0;
    let summary = runner.run().summary;

    assert_eq!(summary.budget_overruns, 1);
    assert_eq!(runner.engine().batches(), 1);
}

// =============================================================================
// Capture and replay
// =============================================================================

fn captured_run(ticks: u32) -> (HeadlessRunner, TickCapture) {
    init_tracing();
    let run = RunConfig {
        capture: true,
        ..run_config(ticks)
    };
    let mut runner = HeadlessRunner::new(&Scenario::skirmish(), AiConfig::default(), run).unwrap();
    let capture = runner.run().capture.unwrap();
    (runner, capture)
}

#[test]
fn test_capture_records_every_tick() {
    let (_, capture) = captured_run(25);
    assert_eq!(capture.len(), 25);
    assert!(capture.map.is_some());
}

#[test]
fn test_capture_replay_is_deterministic() {
    let (_, capture) = captured_run(40);
    let result = verify_capture_replay(&capture, &AiConfig::default(), 3);
    result.assert_deterministic();
    assert_eq!(result.ticks, 40);
}

#[test]
fn test_replay_reproduces_live_snapshot_and_plan() {
    let (runner, capture) = captured_run(30);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.capture");
    capture.save(&path).unwrap();

    let loaded = TickCapture::load(&path).unwrap();
    let mut replay = TickDriver::new(AiConfig::default()).unwrap();
    let mut bridge = CaptureBridge::new(loaded);
    for _ in 0..30 {
        replay.observe(&mut bridge).unwrap();
    }

    assert_eq!(bridge.remaining(), 0);
    assert_eq!(replay.snapshot(), runner.driver().snapshot());
    assert_eq!(replay.plan(), runner.driver().plan());
}

#[test]
fn test_batch_size_changes_grouping_not_outcome() {
    init_tracing();
    let mut totals = Vec::new();
    for size in [1, 3, 50] {
        let ai = AiConfig {
            max_batch_size: size,
            tick_budget_ms: None,
            ..AiConfig::default()
        };
        let mut runner = HeadlessRunner::new(&Scenario::skirmish(), ai, run_config(20)).unwrap();
        let summary = runner.run().summary;
        let batches = runner.engine().batches();
        totals.push((
            summary.commands_planned,
            summary.commands_succeeded,
            summary.final_own_units,
        ));
        assert!(batches >= 1);
        assert!(runner.engine().executed().len() <= batches * size);
    }
    assert!(totals.windows(2).all(|w| w[0] == w[1]));
}
