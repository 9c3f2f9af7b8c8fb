//! Tests for the stepped run lifecycle
//!
//! These tests verify that:
//! - Exactly the last `tail_window` measured ticks are logged
//! - Each failure point yields an error record with the right kind and phase
//! - Per-tick and per-transaction query failures are skipped, not fatal
//! - The transaction log is complete on disk when a run finishes

use std::fs;

use super::support::{Fault, ScriptedFactory, stepped_settings};
use crate::aggregate::ArtifactTable;
use crate::controller::{SeedPolicy, StepRunController, TRANSACTION_LOG_HEADER, execute_run};
use crate::engine::EngineSelector;
use crate::model::{
    EngineVariant, ErrorKind, ErrorRecord, RunOutcome, RunPhase, RunSpecification, StatsRecord,
    Value,
};

fn spec(run_index: usize) -> RunSpecification {
    RunSpecification {
        run_index,
        params: vec![],
        variant: EngineVariant::Mock,
        replicate: 0,
    }
}

fn expect_stats(outcome: RunOutcome) -> StatsRecord {
    match outcome {
        RunOutcome::Stats(record) => record,
        RunOutcome::Error(record) => panic!("run failed: {record:?}"),
    }
}

fn expect_error(outcome: RunOutcome) -> ErrorRecord {
    match outcome {
        RunOutcome::Error(record) => record,
        RunOutcome::Stats(record) => panic!("run succeeded: {record:?}"),
    }
}

fn read_log(path: &str) -> ArtifactTable {
    let content = fs::read_to_string(path).unwrap();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_reader(content.as_bytes());
    let headers = reader.headers().unwrap().iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    ArtifactTable { headers, rows }
}

/// Only the last 10 of 20 measured ticks contribute transactions
#[test]
fn test_tail_window_logs_last_ticks_only() {
    let dir = tempfile::tempdir().unwrap();
    let controller = StepRunController::new(
        ScriptedFactory::new(2),
        stepped_settings(dir.path(), 5, 20),
    );

    let record = expect_stats(execute_run(&controller, &spec(0), SeedPolicy::Pinned(0)));
    assert_eq!(record.stats["warmup_ticks"], Value::Int(5));
    assert_eq!(record.stats["measured_ticks"], Value::Int(20));
    assert_eq!(record.stats["logged_transactions"], Value::Int(20));
    assert_eq!(record.stats["ticks"], Value::Int(25));

    let log = read_log(record.stats["transaction_log"].as_str().unwrap());
    assert_eq!(log.headers, TRANSACTION_LOG_HEADER.to_vec());
    assert_eq!(log.len(), 20);
    let mut ticks: Vec<i64> = log
        .column("Tick")
        .unwrap()
        .iter()
        .map(|t| t.parse().unwrap())
        .collect();
    ticks.dedup();
    assert_eq!(ticks, (16..=25).collect::<Vec<_>>());
}

#[test]
fn test_tail_window_longer_than_measurement() {
    let dir = tempfile::tempdir().unwrap();
    let controller = StepRunController::new(
        ScriptedFactory::new(1),
        stepped_settings(dir.path(), 3, 4),
    );
    let record = expect_stats(execute_run(&controller, &spec(0), SeedPolicy::Pinned(0)));
    assert_eq!(record.stats["logged_transactions"], Value::Int(4));
}

#[test]
fn test_seed_and_burn_in_pushed_to_engine() {
    let dir = tempfile::tempdir().unwrap();
    let controller = StepRunController::new(
        ScriptedFactory::new(0),
        stepped_settings(dir.path(), 7, 12),
    );
    let record = expect_stats(execute_run(&controller, &spec(3), SeedPolicy::Pinned(40)));
    assert_eq!(record.seed, 43);
    assert_eq!(record.stats["SEED"], Value::Int(43));
    assert_eq!(record.stats["endBurninTime"], Value::Int(7));
}

#[test]
fn test_log_named_by_run_and_seed() {
    let dir = tempfile::tempdir().unwrap();
    let controller = StepRunController::new(
        ScriptedFactory::new(1),
        stepped_settings(dir.path(), 0, 5),
    );
    expect_stats(execute_run(&controller, &spec(2), SeedPolicy::Pinned(10)));
    assert!(dir.path().join("LMtransact_2_12.tsv").exists());
}

#[test]
fn test_configuration_failure() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(1).fault(0, Fault::Configure);
    let controller = StepRunController::new(factory, stepped_settings(dir.path(), 5, 20));

    let record = expect_error(execute_run(&controller, &spec(0), SeedPolicy::Pinned(0)));
    assert_eq!(record.kind, ErrorKind::Configuration);
    assert_eq!(record.phase, RunPhase::Uninitialized);
    assert_eq!(record.seed, Some(0));
    assert_eq!(record.spec, spec(0));
}

#[test]
fn test_setup_failure() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(1).fault(0, Fault::Setup);
    let controller = StepRunController::new(factory, stepped_settings(dir.path(), 5, 20));

    let record = expect_error(execute_run(&controller, &spec(0), SeedPolicy::Pinned(0)));
    assert_eq!(record.kind, ErrorKind::Setup);
    assert_eq!(record.phase, RunPhase::Uninitialized);
}

#[test]
fn test_step_failure_during_warmup() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(1).fault(0, Fault::StepAt(3));
    let controller = StepRunController::new(factory, stepped_settings(dir.path(), 5, 20));

    let record = expect_error(execute_run(&controller, &spec(0), SeedPolicy::Pinned(0)));
    assert_eq!(record.kind, ErrorKind::Step);
    assert_eq!(record.phase, RunPhase::Configured);
    assert!(record.error.contains("tick 3"));
    // No measurement started, so no log was opened
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_step_failure_during_measurement() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(1).fault(0, Fault::StepAt(12));
    let controller = StepRunController::new(factory, stepped_settings(dir.path(), 5, 20));

    let record = expect_error(execute_run(&controller, &spec(0), SeedPolicy::Pinned(0)));
    assert_eq!(record.kind, ErrorKind::Step);
    assert_eq!(record.phase, RunPhase::Measuring);
}

#[test]
fn test_terminal_query_failure_after_log_closed() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(3).fault(0, Fault::TerminalQuery);
    let controller = StepRunController::new(factory, stepped_settings(dir.path(), 5, 20));

    let record = expect_error(execute_run(&controller, &spec(0), SeedPolicy::Pinned(0)));
    assert_eq!(record.kind, ErrorKind::Query);
    assert_eq!(record.phase, RunPhase::Measuring);
    assert!(record.error.contains("final-price"));

    // The log was flushed and closed before the terminal reporters ran
    let log = read_log(dir.path().join("LMtransact_0_0.tsv").to_str().unwrap());
    assert_eq!(log.len(), 30);
}

#[test]
fn test_panic_becomes_error_record() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(1).fault(0, Fault::PanicAt(2));
    let controller = StepRunController::new(factory, stepped_settings(dir.path(), 5, 20));

    let record = expect_error(execute_run(&controller, &spec(0), SeedPolicy::Pinned(0)));
    assert_eq!(record.kind, ErrorKind::Panic);
    assert!(record.error.contains("scripted panic"));
}

/// A failed tick query skips that tick; the run still succeeds
#[test]
fn test_tick_query_failure_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(2).fault(0, Fault::TickQueryAt(20));
    let controller = StepRunController::new(factory, stepped_settings(dir.path(), 5, 20));

    let record = expect_stats(execute_run(&controller, &spec(0), SeedPolicy::Pinned(0)));
    assert_eq!(record.stats["logged_transactions"], Value::Int(18));
    assert_eq!(record.stats["skipped_queries"], Value::Int(1));
}

/// A malformed field skips only that transaction
#[test]
fn test_malformed_transaction_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(2).fault(0, Fault::FieldAt(22));
    let controller = StepRunController::new(factory, stepped_settings(dir.path(), 5, 20));

    let record = expect_stats(execute_run(&controller, &spec(0), SeedPolicy::Pinned(0)));
    assert_eq!(record.stats["logged_transactions"], Value::Int(19));
    assert_eq!(record.stats["skipped_queries"], Value::Int(1));
}

/// Full lifecycle against the in-process market engine
#[test]
fn test_mock_market_engine_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = stepped_settings(dir.path(), 20, 40);
    settings.reporters = vec![
        "ticks".to_string(),
        "last-price".to_string(),
        "transaction-count".to_string(),
    ];
    let controller = StepRunController::new(EngineSelector::default(), settings);

    let record = expect_stats(execute_run(&controller, &spec(0), SeedPolicy::Pinned(99)));
    assert_eq!(record.stats["ticks"], Value::Int(60));
    assert!(record.stats["last-price"].as_f64().unwrap() > 0.0);

    let logged = record.stats["logged_transactions"].as_i64().unwrap();
    let log = read_log(record.stats["transaction_log"].as_str().unwrap());
    assert_eq!(log.len() as i64, logged);
    for tick in log.column("Tick").unwrap() {
        let tick: i64 = tick.parse().unwrap();
        assert!((51..=60).contains(&tick));
    }
}
