//! Turns validated settings into a running sweep

use std::path::PathBuf;

use marketsweep_core::controller::{PopulationRunController, RunStrategy, StepRunController};
use marketsweep_core::engine::EngineSelector;
use marketsweep_core::error::SweepError;
use marketsweep_core::model::SweepKind;
use marketsweep_core::sweep::{SweepReport, run_single, run_sweep, run_sweep_with};
use marketsweep_core::worker::{ProcessExecutor, encode_outcome};
use thiserror::Error;

use crate::settings::{Isolation, SweepSettings};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("run index {index} is outside the sweep ({runs} runs)")]
    OutOfRange { index: usize, runs: usize },
    #[error("cannot encode run outcome: {0}")]
    Encode(#[from] serde_json::Error),
}

/// How to re-invoke this program as a single-run worker
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// Worker invocation for `config`, forwarding the options a worker
    /// needs to reproduce its parent's run
    pub fn new(program: PathBuf, config: &str, log_level: &str, seed: Option<u64>) -> Self {
        let mut args = vec![
            config.to_string(),
            "--log-level".to_string(),
            log_level.to_string(),
        ];
        if let Some(seed) = seed {
            args.push("--seed".to_string());
            args.push(seed.to_string());
        }
        Self { program, args }
    }
}

/// The run strategy a sweep of `settings.kind` drives
pub fn build_strategy(settings: &SweepSettings) -> Box<dyn RunStrategy> {
    let factory = EngineSelector::new(settings.external.clone());
    match settings.kind {
        SweepKind::Stepped => {
            let mut stepped = settings.stepped.clone();
            stepped.log_dir = settings.transaction_dir();
            Box::new(StepRunController::new(factory, stepped))
        }
        SweepKind::Population => Box::new(PopulationRunController::new(
            factory,
            settings.population.clone(),
        )),
    }
}

/// Run the whole sweep, in threads or in worker processes
pub fn execute_sweep(
    settings: &SweepSettings,
    worker: &WorkerCommand,
) -> Result<SweepReport, SweepError> {
    let strategy = build_strategy(settings);
    let plan = settings.plan();
    match settings.isolation {
        Isolation::Thread => run_sweep(&plan, strategy.as_ref()),
        Isolation::Process => {
            let executor = ProcessExecutor::new(worker.program.clone(), worker.args.clone());
            let mut described = strategy.describe();
            described.insert("isolation".to_string(), "process".into());
            run_sweep_with(&plan, &executor, described)
        }
    }
}

/// Execute run `run_index` and return its outcome as one JSON line
pub fn execute_worker(settings: &SweepSettings, run_index: usize) -> Result<String, WorkerError> {
    let space = settings.space();
    let strategy = build_strategy(settings);
    let outcome = run_single(&space, strategy.as_ref(), settings.seeds(), run_index).ok_or(
        WorkerError::OutOfRange {
            index: run_index,
            runs: space.total_runs(),
        },
    )?;
    Ok(encode_outcome(&outcome)?)
}
