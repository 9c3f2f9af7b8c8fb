//! Sweep orchestration: build, dispatch, aggregate.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::aggregate::{Aggregator, ArtifactPaths, partition};
use crate::builder::{SpecBuilder, build_specs};
use crate::controller::{RunStrategy, SeedPolicy, execute_run};
use crate::dispatch::{DispatchPolicy, Dispatcher, InProcessExecutor, RunExecutor};
use crate::error::SweepError;
use crate::model::{RunOutcome, SweepKind, SweepMetadata, SweepSpace, Value};

/// Timestamp format of artifact labels, e.g. `2026-Oct-19_14-03-55`
pub const LABEL_FORMAT: &str = "%Y-%b-%d_%H-%M-%S";

/// Everything needed to run one sweep
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub kind: SweepKind,
    pub space: SweepSpace,
    pub policy: DispatchPolicy,
    pub parallelism: usize,
    pub output_dir: PathBuf,
    pub seeds: SeedPolicy,
    /// Artifact label; defaults to the local start time
    pub label: Option<String>,
}

impl SweepPlan {
    pub fn new(kind: SweepKind, space: SweepSpace, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            space,
            policy: DispatchPolicy::default(),
            parallelism: crate::dispatch::default_parallelism(),
            output_dir: output_dir.into(),
            seeds: SeedPolicy::default(),
            label: None,
        }
    }
}

/// Summary of a finished sweep
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub metadata: SweepMetadata,
    pub paths: ArtifactPaths,
    pub executed: usize,
}

fn start_label() -> String {
    jiff::Zoned::now().strftime(LABEL_FORMAT).to_string()
}

/// Run a sweep on the calling process's worker threads
pub fn run_sweep<S: RunStrategy + ?Sized>(
    plan: &SweepPlan,
    strategy: &S,
) -> Result<SweepReport, SweepError> {
    let executor = InProcessExecutor::new(strategy, plan.seeds);
    run_sweep_with(plan, &executor, strategy.describe())
}

/// Run a sweep through an arbitrary executor.
///
/// Run failures never abort the sweep; only a broken outcome contract or an
/// unwritable artifact does.
pub fn run_sweep_with<E: RunExecutor + ?Sized>(
    plan: &SweepPlan,
    executor: &E,
    settings: BTreeMap<String, Value>,
) -> Result<SweepReport, SweepError> {
    let start = jiff::Timestamp::now();
    let label = plan.label.clone().unwrap_or_else(start_label);

    let specs = build_specs(&plan.space);
    if specs.is_empty() {
        tracing::warn!("sweep space is empty; writing empty artifacts");
    }
    tracing::info!(
        kind = ?plan.kind,
        runs = specs.len(),
        policy = ?plan.policy,
        parallelism = plan.parallelism,
        "starting sweep {label}"
    );

    let dispatcher = Dispatcher::new(plan.policy, plan.parallelism);
    let report = dispatcher.dispatch(&specs, executor);
    let results = partition(report.outcomes, specs.len())?;

    let axis_names = plan
        .space
        .axis_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let aggregator = Aggregator::new(&plan.output_dir, &label, axis_names);
    aggregator.write_tables(&results)?;

    let mut settings = settings;
    settings.insert("parallelism".to_string(), Value::from(plan.parallelism));
    let metadata = SweepMetadata {
        kind: plan.kind,
        label,
        start,
        end: jiff::Timestamp::now(),
        axes: plan.space.axes.clone(),
        variants: plan.space.variants.clone(),
        replicates: plan.space.replicates,
        run_count: specs.len(),
        good_count: results.good.len(),
        bad_count: results.bad.len(),
        settings,
    };
    aggregator.write_metadata(&metadata)?;

    tracing::info!(
        good = metadata.good_count,
        bad = metadata.bad_count,
        "sweep finished"
    );
    Ok(SweepReport {
        metadata,
        paths: aggregator.paths().clone(),
        executed: report.executed,
    })
}

/// Execute the single run `run_index` of a sweep, as a worker process does.
///
/// Returns `None` when the index is outside the sweep.
pub fn run_single<S: RunStrategy + ?Sized>(
    space: &SweepSpace,
    strategy: &S,
    seeds: SeedPolicy,
    run_index: usize,
) -> Option<RunOutcome> {
    let spec = SpecBuilder::new(space).get(run_index)?;
    Some(execute_run(strategy, &spec, seeds))
}
