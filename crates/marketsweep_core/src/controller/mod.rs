//! Simulation run controllers.
//!
//! A [`RunStrategy`] drives one simulation instance through its lifecycle
//! and reports summary statistics. [`execute_run`] wraps a strategy so that
//! every run yields exactly one [`RunOutcome`]: errors and panics become
//! [`ErrorRecord`]s and never reach the caller.

mod context;
mod population;
mod stepped;
mod txlog;

pub use context::{RunContext, SeedPolicy};
pub use population::{PopulationRunController, PopulationSettings};
pub use stepped::{StepRunController, SteppedSettings, TimingPolicy};
pub use txlog::{TRANSACTION_LOG_HEADER, TransactionLog};

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::error::RunError;
use crate::model::{ErrorKind, ErrorRecord, RunOutcome, RunPhase, RunSpecification, StatsRecord, Value};

/// Summary statistics produced by a completed run
pub type Stats = BTreeMap<String, Value>;

/// Engine-specific lifecycle of a single run.
///
/// Strategies are shared by every worker of a sweep; anything stateful
/// (engines, models, log files) must be created inside `execute`.
pub trait RunStrategy: Send + Sync {
    /// Drive one run to completion, recording phase transitions in `ctx`
    fn execute(&self, spec: &RunSpecification, ctx: &mut RunContext) -> Result<Stats, RunError>;

    /// Parameters shared by every run, recorded in the sweep metadata
    fn describe(&self) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }
}

impl<S: RunStrategy + ?Sized> RunStrategy for &S {
    fn execute(&self, spec: &RunSpecification, ctx: &mut RunContext) -> Result<Stats, RunError> {
        (**self).execute(spec, ctx)
    }

    fn describe(&self) -> BTreeMap<String, Value> {
        (**self).describe()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run one specification and convert whatever happens into an outcome.
///
/// The returned error record carries the last phase the run reached before
/// failing.
pub fn execute_run<S: RunStrategy + ?Sized>(
    strategy: &S,
    spec: &RunSpecification,
    seeds: SeedPolicy,
) -> RunOutcome {
    let started = Instant::now();
    let seed = seeds.draw(spec.run_index);
    let span = tracing::info_span!("run", index = spec.run_index, seed);
    let _guard = span.enter();

    tracing::info!("starting {}", spec.label());
    let mut ctx = RunContext::new(seed);
    let result = panic::catch_unwind(AssertUnwindSafe(|| strategy.execute(spec, &mut ctx)));
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let (phase, kind, error) = match result {
        Ok(Ok(stats)) => {
            ctx.advance(RunPhase::Completed);
            tracing::info!(elapsed_ms, "run completed");
            return RunOutcome::Stats(StatsRecord {
                spec: spec.clone(),
                seed,
                elapsed_ms,
                stats,
            });
        }
        Ok(Err(err)) => (ctx.phase(), err.kind(), err.to_string()),
        Err(payload) => (ctx.phase(), ErrorKind::Panic, panic_message(payload.as_ref())),
    };

    ctx.advance(RunPhase::Failed);
    tracing::warn!(%phase, %kind, elapsed_ms, "run failed: {error}");
    RunOutcome::Error(ErrorRecord {
        spec: spec.clone(),
        seed: Some(seed),
        phase,
        kind,
        error,
        elapsed_ms,
    })
}
