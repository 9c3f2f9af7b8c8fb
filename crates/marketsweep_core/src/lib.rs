//! Parameter-sweep orchestration for stochastic market simulations.
//!
//! A sweep expands a declarative [`SweepSpace`](model::SweepSpace) into an
//! ordered list of run specifications, executes each run in isolation under
//! a bounded-concurrency [`Dispatcher`](dispatch::Dispatcher), and writes
//! three artifacts: a table of successful runs, a table of failed runs and a
//! JSON metadata document.
//!
//! Two kinds of run are supported:
//!
//! - stepped runs drive a step-based [`Engine`](engine::Engine) through
//!   configuration, warm-up and measurement, logging the transactions of the
//!   last ticks ([`StepRunController`](controller::StepRunController))
//! - population runs simulate a consumer population trading through a
//!   market backend ([`PopulationRunController`](controller::PopulationRunController))
//!
//! ```ignore
//! use marketsweep_core::prelude::*;
//!
//! let space = SweepSpace {
//!     axes: vec![ParameterAxis::new("#_LiqDem", [10, 20])],
//!     ..SweepSpace::default()
//! };
//! let controller = StepRunController::new(EngineSelector::default(), SteppedSettings::default());
//! let plan = SweepPlan::new(SweepKind::Stepped, space, "out");
//! let report = run_sweep(&plan, &controller)?;
//! ```

#![warn(clippy::all)]

pub mod aggregate;
pub mod builder;
pub mod controller;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod io;
pub mod model;
pub mod population;
pub mod sweep;
pub mod worker;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use crate::aggregate::{Aggregator, ArtifactPaths, ArtifactTable, Partition, partition};
    pub use crate::builder::{SpecBuilder, build_specs};
    pub use crate::controller::{
        PopulationRunController, PopulationSettings, RunContext, RunStrategy, SeedPolicy,
        StepRunController, SteppedSettings, TimingPolicy, execute_run,
    };
    pub use crate::dispatch::{DispatchPolicy, Dispatcher, InProcessExecutor, RunExecutor};
    pub use crate::engine::{Engine, EngineFactory, EngineSelector, ExternalCommand};
    pub use crate::error::{AggregationError, EngineError, RunError, SweepError};
    pub use crate::model::*;
    pub use crate::sweep::{SweepPlan, SweepReport, run_single, run_sweep, run_sweep_with};
    pub use crate::worker::ProcessExecutor;
}
