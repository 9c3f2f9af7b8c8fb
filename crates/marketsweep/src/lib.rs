//! Command-line front end for market simulation sweeps
//!
//! Loads a YAML sweep description, sets up logging and runs the sweep with
//! `marketsweep_core`, either on worker threads or with one child process
//! per run.

pub mod logging;
pub mod runner;
pub mod settings;

pub use logging::init_logging;
pub use runner::{WorkerCommand, WorkerError, build_strategy, execute_sweep, execute_worker};
pub use settings::{ConfigError, Isolation, Overrides, SweepSettings};
