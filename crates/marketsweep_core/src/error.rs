use thiserror::Error;

use crate::model::ErrorKind;

/// Errors reported by a simulation engine backend
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine rejected a variable assignment
    #[error("cannot set {name}: {reason}")]
    Configuration { name: String, reason: String },
    /// Engine setup command failed
    #[error("setup failed: {0}")]
    Setup(String),
    /// Engine failed while advancing one tick
    #[error("step failed: {0}")]
    Step(String),
    /// Engine failed or returned malformed data for a report expression
    #[error("query `{expression}` failed: {reason}")]
    Query { expression: String, reason: String },
    /// Engine could not be started or its channel broke
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

impl EngineError {
    pub fn query(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Query {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(name: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Configuration {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Classification used on error records
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Configuration { .. } | EngineError::Unavailable(_) => {
                ErrorKind::Configuration
            }
            EngineError::Setup(_) => ErrorKind::Setup,
            EngineError::Step(_) => ErrorKind::Step,
            EngineError::Query { .. } => ErrorKind::Query,
        }
    }
}

/// Failure of a single run, converted to an error record by the controller
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// A swept parameter is unknown or has the wrong type for the model
    #[error("invalid parameter {name}: {reason}")]
    Parameter { name: String, reason: String },
    #[error("transaction log: {0}")]
    Io(#[from] std::io::Error),
    #[error("transaction log: {0}")]
    Csv(#[from] csv::Error),
}

impl RunError {
    pub fn parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        RunError::Parameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::Engine(e) => e.kind(),
            RunError::Parameter { .. } => ErrorKind::Configuration,
            RunError::Io(_) | RunError::Csv(_) => ErrorKind::Io,
        }
    }
}

/// Broken contract between run controllers and the aggregator.
///
/// This is the only error class that aborts a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("outcome for run {run_index} does not belong to a sweep of {run_count} runs")]
    UnknownRun { run_index: usize, run_count: usize },
    #[error("run {0} reported more than one outcome")]
    DuplicateRun(usize),
    #[error("run {0} reported no outcome")]
    MissingRun(usize),
}

/// Failure to write or read a sweep artifact
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArtifactError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        ArtifactError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Errors that abort a whole sweep
#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}
