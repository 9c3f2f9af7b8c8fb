//! Per-run outcome records and the measured-tick transaction log rows

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{RunSpecification, Value};

/// Lifecycle phase of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Uninitialized,
    Configured,
    WarmedUp,
    Measuring,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Uninitialized => "uninitialized",
            RunPhase::Configured => "configured",
            RunPhase::WarmedUp => "warmed_up",
            RunPhase::Measuring => "measuring",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Classification of a run failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Engine or model rejected a variable/value
    Configuration,
    /// Engine setup command failed
    Setup,
    /// Engine failed while advancing a tick
    Step,
    /// Engine failed or returned malformed data for a report expression
    Query,
    /// A run-owned file could not be written
    Io,
    /// A collaborator panicked
    Panic,
    /// Worker process failed or produced no decodable record
    Worker,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Setup => "setup",
            ErrorKind::Step => "step",
            ErrorKind::Query => "query",
            ErrorKind::Io => "io",
            ErrorKind::Panic => "panic",
            ErrorKind::Worker => "worker",
        };
        f.write_str(name)
    }
}

/// Summary statistics of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRecord {
    pub spec: RunSpecification,
    pub seed: u64,
    pub elapsed_ms: u64,
    pub stats: BTreeMap<String, Value>,
}

/// Description of a failed run, carrying its original specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub spec: RunSpecification,
    /// Seed drawn for the run, if it got that far
    pub seed: Option<u64>,
    /// Phase the run was in when it failed
    pub phase: RunPhase,
    pub kind: ErrorKind,
    pub error: String,
    pub elapsed_ms: u64,
}

/// Exactly one of these is produced for every run specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum RunOutcome {
    Stats(StatsRecord),
    Error(ErrorRecord),
}

impl RunOutcome {
    pub fn spec(&self) -> &RunSpecification {
        match self {
            RunOutcome::Stats(r) => &r.spec,
            RunOutcome::Error(r) => &r.spec,
        }
    }

    pub fn run_index(&self) -> usize {
        self.spec().run_index
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RunOutcome::Error(_))
    }

    pub fn elapsed_ms(&self) -> u64 {
        match self {
            RunOutcome::Stats(r) => r.elapsed_ms,
            RunOutcome::Error(r) => r.elapsed_ms,
        }
    }
}

/// One executed trade in the measured tail window.
///
/// Field names follow the column schema of the transaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(rename = "Tick")]
    pub tick: i64,
    #[serde(rename = "TrdID")]
    pub id: i64,
    #[serde(rename = "TrdPrice")]
    pub price: f64,
    #[serde(rename = "TrdTime")]
    pub time: f64,
    #[serde(rename = "TrdQuant")]
    pub quantity: i64,
    #[serde(rename = "TrdWhoBid")]
    pub buyer_id: i64,
    #[serde(rename = "TrdWhoAsk")]
    pub seller_id: i64,
    #[serde(rename = "TrdWhoBidType")]
    pub buyer_type: String,
    #[serde(rename = "TrdWhoAskType")]
    pub seller_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EngineVariant;

    fn spec() -> RunSpecification {
        RunSpecification {
            run_index: 3,
            params: vec![],
            variant: EngineVariant::Mock,
            replicate: 1,
        }
    }

    #[test]
    fn test_outcome_json_is_tagged() {
        let outcome = RunOutcome::Error(ErrorRecord {
            spec: spec(),
            seed: Some(7),
            phase: RunPhase::WarmedUp,
            kind: ErrorKind::Step,
            error: "engine died".to_string(),
            elapsed_ms: 12,
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "error");
        assert_eq!(json["phase"], "warmed_up");
        assert_eq!(json["kind"], "step");

        let back: RunOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn test_untagged_record_is_rejected() {
        let json = serde_json::json!({
            "spec": { "run_index": 0, "params": [], "variant": "mock", "replicate": 0 },
            "seed": 1,
            "elapsed_ms": 0,
            "stats": {}
        });
        assert!(serde_json::from_value::<RunOutcome>(json).is_err());
    }
}
