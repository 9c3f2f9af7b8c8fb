//! Process isolation: one child process per run.
//!
//! The child is invoked as `<program> <args...> --run-index <i>`, executes
//! exactly one run and prints its [`RunOutcome`] as a single JSON line on
//! stdout. Anything that prevents a decodable record for the requested run
//! becomes an [`ErrorRecord`] of kind [`ErrorKind::Worker`].

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;

use crate::dispatch::RunExecutor;
use crate::model::{ErrorKind, ErrorRecord, RunOutcome, RunPhase, RunSpecification};

pub const RUN_INDEX_FLAG: &str = "--run-index";

/// Serialize an outcome as the worker's single stdout line
pub fn encode_outcome(outcome: &RunOutcome) -> serde_json::Result<String> {
    serde_json::to_string(outcome)
}

/// Decode the record printed by a worker for `spec`
pub fn decode_outcome(stdout: &str, spec: &RunSpecification) -> Result<RunOutcome, String> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| "worker produced no record".to_string())?;
    let outcome: RunOutcome =
        serde_json::from_str(line).map_err(|e| format!("undecodable worker record: {e}"))?;
    if outcome.spec() != spec {
        return Err(format!(
            "worker reported run {} instead of run {}",
            outcome.run_index(),
            spec.run_index
        ));
    }
    Ok(outcome)
}

fn worker_error(spec: &RunSpecification, error: String, elapsed_ms: u64) -> RunOutcome {
    tracing::warn!(run = spec.run_index, "worker failed: {error}");
    RunOutcome::Error(ErrorRecord {
        spec: spec.clone(),
        seed: None,
        phase: RunPhase::Uninitialized,
        kind: ErrorKind::Worker,
        error,
        elapsed_ms,
    })
}

/// Runs every specification in its own child process
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessExecutor {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl RunExecutor for ProcessExecutor {
    fn execute(&self, spec: &RunSpecification) -> RunOutcome {
        let started = Instant::now();
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(RUN_INDEX_FLAG)
            .arg(spec.run_index.to_string())
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return worker_error(
                    spec,
                    format!("failed to start {}: {e}", self.program.display()),
                    elapsed_ms,
                );
            }
        };

        match decode_outcome(&String::from_utf8_lossy(&output.stdout), spec) {
            Ok(outcome) => outcome,
            Err(reason) => worker_error(spec, format!("{reason} ({})", output.status), elapsed_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{EngineVariant, StatsRecord};

    fn spec(run_index: usize) -> RunSpecification {
        RunSpecification {
            run_index,
            params: vec![],
            variant: EngineVariant::Mock,
            replicate: 0,
        }
    }

    fn stats(run_index: usize) -> RunOutcome {
        RunOutcome::Stats(StatsRecord {
            spec: spec(run_index),
            seed: 7,
            elapsed_ms: 3,
            stats: BTreeMap::new(),
        })
    }

    #[test]
    fn test_decode_last_line() {
        let line = encode_outcome(&stats(2)).unwrap();
        let stdout = format!("noise\n{line}\n\n");
        assert_eq!(decode_outcome(&stdout, &spec(2)).unwrap(), stats(2));
    }

    #[test]
    fn test_decode_rejects_wrong_run() {
        let line = encode_outcome(&stats(1)).unwrap();
        let err = decode_outcome(&line, &spec(2)).unwrap_err();
        assert!(err.contains("instead of run 2"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_outcome("", &spec(0)).is_err());
        assert!(decode_outcome("{\"outcome\":\"maybe\"}", &spec(0)).is_err());
    }

    #[test]
    fn test_missing_worker_program() {
        let executor = ProcessExecutor::new("/nonexistent/marketsweep-worker", vec![]);
        match executor.execute(&spec(4)) {
            RunOutcome::Error(record) => {
                assert_eq!(record.kind, ErrorKind::Worker);
                assert_eq!(record.spec.run_index, 4);
                assert_eq!(record.seed, None);
            }
            other => panic!("expected an error record, got {other:?}"),
        }
    }
}
