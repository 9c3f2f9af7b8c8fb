//! Driver for an engine living in an external process.
//!
//! The child speaks a line protocol over stdin/stdout:
//!
//! ```text
//! > set #_LiqSup 20        < ok
//! > setup                  < ok
//! > go                     < ok
//! > report ticks           < ok 1
//! > report bogus           < err unknown reporter
//! > quit
//! ```
//!
//! There is no timeout: a child that never answers blocks the calling worker.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::{Deserialize, Serialize};

use super::Engine;
use crate::error::EngineError;
use crate::model::Value;

/// How to launch the external engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// Parse one protocol reply line.
///
/// `ok` yields `Ok(None)`, `ok <value>` yields the parsed value and
/// `err <message>` yields the message as the error.
pub fn parse_reply(line: &str) -> Result<Option<Value>, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (status, rest) = match line.split_once(' ') {
        Some((status, rest)) => (status, Some(rest)),
        None => (line, None),
    };
    match (status, rest) {
        ("ok", None) => Ok(None),
        ("ok", Some(payload)) => Ok(Some(Value::parse_lossy(payload))),
        ("err", message) => Err(message.unwrap_or("engine reported an error").to_string()),
        _ => Err(format!("unexpected reply `{line}`")),
    }
}

/// Render a value as a literal of the engine's command language
fn literal(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}

/// Engine backed by a child process
pub struct ProcessEngine {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    closed: bool,
}

impl ProcessEngine {
    pub fn spawn(command: &ExternalCommand) -> Result<Self, EngineError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            EngineError::Unavailable(format!(
                "failed to start {}: {e}",
                command.program.display()
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Unavailable("child stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Unavailable("child stdout not captured".to_string()))?;

        tracing::debug!(program = %command.program.display(), pid = child.id(), "external engine started");

        Ok(Self {
            child,
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            closed: false,
        })
    }

    /// Send one request and wait for its reply line
    fn request(&mut self, line: &str) -> Result<Option<Value>, String> {
        writeln!(self.stdin, "{line}").map_err(|e| format!("write failed: {e}"))?;
        self.stdin
            .flush()
            .map_err(|e| format!("write failed: {e}"))?;

        let mut reply = String::new();
        let n = self
            .stdout
            .read_line(&mut reply)
            .map_err(|e| format!("read failed: {e}"))?;
        if n == 0 {
            return Err("engine closed its output".to_string());
        }
        parse_reply(&reply)
    }
}

impl Engine for ProcessEngine {
    fn configure(&mut self, name: &str, value: &Value) -> Result<(), EngineError> {
        self.request(&format!("set {name} {}", literal(value)))
            .map(|_| ())
            .map_err(|reason| EngineError::configuration(name, reason))
    }

    fn setup(&mut self) -> Result<(), EngineError> {
        self.request("setup").map(|_| ()).map_err(EngineError::Setup)
    }

    fn step(&mut self) -> Result<(), EngineError> {
        self.request("go").map(|_| ()).map_err(EngineError::Step)
    }

    fn query(&mut self, expression: &str) -> Result<Value, EngineError> {
        match self.request(&format!("report {expression}")) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(EngineError::query(expression, "empty reply")),
            Err(reason) => Err(EngineError::query(expression, reason)),
        }
    }

    fn close(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // The child may already be gone; quitting is best effort
        let _ = writeln!(self.stdin, "quit").and_then(|_| self.stdin.flush());
        self.child
            .wait()
            .map(|status| tracing::debug!(%status, "external engine exited"))
            .map_err(|e| EngineError::Unavailable(format!("wait failed: {e}")))
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
