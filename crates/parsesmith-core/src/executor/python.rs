//! Python subprocess executor.
//!
//! Each call gets a fresh temporary directory holding the candidate script
//! and the harness, and a fresh interpreter process. Nothing survives between
//! attempts.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::ScriptExecutor;
use crate::domain::{Cell, Dataset, ExecutionFault, ExecutionResult, FaultStage};

const HARNESS_SOURCE: &str = include_str!("harness.py");
const HARNESS_FILE: &str = "parsesmith_harness.py";
const SCRIPT_FILE: &str = "candidate_parser.py";
const STDERR_TAIL_CHARS: usize = 4000;

/// Runs candidate scripts with a Python interpreter.
#[derive(Debug, Clone)]
pub struct PythonExecutor {
    python: String,
    timeout: Duration,
}

impl Default for PythonExecutor {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl PythonExecutor {
    pub fn new(python: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python: python.into(),
            timeout,
        }
    }

    pub fn python(&self) -> &str {
        &self.python
    }

    async fn run(&self, source: &str, document: &Path) -> Result<Dataset, ExecutionFault> {
        let load_fault = |msg: String| ExecutionFault::new(FaultStage::Load, msg);

        let document = tokio::fs::canonicalize(document).await.map_err(|e| {
            load_fault(format!("sample document {} is not accessible: {e}", document.display()))
        })?;

        let workdir = tempfile::Builder::new()
            .prefix("parsesmith-attempt-")
            .tempdir()
            .map_err(|e| load_fault(format!("cannot create scratch directory: {e}")))?;
        let script_path = workdir.path().join(SCRIPT_FILE);
        let harness_path = workdir.path().join(HARNESS_FILE);
        tokio::fs::write(&script_path, source)
            .await
            .map_err(|e| load_fault(format!("cannot write script: {e}")))?;
        tokio::fs::write(&harness_path, HARNESS_SOURCE)
            .await
            .map_err(|e| load_fault(format!("cannot write harness: {e}")))?;

        let start = Instant::now();
        let child = Command::new(&self.python)
            .arg("-B")
            .arg(&harness_path)
            .arg(&script_path)
            .arg(&document)
            .current_dir(workdir.path())
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| load_fault(format!("cannot start {}: {e}", self.python)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ExecutionFault::new(
                    FaultStage::Invoke,
                    format!("script timed out after {}s", self.timeout.as_secs()),
                )
            })?
            .map_err(|e| ExecutionFault::new(FaultStage::Invoke, format!("interpreter I/O error: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            exit_code = output.status.code().unwrap_or(-1),
            duration_ms = start.elapsed().as_millis() as u64,
            "harness finished"
        );

        let envelope: HarnessEnvelope = serde_json::from_str(stdout.trim()).map_err(|_| {
            ExecutionFault::new(
                FaultStage::Invoke,
                format!(
                    "interpreter exited with status {} without a result",
                    output.status.code().map_or("unknown".to_string(), |c| c.to_string())
                ),
            )
            .with_detail(tail(&stderr, STDERR_TAIL_CHARS))
        })?;

        envelope.into_dataset()
    }
}

#[async_trait]
impl ScriptExecutor for PythonExecutor {
    async fn execute(&self, source: &str, document: &Path) -> ExecutionResult {
        match self.run(source, document).await {
            Ok(dataset) => ExecutionResult::produced(dataset),
            Err(fault) => ExecutionResult::fault(fault),
        }
    }
}

/// Probe whether `python` can be started.
pub async fn python_available(python: &str) -> bool {
    Command::new(python)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct HarnessEnvelope {
    ok: bool,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
    stage: Option<FaultStage>,
    message: Option<String>,
    traceback: Option<String>,
}

impl HarnessEnvelope {
    fn into_dataset(self) -> Result<Dataset, ExecutionFault> {
        if !self.ok {
            let fault = ExecutionFault::new(
                self.stage.unwrap_or(FaultStage::Invoke),
                self.message.unwrap_or_else(|| "unknown error".to_string()),
            );
            return Err(match self.traceback {
                Some(tb) => fault.with_detail(tb),
                None => fault,
            });
        }

        let rows = self
            .rows
            .iter()
            .map(|r| r.iter().map(Cell::from_json).collect())
            .collect();
        Dataset::new(self.columns, rows).map_err(|e| {
            ExecutionFault::new(FaultStage::Invoke, format!("parse() returned an invalid table: {e}"))
        })
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}
