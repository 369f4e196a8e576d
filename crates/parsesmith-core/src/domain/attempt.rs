//! Attempt records: one generate → sanitize → execute → validate cycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dataset::Dataset;
use super::verdict::MismatchReport;
use crate::generation::GenerationError;
use crate::sanitize::SanitizationError;

/// Where inside the executor a fault was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultStage {
    /// Loading the script (import, syntax, missing entry point).
    Load,
    /// Calling the entry point or reading back its result.
    Invoke,
}

impl fmt::Display for FaultStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultStage::Load => write!(f, "load"),
            FaultStage::Invoke => write!(f, "invoke"),
        }
    }
}

/// A fault captured while loading or invoking a candidate script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFault {
    pub stage: FaultStage,
    pub message: String,
    /// Interpreter traceback or captured stderr, when available.
    pub detail: Option<String>,
}

impl ExecutionFault {
    pub fn new(stage: FaultStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if !detail.trim().is_empty() {
            self.detail = Some(detail);
        }
        self
    }
}

impl fmt::Display for ExecutionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.message)
    }
}

/// What the executor hands back: a dataset or a fault, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ExecutionResult {
    Produced { dataset: Dataset },
    Fault { fault: ExecutionFault },
}

impl ExecutionResult {
    pub fn produced(dataset: Dataset) -> Self {
        ExecutionResult::Produced { dataset }
    }

    pub fn fault(fault: ExecutionFault) -> Self {
        ExecutionResult::Fault { fault }
    }
}

/// Why an attempt did not pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptFailure {
    Generation { error: GenerationError },
    Sanitization { error: SanitizationError },
    Execution { fault: ExecutionFault },
    Mismatch { report: MismatchReport },
}

impl AttemptFailure {
    /// One-line summary for the exhausted-run listing.
    pub fn summary(&self) -> String {
        match self {
            AttemptFailure::Generation { error } => format!("generation error: {error}"),
            AttemptFailure::Sanitization { error } => format!("sanitization error: {error}"),
            AttemptFailure::Execution { fault } => format!("execution fault: {fault}"),
            AttemptFailure::Mismatch { report } => {
                format!("validation mismatch: {}", report.summary())
            }
        }
    }

    /// Diagnostic text carried into the next attempt's prompt.
    pub fn feedback(&self) -> String {
        match self {
            AttemptFailure::Generation { error } => {
                format!("The previous request to the code generator failed: {error}")
            }
            AttemptFailure::Sanitization { error } => {
                format!("The previous response could not be used as a script: {error}")
            }
            AttemptFailure::Execution { fault } => match &fault.detail {
                Some(detail) => format!(
                    "The script raised an error during {}: {}\n\n{}",
                    fault.stage, fault.message, detail
                ),
                None => format!(
                    "The script raised an error during {}: {}",
                    fault.stage, fault.message
                ),
            },
            AttemptFailure::Mismatch { report } => report.render(),
        }
    }
}

/// Terminal result of a single attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Passed,
    Failed { failure: AttemptFailure },
}

/// Immutable log entry for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based ordinal.
    pub index: u32,
    pub prompt: String,
    pub raw_output: Option<String>,
    pub source: Option<String>,
    /// Generation calls re-issued for this index after transient errors.
    pub transient_retries: u32,
    pub outcome: AttemptOutcome,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl AttemptRecord {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Passed)
    }

    pub fn failure(&self) -> Option<&AttemptFailure> {
        match &self.outcome {
            AttemptOutcome::Passed => None,
            AttemptOutcome::Failed { failure } => Some(failure),
        }
    }
}
