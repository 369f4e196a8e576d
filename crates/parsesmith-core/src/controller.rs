//! The generate → sanitize → execute → validate loop.
//!
//! A run is an explicit state machine:
//!
//! ```text
//! Start → Attempting(1) → { Accepted, Attempting(i + 1), Exhausted }
//! ```
//!
//! Each attempt produces one immutable [`AttemptRecord`]. The only state that
//! crosses from attempt `i` to `i + 1` is the [`Feedback`] value. Transient
//! generation errors re-issue the same index under [`TransientPolicy`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, Instrument};

use crate::artifact::ArtifactStore;
use crate::context::{ContextAssembler, Feedback, PromptConfig};
use crate::document::DocumentReader;
use crate::domain::{
    AttemptFailure, AttemptOutcome, AttemptRecord, Dataset, ExecutionResult, RunError, SetupFault,
    Target, ValidationVerdict,
};
use crate::executor::ScriptExecutor;
use crate::generation::{GenerationClient, GenerationError};
use crate::metrics::METRICS;
use crate::obs;
use crate::reference::load_reference;
use crate::sanitize::Sanitizer;
use crate::validate::{validate, ValidationConfig};

/// How transient generation failures are treated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientPolicy {
    /// When true a transient error fails the attempt like any other error.
    pub consume_budget: bool,
    /// Re-issues allowed per attempt index before the error consumes it.
    pub max_retries_per_attempt: u32,
    /// Pause before each re-issue.
    pub backoff_ms: u64,
}

impl Default for TransientPolicy {
    fn default() -> Self {
        Self {
            consume_budget: false,
            max_retries_per_attempt: 1,
            backoff_ms: 1000,
        }
    }
}

/// Attempt budget for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub transient: TransientPolicy,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            transient: TransientPolicy::default(),
        }
    }
}

/// Inputs loaded once per target and shared read-only by every attempt.
#[derive(Debug, Clone)]
pub struct PreparedInputs {
    pub reference: Dataset,
    pub document_text: String,
}

/// Load the reference dataset and extract the document text.
pub async fn prepare_inputs(
    target: &Target,
    reader: &dyn DocumentReader,
) -> Result<PreparedInputs, SetupFault> {
    let reference = load_reference(target.reference())?;
    let document_text = reader.extract_text(target.document()).await?;
    debug!(
        target = %target.name(),
        columns = reference.columns().len(),
        rows = reference.row_count(),
        document_chars = document_text.chars().count(),
        "inputs prepared"
    );
    Ok(PreparedInputs {
        reference,
        document_text,
    })
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Accepted { artifact: PathBuf },
    Exhausted,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Accepted { .. } => "accepted",
            Outcome::Exhausted => "exhausted",
        }
    }
}

/// Everything that happened during one run, in attempt order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub target: String,
    pub outcome: Outcome,
    pub attempts: Vec<AttemptRecord>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, Outcome::Accepted { .. })
    }

    pub fn artifact(&self) -> Option<&Path> {
        match &self.outcome {
            Outcome::Accepted { artifact } => Some(artifact),
            Outcome::Exhausted => None,
        }
    }

    /// One line per failed attempt, e.g. `attempt 2: execution fault: ...`.
    pub fn failure_summaries(&self) -> Vec<String> {
        self.attempts
            .iter()
            .filter_map(|a| a.failure().map(|f| format!("attempt {}: {}", a.index, f.summary())))
            .collect()
    }

    pub fn last_failure(&self) -> Option<&AttemptFailure> {
        self.attempts.iter().rev().find_map(|a| a.failure())
    }
}

#[derive(Debug)]
enum RunState {
    Start,
    Attempting {
        index: u32,
        feedback: Option<Feedback>,
    },
    Accepted {
        artifact: PathBuf,
    },
    Exhausted,
}

/// Drives attempts for one target until it is accepted or the budget runs out.
pub struct Controller {
    client: Arc<dyn GenerationClient>,
    executor: Arc<dyn ScriptExecutor>,
    artifacts: ArtifactStore,
    policy: RunPolicy,
    sanitizer: Sanitizer,
    assembler: ContextAssembler,
    validation: ValidationConfig,
}

impl Controller {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        executor: Arc<dyn ScriptExecutor>,
        artifacts: ArtifactStore,
        policy: RunPolicy,
    ) -> Self {
        Self {
            client,
            executor,
            artifacts,
            policy,
            sanitizer: Sanitizer::new(),
            assembler: ContextAssembler::default(),
            validation: ValidationConfig::default(),
        }
    }

    pub fn with_prompt_config(mut self, config: PromptConfig) -> Self {
        self.assembler = ContextAssembler::new(config);
        self
    }

    pub fn with_validation(mut self, config: ValidationConfig) -> Self {
        self.validation = config;
        self
    }

    pub fn policy(&self) -> &RunPolicy {
        &self.policy
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Run the loop to a terminal state.
    ///
    /// Attempt failures never surface as errors; only a failure to persist
    /// the accepted artifact does.
    pub async fn run(&self, target: &Target, inputs: &PreparedInputs) -> Result<RunReport, RunError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id, target.name());
        self.run_inner(run_id, target, inputs).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: String,
        target: &Target,
        inputs: &PreparedInputs,
    ) -> Result<RunReport, RunError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        obs::emit_run_started(&run_id, target.name(), max_attempts);

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut state = RunState::Start;
        let outcome = loop {
            state = match state {
                RunState::Start => RunState::Attempting {
                    index: 1,
                    feedback: None,
                },
                RunState::Attempting { index, feedback } => {
                    let record = self.attempt(target, inputs, index, feedback.as_ref()).await;
                    let next = self.transition(target, &record, max_attempts)?;
                    attempts.push(record);
                    next
                }
                RunState::Accepted { artifact } => break Outcome::Accepted { artifact },
                RunState::Exhausted => break Outcome::Exhausted,
            };
        };

        let duration_ms = clock.elapsed().as_millis() as u64;
        obs::emit_run_finished(&run_id, outcome.label(), attempts.len(), duration_ms);
        METRICS.flush();

        Ok(RunReport {
            run_id,
            target: target.name().to_string(),
            outcome,
            attempts,
            started_at,
            duration_ms,
        })
    }

    /// Decide the next state from a finished attempt. Persisting the artifact
    /// happens here and only here.
    fn transition(
        &self,
        target: &Target,
        record: &AttemptRecord,
        max_attempts: u32,
    ) -> Result<RunState, RunError> {
        if let (AttemptOutcome::Passed, Some(source)) = (&record.outcome, record.source.as_deref()) {
            let artifact = self.artifacts.persist(target.name(), source)?;
            METRICS.inc_artifacts_written();
            obs::emit_artifact_persisted(record.index, &artifact);
            return Ok(RunState::Accepted { artifact });
        }

        METRICS.inc_attempts_failed();
        if record.index >= max_attempts {
            return Ok(RunState::Exhausted);
        }
        Ok(RunState::Attempting {
            index: record.index + 1,
            feedback: Some(Feedback {
                attempt: record.index,
                previous_source: record.source.clone(),
                diagnostic: record.failure().map(AttemptFailure::feedback).unwrap_or_default(),
            }),
        })
    }

    async fn attempt(
        &self,
        target: &Target,
        inputs: &PreparedInputs,
        index: u32,
        feedback: Option<&Feedback>,
    ) -> AttemptRecord {
        let started_at = Utc::now();
        let clock = Instant::now();
        METRICS.inc_attempts_started();

        let prompt = self.assembler.assemble(
            target,
            &inputs.document_text,
            &inputs.reference,
            index,
            feedback,
        );

        let (generated, transient_retries) = self.generate(index, &prompt).await;

        let mut record = AttemptRecord {
            index,
            prompt,
            raw_output: None,
            source: None,
            transient_retries,
            outcome: AttemptOutcome::Passed,
            started_at,
            duration_ms: 0,
        };

        let failure = match generated {
            Err(error) => Some(AttemptFailure::Generation { error }),
            Ok(raw) => {
                let sanitized = self.sanitizer.sanitize(&raw);
                record.raw_output = Some(raw);
                match sanitized {
                    Err(error) => Some(AttemptFailure::Sanitization { error }),
                    Ok(source) => {
                        let result = self.executor.execute(&source, target.document()).await;
                        record.source = Some(source);
                        self.check(result, &inputs.reference)
                    }
                }
            }
        };

        if let Some(failure) = failure {
            obs::emit_attempt_failed(index, failure_kind(&failure), &failure.summary());
            record.outcome = AttemptOutcome::Failed { failure };
        }
        record.duration_ms = clock.elapsed().as_millis() as u64;
        record
    }

    /// Call the client, re-issuing transient failures without consuming the
    /// attempt while the policy allows it. Returns the result and the number
    /// of re-issues spent.
    async fn generate(&self, index: u32, prompt: &str) -> (Result<String, GenerationError>, u32) {
        let policy = &self.policy.transient;
        let mut retries = 0;
        loop {
            obs::emit_attempt_started(index, retries);
            match self.client.complete(prompt).await {
                Ok(text) => return (Ok(text), retries),
                Err(err)
                    if err.is_transient()
                        && !policy.consume_budget
                        && retries < policy.max_retries_per_attempt =>
                {
                    retries += 1;
                    METRICS.inc_transient_retries();
                    obs::emit_transient_retry(index, retries, &err);
                    if policy.backoff_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(policy.backoff_ms)).await;
                    }
                }
                Err(err) => return (Err(err), retries),
            }
        }
    }

    fn check(&self, result: ExecutionResult, reference: &Dataset) -> Option<AttemptFailure> {
        match result {
            ExecutionResult::Fault { fault } => Some(AttemptFailure::Execution { fault }),
            ExecutionResult::Produced { dataset } => {
                match validate(&dataset, reference, &self.validation) {
                    ValidationVerdict::Pass => None,
                    ValidationVerdict::Fail { mismatch } => {
                        Some(AttemptFailure::Mismatch { report: mismatch })
                    }
                }
            }
        }
    }
}

fn failure_kind(failure: &AttemptFailure) -> &'static str {
    match failure {
        AttemptFailure::Generation { .. } => "generation",
        AttemptFailure::Sanitization { .. } => "sanitization",
        AttemptFailure::Execution { .. } => "execution",
        AttemptFailure::Mismatch { .. } => "mismatch",
    }
}
