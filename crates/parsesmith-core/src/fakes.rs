//! Scripted in-memory collaborators for tests and dry runs.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{ExecutionFault, ExecutionResult, FaultStage};
use crate::executor::ScriptExecutor;
use crate::generation::{GenerationClient, GenerationError};

/// Returns queued completions in order and records every prompt it sees.
///
/// Once the queue is empty every call fails with a persistent error.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<String, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(prompt.to_string());
        self.responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::persistent("no scripted response left")))
    }
}

/// Returns queued execution results in order and records each source.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    results: Mutex<VecDeque<ExecutionResult>>,
    sources: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            sources: Mutex::new(Vec::new()),
        }
    }

    pub fn sources(&self) -> Vec<String> {
        self.sources
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl ScriptExecutor for ScriptedExecutor {
    async fn execute(&self, source: &str, _document: &Path) -> ExecutionResult {
        self.sources
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(source.to_string());
        self.results
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or_else(|| {
                ExecutionResult::fault(ExecutionFault::new(
                    FaultStage::Invoke,
                    "no scripted result left",
                ))
            })
    }
}
