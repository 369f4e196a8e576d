//! Candidate script execution.
//!
//! An executor loads sanitized source as an isolated unit, calls its
//! [`ENTRY_POINT`] with the sample document and returns an
//! [`ExecutionResult`]. Faults are captured, never propagated: the caller
//! always gets a value back.

pub mod python;

use std::path::Path;

use async_trait::async_trait;

use crate::domain::ExecutionResult;

pub use python::{python_available, PythonExecutor};

/// Name of the function every generated script must define.
pub const ENTRY_POINT: &str = "parse";

/// Loads a script and invokes its entry point against a document.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn execute(&self, source: &str, document: &Path) -> ExecutionResult;
}
