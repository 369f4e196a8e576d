//! Run-level error taxonomy.
//!
//! Per-attempt problems (generation, sanitization, execution, validation)
//! never surface here: the controller folds them into the next prompt. Only
//! setup faults and fatal I/O while persisting the artifact abort a run.

use std::path::PathBuf;

use crate::artifact::ArtifactError;
use crate::config::ConfigError;
use crate::document::DocumentError;
use crate::generation::GenerationError;
use crate::reference::ReferenceError;

/// Fatal problems detected before the first attempt.
#[derive(Debug, thiserror::Error)]
pub enum SetupFault {
    #[error("credential {var} is not set")]
    MissingCredential { var: String },

    #[error("missing input file: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("python interpreter '{python}' is not available")]
    InterpreterUnavailable { python: String },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("reference dataset: {0}")]
    Reference(#[from] ReferenceError),

    #[error("sample document: {0}")]
    Document(#[from] DocumentError),

    #[error("generation client: {0}")]
    Client(#[from] GenerationError),
}

/// Fatal problems while a run is in progress.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to persist artifact: {0}")]
    Artifact(#[from] ArtifactError),
}
