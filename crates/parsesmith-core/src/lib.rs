//! ParseSmith core library
//!
//! Synthesizes a statement parser by prompting a generative model, running the
//! candidate script against a sample document and checking its output against
//! a reference CSV, retrying with feedback until it passes or the attempt
//! budget is spent.

pub mod artifact;
pub mod config;
pub mod context;
pub mod controller;
pub mod document;
pub mod domain;
pub mod executor;
pub mod fakes;
pub mod generation;
pub mod metrics;
pub mod obs;
pub mod reference;
pub mod sanitize;
pub mod telemetry;
pub mod validate;

pub use artifact::{read_run_report, write_run_report, ArtifactError, ArtifactStore};
pub use config::{ConfigError, Credential, SynthConfig, TargetLayout, CREDENTIAL_VAR};
pub use context::{ContextAssembler, Feedback, PromptConfig};
pub use controller::{
    prepare_inputs, Controller, Outcome, PreparedInputs, RunPolicy, RunReport, TransientPolicy,
};
pub use document::{reader_for, DocumentError, DocumentReader, PdfToTextReader, PlainTextReader};
pub use domain::{
    AttemptFailure, AttemptOutcome, AttemptRecord, Cell, Dataset, ExecutionFault, ExecutionResult,
    FaultStage, MismatchReport, ReferenceDataset, RunError, SetupFault, Target, ValidationVerdict,
};
pub use executor::{python_available, PythonExecutor, ScriptExecutor, ENTRY_POINT};
pub use generation::{ErrorKind, GeminiClient, GeminiConfig, GenerationClient, GenerationError};
pub use reference::{load_reference, parse_reference, ReferenceError};
pub use sanitize::{SanitizationError, Sanitizer};
pub use telemetry::init_tracing;
pub use validate::{validate, ValidationConfig};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
