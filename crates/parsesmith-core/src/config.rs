//! Run configuration, input layout and the API credential.
//!
//! Everything here is a plain value handed to the pipeline. Reading the
//! environment is the binary's job.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::{RunPolicy, TransientPolicy};
use crate::domain::{SetupFault, Target};
use crate::executor::PythonExecutor;
use crate::generation::GeminiConfig;

/// Name of the environment variable holding the API key.
pub const CREDENTIAL_VAR: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("invalid target name '{name}': {reason}")]
    InvalidTarget { name: String, reason: &'static str },
}

/// Settings for one synthesis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub target: String,
    pub max_attempts: u32,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub python: String,
    pub model: String,
    pub api_base: String,
    pub request_timeout_secs: u64,
    pub exec_timeout_secs: u64,
    pub transient_consumes_budget: bool,
}

impl Default for SynthConfig {
    fn default() -> Self {
        let gemini = GeminiConfig::default();
        Self {
            target: String::new(),
            max_attempts: 3,
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("custom_parsers"),
            python: "python3".to_string(),
            model: gemini.model,
            api_base: gemini.api_base,
            request_timeout_secs: gemini.timeout_secs,
            exec_timeout_secs: 120,
            transient_consumes_budget: false,
        }
    }
}

impl SynthConfig {
    pub fn for_target(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        validate_target_name(&self.target)
    }

    pub fn layout(&self) -> TargetLayout {
        TargetLayout::new(&self.data_dir, &self.target)
    }

    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            api_base: self.api_base.clone(),
            model: self.model.clone(),
            timeout_secs: self.request_timeout_secs,
            ..GeminiConfig::default()
        }
    }

    pub fn executor(&self) -> PythonExecutor {
        PythonExecutor::new(&self.python, Duration::from_secs(self.exec_timeout_secs))
    }

    pub fn run_policy(&self) -> RunPolicy {
        RunPolicy {
            max_attempts: self.max_attempts,
            transient: TransientPolicy {
                consume_budget: self.transient_consumes_budget,
                ..TransientPolicy::default()
            },
        }
    }
}

fn validate_target_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidTarget {
        name: name.to_string(),
        reason,
    };
    if name.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(invalid("must not be a path"));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("must not contain whitespace"));
    }
    Ok(())
}

/// On-disk input layout: `<data_dir>/<target>/<target>_sample.pdf` and
/// `<data_dir>/<target>/<target>_expected.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLayout {
    dir: PathBuf,
    name: String,
}

impl TargetLayout {
    pub fn new(data_dir: &Path, target: &str) -> Self {
        Self {
            dir: data_dir.join(target),
            name: target.to_string(),
        }
    }

    pub fn pdf_sample(&self) -> PathBuf {
        self.dir.join(format!("{}_sample.pdf", self.name))
    }

    pub fn text_sample(&self) -> PathBuf {
        self.dir.join(format!("{}_sample.txt", self.name))
    }

    pub fn reference(&self) -> PathBuf {
        self.dir.join(format!("{}_expected.csv", self.name))
    }

    /// Check that the input pair exists. The PDF sample is preferred; a
    /// `.txt` sample is used only when no PDF is present.
    pub fn resolve(&self) -> Result<Target, SetupFault> {
        let pdf = self.pdf_sample();
        let document = if pdf.is_file() {
            pdf
        } else {
            let txt = self.text_sample();
            if !txt.is_file() {
                return Err(SetupFault::MissingInput { path: pdf });
            }
            txt
        };

        let reference = self.reference();
        if !reference.is_file() {
            return Err(SetupFault::MissingInput { path: reference });
        }
        Ok(Target::new(&self.name, document, reference))
    }
}

/// The generation API key. `Debug` never shows the value.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Build from an optional environment value; unset or blank is a setup fault.
    pub fn from_env_value(var: &str, value: Option<String>) -> Result<Self, SetupFault> {
        match value {
            Some(v) if !v.trim().is_empty() => Ok(Self(v.trim().to_string())),
            _ => Err(SetupFault::MissingCredential {
                var: var.to_string(),
            }),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}
