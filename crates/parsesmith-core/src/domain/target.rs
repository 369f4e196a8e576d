//! The synthesis target: one named document/reference pair.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Identifies one synthesis task. Immutable for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    name: String,
    document: PathBuf,
    reference: PathBuf,
}

impl Target {
    pub fn new(
        name: impl Into<String>,
        document: impl Into<PathBuf>,
        reference: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            document: document.into(),
            reference: reference.into(),
        }
    }

    /// Target name, e.g. `icici`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sample document the generated parser is run against.
    pub fn document(&self) -> &Path {
        &self.document
    }

    /// Reference CSV holding the expected output.
    pub fn reference(&self) -> &Path {
        &self.reference
    }
}
