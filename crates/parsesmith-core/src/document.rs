//! Sample document text extraction.
//!
//! PDF text is pulled with poppler's `pdftotext`; plain-text samples are read
//! as-is. The extracted text only feeds the prompt, so fidelity matters less
//! than availability.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Errors raised while extracting document text.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed on {}: {message}", path.display())]
    ToolFailed {
        tool: String,
        path: PathBuf,
        message: String,
    },

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },
}

/// Extracts human-readable text from a sample document.
#[async_trait]
pub trait DocumentReader: Send + Sync {
    async fn extract_text(&self, path: &Path) -> Result<String, DocumentError>;
}

/// Reads UTF-8 text files (lossy on invalid bytes).
#[derive(Debug, Default, Clone)]
pub struct PlainTextReader;

#[async_trait]
impl DocumentReader for PlainTextReader {
    async fn extract_text(&self, path: &Path) -> Result<String, DocumentError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| DocumentError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Shells out to `pdftotext -layout <file> -`.
#[derive(Debug, Clone)]
pub struct PdfToTextReader {
    binary: String,
    timeout: Duration,
}

impl Default for PdfToTextReader {
    fn default() -> Self {
        Self {
            binary: "pdftotext".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl PdfToTextReader {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DocumentReader for PdfToTextReader {
    async fn extract_text(&self, path: &Path) -> Result<String, DocumentError> {
        let child = Command::new(&self.binary)
            .arg("-layout")
            .arg(path)
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DocumentError::ToolFailed {
                tool: self.binary.clone(),
                path: path.to_path_buf(),
                message: format!("could not start: {e}"),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| DocumentError::Timeout {
                tool: self.binary.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| DocumentError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if !output.status.success() {
            return Err(DocumentError::ToolFailed {
                tool: self.binary.clone(),
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(path = %path.display(), chars = text.len(), "document text extracted");
        Ok(text)
    }
}

/// Pick a reader by file extension: `.pdf` → [`PdfToTextReader`], anything
/// else → [`PlainTextReader`].
pub fn reader_for(path: &Path) -> Box<dyn DocumentReader> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if is_pdf {
        Box::new(PdfToTextReader::default())
    } else {
        Box::new(PlainTextReader)
    }
}
