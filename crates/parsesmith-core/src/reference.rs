//! Reference dataset loading.
//!
//! The expected output for a target is a comma-separated file whose header
//! row names the columns. Every later record becomes a row of text cells;
//! empty fields become [`Cell::Empty`].

use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::{Cell, Dataset, DatasetError, ReferenceDataset};

/// Errors raised while loading a reference CSV.
#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {origin}: {message}")]
    Csv { origin: String, message: String },

    #[error("{origin} has no header row")]
    NoHeader { origin: String },

    #[error("invalid table in {origin}: {source}")]
    Shape {
        origin: String,
        #[source]
        source: DatasetError,
    },
}

/// Load the reference dataset from `path`.
pub fn load_reference(path: &Path) -> Result<ReferenceDataset, ReferenceError> {
    let file = std::fs::File::open(path).map_err(|source| ReferenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let dataset = parse_reference(file, &path.display().to_string())?;
    debug!(
        path = %path.display(),
        columns = dataset.columns().len(),
        rows = dataset.row_count(),
        "reference dataset loaded"
    );
    Ok(dataset)
}

/// Parse reference CSV from any reader. `origin` names the source in errors.
pub fn parse_reference<R: Read>(input: R, origin: &str) -> Result<ReferenceDataset, ReferenceError> {
    let csv_err = |e: csv::Error| ReferenceError::Csv {
        origin: origin.to_string(),
        message: e.to_string(),
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(input);

    let headers = reader.headers().map_err(csv_err)?.clone();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(ReferenceError::NoHeader {
            origin: origin.to_string(),
        });
    }
    let columns: Vec<String> = headers.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        rows.push(record.iter().map(Cell::from_text).collect());
    }

    Dataset::new(columns, rows).map_err(|source| ReferenceError::Shape {
        origin: origin.to_string(),
        source,
    })
}
