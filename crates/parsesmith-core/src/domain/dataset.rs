//! Tabular datasets: the reference CSV and the candidate parser's output.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single table cell.
///
/// Reference data loaded from CSV only ever produces `Empty` and `Text`;
/// values coming back from an executed script keep their JSON number type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Build a cell from raw CSV text. Empty fields become [`Cell::Empty`].
    pub fn from_text(raw: &str) -> Self {
        if raw.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(raw.to_string())
        }
    }

    /// Build a cell from a JSON value emitted by the execution harness.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Cell::Empty,
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => Cell::Number(f),
                None => Cell::Text(n.to_string()),
            },
            serde_json::Value::String(s) if s.is_empty() => Cell::Empty,
            serde_json::Value::String(s) => Cell::Text(s.clone()),
            serde_json::Value::Bool(b) => Cell::Text(if *b { "True" } else { "False" }.to_string()),
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Number(n) => write!(f, "{n}"),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

/// Shape errors raised while building a [`Dataset`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatasetError {
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("empty column name at position {0}")]
    EmptyColumn(usize),

    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Ordered rows over a fixed, uniquely named column set.
///
/// Column names are trimmed on construction. Every row has exactly one cell
/// per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

/// The expected dataset for a target. Loaded once per run, never mutated.
pub type ReferenceDataset = Dataset;

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, DatasetError> {
        let columns: Vec<String> = columns.into_iter().map(|c| c.trim().to_string()).collect();

        let mut seen = HashSet::new();
        for (pos, column) in columns.iter().enumerate() {
            if column.is_empty() {
                return Err(DatasetError::EmptyColumn(pos));
            }
            if !seen.insert(column.as_str()) {
                return Err(DatasetError::DuplicateColumn(column.clone()));
            }
        }

        for (row, cells) in rows.iter().enumerate() {
            if cells.len() != columns.len() {
                return Err(DatasetError::RaggedRow {
                    row,
                    expected: columns.len(),
                    found: cells.len(),
                });
            }
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `row` in the named column.
    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let col = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[col])
    }

    /// The first `n` rows (fewer if the dataset is shorter).
    pub fn sample_rows(&self, n: usize) -> &[Vec<Cell>] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// Dataset with `column` removed. Returns `self` unchanged if absent.
    pub fn without_column(&self, column: &str) -> Dataset {
        let Some(idx) = self.column_index(column) else {
            return self.clone();
        };
        let mut columns = self.columns.clone();
        columns.remove(idx);
        let rows = self
            .rows
            .iter()
            .map(|r| {
                let mut r = r.clone();
                r.remove(idx);
                r
            })
            .collect();
        Dataset { columns, rows }
    }

    /// Render the header plus the first `limit` rows as CSV text.
    pub fn render_csv(&self, limit: usize) -> String {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        // Writes into a Vec cannot fail at the io level; a csv error here
        // would only come from inconsistent field counts, which `new` rules out.
        let _ = writer.write_record(&self.columns);
        for row in self.sample_rows(limit) {
            let _ = writer.write_record(row.iter().map(|c| c.to_string()));
        }
        let bytes = writer.into_inner().unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
