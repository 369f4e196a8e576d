//! Compare a produced dataset against the reference.
//!
//! Every mismatch category is collected in one pass. Cells are compared after
//! normalization: whitespace collapsed, null-like tokens mapped to empty,
//! numbers compared with a tolerance and dates reduced to `YYYY-MM-DD`.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::{Cell, CellDiff, Dataset, MismatchReport, RowCountDelta, ValidationVerdict};

/// Equivalence settings for [`validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
    /// Maximum number of differing cells kept in the report.
    pub max_cell_diffs: usize,
    /// Columns where numeric zero and an empty cell are the same value,
    /// matched case-insensitively. Debit/credit statements leave one of the
    /// pair blank on every row.
    pub zero_empty_columns: Vec<String>,
}

impl ValidationConfig {
    fn zero_is_empty(&self, column: &str) -> bool {
        self.zero_empty_columns
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case(column.trim()))
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            relative_tolerance: 1e-5,
            absolute_tolerance: 1e-9,
            max_cell_diffs: 5,
            zero_empty_columns: vec!["Withdrawal".to_string(), "Deposit".to_string()],
        }
    }
}

const NULL_TOKENS: [&str; 6] = ["", "nan", "none", "null", "nat", "<na>"];

const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d-%b-%Y",
];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq)]
enum Normalized {
    Empty,
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

fn normalize(cell: &Cell, zero_is_empty: bool) -> Normalized {
    let value = match cell {
        Cell::Empty => Normalized::Empty,
        Cell::Number(n) if n.is_nan() => Normalized::Empty,
        Cell::Number(n) => Normalized::Number(*n),
        Cell::Text(raw) => normalize_text(raw),
    };
    match value {
        Normalized::Number(n) if zero_is_empty && n == 0.0 => Normalized::Empty,
        other => other,
    }
}

fn normalize_text(raw: &str) -> Normalized {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if NULL_TOKENS.contains(&collapsed.to_ascii_lowercase().as_str()) {
        return Normalized::Empty;
    }
    if let Some(n) = parse_number(&collapsed) {
        return Normalized::Number(n);
    }
    if let Some(d) = parse_date(&collapsed) {
        return Normalized::Date(d);
    }
    Normalized::Text(collapsed)
}

fn parse_number(text: &str) -> Option<f64> {
    let stripped = text.replace(',', "");
    let first = stripped.chars().next()?;
    if !(first.is_ascii_digit() || matches!(first, '-' | '+' | '.')) {
        return None;
    }
    stripped.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
                .map(|dt| dt.date())
        })
}

fn equivalent(a: &Normalized, b: &Normalized, cfg: &ValidationConfig) -> bool {
    match (a, b) {
        (Normalized::Number(x), Normalized::Number(y)) => {
            let scale = x.abs().max(y.abs());
            (x - y).abs() <= cfg.absolute_tolerance + cfg.relative_tolerance * scale
        }
        _ => a == b,
    }
}

/// Check `produced` against `reference`.
///
/// Columns are matched by name regardless of order. Cells are compared over
/// the shared columns, in reference column order, for the rows both sides
/// have.
pub fn validate(produced: &Dataset, reference: &Dataset, cfg: &ValidationConfig) -> ValidationVerdict {
    let produced_cols: HashSet<&str> = produced.columns().iter().map(String::as_str).collect();
    let reference_cols: HashSet<&str> = reference.columns().iter().map(String::as_str).collect();

    let mut report = MismatchReport {
        missing_columns: reference
            .columns()
            .iter()
            .filter(|c| !produced_cols.contains(c.as_str()))
            .cloned()
            .collect(),
        extra_columns: produced
            .columns()
            .iter()
            .filter(|c| !reference_cols.contains(c.as_str()))
            .cloned()
            .collect(),
        ..Default::default()
    };

    if produced.row_count() != reference.row_count() {
        report.row_count = Some(RowCountDelta {
            expected: reference.row_count(),
            actual: produced.row_count(),
        });
    }

    let shared: Vec<(&str, usize, usize, bool)> = reference
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(ri, name)| {
            produced
                .column_index(name)
                .map(|pi| (name.as_str(), ri, pi, cfg.zero_is_empty(name)))
        })
        .collect();

    let rows = produced.row_count().min(reference.row_count());
    for row in 0..rows {
        let expected_row = &reference.rows()[row];
        let actual_row = &produced.rows()[row];
        for &(name, ri, pi, zero_is_empty) in &shared {
            let expected = &expected_row[ri];
            let actual = &actual_row[pi];
            let (e, a) = (normalize(expected, zero_is_empty), normalize(actual, zero_is_empty));
            if equivalent(&e, &a, cfg) {
                continue;
            }
            report.total_cell_diffs += 1;
            if report.cell_diffs.len() < cfg.max_cell_diffs {
                report.cell_diffs.push(CellDiff {
                    row,
                    column: name.to_string(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
    }

    if report.is_empty() {
        ValidationVerdict::Pass
    } else {
        ValidationVerdict::Fail { mismatch: report }
    }
}
