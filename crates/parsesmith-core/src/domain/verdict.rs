//! Validation verdicts and structured mismatch descriptions.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Row count difference between reference and produced data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCountDelta {
    pub expected: usize,
    pub actual: usize,
}

impl RowCountDelta {
    /// `actual - expected`.
    pub fn delta(&self) -> i64 {
        self.actual as i64 - self.expected as i64
    }
}

/// One differing cell, addressed by zero-based row and column name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDiff {
    pub row: usize,
    pub column: String,
    pub expected: String,
    pub actual: String,
}

/// Every mismatch category found when comparing a produced dataset to the
/// reference. Cell differences are capped; `total_cell_diffs` keeps the
/// uncapped count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MismatchReport {
    pub missing_columns: Vec<String>,
    pub extra_columns: Vec<String>,
    pub row_count: Option<RowCountDelta>,
    pub cell_diffs: Vec<CellDiff>,
    pub total_cell_diffs: usize,
}

impl MismatchReport {
    pub fn is_empty(&self) -> bool {
        self.missing_columns.is_empty()
            && self.extra_columns.is_empty()
            && self.row_count.is_none()
            && self.total_cell_diffs == 0
    }

    /// One-line summary for logs and the exhausted-run listing.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.missing_columns.is_empty() {
            parts.push(format!("missing columns [{}]", self.missing_columns.join(", ")));
        }
        if !self.extra_columns.is_empty() {
            parts.push(format!("unexpected columns [{}]", self.extra_columns.join(", ")));
        }
        if let Some(rc) = &self.row_count {
            parts.push(format!("expected {} rows, got {}", rc.expected, rc.actual));
        }
        if self.total_cell_diffs > 0 {
            parts.push(format!("{} differing cell(s)", self.total_cell_diffs));
        }
        parts.join("; ")
    }

    /// Multi-line description fed back into the next prompt.
    pub fn render(&self) -> String {
        let mut out = String::from("The parser output does not match the expected dataset.\n");
        if !self.missing_columns.is_empty() {
            let _ = writeln!(out, "- Missing columns: {}", quote_all(&self.missing_columns));
        }
        if !self.extra_columns.is_empty() {
            let _ = writeln!(out, "- Unexpected columns: {}", quote_all(&self.extra_columns));
        }
        if let Some(rc) = &self.row_count {
            let _ = writeln!(
                out,
                "- Row count: expected {}, got {} (delta {:+})",
                rc.expected,
                rc.actual,
                rc.delta()
            );
        }
        if self.total_cell_diffs > 0 {
            let _ = writeln!(
                out,
                "- {} differing cell(s); first {}:",
                self.total_cell_diffs,
                self.cell_diffs.len()
            );
            for diff in &self.cell_diffs {
                let _ = writeln!(
                    out,
                    "  - row {}, column '{}': expected '{}', got '{}'",
                    diff.row, diff.column, diff.expected, diff.actual
                );
            }
        }
        out
    }
}

fn quote_all(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Outcome of comparing produced data against the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ValidationVerdict {
    Pass,
    Fail { mismatch: MismatchReport },
}

impl ValidationVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, ValidationVerdict::Pass)
    }

    pub fn mismatch(&self) -> Option<&MismatchReport> {
        match self {
            ValidationVerdict::Pass => None,
            ValidationVerdict::Fail { mismatch } => Some(mismatch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> MismatchReport {
        MismatchReport {
            missing_columns: vec!["amount".into()],
            extra_columns: vec![],
            row_count: Some(RowCountDelta {
                expected: 10,
                actual: 8,
            }),
            cell_diffs: vec![CellDiff {
                row: 0,
                column: "date".into(),
                expected: "2024-01-01".into(),
                actual: "01/01/2024x".into(),
            }],
            total_cell_diffs: 3,
        }
    }

    #[test]
    fn empty_report_is_empty() {
        assert!(MismatchReport::default().is_empty());
        assert!(!report().is_empty());
    }

    #[test]
    fn summary_lists_each_category() {
        let s = report().summary();
        assert_eq!(s, "missing columns [amount]; expected 10 rows, got 8; 3 differing cell(s)");
    }

    #[test]
    fn render_includes_signed_delta_and_cells() {
        let text = report().render();
        assert!(text.contains("Missing columns: 'amount'"));
        assert!(text.contains("(delta -2)"));
        assert!(text.contains("3 differing cell(s); first 1:"));
        assert!(text.contains("row 0, column 'date': expected '2024-01-01', got '01/01/2024x'"));
    }

    #[test]
    fn verdict_accessors() {
        assert!(ValidationVerdict::Pass.is_pass());
        let fail = ValidationVerdict::Fail {
            mismatch: report(),
        };
        assert!(!fail.is_pass());
        assert_eq!(fail.mismatch().unwrap().missing_columns, vec!["amount"]);
    }
}
