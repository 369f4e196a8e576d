//! Prompt assembly.
//!
//! The assembled prompt is a pure function of its inputs so a failing
//! attempt can be reproduced from the run report alone.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::domain::{Dataset, Target};
use crate::executor::ENTRY_POINT;

/// Limits applied while building prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptConfig {
    pub max_document_chars: usize,
    pub sample_rows: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_document_chars: 3000,
            sample_rows: 5,
        }
    }
}

/// What the previous attempt got wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// Index of the attempt this feedback describes.
    pub attempt: u32,
    pub previous_source: Option<String>,
    pub diagnostic: String,
}

#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    config: PromptConfig,
}

impl ContextAssembler {
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PromptConfig {
        &self.config
    }

    /// Build the prompt for `attempt`. `document_text` is the raw extracted
    /// text; it is cleaned and truncated here.
    pub fn assemble(
        &self,
        target: &Target,
        document_text: &str,
        reference: &Dataset,
        attempt: u32,
        feedback: Option<&Feedback>,
    ) -> String {
        let mut prompt = String::new();
        let _ = writeln!(
            prompt,
            "You are an expert Python developer. Your goal is to write a parser that \
             extracts the transaction table from a {} statement PDF.",
            target.name()
        );
        prompt.push('\n');
        prompt.push_str("CONTEXT:\n");
        let _ = writeln!(prompt, "- Target: {}", target.name().to_uppercase());
        let _ = writeln!(
            prompt,
            "- Target schema (columns, in order): {}",
            column_list(reference.columns())
        );

        let shown = reference.sample_rows(self.config.sample_rows).len();
        if shown > 0 {
            let _ = writeln!(
                prompt,
                "- Expected output, first {shown} of {} row(s):",
                reference.row_count()
            );
            let _ = writeln!(
                prompt,
                "```csv\n{}```",
                reference.render_csv(self.config.sample_rows)
            );
        } else if reference.row_count() == 0 {
            prompt.push_str("- The expected output has no rows.\n");
        }

        prompt.push_str("- Document text sample:\n--- START SAMPLE ---\n");
        prompt.push_str(&prompt_safe_text(document_text, self.config.max_document_chars));
        prompt.push_str("\n--- END SAMPLE ---\n\n");

        prompt.push_str("CONSTRAINTS:\n");
        let _ = writeln!(
            prompt,
            "1. The file MUST define a single function: `def {ENTRY_POINT}(pdf_path: str) -> pd.DataFrame:`."
        );
        prompt.push_str("2. You MUST use the `pdfplumber` library to read the PDF.\n");
        prompt.push_str(
            "3. The returned DataFrame must have exactly the columns listed above. \
             Dates must be standardized to YYYY-MM-DD. Missing numeric values must be NaN.\n",
        );
        prompt.push_str("4. Output exactly one fenced ```python code block and nothing else.\n");

        match feedback {
            Some(fb) if attempt > 1 => {
                let _ = writeln!(
                    prompt,
                    "\nAttempt {} failed the automated check. Study the diagnostic below and fix the parser.",
                    fb.attempt
                );
                if let Some(source) = &fb.previous_source {
                    let _ = writeln!(prompt, "\nPREVIOUS CODE (FAILED):\n```python\n{}\n```", source.trim_end());
                }
                let _ = writeln!(prompt, "\nDIAGNOSTIC:\n```\n{}\n```", fb.diagnostic.trim_end());
                let _ = writeln!(
                    prompt,
                    "\nTASK (attempt {attempt}): Write the complete, fixed Python code containing \
                     the `{ENTRY_POINT}` function and any helpers it needs. Do not include commentary."
                );
            }
            _ => {
                let _ = writeln!(
                    prompt,
                    "\nTASK (attempt {attempt}): Write the complete initial Python code for the function."
                );
            }
        }
        prompt
    }
}

/// Replace every run of non-ASCII characters with one space, trim, and cut
/// to at most `max_chars` characters.
pub fn prompt_safe_text(text: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_chars.saturating_mul(2)));
    let mut in_run = false;
    for ch in text.chars() {
        if ch.is_ascii() {
            out.push(ch);
            in_run = false;
        } else if !in_run {
            out.push(' ');
            in_run = true;
        }
    }
    out.trim().chars().take(max_chars).collect()
}

fn column_list(columns: &[String]) -> String {
    let quoted: Vec<String> = columns.iter().map(|c| format!("'{c}'")).collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Cell;

    fn fixture() -> (Target, Dataset) {
        let target = Target::new("icici", "data/icici/icici_sample.pdf", "data/icici/icici_expected.csv");
        let rows = (1..=8)
            .map(|i| {
                vec![
                    Cell::from_text(&format!("0{i}-08-2024")),
                    Cell::from_text("UPI transfer"),
                    Cell::from_text(&format!("{i}00.00")),
                ]
            })
            .collect();
        let ds = Dataset::new(vec!["Date".into(), "Description".into(), "Amount".into()], rows).unwrap();
        (target, ds)
    }

    #[test]
    fn safe_text_collapses_non_ascii_runs() {
        assert_eq!(prompt_safe_text("  ₹₹ 100 — ok ", 100), "100   ok");
        assert_eq!(prompt_safe_text("abcdef", 3), "abc");
    }

    #[test]
    fn safe_text_accepts_unbounded_limit() {
        assert_eq!(prompt_safe_text("Statement ₹ text", usize::MAX), "Statement   text");
    }

    #[test]
    fn first_prompt_has_sections_in_order() {
        let (target, ds) = fixture();
        let prompt = ContextAssembler::default().assemble(&target, "Statement text", &ds, 1, None);

        let order = [
            "You are an expert",
            "- Target: ICICI",
            "['Date', 'Description', 'Amount']",
            "```csv\nDate,Description,Amount\n",
            "--- START SAMPLE ---\nStatement text\n--- END SAMPLE ---",
            "def parse(pdf_path: str) -> pd.DataFrame:",
            "pdfplumber",
            "YYYY-MM-DD",
            "TASK (attempt 1)",
        ];
        let mut last = 0;
        for needle in order {
            let pos = prompt[last..]
                .find(needle)
                .unwrap_or_else(|| panic!("{needle:?} missing or out of order"))
                + last;
            last = pos;
        }
        assert!(!prompt.contains("DIAGNOSTIC"));
        assert!(prompt.contains("first 5 of 8 row(s)"));
    }

    #[test]
    fn retry_prompt_carries_source_and_diagnostic() {
        let (target, ds) = fixture();
        let fb = Feedback {
            attempt: 1,
            previous_source: Some("def parse(pdf_path):\n    return None\n".into()),
            diagnostic: "- Missing columns: 'Amount'".into(),
        };
        let prompt = ContextAssembler::default().assemble(&target, "text", &ds, 2, Some(&fb));
        assert!(prompt.contains("PREVIOUS CODE (FAILED):\n```python\ndef parse(pdf_path):\n    return None\n```"));
        assert!(prompt.contains("DIAGNOSTIC:\n```\n- Missing columns: 'Amount'\n```"));
        assert!(prompt.contains("TASK (attempt 2)"));
    }

    #[test]
    fn assembly_is_deterministic() {
        let (target, ds) = fixture();
        let fb = Feedback {
            attempt: 2,
            previous_source: None,
            diagnostic: "boom".into(),
        };
        let a = ContextAssembler::default();
        assert_eq!(
            a.assemble(&target, "t", &ds, 3, Some(&fb)),
            a.assemble(&target, "t", &ds, 3, Some(&fb))
        );
        assert!(!a.assemble(&target, "t", &ds, 3, Some(&fb)).contains("PREVIOUS CODE"));
    }

    #[test]
    fn document_text_is_truncated() {
        let (target, ds) = fixture();
        let assembler = ContextAssembler::new(PromptConfig {
            max_document_chars: 4,
            sample_rows: 0,
        });
        let prompt = assembler.assemble(&target, "abcdefgh", &ds, 1, None);
        assert!(prompt.contains("--- START SAMPLE ---\nabcd\n--- END SAMPLE ---"));
        assert!(!prompt.contains("```csv"));
        assert!(!prompt.contains("no rows"));
    }
}
