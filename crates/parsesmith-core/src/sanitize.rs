//! Turn raw model output into a loadable script.
//!
//! Sanitization only repackages the candidate: it strips markdown fences,
//! normalizes line endings and whitespace, drops repeated top-level imports
//! and prepends import declarations the body needs but never declares. Every
//! step is idempotent, so `sanitize(sanitize(x)) == sanitize(x)`.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::executor::ENTRY_POINT;

/// Raw output from which no usable script could be recovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SanitizationError {
    #[error("response contained no code")]
    Empty,

    #[error("script does not define a top-level `def {name}(...)`")]
    MissingEntryPoint { name: String },
}

/// An import the generated body may rely on without declaring.
#[derive(Debug, Clone, Copy)]
struct DependencyRule {
    declaration: &'static str,
    /// Matches a use of the bound name in the body.
    usage: &'static str,
    /// Matches any import statement that already binds the name.
    binding: &'static str,
}

const DEPENDENCY_RULES: &[DependencyRule] = &[
    DependencyRule {
        declaration: "import pandas as pd",
        usage: r"(?m)(?:^|[^\w.])pd\.\w",
        binding: r"(?m)^[ \t]*import[ \t][^\n]*\bpandas[ \t]+as[ \t]+pd\b",
    },
    DependencyRule {
        declaration: "import numpy as np",
        usage: r"(?m)(?:^|[^\w.])np\.\w",
        binding: r"(?m)^[ \t]*import[ \t][^\n]*\bnumpy[ \t]+as[ \t]+np\b",
    },
    DependencyRule {
        declaration: "import pdfplumber",
        usage: r"(?m)(?:^|[^\w.])pdfplumber\.\w",
        binding: r"(?m)^[ \t]*import[ \t][^\n]*\bpdfplumber\b",
    },
    DependencyRule {
        declaration: "import re",
        usage: r"(?m)(?:^|[^\w.])re\.\w",
        binding: r"(?m)^[ \t]*import[ \t][^\n]*\bre\b",
    },
    DependencyRule {
        declaration: "from datetime import datetime",
        usage: r"(?m)(?:^|[^\w.])datetime[.(]",
        binding: r"(?m)^[ \t]*(?:import[ \t][^\n]*\bdatetime\b|from[ \t]+datetime[ \t]+import[ \t][^\n]*\bdatetime\b)",
    },
];

struct CompiledRule {
    declaration: &'static str,
    usage: Regex,
    binding: Regex,
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+.-]*)[^\n]*\n(.*?)```").expect("fence pattern is valid")
    })
}

/// Packaging-only cleanup of generated scripts.
pub struct Sanitizer {
    rules: Vec<CompiledRule>,
    entry_point: Regex,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sanitizer {
    pub fn new() -> Self {
        let rules = DEPENDENCY_RULES
            .iter()
            .map(|rule| CompiledRule {
                declaration: rule.declaration,
                usage: Regex::new(rule.usage).expect("usage pattern is valid"),
                binding: Regex::new(rule.binding).expect("binding pattern is valid"),
            })
            .collect();
        let entry_point = Regex::new(&format!(
            r"(?m)^def[ \t]+{}[ \t]*\(",
            regex::escape(ENTRY_POINT)
        ))
        .expect("entry point pattern is valid");

        Self { rules, entry_point }
    }

    /// Sanitize raw completion text into a standalone script.
    pub fn sanitize(&self, raw: &str) -> Result<String, SanitizationError> {
        let text = normalize_line_endings(raw);
        let code = extract_code(&text);
        let code = normalize_whitespace(&code);
        if code.trim().is_empty() {
            return Err(SanitizationError::Empty);
        }

        let code = collapse_duplicate_imports(&code);
        let code = self.inject_dependencies(&code);

        if !self.entry_point.is_match(&code) {
            return Err(SanitizationError::MissingEntryPoint {
                name: ENTRY_POINT.to_string(),
            });
        }
        Ok(code)
    }

    /// Declarations the body uses but does not import, in rule order.
    pub fn missing_declarations(&self, code: &str) -> Vec<&'static str> {
        self.rules
            .iter()
            .filter(|r| r.usage.is_match(code) && !r.binding.is_match(code))
            .map(|r| r.declaration)
            .collect()
    }

    fn inject_dependencies(&self, code: &str) -> String {
        let missing = self.missing_declarations(code);
        if missing.is_empty() {
            return code.to_string();
        }

        let lines: Vec<&str> = code.lines().collect();
        let preamble = lines
            .iter()
            .take_while(|l| is_preamble_line(l))
            .count();

        let mut out: Vec<&str> = Vec::with_capacity(lines.len() + missing.len() + 1);
        out.extend(&lines[..preamble]);
        out.extend(missing.iter().copied());
        out.push("");
        out.extend(&lines[preamble..]);
        let mut joined = out.join("\n");
        joined.push('\n');
        joined
    }
}

/// Lines that must stay above any injected import.
fn is_preamble_line(line: &str) -> bool {
    line.starts_with("#!")
        || (line.starts_with('#') && (line.contains("coding:") || line.contains("coding=")))
        || line.starts_with("from __future__ import")
}

fn normalize_line_endings(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

/// Prefer the first python-tagged fenced block, then the first untagged one.
/// Otherwise stray fence lines are dropped and the rest of the text is kept.
fn extract_code(text: &str) -> String {
    let blocks: Vec<(String, &str)> = fence_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let lang = caps.get(1).map(|m| m.as_str().to_ascii_lowercase())?;
            let body = caps.get(2)?.as_str();
            Some((lang, body))
        })
        .collect();

    let chosen = blocks
        .iter()
        .find(|(lang, _)| matches!(lang.as_str(), "python" | "py" | "python3"))
        .or_else(|| blocks.iter().find(|(lang, _)| lang.is_empty()));

    match chosen {
        Some((_, body)) => body.to_string(),
        None => text
            .lines()
            .filter(|l| !l.trim_start().starts_with("```"))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Trim trailing whitespace per line, remove a common indentation prefix,
/// drop leading/trailing blank lines, end with exactly one newline.
fn normalize_whitespace(code: &str) -> String {
    let lines: Vec<&str> = code.lines().map(str::trim_end).collect();

    let indent = lines
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| &l[..l.len() - l.trim_start().len()])
        .fold(None::<&str>, |acc, ws| match acc {
            None => Some(ws),
            Some(prev) => Some(common_prefix(prev, ws)),
        })
        .unwrap_or("");

    let dedented: Vec<&str> = lines
        .iter()
        .map(|l| l.strip_prefix(indent).unwrap_or(l))
        .collect();

    let start = dedented.iter().position(|l| !l.is_empty());
    let end = dedented.iter().rposition(|l| !l.is_empty());
    match (start, end) {
        (Some(s), Some(e)) => {
            let mut out = dedented[s..=e].join("\n");
            out.push('\n');
            out
        }
        _ => String::new(),
    }
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let len: usize = a
        .chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.len_utf8())
        .sum();
    &a[..len]
}

/// Keep only the first copy of each identical top-level import line.
/// Parenthesized or continued imports are left alone.
fn collapse_duplicate_imports(code: &str) -> String {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for line in code.lines() {
        let is_import = (line.starts_with("import ")
            || (line.starts_with("from ") && line.contains(" import ")))
            && !line.ends_with('(')
            && !line.ends_with('\\');
        if is_import && !seen.insert(line) {
            continue;
        }
        out.push(line);
    }
    let mut joined = out.join("\n");
    joined.push('\n');
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "def parse(pdf_path: str) -> pd.DataFrame:\n    return pd.DataFrame()\n";

    #[test]
    fn extracts_python_block_over_others() {
        let raw = format!(
            "Here you go:\n```text\nnot code\n```\n```python\n{BODY}```\nThanks!"
        );
        let out = Sanitizer::new().sanitize(&raw).unwrap();
        assert!(out.starts_with("import pandas as pd\n\ndef parse"));
        assert!(!out.contains("not code"));
    }

    #[test]
    fn untagged_block_used_when_no_python_block() {
        let raw = format!("```\nimport pandas as pd\n{BODY}```");
        let out = Sanitizer::new().sanitize(&raw).unwrap();
        assert_eq!(out, format!("import pandas as pd\n{BODY}"));
    }

    #[test]
    fn non_python_block_falls_back_to_whole_text() {
        let raw = "```text\nnotes\n```\nimport re\ndef parse(p):\n    return re.findall('x', p)\n";
        let out = Sanitizer::new().sanitize(raw).unwrap();
        assert!(!out.contains("```"));
        assert!(out.contains("import re\ndef parse(p):"));
    }

    #[test]
    fn unterminated_fence_is_dropped() {
        let raw = format!("```python\nimport pandas as pd\n{BODY}");
        let out = Sanitizer::new().sanitize(&raw).unwrap();
        assert_eq!(out, format!("import pandas as pd\n{BODY}"));
    }

    #[test]
    fn crlf_bom_and_trailing_space_normalized() {
        let raw = "\u{feff}import pandas as pd  \r\ndef parse(p):\r\n    return pd.DataFrame()   \r\n\r\n\r\n";
        let out = Sanitizer::new().sanitize(raw).unwrap();
        assert_eq!(out, "import pandas as pd\ndef parse(p):\n    return pd.DataFrame()\n");
    }

    #[test]
    fn common_indentation_removed() {
        let raw = "    import re\n    def parse(p):\n        return re.findall('x', p)\n";
        let out = Sanitizer::new().sanitize(raw).unwrap();
        assert_eq!(out, "import re\ndef parse(p):\n    return re.findall('x', p)\n");
    }

    #[test]
    fn injects_each_missing_dependency_once() {
        let raw = "def parse(p):\n    with pdfplumber.open(p) as pdf:\n        d = datetime.strptime('1', '%d')\n        return pd.DataFrame(np.zeros(1))\n";
        let out = Sanitizer::new().sanitize(raw).unwrap();
        assert!(out.starts_with(
            "import pandas as pd\nimport numpy as np\nimport pdfplumber\nfrom datetime import datetime\n\ndef parse"
        ));
        assert!(!out.contains("import re\n"));
    }

    #[test]
    fn existing_bindings_are_respected() {
        let raw = "import pandas as pd, numpy as np\nimport re, os\nimport datetime\ndef parse(p):\n    return pd.DataFrame(np.zeros(1)), re.sub('a', 'b', p), datetime.date.today()\n";
        let sanitizer = Sanitizer::new();
        assert!(sanitizer.missing_declarations(raw).is_empty());
        assert_eq!(sanitizer.sanitize(raw).unwrap(), raw);
    }

    #[test]
    fn attribute_access_is_not_a_module_use() {
        let raw = "def parse(p):\n    return obj.re.x, df.pd.y\n";
        assert!(Sanitizer::new().missing_declarations(raw).is_empty());
    }

    #[test]
    fn duplicate_import_blocks_collapse() {
        let raw = "import pandas as pd\nimport pdfplumber\nimport re\n\nimport pdfplumber\nimport pandas as pd\nimport re\n\ndef parse(p):\n    return pd.DataFrame()\n";
        let out = Sanitizer::new().sanitize(raw).unwrap();
        assert_eq!(out.matches("import pdfplumber").count(), 1);
        assert_eq!(out.matches("import pandas as pd").count(), 1);
        assert_eq!(out.matches("import re").count(), 1);
    }

    #[test]
    fn parenthesized_imports_untouched() {
        let raw = "from typing import (\n    List,\n)\nfrom typing import (\n    Dict,\n)\ndef parse(p):\n    return []\n";
        let out = Sanitizer::new().sanitize(raw).unwrap();
        assert_eq!(out.matches("from typing import (").count(), 2);
    }

    #[test]
    fn future_import_stays_first() {
        let raw = "#!/usr/bin/env python3\nfrom __future__ import annotations\ndef parse(p):\n    return re.split(',', p)\n";
        let out = Sanitizer::new().sanitize(raw).unwrap();
        assert_eq!(
            out,
            "#!/usr/bin/env python3\nfrom __future__ import annotations\nimport re\n\ndef parse(p):\n    return re.split(',', p)\n"
        );
    }

    #[test]
    fn empty_response_rejected() {
        assert_eq!(Sanitizer::new().sanitize("```python\n```"), Err(SanitizationError::Empty));
        assert_eq!(Sanitizer::new().sanitize("  \n\n"), Err(SanitizationError::Empty));
    }

    #[test]
    fn missing_entry_point_rejected() {
        let err = Sanitizer::new().sanitize("def extract(p):\n    return []\n").unwrap_err();
        assert_eq!(
            err,
            SanitizationError::MissingEntryPoint {
                name: "parse".into()
            }
        );
    }

    #[test]
    fn nested_parse_is_not_an_entry_point() {
        let raw = "class P:\n    def parse(self, p):\n        return []\n";
        assert!(Sanitizer::new().sanitize(raw).is_err());
    }

    #[test]
    fn sanitize_is_idempotent() {
        let sanitizer = Sanitizer::new();
        let inputs = [
            format!("```python\n{BODY}```"),
            "  def parse(p):\n      return re.findall('x', p)  \r\n".to_string(),
            "import re\nimport re\n\n\ndef parse(p):\n    return pdfplumber.open(p)\n\n".to_string(),
            "#!/usr/bin/env python\ndef parse(p):\n    return pd.read_csv(p)\n".to_string(),
        ];
        for input in &inputs {
            let once = sanitizer.sanitize(input).unwrap();
            let twice = sanitizer.sanitize(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }
}
