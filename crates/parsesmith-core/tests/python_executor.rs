//! Runs real candidate scripts through the Python harness.
//!
//! Every test returns early when `python3` is not installed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parsesmith_core::fakes::ScriptedClient;
use parsesmith_core::{
    parse_reference, python_available, ArtifactStore, Cell, Controller, ExecutionResult,
    FaultStage, PreparedInputs, PythonExecutor, RunPolicy, ScriptExecutor, Target,
};

async fn python() -> Option<PythonExecutor> {
    if python_available("python3").await {
        Some(PythonExecutor::new("python3", Duration::from_secs(30)))
    } else {
        eprintln!("python3 not available, skipping");
        None
    }
}

fn sample_document(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("sample.txt");
    std::fs::write(
        &path,
        "01-08-2024|Salary|5000.00\n02-08-2024|Coffee|\n03-08-2024|Rent|1,200.50\n",
    )
    .unwrap();
    path
}

const LINE_PARSER: &str = r#"
def parse(pdf_path):
    rows = []
    with open(pdf_path, encoding="utf-8") as fh:
        for line in fh:
            date, desc, amount = line.rstrip("\n").split("|")
            d, m, y = date.split("-")
            rows.append({
                "Date": f"{y}-{m}-{d}",
                "Description": desc,
                "Amount": float(amount.replace(",", "")) if amount else None,
            })
    return rows
"#;

#[tokio::test]
async fn list_of_dicts_becomes_dataset() {
    let Some(exec) = python().await else { return };
    let dir = tempfile::tempdir().unwrap();
    let doc = sample_document(&dir);

    match exec.execute(LINE_PARSER, &doc).await {
        ExecutionResult::Produced { dataset } => {
            assert_eq!(dataset.columns(), &["Date", "Description", "Amount"]);
            assert_eq!(dataset.row_count(), 3);
            assert_eq!(dataset.cell(0, "Date"), Some(&Cell::Text("2024-08-01".into())));
            assert_eq!(dataset.cell(1, "Amount"), Some(&Cell::Empty));
            assert_eq!(dataset.cell(2, "Amount"), Some(&Cell::Number(1200.5)));
        }
        other => panic!("expected dataset, got {other:?}"),
    }
}

#[tokio::test]
async fn dict_of_lists_is_accepted() {
    let Some(exec) = python().await else { return };
    let dir = tempfile::tempdir().unwrap();
    let doc = sample_document(&dir);
    let script = "def parse(pdf_path):\n    return {'a': [1, 2], 'b': ['x', float('nan')]}\n";

    match exec.execute(script, &doc).await {
        ExecutionResult::Produced { dataset } => {
            assert_eq!(dataset.row_count(), 2);
            assert_eq!(dataset.cell(1, "b"), Some(&Cell::Empty));
        }
        other => panic!("expected dataset, got {other:?}"),
    }
}

#[tokio::test]
async fn syntax_error_is_a_load_fault() {
    let Some(exec) = python().await else { return };
    let dir = tempfile::tempdir().unwrap();
    let doc = sample_document(&dir);

    match exec.execute("def parse(pdf_path)\n    return []\n", &doc).await {
        ExecutionResult::Fault { fault } => {
            assert_eq!(fault.stage, FaultStage::Load);
            assert!(fault.message.starts_with("SyntaxError"), "{}", fault.message);
        }
        other => panic!("expected fault, got {other:?}"),
    }
}

#[tokio::test]
async fn raised_exception_is_an_invoke_fault_with_traceback() {
    let Some(exec) = python().await else { return };
    let dir = tempfile::tempdir().unwrap();
    let doc = sample_document(&dir);
    let script = "def parse(pdf_path):\n    raise KeyError('Debit Amt')\n";

    match exec.execute(script, &doc).await {
        ExecutionResult::Fault { fault } => {
            assert_eq!(fault.stage, FaultStage::Invoke);
            assert_eq!(fault.message, "KeyError: 'Debit Amt'");
            assert!(fault.detail.unwrap().contains("Traceback"));
        }
        other => panic!("expected fault, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_entry_point_and_bad_return_type() {
    let Some(exec) = python().await else { return };
    let dir = tempfile::tempdir().unwrap();
    let doc = sample_document(&dir);

    match exec.execute("def other(p):\n    return []\n", &doc).await {
        ExecutionResult::Fault { fault } => assert_eq!(fault.stage, FaultStage::Load),
        other => panic!("expected fault, got {other:?}"),
    }
    match exec.execute("def parse(p):\n    return 42\n", &doc).await {
        ExecutionResult::Fault { fault } => {
            assert_eq!(fault.stage, FaultStage::Invoke);
            assert!(fault.message.contains("TypeError"));
        }
        other => panic!("expected fault, got {other:?}"),
    }
}

#[tokio::test]
async fn candidate_stdout_does_not_corrupt_result() {
    let Some(exec) = python().await else { return };
    let dir = tempfile::tempdir().unwrap();
    let doc = sample_document(&dir);
    let script = "print('debug noise')\ndef parse(p):\n    print('more noise')\n    return [{'a': 1}]\n";

    assert!(matches!(
        exec.execute(script, &doc).await,
        ExecutionResult::Produced { .. }
    ));
}

#[tokio::test]
async fn hung_script_times_out() {
    if !python_available("python3").await {
        return;
    }
    let exec = PythonExecutor::new("python3", Duration::from_secs(1));
    let dir = tempfile::tempdir().unwrap();
    let doc = sample_document(&dir);
    let script = "import time\ndef parse(p):\n    time.sleep(30)\n    return []\n";

    match exec.execute(script, &doc).await {
        ExecutionResult::Fault { fault } => {
            assert_eq!(fault.stage, FaultStage::Invoke);
            assert!(fault.message.contains("timed out"));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn attempts_do_not_share_state() {
    let Some(exec) = python().await else { return };
    let dir = tempfile::tempdir().unwrap();
    let doc = sample_document(&dir);
    let script = "import builtins\n\
                  def parse(p):\n    \
                  n = getattr(builtins, 'calls', 0) + 1\n    \
                  builtins.calls = n\n    \
                  return [{'calls': n}]\n";

    for _ in 0..2 {
        match exec.execute(script, &doc).await {
            ExecutionResult::Produced { dataset } => {
                assert_eq!(dataset.cell(0, "calls"), Some(&Cell::Number(1.0)));
            }
            other => panic!("expected dataset, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn full_loop_with_real_interpreter() {
    let Some(exec) = python().await else { return };
    let dir = tempfile::tempdir().unwrap();
    let doc = sample_document(&dir);
    let csv = "Date,Description,Amount\n01-08-2024,Salary,\"5,000.00\"\n02-08-2024,Coffee,\n03-08-2024,Rent,1200.5\n";
    let reference = parse_reference(csv.as_bytes(), "inline").unwrap();

    let broken = "```python\ndef parse(pdf_path):\n    return [{'Date': 'x'}]\n```";
    let fixed = format!("```python\n{LINE_PARSER}\n```");
    let client = Arc::new(ScriptedClient::new(vec![Ok(broken.into()), Ok(fixed)]));

    let out = dir.path().join("custom_parsers");
    let controller = Controller::new(
        client.clone(),
        Arc::new(exec),
        ArtifactStore::new(&out),
        RunPolicy::default(),
    );
    let target = Target::new("demo", &doc, dir.path().join("demo_expected.csv"));
    let inputs = PreparedInputs {
        reference,
        document_text: std::fs::read_to_string(&doc).unwrap(),
    };

    let report = controller.run(&target, &inputs).await.unwrap();
    assert!(report.is_accepted(), "{:?}", report.failure_summaries());
    assert_eq!(report.attempts.len(), 2);
    assert!(client.prompts()[1].contains("Missing columns: 'Description', 'Amount'"));
    assert!(out.join("demo_parser.py").is_file());
}
