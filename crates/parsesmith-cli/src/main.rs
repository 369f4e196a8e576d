//! ParseSmith CLI
//!
//! `parsesmith --target <name>` synthesizes `<output_dir>/<name>_parser.py`
//! from `<data_dir>/<name>/<name>_sample.pdf` and
//! `<data_dir>/<name>/<name>_expected.csv`.
//!
//! Exit codes: `0` accepted, `1` attempt budget exhausted, `2` setup fault.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use parsesmith_core::{
    prepare_inputs, python_available, reader_for, write_run_report, ArtifactStore, Controller,
    Credential, GeminiClient, Outcome, PreparedInputs, RunReport, SetupFault, SynthConfig, Target,
    CREDENTIAL_VAR,
};

#[derive(Parser, Debug)]
#[command(name = "parsesmith")]
#[command(version = parsesmith_core::VERSION)]
#[command(about = "Generate and validate a statement parser with an LLM", long_about = None)]
struct Cli {
    /// Target name, e.g. `icici`
    #[arg(short, long, env = "PARSESMITH_TARGET")]
    target: String,

    /// Total attempts, including the first
    #[arg(long, env = "PARSESMITH_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Directory holding `<target>/<target>_sample.pdf` and `<target>_expected.csv`
    #[arg(long, env = "PARSESMITH_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Where the accepted parser is written
    #[arg(long, env = "PARSESMITH_OUTPUT_DIR", default_value = "custom_parsers")]
    output_dir: PathBuf,

    /// Python interpreter used to run candidates
    #[arg(long, env = "PARSESMITH_PYTHON", default_value = "python3")]
    python: String,

    /// Generation model
    #[arg(long, env = "PARSESMITH_MODEL")]
    model: Option<String>,

    /// Base URL of the generation API
    #[arg(long, env = "PARSESMITH_API_BASE")]
    api_base: Option<String>,

    /// Per-request timeout for the generation API, in seconds
    #[arg(long, env = "PARSESMITH_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    /// Per-attempt timeout for running a candidate, in seconds
    #[arg(long, env = "PARSESMITH_EXEC_TIMEOUT_SECS")]
    exec_timeout_secs: Option<u64>,

    /// Count transient API failures against the attempt budget
    #[arg(long, env = "PARSESMITH_TRANSIENT_CONSUMES_BUDGET")]
    transient_consumes_budget: bool,

    /// Also write a JSON run report (plus `.sha256`) to this path
    #[arg(long, env = "PARSESMITH_REPORT")]
    report: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn config(&self) -> SynthConfig {
        let mut cfg = SynthConfig::for_target(&self.target);
        cfg.max_attempts = self.max_attempts;
        cfg.data_dir = self.data_dir.clone();
        cfg.output_dir = self.output_dir.clone();
        cfg.python = self.python.clone();
        cfg.transient_consumes_budget = self.transient_consumes_budget;
        if let Some(model) = &self.model {
            cfg.model = model.clone();
        }
        if let Some(base) = &self.api_base {
            cfg.api_base = base.clone();
        }
        if let Some(secs) = self.request_timeout_secs {
            cfg.request_timeout_secs = secs;
        }
        if let Some(secs) = self.exec_timeout_secs {
            cfg.exec_timeout_secs = secs;
        }
        cfg
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // `.env` must be loaded before clap reads PARSESMITH_* variables.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    parsesmith_core::init_tracing(cli.json, level);

    let result = run(&cli).await;
    match &result {
        Ok(report) => print_report(report),
        Err(err) => eprintln!("error: {err:#}"),
    }
    ExitCode::from(exit_code(&result))
}

/// `0` accepted, `1` attempt budget exhausted, `2` anything that stopped the
/// run before or outside the attempt loop.
fn exit_code(result: &Result<RunReport>) -> u8 {
    match result {
        Ok(report) if report.is_accepted() => 0,
        Ok(_) => 1,
        Err(_) => 2,
    }
}

async fn run(cli: &Cli) -> Result<RunReport> {
    let cfg = cli.config();
    let (controller, target, inputs) = setup(&cfg).await?;

    let report = controller
        .run(&target, &inputs)
        .await
        .context("run aborted")?;

    if let Some(path) = &cli.report {
        let digest = write_run_report(&report, path)
            .with_context(|| format!("failed to write run report to {}", path.display()))?;
        info!(report = %path.display(), digest = %digest.display(), "run report written");
    }
    Ok(report)
}

/// Setup checks, in order: configuration, credential, input files,
/// reference, document text, interpreter.
async fn setup(cfg: &SynthConfig) -> Result<(Controller, Target, PreparedInputs)> {
    cfg.validate().map_err(SetupFault::from)?;

    let credential =
        Credential::from_env_value(CREDENTIAL_VAR, std::env::var(CREDENTIAL_VAR).ok())?;

    let target = cfg.layout().resolve()?;
    info!(
        target = %target.name(),
        document = %target.document().display(),
        reference = %target.reference().display(),
        "inputs located"
    );

    let reader = reader_for(target.document());
    let inputs = prepare_inputs(&target, reader.as_ref()).await?;

    if !python_available(&cfg.python).await {
        return Err(SetupFault::InterpreterUnavailable {
            python: cfg.python.clone(),
        }
        .into());
    }

    let client = GeminiClient::new(credential, cfg.gemini_config()).map_err(SetupFault::from)?;
    let controller = Controller::new(
        Arc::new(client),
        Arc::new(cfg.executor()),
        ArtifactStore::new(&cfg.output_dir),
        cfg.run_policy(),
    );
    Ok((controller, target, inputs))
}

fn print_report(report: &RunReport) {
    let target = report.target.to_uppercase();
    match &report.outcome {
        Outcome::Accepted { artifact } => {
            let index = report.attempts.last().map_or(0, |a| a.index);
            println!("Parser for {target} accepted on attempt {index}.");
            println!("Written to {}", artifact.display());
        }
        Outcome::Exhausted => {
            println!(
                "No parser for {target} passed after {} attempt(s):",
                report.attempts.len()
            );
            for line in report.failure_summaries() {
                println!("  {line}");
            }
        }
    }
}
