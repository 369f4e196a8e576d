//! Structured lifecycle events for synthesis runs.
//!
//! Every event carries an `event` field (`run.started`, `attempt.started`,
//! `attempt.failed`, `attempt.transient_retry`, `artifact.persisted`,
//! `run.finished`) so JSON logs can be filtered without parsing messages.

use tracing::{info, warn};

/// Span covering one run. Attach it with `tracing::Instrument`.
pub fn run_span(run_id: &str, target: &str) -> tracing::Span {
    tracing::info_span!("parsesmith.run", run_id = %run_id, target = %target)
}

/// Emit event: run started for a target with its attempt budget.
///
/// ```ignore
/// emit_run_started("run-1", "icici", 3);
/// // logs: event=run.started run_id=run-1 target=icici max_attempts=3
/// ```
pub fn emit_run_started(run_id: &str, target: &str, max_attempts: u32) {
    info!(event = "run.started", run_id = %run_id, target = %target, max_attempts);
}

/// Emit event: attempt `index` is about to call the generation API.
/// `transient_retry` is 0 on the first call for that index.
pub fn emit_attempt_started(index: u32, transient_retry: u32) {
    info!(event = "attempt.started", attempt = index, transient_retry);
}

/// Emit event: a generation call failed transiently and the same index is
/// re-issued (warning level).
pub fn emit_transient_retry(index: u32, retry: u32, error: &dyn std::fmt::Display) {
    warn!(event = "attempt.transient_retry", attempt = index, retry, error = %error);
}

/// Emit event: attempt failed (warning level). `kind` is the failure label.
pub fn emit_attempt_failed(index: u32, kind: &str, summary: &str) {
    warn!(event = "attempt.failed", attempt = index, kind = %kind, summary = %summary);
}

/// Emit event: the accepted parser was written to `path`.
pub fn emit_artifact_persisted(index: u32, path: &std::path::Path) {
    info!(event = "artifact.persisted", attempt = index, path = %path.display());
}

/// Emit event: run finished with its outcome label, attempt count and duration.
pub fn emit_run_finished(run_id: &str, outcome: &str, attempts: usize, duration_ms: u64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        outcome = %outcome,
        attempts = attempts as u64,
        duration_ms,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_and_events_do_not_panic_without_subscriber() {
        let span = run_span("run-1", "icici");
        let _guard = span.enter();
        emit_run_started("run-1", "icici", 3);
        emit_attempt_started(1, 0);
        emit_transient_retry(1, 1, &"HTTP 503");
        emit_attempt_failed(1, "mismatch", "missing columns [amount]");
        emit_artifact_persisted(1, std::path::Path::new("out/icici_parser.py"));
        emit_run_finished("run-1", "accepted", 1, 42);
    }
}
