//! Process-wide attempt counters.
//!
//! Incremented by the controller; [`Metrics::flush`] emits them as one
//! `info!` event when a run finishes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global counters shared by every run in the process.
pub static METRICS: Metrics = Metrics::new();

/// Relaxed atomic counters, safe to bump from any task.
pub struct Metrics {
    attempts_started: AtomicU64,
    attempts_failed: AtomicU64,
    transient_retries: AtomicU64,
    artifacts_written: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            attempts_started: AtomicU64::new(0),
            attempts_failed: AtomicU64::new(0),
            transient_retries: AtomicU64::new(0),
            artifacts_written: AtomicU64::new(0),
        }
    }

    /// Count one attempt entering generation.
    pub fn inc_attempts_started(&self) {
        self.attempts_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "attempts_started", "counter incremented");
    }

    /// Count one attempt that ended in a failure record.
    pub fn inc_attempts_failed(&self) {
        self.attempts_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "attempts_failed", "counter incremented");
    }

    /// Count one generation call re-issued after a transient error.
    pub fn inc_transient_retries(&self) {
        self.transient_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "transient_retries", "counter incremented");
    }

    /// Count one accepted parser written to disk.
    pub fn inc_artifacts_written(&self) {
        self.artifacts_written.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "artifacts_written", "counter incremented");
    }

    /// Emit every counter as a single `info!` event.
    ///
    /// The controller calls this once when a run finishes.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            attempts_started = self.attempts_started(),
            attempts_failed = self.attempts_failed(),
            transient_retries = self.transient_retries(),
            artifacts_written = self.artifacts_written(),
        );
    }

    /// Read the attempts-started count.
    pub fn attempts_started(&self) -> u64 {
        self.attempts_started.load(Ordering::Relaxed)
    }

    /// Read the attempts-failed count.
    pub fn attempts_failed(&self) -> u64 {
        self.attempts_failed.load(Ordering::Relaxed)
    }

    /// Read the transient-retry count.
    pub fn transient_retries(&self) -> u64 {
        self.transient_retries.load(Ordering::Relaxed)
    }

    /// Read the artifacts-written count.
    pub fn artifacts_written(&self) -> u64 {
        self.artifacts_written.load(Ordering::Relaxed)
    }

    /// Zero every counter. Tests call this between runs.
    pub fn reset(&self) {
        self.attempts_started.store(0, Ordering::Relaxed);
        self.attempts_failed.store(0, Ordering::Relaxed);
        self.transient_retries.store(0, Ordering::Relaxed);
        self.artifacts_written.store(0, Ordering::Relaxed);
    }
}
