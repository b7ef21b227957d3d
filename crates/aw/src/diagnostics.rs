//! The `Reporter` trait: the compiler's sole diagnostics surface (§7,
//! SPEC_FULL "Logging / diagnostics"). No stage calls `println!`/
//! `eprintln!` directly — everything goes through here, so the CLI can
//! color it, a test can capture it, and an embedding caller can route it
//! wherever it likes.

use aw_types::{Outcome, OutcomeSummary};

/// Severity of one reported diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Where compiler stages send progress and diagnostics.
pub trait Reporter {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);

    /// A conflict between two import merges (§4.A `ConflictReported`,
    /// SPEC_FULL "verbose conflict reporting"). Default implementation
    /// just routes through [`Reporter::warn`]; a `--verbose` CLI reporter
    /// may render it more richly.
    fn conflict_reported(&self, workflow: &str, field: &str, winner: &str, loser: &str) {
        self.warn(&format!(
            "{workflow}: field `{field}` set by both `{winner}` and `{loser}`; `{winner}` wins"
        ));
    }

    /// The final per-invocation rollup (§7).
    fn summary(&self, summary: &OutcomeSummary) {
        self.info(&format!(
            "{} updated, {} unchanged, {} conflicted, {} failed",
            summary.updated, summary.unchanged, summary.conflicted, summary.failed
        ));
    }
}

/// A [`Reporter`] that records every call for test assertions, instead of
/// writing anywhere.
#[derive(Debug, Default)]
pub struct CapturingReporter {
    pub lines: std::sync::Mutex<Vec<(Severity, String)>>,
}

impl CapturingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Severity, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub fn has_severity(&self, severity: Severity) -> bool {
        self.lines.lock().unwrap().iter().any(|(s, _)| *s == severity)
    }
}

impl Reporter for CapturingReporter {
    fn info(&self, message: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((Severity::Info, message.to_string()));
    }

    fn warn(&self, message: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((Severity::Warn, message.to_string()));
    }

    fn error(&self, message: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((Severity::Error, message.to_string()));
    }
}

/// A [`Reporter`] that discards everything, for call sites (library
/// embedding, benchmarks) that don't want diagnostics at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Track per-invocation outcomes and hand them to a [`Reporter`] at the
/// end (§7). Kept separate from [`OutcomeSummary`] itself so the pipeline
/// doesn't need to thread a `&mut OutcomeSummary` through every call.
#[derive(Debug, Default)]
pub struct SummaryTracker {
    summary: OutcomeSummary,
}

impl SummaryTracker {
    pub fn record(&mut self, outcome: Outcome) {
        self.summary.record(outcome);
    }

    pub fn finish(self, reporter: &dyn Reporter) -> OutcomeSummary {
        reporter.summary(&self.summary);
        self.summary
    }
}
