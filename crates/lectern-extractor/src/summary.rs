//! End-of-run summary

use crate::types::{FailureEntry, FailureKind};
use std::time::Duration;
use uuid::Uuid;

/// Counters and failure reasons collected during one run
///
/// Every (binding, article) pair lands in exactly one of accepted, replaced,
/// skipped_existing, rejected or failed. Failed searches are counted per
/// binding.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Run identifier (UUIDv7, time-ordered)
    pub run_id: Uuid,

    /// New rows written
    pub accepted: usize,

    /// Existing rows replaced
    pub replaced: usize,

    /// Pairs skipped because a row existed
    pub skipped_existing: usize,

    /// Pairs whose record failed validation
    pub rejected: usize,

    /// Pairs that failed for any other reason
    pub failed: usize,

    /// Bindings whose search failed
    pub searches_failed: usize,

    /// Per-key failure reasons, in run order
    pub failures: Vec<FailureEntry>,

    /// Whether the run stopped early on request
    pub cancelled: bool,

    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSummary {
    /// Create an empty summary with a fresh run id
    pub fn new() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            accepted: 0,
            replaced: 0,
            skipped_existing: 0,
            rejected: 0,
            failed: 0,
            searches_failed: 0,
            failures: Vec::new(),
            cancelled: false,
            elapsed: Duration::ZERO,
        }
    }

    /// Record a newly written row
    pub fn record_accepted(&mut self) {
        self.accepted += 1;
    }

    /// Record a replaced row
    pub fn record_replaced(&mut self) {
        self.replaced += 1;
    }

    /// Record a key skipped because its row exists
    pub fn record_skipped(&mut self) {
        self.skipped_existing += 1;
    }

    /// Record a rejected record
    pub fn record_rejected(&mut self, subject: impl Into<String>, reason: impl Into<String>) {
        self.rejected += 1;
        self.push_failure(subject.into(), FailureKind::Rejected, reason.into());
    }

    /// Record a failed pair
    pub fn record_failure(
        &mut self,
        subject: impl Into<String>,
        kind: FailureKind,
        reason: impl Into<String>,
    ) {
        self.failed += 1;
        self.push_failure(subject.into(), kind, reason.into());
    }

    /// Record a failed search for a binding
    pub fn record_search_failure(&mut self, binding: impl Into<String>, reason: impl Into<String>) {
        self.searches_failed += 1;
        self.push_failure(binding.into(), FailureKind::Search, reason.into());
    }

    fn push_failure(&mut self, subject: String, kind: FailureKind, reason: String) {
        self.failures.push(FailureEntry {
            subject,
            kind,
            reason,
        });
    }

    /// Pairs processed to an outcome
    pub fn total_pairs(&self) -> usize {
        self.accepted + self.replaced + self.skipped_existing + self.rejected + self.failed
    }

    /// Rows written (inserted or replaced)
    pub fn total_written(&self) -> usize {
        self.accepted + self.replaced
    }

    /// Generate a summary report of the run
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Run {} Summary", self.run_id),
            "==========================================".to_string(),
            format!("Accepted: {}", self.accepted),
            format!("Replaced: {}", self.replaced),
            format!("Skipped (existing): {}", self.skipped_existing),
            format!("Rejected: {}", self.rejected),
            format!("Failed: {}", self.failed),
            format!("Failed searches: {}", self.searches_failed),
            format!("Elapsed: {:.1}s", self.elapsed.as_secs_f64()),
        ];

        if self.cancelled {
            lines.push("Run cancelled before all bindings were processed".to_string());
        }

        if !self.failures.is_empty() {
            lines.push(String::new());
            lines.push("Failures:".to_string());
            for failure in &self.failures {
                lines.push(format!(
                    "  {} [{}]: {}",
                    failure.subject, failure.kind, failure.reason
                ));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut summary = RunSummary::new();
        summary.record_accepted();
        summary.record_accepted();
        summary.record_replaced();
        summary.record_skipped();
        summary.record_rejected("(TTX, 1)", "ic50: missing");
        summary.record_failure("(TTX, 2)", FailureKind::Retrieval, "not found");
        summary.record_search_failure("TTX", "index unavailable");

        assert_eq!(summary.total_pairs(), 6);
        assert_eq!(summary.total_written(), 3);
        assert_eq!(summary.searches_failed, 1);
        assert_eq!(summary.failures.len(), 3);
        assert_eq!(summary.failures[0].kind, FailureKind::Rejected);
    }

    #[test]
    fn test_summary_report() {
        let mut summary = RunSummary::new();
        summary.record_accepted();
        summary.record_failure("(TTX, 2)", FailureKind::NoContent, "article has no sections");
        summary.cancelled = true;

        let report = summary.summary();
        assert!(report.starts_with(&format!("Run {} Summary", summary.run_id)));
        assert!(report.contains("Accepted: 1"));
        assert!(report.contains("Failed: 1"));
        assert!(report.contains("Run cancelled"));
        assert!(report.contains("  (TTX, 2) [no content]: article has no sections"));
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunSummary::new().run_id, RunSummary::new().run_id);
    }
}
