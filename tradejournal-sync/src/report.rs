//! Run reports and live progress lines.

use crate::job::{JobKind, JobPhase};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tradejournal_core::domain::{LocalIndex, Outcome};

/// Outcome counts over a job's results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub exists: usize,
    pub missing: usize,
    pub created: usize,
    pub skipped_exists: usize,
    pub updated: usize,
    pub skipped: usize,
    pub retrying: usize,
    pub errors: usize,
}

impl Tally {
    pub fn from_results(results: &BTreeMap<LocalIndex, Outcome>) -> Self {
        let mut t = Tally::default();
        for outcome in results.values() {
            match outcome {
                Outcome::Exists => t.exists += 1,
                Outcome::Missing => t.missing += 1,
                Outcome::Created => t.created += 1,
                Outcome::SkippedExists => t.skipped_exists += 1,
                Outcome::Updated => t.updated += 1,
                Outcome::Skipped => t.skipped += 1,
                Outcome::Retrying => t.retrying += 1,
                Outcome::Error => t.errors += 1,
            }
        }
        t
    }
}

/// `created: N, skipped (exists): N, errors: N, retrying: N | remaining: N`
///
/// `total` and `processed` are accepted for callers that track them
/// separately; only `remaining` is rendered.
pub fn build_report(
    results: &BTreeMap<LocalIndex, Outcome>,
    total: usize,
    processed: usize,
    remaining: usize,
) -> String {
    debug_assert!(processed <= total);
    let t = Tally::from_results(results);
    format!(
        "created: {}, skipped (exists): {}, errors: {}, retrying: {} | remaining: {}",
        t.created, t.skipped_exists, t.errors, t.retrying, remaining
    )
}

/// Point-in-time view of a job for progress display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub kind: JobKind,
    pub phase: JobPhase,
    pub total: usize,
    pub processed: usize,
    pub current: Option<LocalIndex>,
    pub exists: usize,
    pub missing: usize,
    pub elapsed_ms: i64,
}

impl ProgressSnapshot {
    /// `[check] 12/50 (24%) exists 9, missing 3 | 4.2s`
    pub fn progress_line(&self) -> String {
        let pct = if self.total == 0 {
            100
        } else {
            self.processed * 100 / self.total
        };
        let mut line = format!(
            "[{}] {}/{} ({pct}%)",
            self.kind, self.processed, self.total
        );
        if self.kind == JobKind::Check {
            line.push_str(&format!(" exists {}, missing {}", self.exists, self.missing));
        }
        if let Some(idx) = self.current {
            line.push_str(&format!(" at #{idx}"));
        }
        if self.phase == JobPhase::Draining {
            line.push_str(" (cancelling)");
        }
        line.push_str(&format!(" | {:.1}s", self.elapsed_ms as f64 / 1000.0));
        line
    }
}
