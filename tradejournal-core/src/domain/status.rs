//! Per-row reconciliation state and per-item job outcomes.

use serde::{Deserialize, Serialize};

/// What the session currently knows about a local row's remote counterpart.
///
/// Survives across job kinds: a Check's `Missing` is what Insert later acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    #[default]
    Unknown,
    Exists,
    Missing,
    Error,
    Retrying,
}

impl RowStatus {
    pub fn label(self) -> &'static str {
        match self {
            RowStatus::Unknown => "unknown",
            RowStatus::Exists => "exists",
            RowStatus::Missing => "missing",
            RowStatus::Error => "error",
            RowStatus::Retrying => "retrying",
        }
    }
}

/// Result of processing one queued item within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Check: present remotely.
    Exists,
    /// Check: absent remotely (or not matchable at all).
    Missing,
    /// Insert: created remotely during this run.
    Created,
    /// Insert: already present when re-verified.
    SkippedExists,
    /// Update: pushed to the remote journal.
    Updated,
    /// Update: no known remote id, nothing done.
    Skipped,
    /// Failed transiently, requeued.
    Retrying,
    /// Terminal failure for this item.
    Error,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Exists => "exists",
            Outcome::Missing => "missing",
            Outcome::Created => "created",
            Outcome::SkippedExists => "skipped (exists)",
            Outcome::Updated => "updated",
            Outcome::Skipped => "skipped",
            Outcome::Retrying => "retrying",
            Outcome::Error => "error",
        }
    }

    /// Whether the item has left the queue for good.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Outcome::Retrying)
    }
}
