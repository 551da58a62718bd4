//! ReconciliationJob: the explicit per-run state of one job kind.
//!
//! A job is advanced by a step function that processes exactly one queued
//! item and returns a [`Tick`]: when to call it again, or that it is done.
//! The host (worker thread or test) owns the job and the clock.

use crate::queue::{QueuedItem, ReconciliationQueue};
use crate::report::{build_report, ProgressSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::info;
use tradejournal_core::domain::{LocalIndex, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Check,
    Insert,
    Update,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Check, JobKind::Insert, JobKind::Update];

    pub fn label(self) -> &'static str {
        match self {
            JobKind::Check => "check",
            JobKind::Insert => "insert",
            JobKind::Update => "update",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// `Idle → Running → Draining (cancel requested) → Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    #[default]
    Idle,
    Running,
    Draining,
    Finished,
}

/// What the host should do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Call `step` again once this much time has passed.
    After(Duration),
    Done,
}

impl Tick {
    pub fn is_done(self) -> bool {
        matches!(self, Tick::Done)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A user-facing message produced during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    /// Local row the message is about, if any.
    pub index: Option<LocalIndex>,
    pub message: String,
}

impl Notice {
    pub fn warning(index: Option<LocalIndex>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            index,
            message: message.into(),
        }
    }

    pub fn error(index: Option<LocalIndex>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            index,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            index: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        match self.index {
            Some(idx) => write!(f, "{level} [#{idx}]: {}", self.message),
            None => write!(f, "{level}: {}", self.message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationJob {
    pub kind: JobKind,
    pub phase: JobPhase,
    pub queue: ReconciliationQueue,
    pub total: usize,
    /// Items that left the queue for good.
    pub processed: usize,
    /// Item the last step worked on.
    pub current: Option<LocalIndex>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_ms: i64,
    pub cancel_requested: bool,
    /// Latest outcome per item; `Retrying` until the item settles.
    pub results: BTreeMap<LocalIndex, Outcome>,
    pub exists_count: usize,
    pub missing_count: usize,
    pub notices: Vec<Notice>,
}

impl ReconciliationJob {
    pub fn idle(kind: JobKind) -> Self {
        Self {
            kind,
            phase: JobPhase::Idle,
            queue: ReconciliationQueue::default(),
            total: 0,
            processed: 0,
            current: None,
            started_at: None,
            finished_at: None,
            elapsed_ms: 0,
            cancel_requested: false,
            results: BTreeMap::new(),
            exists_count: 0,
            missing_count: 0,
            notices: Vec::new(),
        }
    }

    /// Fresh run over `items`. An empty batch finishes immediately.
    pub fn start(kind: JobKind, items: Vec<QueuedItem>, now: DateTime<Utc>) -> Self {
        let mut job = Self::idle(kind);
        job.total = items.len();
        job.queue = ReconciliationQueue::new(items);
        job.started_at = Some(now);
        job.phase = JobPhase::Running;
        info!(job = %kind, total = job.total, "job started");
        if job.queue.is_empty() {
            job.finish(now);
        }
        job
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, JobPhase::Running | JobPhase::Draining)
    }

    pub fn is_finished(&self) -> bool {
        self.phase == JobPhase::Finished
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed)
    }

    /// Ask the job to stop. Observed at the start of the next step.
    pub fn request_cancel(&mut self) {
        if self.is_active() {
            self.cancel_requested = true;
            self.phase = JobPhase::Draining;
            info!(job = %self.kind, processed = self.processed, "cancel requested");
        }
    }

    pub fn retry_count(&self, index: LocalIndex) -> u32 {
        self.queue.retry_count(index)
    }

    pub fn report(&self) -> String {
        build_report(&self.results, self.total, self.processed, self.remaining())
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            kind: self.kind,
            phase: self.phase,
            total: self.total,
            processed: self.processed,
            current: self.current,
            exists: self.exists_count,
            missing: self.missing_count,
            elapsed_ms: self.elapsed_ms,
        }
    }

    /// Common step prologue: observe cancellation, then take the next item.
    /// `None` means the job is (now) finished.
    pub(crate) fn begin_step(&mut self, now: DateTime<Utc>) -> Option<QueuedItem> {
        if self.phase != JobPhase::Running && self.phase != JobPhase::Draining {
            return None;
        }
        if self.cancel_requested {
            let dropped = self.queue.drain();
            info!(
                job = %self.kind,
                dropped = dropped.len(),
                processed = self.processed,
                "job cancelled"
            );
            self.finish(now);
            return None;
        }
        match self.queue.pop_front() {
            Some(item) => {
                self.current = Some(item.index);
                Some(item)
            }
            None => {
                self.finish(now);
                None
            }
        }
    }

    /// Record a terminal outcome for `index`.
    pub(crate) fn complete_item(&mut self, index: LocalIndex, outcome: Outcome, now: DateTime<Utc>) {
        self.results.insert(index, outcome);
        self.processed += 1;
        self.touch(now);
    }

    /// Record that `item` failed transiently and goes to the back of the queue.
    pub(crate) fn requeue_for_retry(&mut self, item: QueuedItem, now: DateTime<Utc>) -> u32 {
        let count = self.queue.bump_retry(item.index);
        self.results.insert(item.index, Outcome::Retrying);
        self.queue.requeue(item);
        self.touch(now);
        count
    }

    /// Step epilogue: finish when the queue ran dry, otherwise schedule.
    pub(crate) fn after_item(&mut self, now: DateTime<Utc>, delay: Duration) -> Tick {
        if self.queue.is_empty() {
            self.finish(now);
            Tick::Done
        } else {
            Tick::After(delay)
        }
    }

    /// Bulk-load failure: every queued item ends in error and the run stops.
    pub(crate) fn fail_all(&mut self, message: &str, now: DateTime<Utc>) -> Vec<LocalIndex> {
        let failed: Vec<LocalIndex> = self.queue.drain().into_iter().map(|i| i.index).collect();
        for &idx in &failed {
            self.results.insert(idx, Outcome::Error);
            self.processed += 1;
        }
        self.notices.push(Notice::error(None, message));
        self.finish(now);
        failed
    }

    pub(crate) fn notice(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if let Some(started) = self.started_at {
            self.elapsed_ms = (now - started).num_milliseconds().max(0);
        }
    }

    /// Freeze the clock. Later calls are no-ops.
    fn finish(&mut self, now: DateTime<Utc>) {
        if self.finished_at.is_some() {
            return;
        }
        self.touch(now);
        self.finished_at = Some(now);
        self.current = None;
        self.phase = JobPhase::Finished;
        info!(
            job = %self.kind,
            processed = self.processed,
            total = self.total,
            elapsed_ms = self.elapsed_ms,
            report = %self.report(),
            "job finished"
        );
    }
}
