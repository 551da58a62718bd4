//! Bounded retry with linear backoff for per-item remote writes.

use crate::config::ScheduleConfig;
use crate::job::{Notice, ReconciliationJob, Tick};
use crate::queue::QueuedItem;
use crate::session::{Session, StepEffects};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{error, warn};
use tradejournal_core::domain::{Outcome, RowStatus};
use tradejournal_core::remote::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_base: Duration,
    pub step_delay: Duration,
}

impl RetryPolicy {
    pub fn from_schedule(schedule: &ScheduleConfig) -> Self {
        Self {
            max_retries: schedule.max_retries,
            retry_base: Duration::from_millis(schedule.retry_base_ms),
            step_delay: schedule.step_delay(),
        }
    }

    /// Wait before retry number `retry` (1-based): `retry × retry_base`,
    /// stretched to whatever a rate limit asked for.
    pub fn backoff(&self, retry: u32, err: &RemoteError) -> Duration {
        let linear = self.retry_base.saturating_mul(retry);
        match err {
            RemoteError::RateLimited { retry_after_secs } => {
                linear.max(Duration::from_secs(*retry_after_secs))
            }
            _ => linear,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_schedule(&ScheduleConfig::default())
    }
}

/// Handle a failed remote call for `item`.
///
/// Retryable errors under the bound requeue the item with status `retrying`.
/// Anything else, or a retryable error past the bound, settles the item as
/// `error`.
pub(crate) fn retry_or_fail(
    job: &mut ReconciliationJob,
    session: &mut Session,
    item: QueuedItem,
    err: RemoteError,
    policy: &RetryPolicy,
    now: DateTime<Utc>,
) -> Tick {
    let index = item.index;
    let previous = job.queue.retry_count(index);

    if err.is_retryable() && previous < policy.max_retries {
        let retry = job.requeue_for_retry(item, now);
        session.apply(StepEffects::new(index).status(RowStatus::Retrying));
        let delay = policy.backoff(retry, &err);
        warn!(
            job = %job.kind,
            index,
            retry,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "remote call failed, retrying"
        );
        return Tick::After(delay);
    }

    let message = if err.is_retryable() {
        format!("gave up after {previous} retries: {err}")
    } else {
        err.to_string()
    };
    error!(job = %job.kind, index, error = %err, "item failed");
    session.apply(StepEffects::new(index).status(RowStatus::Error));
    job.notice(Notice::error(Some(index), message));
    job.complete_item(index, Outcome::Error, now);
    job.after_item(now, policy.step_delay)
}
