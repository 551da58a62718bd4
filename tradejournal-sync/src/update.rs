//! Update: push the local projection onto drifted remote pages.

use crate::job::{Notice, ReconciliationJob, Tick};
use crate::retry::{retry_or_fail, RetryPolicy};
use crate::session::{Session, StepEffects};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};
use tradejournal_core::domain::{Outcome, RowStatus};
use tradejournal_core::remote::JournalClient;
use tradejournal_core::{diff, project, FieldDiff};

pub fn step(
    job: &mut ReconciliationJob,
    client: &dyn JournalClient,
    session: &mut Session,
    policy: &RetryPolicy,
    now: DateTime<Utc>,
) -> Tick {
    let Some(item) = job.begin_step(now) else {
        return Tick::Done;
    };
    let idx = item.index;

    let key = item.record.title_key();
    let Some((key, remote_id)) = key.and_then(|k| session.remote_id(&k).cloned().map(|id| (k, id)))
    else {
        debug!(index = idx, "no known remote page, skipped");
        job.complete_item(idx, Outcome::Skipped, now);
        return job.after_item(now, Duration::ZERO);
    };

    match client.update_record(&remote_id, &project(&item.record)) {
        Ok(stored) => {
            let remaining = diff(&item.record, &stored);
            if remaining.is_empty() {
                info!(index = idx, title = %key, id = %remote_id, "updated");
            } else {
                warn!(
                    index = idx,
                    title = %key,
                    fields = remaining.len(),
                    "updated, but remote still differs"
                );
            }
            session.apply(StepEffects::new(idx).status(RowStatus::Exists).diff(remaining));
            job.complete_item(idx, Outcome::Updated, now);
            job.after_item(now, policy.step_delay)
        }
        Err(e) if e.is_not_found() => {
            warn!(index = idx, title = %key, id = %remote_id, "remote page is gone");
            session.apply(
                StepEffects::new(idx)
                    .status(RowStatus::Missing)
                    .diff(FieldDiff::new())
                    .unlink(key.clone()),
            );
            job.notice(Notice::warning(
                Some(idx),
                format!("remote page for {key} no longer exists; run check and insert"),
            ));
            job.complete_item(idx, Outcome::Error, now);
            job.after_item(now, policy.step_delay)
        }
        Err(e) => retry_or_fail(job, session, item, e, policy, now),
    }
}
