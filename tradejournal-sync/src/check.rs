//! Check: classify each local trade as present or absent remotely, and
//! record field drift for the present ones.

use crate::job::{Notice, ReconciliationJob, Tick};
use crate::session::{Session, StepEffects};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, warn};
use tradejournal_core::domain::{Outcome, RowStatus};
use tradejournal_core::index::ExistenceIndex;
use tradejournal_core::remote::JournalClient;
use tradejournal_core::{diff, FieldDiff};

/// Process one queued item. Check re-enters without delay: the only remote
/// call per item is a single fetch of an already-known page.
pub fn step(
    job: &mut ReconciliationJob,
    client: &dyn JournalClient,
    session: &mut Session,
    index: &ExistenceIndex,
    now: DateTime<Utc>,
) -> Tick {
    let Some(item) = job.begin_step(now) else {
        return Tick::Done;
    };
    let idx = item.index;

    let Some(key) = item.record.title_key() else {
        debug!(index = idx, "no ticker or datetime, cannot match");
        session.apply(StepEffects::new(idx).status(RowStatus::Missing).confirmed(false));
        job.missing_count += 1;
        job.complete_item(idx, Outcome::Missing, now);
        return job.after_item(now, Duration::ZERO);
    };

    let Some(remote_id) = index.get(&key) else {
        session.apply(StepEffects::new(idx).status(RowStatus::Missing).confirmed(false));
        job.missing_count += 1;
        job.complete_item(idx, Outcome::Missing, now);
        return job.after_item(now, Duration::ZERO);
    };

    let (effects, outcome) = match client.retrieve_record(remote_id) {
        Ok(remote) => {
            let d = diff(&item.record, &remote);
            if !d.is_empty() {
                debug!(index = idx, title = %key, fields = d.len(), "remote drifted");
            }
            job.exists_count += 1;
            (
                StepEffects::new(idx)
                    .status(RowStatus::Exists)
                    .confirmed(true)
                    .diff(d)
                    .link(key, remote.id),
                Outcome::Exists,
            )
        }
        Err(e) if e.is_not_found() => {
            debug!(index = idx, title = %key, "indexed page is gone");
            job.missing_count += 1;
            (
                StepEffects::new(idx)
                    .status(RowStatus::Missing)
                    .confirmed(false)
                    .diff(FieldDiff::new())
                    .unlink(key),
                Outcome::Missing,
            )
        }
        Err(e) => {
            warn!(index = idx, title = %key, error = %e, "could not fetch remote page");
            job.notice(Notice::warning(
                Some(idx),
                format!("could not fetch remote page for {key}: {e}"),
            ));
            (
                StepEffects::new(idx).status(RowStatus::Error).confirmed(false),
                Outcome::Error,
            )
        }
    };

    session.apply(effects);
    job.complete_item(idx, outcome, now);
    job.after_item(now, Duration::ZERO)
}
