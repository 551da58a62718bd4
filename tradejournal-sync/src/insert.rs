//! Insert: create missing trades remotely, linked to their ticker and day
//! pages, with a point re-check right before each create.

use crate::config::CollectionsConfig;
use crate::job::{Notice, ReconciliationJob, Tick};
use crate::retry::{retry_or_fail, RetryPolicy};
use crate::session::{Session, StepEffects};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use tradejournal_core::domain::{LocalIndex, Outcome, RemoteId, RowStatus, TitleKey};
use tradejournal_core::index::RelationCache;
use tradejournal_core::remote::{Filter, JournalClient};
use tradejournal_core::{project, FieldDiff};

pub struct InsertContext<'a> {
    pub client: &'a dyn JournalClient,
    pub relations: &'a RelationCache,
    pub collections: &'a CollectionsConfig,
    pub policy: &'a RetryPolicy,
}

pub fn step(
    job: &mut ReconciliationJob,
    ctx: &InsertContext<'_>,
    session: &mut Session,
    now: DateTime<Utc>,
) -> Tick {
    let Some(item) = job.begin_step(now) else {
        return Tick::Done;
    };
    let idx = item.index;

    // Configuration problems fail the item at once.
    let version = item.record.metadata_version();
    let Some(collection) = ctx.collections.trade_collection(version) else {
        let message = format!(
            "no trade collection configured for metadata version {}",
            version.map_or_else(|| "latest".to_string(), |v| v.to_string())
        );
        return fail_without_retry(job, session, idx, message, ctx.policy, now);
    };
    let relation_ids = match ctx.relations.resolve(&item.record) {
        Ok(ids) => ids,
        Err(missing) => {
            return fail_without_retry(job, session, idx, missing.to_string(), ctx.policy, now);
        }
    };
    let Some(key) = item.record.title_key() else {
        return fail_without_retry(
            job,
            session,
            idx,
            "trade has no ticker or datetime".to_string(),
            ctx.policy,
            now,
        );
    };

    // Someone may have created it since the last check.
    match ctx
        .client
        .query_by_filter(collection, &Filter::TitleEquals(key.to_string()))
    {
        Ok(found) => {
            if let Some(existing) = found.into_iter().next() {
                info!(index = idx, title = %key, id = %existing.id, "already exists, skipped");
                session.apply(
                    StepEffects::new(idx)
                        .status(RowStatus::Exists)
                        .link(key, existing.id),
                );
                job.complete_item(idx, Outcome::SkippedExists, now);
                return job.after_item(now, ctx.policy.step_delay);
            }
        }
        Err(e) => return retry_or_fail(job, session, item, e, ctx.policy, now),
    }

    match ctx
        .client
        .create_record(collection, &relation_ids, &project(&item.record))
    {
        Ok(created) => {
            info!(index = idx, title = %key, id = %created.id, "created");
            session.apply(created_effects(idx, key, created.id));
            job.complete_item(idx, Outcome::Created, now);
            job.after_item(now, ctx.policy.step_delay)
        }
        Err(e) => retry_or_fail(job, session, item, e, ctx.policy, now),
    }
}

fn created_effects(idx: LocalIndex, key: TitleKey, id: RemoteId) -> StepEffects {
    // A fresh page carries exactly the local projection.
    StepEffects::new(idx)
        .status(RowStatus::Exists)
        .diff(FieldDiff::new())
        .link(key, id)
}

fn fail_without_retry(
    job: &mut ReconciliationJob,
    session: &mut Session,
    idx: LocalIndex,
    message: String,
    policy: &RetryPolicy,
    now: DateTime<Utc>,
) -> Tick {
    warn!(index = idx, reason = %message, "cannot insert");
    session.apply(StepEffects::new(idx).status(RowStatus::Error));
    job.notice(Notice::warning(Some(idx), message));
    job.complete_item(idx, Outcome::Error, now);
    job.after_item(now, policy.step_delay)
}
