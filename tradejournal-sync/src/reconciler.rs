//! Reconciler: owns the client, the session and one job slot per kind.
//!
//! `start_*` loads whatever bulk index the job needs and queues the batch;
//! `step` advances one job by one item. Neither sleeps: the returned
//! [`Tick`] tells the host when to call again.

use crate::check;
use crate::config::{CollectionsConfig, SyncConfig};
use crate::insert::{self, InsertContext};
use crate::job::{JobKind, Notice, ReconciliationJob, Tick};
use crate::queue::QueuedItem;
use crate::retry::RetryPolicy;
use crate::session::Session;
use crate::update;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;
use tracing::{error, info, warn};
use tradejournal_core::domain::{CollectionId, LocalIndex, RowStatus, TradeRecord};
use tradejournal_core::index::{ExistenceIndex, RelationCache};
use tradejournal_core::remote::JournalClient;

pub struct Reconciler<C> {
    client: C,
    collections: CollectionsConfig,
    policy: RetryPolicy,
    session: Session,
    check: ReconciliationJob,
    insert: ReconciliationJob,
    update: ReconciliationJob,
    existence: ExistenceIndex,
    relations: RelationCache,
}

impl<C: JournalClient> Reconciler<C> {
    pub fn new(client: C, config: &SyncConfig, records: Vec<TradeRecord>) -> Self {
        Self {
            client,
            collections: config.collections.clone(),
            policy: RetryPolicy::from_schedule(&config.schedule),
            session: Session::new(records),
            check: ReconciliationJob::idle(JobKind::Check),
            insert: ReconciliationJob::idle(JobKind::Insert),
            update: ReconciliationJob::idle(JobKind::Update),
            existence: ExistenceIndex::default(),
            relations: RelationCache::default(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn job(&self, kind: JobKind) -> &ReconciliationJob {
        match kind {
            JobKind::Check => &self.check,
            JobKind::Insert => &self.insert,
            JobKind::Update => &self.update,
        }
    }

    fn job_mut(&mut self, kind: JobKind) -> &mut ReconciliationJob {
        match kind {
            JobKind::Check => &mut self.check,
            JobKind::Insert => &mut self.insert,
            JobKind::Update => &mut self.update,
        }
    }

    /// Every local row, in order.
    pub fn all_indices(&self) -> Vec<LocalIndex> {
        (0..self.session.len()).collect()
    }

    pub fn report(&self, kind: JobKind) -> String {
        self.job(kind).report()
    }

    /// Queue items for `selection`, dropping duplicates and unknown rows.
    fn queue_items(
        &self,
        kind: JobKind,
        selection: &[LocalIndex],
        keep: impl Fn(LocalIndex) -> bool,
    ) -> Vec<QueuedItem> {
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let mut out_of_range = Vec::new();
        for &idx in selection {
            if !seen.insert(idx) {
                continue;
            }
            match self.session.record(idx) {
                Some(record) if keep(idx) => {
                    items.push(QueuedItem::new(idx, record.clone()));
                }
                Some(_) => {}
                None => out_of_range.push(idx),
            }
        }
        if !out_of_range.is_empty() {
            warn!(job = %kind, ?out_of_range, "selection names rows that do not exist");
        }
        items
    }

    fn start_job(&mut self, kind: JobKind, items: Vec<QueuedItem>, now: DateTime<Utc>) -> Tick {
        let slot = self.job_mut(kind);
        if slot.is_active() {
            warn!(job = %kind, "restarting a job that was still running");
        }
        *slot = ReconciliationJob::start(kind, items, now);
        if slot.is_finished() {
            Tick::Done
        } else {
            Tick::After(Duration::ZERO)
        }
    }

    /// A bulk index could not be loaded: the whole batch fails.
    fn fail_run(&mut self, kind: JobKind, message: String, now: DateTime<Utc>) -> Tick {
        error!(job = %kind, %message, "bulk load failed, run aborted");
        let failed = self.job_mut(kind).fail_all(&message, now);
        for idx in failed {
            self.session.set_status(idx, RowStatus::Error);
        }
        Tick::Done
    }

    /// Start a Check over `selection`.
    pub fn start_check(&mut self, selection: &[LocalIndex], now: DateTime<Utc>) -> Tick {
        let items = self.queue_items(JobKind::Check, selection, |_| true);
        let mut collections: BTreeSet<CollectionId> = BTreeSet::new();
        let mut unconfigured: BTreeSet<u32> = BTreeSet::new();
        for item in &items {
            let version = item.record.metadata_version();
            match self.collections.trade_collection(version) {
                Some(c) => {
                    collections.insert(c.clone());
                }
                None => {
                    unconfigured.extend(version);
                }
            }
        }

        let tick = self.start_job(JobKind::Check, items, now);
        for version in unconfigured {
            self.check.notice(Notice::warning(
                None,
                format!("no trade collection configured for metadata version {version}"),
            ));
        }
        if tick.is_done() {
            return tick;
        }

        match ExistenceIndex::load_all(&self.client, &collections) {
            Ok(index) => {
                info!(collections = collections.len(), entries = index.len(), "existence index ready");
                self.existence = index;
                tick
            }
            Err(e) => {
                self.existence = ExistenceIndex::default();
                self.fail_run(
                    JobKind::Check,
                    format!("could not load existing trades from the remote journal: {e}"),
                    now,
                )
            }
        }
    }

    /// Start an Insert over `selection`. Rows a Check saw present, and that
    /// are still `exists`, are left out; everything else is re-verified
    /// before creating.
    pub fn start_insert(&mut self, selection: &[LocalIndex], now: DateTime<Utc>) -> Tick {
        let session = &self.session;
        let items = self.queue_items(JobKind::Insert, selection, |idx| {
            !session.is_confirmed_present(idx)
        });
        let tick = self.start_job(JobKind::Insert, items, now);
        if tick.is_done() {
            return tick;
        }

        match RelationCache::load(&self.client, &self.collections.tickers, &self.collections.dates)
        {
            Ok(cache) => {
                for warning in cache.warnings() {
                    self.insert.notice(Notice::warning(None, warning.clone()));
                }
                self.relations = cache;
                tick
            }
            Err(e) => {
                self.relations = RelationCache::default();
                self.fail_run(
                    JobKind::Insert,
                    format!("could not load ticker and day pages from the remote journal: {e}"),
                    now,
                )
            }
        }
    }

    /// Start an Update over the rows of `selection` that have drifted.
    pub fn start_update(&mut self, selection: &[LocalIndex], now: DateTime<Utc>) -> Tick {
        let session = &self.session;
        let items = self.queue_items(JobKind::Update, selection, |idx| session.has_diff(idx));
        self.start_job(JobKind::Update, items, now)
    }

    pub fn start(&mut self, kind: JobKind, selection: &[LocalIndex], now: DateTime<Utc>) -> Tick {
        match kind {
            JobKind::Check => self.start_check(selection, now),
            JobKind::Insert => self.start_insert(selection, now),
            JobKind::Update => self.start_update(selection, now),
        }
    }

    /// Advance `kind` by one item.
    pub fn step(&mut self, kind: JobKind, now: DateTime<Utc>) -> Tick {
        match kind {
            JobKind::Check => check::step(
                &mut self.check,
                &self.client,
                &mut self.session,
                &self.existence,
                now,
            ),
            JobKind::Insert => {
                let ctx = InsertContext {
                    client: &self.client,
                    relations: &self.relations,
                    collections: &self.collections,
                    policy: &self.policy,
                };
                insert::step(&mut self.insert, &ctx, &mut self.session, now)
            }
            JobKind::Update => update::step(
                &mut self.update,
                &self.client,
                &mut self.session,
                &self.policy,
                now,
            ),
        }
    }

    pub fn cancel(&mut self, kind: JobKind) {
        self.job_mut(kind).request_cancel();
    }

    /// Step `kind` until it finishes, advancing a virtual clock by each
    /// tick instead of sleeping. Returns the clock at the end.
    pub fn run_to_end(&mut self, kind: JobKind, mut now: DateTime<Utc>) -> DateTime<Utc> {
        loop {
            match self.step(kind, now) {
                Tick::Done => return now,
                Tick::After(delay) => {
                    now += chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                }
            }
        }
    }
}
