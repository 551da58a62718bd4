//! BDD tests for the reconciliation jobs.
//!
//! These tests drive Check, Insert and Update against the in-memory journal
//! with an explicit clock:
//! - Check classification and drift detection
//! - Insert creation, idempotence, relation failures and bounded retries
//! - Cancellation freezing the run
//! - Update convergence

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tradejournal_core::domain::{
    AggregatedSide, CollectionId, MetadataV2, Outcome, RowStatus, TitleKey, TradeMetadata,
    TradeRecord, TradeResult,
};
use tradejournal_core::fields::{Field, FieldValue};
use tradejournal_core::project;
use tradejournal_core::remote::InMemoryJournal;
use tradejournal_sync::{
    CollectionsConfig, JobKind, JobPhase, Reconciler, ScheduleConfig, SyncConfig, Tick,
};

// ── Fixtures ─────────────────────────────────────────────────────────

fn tickers() -> CollectionId {
    CollectionId::new("tickers")
}

fn days() -> CollectionId {
    CollectionId::new("days")
}

fn trades() -> CollectionId {
    CollectionId::new("trades")
}

fn config() -> SyncConfig {
    SyncConfig {
        collections: CollectionsConfig::new(tickers(), days(), trades()),
        schedule: ScheduleConfig::default(),
        ..SyncConfig::default()
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 10, 18, 0, 0).unwrap()
}

fn secs(n: i64) -> ChronoDuration {
    ChronoDuration::seconds(n)
}

fn aapl() -> TradeRecord {
    TradeRecord {
        id: Some(1),
        datetime: Some(Utc.with_ymd_and_hms(2024, 1, 10, 14, 30, 0).unwrap()),
        ticker: Some("AAPL".into()),
        aggregated_side: AggregatedSide::Long,
        result: TradeResult::Win,
        realized_pl: dec!(125.50),
        duration_secs: Some(600),
        metadata: Some(TradeMetadata::V2(MetadataV2 {
            rank: Some("A".into()),
            followed_plan: Some(true),
            ..MetadataV2::default()
        })),
    }
}

/// `n` distinct trades on 2024-01-10, one ticker each.
fn batch(n: usize) -> Vec<TradeRecord> {
    (0..n)
        .map(|i| TradeRecord {
            id: Some(i as i64),
            datetime: Some(
                Utc.with_ymd_and_hms(2024, 1, 10, 14, 0, 0).unwrap() + secs(i as i64 * 60),
            ),
            ticker: Some(format!("T{i}")),
            aggregated_side: AggregatedSide::Short,
            result: TradeResult::Lose,
            realized_pl: dec!(-3.25),
            duration_secs: None,
            metadata: None,
        })
        .collect()
}

/// A journal holding the relation pages every trade in `records` needs.
fn journal_for(records: &[TradeRecord]) -> Arc<InMemoryJournal> {
    let journal = Arc::new(InMemoryJournal::new());
    let mut tickers_seen = std::collections::HashSet::new();
    let mut days_seen = std::collections::HashSet::new();
    for r in records {
        if let Some(t) = r.ticker_key() {
            if tickers_seen.insert(t.clone()) {
                journal.add_dimension(&tickers(), &t);
            }
        }
        if let Some(d) = r.date_key() {
            if days_seen.insert(d.clone()) {
                journal.add_dimension(&days(), &d);
            }
        }
    }
    journal
}

fn seed_echo(journal: &InMemoryJournal, record: &TradeRecord) -> tradejournal_core::domain::RemoteId {
    let key = record.title_key().unwrap();
    journal.seed(&trades(), key.as_str(), project(record))
}

fn all(n: usize) -> Vec<usize> {
    (0..n).collect()
}

// ── Insert ───────────────────────────────────────────────────────────

#[test]
fn bdd_scenario_insert_creates_missing_trade_with_relations() {
    // GIVEN an AAPL trade at 2024-01-10T14:30:00Z and both relation pages
    let journal = journal_for(&[aapl()]);
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), vec![aapl()]);

    // WHEN Insert runs over it
    r.start_insert(&[0], t0());
    r.run_to_end(JobKind::Insert, t0());

    // THEN the trade is created and known to exist
    let job = r.job(JobKind::Insert);
    assert_eq!(job.results[&0], Outcome::Created);
    assert_eq!(r.session().status(0), RowStatus::Exists);

    // AND its remote id is recorded under the title key
    let key = TitleKey::from_title("AAPL@2024-01-10T14:30:00Z");
    let id = r.session().remote_id(&key).expect("remote id recorded");

    // AND the remote page links to the ticker and day pages
    let page = journal.record(id).unwrap();
    let relations = page.relations.unwrap();
    assert_eq!(journal.record(&relations.ticker).unwrap().title, "AAPL");
    assert_eq!(journal.record(&relations.date).unwrap().title, "2024-01-10");
    assert_eq!(
        page.fields[&Field::RealizedPl],
        FieldValue::Decimal(dec!(125.50))
    );
    assert_eq!(
        r.report(JobKind::Insert),
        "created: 1, skipped (exists): 0, errors: 0, retrying: 0 | remaining: 0"
    );
}

#[test]
fn bdd_scenario_missing_day_page_fails_without_retry() {
    // GIVEN the AAPL trade, a ticker page, but no day page for 2024-01-10
    let journal = Arc::new(InMemoryJournal::new());
    journal.add_dimension(&tickers(), "AAPL");
    journal.add_dimension(&days(), "2024-01-11");
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), vec![aapl()]);

    // WHEN Insert runs
    r.start_insert(&[0], t0());
    r.run_to_end(JobKind::Insert, t0());

    // THEN the item ends in error on the first attempt
    let job = r.job(JobKind::Insert);
    assert_eq!(job.results[&0], Outcome::Error);
    assert_eq!(job.retry_count(0), 0);
    assert_eq!(r.session().status(0), RowStatus::Error);

    // AND the message names the missing day
    assert!(job.notices.iter().any(|n| n.message.contains("2024-01-10")));

    // AND nothing was created
    assert_eq!(journal.calls().creates, 0);
}

#[test]
fn bdd_scenario_second_insert_is_idempotent() {
    // GIVEN three trades inserted once
    let records = batch(3);
    let journal = journal_for(&records);
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), records);
    r.start_insert(&all(3), t0());
    let later = r.run_to_end(JobKind::Insert, t0());
    assert_eq!(journal.calls().creates, 3);

    // WHEN Insert runs again over the same batch
    r.start_insert(&all(3), later);
    r.run_to_end(JobKind::Insert, later);

    // THEN every item is skipped as existing and nothing new is created
    let job = r.job(JobKind::Insert);
    assert!(job.results.values().all(|o| *o == Outcome::SkippedExists));
    assert_eq!(job.processed, 3);
    assert_eq!(journal.calls().creates, 3);
    assert_eq!(journal.records_in(&trades()).len(), 3);
}

#[test]
fn bdd_scenario_insert_skips_trade_created_since_check() {
    // GIVEN a Check that found the AAPL trade missing
    let journal = journal_for(&[aapl()]);
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), vec![aapl()]);
    r.start_check(&[0], t0());
    r.run_to_end(JobKind::Check, t0());
    assert_eq!(r.session().status(0), RowStatus::Missing);

    // AND someone creates the page before Insert runs
    let id = seed_echo(&journal, &aapl());

    // WHEN Insert runs
    r.start_insert(&[0], t0() + secs(10));
    r.run_to_end(JobKind::Insert, t0() + secs(10));

    // THEN the point re-check finds it and no duplicate is created
    assert_eq!(r.job(JobKind::Insert).results[&0], Outcome::SkippedExists);
    assert_eq!(r.session().remote_id(&aapl().title_key().unwrap()), Some(&id));
    assert_eq!(journal.calls().creates, 0);
}

#[test]
fn bdd_scenario_insert_remembers_presence_across_partial_checks() {
    // GIVEN two trades, only the first already in the journal
    let records = batch(2);
    let journal = journal_for(&records);
    seed_echo(&journal, &records[0]);
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), records);

    // AND a full Check followed by a Check of the second row only
    r.start_check(&all(2), t0());
    let later = r.run_to_end(JobKind::Check, t0());
    r.start_check(&[1], later);
    let later = r.run_to_end(JobKind::Check, later);
    assert_eq!(r.session().status(0), RowStatus::Exists);

    // WHEN Insert runs over every row
    r.start_insert(&all(2), later);
    r.run_to_end(JobKind::Insert, later);

    // THEN the row the first Check saw present is not queued again
    let job = r.job(JobKind::Insert);
    assert_eq!(job.total, 1);
    assert!(!job.results.contains_key(&0));
    assert_eq!(job.results[&1], Outcome::Created);
    assert_eq!(journal.records_in(&trades()).len(), 2);
}

#[test]
fn bdd_scenario_always_failing_create_stops_after_three_retries() {
    // GIVEN a create that always fails with a transport error
    let journal = journal_for(&[aapl()]);
    journal.always_fail_creates("AAPL@2024-01-10T14:30:00Z");
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), vec![aapl()]);
    assert_eq!(r.start_insert(&[0], t0()), Tick::After(Duration::ZERO));

    // WHEN the host steps the job, honouring each tick
    let mut now = t0();
    let mut ticks = Vec::new();
    loop {
        let tick = r.step(JobKind::Insert, now);
        ticks.push(tick);
        match tick {
            Tick::After(d) => {
                // Still pending while retrying.
                assert_eq!(r.job(JobKind::Insert).processed, 0);
                assert_eq!(r.session().status(0), RowStatus::Retrying);
                now += ChronoDuration::from_std(d).unwrap();
            }
            Tick::Done => break,
        }
    }

    // THEN the backoff grows linearly, then the item settles as error
    assert_eq!(
        ticks,
        vec![
            Tick::After(Duration::from_millis(1_000)),
            Tick::After(Duration::from_millis(2_000)),
            Tick::After(Duration::from_millis(3_000)),
            Tick::Done,
        ]
    );
    let job = r.job(JobKind::Insert);
    assert_eq!(job.retry_count(0), 3);
    assert_eq!(job.processed, 1);
    assert_eq!(job.results[&0], Outcome::Error);
    assert_eq!(r.session().status(0), RowStatus::Error);
    assert_eq!(journal.calls().creates, 4);
    assert_eq!(job.elapsed_ms, 6_000);
}

#[test]
fn bdd_scenario_transient_failure_recovers() {
    // GIVEN a create that fails twice, then succeeds
    let journal = journal_for(&[aapl()]);
    journal.fail_creates("AAPL@2024-01-10T14:30:00Z", 2);
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), vec![aapl()]);

    // WHEN Insert runs to the end
    r.start_insert(&[0], t0());
    r.run_to_end(JobKind::Insert, t0());

    // THEN the trade is created after two retries
    let job = r.job(JobKind::Insert);
    assert_eq!(job.results[&0], Outcome::Created);
    assert_eq!(job.retry_count(0), 2);
    assert_eq!(journal.records_in(&trades()).len(), 1);
}

#[test]
fn bdd_scenario_absurd_duration_is_created_without_close_time() {
    // GIVEN a trade whose holding duration overflows any datetime
    let trade = TradeRecord {
        duration_secs: Some(9_000_000_000_000_000),
        ..aapl()
    };
    let journal = journal_for(std::slice::from_ref(&trade));
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), vec![trade]);

    // WHEN Insert runs over it
    r.start_insert(&[0], t0());
    r.run_to_end(JobKind::Insert, t0());

    // THEN the trade is still created, just without a close timeslot
    assert_eq!(r.job(JobKind::Insert).results[&0], Outcome::Created);
    let key = TitleKey::from_title("AAPL@2024-01-10T14:30:00Z");
    let id = r.session().remote_id(&key).expect("remote id recorded");
    let stored = journal.record(id).expect("page exists");
    assert!(!stored.fields.contains_key(&Field::CloseTimeslot));
}

#[test]
fn bdd_scenario_rejected_create_is_not_retried() {
    // GIVEN a create the remote rejects as invalid
    let journal = journal_for(&[aapl()]);
    journal.reject_creates("AAPL@2024-01-10T14:30:00Z");
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), vec![aapl()]);

    // WHEN Insert runs
    r.start_insert(&[0], t0());
    r.run_to_end(JobKind::Insert, t0());

    // THEN it fails at once
    let job = r.job(JobKind::Insert);
    assert_eq!(job.results[&0], Outcome::Error);
    assert_eq!(job.retry_count(0), 0);
    assert_eq!(journal.calls().creates, 1);
}

#[test]
fn bdd_scenario_retried_item_goes_behind_the_rest() {
    // GIVEN two trades, the first of which fails once
    let records = batch(2);
    let journal = journal_for(&records);
    let first = records[0].title_key().unwrap();
    journal.fail_creates(first.as_str(), 1);
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), records);
    r.start_insert(&all(2), t0());

    // WHEN the first step fails
    let tick = r.step(JobKind::Insert, t0());

    // THEN the item is requeued at the back and marked retrying
    assert_eq!(tick, Tick::After(Duration::from_millis(1_000)));
    let job = r.job(JobKind::Insert);
    assert_eq!(job.queue.indices().collect::<Vec<_>>(), vec![1, 0]);
    assert_eq!(
        r.report(JobKind::Insert),
        "created: 0, skipped (exists): 0, errors: 0, retrying: 1 | remaining: 2"
    );

    // AND the run completes with both created
    r.run_to_end(JobKind::Insert, t0() + secs(1));
    assert_eq!(
        r.report(JobKind::Insert),
        "created: 2, skipped (exists): 0, errors: 0, retrying: 0 | remaining: 0"
    );
}

#[test]
fn bdd_scenario_one_relation_listing_down_is_a_warning() {
    // GIVEN the ticker listing fails but the day listing works
    let journal = journal_for(&[aapl()]);
    journal.fail_queries(&tickers());
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), vec![aapl()]);

    // WHEN Insert starts
    let tick = r.start_insert(&[0], t0());

    // THEN the run goes ahead with a warning
    assert_eq!(tick, Tick::After(Duration::ZERO));
    assert!(r
        .job(JobKind::Insert)
        .notices
        .iter()
        .any(|n| n.message.contains("ticker pages")));

    // AND the trade fails for its missing ticker page, without retry
    r.run_to_end(JobKind::Insert, t0());
    let job = r.job(JobKind::Insert);
    assert_eq!(job.results[&0], Outcome::Error);
    assert_eq!(job.retry_count(0), 0);
    assert!(job.notices.iter().any(|n| n.message.contains("AAPL")));
}

#[test]
fn bdd_scenario_both_relation_listings_down_fail_the_run() {
    // GIVEN both relation listings fail
    let records = batch(4);
    let journal = journal_for(&records);
    journal.fail_queries(&tickers());
    journal.fail_queries(&days());
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), records);

    // WHEN Insert starts
    let tick = r.start_insert(&all(4), t0());

    // THEN the run ends with every item in error
    assert_eq!(tick, Tick::Done);
    let job = r.job(JobKind::Insert);
    assert!(job.is_finished());
    assert_eq!(job.results.len(), 4);
    assert!(job.results.values().all(|o| *o == Outcome::Error));
    assert!((0..4).all(|i| r.session().status(i) == RowStatus::Error));
    assert_eq!(journal.calls().creates, 0);
}

// ── Cancellation ─────────────────────────────────────────────────────

#[test]
fn bdd_scenario_cancel_freezes_counts_and_clock() {
    // GIVEN an Insert over five trades
    let records = batch(5);
    let journal = journal_for(&records);
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), records);
    r.start_insert(&all(5), t0());

    // AND two items already processed
    r.step(JobKind::Insert, t0());
    r.step(JobKind::Insert, t0() + secs(1));
    assert_eq!(r.job(JobKind::Insert).processed, 2);

    // WHEN the job is cancelled and the next tick fires
    r.cancel(JobKind::Insert);
    assert_eq!(r.job(JobKind::Insert).phase, JobPhase::Draining);
    let tick = r.step(JobKind::Insert, t0() + secs(2));

    // THEN the run is finished with the rest left undone
    assert_eq!(tick, Tick::Done);
    let job = r.job(JobKind::Insert);
    assert_eq!(job.phase, JobPhase::Finished);
    assert_eq!(job.remaining(), 3);
    assert_eq!(
        r.report(JobKind::Insert),
        "created: 2, skipped (exists): 0, errors: 0, retrying: 0 | remaining: 3"
    );
    assert_eq!(journal.calls().creates, 2);

    // AND later ticks change nothing
    let finished_at = job.finished_at;
    let elapsed = job.elapsed_ms;
    assert_eq!(r.step(JobKind::Insert, t0() + secs(60)), Tick::Done);
    let job = r.job(JobKind::Insert);
    assert_eq!(job.finished_at, finished_at);
    assert_eq!(job.finished_at, Some(t0() + secs(2)));
    assert_eq!(job.elapsed_ms, elapsed);
    assert_eq!(journal.calls().creates, 2);
}

// ── Check ────────────────────────────────────────────────────────────

#[test]
fn bdd_scenario_check_counts_existing_and_missing() {
    // GIVEN 50 local trades, 30 of which exist remotely
    let records = batch(50);
    let journal = Arc::new(InMemoryJournal::new());
    for r in &records[..30] {
        seed_echo(&journal, r);
    }
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), records);

    // WHEN Check runs over all of them
    r.start_check(&all(50), t0());
    r.run_to_end(JobKind::Check, t0());

    // THEN 30 exist, 20 are missing, all 50 processed
    let job = r.job(JobKind::Check);
    assert_eq!(job.exists_count, 30);
    assert_eq!(job.missing_count, 20);
    assert_eq!(job.processed, 50);
    assert!(job.is_finished());
    assert_eq!(r.session().status(0), RowStatus::Exists);
    assert_eq!(r.session().status(49), RowStatus::Missing);

    // AND the existence index came from one bulk query
    assert_eq!(journal.calls().queries, 1);
    assert_eq!(journal.calls().retrieves, 30);
}

#[test]
fn bdd_scenario_check_load_failure_marks_everything_error() {
    // GIVEN the trade collection cannot be listed
    let records = batch(3);
    let journal = Arc::new(InMemoryJournal::new());
    journal.fail_queries(&trades());
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), records);

    // WHEN Check starts
    let tick = r.start_check(&all(3), t0());

    // THEN the run ends immediately with every item in error
    assert_eq!(tick, Tick::Done);
    let job = r.job(JobKind::Check);
    assert!(job.is_finished());
    assert!(job.results.values().all(|o| *o == Outcome::Error));
    assert_eq!(job.results.len(), 3);
    assert!(job
        .notices
        .iter()
        .any(|n| n.message.contains("could not load existing trades")));
    assert!((0..3).all(|i| r.session().status(i) == RowStatus::Error));
}

#[test]
fn bdd_scenario_check_records_drift() {
    // GIVEN the AAPL page exists remotely with a different P/L and rank
    let journal = Arc::new(InMemoryJournal::new());
    let id = seed_echo(&journal, &aapl());
    journal.set_field(&id, Field::RealizedPl, FieldValue::Decimal(dec!(120)));
    journal.set_field(&id, Field::Rank, FieldValue::Select("C".into()));
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), vec![aapl()]);

    // WHEN Check runs
    r.start_check(&[0], t0());
    r.run_to_end(JobKind::Check, t0());

    // THEN the row exists and its diff names both fields
    assert_eq!(r.session().status(0), RowStatus::Exists);
    let diff = r.session().diff(0).expect("diff stored");
    assert_eq!(diff.len(), 2);
    assert_eq!(diff[&Field::RealizedPl].expected, FieldValue::Decimal(dec!(125.50)));
    assert_eq!(diff[&Field::RealizedPl].actual, FieldValue::Decimal(dec!(120)));
    assert!(diff.contains_key(&Field::Rank));
}

#[test]
fn bdd_scenario_check_treats_vanished_page_as_missing() {
    // GIVEN the page is indexed, then deleted before its step runs
    let journal = Arc::new(InMemoryJournal::new());
    let id = seed_echo(&journal, &aapl());
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), vec![aapl()]);
    r.start_check(&[0], t0());
    journal.delete(&id);

    // WHEN the step runs
    r.run_to_end(JobKind::Check, t0());

    // THEN the row is missing, not an error
    let job = r.job(JobKind::Check);
    assert_eq!(job.results[&0], Outcome::Missing);
    assert_eq!(job.missing_count, 1);
    assert_eq!(job.exists_count, 0);
    assert!(r.session().remote_id(&aapl().title_key().unwrap()).is_none());
}

#[test]
fn bdd_scenario_check_marks_unkeyed_trade_missing() {
    // GIVEN a trade without a datetime
    let mut trade = aapl();
    trade.datetime = None;
    let journal = Arc::new(InMemoryJournal::new());
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), vec![trade]);

    // WHEN Check runs
    r.start_check(&[0], t0());
    r.run_to_end(JobKind::Check, t0());

    // THEN it is missing and no per-item call was made
    assert_eq!(r.job(JobKind::Check).results[&0], Outcome::Missing);
    assert_eq!(journal.calls().retrieves, 0);
}

// ── Update ───────────────────────────────────────────────────────────

#[test]
fn bdd_scenario_update_converges_drifted_page() {
    // GIVEN a Check that found the AAPL page drifted
    let journal = Arc::new(InMemoryJournal::new());
    let id = seed_echo(&journal, &aapl());
    journal.set_field(&id, Field::RealizedPl, FieldValue::Decimal(dec!(120)));
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), vec![aapl()]);
    r.start_check(&[0], t0());
    let later = r.run_to_end(JobKind::Check, t0());
    assert!(r.session().has_diff(0));

    // WHEN Update runs over the selection
    r.start_update(&[0], later);
    r.run_to_end(JobKind::Update, later);

    // THEN the remote echoes the local values and the diff is gone
    assert_eq!(r.job(JobKind::Update).results[&0], Outcome::Updated);
    assert!(r.session().diff(0).is_none());
    assert_eq!(
        journal.record(&id).unwrap().fields[&Field::RealizedPl],
        FieldValue::Decimal(dec!(125.50))
    );

    // AND a fresh Check agrees
    r.start_check(&[0], later + secs(5));
    r.run_to_end(JobKind::Check, later + secs(5));
    assert!(r.session().diff(0).is_none());
}

#[test]
fn bdd_scenario_update_keeps_diff_when_remote_drops_a_field() {
    // GIVEN a drifted comment the remote refuses to change
    let mut trade = aapl();
    if let Some(TradeMetadata::V2(m)) = trade.metadata.as_mut() {
        m.comment = Some("patient entry".into());
    }
    let journal = Arc::new(InMemoryJournal::new());
    let id = seed_echo(&journal, &trade);
    journal.set_field(&id, Field::Comment, FieldValue::Text("rushed".into()));
    journal.freeze_field(Field::Comment);
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), vec![trade]);
    r.start_check(&[0], t0());
    let later = r.run_to_end(JobKind::Check, t0());

    // WHEN Update runs
    r.start_update(&[0], later);
    r.run_to_end(JobKind::Update, later);

    // THEN the item is updated but the re-fetched state still differs
    assert_eq!(r.job(JobKind::Update).results[&0], Outcome::Updated);
    let diff = r.session().diff(0).expect("diff kept");
    assert!(diff.contains_key(&Field::Comment));
}

#[test]
fn bdd_scenario_update_ignores_rows_without_drift() {
    // GIVEN a Check that found everything in sync
    let records = batch(3);
    let journal = Arc::new(InMemoryJournal::new());
    for rec in &records {
        seed_echo(&journal, rec);
    }
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), records);
    r.start_check(&all(3), t0());
    let later = r.run_to_end(JobKind::Check, t0());

    // WHEN Update starts
    let tick = r.start_update(&all(3), later);

    // THEN there is nothing to do
    assert_eq!(tick, Tick::Done);
    assert_eq!(r.job(JobKind::Update).total, 0);
    assert_eq!(journal.calls().updates, 0);
}

// ── Full sync ────────────────────────────────────────────────────────

#[test]
fn bdd_scenario_check_insert_check_round_trip() {
    // GIVEN four trades, one already in the journal
    let records = batch(4);
    let journal = journal_for(&records);
    seed_echo(&journal, &records[2]);
    let mut r = Reconciler::new(Arc::clone(&journal), &config(), records);

    // WHEN Check then Insert run over everything
    r.start_check(&all(4), t0());
    let t1 = r.run_to_end(JobKind::Check, t0());
    r.start_insert(&all(4), t1);
    let t2 = r.run_to_end(JobKind::Insert, t1);

    // THEN only the three missing trades were queued and created
    assert_eq!(r.job(JobKind::Insert).total, 3);
    assert_eq!(
        r.report(JobKind::Insert),
        "created: 3, skipped (exists): 0, errors: 0, retrying: 0 | remaining: 0"
    );

    // AND a second Check finds all four
    r.start_check(&all(4), t2);
    r.run_to_end(JobKind::Check, t2);
    assert_eq!(r.job(JobKind::Check).exists_count, 4);
    assert_eq!(r.job(JobKind::Check).missing_count, 0);
}
