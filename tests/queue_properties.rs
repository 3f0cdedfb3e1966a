use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tempfile::TempDir;

use urlqueue::config::{HumanDuration, QueueConfig};
use urlqueue::observability::Metrics;
use urlqueue::queue::{
    BackoffPolicy, ClaimRequest, ManualClock, QueuePolicy, ReportOutcome, UrlResult, WorkQueue,
};
use urlqueue::store::{ItemStatus, WorkStore};

struct Fixture {
    queue: WorkQueue,
    clock: Arc<ManualClock>,
    _dir: TempDir,
}

fn fixture_with(config: QueueConfig) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = WorkStore::open(dir.path().join("db")).unwrap();
    let clock = Arc::new(ManualClock::new(
        DateTime::parse_from_rfc3339("2025-06-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc),
    ));
    let queue = WorkQueue::with_clock(
        store,
        QueuePolicy::from(&config),
        Arc::new(Metrics::new()),
        clock.clone(),
    );
    Fixture {
        queue,
        clock,
        _dir: dir,
    }
}

fn fixture() -> Fixture {
    fixture_with(QueueConfig::default())
}

fn ingest(queue: &WorkQueue, supplier: &str, count: usize) -> Vec<u64> {
    let urls: Vec<String> = (0..count)
        .map(|n| format!("https://{}.example/p/{}", supplier, n))
        .collect();
    let summary = queue.ingest(supplier, None, None, &urls).unwrap();
    assert_eq!(summary.inserted, count);

    let page = queue
        .list(&urlqueue::queue::ListFilter {
            supplier_name: Some(supplier.to_string()),
            per_page: Some(100),
            ..Default::default()
        })
        .unwrap();
    let mut ids: Vec<u64> = page.items.iter().map(|item| item.id).collect();
    ids.sort_unstable();
    ids
}

fn claim(queue: &WorkQueue, supplier: &str, batch: usize, worker: &str) -> Vec<u64> {
    queue
        .claim(&ClaimRequest::new(supplier, batch, worker))
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect()
}

fn report(queue: &WorkQueue, id: u64, outcome: ReportOutcome) {
    let summary = queue.report(&[UrlResult::new(id, outcome)]).unwrap();
    assert_eq!(summary.errors, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_never_share_an_item() {
    let fx = fixture();
    let ids = ingest(&fx.queue, "acme", 60);

    let mut handles = Vec::new();
    for worker in 0..8 {
        let queue = fx.queue.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let mut mine = Vec::new();
            loop {
                let batch = claim(&queue, "acme", 3, &format!("worker-{worker}"));
                if batch.is_empty() {
                    break;
                }
                mine.extend(batch);
            }
            mine
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(seen.insert(id), "item {id} leased twice");
            total += 1;
        }
    }
    assert_eq!(total, ids.len());
}

#[test]
fn test_items_are_never_lost() {
    let fx = fixture();
    ingest(&fx.queue, "acme", 12);

    let batch = claim(&fx.queue, "acme", 6, "w1");
    report(&fx.queue, batch[0], ReportOutcome::Done);
    report(&fx.queue, batch[1], ReportOutcome::Failed);
    report(&fx.queue, batch[2], ReportOutcome::Blocked);
    fx.queue.release("w1", None).unwrap();
    claim(&fx.queue, "acme", 4, "w2");
    fx.clock.advance(TimeDelta::hours(1));
    fx.queue.reclaim_stale().unwrap();

    let stats = fx.queue.stats(Some("acme")).unwrap().totals;
    assert_eq!(stats.total, 12);
    assert_eq!(
        stats.pending + stats.processing + stats.done + stats.failed + stats.blocked,
        12
    );
}

#[test]
fn test_attempts_grow_only_on_failure() {
    let fx = fixture();
    let ids = ingest(&fx.queue, "acme", 1);
    let id = ids[0];

    let mut previous = 0;
    for _ in 0..3 {
        let batch = claim(&fx.queue, "acme", 1, "w1");
        assert_eq!(batch, vec![id]);
        report(&fx.queue, id, ReportOutcome::Failed);

        let item = fx.queue.get(id).unwrap();
        assert_eq!(item.attempts, previous + 1);
        previous = item.attempts;
        fx.clock.advance(TimeDelta::days(3));
        fx.queue.retry_ready(None).unwrap();
    }

    // Release and reclaim leave attempts alone
    claim(&fx.queue, "acme", 1, "w1");
    fx.queue.release("w1", None).unwrap();
    claim(&fx.queue, "acme", 1, "w2");
    fx.clock.advance(TimeDelta::hours(1));
    fx.queue.reclaim_stale().unwrap();
    assert_eq!(fx.queue.get(id).unwrap().attempts, previous);
}

#[test]
fn test_failed_items_wait_for_backoff_and_exhaust() {
    let fx = fixture_with(QueueConfig {
        max_attempts: 2,
        backoff: vec![HumanDuration::from_mins(5), HumanDuration::from_mins(30)],
        ..Default::default()
    });
    let id = ingest(&fx.queue, "acme", 1)[0];

    claim(&fx.queue, "acme", 1, "w1");
    report(&fx.queue, id, ReportOutcome::Failed);

    fx.clock.advance(TimeDelta::minutes(4));
    assert_eq!(fx.queue.retry_ready(None).unwrap(), 0);
    assert!(claim(&fx.queue, "acme", 1, "w1").is_empty());

    fx.clock.advance(TimeDelta::minutes(2));
    assert_eq!(fx.queue.retry_ready(None).unwrap(), 1);
    assert_eq!(claim(&fx.queue, "acme", 1, "w1"), vec![id]);
    report(&fx.queue, id, ReportOutcome::Failed);

    // Second failure used the 30m step and spent the attempt budget
    fx.clock.advance(TimeDelta::hours(2));
    assert_eq!(fx.queue.retry_ready(None).unwrap(), 0);
    let item = fx.queue.get(id).unwrap();
    assert_eq!(item.status, ItemStatus::Failed);
    assert_eq!(item.attempts, 2);

    let diagnostics = fx.queue.claim_diagnostics("acme", None, None).unwrap();
    assert_eq!(diagnostics.failed_exhausted_count, 1);

    // An operator reset restores the budget
    assert_eq!(fx.queue.reset_failed(Some("acme")).unwrap(), 1);
    assert_eq!(fx.queue.get(id).unwrap().attempts, 0);
}

#[test]
fn test_repeated_reports_are_idempotent() {
    let fx = fixture();
    let ids = ingest(&fx.queue, "acme", 2);
    claim(&fx.queue, "acme", 2, "w1");

    report(&fx.queue, ids[0], ReportOutcome::Done);
    let first = fx.queue.get(ids[0]).unwrap();
    report(&fx.queue, ids[0], ReportOutcome::Done);
    let second = fx.queue.get(ids[0]).unwrap();
    assert_eq!(first.status, ItemStatus::Done);
    assert_eq!(second.status, ItemStatus::Done);
    assert_eq!(first.attempts, second.attempts);

    report(&fx.queue, ids[1], ReportOutcome::Failed);
    report(&fx.queue, ids[1], ReportOutcome::Failed);
    assert_eq!(fx.queue.get(ids[1]).unwrap().attempts, 1);
}

#[test]
fn test_full_scan_reset_leaves_only_live_leases_untouched() {
    let fx = fixture();
    ingest(&fx.queue, "acme", 6);
    ingest(&fx.queue, "globex", 2);

    let batch = claim(&fx.queue, "acme", 5, "w1");
    report(&fx.queue, batch[0], ReportOutcome::Done);
    report(&fx.queue, batch[1], ReportOutcome::Failed);
    report(&fx.queue, batch[2], ReportOutcome::Blocked);
    fx.queue
        .set_validity(batch[3], false, Some("duplicate listing"))
        .unwrap();
    // batch[4] stays actively leased

    let scan = fx.queue.full_scan_reset("acme").unwrap();
    assert_eq!(scan.before.done, 1);
    assert_eq!(scan.before.failed, 1);
    assert_eq!(scan.before.blocked, 1);
    assert_eq!(scan.before.pending, 1);
    assert_eq!(scan.reset_count, 4);
    assert_eq!(scan.pending_after, 4);

    for id in &batch[..3] {
        let item = fx.queue.get(*id).unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.attempts, 0);
        assert!(item.last_error_code.is_none());
    }
    assert_eq!(fx.queue.get(batch[4]).unwrap().status, ItemStatus::Processing);
    assert_eq!(fx.queue.stats(Some("globex")).unwrap().totals.pending, 2);
}

#[test]
fn test_five_items_claimed_two_at_a_time() {
    let fx = fixture();
    let ids = ingest(&fx.queue, "acme", 5);

    let a = claim(&fx.queue, "acme", 2, "a");
    let b = claim(&fx.queue, "acme", 2, "b");
    let c = claim(&fx.queue, "acme", 2, "c");
    let d = claim(&fx.queue, "acme", 2, "d");

    assert_eq!(a, ids[0..2]);
    assert_eq!(b, ids[2..4]);
    assert_eq!(c, ids[4..5]);
    assert!(d.is_empty());
}

#[test]
fn test_crashed_worker_leases_come_back() {
    let fx = fixture();
    let ids = ingest(&fx.queue, "acme", 3);

    assert_eq!(claim(&fx.queue, "acme", 3, "crashed"), ids);
    fx.clock.advance(TimeDelta::minutes(29));
    assert!(claim(&fx.queue, "acme", 3, "rescuer").is_empty());

    fx.clock.advance(TimeDelta::minutes(2));
    let rescued = claim(&fx.queue, "acme", 3, "rescuer");
    assert_eq!(rescued, ids);
    for id in rescued {
        let item = fx.queue.get(id).unwrap();
        assert_eq!(item.locked_by.as_deref(), Some("rescuer"));
        assert_eq!(item.attempts, 0);
    }
}

#[test]
fn test_renewal_keeps_lease_past_ttl() {
    let fx = fixture();
    let ids = ingest(&fx.queue, "acme", 2);
    claim(&fx.queue, "acme", 2, "w1");

    fx.clock.advance(TimeDelta::minutes(20));
    assert_eq!(fx.queue.renew("w1", Some(&ids[..1])).unwrap(), 1);
    fx.clock.advance(TimeDelta::minutes(20));

    // Only the unrenewed item went stale
    assert_eq!(claim(&fx.queue, "acme", 2, "w2"), vec![ids[1]]);
    assert_eq!(
        fx.queue.get(ids[0]).unwrap().locked_by.as_deref(),
        Some("w1")
    );
}

#[test]
fn test_intake_deduplicates_per_supplier() {
    let fx = fixture();
    let urls = vec![
        "https://shared.example/a".to_string(),
        "https://shared.example/a".to_string(),
        "https://shared.example/b".to_string(),
    ];

    let first = fx.queue.ingest("acme", None, None, &urls).unwrap();
    assert_eq!(first.inserted, 2);
    assert_eq!(first.refreshed, 1);

    let other = fx.queue.ingest("globex", None, None, &urls[..1]).unwrap();
    assert_eq!(other.inserted, 1);

    assert_eq!(fx.queue.stats(None).unwrap().totals.total, 3);
}

#[test]
fn test_invalid_items_are_never_claimed() {
    let fx = fixture();
    let ids = ingest(&fx.queue, "acme", 3);
    fx.queue.set_validity(ids[1], false, None).unwrap();

    let claimed = claim(&fx.queue, "acme", 10, "w1");
    assert_eq!(claimed, vec![ids[0], ids[2]]);

    let summary = fx
        .queue
        .report(&[UrlResult::new(ids[1], ReportOutcome::Done)])
        .unwrap();
    assert_eq!(summary.errors, 1);
}

#[test]
fn test_backoff_is_monotone_and_clamped() {
    let policy = BackoffPolicy::new(vec![
        TimeDelta::minutes(5),
        TimeDelta::minutes(30),
        TimeDelta::minutes(10),
        TimeDelta::hours(2),
    ]);

    let delays: Vec<TimeDelta> = (1..=8).map(|n| policy.delay_for(n)).collect();
    assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(delays[0], TimeDelta::minutes(5));
    assert_eq!(delays[2], TimeDelta::minutes(30));
    assert_eq!(delays[7], TimeDelta::hours(2));
}
