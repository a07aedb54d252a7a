//! Schedule registry tests
//!
//! These run on the real clock with short frequencies, so counts are checked
//! against ranges rather than exact values.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{CountingProber, Harness, MockHttpServer, PanicOnceProber, config, init_tracing};
use tokio::time::sleep;
use vigil::{
    ChangeNotification, CheckId, CheckStatus, CheckType, ExecutorDispatch, HttpProber, Prober, TaskPhase,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_end_to_end_http_schedule() {
    init_tracing();
    let server = MockHttpServer::start(200).await;
    let mut harness = Harness::new(vec![Arc::new(HttpProber::new()) as Arc<dyn Prober>], 8);

    harness
        .registry
        .upsert(config("web", CheckType::Http, &server.url(), 100, 50))
        .unwrap();
    sleep(Duration::from_millis(500)).await;
    harness.registry.remove(&CheckId::from("web"));

    let results = harness.drain();
    assert!((3..=7).contains(&results.len()), "got {} results", results.len());
    assert!(results.iter().all(|r| r.status == CheckStatus::Up));
    assert!(results.iter().all(|r| r.check_id.as_str() == "web"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_upsert_same_id_keeps_single_task() {
    let prober = Arc::new(CountingProber::default());
    let mut harness = Harness::new(vec![prober.clone() as Arc<dyn Prober>], 8);

    let first = config("db", CheckType::Tcp, "db.internal:5432", 100, 50);
    let mut second = first.clone();
    second.timeout = Duration::from_millis(80);

    harness.registry.upsert(first).unwrap();
    harness.registry.upsert(second.clone()).unwrap();
    assert_eq!(harness.registry.len(), 1);
    assert_eq!(harness.registry.configuration(&second.id), Some(second));

    sleep(Duration::from_millis(550)).await;
    harness.registry.shutdown();

    // One task fires ~6 times in the window; two would fire ~12
    let published = harness.drain().len();
    assert!((4..=8).contains(&published), "got {published} results");
}

#[tokio::test]
async fn test_remove_unknown_is_noop() {
    let harness = Harness::new(vec![Arc::new(CountingProber::default()) as Arc<dyn Prober>], 4);
    harness
        .registry
        .upsert(config("db", CheckType::Tcp, "db.internal:5432", 60_000, 1000))
        .unwrap();

    assert!(!harness.registry.remove(&CheckId::from("missing")));
    assert_eq!(harness.registry.scheduled_ids(), vec![CheckId::from("db")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remove_stops_future_ticks() {
    let prober = Arc::new(CountingProber::default());
    let harness = Harness::new(vec![prober.clone() as Arc<dyn Prober>], 4);

    harness
        .registry
        .upsert(config("db", CheckType::Tcp, "db.internal:5432", 50, 20))
        .unwrap();
    sleep(Duration::from_millis(120)).await;
    assert!(harness.registry.remove(&CheckId::from("db")));
    assert!(harness.registry.is_empty());

    sleep(Duration::from_millis(30)).await;
    let after_remove = prober.executions();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(prober.executions(), after_remove);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_execution_skips_overlapping_ticks() {
    let prober = Arc::new(CountingProber::with_delay(Duration::from_millis(200)));
    let harness = Harness::new(vec![prober.clone() as Arc<dyn Prober>], 8);

    harness
        .registry
        .upsert(config("slow", CheckType::Tcp, "slow.internal:80", 50, 40))
        .unwrap();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.registry.phase(&CheckId::from("slow")), Some(TaskPhase::Running));

    sleep(Duration::from_millis(450)).await;
    harness.registry.shutdown();

    assert_eq!(prober.max_running(), 1, "executions of one check must not overlap");
    assert!(prober.executions() <= 4, "got {} executions", prober.executions());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replacement_does_not_overlap_running_execution() {
    let prober = Arc::new(CountingProber::with_delay(Duration::from_millis(300)));
    let harness = Harness::new(vec![prober.clone() as Arc<dyn Prober>], 8);
    let id = CheckId::from("db");

    let first = config("db", CheckType::Tcp, "db.internal:5432", 1000, 500);
    let mut second = first.clone();
    second.timeout = Duration::from_millis(400);

    harness.registry.upsert(first).unwrap();
    sleep(Duration::from_millis(50)).await;
    harness.registry.upsert(second).unwrap();
    sleep(Duration::from_millis(100)).await;

    // The first configuration's execution is still running and owns the check
    assert_eq!(prober.max_running(), 1);
    assert_eq!(harness.registry.phase(&id), Some(TaskPhase::Running));

    sleep(Duration::from_millis(400)).await;
    assert_eq!(harness.registry.phase(&id), Some(TaskPhase::Idle));
    harness.registry.shutdown();

    assert_eq!(prober.max_running(), 1);
    assert_eq!(prober.executions(), 1, "the replacement's first tick is skipped, the next is 1s away");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_bounds_concurrency() {
    let prober = Arc::new(CountingProber::with_delay(Duration::from_millis(100)));
    let harness = Harness::new(vec![prober.clone() as Arc<dyn Prober>], 1);

    for id in ["a", "b", "c"] {
        harness
            .registry
            .upsert(config(id, CheckType::Tcp, "host.internal:80", 1000, 500))
            .unwrap();
    }
    sleep(Duration::from_millis(400)).await;
    harness.registry.shutdown();

    assert_eq!(prober.max_running(), 1);
    assert_eq!(prober.executions(), 3, "queued executions are delayed, not dropped");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panic_does_not_cancel_schedule() {
    let prober = Arc::new(PanicOnceProber::default());
    let mut harness = Harness::new(vec![prober.clone() as Arc<dyn Prober>], 4);

    harness
        .registry
        .upsert(config("flaky", CheckType::Dns, "example.com", 50, 20))
        .unwrap();
    sleep(Duration::from_millis(300)).await;
    harness.registry.shutdown();

    assert!(!harness.drain().is_empty(), "ticks after the panic must still publish");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_configuration_error_skips_cycle_only() {
    // No prober handles DNS: every cycle fails at dispatch, the task stays
    let mut harness = Harness::new(vec![Arc::new(CountingProber::default()) as Arc<dyn Prober>], 4);
    harness
        .registry
        .upsert(config("orphan", CheckType::Dns, "example.com", 50, 20))
        .unwrap();
    sleep(Duration::from_millis(225)).await;

    assert!(harness.registry.contains(&CheckId::from("orphan")));
    assert_eq!(harness.registry.phase(&CheckId::from("orphan")), Some(TaskPhase::Idle));
    assert!(harness.drain().is_empty());
}

#[tokio::test]
async fn test_upsert_rejects_zero_frequency() {
    let harness = Harness::new(vec![Arc::new(CountingProber::default()) as Arc<dyn Prober>], 4);
    let err = harness
        .registry
        .upsert(config("bad", CheckType::Tcp, "host.internal:80", 0, 100))
        .unwrap_err();

    assert!(err.is_configuration());
    assert!(harness.registry.is_empty());
}

#[tokio::test]
async fn test_reconcile_schedules_only_missing() {
    let harness = Harness::new(vec![Arc::new(CountingProber::default()) as Arc<dyn Prober>], 4);

    let tracked = config("tracked", CheckType::Tcp, "a.internal:80", 60_000, 1000);
    harness.registry.upsert(tracked.clone()).unwrap();

    let mut drifted = tracked.clone();
    drifted.frequency = Duration::from_secs(5);
    harness.settings.insert(drifted);
    harness.settings.insert(config("missing", CheckType::Tcp, "b.internal:80", 60_000, 1000));
    harness.settings.insert(config("invalid", CheckType::Tcp, "c.internal:80", 60_000, 0));

    let report = harness.registry.reconcile().await.unwrap();

    assert_eq!(report.listed, 3);
    assert_eq!(report.scheduled, 1);
    assert_eq!(report.drifted, 1);
    assert_eq!(report.rejected, 1);
    assert_eq!(
        harness.registry.scheduled_ids(),
        vec![CheckId::from("missing"), CheckId::from("tracked")]
    );
    // Drift is reported, not applied
    assert_eq!(harness.registry.configuration(&CheckId::from("tracked")), Some(tracked));
}

#[tokio::test]
async fn test_apply_change_notifications() {
    let harness = Harness::new(vec![Arc::new(CountingProber::default()) as Arc<dyn Prober>], 4);
    let check = config("svc", CheckType::Tcp, "svc.internal:80", 60_000, 1000);

    harness.registry.apply(ChangeNotification::created(check.clone())).unwrap();
    assert!(harness.registry.contains(&check.id));

    let mut updated = check.clone();
    updated.resource_url = "svc.internal:8080".to_string();
    harness.registry.apply(ChangeNotification::updated(updated.clone())).unwrap();
    assert_eq!(harness.registry.configuration(&check.id), Some(updated));
    assert_eq!(harness.registry.len(), 1);

    harness.registry.apply(ChangeNotification::deleted(check.id.clone())).unwrap();
    assert!(harness.registry.is_empty());

    let mut broken = ChangeNotification::created(check.clone());
    broken.configuration = None;
    assert!(harness.registry.apply(broken).unwrap_err().is_configuration());

    let mut mismatched = ChangeNotification::updated(check);
    mismatched.check_id = CheckId::from("other");
    assert!(harness.registry.apply(mismatched).unwrap_err().is_configuration());
    assert!(harness.registry.is_empty());
}

#[test]
fn test_standard_dispatch_registers_all_probers() {
    let dispatch = ExecutorDispatch::standard();
    assert_eq!(dispatch.registered().collect::<Vec<_>>(), vec!["http", "tcp", "dns"]);
}
