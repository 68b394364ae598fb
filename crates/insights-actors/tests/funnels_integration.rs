use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use tokio::time::{sleep, Duration};

use insights_actors::actors::{FunnelActor, FunnelAnalyticsActor, FunnelSummaryActor};
use insights_actors::Runtime;
use insights_core::clock::ManualClock;
use insights_core::config::{Config, StoreKind};
use insights_core::error::CoreError;
use insights_core::funnel::{CreateFunnel, FunnelDayState, FunnelStep, FunnelStepType};
use insights_core::keys;
use insights_state::{MemoryStateStore, StateStore};

fn test_config() -> Config {
    Config {
        data_dir: "/tmp/insights-test".to_string(),
        store: StoreKind::Memory,
        duckdb_memory_limit: "1GB".to_string(),
        hourly_flush_interval_ms: 5_000,
        funnel_flush_interval_ms: 10_000,
        actor_idle_timeout_secs: 900,
        realtime_sweep_interval_secs: 60,
        realtime_idle_secs: 300,
    }
}

fn setup() -> (Runtime, MemoryStateStore) {
    let store = MemoryStateStore::new();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 2, 10, 8, 30, 0).unwrap(),
    ));
    let runtime = Runtime::new(Arc::new(store.clone()), clock, test_config());
    (runtime, store)
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
}

fn step(order: u32, name: &str) -> FunnelStep {
    FunnelStep {
        order,
        name: name.to_string(),
        step_type: FunnelStepType::PageVisit,
        page_path: Some(format!("/{name}")),
        ..FunnelStep::default()
    }
}

async fn create_checkout(runtime: &Runtime) {
    runtime
        .actor::<FunnelActor>(&keys::funnel("site", "checkout"))
        .create(CreateFunnel {
            application_id: "site".to_string(),
            name: "Checkout".to_string(),
            // Listed out of order on purpose.
            steps: vec![step(3, "paid"), step(1, "cart"), step(2, "address")],
        })
        .await
        .expect("create funnel");
}

async fn complete(runtime: &Runtime, date: NaiveDate, step_order: u32, visitors: &[&str]) {
    let actor = runtime.actor::<FunnelAnalyticsActor>(&keys::funnel_analytics("checkout", date));
    for visitor in visitors {
        actor
            .record_step_completion(visitor, step_order)
            .await
            .expect("record step");
    }
}

#[tokio::test]
async fn summary_merges_days_and_rates_against_previous_step() {
    let (runtime, _store) = setup();
    create_checkout(&runtime).await;

    complete(&runtime, day(9), 1, &["a", "b", "c", "d"]).await;
    complete(&runtime, day(9), 2, &["a", "b"]).await;
    complete(&runtime, day(9), 3, &["a"]).await;
    complete(&runtime, day(10), 1, &["d", "e"]).await;
    complete(&runtime, day(10), 2, &["e"]).await;

    let summary = runtime
        .actor::<FunnelSummaryActor>(&keys::funnel_summary("site", "checkout"))
        .get_analytics(day(9), day(10))
        .await
        .expect("analytics");

    assert_eq!(summary.funnel_id, "checkout");
    assert_eq!(summary.funnel_name, "Checkout");
    let orders: Vec<u32> = summary.steps.iter().map(|s| s.order).collect();
    assert_eq!(orders, vec![1, 2, 3]);

    let visitors: Vec<u64> = summary.steps.iter().map(|s| s.visitors).collect();
    assert_eq!(visitors, vec![5, 3, 1]);
    assert_eq!(summary.steps[0].conversion_rate, 100.0);
    assert_eq!(summary.steps[0].drop_off_rate, 0.0);
    assert!((summary.steps[1].conversion_rate - 60.0).abs() < 1e-9);
    assert!((summary.steps[1].drop_off_rate - 40.0).abs() < 1e-9);
    assert!((summary.steps[2].conversion_rate - 100.0 / 3.0).abs() < 1e-9);

    assert_eq!(summary.total_entries, 5);
    assert_eq!(summary.total_completions, 1);
    assert!((summary.overall_conversion_rate - 20.0).abs() < 1e-9);
}

#[tokio::test]
async fn first_step_is_fixed_even_without_entrants() {
    let (runtime, _store) = setup();
    create_checkout(&runtime).await;

    let summary = runtime
        .actor::<FunnelSummaryActor>(&keys::funnel_summary("site", "checkout"))
        .get_analytics(day(1), day(3))
        .await
        .expect("analytics");
    assert_eq!(summary.steps.len(), 3);
    assert_eq!(summary.steps[0].conversion_rate, 100.0);
    assert_eq!(summary.steps[0].drop_off_rate, 0.0);
    assert_eq!(summary.total_entries, 0);
    assert_eq!(summary.overall_conversion_rate, 0.0);
}

#[tokio::test]
async fn unknown_funnel_yields_zero_result() {
    let (runtime, _store) = setup();

    let summary = runtime
        .actor::<FunnelSummaryActor>(&keys::funnel_summary("site", "missing"))
        .get_analytics(day(1), day(7))
        .await
        .expect("analytics");
    assert_eq!(summary.funnel_name, "Unknown");
    assert!(summary.steps.is_empty());
    assert_eq!(summary.total_entries, 0);
}

#[tokio::test]
async fn oversized_ranges_are_rejected() {
    let (runtime, _store) = setup();
    create_checkout(&runtime).await;

    let err = runtime
        .actor::<FunnelSummaryActor>(&keys::funnel_summary("site", "checkout"))
        .get_analytics(day(1), NaiveDate::from_ymd_opt(2027, 6, 1).unwrap())
        .await
        .expect_err("range too long");
    assert!(matches!(
        err.downcast_ref::<CoreError>(),
        Some(CoreError::InvalidInput(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn step_completions_are_idempotent_and_flushed() {
    let (runtime, store) = setup();
    let key = keys::funnel_analytics("checkout", day(10));
    let actor = runtime.actor::<FunnelAnalyticsActor>(&key);

    actor.record_step_completion("a", 1).await.expect("record");
    actor.record_step_completion("a", 1).await.expect("record");
    let read = actor.get_analytics().await.expect("read");
    assert_eq!(read.step_completions[&1], 1);
    assert_eq!(read.funnel_id, "checkout");

    sleep(Duration::from_secs(11)).await;

    let blob = store
        .load("funnel_analytics", &key)
        .await
        .expect("load")
        .expect("flushed by timer");
    let state: FunnelDayState = serde_json::from_slice(&blob).expect("decode");
    assert_eq!(state.step_completions[&1], 1);
    assert_eq!(state.date, Some(day(10)));

    // Seen before the flush, so still one.
    actor.record_step_completion("a", 1).await.expect("record");
    actor.record_step_completion("b", 1).await.expect("record");
    let read = actor.get_analytics().await.expect("read");
    assert_eq!(read.step_completions[&1], 2);
}

#[tokio::test]
async fn definitions_update_and_delete() {
    let (runtime, _store) = setup();
    create_checkout(&runtime).await;
    let funnel = runtime.actor::<FunnelActor>(&keys::funnel("site", "checkout"));

    let info = funnel.get_info().await.expect("info").expect("exists");
    assert_eq!(info.id, "checkout");
    assert!(info.is_active);

    funnel
        .update("Short checkout".to_string(), vec![step(1, "cart")])
        .await
        .expect("update");
    funnel.set_active(false).await.expect("deactivate");
    let info = funnel.get_info().await.expect("info").expect("exists");
    assert_eq!(info.name, "Short checkout");
    assert_eq!(info.steps.len(), 1);
    assert!(!info.is_active);

    funnel.delete().await.expect("delete");
    assert!(funnel.get_info().await.expect("info").is_none());
}
