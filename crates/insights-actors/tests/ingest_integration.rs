use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};

use insights_actors::actors::{
    ApplicationActor, GoalActor, HourlyMetricsActor, RealTimeCoordinatorActor,
    RetentionCohortActor, SessionActor, VisitorActor,
};
use insights_actors::error::IngestError;
use insights_actors::ingest::{authorize, process_batch, process_event, CollectRequest};
use insights_actors::Runtime;
use insights_core::application::CreateApplication;
use insights_core::clock::{Clock, ManualClock};
use insights_core::config::{Config, StoreKind};
use insights_core::goal::{CreateGoal, GoalType};
use insights_core::keys;
use insights_state::MemoryStateStore;

const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

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

fn setup() -> (Runtime, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 2, 10, 8, 30, 0).unwrap(),
    ));
    let runtime = Runtime::new(
        Arc::new(MemoryStateStore::new()),
        clock.clone(),
        test_config(),
    );
    (runtime, clock)
}

/// Build a collect request the way the tracking snippet would post it.
fn collect(event_type: &str, session: &str, data: Value) -> CollectRequest {
    serde_json::from_value(json!({
        "type": event_type,
        "applicationId": "site",
        "visitorId": "v1",
        "sessionId": session,
        "data": data,
        "context": {
            "url": "https://example.com/pricing",
            "userAgent": CHROME_MAC,
        },
    }))
    .expect("collect request")
}

async fn create_app(runtime: &Runtime) -> String {
    runtime
        .actor::<ApplicationActor>(&keys::application("site"))
        .create(CreateApplication {
            name: "Site".to_string(),
            domain: "example.com".to_string(),
            allowed_origins: vec!["https://example.com".to_string()],
            ..CreateApplication::default()
        })
        .await
        .expect("create application")
}

async fn hourly(runtime: &Runtime, clock: &ManualClock) -> insights_core::metrics::HourlyMetrics {
    runtime
        .actor::<HourlyMetricsActor>(&keys::hourly_metrics("site", clock.now()))
        .get_metrics()
        .await
        .expect("hourly")
}

fn ingest_error(err: &anyhow::Error) -> &IngestError {
    err.downcast_ref::<IngestError>().expect("ingest error")
}

#[tokio::test]
async fn authorize_checks_key_then_origin() {
    let (runtime, _clock) = setup();
    let api_key = create_app(&runtime).await;

    authorize(&runtime, "site", Some(&api_key), Some("https://example.com"))
        .await
        .expect("allowed");
    authorize(&runtime, "site", Some(&api_key), None)
        .await
        .expect("no origin header");

    let err = authorize(&runtime, "site", None, None).await.expect_err("missing");
    assert!(matches!(ingest_error(&err), IngestError::MissingApiKey));
    let err = authorize(&runtime, "site", Some(""), None).await.expect_err("empty");
    assert!(matches!(ingest_error(&err), IngestError::MissingApiKey));

    let err = authorize(&runtime, "site", Some("ins_nope"), None)
        .await
        .expect_err("wrong key");
    assert!(matches!(ingest_error(&err), IngestError::InvalidApiKey(app) if app == "site"));

    let err = authorize(&runtime, "site", Some(&api_key), Some("https://evil.com"))
        .await
        .expect_err("foreign origin");
    assert!(matches!(
        ingest_error(&err),
        IngestError::OriginNotAllowed { origin, .. } if origin == "https://evil.com"
    ));
}

#[tokio::test]
async fn a_visit_flows_through_every_aggregate() {
    let (runtime, clock) = setup();

    process_event(
        &runtime,
        collect("session_start", "s1", json!({ "landingPage": "/", "utmSource": "newsletter" })),
    )
    .await
    .expect("session start");

    let coordinator = runtime.actor::<RealTimeCoordinatorActor>(&keys::realtime_coordinator("site"));
    let live = coordinator.get_snapshot().await.expect("snapshot");
    assert_eq!(live.active_visitors, 1);
    assert_eq!(live.visitors_by_page["/pricing"], 1);

    process_event(&runtime, collect("pageview", "s1", json!({ "path": "/" })))
        .await
        .expect("page view");
    process_event(&runtime, collect("pageview", "s1", json!({ "path": "/pricing" })))
        .await
        .expect("page view");
    process_event(
        &runtime,
        collect("event", "s1", json!({ "category": "cta", "action": "click", "properties": { "n": 1 } })),
    )
    .await
    .expect("event");
    clock.advance(Duration::seconds(45));
    process_event(&runtime, collect("session_end", "s1", json!({ "exitPage": "/pricing" })))
        .await
        .expect("session end");

    let metrics = hourly(&runtime, &clock).await;
    assert_eq!(metrics.page_views, 2);
    assert_eq!(metrics.events, 1);
    assert_eq!(metrics.events_by_category["cta"], 1);
    assert_eq!(metrics.sessions, 1);
    assert_eq!(metrics.unique_visitors, 1);
    assert_eq!(metrics.bounces, 0);
    assert_eq!(metrics.total_duration_seconds, 45);

    let visitor = runtime
        .actor::<VisitorActor>(&keys::visitor("site", "v1"))
        .get_info()
        .await
        .expect("info")
        .expect("visitor exists");
    assert_eq!(visitor.total_sessions, 1);
    assert_eq!(visitor.total_page_views, 2);
    assert_eq!(visitor.device.browser.as_deref(), Some("Chrome"));
    assert_eq!(visitor.device.device_type.as_deref(), Some("desktop"));

    let session = runtime
        .actor::<SessionActor>(&keys::session("site", "s1"))
        .get_info()
        .await
        .expect("session");
    assert_eq!(session.page_view_count, 2);
    assert_eq!(session.event_count, 1);
    assert_eq!(session.duration_seconds, 45);

    // Ending the session removes the visitor from the live view.
    let live = coordinator.get_snapshot().await.expect("snapshot");
    assert_eq!(live.active_visitors, 0);
}

#[tokio::test]
async fn returning_visitors_feed_their_cohort() {
    let (runtime, clock) = setup();
    let first_week = clock.now();

    process_event(&runtime, collect("session_start", "s1", Value::Null))
        .await
        .expect("first visit");
    clock.advance(Duration::days(8));
    process_event(&runtime, collect("session_start", "s2", Value::Null))
        .await
        .expect("return visit");

    let cohort = runtime
        .actor::<RetentionCohortActor>(&keys::cohort_for("site", first_week))
        .get_data()
        .await
        .expect("cohort");
    assert_eq!(cohort.cohort_week, "2026W07");
    assert_eq!(cohort.total_visitors, 1);
    assert_eq!(cohort.retention_by_week[&1], 1);
}

#[tokio::test]
async fn identify_and_attributes_reach_visitor_and_application() {
    let (runtime, _clock) = setup();
    create_app(&runtime).await;

    process_event(&runtime, collect("identify", "s1", json!({ "userId": "" })))
        .await
        .expect("blank identify");
    process_event(&runtime, collect("identify", "s1", json!({ "userId": "user-7" })))
        .await
        .expect("identify");
    process_event(
        &runtime,
        collect("set_attributes", "s1", json!({ "attributes": { "plan": "pro", "seats": 3 } })),
    )
    .await
    .expect("attributes");

    let visitor = runtime
        .actor::<VisitorActor>(&keys::visitor("site", "v1"))
        .get_info()
        .await
        .expect("info")
        .expect("visitor exists");
    assert_eq!(visitor.user_id.as_deref(), Some("user-7"));
    assert_eq!(visitor.attributes["seats"], "3");

    let mut registered: Vec<String> = runtime
        .actor::<ApplicationActor>(&keys::application("site"))
        .get_user_attributes()
        .await
        .expect("attributes")
        .into_iter()
        .map(|a| a.key)
        .collect();
    registered.sort();
    assert_eq!(registered, vec!["plan", "seats"]);
}

#[tokio::test]
async fn conversions_require_a_goal_id() {
    let (runtime, clock) = setup();
    runtime
        .actor::<GoalActor>(&keys::goal("site", "signup"))
        .create(CreateGoal {
            application_id: "site".to_string(),
            name: "Signup".to_string(),
            goal_type: GoalType::Event,
            condition: Default::default(),
            monetary_value: None,
        })
        .await
        .expect("goal");
    process_event(&runtime, collect("session_start", "s1", Value::Null))
        .await
        .expect("session start");

    process_event(&runtime, collect("conversion", "s1", json!({ "value": 5.0 })))
        .await
        .expect("ignored");
    assert_eq!(hourly(&runtime, &clock).await.conversions, 0);

    process_event(
        &runtime,
        collect("conversion", "s1", json!({ "goalId": "signup", "value": 5.0 })),
    )
    .await
    .expect("conversion");

    let metrics = hourly(&runtime, &clock).await;
    assert_eq!(metrics.conversions, 1);
    assert_eq!(metrics.conversion_value, 5.0);
    let goal = runtime
        .actor::<GoalActor>(&keys::goal("site", "signup"))
        .get_info()
        .await
        .expect("info")
        .expect("goal exists");
    assert_eq!(goal.total_conversions, 1);
    assert!(runtime
        .actor::<SessionActor>(&keys::session("site", "s1"))
        .get_info()
        .await
        .expect("session")
        .has_conversion);
}

#[tokio::test]
async fn batches_apply_in_order_and_unknown_types_keep_presence() {
    let (runtime, _clock) = setup();

    let applied = process_batch(
        &runtime,
        vec![
            collect("session_start", "s1", Value::Null),
            collect("pageview", "s1", json!({ "path": "/" })),
            collect("heartbeat", "s1", Value::Null),
        ],
    )
    .await
    .expect("batch");
    assert_eq!(applied, 3);

    let live = runtime
        .actor::<RealTimeCoordinatorActor>(&keys::realtime_coordinator("site"))
        .get_snapshot()
        .await
        .expect("snapshot");
    assert_eq!(live.active_visitors, 1);
}

#[tokio::test]
async fn malformed_payloads_are_rejected() {
    let (runtime, _clock) = setup();

    let err = process_event(&runtime, collect("pageview", "s1", json!({ "path": 7 })))
        .await
        .expect_err("bad payload");
    assert!(matches!(
        ingest_error(&err),
        IngestError::InvalidPayload { event_type, .. } if event_type == "pageview"
    ));
}
