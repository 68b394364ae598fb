use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use insights_actors::actors::{
    ApplicationActor, ConversionActor, EventActor, GoalActor, HourlyMetricsActor, PageViewActor,
    RetentionCohortActor, VisitorActor,
};
use insights_actors::Runtime;
use insights_core::application::{CreateApplication, UpdateApplication};
use insights_core::clock::{Clock, ManualClock};
use insights_core::config::{Config, StoreKind};
use insights_core::goal::{CreateGoal, GoalCondition, GoalContext, GoalType, UpdateGoal};
use insights_core::keys;
use insights_core::records::{NewConversion, NewEvent, NewPageView};
use insights_core::traffic::TrafficSource;
use insights_core::visitor::VisitData;
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

fn setup() -> (Runtime, MemoryStateStore, Arc<ManualClock>) {
    let store = MemoryStateStore::new();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 2, 10, 8, 30, 0).unwrap(),
    ));
    let runtime = Runtime::new(Arc::new(store.clone()), clock.clone(), test_config());
    (runtime, store, clock)
}

async fn create_app(runtime: &Runtime, origins: &[&str]) -> String {
    runtime
        .actor::<ApplicationActor>(&keys::application("site"))
        .create(CreateApplication {
            name: "Marketing site".to_string(),
            owner_id: "owner-1".to_string(),
            organization_id: "org-1".to_string(),
            domain: "example.com".to_string(),
            allowed_origins: origins.iter().map(|o| o.to_string()).collect(),
        })
        .await
        .expect("create application")
}

async fn create_signup_goal(runtime: &Runtime) {
    runtime
        .actor::<GoalActor>(&keys::goal("site", "signup"))
        .create(CreateGoal {
            application_id: "site".to_string(),
            name: "Signup".to_string(),
            goal_type: GoalType::Event,
            condition: GoalCondition {
                event_category: Some("account".to_string()),
                event_action: Some("signup".to_string()),
                ..GoalCondition::default()
            },
            monetary_value: Some(10.0),
        })
        .await
        .expect("create goal");
}

#[tokio::test]
async fn api_keys_validate_until_rotated() {
    let (runtime, _store, _clock) = setup();
    let app = runtime.actor::<ApplicationActor>(&keys::application("site"));
    let first = create_app(&runtime, &[]).await;

    assert!(first.starts_with("ins_"));
    assert!(app.validate_api_key(&first).await.expect("validate"));
    assert!(!app.validate_api_key("ins_wrong").await.expect("validate"));
    assert!(!app.validate_api_key("").await.expect("validate"));

    let second = app.regenerate_api_key().await.expect("rotate");
    assert_ne!(first, second);
    assert!(!app.validate_api_key(&first).await.expect("validate"));
    assert!(app.validate_api_key(&second).await.expect("validate"));

    app.update(UpdateApplication {
        is_active: Some(false),
        ..UpdateApplication::default()
    })
    .await
    .expect("deactivate");
    assert!(!app.validate_api_key(&second).await.expect("validate"));

    let info = app.get_info().await.expect("info").expect("exists");
    assert_eq!(info.id, "site");
    assert_eq!(info.organization_id, "org-1");
}

#[tokio::test]
async fn origins_follow_the_allow_list() {
    let (runtime, _store, _clock) = setup();
    let app = runtime.actor::<ApplicationActor>(&keys::application("site"));

    create_app(&runtime, &["*.example.com"]).await;
    assert!(app.is_origin_allowed("https://shop.example.com").await.expect("check"));
    assert!(!app.is_origin_allowed("https://example.com").await.expect("check"));
    assert!(!app.is_origin_allowed("https://evil.com").await.expect("check"));

    app.update(UpdateApplication {
        allowed_origins: Some(Vec::new()),
        ..UpdateApplication::default()
    })
    .await
    .expect("update");
    // An empty list falls back to the application's domain.
    assert!(app.is_origin_allowed("https://example.com").await.expect("check"));

    let unknown = runtime.actor::<ApplicationActor>(&keys::application("nobody"));
    assert!(!unknown.is_origin_allowed("https://example.com").await.expect("check"));
    assert!(!unknown.validate_api_key("ins_anything").await.expect("validate"));
}

#[tokio::test]
async fn deleted_applications_disappear() {
    let (runtime, store, _clock) = setup();
    let app = runtime.actor::<ApplicationActor>(&keys::application("site"));
    let api_key = create_app(&runtime, &[]).await;

    app.delete().await.expect("delete");
    assert!(app.get_info().await.expect("info").is_none());
    assert!(!app.validate_api_key(&api_key).await.expect("validate"));
    assert!(store
        .load("application", &keys::application("site"))
        .await
        .expect("load")
        .is_none());
}

#[tokio::test]
async fn attribute_keys_register_on_existing_apps() {
    let (runtime, _store, clock) = setup();
    let app = runtime.actor::<ApplicationActor>(&keys::application("site"));

    // Not created yet, so nothing sticks.
    app.register_user_attribute_keys(vec!["plan".to_string()])
        .await
        .expect("register");
    assert!(app.get_user_attributes().await.expect("attributes").is_empty());

    create_app(&runtime, &[]).await;
    app.register_user_attribute_keys(vec!["plan".to_string(), "seats".to_string()])
        .await
        .expect("register");
    clock.advance(Duration::hours(1));
    app.register_user_attribute_keys(vec!["plan".to_string()])
        .await
        .expect("register");

    let attributes = app.get_user_attributes().await.expect("attributes");
    assert_eq!(attributes.len(), 2);
    let plan = attributes.iter().find(|a| a.key == "plan").expect("plan");
    assert!(plan.is_filterable);
    assert_eq!(plan.last_seen - plan.first_seen, Duration::hours(1));

    assert!(app
        .set_user_attribute_filterable("seats", false)
        .await
        .expect("toggle"));
    assert!(!app
        .set_user_attribute_filterable("missing", false)
        .await
        .expect("toggle"));
    let seats = app
        .get_user_attributes()
        .await
        .expect("attributes")
        .into_iter()
        .find(|a| a.key == "seats")
        .expect("seats");
    assert!(!seats.is_filterable);
}

#[tokio::test]
async fn event_goals_match_category_and_action() {
    let (runtime, _store, _clock) = setup();
    create_signup_goal(&runtime).await;
    let goal = runtime.actor::<GoalActor>(&keys::goal("site", "signup"));

    let signup = GoalContext {
        event_category: Some("Account".to_string()),
        event_action: Some("SIGNUP".to_string()),
        ..GoalContext::default()
    };
    assert!(goal.evaluate(signup.clone()).await.expect("evaluate"));

    let login = GoalContext {
        event_category: Some("account".to_string()),
        event_action: Some("login".to_string()),
        ..GoalContext::default()
    };
    assert!(!goal.evaluate(login).await.expect("evaluate"));

    goal.update(UpdateGoal {
        is_active: Some(false),
        ..UpdateGoal::default()
    })
    .await
    .expect("pause goal");
    assert!(!goal.evaluate(signup).await.expect("evaluate"));

    let info = goal.get_info().await.expect("info").expect("exists");
    assert_eq!(info.id, "signup");
    assert_eq!(info.monetary_value, Some(10.0));

    goal.delete().await.expect("delete");
    assert!(goal.get_info().await.expect("info").is_none());
}

#[tokio::test]
async fn conversions_bump_goal_and_hourly_totals() {
    let (runtime, _store, clock) = setup();
    create_signup_goal(&runtime).await;

    let key = keys::conversion("site", "c1");
    let conversion = runtime.actor::<ConversionActor>(&key);
    conversion
        .record(NewConversion {
            application_id: "site".to_string(),
            goal_id: "signup".to_string(),
            session_id: "s1".to_string(),
            visitor_id: "v1".to_string(),
            value: Some(10.0),
            source: TrafficSource::Email,
            ..NewConversion::default()
        })
        .await
        .expect("record");

    let record = conversion.get_info().await.expect("info").expect("exists");
    assert_eq!(record.id, key);
    assert_eq!(record.timestamp, clock.now());
    assert_eq!(record.source, TrafficSource::Email);

    let goal = runtime
        .actor::<GoalActor>(&keys::goal("site", "signup"))
        .get_info()
        .await
        .expect("info")
        .expect("exists");
    assert_eq!(goal.total_conversions, 1);

    let hour = runtime
        .actor::<HourlyMetricsActor>(&keys::hourly_metrics("site", clock.now()))
        .get_metrics()
        .await
        .expect("hourly");
    assert_eq!(hour.conversions, 1);
    assert_eq!(hour.conversion_value, 10.0);
    assert_eq!(hour.conversions_by_goal["signup"], 1);
}

#[tokio::test]
async fn conversion_for_an_unknown_goal_is_still_recorded() {
    let (runtime, _store, _clock) = setup();

    let conversion = runtime.actor::<ConversionActor>(&keys::conversion("site", "c1"));
    conversion
        .record(NewConversion {
            application_id: "site".to_string(),
            goal_id: "ghost".to_string(),
            ..NewConversion::default()
        })
        .await
        .expect("record");

    assert!(conversion.get_info().await.expect("info").is_some());
    let goal = runtime.actor::<GoalActor>(&keys::goal("site", "ghost"));
    assert!(goal.get_info().await.expect("info").is_none());
}

#[tokio::test]
async fn visitors_keep_their_first_visit() {
    let (runtime, _store, clock) = setup();
    let visitor = runtime.actor::<VisitorActor>(&keys::visitor("site", "v1"));
    let first_seen = clock.now();

    let first = visitor
        .record_visit(VisitData {
            application_id: "site".to_string(),
            country: Some("NL".to_string()),
            ..VisitData::default()
        })
        .await
        .expect("visit");
    assert!(first.is_new);

    clock.advance(Duration::days(3));
    let second = visitor
        .record_visit(VisitData::default())
        .await
        .expect("visit");
    assert!(!second.is_new);
    assert_eq!(second.first_seen, first_seen);

    visitor.record_page_view().await.expect("page view");
    visitor.identify("user-42").await.expect("identify");
    visitor
        .set_attributes(BTreeMap::from([("plan".to_string(), "pro".to_string())]))
        .await
        .expect("attributes");

    let info = visitor.get_info().await.expect("info").expect("exists");
    assert_eq!(info.total_sessions, 2);
    assert_eq!(info.total_page_views, 1);
    assert_eq!(info.country.as_deref(), Some("NL"));
    assert_eq!(info.user_id.as_deref(), Some("user-42"));
    assert_eq!(info.attributes["plan"], "pro");
    assert_eq!(info.last_seen, Some(clock.now()));
}

#[tokio::test]
async fn cohorts_count_members_and_returns_once() {
    let (runtime, _store, _clock) = setup();
    let cohort = runtime.actor::<RetentionCohortActor>(&keys::cohort("site", "2026W07"));

    assert!(cohort.add_visitor("v1").await.expect("add"));
    assert!(!cohort.add_visitor("v1").await.expect("add again"));
    assert!(cohort.add_visitor("v2").await.expect("add"));

    assert!(cohort.record_return_visit("v1", 1).await.expect("return"));
    assert!(!cohort.record_return_visit("v1", 1).await.expect("same week"));
    // Not a member of this cohort.
    assert!(!cohort.record_return_visit("v9", 1).await.expect("stranger"));

    let data = cohort.get_data().await.expect("data");
    assert_eq!(data.application_id, "site");
    assert_eq!(data.cohort_week, "2026W07");
    assert_eq!(data.total_visitors, 2);
    assert_eq!(data.retention_by_week[&1], 1);
}

#[tokio::test]
async fn events_and_page_views_are_written_once() {
    let (runtime, _store, clock) = setup();

    let event_key = keys::event("site", "e1");
    let event = runtime.actor::<EventActor>(&event_key);
    assert!(event.get_info().await.expect("info").is_none());
    event
        .record(NewEvent {
            application_id: "site".to_string(),
            session_id: "s1".to_string(),
            visitor_id: "v1".to_string(),
            category: "video".to_string(),
            action: "play".to_string(),
            value: Some(3.0),
            timestamp: clock.now(),
            ..NewEvent::default()
        })
        .await
        .expect("record event");
    let record = event.get_info().await.expect("info").expect("exists");
    assert_eq!(record.id, event_key);
    assert_eq!(record.action, "play");

    let page_view = runtime.actor::<PageViewActor>(&keys::page_view("site", "p1"));
    page_view
        .record(NewPageView {
            application_id: "site".to_string(),
            page_path: "/pricing".to_string(),
            page_title: "Pricing".to_string(),
            timestamp: clock.now(),
            ..NewPageView::default()
        })
        .await
        .expect("record page view");

    runtime.shutdown().await;
    let record = page_view.get_info().await.expect("info").expect("reloaded");
    assert_eq!(record.page_path, "/pricing");
    assert_eq!(record.time_on_page_seconds, 0);
}
