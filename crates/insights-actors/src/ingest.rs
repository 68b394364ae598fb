//! Routing of collected browser events onto the actors.
//!
//! A [`CollectRequest`] is what the tracking snippet posts. Its `type` picks
//! the handler; every event except `session_end` then marks the visitor as
//! present on their real-time shard.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use insights_core::keys;
use insights_core::records::{NewConversion, NewEvent, NewPageView};
use insights_core::retention::weeks_since;
use insights_core::session::SessionStart;
use insights_core::visitor::{DeviceInfo, VisitData, VisitOutcome};

use crate::actors::{
    best_effort, ApplicationActor, ConversionActor, EventActor, PageViewActor,
    RealTimeShardActor, RetentionCohortActor, SessionActor, VisitorActor,
};
use crate::error::IngestError;
use crate::runtime::Runtime;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    pub application_id: String,
    pub visitor_id: String,
    pub session_id: String,
    /// When the client saw the event. Defaults to the time it is processed.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Type-specific payload; see the handlers below.
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub context: CollectContext,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollectContext {
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub language: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SessionStartData {
    referrer: Option<String>,
    landing_page: Option<String>,
    utm_source: Option<String>,
    utm_medium: Option<String>,
    utm_campaign: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageViewData {
    path: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventData {
    category: Option<String>,
    action: Option<String>,
    label: Option<String>,
    value: Option<f64>,
    properties: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SessionEndData {
    exit_page: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct IdentifyData {
    user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AttributesData {
    attributes: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ConversionData {
    goal_id: Option<String>,
    value: Option<f64>,
    utm_campaign: Option<String>,
}

fn payload<T: DeserializeOwned + Default>(request: &CollectRequest) -> Result<T, IngestError> {
    if request.data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(request.data.clone()).map_err(|source| IngestError::InvalidPayload {
        event_type: request.event_type.clone(),
        source,
    })
}

/// Strings stay as they are; anything else is kept as its JSON text.
fn stringify(values: Map<String, Value>) -> BTreeMap<String, String> {
    values
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect()
}

fn known(value: &str) -> Option<String> {
    if value.is_empty() || value == "UNKNOWN" {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse a `User-Agent` string with `woothee`.
///
/// Returns `None` if the string is empty or `woothee` cannot classify it.
pub fn parse_device(user_agent: &str) -> Option<DeviceInfo> {
    if user_agent.is_empty() {
        return None;
    }
    let result = woothee::parser::Parser::new().parse(user_agent)?;
    let device_type = match result.category {
        "smartphone" | "mobilephone" => "mobile",
        "tablet" => "tablet",
        _ => "desktop",
    };
    Some(DeviceInfo {
        browser: known(result.name),
        browser_version: known(&result.version),
        os: known(result.os),
        os_version: known(&result.os_version),
        device_type: Some(device_type.to_string()),
        is_mobile: device_type == "mobile",
    })
}

/// Path component of the page the event came from, `/` if unknown.
fn current_path(request: &CollectRequest) -> String {
    request
        .context
        .url
        .as_deref()
        .and_then(|raw| Url::parse(raw).ok())
        .map_or_else(|| "/".to_string(), |url| url.path().to_string())
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Check a request's api key, then its `Origin` if it sent one.
pub async fn authorize(
    runtime: &Runtime,
    application_id: &str,
    api_key: Option<&str>,
    origin: Option<&str>,
) -> anyhow::Result<()> {
    let api_key = api_key
        .filter(|key| !key.is_empty())
        .ok_or(IngestError::MissingApiKey)?;
    let application = runtime.actor::<ApplicationActor>(&keys::application(application_id));
    if !application.validate_api_key(api_key).await? {
        return Err(IngestError::InvalidApiKey(application_id.to_string()).into());
    }
    if let Some(origin) = origin {
        if !application.is_origin_allowed(origin).await? {
            return Err(IngestError::OriginNotAllowed {
                application_id: application_id.to_string(),
                origin: origin.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Apply one collected event. Persistence failures of the primary actor
/// writes propagate; follow-on bookkeeping is best effort.
pub async fn process_event(runtime: &Runtime, request: CollectRequest) -> anyhow::Result<()> {
    let now = runtime.clock().now();
    let shard = runtime.actor::<RealTimeShardActor>(&keys::realtime_shard_for_visitor(
        &request.application_id,
        &request.visitor_id,
    ));

    match request.event_type.to_lowercase().as_str() {
        "session_start" => session_start(runtime, &request, now).await?,
        "pageview" => page_view(runtime, &request, now).await?,
        "event" => event(runtime, &request, now).await?,
        "session_end" => {
            session_end(runtime, &request).await?;
            shard.remove_active_visitor(&request.visitor_id).await?;
            return Ok(());
        }
        "identify" => identify(runtime, &request).await?,
        "set_attributes" => set_attributes(runtime, &request).await?,
        "conversion" => conversion(runtime, &request).await?,
        other => warn!(event_type = other, application_id = %request.application_id, "unknown event type"),
    }

    shard
        .record_active_visitor(&request.visitor_id, &current_path(&request))
        .await
}

/// Apply a batch in order, stopping at the first failure. Returns how many
/// events were applied.
pub async fn process_batch(
    runtime: &Runtime,
    requests: Vec<CollectRequest>,
) -> anyhow::Result<usize> {
    let mut applied = 0;
    for request in requests {
        process_event(runtime, request).await?;
        applied += 1;
    }
    debug!(applied, "batch processed");
    Ok(applied)
}

async fn session_start(
    runtime: &Runtime,
    request: &CollectRequest,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let data: SessionStartData = payload(request)?;
    let app = &request.application_id;
    let user_agent = request.context.user_agent.clone();
    let device = user_agent.as_deref().and_then(parse_device);

    let visitor = runtime.actor::<VisitorActor>(&keys::visitor(app, &request.visitor_id));
    let outcome = visitor
        .record_visit(VisitData {
            application_id: app.clone(),
            user_agent,
            device,
            ..VisitData::default()
        })
        .await?;

    let session = runtime.actor::<SessionActor>(&keys::session(app, &request.session_id));
    session
        .start(SessionStart {
            application_id: app.clone(),
            visitor_id: request.visitor_id.clone(),
            organization_id: String::new(),
            referrer_url: data.referrer,
            landing_page: data.landing_page,
            utm_source: data.utm_source,
            utm_medium: data.utm_medium,
            utm_campaign: data.utm_campaign,
        })
        .await?;

    track_retention(runtime, request, outcome, now).await;
    Ok(())
}

/// New visitors join the cohort of their first week; returning visitors
/// record a return against it.
async fn track_retention(
    runtime: &Runtime,
    request: &CollectRequest,
    outcome: VisitOutcome,
    now: DateTime<Utc>,
) {
    let cohort = runtime.actor::<RetentionCohortActor>(&keys::cohort_for(
        &request.application_id,
        outcome.first_seen,
    ));
    let result = if outcome.is_new {
        cohort.add_visitor(&request.visitor_id).await
    } else {
        let weeks = weeks_since(outcome.first_seen.date_naive(), now.date_naive());
        if weeks == 0 {
            return;
        }
        cohort.record_return_visit(&request.visitor_id, weeks).await
    };
    best_effort(result.map(drop), cohort.key(), "retention");
}

async fn page_view(
    runtime: &Runtime,
    request: &CollectRequest,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let data: PageViewData = payload(request)?;
    let app = &request.application_id;

    let record = runtime.actor::<PageViewActor>(&keys::page_view(app, &new_id()));
    record
        .record(NewPageView {
            application_id: app.clone(),
            organization_id: String::new(),
            session_id: request.session_id.clone(),
            visitor_id: request.visitor_id.clone(),
            page_path: data.path.unwrap_or_else(|| "/".to_string()),
            page_title: data.title.unwrap_or_default(),
            timestamp: request.timestamp.unwrap_or(now),
        })
        .await?;

    runtime
        .actor::<SessionActor>(&keys::session(app, &request.session_id))
        .record_page_view()
        .await?;
    runtime
        .actor::<VisitorActor>(&keys::visitor(app, &request.visitor_id))
        .record_page_view()
        .await
}

async fn event(runtime: &Runtime, request: &CollectRequest, now: DateTime<Utc>) -> anyhow::Result<()> {
    let data: EventData = payload(request)?;
    let app = &request.application_id;
    let category = data.category.unwrap_or_else(|| "Unknown".to_string());

    let record = runtime.actor::<EventActor>(&keys::event(app, &new_id()));
    record
        .record(NewEvent {
            application_id: app.clone(),
            organization_id: String::new(),
            session_id: request.session_id.clone(),
            visitor_id: request.visitor_id.clone(),
            category: category.clone(),
            action: data.action.unwrap_or_else(|| "Unknown".to_string()),
            label: data.label,
            value: data.value,
            timestamp: request.timestamp.unwrap_or(now),
            custom_properties: stringify(data.properties),
        })
        .await?;

    runtime
        .actor::<SessionActor>(&keys::session(app, &request.session_id))
        .record_event(&category)
        .await
}

async fn session_end(runtime: &Runtime, request: &CollectRequest) -> anyhow::Result<()> {
    let data: SessionEndData = payload(request)?;
    runtime
        .actor::<SessionActor>(&keys::session(&request.application_id, &request.session_id))
        .end(data.exit_page)
        .await
}

async fn identify(runtime: &Runtime, request: &CollectRequest) -> anyhow::Result<()> {
    let data: IdentifyData = payload(request)?;
    let Some(user_id) = data.user_id.filter(|id| !id.is_empty()) else {
        return Ok(());
    };
    runtime
        .actor::<VisitorActor>(&keys::visitor(&request.application_id, &request.visitor_id))
        .identify(&user_id)
        .await
}

async fn set_attributes(runtime: &Runtime, request: &CollectRequest) -> anyhow::Result<()> {
    let data: AttributesData = payload(request)?;
    let attributes = stringify(data.attributes);
    if attributes.is_empty() {
        return Ok(());
    }
    let attribute_keys: Vec<String> = attributes.keys().cloned().collect();

    let app = &request.application_id;
    runtime
        .actor::<VisitorActor>(&keys::visitor(app, &request.visitor_id))
        .set_attributes(attributes)
        .await?;
    runtime
        .actor::<ApplicationActor>(&keys::application(app))
        .register_user_attribute_keys(attribute_keys)
        .await
}

async fn conversion(runtime: &Runtime, request: &CollectRequest) -> anyhow::Result<()> {
    let data: ConversionData = payload(request)?;
    let Some(goal_id) = data.goal_id.filter(|id| !id.is_empty()) else {
        warn!(application_id = %request.application_id, "conversion without goal id ignored");
        return Ok(());
    };
    let app = &request.application_id;

    let session = runtime.actor::<SessionActor>(&keys::session(app, &request.session_id));
    let source = session.get_info().await?.source;
    runtime
        .actor::<ConversionActor>(&keys::conversion(app, &new_id()))
        .record(NewConversion {
            application_id: app.clone(),
            organization_id: String::new(),
            goal_id: goal_id.clone(),
            session_id: request.session_id.clone(),
            visitor_id: request.visitor_id.clone(),
            value: data.value,
            source,
            utm_campaign: data.utm_campaign,
        })
        .await?;
    session.record_conversion(&goal_id).await.map(drop)
}
