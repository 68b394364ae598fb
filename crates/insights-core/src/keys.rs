//! Composite string keys that address every actor.
//!
//! Keys are the only contract with the outer web tier, so the formats here
//! are stable. Parsers never fail: a key that does not match its pattern
//! yields empty/`None` fields.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::tracking::shard_of;

/// Number of real-time presence shards per application.
pub const REALTIME_SHARD_COUNT: u32 = 16;

pub fn application(app_id: &str) -> String {
    format!("app-{app_id}")
}

pub fn visitor(app_id: &str, visitor_id: &str) -> String {
    format!("visitor-{app_id}-{visitor_id}")
}

pub fn session(app_id: &str, session_id: &str) -> String {
    format!("session-{app_id}-{session_id}")
}

pub fn event(app_id: &str, event_id: &str) -> String {
    format!("event-{app_id}-{event_id}")
}

pub fn page_view(app_id: &str, page_view_id: &str) -> String {
    format!("pv-{app_id}-{page_view_id}")
}

pub fn conversion(app_id: &str, conversion_id: &str) -> String {
    format!("conversion-{app_id}-{conversion_id}")
}

pub fn goal(app_id: &str, goal_id: &str) -> String {
    format!("goal-{app_id}-{goal_id}")
}

pub fn funnel(app_id: &str, funnel_id: &str) -> String {
    format!("funnel-{app_id}-{funnel_id}")
}

/// Hourly bucket key; `at` is truncated to its hour.
pub fn hourly_metrics(app_id: &str, at: DateTime<Utc>) -> String {
    format!("metrics-hourly-{app_id}-{}", hour_floor(at).format("%Y%m%d%H"))
}

pub fn daily_metrics(app_id: &str, date: NaiveDate) -> String {
    format!("metrics-daily-{app_id}-{}", date.format("%Y%m%d"))
}

pub fn funnel_analytics(funnel_id: &str, date: NaiveDate) -> String {
    format!("funnel-analytics-{funnel_id}-{}", date.format("%Y%m%d"))
}

pub fn funnel_summary(app_id: &str, funnel_id: &str) -> String {
    format!("funnel-summary-{app_id}-{funnel_id}")
}

pub fn realtime_shard(app_id: &str, shard: u32) -> String {
    format!("realtime-shard-{app_id}-{shard}")
}

/// The shard key that owns every presence write for `visitor_id`.
pub fn realtime_shard_for_visitor(app_id: &str, visitor_id: &str) -> String {
    realtime_shard(app_id, shard_of(visitor_id, REALTIME_SHARD_COUNT))
}

pub fn realtime_coordinator(app_id: &str) -> String {
    format!("realtime-{app_id}")
}

/// ISO year-week label, e.g. `2026W07`.
pub fn iso_week_label(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}W{:02}", week.year(), week.week())
}

pub fn cohort(app_id: &str, week_label: &str) -> String {
    format!("cohort-{app_id}-{week_label}")
}

/// Cohort key for the ISO week containing `at`.
pub fn cohort_for(app_id: &str, at: DateTime<Utc>) -> String {
    cohort(app_id, &iso_week_label(at.date_naive()))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HourlyKey {
    pub application_id: String,
    pub hour_start: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyKey {
    pub application_id: String,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunnelDayKey {
    pub funnel_id: String,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CohortKey {
    pub application_id: String,
    pub cohort_week: String,
}

/// Split `{prefix}{owner}-{suffix}` at the last dash. Owner ids may contain dashes.
fn split_owned(key: &str, prefix: &str) -> Option<(String, String)> {
    let rest = key.strip_prefix(prefix)?;
    let (owner, suffix) = rest.rsplit_once('-')?;
    if owner.is_empty() || suffix.is_empty() {
        return None;
    }
    Some((owner.to_string(), suffix.to_string()))
}

fn parse_day(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d").ok()
}

fn parse_hour(raw: &str) -> Option<DateTime<Utc>> {
    if raw.len() != 10 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let date = parse_day(raw.get(..8)?)?;
    let hour: u32 = raw.get(8..)?.parse().ok()?;
    let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
    Some(NaiveDateTime::new(date, time).and_utc())
}

pub fn parse_hourly_metrics(key: &str) -> HourlyKey {
    match split_owned(key, "metrics-hourly-") {
        Some((application_id, stamp)) => HourlyKey {
            application_id,
            hour_start: parse_hour(&stamp),
        },
        None => HourlyKey::default(),
    }
}

pub fn parse_daily_metrics(key: &str) -> DailyKey {
    match split_owned(key, "metrics-daily-") {
        Some((application_id, stamp)) => DailyKey {
            application_id,
            date: parse_day(&stamp),
        },
        None => DailyKey::default(),
    }
}

pub fn parse_funnel_analytics(key: &str) -> FunnelDayKey {
    match split_owned(key, "funnel-analytics-") {
        Some((funnel_id, stamp)) => FunnelDayKey {
            funnel_id,
            date: parse_day(&stamp),
        },
        None => FunnelDayKey::default(),
    }
}

pub fn parse_cohort(key: &str) -> CohortKey {
    match split_owned(key, "cohort-") {
        Some((application_id, cohort_week)) => CohortKey {
            application_id,
            cohort_week,
        },
        None => CohortKey::default(),
    }
}

/// Map a summary key onto the definition key it reads:
/// `funnel-summary-{app}-{funnel}` becomes `funnel-{app}-{funnel}`.
pub fn summary_definition_key(summary_key: &str) -> Option<String> {
    summary_key
        .strip_prefix("funnel-summary-")
        .filter(|rest| !rest.is_empty())
        .map(|rest| format!("funnel-{rest}"))
}

/// The application id a coordinator key aggregates over.
pub fn parse_realtime_coordinator(key: &str) -> String {
    key.strip_prefix("realtime-").unwrap_or_default().to_string()
}

/// Truncate to the start of the hour.
pub fn hour_floor(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}
