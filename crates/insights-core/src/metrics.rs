use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::tracking::{count_untracked, track_visitor, VISITOR_SET_CAP};

/// Durable state of one (application, hour) bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HourlyMetricsState {
    pub application_id: String,
    pub hour_start: Option<DateTime<Utc>>,
    pub page_views: u64,
    pub sessions: u64,
    pub unique_visitors: u64,
    pub events: u64,
    pub conversions: u64,
    pub conversion_value: f64,
    pub bounces: i64,
    pub total_duration_seconds: u64,
    pub unique_visitor_ids: HashSet<String>,
    pub events_by_category: BTreeMap<String, u64>,
    pub conversions_by_goal: BTreeMap<String, u64>,
}

/// Increments accumulated in memory between flushes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HourlyBuffer {
    pub page_views: u64,
    pub sessions: u64,
    pub events: u64,
    /// Net bounce delta; a decrement can arrive before any increment.
    pub bounces: i64,
    pub duration_seconds: u64,
    pub events_by_category: BTreeMap<String, u64>,
    pub visitors: HashSet<String>,
}

impl HourlyBuffer {
    pub fn is_empty(&self) -> bool {
        self.page_views == 0
            && self.sessions == 0
            && self.events == 0
            && self.bounces == 0
            && self.duration_seconds == 0
            && self.events_by_category.is_empty()
            && self.visitors.is_empty()
    }
}

/// Read model for an hourly bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HourlyMetrics {
    pub application_id: String,
    pub hour_start: Option<DateTime<Utc>>,
    pub page_views: u64,
    pub sessions: u64,
    pub unique_visitors: u64,
    pub events: u64,
    pub conversions: u64,
    pub conversion_value: f64,
    pub bounces: i64,
    pub total_duration_seconds: u64,
    pub events_by_category: BTreeMap<String, u64>,
    pub conversions_by_goal: BTreeMap<String, u64>,
}

impl HourlyMetricsState {
    /// Fold a buffer into durable counters.
    pub fn apply(&mut self, buffer: &HourlyBuffer) {
        self.page_views += buffer.page_views;
        self.sessions += buffer.sessions;
        self.events += buffer.events;
        self.bounces += buffer.bounces;
        self.total_duration_seconds += buffer.duration_seconds;
        for (category, count) in &buffer.events_by_category {
            *self.events_by_category.entry(category.clone()).or_default() += count;
        }
        for visitor in &buffer.visitors {
            if track_visitor(&mut self.unique_visitor_ids, visitor, VISITOR_SET_CAP) {
                self.unique_visitors += 1;
            }
        }
    }

    /// Conversions bypass the buffer and are applied directly.
    pub fn record_conversion(&mut self, goal_id: &str, value: Option<f64>) {
        self.conversions += 1;
        self.conversion_value += value.unwrap_or(0.0);
        *self.conversions_by_goal.entry(goal_id.to_string()).or_default() += 1;
    }

    /// Persisted totals with `buffer` applied, leaving `self` untouched.
    pub fn overlay(&self, buffer: &HourlyBuffer) -> HourlyMetrics {
        let mut events_by_category = self.events_by_category.clone();
        for (category, count) in &buffer.events_by_category {
            *events_by_category.entry(category.clone()).or_default() += count;
        }
        HourlyMetrics {
            application_id: self.application_id.clone(),
            hour_start: self.hour_start,
            page_views: self.page_views + buffer.page_views,
            sessions: self.sessions + buffer.sessions,
            unique_visitors: self.unique_visitors
                + count_untracked(&self.unique_visitor_ids, &buffer.visitors),
            events: self.events + buffer.events,
            conversions: self.conversions,
            conversion_value: self.conversion_value,
            bounces: self.bounces + buffer.bounces,
            total_duration_seconds: self.total_duration_seconds + buffer.duration_seconds,
            events_by_category,
            conversions_by_goal: self.conversions_by_goal.clone(),
        }
    }
}

/// Durable state and read model of one (application, day) rollup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub application_id: String,
    pub date: Option<NaiveDate>,
    pub page_views: u64,
    pub sessions: u64,
    /// Sum of hourly unique counts, so a visitor active in several hours
    /// counts once per hour.
    pub unique_visitors: u64,
    pub events: u64,
    pub conversions: u64,
    pub conversion_value: f64,
    pub bounces: i64,
    pub total_duration_seconds: u64,
    pub events_by_category: BTreeMap<String, u64>,
    pub conversions_by_goal: BTreeMap<String, u64>,
}

impl DailyMetrics {
    pub fn add_hour(&mut self, hour: &HourlyMetrics) {
        self.page_views += hour.page_views;
        self.sessions += hour.sessions;
        self.unique_visitors += hour.unique_visitors;
        self.events += hour.events;
        self.conversions += hour.conversions;
        self.conversion_value += hour.conversion_value;
        self.bounces += hour.bounces;
        self.total_duration_seconds += hour.total_duration_seconds;
        for (category, count) in &hour.events_by_category {
            *self.events_by_category.entry(category.clone()).or_default() += count;
        }
        for (goal, count) in &hour.conversions_by_goal {
            *self.conversions_by_goal.entry(goal.clone()).or_default() += count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_equals_apply() {
        let mut state = HourlyMetricsState::default();
        let mut first = HourlyBuffer::default();
        first.page_views = 3;
        first.visitors.insert("a".to_string());
        state.apply(&first);

        let mut second = HourlyBuffer::default();
        second.page_views = 1;
        second.bounces = -1;
        second.events = 2;
        second.events_by_category.insert("video".to_string(), 2);
        second.visitors.extend(["a".to_string(), "b".to_string()]);

        let projected = state.overlay(&second);
        state.apply(&second);
        let applied = state.overlay(&HourlyBuffer::default());
        assert_eq!(projected, applied);
        assert_eq!(applied.unique_visitors, 2);
        assert_eq!(applied.page_views, 4);
        assert_eq!(applied.bounces, -1);
    }

    #[test]
    fn conversions_accumulate_by_goal() {
        let mut state = HourlyMetricsState::default();
        state.record_conversion("g1", Some(19.5));
        state.record_conversion("g1", None);
        state.record_conversion("g2", Some(0.5));
        assert_eq!(state.conversions, 3);
        assert_eq!(state.conversion_value, 20.0);
        assert_eq!(state.conversions_by_goal["g1"], 2);
    }

    #[test]
    fn daily_sums_hours() {
        let mut hour = HourlyMetrics::default();
        hour.page_views = 5;
        hour.unique_visitors = 2;
        hour.events_by_category.insert("cta".to_string(), 1);
        let mut day = DailyMetrics::default();
        day.add_hour(&hour);
        day.add_hour(&hour);
        assert_eq!(day.page_views, 10);
        assert_eq!(day.unique_visitors, 4);
        assert_eq!(day.events_by_category["cta"], 2);
    }

    #[test]
    fn empty_buffer_reports_empty() {
        let mut buffer = HourlyBuffer::default();
        assert!(buffer.is_empty());
        buffer.bounces = -1;
        assert!(!buffer.is_empty());
    }
}
