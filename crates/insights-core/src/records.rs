//! Immutable, write-once records: custom events, page views and conversions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::traffic::TrafficSource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub application_id: String,
    pub organization_id: String,
    pub session_id: String,
    pub visitor_id: String,
    pub category: String,
    pub action: String,
    pub label: Option<String>,
    pub value: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub custom_properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub application_id: String,
    pub organization_id: String,
    pub session_id: String,
    pub visitor_id: String,
    pub category: String,
    pub action: String,
    pub label: Option<String>,
    pub value: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub custom_properties: BTreeMap<String, String>,
}

impl NewEvent {
    pub fn into_record(self, id: &str) -> EventRecord {
        EventRecord {
            id: id.to_string(),
            application_id: self.application_id,
            organization_id: self.organization_id,
            session_id: self.session_id,
            visitor_id: self.visitor_id,
            category: self.category,
            action: self.action,
            label: self.label,
            value: self.value,
            timestamp: self.timestamp,
            custom_properties: self.custom_properties,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageViewRecord {
    pub id: String,
    pub application_id: String,
    pub organization_id: String,
    pub session_id: String,
    pub visitor_id: String,
    pub page_path: String,
    pub page_title: String,
    pub timestamp: DateTime<Utc>,
    pub time_on_page_seconds: u32,
    pub scroll_depth_percent: u8,
}

#[derive(Debug, Clone, Default)]
pub struct NewPageView {
    pub application_id: String,
    pub organization_id: String,
    pub session_id: String,
    pub visitor_id: String,
    pub page_path: String,
    pub page_title: String,
    pub timestamp: DateTime<Utc>,
}

impl NewPageView {
    pub fn into_record(self, id: &str) -> PageViewRecord {
        PageViewRecord {
            id: id.to_string(),
            application_id: self.application_id,
            organization_id: self.organization_id,
            session_id: self.session_id,
            visitor_id: self.visitor_id,
            page_path: self.page_path,
            page_title: self.page_title,
            timestamp: self.timestamp,
            time_on_page_seconds: 0,
            scroll_depth_percent: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub id: String,
    pub application_id: String,
    pub organization_id: String,
    pub goal_id: String,
    pub session_id: String,
    pub visitor_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
    pub source: TrafficSource,
    pub utm_campaign: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewConversion {
    pub application_id: String,
    pub organization_id: String,
    pub goal_id: String,
    pub session_id: String,
    pub visitor_id: String,
    pub value: Option<f64>,
    pub source: TrafficSource,
    pub utm_campaign: Option<String>,
}

impl NewConversion {
    /// Conversions are stamped when recorded, not when the client saw them.
    pub fn into_record(self, id: &str, now: DateTime<Utc>) -> ConversionRecord {
        ConversionRecord {
            id: id.to_string(),
            application_id: self.application_id,
            organization_id: self.organization_id,
            goal_id: self.goal_id,
            session_id: self.session_id,
            visitor_id: self.visitor_id,
            timestamp: now,
            value: self.value,
            source: self.source,
            utm_campaign: self.utm_campaign,
        }
    }
}
