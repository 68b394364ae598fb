use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    /// `desktop`, `mobile` or `tablet`.
    pub device_type: Option<String>,
    pub is_mobile: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitorState {
    pub id: String,
    pub application_id: String,
    pub organization_id: String,
    pub user_id: Option<String>,
    /// `None` until the first visit is recorded.
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub total_sessions: u64,
    pub total_page_views: u64,
    pub country: Option<String>,
    pub city: Option<String>,
    pub user_agent: Option<String>,
    pub device: DeviceInfo,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct VisitData {
    pub application_id: String,
    pub organization_id: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub user_agent: Option<String>,
    pub device: Option<DeviceInfo>,
}

/// Result of recording a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitOutcome {
    pub is_new: bool,
    pub first_seen: DateTime<Utc>,
}

impl VisitorState {
    /// First visit stamps identity and `first_seen`; every visit bumps
    /// `last_seen`, the session counter and the latest client details.
    pub fn record_visit(&mut self, id: &str, data: VisitData, now: DateTime<Utc>) -> VisitOutcome {
        let is_new = self.first_seen.is_none();
        if is_new {
            self.id = id.to_string();
            self.application_id = data.application_id;
            self.organization_id = data.organization_id;
            self.first_seen = Some(now);
        }
        let first_seen = self.first_seen.unwrap_or(now);

        self.last_seen = Some(now);
        self.total_sessions += 1;
        if data.country.is_some() {
            self.country = data.country;
        }
        if data.city.is_some() {
            self.city = data.city;
        }
        if data.user_agent.is_some() {
            self.user_agent = data.user_agent;
        }
        if let Some(device) = data.device {
            self.device = device;
        }
        VisitOutcome { is_new, first_seen }
    }

    pub fn merge_attributes(&mut self, attributes: BTreeMap<String, String>) {
        self.attributes.extend(attributes);
    }
}
