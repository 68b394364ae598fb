use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSettings {
    pub session_timeout_minutes: u32,
    pub track_page_views: bool,
    pub track_events: bool,
    pub track_scroll_depth: bool,
    pub sampling_rate: f64,
    pub excluded_paths: Vec<String>,
    pub excluded_ip_ranges: Vec<String>,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            session_timeout_minutes: 30,
            track_page_views: true,
            track_events: true,
            track_scroll_depth: false,
            sampling_rate: 1.0,
            excluded_paths: Vec::new(),
            excluded_ip_ranges: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAttributeDefinition {
    pub key: String,
    pub is_filterable: bool,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationState {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub organization_id: String,
    pub domain: String,
    pub api_key: String,
    /// Exact origins, `*.domain` wildcards, or `*`. Empty means the app's own domain.
    pub allowed_origins: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    pub settings: ApplicationSettings,
    pub user_attributes: BTreeMap<String, UserAttributeDefinition>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateApplication {
    pub name: String,
    pub owner_id: String,
    pub organization_id: String,
    pub domain: String,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateApplication {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub allowed_origins: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub settings: Option<ApplicationSettings>,
}

/// `ins_` followed by a random UUID without dashes.
pub fn generate_api_key() -> String {
    format!("ins_{}", uuid::Uuid::new_v4().simple())
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_lowercase()
}

fn origin_host(origin: &str) -> Option<String> {
    let url = Url::parse(origin).ok()?;
    url.host_str().map(str::to_lowercase)
}

/// Check a request `Origin` against the allow-list.
///
/// Entries are matched in order: `*` allows anything; `*.example.com` allows
/// any subdomain of example.com but not example.com itself; anything else must
/// equal the full origin or its host, ignoring case and a trailing slash.
/// When the list is empty the application's own domain is the only entry.
pub fn is_origin_allowed(allowed: &[String], domain: &str, origin: &str) -> bool {
    let origin = normalize_origin(origin);
    if origin.is_empty() {
        return false;
    }
    let host = origin_host(&origin).unwrap_or_else(|| origin.clone());

    let fallback = [domain.to_string()];
    let entries = if allowed.is_empty() { &fallback[..] } else { allowed };

    entries.iter().any(|entry| {
        let entry = normalize_origin(entry);
        if entry.is_empty() {
            return false;
        }
        if entry == "*" {
            return true;
        }
        if let Some(base) = entry.strip_prefix("*.") {
            return host.len() > base.len() + 1
                && host.ends_with(base)
                && host[..host.len() - base.len()].ends_with('.');
        }
        entry == origin || entry == host
    })
}
