use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::traffic::{classify, referrer_host, TrafficSource};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    pub application_id: String,
    pub organization_id: String,
    pub visitor_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub page_view_count: u32,
    pub event_count: u32,
    pub duration_seconds: u64,
    pub referrer_url: Option<String>,
    pub referrer_domain: Option<String>,
    pub source: TrafficSource,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub landing_page: Option<String>,
    pub exit_page: Option<String>,
    pub is_bounce: bool,
    pub has_conversion: bool,
    pub converted_goal_ids: Vec<String>,
    /// Hour bucket a bounce was attributed to. Carried in state but not yet
    /// consulted by `end`.
    pub bounce_counted_in_hour: Option<String>,
    /// Duration already forwarded to hourly metrics. Carried in state but not
    /// yet consulted by `end`.
    pub duration_added_to_metrics: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SessionStart {
    pub application_id: String,
    pub visitor_id: String,
    pub organization_id: String,
    pub referrer_url: Option<String>,
    pub landing_page: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// At most one page view so far; still a bounce.
    Started,
    Active,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub application_id: String,
    pub visitor_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub page_view_count: u32,
    pub event_count: u32,
    pub duration_seconds: u64,
    pub source: TrafficSource,
    pub is_bounce: bool,
    pub has_conversion: bool,
    pub status: SessionStatus,
}

impl SessionState {
    pub fn start(id: &str, data: SessionStart, now: DateTime<Utc>) -> Self {
        let referrer_domain = data.referrer_url.as_deref().and_then(referrer_host);
        let source = classify(data.referrer_url.as_deref(), data.utm_medium.as_deref());
        Self {
            id: id.to_string(),
            application_id: data.application_id,
            organization_id: data.organization_id,
            visitor_id: data.visitor_id,
            started_at: now,
            referrer_url: data.referrer_url,
            referrer_domain,
            source,
            utm_source: data.utm_source,
            utm_medium: data.utm_medium,
            utm_campaign: data.utm_campaign,
            landing_page: data.landing_page,
            is_bounce: true,
            ..Self::default()
        }
    }

    pub fn record_page_view(&mut self) {
        self.page_view_count += 1;
        if self.page_view_count > 1 {
            self.is_bounce = false;
        }
    }

    pub fn record_event(&mut self) {
        self.event_count += 1;
    }

    /// Stamp end time, exit page and duration. Calling it again recomputes
    /// from the original start.
    pub fn end(&mut self, exit_page: Option<String>, now: DateTime<Utc>) {
        self.ended_at = Some(now);
        self.exit_page = exit_page;
        self.duration_seconds = u64::try_from((now - self.started_at).num_seconds()).unwrap_or(0);
    }

    /// Returns `false` if the goal was already recorded for this session.
    pub fn record_conversion(&mut self, goal_id: &str) -> bool {
        if self.converted_goal_ids.iter().any(|g| g == goal_id) {
            return false;
        }
        self.converted_goal_ids.push(goal_id.to_string());
        self.has_conversion = true;
        true
    }

    pub fn status(&self) -> SessionStatus {
        if self.ended_at.is_some() {
            SessionStatus::Ended
        } else if self.is_bounce {
            SessionStatus::Started
        } else {
            SessionStatus::Active
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            application_id: self.application_id.clone(),
            visitor_id: self.visitor_id.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            page_view_count: self.page_view_count,
            event_count: self.event_count,
            duration_seconds: self.duration_seconds,
            source: self.source,
            is_bounce: self.is_bounce,
            has_conversion: self.has_conversion,
            status: self.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn started() -> SessionState {
        let now = Utc.with_ymd_and_hms(2026, 2, 10, 8, 0, 0).unwrap();
        SessionState::start(
            "session-site-s1",
            SessionStart {
                application_id: "site".to_string(),
                visitor_id: "v1".to_string(),
                referrer_url: Some("https://www.bing.com/search?q=x".to_string()),
                ..SessionStart::default()
            },
            now,
        )
    }

    #[test]
    fn start_classifies_and_bounces() {
        let s = started();
        assert!(s.is_bounce);
        assert_eq!(s.source, TrafficSource::OrganicSearch);
        assert_eq!(s.referrer_domain.as_deref(), Some("www.bing.com"));
        assert_eq!(s.status(), SessionStatus::Started);
    }

    #[test]
    fn second_page_view_clears_bounce() {
        let mut s = started();
        s.record_page_view();
        assert!(s.is_bounce);
        s.record_page_view();
        assert!(!s.is_bounce);
        assert_eq!(s.status(), SessionStatus::Active);
    }

    #[test]
    fn end_computes_duration() {
        let mut s = started();
        let later = s.started_at + Duration::seconds(125);
        s.end(Some("/bye".to_string()), later);
        assert_eq!(s.duration_seconds, 125);
        assert_eq!(s.exit_page.as_deref(), Some("/bye"));
        assert_eq!(s.status(), SessionStatus::Ended);
    }

    #[test]
    fn conversions_are_deduplicated() {
        let mut s = started();
        assert!(s.record_conversion("g1"));
        assert!(!s.record_conversion("g1"));
        assert!(s.record_conversion("g2"));
        assert_eq!(s.converted_goal_ids, vec!["g1", "g2"]);
        assert!(s.has_conversion);
    }
}
