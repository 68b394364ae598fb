use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CohortState {
    pub application_id: String,
    pub cohort_week: String,
    pub total_visitors: u64,
    pub visitor_ids: HashSet<String>,
    pub returns_by_week: BTreeMap<u32, HashSet<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionCohortData {
    pub application_id: String,
    pub cohort_week: String,
    pub total_visitors: u64,
    /// Weeks since the cohort week mapped to distinct returning visitors.
    pub retention_by_week: BTreeMap<u32, u64>,
}

impl CohortState {
    /// Returns `true` if the visitor was not yet a member.
    pub fn add_visitor(&mut self, visitor_id: &str) -> bool {
        let added = self.visitor_ids.insert(visitor_id.to_string());
        if added {
            self.total_visitors += 1;
        }
        added
    }

    /// Record a return `weeks` after the cohort week. Non-members are ignored
    /// so a visitor cannot leak into another cohort's retention. Returns
    /// `true` if the week's set changed.
    pub fn record_return(&mut self, visitor_id: &str, weeks: u32) -> bool {
        if !self.visitor_ids.contains(visitor_id) {
            return false;
        }
        self.returns_by_week
            .entry(weeks)
            .or_default()
            .insert(visitor_id.to_string())
    }

    pub fn data(&self) -> RetentionCohortData {
        RetentionCohortData {
            application_id: self.application_id.clone(),
            cohort_week: self.cohort_week.clone(),
            total_visitors: self.total_visitors,
            retention_by_week: self
                .returns_by_week
                .iter()
                .map(|(week, set)| (*week, set.len() as u64))
                .collect(),
        }
    }
}

fn week_monday(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Whole ISO weeks between the week containing `first_seen` and the week
/// containing `now`. Zero for the same week or if `now` is earlier.
pub fn weeks_since(first_seen: NaiveDate, now: NaiveDate) -> u32 {
    let days = (week_monday(now) - week_monday(first_seen)).num_days();
    u32::try_from(days / 7).unwrap_or(0)
}
