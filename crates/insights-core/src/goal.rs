use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalType {
    #[default]
    PageView,
    Event,
    Duration,
    PagesPerSession,
}

/// Type-specific matching parameters. Only the fields relevant to the goal's
/// [`GoalType`] are consulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalCondition {
    pub url_pattern: Option<String>,
    pub event_category: Option<String>,
    pub event_action: Option<String>,
    pub min_duration_seconds: Option<u64>,
    pub min_pages_viewed: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub application_id: String,
    pub name: String,
    pub goal_type: GoalType,
    pub condition: GoalCondition,
    pub monetary_value: Option<f64>,
    pub is_active: bool,
    pub total_conversions: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateGoal {
    pub application_id: String,
    pub name: String,
    pub goal_type: GoalType,
    pub condition: GoalCondition,
    pub monetary_value: Option<f64>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateGoal {
    pub name: Option<String>,
    pub condition: Option<GoalCondition>,
    pub monetary_value: Option<f64>,
    pub is_active: Option<bool>,
}

/// What a visitor just did, as seen by goal evaluation.
#[derive(Debug, Clone, Default)]
pub struct GoalContext {
    pub page_path: Option<String>,
    pub event_category: Option<String>,
    pub event_action: Option<String>,
    pub session_duration_seconds: u64,
    pub pages_viewed: u32,
}

impl Goal {
    /// Whether `ctx` satisfies this goal. Inactive goals never match.
    pub fn evaluate(&self, ctx: &GoalContext) -> bool {
        if !self.is_active {
            return false;
        }
        let condition = &self.condition;
        match self.goal_type {
            GoalType::PageView => {
                matches_page(ctx.page_path.as_deref(), condition.url_pattern.as_deref())
            }
            GoalType::Event => matches_event(
                ctx.event_category.as_deref(),
                ctx.event_action.as_deref(),
                condition,
            ),
            GoalType::Duration => {
                ctx.session_duration_seconds >= condition.min_duration_seconds.unwrap_or(0)
            }
            GoalType::PagesPerSession => {
                ctx.pages_viewed >= condition.min_pages_viewed.unwrap_or(0)
            }
        }
    }
}

/// Case-insensitive regex search of `path` against `pattern`. A pattern that
/// does not compile degrades to case-insensitive string equality.
pub fn matches_page(path: Option<&str>, pattern: Option<&str>) -> bool {
    let (Some(path), Some(pattern)) = (path, pattern) else {
        return false;
    };
    if path.is_empty() || pattern.is_empty() {
        return false;
    }
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(path),
        Err(_) => path.to_lowercase() == pattern.to_lowercase(),
    }
}

fn matches_filter(expected: Option<&str>, actual: Option<&str>) -> bool {
    match expected.filter(|e| !e.is_empty()) {
        None => true,
        Some(expected) => actual.is_some_and(|a| a.to_lowercase() == expected.to_lowercase()),
    }
}

/// Category and action on the condition are optional filters; an empty or
/// missing filter matches anything. The observed category itself is required.
pub fn matches_event(
    category: Option<&str>,
    action: Option<&str>,
    condition: &GoalCondition,
) -> bool {
    let Some(category) = category.filter(|c| !c.is_empty()) else {
        return false;
    };
    matches_filter(condition.event_category.as_deref(), Some(category))
        && matches_filter(condition.event_action.as_deref(), action)
}
