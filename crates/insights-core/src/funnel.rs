use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::tracking::{count_untracked, track_visitor, VISITOR_SET_CAP};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunnelStepType {
    #[default]
    PageVisit,
    Event,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunnelStep {
    /// 1-based position in the funnel.
    pub order: u32,
    pub name: String,
    pub step_type: FunnelStepType,
    pub page_path: Option<String>,
    pub event_category: Option<String>,
    pub event_action: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunnelDefinition {
    pub id: String,
    pub application_id: String,
    pub name: String,
    pub steps: Vec<FunnelStep>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CreateFunnel {
    pub application_id: String,
    pub name: String,
    pub steps: Vec<FunnelStep>,
}

/// Persisted per-(funnel, day) step tracking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunnelDayState {
    pub funnel_id: String,
    pub date: Option<NaiveDate>,
    pub step_completions: BTreeMap<u32, u64>,
    pub step_visitors: BTreeMap<u32, HashSet<String>>,
}

/// Buffered step completions not yet merged into [`FunnelDayState`].
pub type PendingSteps = BTreeMap<u32, HashSet<String>>;

/// Read model of one funnel day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunnelDayAnalytics {
    pub funnel_id: String,
    pub date: Option<NaiveDate>,
    pub step_completions: BTreeMap<u32, u64>,
    pub step_visitors: BTreeMap<u32, HashSet<String>>,
}

impl FunnelDayState {
    /// Merge buffered completions, counting only visitors the capped per-step
    /// set has not seen. Returns how many completions were counted.
    pub fn merge_pending(&mut self, pending: &PendingSteps) -> u64 {
        let mut counted = 0;
        for (step, visitors) in pending {
            let set = self.step_visitors.entry(*step).or_default();
            let mut fresh = 0;
            for visitor in visitors {
                if track_visitor(set, visitor, VISITOR_SET_CAP) {
                    fresh += 1;
                }
            }
            if fresh > 0 {
                *self.step_completions.entry(*step).or_default() += fresh;
            }
            counted += fresh;
        }
        counted
    }

    /// The state as it would read after merging `pending`, without mutating it.
    pub fn overlay(&self, pending: &PendingSteps) -> FunnelDayAnalytics {
        let mut step_completions = self.step_completions.clone();
        let mut step_visitors = self.step_visitors.clone();
        for (step, visitors) in pending {
            let empty = HashSet::new();
            let persisted = self.step_visitors.get(step).unwrap_or(&empty);
            let fresh = count_untracked(persisted, visitors);
            if fresh == 0 {
                continue;
            }
            *step_completions.entry(*step).or_default() += fresh;
            let set = step_visitors.entry(*step).or_default();
            for visitor in visitors {
                if set.len() >= VISITOR_SET_CAP {
                    break;
                }
                set.insert(visitor.clone());
            }
        }
        FunnelDayAnalytics {
            funnel_id: self.funnel_id.clone(),
            date: self.date,
            step_completions,
            step_visitors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStepAnalytics {
    pub order: u32,
    pub name: String,
    pub step_type: FunnelStepType,
    pub visitors: u64,
    pub conversion_rate: f64,
    pub drop_off_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelAnalytics {
    pub funnel_id: String,
    pub funnel_name: String,
    pub steps: Vec<FunnelStepAnalytics>,
    pub total_entries: u64,
    pub total_completions: u64,
    pub overall_conversion_rate: f64,
}

impl FunnelAnalytics {
    /// Zero-valued result for a funnel whose definition could not be resolved.
    pub fn unknown() -> Self {
        Self {
            funnel_id: String::new(),
            funnel_name: "Unknown".to_string(),
            steps: Vec::new(),
            total_entries: 0,
            total_completions: 0,
            overall_conversion_rate: 0.0,
        }
    }
}

/// Day-level results merged across a date range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedFunnelDays {
    pub step_completions: BTreeMap<u32, u64>,
    pub step_visitors: BTreeMap<u32, HashSet<String>>,
}

/// Sum step counts and union step visitor sets.
pub fn merge_days<I>(days: I) -> MergedFunnelDays
where
    I: IntoIterator<Item = FunnelDayAnalytics>,
{
    let mut merged = MergedFunnelDays::default();
    for day in days {
        for (step, count) in day.step_completions {
            *merged.step_completions.entry(step).or_default() += count;
        }
        for (step, visitors) in day.step_visitors {
            merged.step_visitors.entry(step).or_default().extend(visitors);
        }
    }
    merged
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Per-step rates relative to the previous step's distinct visitors.
///
/// Step order 1 always reports 100% conversion and 0% drop-off. Steps are
/// visited in ascending order regardless of how the definition lists them.
pub fn compute_funnel_analytics(
    definition: &FunnelDefinition,
    merged: &MergedFunnelDays,
) -> FunnelAnalytics {
    let visitors_at = |order: u32| {
        merged
            .step_visitors
            .get(&order)
            .map_or(0, |set| set.len() as u64)
    };

    let mut ordered: Vec<&FunnelStep> = definition.steps.iter().collect();
    ordered.sort_by_key(|s| s.order);

    let mut previous = visitors_at(1);
    let mut steps = Vec::with_capacity(ordered.len());
    for step in ordered {
        let visitors = visitors_at(step.order);
        let (conversion_rate, drop_off_rate) = if step.order == 1 {
            (100.0, 0.0)
        } else {
            (
                percent(visitors, previous),
                percent(previous.saturating_sub(visitors), previous),
            )
        };
        steps.push(FunnelStepAnalytics {
            order: step.order,
            name: step.name.clone(),
            step_type: step.step_type,
            visitors,
            conversion_rate,
            drop_off_rate,
        });
        previous = visitors;
    }

    let total_entries = steps.first().map_or(0, |s| s.visitors);
    let total_completions = steps.last().map_or(0, |s| s.visitors);
    FunnelAnalytics {
        funnel_id: definition.id.clone(),
        funnel_name: definition.name.clone(),
        steps,
        total_entries,
        total_completions,
        overall_conversion_rate: percent(total_completions, total_entries),
    }
}
