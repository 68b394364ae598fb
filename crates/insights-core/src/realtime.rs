use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
struct Presence {
    page: String,
    last_seen: DateTime<Utc>,
}

/// In-memory `visitor -> (page, last seen)` map held by one shard.
#[derive(Debug, Clone, Default)]
pub struct PresenceMap {
    entries: HashMap<String, Presence>,
}

impl PresenceMap {
    pub fn record(&mut self, visitor_id: &str, page: &str, now: DateTime<Utc>) {
        self.entries.insert(
            visitor_id.to_string(),
            Presence {
                page: page.to_string(),
                last_seen: now,
            },
        );
    }

    pub fn remove(&mut self, visitor_id: &str) -> bool {
        self.entries.remove(visitor_id).is_some()
    }

    /// Drop entries last seen more than `idle` before `now`. Returns the number evicted.
    pub fn evict_idle(&mut self, now: DateTime<Utc>, idle: Duration) -> usize {
        // A window reaching past the representable range keeps everyone.
        let Some(cutoff) = now.checked_sub_signed(idle) else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|_, p| p.last_seen >= cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> ShardSnapshot {
        let mut visitors_by_page = BTreeMap::new();
        for presence in self.entries.values() {
            *visitors_by_page.entry(presence.page.clone()).or_default() += 1;
        }
        ShardSnapshot {
            active_visitors: self.entries.len() as u64,
            visitors_by_page,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardSnapshot {
    pub active_visitors: u64,
    pub visitors_by_page: BTreeMap<String, u64>,
}

/// Application-wide presence view assembled by the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealTimeSnapshot {
    pub active_visitors: u64,
    pub visitors_by_page: BTreeMap<String, u64>,
    pub timestamp: DateTime<Utc>,
}

/// Sum shard counts and per-page counts. Shards partition visitors, so sums
/// are exact.
pub fn merge_snapshots<I>(shards: I, timestamp: DateTime<Utc>) -> RealTimeSnapshot
where
    I: IntoIterator<Item = ShardSnapshot>,
{
    let mut merged = RealTimeSnapshot {
        timestamp,
        ..RealTimeSnapshot::default()
    };
    for shard in shards {
        merged.active_visitors += shard.active_visitors;
        for (page, count) in shard.visitors_by_page {
            *merged.visitors_by_page.entry(page).or_default() += count;
        }
    }
    merged
}
