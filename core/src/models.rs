use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::day::DayFormatter;

/// One diary record: something eaten, or with `exercise` set, something burned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub calories: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise: Option<bool>,
    pub timestamp: DateTime<Utc>,
    /// Calendar day of `timestamp`, denormalized for the `by_day` index.
    pub day: String,
}

impl Entry {
    /// Build a new entry with a fresh id and its day derived from `timestamp`.
    #[must_use]
    pub fn new(
        description: Option<String>,
        calories: i64,
        exercise: Option<bool>,
        timestamp: DateTime<Utc>,
        days: &dyn DayFormatter,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description,
            calories,
            exercise,
            timestamp,
            day: days.day_string(timestamp),
        }
    }

    /// Move the entry to another instant, keeping `day` in step.
    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>, days: &dyn DayFormatter) {
        self.timestamp = timestamp;
        self.day = days.day_string(timestamp);
    }

    #[must_use]
    pub fn is_exercise(&self) -> bool {
        self.exercise.unwrap_or(false)
    }

    #[must_use]
    pub fn description_or_empty(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }
}

/// A previously entered `(description, calories)` combination offered for
/// autocomplete. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSuggestion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub calories: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise: Option<bool>,
    pub frequency: u32,
}

impl AutoSuggestion {
    pub(crate) fn first_seen(entry: &Entry) -> Self {
        Self {
            description: entry.description.clone(),
            calories: entry.calories,
            exercise: entry.exercise,
            frequency: 1,
        }
    }
}

/// Totals for one calendar day.
#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub day: String,
    pub entries: Vec<Entry>,
    pub consumed: i64,
    pub burned: i64,
    pub net: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<i64>,
    /// Whether anything was logged before this day.
    pub has_older: bool,
}

impl DaySummary {
    #[must_use]
    pub fn from_entries(
        day: &str,
        entries: Vec<Entry>,
        daily_limit: Option<i64>,
        has_older: bool,
    ) -> Self {
        let (burned, consumed) = entries
            .iter()
            .fold((0_i64, 0_i64), |(burned, consumed), e| {
                if e.is_exercise() {
                    (burned.saturating_add(e.calories), consumed)
                } else {
                    (burned, consumed.saturating_add(e.calories))
                }
            });
        // Totals saturate at the i64 bounds.
        let net = consumed.saturating_sub(burned);
        Self {
            day: day.to_string(),
            entries,
            consumed,
            burned,
            net,
            daily_limit,
            remaining: daily_limit.map(|limit| limit.saturating_sub(net)),
            has_older,
        }
    }
}

/// Reject entries whose stored day does not match their timestamp.
pub fn validate_entry(entry: &Entry, days: &dyn DayFormatter) -> Result<(), String> {
    if entry.id.trim().is_empty() {
        return Err("Entry id must not be empty".to_string());
    }
    let expected = days.day_string(entry.timestamp);
    if entry.day != expected {
        return Err(format!(
            "Entry day '{}' does not match its timestamp (expected '{expected}')",
            entry.day
        ));
    }
    Ok(())
}
