//! Calendar-day derivation for entries.
//!
//! The day string is the key of the `by_day` index, so its format must not
//! change between versions: `YYYY-MM-DD`, zero padded, which also makes
//! lexicographic order equal chronological order.

use chrono::{DateTime, FixedOffset, Local, Utc};

/// Format used for every stored day key.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Maps an instant to the calendar day it belongs to.
///
/// The CLI uses [`LocalDay`]; tests and embedders that need a stable zone
/// can supply a [`FixedOffset`].
pub trait DayFormatter: Send + Sync {
    fn day_string(&self, timestamp: DateTime<Utc>) -> String;
}

/// Calendar day in the machine's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDay;

impl DayFormatter for LocalDay {
    fn day_string(&self, timestamp: DateTime<Utc>) -> String {
        timestamp
            .with_timezone(&Local)
            .format(DAY_FORMAT)
            .to_string()
    }
}

impl DayFormatter for FixedOffset {
    fn day_string(&self, timestamp: DateTime<Utc>) -> String {
        timestamp.with_timezone(self).format(DAY_FORMAT).to_string()
    }
}

/// Calendar day in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtcDay;

impl DayFormatter for UtcDay {
    fn day_string(&self, timestamp: DateTime<Utc>) -> String {
        timestamp.format(DAY_FORMAT).to_string()
    }
}
