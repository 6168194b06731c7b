//! Autocomplete suggestions from recent history.
//!
//! There is no full-text index, so the scan is bounded: only the newest
//! [`DEFAULT_SCAN_BUDGET`] entries are ever looked at. The cursor is pulled
//! lazily and dropped as soon as the budget is spent.

use std::collections::HashMap;
use std::collections::hash_map::Entry as Slot;

use tracing::debug;

use crate::error::Result;
use crate::models::{AutoSuggestion, Entry};

/// How many of the most recent entries a suggestion query inspects.
pub const DEFAULT_SCAN_BUDGET: usize = 1000;

/// Upper bound on any caller-supplied budget.
pub const MAX_SCAN_BUDGET: usize = DEFAULT_SCAN_BUDGET * 10;

/// Group key: description (missing = empty) and calories. `exercise` is not
/// part of it, so a burn and a meal with the same label and value merge.
type GroupKey = (String, i64);

/// Fold a newest-first stream of entries into suggestions.
///
/// At most `scan_budget` items (capped at [`MAX_SCAN_BUDGET`]) are pulled
/// from `entries`, matching or not.
/// Groups come back in first-seen order and keep the fields of their first
/// (most recent) entry.
pub fn aggregate<I>(entries: I, search: &str, scan_budget: usize) -> Result<Vec<AutoSuggestion>>
where
    I: IntoIterator<Item = Result<Entry>>,
{
    let needle = search.to_lowercase();
    let mut groups: Vec<AutoSuggestion> = Vec::new();
    let mut positions: HashMap<GroupKey, usize> = HashMap::new();
    let mut scanned = 0_usize;

    for entry in entries.into_iter().take(scan_budget.min(MAX_SCAN_BUDGET)) {
        let entry = entry?;
        scanned += 1;

        if !matches_search(&entry, &needle) {
            continue;
        }

        let key = (entry.description_or_empty().to_string(), entry.calories);
        match positions.entry(key) {
            Slot::Occupied(slot) => groups[*slot.get()].frequency += 1,
            Slot::Vacant(slot) => {
                slot.insert(groups.len());
                groups.push(AutoSuggestion::first_seen(&entry));
            }
        }
    }

    debug!(scanned, groups = groups.len(), "Suggestion scan finished");
    Ok(groups)
}

/// Case-insensitive substring test; `needle` must already be lower-cased.
fn matches_search(entry: &Entry, needle: &str) -> bool {
    entry
        .description_or_empty()
        .to_lowercase()
        .contains(needle)
}
