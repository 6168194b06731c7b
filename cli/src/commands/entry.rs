use anyhow::{Result, bail};

use nehmen_core::{DayFormatter, Entry, Store};

use super::helpers::{exit_not_found, kind_label, parse_when, print_entry_table};

/// Field changes for `edit`. `None` leaves a field as it is.
#[derive(Debug, Default)]
pub(crate) struct EntryEdit {
    pub calories: Option<i64>,
    pub description: Option<Option<String>>,
    pub exercise: Option<bool>,
    pub at: Option<String>,
}

impl EntryEdit {
    fn is_empty(&self) -> bool {
        self.calories.is_none()
            && self.description.is_none()
            && self.exercise.is_none()
            && self.at.is_none()
    }

    /// Apply the changes to `entry`, re-deriving `day` when the time moves.
    fn apply(self, entry: &mut Entry, days: &dyn DayFormatter) -> Result<()> {
        if let Some(calories) = self.calories {
            entry.calories = calories;
        }
        if let Some(description) = self.description {
            entry.description = description;
        }
        if let Some(exercise) = self.exercise {
            entry.exercise = Some(exercise);
        }
        if let Some(at) = self.at {
            entry.set_timestamp(parse_when(Some(&at))?, days);
        }
        Ok(())
    }
}

fn describe(entry: &Entry) -> String {
    let name = entry.description.as_deref().unwrap_or("(no description)");
    let cal = entry.calories;
    let kind = kind_label(entry.exercise);
    let day = &entry.day;
    format!("{name}: {cal} kcal {kind} on {day}")
}

pub(crate) async fn cmd_add(
    store: &Store,
    calories: i64,
    description: Option<String>,
    exercise: bool,
    at: Option<&str>,
    json: bool,
) -> Result<()> {
    let timestamp = parse_when(at)?;
    let description = description.filter(|d| !d.trim().is_empty());
    let entry = store.new_entry(description, calories, Some(exercise), timestamp);
    store.upsert(entry.clone()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        let id = &entry.id;
        println!("Added {} (id: {id})", describe(&entry));
    }

    Ok(())
}

pub(crate) async fn cmd_edit(store: &Store, id: &str, edit: EntryEdit, json: bool) -> Result<()> {
    if edit.is_empty() {
        bail!(
            "Nothing to update. Provide at least one of --calories, --description, --exercise or --at"
        );
    }

    let Some(mut entry) = store.get_by_id(id).await? else {
        exit_not_found(&format!("Entry {id} not found"), json);
    };
    edit.apply(&mut entry, store.day_formatter())?;
    store.upsert(entry.clone()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("Updated entry {id}: {}", describe(&entry));
    }

    Ok(())
}

pub(crate) async fn cmd_delete(store: &Store, id: &str, json: bool) -> Result<()> {
    if !store.remove(id).await? {
        exit_not_found(&format!("Entry {id} not found"), json);
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted entry {id}");
    }
    Ok(())
}

pub(crate) async fn cmd_show(store: &Store, id: &str, json: bool) -> Result<()> {
    let Some(entry) = store.get_by_id(id).await? else {
        exit_not_found(&format!("Entry {id} not found"), json);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        print_entry_table(std::slice::from_ref(&entry));
    }
    Ok(())
}
