use anyhow::{Context, Result, bail};
use chrono::{
    DateTime, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nehmen_core::day::DAY_FORMAT;
use nehmen_core::{AutoSuggestion, Entry};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, DAY_FORMAT).with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Parse a day argument into the stored `YYYY-MM-DD` key.
pub(crate) fn parse_day(date_str: Option<String>) -> Result<String> {
    Ok(parse_date(date_str)?.format(DAY_FORMAT).to_string())
}

/// Parse an entry time given in local time.
///
/// Accepts "now", "HH:MM" (today), "YYYY-MM-DD" (noon that day),
/// "YYYY-MM-DD HH:MM" and RFC 3339.
pub(crate) fn parse_when(s: Option<&str>) -> Result<DateTime<Utc>> {
    let Some(s) = s.map(str::trim) else {
        return Ok(Utc::now());
    };
    if s == "now" {
        return Ok(Utc::now());
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M") {
        return local_to_utc(naive);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, DAY_FORMAT) {
        return local_to_utc(date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default()));
    }
    if let Ok(time) = NaiveTime::parse_from_str(s, "%H:%M") {
        return local_to_utc(Local::now().date_naive().and_time(time));
    }
    bail!("Invalid time '{s}'. Use now, HH:MM, YYYY-MM-DD, 'YYYY-MM-DD HH:MM' or RFC 3339")
}

fn local_to_utc(naive: NaiveDateTime) -> Result<DateTime<Utc>> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(ts) | LocalResult::Ambiguous(ts, _) => Ok(ts.with_timezone(&Utc)),
        LocalResult::None => bail!("'{naive}' does not exist in the local time zone"),
    }
}

pub(crate) fn kind_label(exercise: Option<bool>) -> &'static str {
    if exercise.unwrap_or(false) {
        "burned"
    } else {
        "eaten"
    }
}

pub(crate) fn print_entry_table(entries: &[Entry]) {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Day")]
        day: String,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Description")]
        description: String,
        #[tabled(rename = "kcal")]
        calories: i64,
        #[tabled(rename = "Kind")]
        kind: &'static str,
    }

    let rows: Vec<EntryRow> = entries
        .iter()
        .map(|e| EntryRow {
            id: e.id.clone(),
            day: e.day.clone(),
            time: e.timestamp.with_timezone(&Local).format("%H:%M").to_string(),
            description: truncate(e.description_or_empty(), 40),
            calories: e.calories,
            kind: kind_label(e.exercise),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_suggestion_table(suggestions: &[AutoSuggestion]) {
    #[derive(Tabled)]
    struct SuggestionRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Description")]
        description: String,
        #[tabled(rename = "kcal")]
        calories: i64,
        #[tabled(rename = "Kind")]
        kind: &'static str,
        #[tabled(rename = "Used")]
        frequency: u32,
    }

    let rows: Vec<SuggestionRow> = suggestions
        .iter()
        .enumerate()
        .map(|(i, s)| SuggestionRow {
            idx: i + 1,
            description: truncate(s.description.as_deref().unwrap_or(""), 40),
            calories: s.calories,
            kind: kind_label(s.exercise),
            frequency: s.frequency,
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .with(Modify::new(Columns::new(4..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Report a missing record the CLI way: JSON error or stderr, then exit 2.
pub(crate) fn exit_not_found(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    std::process::exit(2);
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
