use anyhow::{Result, bail};
use std::process;

use nehmen_core::{Entry, Store};

use super::helpers::{parse_day, print_entry_table};

pub(crate) async fn cmd_day(store: &Store, date: Option<String>, json: bool) -> Result<()> {
    let day = parse_day(date)?;
    let summary = store.day_summary(day).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let day = &summary.day;
    if summary.entries.is_empty() {
        eprintln!("No entries for {day}");
        if summary.has_older {
            eprintln!("(older entries exist)");
        }
        process::exit(2);
    }

    println!("=== {day} ===\n");
    print_entry_table(&summary.entries);

    let consumed = summary.consumed;
    let burned = summary.burned;
    let net = summary.net;
    println!("\n  EATEN: {consumed} kcal | BURNED: {burned} kcal | NET: {net} kcal");

    if let (Some(limit), Some(remaining)) = (summary.daily_limit, summary.remaining) {
        println!("  LIMIT: {limit} kcal");
        if remaining < 0 {
            let over = -remaining;
            println!("  OVER BY: {over} kcal");
        } else {
            println!("  REMAINING: {remaining} kcal");
        }
    }

    if summary.has_older {
        println!("\n  Older entries exist. Run `nehmen list` to see them.");
    }

    Ok(())
}

pub(crate) async fn cmd_list(
    store: &Store,
    from: Option<String>,
    to: Option<String>,
    json: bool,
) -> Result<()> {
    let entries = match (from, to) {
        (Some(from), Some(to)) => {
            let (from, to) = (parse_day(Some(from))?, parse_day(Some(to))?);
            if from > to {
                bail!("--from ({from}) is after --to ({to})");
            }
            store.get_by_day_range(from, to).await?
        }
        _ => chronological(store.get_all().await?),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        eprintln!("No entries found");
        process::exit(2);
    }

    print_entry_table(&entries);
    let shown = entries.len();
    let total = store.count().await?;
    if u64::try_from(shown).is_ok_and(|n| n == total) {
        println!("{shown} entries");
    } else {
        println!("{shown} of {total} entries");
    }
    Ok(())
}

/// `get_all` comes back in id order; show it the way a diary reads.
fn chronological(mut entries: Vec<Entry>) -> Vec<Entry> {
    entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    entries
}
