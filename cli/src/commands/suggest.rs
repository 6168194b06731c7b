use anyhow::Result;
use std::process;

use nehmen_core::Store;

use super::helpers::print_suggestion_table;

pub(crate) async fn cmd_suggest(
    store: &Store,
    search: &str,
    budget: usize,
    json: bool,
) -> Result<()> {
    let suggestions = store.suggest_with_budget(search, budget).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&suggestions)?);
        return Ok(());
    }

    if suggestions.is_empty() {
        eprintln!("No suggestions for '{search}'");
        process::exit(2);
    }

    print_suggestion_table(&suggestions);
    Ok(())
}
