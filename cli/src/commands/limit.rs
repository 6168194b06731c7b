use anyhow::{Result, bail};

use nehmen_core::Store;

pub(crate) async fn cmd_limit(
    store: &Store,
    calories: Option<i64>,
    clear: bool,
    json: bool,
) -> Result<()> {
    if clear {
        store.set_daily_limit(None).await?;
    } else if let Some(calories) = calories {
        if calories <= 0 {
            bail!("Daily limit must be positive, got {calories}");
        }
        store.set_daily_limit(Some(calories)).await?;
    }

    let limit = store.daily_limit().await?;

    if json {
        println!("{}", serde_json::json!({ "daily_limit": limit }));
        return Ok(());
    }

    match limit {
        Some(limit) => println!("Daily limit: {limit} kcal"),
        None => println!("No daily limit set. Set one with: nehmen limit <KCAL>"),
    }
    Ok(())
}
