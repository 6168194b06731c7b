mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    EntryEdit, cmd_add, cmd_day, cmd_delete, cmd_edit, cmd_limit, cmd_list, cmd_show, cmd_suggest,
};
use crate::config::Config;
use nehmen_core::Store;

#[derive(Parser)]
#[command(
    name = "nehmen",
    version,
    about = "A local-first calorie and exercise diary",
    long_about = None
)]
struct Cli {
    /// Use this database file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Show debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record calories eaten (or burned with --exercise)
    Add {
        /// Calories
        #[arg(allow_negative_numbers = true)]
        calories: i64,
        /// What it was (e.g. "Apple", "Evening run")
        description: Option<String>,
        /// Mark the entry as burned calories
        #[arg(short, long)]
        exercise: bool,
        /// When: now, HH:MM, YYYY-MM-DD, "YYYY-MM-DD HH:MM" or RFC 3339 (default: now)
        #[arg(long)]
        at: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace fields of an existing entry
    Edit {
        /// Entry ID
        id: String,
        /// New calories
        #[arg(short, long, allow_negative_numbers = true)]
        calories: Option<i64>,
        /// New description
        #[arg(short, long, conflicts_with = "clear_description")]
        description: Option<String>,
        /// Remove the description
        #[arg(long)]
        clear_description: bool,
        /// Mark as burned calories
        #[arg(long, conflicts_with = "no_exercise")]
        exercise: bool,
        /// Mark as eaten calories
        #[arg(long)]
        no_exercise: bool,
        /// New time (same formats as `add --at`)
        #[arg(long)]
        at: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an entry by ID
    Delete {
        /// Entry ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a single entry
    Show {
        /// Entry ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show entries and totals for a day (defaults to today)
    Day {
        /// Day to show (YYYY-MM-DD or today/yesterday/tomorrow)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List entries, optionally limited to a day range
    List {
        /// First day (inclusive)
        #[arg(long, requires = "to")]
        from: Option<String>,
        /// Last day (inclusive)
        #[arg(long, requires = "from")]
        to: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Suggest previous entries matching a search text
    Suggest {
        /// Text to look for in descriptions
        search: String,
        /// Number of recent entries to scan
        #[arg(
            long,
            default_value_t = nehmen_core::suggest::DEFAULT_SCAN_BUDGET,
            value_parser = parse_budget
        )]
        budget: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or set the daily calorie limit
    Limit {
        /// New limit in kcal
        calories: Option<i64>,
        /// Remove the limit
        #[arg(long, conflicts_with = "calories")]
        clear: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the local JSON API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication
        #[arg(long)]
        no_auth: bool,
    },
}

fn parse_budget(s: &str) -> Result<usize, String> {
    let max = nehmen_core::suggest::MAX_SCAN_BUDGET;
    match s.parse::<usize>() {
        Ok(n) if (1..=max).contains(&n) => Ok(n),
        Ok(_) => Err(format!("budget must be between 1 and {max}")),
        Err(e) => Err(e.to_string()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    let store = Store::open(&config.db_path).await?;

    match cli.command {
        Commands::Add {
            calories,
            description,
            exercise,
            at,
            json,
        } => cmd_add(&store, calories, description, exercise, at.as_deref(), json).await,
        Commands::Edit {
            id,
            calories,
            description,
            clear_description,
            exercise,
            no_exercise,
            at,
            json,
        } => {
            let edit = EntryEdit {
                calories,
                description: if clear_description {
                    Some(None)
                } else {
                    description.map(Some)
                },
                exercise: match (exercise, no_exercise) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
                at,
            };
            cmd_edit(&store, &id, edit, json).await
        }
        Commands::Delete { id, json } => cmd_delete(&store, &id, json).await,
        Commands::Show { id, json } => cmd_show(&store, &id, json).await,
        Commands::Day { date, json } => cmd_day(&store, date, json).await,
        Commands::List { from, to, json } => cmd_list(&store, from, to, json).await,
        Commands::Suggest {
            search,
            budget,
            json,
        } => cmd_suggest(&store, &search, budget, json).await,
        Commands::Limit {
            calories,
            clear,
            json,
        } => cmd_limit(&store, calories, clear, json).await,
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?)
            };
            server::start_server(store, port, &bind, api_key).await
        }
    }
}
