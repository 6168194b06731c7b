//! Storage engine for the nehmen calorie diary.
//!
//! Entries live in a local SQLite file whose layout is evolved by an ordered
//! list of versioned migrations. On top of the entry table sit two read paths:
//! lookups by calendar day and a bounded "recent and relevant" suggestion scan.

pub mod day;
pub mod db;
pub mod error;
pub mod models;
pub mod schema;
pub mod service;
pub mod suggest;

pub use day::{DayFormatter, LocalDay, UtcDay};
pub use db::Database;
pub use error::{Error, Result};
pub use models::{AutoSuggestion, DaySummary, Entry};
pub use schema::{MigrationReport, SCHEMA_VERSION};
pub use service::Store;
