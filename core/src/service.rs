//! Async handle over the entry store.
//!
//! SQLite calls block, so every operation runs on tokio's blocking pool while
//! holding the handle's lock. The store is migrated inside [`Store::open`];
//! a `Store` value therefore always points at a schema at the target version.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::task;

use crate::day::{DayFormatter, LocalDay};
use crate::db::Database;
use crate::error::Result;
use crate::models::{AutoSuggestion, DaySummary, Entry};

#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Database>>,
    days: Arc<dyn DayFormatter>,
}

impl Store {
    /// Open (creating and migrating if needed) the store at `path`, using
    /// local-time calendar days.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let db = task::spawn_blocking(move || Database::open(&path)).await??;
        Ok(Self::from_database(db))
    }

    pub async fn open_with(
        path: impl Into<PathBuf>,
        days: Arc<dyn DayFormatter>,
    ) -> Result<Self> {
        let path = path.into();
        let db = task::spawn_blocking(move || Database::open_with(&path, days)).await??;
        Ok(Self::from_database(db))
    }

    pub async fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(Arc::new(LocalDay)).await
    }

    pub async fn open_in_memory_with(days: Arc<dyn DayFormatter>) -> Result<Self> {
        let db = task::spawn_blocking(move || Database::open_in_memory_with(days)).await??;
        Ok(Self::from_database(db))
    }

    #[must_use]
    pub fn from_database(db: Database) -> Self {
        let days = db.day_formatter();
        Self {
            db: Arc::new(Mutex::new(db)),
            days,
        }
    }

    /// Run `op` against the database on the blocking pool.
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let guard = db.lock().unwrap_or_else(PoisonError::into_inner);
            op(&*guard)
        })
        .await?
    }

    #[must_use]
    pub fn day_formatter(&self) -> &dyn DayFormatter {
        self.days.as_ref()
    }

    /// Calendar day key for `timestamp`.
    #[must_use]
    pub fn day_string(&self, timestamp: DateTime<Utc>) -> String {
        self.days.day_string(timestamp)
    }

    /// A new, not yet stored entry with its id and day filled in.
    #[must_use]
    pub fn new_entry(
        &self,
        description: Option<String>,
        calories: i64,
        exercise: Option<bool>,
        timestamp: DateTime<Utc>,
    ) -> Entry {
        Entry::new(description, calories, exercise, timestamp, self.days.as_ref())
    }

    pub async fn schema_version(&self) -> Result<u32> {
        self.run(Database::schema_version).await
    }

    // --- Entries ---

    pub async fn upsert(&self, entry: Entry) -> Result<()> {
        self.run(move |db| db.upsert(&entry)).await
    }

    pub async fn remove(&self, id: impl Into<String>) -> Result<bool> {
        let id = id.into();
        self.run(move |db| db.remove(&id)).await
    }

    pub async fn get_by_id(&self, id: impl Into<String>) -> Result<Option<Entry>> {
        let id = id.into();
        self.run(move |db| db.get_by_id(&id)).await
    }

    pub async fn get_by_day(&self, day: impl Into<String>) -> Result<Vec<Entry>> {
        let day = day.into();
        self.run(move |db| db.get_by_day(&day)).await
    }

    pub async fn get_by_day_range(
        &self,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Result<Vec<Entry>> {
        let (from, to) = (from.into(), to.into());
        self.run(move |db| db.get_by_day_range(&from, &to)).await
    }

    pub async fn get_all(&self) -> Result<Vec<Entry>> {
        self.run(Database::get_all).await
    }

    pub async fn count(&self) -> Result<u64> {
        self.run(Database::count).await
    }

    pub async fn has_older_than(&self, day: impl Into<String>) -> Result<bool> {
        let day = day.into();
        self.run(move |db| db.has_older_than(&day)).await
    }

    // --- Suggestions ---

    pub async fn suggest(&self, search: impl Into<String>) -> Result<Vec<AutoSuggestion>> {
        let search = search.into();
        self.run(move |db| db.suggest(&search)).await
    }

    pub async fn suggest_with_budget(
        &self,
        search: impl Into<String>,
        scan_budget: usize,
    ) -> Result<Vec<AutoSuggestion>> {
        let search = search.into();
        self.run(move |db| db.suggest_with_budget(&search, scan_budget))
            .await
    }

    // --- Settings ---

    pub async fn daily_limit(&self) -> Result<Option<i64>> {
        self.run(Database::daily_limit).await
    }

    pub async fn set_daily_limit(&self, limit: Option<i64>) -> Result<()> {
        self.run(move |db| db.set_daily_limit(limit)).await
    }

    pub async fn day_summary(&self, day: impl Into<String>) -> Result<DaySummary> {
        let day = day.into();
        self.run(move |db| db.build_day_summary(&day)).await
    }
}
