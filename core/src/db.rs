use std::path::Path;
use std::sync::Arc;

use chrono::DateTime;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::day::{DayFormatter, LocalDay};
use crate::error::{Error, Result};
use crate::models::{AutoSuggestion, DaySummary, Entry};
use crate::schema::{self, MigrationReport};
use crate::suggest::{self, DEFAULT_SCAN_BUDGET};

/// Settings key holding the daily calorie limit.
pub const DAILY_LIMIT_KEY: &str = "daily_limit";

const ENTRY_COLUMNS: &str = "id, description, calories, exercise, timestamp, day";

pub struct Database {
    conn: Connection,
    days: Arc<dyn DayFormatter>,
    migration: MigrationReport,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, Arc::new(LocalDay))
    }

    pub fn open_with(path: &Path, days: Arc<dyn DayFormatter>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        info!("Opening database at {}", path.display());
        let open_err = |source: rusqlite::Error| Error::Open {
            path: path.to_path_buf(),
            source,
        };
        let conn = Connection::open(path).map_err(open_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(open_err)?;

        Self::init(conn, days)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(Arc::new(LocalDay))
    }

    pub fn open_in_memory_with(days: Arc<dyn DayFormatter>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::Open {
            path: ":memory:".into(),
            source,
        })?;
        Self::init(conn, days)
    }

    fn init(mut conn: Connection, days: Arc<dyn DayFormatter>) -> Result<Self> {
        let migration = schema::ensure_schema(&mut conn, days.as_ref())?;
        Ok(Database {
            conn,
            days,
            migration,
        })
    }

    /// What the schema manager did while this handle was opened.
    #[must_use]
    pub fn migration_report(&self) -> &MigrationReport {
        &self.migration
    }

    pub fn schema_version(&self) -> Result<u32> {
        schema::schema_version(&self.conn).map_err(Error::read)
    }

    /// The formatter used for this store's day keys.
    #[must_use]
    pub fn day_formatter(&self) -> Arc<dyn DayFormatter> {
        Arc::clone(&self.days)
    }

    // --- Row mapping helpers ---

    // Expects columns in ENTRY_COLUMNS order:
    // 0: id, 1: description, 2: calories, 3: exercise, 4: timestamp (ms), 5: day
    fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<Entry> {
        let millis: i64 = row.get(4)?;
        let timestamp = DateTime::from_timestamp_millis(millis)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(4, millis))?;
        Ok(Entry {
            id: row.get(0)?,
            description: row.get(1)?,
            calories: row.get(2)?,
            exercise: row.get(3)?,
            timestamp,
            day: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        })
    }

    fn query_entries(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Entry>> {
        let mut stmt = self.conn.prepare(sql).map_err(Error::read)?;
        let entries = stmt
            .query_map(params, Self::entry_from_row)
            .map_err(Error::read)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::read)?;
        Ok(entries)
    }

    // --- Entries ---

    /// Insert the entry, or replace every field of the one stored under its id.
    ///
    /// `entry.day` is stored as given.
    pub fn upsert(&self, entry: &Entry) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO calory_entries (id, description, calories, exercise, timestamp, day)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    description = excluded.description,
                    calories = excluded.calories,
                    exercise = excluded.exercise,
                    timestamp = excluded.timestamp,
                    day = excluded.day",
                params![
                    entry.id,
                    entry.description,
                    entry.calories,
                    entry.exercise,
                    entry.timestamp.timestamp_millis(),
                    entry.day,
                ],
            )
            .map_err(Error::write)?;
        debug!(id = %entry.id, day = %entry.day, "Upserted entry");
        Ok(())
    }

    /// Delete the entry stored under `id`. Returns `false` if there was none.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM calory_entries WHERE id = ?1", params![id])
            .map_err(Error::write)?;
        Ok(rows > 0)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<Entry>> {
        self.conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM calory_entries WHERE id = ?1"),
                params![id],
                Self::entry_from_row,
            )
            .optional()
            .map_err(Error::read)
    }

    /// Every entry recorded on `day` (`YYYY-MM-DD`), oldest first.
    pub fn get_by_day(&self, day: &str) -> Result<Vec<Entry>> {
        self.query_entries(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM calory_entries WHERE day = ?1 ORDER BY timestamp"
            ),
            params![day],
        )
    }

    /// Entries whose day lies in `from..=to`, oldest first.
    pub fn get_by_day_range(&self, from: &str, to: &str) -> Result<Vec<Entry>> {
        self.query_entries(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM calory_entries
                 WHERE day >= ?1 AND day <= ?2
                 ORDER BY day, timestamp"
            ),
            params![from, to],
        )
    }

    /// Every entry in primary-key order.
    pub fn get_all(&self) -> Result<Vec<Entry>> {
        self.query_entries(
            &format!("SELECT {ENTRY_COLUMNS} FROM calory_entries ORDER BY id"),
            [],
        )
    }

    pub fn count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM calory_entries", [], |row| row.get(0))
            .map_err(Error::read)
    }

    /// Whether any entry was recorded on a day strictly before `day`.
    pub fn has_older_than(&self, day: &str) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM calory_entries WHERE day < ?1)",
                params![day],
                |row| row.get(0),
            )
            .map_err(Error::read)
    }

    // --- Suggestions ---

    pub fn suggest(&self, search: &str) -> Result<Vec<AutoSuggestion>> {
        self.suggest_with_budget(search, DEFAULT_SCAN_BUDGET)
    }

    /// Suggestions drawn from the `scan_budget` most recent entries.
    pub fn suggest_with_budget(
        &self,
        search: &str,
        scan_budget: usize,
    ) -> Result<Vec<AutoSuggestion>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM calory_entries ORDER BY timestamp DESC"
            ))
            .map_err(Error::read)?;
        let cursor = stmt
            .query_map([], Self::entry_from_row)
            .map_err(Error::read)?
            .map(|row| row.map_err(Error::read));
        suggest::aggregate(cursor, search, scan_budget)
    }

    // --- Settings ---

    pub fn set_setting<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_string(value)?;
        self.conn
            .execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(Error::write)?;
        Ok(())
    }

    pub fn get_setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Error::read)?;
        raw.map(|v| serde_json::from_str(&v))
            .transpose()
            .map_err(Error::from)
    }

    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM settings WHERE key = ?1", params![key])
            .map_err(Error::write)?;
        Ok(rows > 0)
    }

    pub fn daily_limit(&self) -> Result<Option<i64>> {
        self.get_setting(DAILY_LIMIT_KEY)
    }

    /// Set the daily calorie limit, or clear it with `None`.
    pub fn set_daily_limit(&self, limit: Option<i64>) -> Result<()> {
        match limit {
            Some(limit) => self.set_setting(DAILY_LIMIT_KEY, &limit),
            None => self.delete_setting(DAILY_LIMIT_KEY).map(|_| ()),
        }
    }

    pub fn build_day_summary(&self, day: &str) -> Result<DaySummary> {
        let entries = self.get_by_day(day)?;
        let limit = self.daily_limit()?;
        let has_older = self.has_older_than(day)?;
        Ok(DaySummary::from_entries(day, entries, limit, has_older))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::day::UtcDay;
    use crate::schema::SCHEMA_VERSION;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashSet;

    fn db() -> Database {
        Database::open_in_memory_with(Arc::new(UtcDay)).unwrap()
    }

    fn entry_at(description: &str, calories: i64, y: i32, m: u32, d: u32, h: u32) -> Entry {
        let ts = Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap();
        Entry::new(Some(description.to_string()), calories, None, ts, &UtcDay)
    }

    #[test]
    fn test_open_in_memory_at_target_version() {
        let db = db();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(db.migration_report().applied, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_upsert_and_get_by_id() {
        let db = db();
        let e = entry_at("Porridge", 350, 2024, 3, 1, 7);
        db.upsert(&e).unwrap();

        let fetched = db.get_by_id(&e.id).unwrap().unwrap();
        assert_eq!(fetched, e);
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_replaces_whole_record() {
        let db = db();
        let mut e = entry_at("Porridge", 350, 2024, 3, 1, 7);
        e.exercise = Some(false);
        db.upsert(&e).unwrap();

        e.description = None;
        e.calories = -20;
        e.exercise = None;
        e.set_timestamp(Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap(), &UtcDay);
        db.upsert(&e).unwrap();

        let fetched = db.get_by_id(&e.id).unwrap().unwrap();
        assert_eq!(fetched, e);
        assert_eq!(db.count().unwrap(), 1);
        assert!(db.get_by_day("2024-03-01").unwrap().is_empty());
    }

    #[test]
    fn test_upsert_does_not_recompute_day() {
        let db = db();
        let mut e = entry_at("Late snack", 200, 2024, 3, 1, 23);
        e.day = "2024-03-02".to_string();
        db.upsert(&e).unwrap();
        assert_eq!(db.get_by_day("2024-03-02").unwrap().len(), 1);
    }

    #[test]
    fn test_get_by_id_missing() {
        let db = db();
        assert!(db.get_by_id("nope").unwrap().is_none());
    }

    #[test]
    fn test_delete_then_lookup() {
        let db = db();
        let e = entry_at("Cake", 450, 2024, 3, 1, 15);
        db.upsert(&e).unwrap();

        assert!(db.remove(&e.id).unwrap());
        assert!(db.get_by_id(&e.id).unwrap().is_none());
        assert!(!db.remove(&e.id).unwrap());
    }

    #[test]
    fn test_get_by_day_is_complete() {
        let db = db();
        let wanted = vec![
            entry_at("Lunch", 600, 2024, 3, 2, 12),
            entry_at("Breakfast", 300, 2024, 3, 2, 8),
            entry_at("Dinner", 700, 2024, 3, 2, 19),
        ];
        let other = vec![
            entry_at("Dinner", 650, 2024, 3, 1, 19),
            entry_at("Breakfast", 320, 2024, 3, 3, 8),
        ];
        for e in wanted.iter().chain(other.iter()) {
            db.upsert(e).unwrap();
        }

        let got = db.get_by_day("2024-03-02").unwrap();
        let got_ids: HashSet<&str> = got.iter().map(|e| e.id.as_str()).collect();
        let want_ids: HashSet<&str> = wanted.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(got_ids, want_ids);
        assert_eq!(got[0].description.as_deref(), Some("Breakfast"));

        assert!(db.get_by_day("2024-03-04").unwrap().is_empty());
    }

    #[test]
    fn test_get_by_day_range() {
        let db = db();
        for d in 1..=5 {
            db.upsert(&entry_at("Meal", 500, 2024, 3, d, 12)).unwrap();
        }
        let got = db.get_by_day_range("2024-03-02", "2024-03-04").unwrap();
        let days: Vec<&str> = got.iter().map(|e| e.day.as_str()).collect();
        assert_eq!(days, vec!["2024-03-02", "2024-03-03", "2024-03-04"]);
    }

    #[test]
    fn test_get_all_in_key_order() {
        let db = db();
        let mut entries: Vec<Entry> = (1..=4)
            .map(|d| entry_at("Meal", 100, 2024, 3, d, 12))
            .collect();
        for e in &entries {
            db.upsert(e).unwrap();
        }
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(db.get_all().unwrap(), entries);
    }

    #[test]
    fn test_has_older_than_empty_store() {
        let db = db();
        assert!(!db.has_older_than("2024-03-01").unwrap());
        assert!(!db.has_older_than("9999-12-31").unwrap());
    }

    #[test]
    fn test_has_older_than_matches_scan() {
        let db = db();
        db.upsert(&entry_at("A", 1, 2024, 3, 5, 12)).unwrap();
        db.upsert(&entry_at("B", 1, 2024, 3, 9, 12)).unwrap();

        let all = db.get_all().unwrap();
        for probe in ["2024-03-01", "2024-03-05", "2024-03-06", "2024-03-09", "2024-03-10"] {
            let expected = all.iter().any(|e| e.day.as_str() < probe);
            assert_eq!(db.has_older_than(probe).unwrap(), expected, "probe {probe}");
        }
        assert!(!db.has_older_than("2024-03-05").unwrap());
        assert!(db.has_older_than("2024-03-06").unwrap());
    }

    #[test]
    fn test_suggest_groups_entries() {
        let db = db();
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let mut n = 0;
        let mut add = |description: &str, calories: i64, exercise: Option<bool>| {
            n += 1;
            let ts = base + Duration::minutes(n);
            db.upsert(&Entry::new(
                Some(description.to_string()),
                calories,
                exercise,
                ts,
                &UtcDay,
            ))
            .unwrap();
        };
        add("apple", 95, None);
        add("apple", 95, None);
        add("apple", 95, Some(true));
        add("apple", 95, None);
        add("banana", 105, None);

        let result = db.suggest("app").unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].frequency, 4);
        assert_eq!(result[0].exercise, None);
        assert_eq!(db.suggest("APP").unwrap(), result);
    }

    #[test]
    fn test_suggest_newest_first() {
        let db = db();
        db.upsert(&entry_at("Green tea", 2, 2024, 3, 1, 8)).unwrap();
        db.upsert(&entry_at("Black tea", 3, 2024, 3, 3, 8)).unwrap();
        db.upsert(&entry_at("Mint tea", 1, 2024, 3, 2, 8)).unwrap();

        let names: Vec<String> = db
            .suggest("tea")
            .unwrap()
            .into_iter()
            .filter_map(|s| s.description)
            .collect();
        assert_eq!(names, vec!["Black tea", "Mint tea", "Green tea"]);
    }

    #[test]
    fn test_suggest_scan_bound() {
        let mut db = db();
        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        {
            let tx = db.conn.transaction().unwrap();
            for i in 0..2000_i64 {
                let description = if i == 0 { "ancient granola" } else { "filler" };
                let ts = base + Duration::minutes(i);
                tx.execute(
                    "INSERT INTO calory_entries (id, description, calories, timestamp, day)
                     VALUES (?1, ?2, 10, ?3, ?4)",
                    params![
                        format!("e{i:04}"),
                        description,
                        ts.timestamp_millis(),
                        UtcDay.day_string(ts)
                    ],
                )
                .unwrap();
            }
            tx.commit().unwrap();
        }

        assert!(db.suggest("granola").unwrap().is_empty());
        assert_eq!(db.suggest_with_budget("granola", 2000).unwrap().len(), 1);

        let recent = db.suggest("filler").unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].frequency, 1000);
    }

    #[test]
    fn test_settings_roundtrip() {
        let db = db();
        assert_eq!(db.get_setting::<String>("theme").unwrap(), None);

        db.set_setting("theme", "dark").unwrap();
        assert_eq!(
            db.get_setting::<String>("theme").unwrap().as_deref(),
            Some("dark")
        );

        db.set_setting("theme", "light").unwrap();
        assert_eq!(
            db.get_setting::<String>("theme").unwrap().as_deref(),
            Some("light")
        );

        assert!(db.delete_setting("theme").unwrap());
        assert!(!db.delete_setting("theme").unwrap());
    }

    #[test]
    fn test_settings_do_not_touch_entries() {
        let db = db();
        db.set_daily_limit(Some(1800)).unwrap();
        assert_eq!(db.count().unwrap(), 0);
        assert_eq!(db.daily_limit().unwrap(), Some(1800));

        db.set_daily_limit(None).unwrap();
        assert_eq!(db.daily_limit().unwrap(), None);
    }

    #[test]
    fn test_build_day_summary() {
        let db = db();
        db.set_daily_limit(Some(2000)).unwrap();
        db.upsert(&entry_at("Yesterday", 900, 2024, 3, 1, 12)).unwrap();
        db.upsert(&entry_at("Pizza", 1100, 2024, 3, 2, 19)).unwrap();
        let mut run = entry_at("Run", 400, 2024, 3, 2, 7);
        run.exercise = Some(true);
        db.upsert(&run).unwrap();

        let s = db.build_day_summary("2024-03-02").unwrap();
        assert_eq!(s.entries.len(), 2);
        assert_eq!(s.consumed, 1100);
        assert_eq!(s.burned, 400);
        assert_eq!(s.net, 700);
        assert_eq!(s.remaining, Some(1300));
        assert!(s.has_older);

        let first = db.build_day_summary("2024-03-01").unwrap();
        assert!(!first.has_older);
    }

    #[test]
    fn test_reopen_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("diary.db");

        let e = entry_at("Soup", 250, 2024, 3, 1, 12);
        {
            let db = Database::open_with(&path, Arc::new(UtcDay)).unwrap();
            assert_eq!(db.migration_report().applied, vec![1, 2, 3, 4]);
            db.upsert(&e).unwrap();
        }

        let db = Database::open_with(&path, Arc::new(UtcDay)).unwrap();
        assert!(db.migration_report().is_noop());
        assert_eq!(db.get_by_id(&e.id).unwrap(), Some(e));
    }

    #[test]
    fn test_open_uses_local_days() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("local.db")).unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);

        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let e = Entry::new(None, 10, None, ts, db.day_formatter().as_ref());
        assert_eq!(e.day, LocalDay.day_string(ts));
    }

    #[test]
    fn test_day_summary_with_extreme_calories() {
        let db = db();
        db.upsert(&entry_at("Everything", i64::MAX, 2024, 3, 1, 12)).unwrap();
        db.upsert(&entry_at("Mint", 1, 2024, 3, 1, 13)).unwrap();
        db.set_daily_limit(Some(2000)).unwrap();

        let s = db.build_day_summary("2024-03-01").unwrap();
        assert_eq!(s.consumed, i64::MAX);
        assert_eq!(s.net, i64::MAX);
        assert_eq!(s.remaining, Some(2000 - i64::MAX));
    }

    #[test]
    fn test_writes_fail_on_read_only_connection() {
        let db = db();
        let e = entry_at("Tea", 2, 2024, 3, 1, 9);
        db.upsert(&e).unwrap();
        db.conn.pragma_update(None, "query_only", true).unwrap();

        let mut changed = e.clone();
        changed.calories = 5;
        assert!(matches!(
            db.upsert(&changed),
            Err(Error::StorageWriteFailed(_))
        ));
        assert!(matches!(db.remove(&e.id), Err(Error::StorageWriteFailed(_))));
        assert!(matches!(
            db.set_daily_limit(Some(1500)),
            Err(Error::StorageWriteFailed(_))
        ));

        // Reads still work and nothing changed.
        assert_eq!(db.get_by_id(&e.id).unwrap(), Some(e));
    }

    #[test]
    fn test_rejected_insert_surfaces_as_write_failure() {
        let db = db();
        db.conn
            .execute_batch(
                "CREATE TRIGGER reject_entries BEFORE INSERT ON calory_entries
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let err = db.upsert(&entry_at("Toast", 180, 2024, 3, 1, 8)).unwrap_err();
        assert!(matches!(err, Error::StorageWriteFailed(_)));
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn test_reads_fail_when_table_is_missing() {
        let db = db();
        db.conn.execute_batch("DROP TABLE calory_entries;").unwrap();

        assert!(matches!(db.get_by_id("x"), Err(Error::StorageReadFailed(_))));
        assert!(matches!(
            db.get_by_day("2024-03-01"),
            Err(Error::StorageReadFailed(_))
        ));
        assert!(matches!(
            db.has_older_than("2024-03-01"),
            Err(Error::StorageReadFailed(_))
        ));
        assert!(matches!(db.suggest("a"), Err(Error::StorageReadFailed(_))));
        assert!(matches!(db.count(), Err(Error::StorageReadFailed(_))));
    }
}
