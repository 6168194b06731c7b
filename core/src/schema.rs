//! Database schema and migrations.
//!
//! The layout is described as an ordered list of `(version, step)` pairs.
//! [`run_migrations`] applies every step newer than the stored
//! `PRAGMA user_version` inside a single transaction, so an upgrade either
//! lands completely (version bump included) or not at all.

use chrono::DateTime;
use rusqlite::{Connection, Transaction, params};
use tracing::{debug, info};

use crate::day::DayFormatter;
use crate::error::{Error, Result};

/// Version produced by the last step in [`MIGRATIONS`].
pub const SCHEMA_VERSION: u32 = 4;

pub const ENTRIES_TABLE: &str = "calory_entries";
pub const SETTINGS_TABLE: &str = "settings";
pub const BY_DAY_INDEX: &str = "by_day";
pub const BY_TIMESTAMP_DESC_INDEX: &str = "by_timestamp_desc";

type StepFn = fn(&Transaction<'_>, &dyn DayFormatter) -> rusqlite::Result<()>;

/// A single schema step and the version it establishes.
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    apply: StepFn,
}

impl Migration {
    pub const fn new(version: u32, description: &'static str, apply: StepFn) -> Self {
        Self {
            version,
            description,
            apply,
        }
    }
}

/// Every step, in strictly increasing version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration::new(1, "create entry and settings stores", create_stores),
    Migration::new(2, "backfill entry day and index it", add_day_index),
    Migration::new(3, "reserved", reserved),
    Migration::new(4, "index entries by timestamp descending", add_timestamp_index),
];

/// What an open did to the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from: u32,
    pub to: u32,
    pub applied: Vec<u32>,
}

impl MigrationReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Bring the store up to [`SCHEMA_VERSION`].
pub fn ensure_schema(conn: &mut Connection, days: &dyn DayFormatter) -> Result<MigrationReport> {
    run_migrations(conn, MIGRATIONS, SCHEMA_VERSION, days)
}

/// Apply every step in `steps` whose version lies in `(stored, target]`.
pub fn run_migrations(
    conn: &mut Connection,
    steps: &[Migration],
    target: u32,
    days: &dyn DayFormatter,
) -> Result<MigrationReport> {
    let current = schema_version(conn).map_err(Error::read)?;

    if current > target {
        return Err(Error::SchemaTooNew {
            found: current,
            supported: target,
        });
    }

    if current == target {
        debug!(version = current, "Schema is up to date");
        return Ok(MigrationReport {
            from: current,
            to: target,
            applied: Vec::new(),
        });
    }

    let failed =
        |version: u32| move |source: rusqlite::Error| Error::SchemaUpgradeFailed { version, source };

    let tx = conn.transaction().map_err(failed(target))?;
    let mut applied = Vec::new();

    for step in steps {
        if step.version <= current || step.version > target {
            debug!(version = step.version, "Skipping migration: {}", step.description);
            continue;
        }
        (step.apply)(&tx, days).map_err(failed(step.version))?;
        info!(version = step.version, "Applied migration: {}", step.description);
        applied.push(step.version);
    }

    tx.pragma_update(None, "user_version", target)
        .map_err(failed(target))?;
    tx.commit().map_err(failed(target))?;

    info!(from = current, to = target, "Schema upgraded");
    Ok(MigrationReport {
        from: current,
        to: target,
        applied,
    })
}

/// Read the stored schema version (0 for a fresh file).
pub fn schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

/// Whether an index with this name exists.
pub fn index_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1)",
        params![name],
        |row| row.get(0),
    )
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2)",
        params![table, column],
        |row| row.get(0),
    )
}

// --- Steps ---

fn create_stores(tx: &Transaction<'_>, _days: &dyn DayFormatter) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS calory_entries (
            id TEXT PRIMARY KEY NOT NULL,
            description TEXT,
            calories INTEGER NOT NULL,
            exercise INTEGER,
            timestamp INTEGER NOT NULL
        ) WITHOUT ROWID;

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        );",
    )
}

fn add_day_index(tx: &Transaction<'_>, days: &dyn DayFormatter) -> rusqlite::Result<()> {
    if !column_exists(tx, ENTRIES_TABLE, "day")? {
        tx.execute_batch("ALTER TABLE calory_entries ADD COLUMN day TEXT;")?;
    }

    let rows: Vec<(String, i64)> = {
        let mut stmt = tx.prepare("SELECT id, timestamp FROM calory_entries")?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };

    {
        let mut update = tx.prepare("UPDATE calory_entries SET day = ?1 WHERE id = ?2")?;
        for (id, millis) in &rows {
            let timestamp = DateTime::from_timestamp_millis(*millis)
                .ok_or(rusqlite::Error::IntegralValueOutOfRange(1, *millis))?;
            update.execute(params![days.day_string(timestamp), id])?;
        }
    }
    debug!(rows = rows.len(), "Backfilled entry days");

    tx.execute_batch("CREATE INDEX IF NOT EXISTS by_day ON calory_entries(day);")
}

fn reserved(_tx: &Transaction<'_>, _days: &dyn DayFormatter) -> rusqlite::Result<()> {
    Ok(())
}

fn add_timestamp_index(tx: &Transaction<'_>, _days: &dyn DayFormatter) -> rusqlite::Result<()> {
    if index_exists(tx, BY_TIMESTAMP_DESC_INDEX)? {
        debug!("Index {BY_TIMESTAMP_DESC_INDEX} already present");
        return Ok(());
    }
    tx.execute_batch("CREATE INDEX by_timestamp_desc ON calory_entries(timestamp DESC);")
}

#[cfg(test)]
pub(crate) fn schema_objects(conn: &Connection) -> Vec<(String, String, Option<String>)> {
    let mut stmt = conn
        .prepare(
            "SELECT type, name, sql FROM sqlite_master
             WHERE name NOT LIKE 'sqlite_%' ORDER BY type, name",
        )
        .unwrap();
    let objects = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .collect::<rusqlite::Result<Vec<_>>>()
        .unwrap();
    objects
}
