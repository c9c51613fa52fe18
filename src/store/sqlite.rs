//! SQLite metrics store: WAL-mode database holding widget time-series points.
//!
//! Uses Write-Ahead Logging for concurrent read/write, prepared statements
//! for insert throughput, and an upsert on the natural key
//! `(widget_id, measurement, tags, timestamp, field_name)` so re-sending the
//! same timestamped point is idempotent.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};

use crate::core::errors::{DeckhandError, Result};
use crate::store::query::{Aggregation, TimeRange};
use crate::store::{DataPoint, FieldValue, HistoryStore, SeriesKey};

/// SQLite-backed time-series store. Not `Sync`; share via [`SharedMetricsStore`].
pub struct MetricsStore {
    conn: Connection,
    path: PathBuf,
}

impl MetricsStore {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists.
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DeckhandError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        apply_pragmas(&conn)?;
        apply_schema(&conn)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// In-memory store for tests and `parse` dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Upsert one point (one row per field) under the widget isolation key.
    pub fn write_point(&self, widget_id: &str, point: &DataPoint) -> Result<()> {
        let timestamp = point
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp());
        let tags = point.canonical_tags();

        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO metric_points (
                widget_id, measurement, tags, timestamp, field_name,
                field_value, field_text, field_json
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
            ON CONFLICT(widget_id, measurement, tags, timestamp, field_name)
            DO UPDATE SET
                field_value = excluded.field_value,
                field_text = excluded.field_text,
                field_json = excluded.field_json",
        )?;

        for (name, value) in &point.fields {
            let (number, text, json) = match value {
                FieldValue::Number(n) => (Some(*n), None, None),
                FieldValue::Text(t) => (None, Some(t.clone()), None),
                FieldValue::Json(j) => (None, None, Some(j.to_string())),
            };
            stmt.execute(params![
                widget_id,
                point.measurement,
                tags,
                timestamp,
                name,
                number,
                text,
                json,
            ])?;
        }
        Ok(())
    }

    /// Most recent numeric value for a series.
    pub fn latest(&self, widget_id: &str, key: &SeriesKey) -> Result<Option<f64>> {
        let (filter_sql, filter_patterns) = tag_filter_clause(key);
        let sql = format!(
            "SELECT field_value FROM metric_points
             WHERE widget_id = ? AND measurement = ? AND field_name = ?
               AND field_value IS NOT NULL{filter_sql}
             ORDER BY timestamp DESC, id DESC LIMIT 1"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut query_params: Vec<&dyn rusqlite::ToSql> =
            vec![&widget_id, &key.measurement, &key.field];
        for pattern in &filter_patterns {
            query_params.push(pattern);
        }
        let mut rows = stmt.query(&query_params[..])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Ordered `(timestamp, value)` samples within the range, oldest first.
    pub fn series(
        &self,
        widget_id: &str,
        key: &SeriesKey,
        range: &TimeRange,
    ) -> Result<Vec<(i64, f64)>> {
        let (filter_sql, filter_patterns) = tag_filter_clause(key);
        let base = format!(
            "SELECT timestamp, field_value FROM metric_points
             WHERE widget_id = ? AND measurement = ? AND field_name = ?
               AND field_value IS NOT NULL{filter_sql}"
        );

        // Both range forms take exactly one extra parameter: a LIMIT for
        // sample counts, a cutoff timestamp for windows.
        #[allow(clippy::cast_possible_wrap)]
        let (sql, extra_value): (String, i64) = match range {
            TimeRange::Samples(n) => (
                format!("{base} ORDER BY timestamp DESC, id DESC LIMIT ?"),
                i64::from(*n),
            ),
            TimeRange::Window(window) => (
                format!("{base} AND timestamp >= ? ORDER BY timestamp ASC, id ASC"),
                chrono::Utc::now().timestamp() - window.as_secs() as i64,
            ),
        };

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut query_params: Vec<&dyn rusqlite::ToSql> =
            vec![&widget_id, &key.measurement, &key.field];
        for pattern in &filter_patterns {
            query_params.push(pattern);
        }
        query_params.push(&extra_value);

        let mut samples = stmt
            .query_map(&query_params[..], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Sample-count queries come back newest-first; callers get oldest-first.
        if matches!(range, TimeRange::Samples(_)) {
            samples.reverse();
        }
        Ok(samples)
    }

    /// Aggregate numeric values within the range.
    pub fn aggregate(
        &self,
        widget_id: &str,
        key: &SeriesKey,
        op: Aggregation,
        range: &TimeRange,
    ) -> Result<Option<f64>> {
        let values: Vec<f64> = self
            .series(widget_id, key, range)?
            .into_iter()
            .map(|(_, value)| value)
            .collect();
        Ok(op.apply(&values))
    }

    /// Delete rows older than `retention_days`. Returns rows deleted.
    ///
    /// One batched DELETE keeps the write lock's critical section bounded.
    pub fn prune(&self, retention_days: u32) -> Result<usize> {
        let cutoff =
            chrono::Utc::now().timestamp() - i64::from(retention_days) * 86_400;
        let deleted = self.conn.execute(
            "DELETE FROM metric_points WHERE timestamp < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    /// Hand freed pages back after a prune.
    pub fn reclaim(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA incremental_vacuum;")?;
        Ok(())
    }

    /// Total stored rows (diagnostics).
    pub fn row_count(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM metric_points", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Check that WAL mode is active (for diagnostics).
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }
}

/// Tag-filter clause: every filter pair must appear in the canonical tag
/// string. Returns SQL fragment + owned LIKE patterns, in matching order.
fn tag_filter_clause(key: &SeriesKey) -> (String, Vec<String>) {
    let mut sql = String::new();
    let mut patterns = Vec::new();
    for (tag_key, tag_value) in &key.tag_filter {
        sql.push_str(" AND (',' || tags || ',') LIKE ?");
        patterns.push(format!("%,{tag_key}={tag_value},%"));
    }
    (sql, patterns)
}

// ──────────────────── shared handle ────────────────────

/// Cloneable handle enforcing single-writer discipline over the store.
///
/// Refresh tasks on different threads each hold a clone; the mutex serializes
/// every statement so concurrent `datastore:` writes from different widgets
/// never interleave inside SQLite, and each lock hold is one bounded call.
#[derive(Clone)]
pub struct SharedMetricsStore {
    inner: Arc<Mutex<MetricsStore>>,
}

impl SharedMetricsStore {
    pub fn new(store: MetricsStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Run maintenance: prune expired rows, then reclaim space.
    pub fn prune_and_reclaim(&self, retention_days: u32) -> Result<usize> {
        let store = self.inner.lock();
        let deleted = store.prune(retention_days)?;
        if deleted > 0 {
            store.reclaim()?;
        }
        Ok(deleted)
    }

    pub fn row_count(&self) -> Result<i64> {
        self.inner.lock().row_count()
    }
}

impl HistoryStore for SharedMetricsStore {
    fn write_point(&self, widget_id: &str, point: &DataPoint) -> Result<()> {
        self.inner.lock().write_point(widget_id, point)
    }

    fn latest(&self, widget_id: &str, key: &SeriesKey) -> Result<Option<f64>> {
        self.inner.lock().latest(widget_id, key)
    }

    fn aggregate(
        &self,
        widget_id: &str,
        key: &SeriesKey,
        op: Aggregation,
        range: &TimeRange,
    ) -> Result<Option<f64>> {
        self.inner.lock().aggregate(widget_id, key, op, range)
    }

    fn series(
        &self,
        widget_id: &str,
        key: &SeriesKey,
        range: &TimeRange,
    ) -> Result<Vec<(i64, f64)>> {
        self.inner.lock().series(widget_id, key, range)
    }
}

// ──────────────────── schema & pragmas ────────────────────

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA auto_vacuum = INCREMENTAL;
         PRAGMA cache_size = -8000;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    // Verify WAL mode is active.
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        eprintln!("[DKH-STORE] WARNING: requested WAL mode but got '{mode}'");
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS metric_points (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            widget_id TEXT NOT NULL,
            measurement TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '',
            timestamp INTEGER NOT NULL,
            field_name TEXT NOT NULL,
            field_value REAL,
            field_text TEXT,
            field_json TEXT,
            UNIQUE(widget_id, measurement, tags, timestamp, field_name)
        );

        CREATE INDEX IF NOT EXISTS idx_points_series
            ON metric_points(widget_id, measurement, field_name, timestamp);
        CREATE INDEX IF NOT EXISTS idx_points_timestamp
            ON metric_points(timestamp);",
    )?;
    Ok(())
}

// ──────────────────── tests ────────────────────
