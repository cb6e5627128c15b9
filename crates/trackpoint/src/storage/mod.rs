//! Storage layer for trackpoint.
//!
//! This module provides the `SQLite`-backed append-only event store: single-row
//! inserts, filtered listing, and the grouped reads behind the statistics and
//! realtime endpoints.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use tracing::{debug, info};

use crate::aggregate::{DeviceStat, EventStat, PageStat};
use crate::error::{Error, Result};
use crate::event::{EventEnvelope, EventFilter, StoredEvent, TimeRange, Timestamp};
use crate::value::Value;

/// Columns selected for a full event row, in `row_to_event` order.
const EVENT_COLUMNS: &str = "id, event_name, timestamp, client_id, user_id, session_id, \
     page_path, page_title, referrer, properties, device_type, os, browser, language, \
     timezone, traffic_medium, traffic_source, traffic_campaign, context, created_at";

/// How many virtual machine instructions run between deadline checks.
const PROGRESS_CHECK_OPS: i32 = 1_000;

/// Append-only event store.
///
/// Inserts are single-row and never grouped in a transaction. Reads see every
/// committed row. The connection is guarded by a mutex; requests queue on it
/// but never hold it across an await point.
#[derive(Debug)]
pub struct EventStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

impl EventStore {
    /// Open or create an event store at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening event store at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL keeps readers from blocking the single writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Event store opened at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store, used by tests and ephemeral servers.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("event store connection mutex poisoned"))
    }

    /// Append one event and return its store-assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the blobs cannot be serialized or the insert fails.
    pub fn insert(&self, event: &EventEnvelope) -> Result<i64> {
        let properties = event.properties.as_ref().map(serde_json::to_string).transpose()?;
        let context = event.context.as_ref().map(serde_json::to_string).transpose()?;
        let created_at = Utc::now().timestamp_millis();

        let conn = self.lock()?;
        conn.execute(
            r"
            INSERT INTO events (
                event_name, timestamp, client_id, user_id, session_id,
                page_path, page_title, referrer, properties,
                device_type, os, browser, language, timezone,
                traffic_medium, traffic_source, traffic_campaign, context, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            ",
            params![
                event.event_name,
                event.timestamp.millis(),
                event.client_id,
                event.user_id,
                event.session_id,
                event.page_path,
                event.page_title,
                event.referrer,
                properties,
                event.device_type,
                event.os,
                event.browser,
                event.language,
                event.timezone,
                event.traffic_medium,
                event.traffic_source,
                event.traffic_campaign,
                context,
                created_at,
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!(id, event_name = %event.event_name, "Stored event");
        Ok(id)
    }

    /// Get an event by its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, id: i64) -> Result<Option<StoredEvent>> {
        let conn = self.lock()?;
        let event = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                [id],
                row_to_event,
            )
            .optional()?;
        Ok(event)
    }

    /// List events matching a filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn query(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>> {
        let mut clause = WhereClause::default();
        clause.eq("event_name", filter.event_name.as_deref());
        clause.eq("client_id", filter.client_id.as_deref());
        clause.eq("user_id", filter.user_id.as_deref());
        clause.eq("session_id", filter.session_id.as_deref());
        clause.range(&filter.range);

        let mut values = clause.values;
        values.push(SqlValue::Integer(i64::from(filter.limit)));
        values.push(SqlValue::Integer(i64::from(filter.offset)));
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events {} ORDER BY timestamp DESC, id DESC LIMIT ?{} OFFSET ?{}",
            clause.sql,
            values.len() - 1,
            values.len()
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(params_from_iter(values), row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Count all stored events.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Per-event-name totals with distinct visitor and session counts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if `deadline` passes, or a database error.
    pub fn event_stats(&self, range: &TimeRange, deadline: Option<Instant>) -> Result<Vec<EventStat>> {
        let mut clause = WhereClause::default();
        clause.range(range);
        let sql = format!(
            r"
            SELECT event_name,
                   COUNT(*) AS count,
                   COUNT(DISTINCT client_id) AS unique_users,
                   COUNT(DISTINCT session_id) AS unique_sessions
            FROM events {}
            GROUP BY event_name
            ORDER BY count DESC, event_name ASC
            ",
            clause.sql
        );

        self.read_with_deadline("event stats", deadline, |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(clause.values), |row| {
                Ok(EventStat {
                    event_name: row.get(0)?,
                    count: row.get(1)?,
                    unique_users: row.get(2)?,
                    unique_sessions: row.get(3)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Per-page view counts and distinct visitors, ignoring events without a path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if `deadline` passes, or a database error.
    pub fn page_stats(&self, range: &TimeRange, deadline: Option<Instant>) -> Result<Vec<PageStat>> {
        let mut clause = WhereClause::default();
        clause.not_null("page_path");
        clause.range(range);
        let sql = format!(
            r"
            SELECT page_path,
                   COUNT(*) AS page_views,
                   COUNT(DISTINCT client_id) AS unique_users
            FROM events {}
            GROUP BY page_path
            ORDER BY page_views DESC, page_path ASC
            ",
            clause.sql
        );

        self.read_with_deadline("page stats", deadline, |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(clause.values), |row| {
                Ok(PageStat {
                    page_path: row.get(0)?,
                    page_views: row.get(1)?,
                    unique_users: row.get(2)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Counts per `(device_type, os, browser)`, ignoring events without a device type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if `deadline` passes, or a database error.
    pub fn device_stats(&self, range: &TimeRange, deadline: Option<Instant>) -> Result<Vec<DeviceStat>> {
        let mut clause = WhereClause::default();
        clause.not_null("device_type");
        clause.range(range);
        let sql = format!(
            r"
            SELECT device_type, os, browser, COUNT(*) AS count
            FROM events {}
            GROUP BY device_type, os, browser
            ORDER BY count DESC, device_type ASC, os ASC, browser ASC
            ",
            clause.sql
        );

        self.read_with_deadline("device stats", deadline, |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(clause.values), |row| {
                Ok(DeviceStat {
                    device_type: row.get(0)?,
                    os: row.get(1)?,
                    browser: row.get(2)?,
                    count: row.get(3)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Distinct `(session_id, client_id)` counts among events in `range`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if `deadline` passes, or a database error.
    pub fn active_counts(&self, range: &TimeRange, deadline: Option<Instant>) -> Result<(i64, i64)> {
        let mut clause = WhereClause::default();
        clause.range(range);
        let sql = format!(
            "SELECT COUNT(DISTINCT session_id), COUNT(DISTINCT client_id) FROM events {}",
            clause.sql
        );

        self.read_with_deadline("realtime snapshot", deadline, |conn| {
            conn.query_row(&sql, params_from_iter(clause.values), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
        })
    }

    /// Summarize the store contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn summary(&self) -> Result<StoreSummary> {
        let (total_events, oldest, newest): (i64, Option<i64>, Option<i64>) = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM events",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?
        };

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StoreSummary {
            total_events,
            oldest_event: oldest.and_then(Timestamp::from_millis),
            newest_event: newest.and_then(Timestamp::from_millis),
            db_size_bytes,
        })
    }

    /// Run a read under the connection lock, aborting it once `deadline` passes.
    ///
    /// Time spent waiting for the lock counts against the deadline.
    fn read_with_deadline<T, F>(&self, operation: &str, deadline: Option<Instant>, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.lock()?;

        let Some(deadline) = deadline else {
            return f(&conn).map_err(Error::from);
        };
        if Instant::now() >= deadline {
            return Err(Error::timeout(operation));
        }

        conn.progress_handler(PROGRESS_CHECK_OPS, Some(move || Instant::now() >= deadline))?;
        let result = f(&conn);
        conn.progress_handler(0, None::<fn() -> bool>)?;

        result.map_err(|e| {
            if is_interrupted(&e) {
                Error::timeout(operation)
            } else {
                Error::from(e)
            }
        })
    }
}

/// Statistics about the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSummary {
    /// Total number of events stored.
    pub total_events: i64,
    /// Timestamp of the oldest event.
    pub oldest_event: Option<Timestamp>,
    /// Timestamp of the newest event.
    pub newest_event: Option<Timestamp>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

fn is_interrupted(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted
    )
}

/// Incrementally built `WHERE` clause with positional parameters.
#[derive(Debug, Default)]
struct WhereClause {
    sql: String,
    values: Vec<SqlValue>,
}

impl WhereClause {
    fn push(&mut self, condition: &str) {
        self.sql.push_str(if self.sql.is_empty() { "WHERE " } else { " AND " });
        self.sql.push_str(condition);
    }

    fn eq(&mut self, column: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.values.push(SqlValue::Text(value.to_string()));
            self.push(&format!("{column} = ?{}", self.values.len()));
        }
    }

    fn not_null(&mut self, column: &str) {
        self.push(&format!("{column} IS NOT NULL"));
    }

    fn range(&mut self, range: &TimeRange) {
        if let Some(start) = range.start_millis() {
            self.values.push(SqlValue::Integer(start));
            self.push(&format!("timestamp >= ?{}", self.values.len()));
        }
        if let Some(end) = range.end_millis() {
            self.values.push(SqlValue::Integer(end));
            self.push(&format!("timestamp <= ?{}", self.values.len()));
        }
    }
}

fn millis_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Timestamp> {
    let millis: i64 = row.get(idx)?;
    Timestamp::from_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Value>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        serde_json::from_str(&t).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

/// Convert a database row to a stored event.
fn row_to_event(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    let envelope = EventEnvelope {
        event_name: row.get(1)?,
        timestamp: millis_column(row, 2)?,
        client_id: row.get(3)?,
        user_id: row.get(4)?,
        session_id: row.get(5)?,
        page_path: row.get(6)?,
        page_title: row.get(7)?,
        referrer: row.get(8)?,
        properties: json_column(row, 9)?,
        device_type: row.get(10)?,
        os: row.get(11)?,
        browser: row.get(12)?,
        language: row.get(13)?,
        timezone: row.get(14)?,
        traffic_medium: row.get(15)?,
        traffic_source: row.get(16)?,
        traffic_campaign: row.get(17)?,
        context: json_column(row, 18)?,
    };

    Ok(StoredEvent {
        id: row.get(0)?,
        envelope,
        created_at: millis_column(row, 19)?,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn create_test_store() -> EventStore {
        EventStore::open_in_memory().expect("failed to create test store")
    }

    fn event_at(name: &str, client: &str, session: &str, millis: i64) -> EventEnvelope {
        let mut event = EventEnvelope::new(name, Timestamp::from_millis(millis).unwrap(), client);
        event.session_id = Some(session.to_string());
        event
    }

    #[test]
    fn test_open_in_memory() {
        assert!(EventStore::open_in_memory().is_ok());
    }

    #[test]
    fn test_insert_and_get() {
        let store = create_test_store();
        let mut event = event_at("page_view", "c1", "s1", 1_000);
        event.page_path = Some("/posts".to_string());
        event.properties = Some(Value::object([("post_id", Value::from(7))]));
        event.context = Some(Value::object([("user_agent", "UA/1.0")]));

        let id = store.insert(&event).unwrap();
        let stored = store.get(id).unwrap().expect("event should exist");

        assert_eq!(stored.id, id);
        assert_eq!(stored.envelope, event);
    }

    #[test]
    fn test_insert_assigns_fresh_ids() {
        let store = create_test_store();
        let event = event_at("click", "c1", "s1", 1_000);

        let id1 = store.insert(&event).unwrap();
        let id2 = store.insert(&event).unwrap();

        assert_ne!(id1, id2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_get_nonexistent() {
        let store = create_test_store();
        assert!(store.get(99_999).unwrap().is_none());
    }

    #[test]
    fn test_query_filters_and_orders() {
        let store = create_test_store();
        store.insert(&event_at("click", "c1", "s1", 1_000)).unwrap();
        store.insert(&event_at("click", "c2", "s2", 3_000)).unwrap();
        store.insert(&event_at("page_view", "c1", "s1", 2_000)).unwrap();

        let clicks = store
            .query(&EventFilter {
                event_name: Some("click".to_string()),
                ..EventFilter::default()
            })
            .unwrap();
        assert_eq!(clicks.len(), 2);
        assert_eq!(clicks[0].envelope.client_id, "c2");

        let c1_clicks = store
            .query(&EventFilter {
                event_name: Some("click".to_string()),
                client_id: Some("c1".to_string()),
                ..EventFilter::default()
            })
            .unwrap();
        assert_eq!(c1_clicks.len(), 1);
    }

    #[test]
    fn test_query_time_range_is_inclusive() {
        let store = create_test_store();
        for millis in [1_000, 2_000, 3_000, 4_000] {
            store.insert(&event_at("tick", "c", "s", millis)).unwrap();
        }

        let range = TimeRange::between(
            Timestamp::from_millis(2_000).unwrap().as_datetime(),
            Timestamp::from_millis(3_000).unwrap().as_datetime(),
        );
        let events = store
            .query(&EventFilter {
                range,
                ..EventFilter::default()
            })
            .unwrap();

        let times: Vec<i64> = events.iter().map(|e| e.envelope.timestamp.millis()).collect();
        assert_eq!(times, vec![3_000, 2_000]);
    }

    #[test]
    fn test_query_limit_and_offset() {
        let store = create_test_store();
        for millis in 1..=5 {
            store.insert(&event_at("tick", "c", "s", millis * 1_000)).unwrap();
        }

        let page = store
            .query(&EventFilter {
                limit: 2,
                offset: 1,
                ..EventFilter::default()
            })
            .unwrap();
        let times: Vec<i64> = page.iter().map(|e| e.envelope.timestamp.millis()).collect();
        assert_eq!(times, vec![4_000, 3_000]);
    }

    #[test]
    fn test_event_stats_counts_distinct_users() {
        let store = create_test_store();
        store.insert(&event_at("A", "c1", "s1", 1_000)).unwrap();
        store.insert(&event_at("A", "c1", "s2", 2_000)).unwrap();
        store.insert(&event_at("A", "c2", "s3", 3_000)).unwrap();
        store.insert(&event_at("B", "c1", "s1", 4_000)).unwrap();

        let stats = store.event_stats(&TimeRange::unbounded(), None).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].event_name, "A");
        assert_eq!(stats[0].count, 3);
        assert_eq!(stats[0].unique_users, 2);
        assert_eq!(stats[0].unique_sessions, 3);
        assert_eq!(stats[1].event_name, "B");
    }

    #[test]
    fn test_page_stats_skip_null_paths() {
        let store = create_test_store();
        let mut home = event_at("page_view", "c1", "s1", 1_000);
        home.page_path = Some("/".to_string());
        store.insert(&home).unwrap();
        home.client_id = "c2".to_string();
        store.insert(&home).unwrap();
        store.insert(&event_at("page_view", "c3", "s3", 1_000)).unwrap();

        let stats = store.page_stats(&TimeRange::unbounded(), None).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].page_path, "/");
        assert_eq!(stats[0].page_views, 2);
        assert_eq!(stats[0].unique_users, 2);
    }

    #[test]
    fn test_device_stats_group_by_triple() {
        let store = create_test_store();
        let mut mobile = event_at("x", "c1", "s1", 1_000);
        mobile.device_type = Some("mobile".to_string());
        mobile.os = Some("Android".to_string());
        mobile.browser = Some("Chrome".to_string());
        store.insert(&mobile).unwrap();
        store.insert(&mobile).unwrap();

        let mut desktop = mobile.clone();
        desktop.device_type = Some("desktop".to_string());
        desktop.os = Some("Windows".to_string());
        store.insert(&desktop).unwrap();
        store.insert(&event_at("x", "c9", "s9", 1_000)).unwrap();

        let stats = store.device_stats(&TimeRange::unbounded(), None).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].device_type, "mobile");
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[1].os.as_deref(), Some("Windows"));
    }

    #[test]
    fn test_active_counts_in_range() {
        let store = create_test_store();
        store.insert(&event_at("x", "c1", "s1", 10_000)).unwrap();
        store.insert(&event_at("x", "c1", "s2", 11_000)).unwrap();
        store.insert(&event_at("x", "c2", "s3", 1_000)).unwrap();

        let range = TimeRange::since(Timestamp::from_millis(5_000).unwrap().as_datetime());
        let (sessions, users) = store.active_counts(&range, None).unwrap();
        assert_eq!(sessions, 2);
        assert_eq!(users, 1);
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let store = create_test_store();
        store.insert(&event_at("x", "c1", "s1", 1_000)).unwrap();

        let deadline = Instant::now().checked_sub(Duration::from_millis(1));
        let err = store
            .event_stats(&TimeRange::unbounded(), deadline)
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(err.is_storage_error());
    }

    #[test]
    fn test_generous_deadline_succeeds() {
        let store = create_test_store();
        store.insert(&event_at("x", "c1", "s1", 1_000)).unwrap();

        let deadline = Some(Instant::now() + Duration::from_secs(30));
        let stats = store.event_stats(&TimeRange::unbounded(), deadline).unwrap();
        assert_eq!(stats.len(), 1);
    }

    #[test]
    fn test_deadline_does_not_outlive_its_read() {
        let store = create_test_store();
        for i in 0..300 {
            let client = format!("c{}", i % 7);
            store.insert(&event_at(&format!("e{}", i % 11), &client, "s1", 1_000 + i)).unwrap();
        }

        let deadline = Some(Instant::now() + Duration::from_millis(200));
        store.event_stats(&TimeRange::unbounded(), deadline).unwrap();
        std::thread::sleep(Duration::from_millis(250));

        let stats = store.event_stats(&TimeRange::unbounded(), None).unwrap();
        assert_eq!(stats.len(), 11);
        assert_eq!(stats.iter().map(|s| s.count).sum::<i64>(), 300);
    }

    #[test]
    fn test_summary() {
        let store = create_test_store();
        let empty = store.summary().unwrap();
        assert_eq!(empty.total_events, 0);
        assert!(empty.oldest_event.is_none());

        store.insert(&event_at("x", "c", "s", 1_000)).unwrap();
        store.insert(&event_at("x", "c", "s", 5_000)).unwrap();

        let summary = store.summary().unwrap();
        assert_eq!(summary.total_events, 2);
        assert_eq!(summary.oldest_event.map(|t| t.millis()), Some(1_000));
        assert_eq!(summary.newest_event.map(|t| t.millis()), Some(5_000));
        assert_eq!(summary.db_size_bytes, 0);
    }

    #[test]
    fn test_path() {
        let store = create_test_store();
        assert_eq!(store.path().to_string_lossy(), ":memory:");
    }

    #[test]
    fn test_open_file_based_creates_parent_dirs() {
        let root = std::env::temp_dir().join(format!("trackpoint_store_test_{}", std::process::id()));
        let db_path = root.join("nested").join("events.db");
        let _ = std::fs::remove_dir_all(&root);

        let store = EventStore::open(&db_path).unwrap();
        store.insert(&event_at("x", "c", "s", 1_000)).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.path(), db_path);

        drop(store);
        let reopened = EventStore::open(&db_path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);

        drop(reopened);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_unicode_and_large_properties() {
        let store = create_test_store();
        let mut event = event_at("x", "c", "s", 1_000);
        event.page_title = Some("안녕하세요 🌍".to_string());
        event.properties = Some(Value::object([("blob", "x".repeat(100_000))]));

        let id = store.insert(&event).unwrap();
        let stored = store.get(id).unwrap().unwrap();
        assert_eq!(stored.envelope.page_title.as_deref(), Some("안녕하세요 🌍"));
        assert_eq!(
            stored.envelope.property("blob").and_then(Value::as_str).map(str::len),
            Some(100_000)
        );
    }
}
