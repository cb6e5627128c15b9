//! `SQLite` schema definitions for trackpoint.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the append-only events table.
///
/// `timestamp` and `created_at` hold epoch milliseconds. `properties` and
/// `context` are opaque JSON text.
pub const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_name TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    client_id TEXT NOT NULL,
    user_id TEXT,
    session_id TEXT,
    page_path TEXT,
    page_title TEXT,
    referrer TEXT,
    properties TEXT,
    device_type TEXT,
    os TEXT,
    browser TEXT,
    language TEXT,
    timezone TEXT,
    traffic_medium TEXT,
    traffic_source TEXT,
    traffic_campaign TEXT,
    context TEXT,
    created_at INTEGER NOT NULL
)
";

/// SQL statement to create an index on timestamp for range and realtime queries.
pub const CREATE_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp DESC)
";

/// SQL statement to create an index on `event_name` for grouping and filtering.
pub const CREATE_NAME_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_events_name ON events(event_name)
";

/// SQL statement to create an index on `client_id` for filtering.
pub const CREATE_CLIENT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_events_client ON events(client_id)
";

/// SQL statement to create an index on `session_id` for filtering.
pub const CREATE_SESSION_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id)
";

/// SQL statement to create an index on `page_path` for page statistics.
pub const CREATE_PAGE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_events_page ON events(page_path)
";

/// Rejects updates: persisted events are immutable.
pub const CREATE_NO_UPDATE_TRIGGER: &str = r"
CREATE TRIGGER IF NOT EXISTS events_no_update BEFORE UPDATE ON events
BEGIN
    SELECT RAISE(ABORT, 'events are append-only');
END
";

/// Rejects deletes: persisted events are never removed.
pub const CREATE_NO_DELETE_TRIGGER: &str = r"
CREATE TRIGGER IF NOT EXISTS events_no_delete BEFORE DELETE ON events
BEGIN
    SELECT RAISE(ABORT, 'events are append-only');
END
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_EVENTS_TABLE,
    CREATE_TIMESTAMP_INDEX,
    CREATE_NAME_INDEX,
    CREATE_CLIENT_INDEX,
    CREATE_SESSION_INDEX,
    CREATE_PAGE_INDEX,
    CREATE_METADATA_TABLE,
];

/// Statements that make the events table append-only (schema version 2).
pub const APPEND_ONLY_STATEMENTS: &[&str] = &[CREATE_NO_UPDATE_TRIGGER, CREATE_NO_DELETE_TRIGGER];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.trim().is_empty());
        }
    }

    #[test]
    fn test_events_table_required_columns() {
        assert!(CREATE_EVENTS_TABLE.contains("id INTEGER PRIMARY KEY"));
        assert!(CREATE_EVENTS_TABLE.contains("event_name TEXT NOT NULL"));
        assert!(CREATE_EVENTS_TABLE.contains("timestamp INTEGER NOT NULL"));
        assert!(CREATE_EVENTS_TABLE.contains("client_id TEXT NOT NULL"));
        assert!(CREATE_EVENTS_TABLE.contains("properties TEXT,"));
        assert!(CREATE_EVENTS_TABLE.contains("context TEXT,"));
    }

    #[test]
    fn test_append_only_statements_raise() {
        for stmt in APPEND_ONLY_STATEMENTS {
            assert!(stmt.contains("RAISE(ABORT"));
        }
    }

    #[test]
    fn test_create_metadata_table_structure() {
        assert!(CREATE_METADATA_TABLE.contains("key TEXT PRIMARY KEY"));
        assert!(CREATE_METADATA_TABLE.contains("value TEXT NOT NULL"));
    }
}
