// Simone MCP Server - SQLite Storage
//
// Owns the embedded database for the life of the process. Opened once at
// startup (creating the file and schema if absent), shared by reference
// into the logger and dispatcher, closed on shutdown.
//
// Durability/concurrency setup on open:
//   - WAL journal mode: readers are not blocked by an in-progress writer
//   - foreign_keys ON: cross-table enforcement for tag/file-touch links
//   - busy_timeout 10s: lock waits are bounded, then fail instead of hang

use crate::error::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Full schema, applied in one batch when the activities table is absent.
/// Timestamps are ISO8601 UTC text, defaulted server-side at insert time.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS activities (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    activity      TEXT NOT NULL,
    activity_type TEXT NOT NULL,
    tool_name     TEXT NOT NULL,
    success       INTEGER NOT NULL DEFAULT 1,
    error         TEXT,
    context       TEXT,
    issue_number  INTEGER,
    link          TEXT
);

CREATE TABLE IF NOT EXISTS tags (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS activity_tags (
    activity_id INTEGER NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
    tag_id      INTEGER NOT NULL REFERENCES tags(id),
    PRIMARY KEY (activity_id, tag_id)
);

CREATE TABLE IF NOT EXISTS file_touches (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    activity_id INTEGER NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
    file_path   TEXT NOT NULL,
    operation   TEXT
);

CREATE INDEX IF NOT EXISTS idx_activities_timestamp ON activities(timestamp);
CREATE INDEX IF NOT EXISTS idx_activities_tool ON activities(tool_name);
CREATE INDEX IF NOT EXISTS idx_activities_type ON activities(activity_type);
CREATE INDEX IF NOT EXISTS idx_activities_success ON activities(success);
CREATE INDEX IF NOT EXISTS idx_file_touches_activity ON file_touches(activity_id);
"#;

/// A validated activity ready for insertion. Built only by the logger —
/// the single write path into the store.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub activity: String,
    pub activity_type: String,
    pub tool_name: String,
    pub success: bool,
    pub error: Option<String>,
    pub context: Option<String>,
    pub issue_number: Option<i64>,
    pub link: Option<String>,
    pub tags: Vec<String>,
    pub files: Vec<FileTouch>,
}

/// One file path affected by an activity. Operation is free text
/// (created/modified/deleted by convention), not a fixed enum.
#[derive(Debug, Clone)]
pub struct FileTouch {
    pub path: String,
    pub operation: Option<String>,
}

/// Core columns of one stored activity, as read back for display.
#[derive(Debug, Clone)]
pub struct ActivityRow {
    pub id: i64,
    pub timestamp: String,
    pub activity: String,
    pub activity_type: String,
    pub tool_name: String,
    pub success: bool,
    pub error: Option<String>,
}

/// SQLite-backed activity store. Sole owner of the database handle.
#[derive(Debug)]
pub struct ActivityStore {
    conn: Connection,
}

impl ActivityStore {
    /// Open or create the database at the given path, creating parent
    /// directories as needed. Any failure here is `StorageInit` — the
    /// server must not start without a writable store.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::StorageInit(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::StorageInit(format!("cannot open {}: {}", path.display(), e)))?;
        log::info!("activity store opened at {}", path.display());
        Self::configure(conn)
    }

    /// In-memory store for tests. Same pragmas, no file.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::StorageInit(format!("cannot open in-memory store: {}", e)))?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| Error::StorageInit(format!("cannot set busy_timeout: {}", e)))?;
        // journal_mode returns the resulting mode as a row (in-memory
        // databases report "memory" — that is fine).
        let _mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| Error::StorageInit(format!("cannot enable WAL: {}", e)))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| Error::StorageInit(format!("cannot enable foreign_keys: {}", e)))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| Error::StorageInit(format!("cannot set synchronous: {}", e)))?;
        Ok(Self { conn })
    }

    /// Idempotent schema initialization: if the activities table exists the
    /// schema is assumed current and nothing is touched; otherwise the full
    /// schema (tables + indexes) is created in one batch. Safe to call on
    /// every startup.
    pub fn ensure_schema(&self) -> Result<()> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'activities'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_none() {
            self.conn.execute_batch(SCHEMA_SQL)?;
            log::info!("activity schema created");
        }
        Ok(())
    }

    /// Insert one activity with its tags and file touches in a single
    /// transaction — either the full record is visible, or nothing.
    /// Tag rows are reused by name; join rows are created per activity.
    /// Returns the generated id and the server-side timestamp.
    pub fn insert_activity(&self, rec: &NewActivity) -> Result<(i64, String)> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO activities (activity, activity_type, tool_name, success, error, context, issue_number, link)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                rec.activity,
                rec.activity_type,
                rec.tool_name,
                rec.success,
                rec.error,
                rec.context,
                rec.issue_number,
                rec.link,
            ],
        )?;
        let id = tx.last_insert_rowid();

        for tag in &rec.tags {
            tx.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![tag])?;
            let tag_id: i64 =
                tx.query_row("SELECT id FROM tags WHERE name = ?1", params![tag], |row| {
                    row.get(0)
                })?;
            tx.execute(
                "INSERT OR IGNORE INTO activity_tags (activity_id, tag_id) VALUES (?1, ?2)",
                params![id, tag_id],
            )?;
        }

        for touch in &rec.files {
            tx.execute(
                "INSERT INTO file_touches (activity_id, file_path, operation) VALUES (?1, ?2, ?3)",
                params![id, touch.path, touch.operation],
            )?;
        }

        let timestamp: String = tx.query_row(
            "SELECT timestamp FROM activities WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;

        tx.commit()?;
        Ok((id, timestamp))
    }

    /// Resolved tag names for one activity, in link insertion order.
    pub fn tags_for(&self, activity_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.name FROM activity_tags at
             JOIN tags t ON t.id = at.tag_id
             WHERE at.activity_id = ?1
             ORDER BY at.rowid",
        )?;
        let names = stmt
            .query_map(params![activity_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub fn activity_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM activities", [], |row| row.get(0))?)
    }

    pub fn tag_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?)
    }

    pub fn file_touch_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM file_touches", [], |row| row.get(0))?)
    }

    /// Most recent activities, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<ActivityRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, activity, activity_type, tool_name, success, error
             FROM activities ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(ActivityRow {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    activity: row.get(2)?,
                    activity_type: row.get(3)?,
                    tool_name: row.get(4)?,
                    success: row.get(5)?,
                    error: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Release the handle. Refuses while a transaction is open — the
    /// caller must finish in-flight work first. Double close is impossible
    /// by move semantics.
    pub fn close(self) -> Result<()> {
        if !self.conn.is_autocommit() {
            return Err(Error::Storage(
                "close called with an open transaction".into(),
            ));
        }
        self.conn.close().map_err(|(_, e)| Error::from(e))
    }
}

// ============================================================================
// TESTS
// ============================================================================
