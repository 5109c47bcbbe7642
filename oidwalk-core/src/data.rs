use crate::error::StoreError;
use chrono::{DateTime, Utc};
use oidwalk_scanner::record::{ChildRef, NodeCode, NodeRecord};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Existence check and insert against a store keyed by `dot_oid`.
///
/// The check and the insert are separate calls, so two writers may both
/// see a key as absent; the second insert then fails with
/// [`StoreError::Duplicate`].
pub trait NodeStore: Send + Sync + 'static {
    fn exists(&self, dot_oid: &str) -> Result<bool, StoreError>;
    fn insert(&self, record: &NodeRecord) -> Result<(), StoreError>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "completed" => SessionStatus::Completed,
            "failed" => SessionStatus::Failed,
            _ => SessionStatus::Running,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlSession {
    pub id: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub status: SessionStatus,
    pub roots: String,
    pub configuration: Option<String>,
    /// Root to resume from after a fatal abort.
    pub abort_root: Option<String>,
}

fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

impl Database {
    pub fn drop(path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.lock()?.execute_batch(
            "
CREATE TABLE IF NOT EXISTS crawl_sessions (
    id TEXT PRIMARY KEY,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'failed')),
    roots TEXT NOT NULL,      -- JSON array
    configuration TEXT,       -- JSON configuration used
    abort_root TEXT
);

CREATE TABLE IF NOT EXISTS nodes (
    dot_oid TEXT PRIMARY KEY,
    node_code TEXT,           -- JSON number or string
    node_names TEXT NOT NULL, -- JSON array
    parent TEXT,
    asn1_oid TEXT NOT NULL,   -- JSON array
    iri_oid TEXT NOT NULL,    -- JSON array
    creation_date TEXT,       -- RFC 3339
    modification_date TEXT,   -- RFC 3339
    detailed_data TEXT NOT NULL,  -- JSON object
    children TEXT NOT NULL,       -- JSON array
    other_fields TEXT NOT NULL,   -- JSON object
    scrape_time TEXT NOT NULL     -- RFC 3339
);

CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent);
            ",
        )?;
        Ok(())
    }

    // Session management
    pub fn create_session(&self, roots: &str, configuration: Option<&str>) -> Result<String, StoreError> {
        let session_id = uuid::Uuid::new_v4().to_string();

        self.lock()?.execute(
            "INSERT INTO crawl_sessions (id, start_time, status, roots, configuration) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &session_id,
                current_timestamp(),
                SessionStatus::Running.as_str(),
                roots,
                configuration
            ],
        )?;

        Ok(session_id)
    }

    pub fn complete_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.lock()?.execute(
            "UPDATE crawl_sessions SET status = ?1, end_time = ?2 WHERE id = ?3",
            params![SessionStatus::Completed.as_str(), current_timestamp(), session_id],
        )?;
        Ok(())
    }

    pub fn fail_session(&self, session_id: &str, abort_root: Option<&str>) -> Result<(), StoreError> {
        self.lock()?.execute(
            "UPDATE crawl_sessions SET status = ?1, end_time = ?2, abort_root = ?3 WHERE id = ?4",
            params![
                SessionStatus::Failed.as_str(),
                current_timestamp(),
                abort_root,
                session_id
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<CrawlSession>, StoreError> {
        let session = self
            .lock()?
            .query_row(
                "SELECT id, start_time, end_time, status, roots, configuration, abort_root
                 FROM crawl_sessions WHERE id = ?1",
                params![session_id],
                |row| {
                    Ok(CrawlSession {
                        id: row.get(0)?,
                        start_time: row.get(1)?,
                        end_time: row.get(2)?,
                        status: SessionStatus::parse(&row.get::<_, String>(3)?),
                        roots: row.get(4)?,
                        configuration: row.get(5)?,
                        abort_root: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    /// The most recent failed session, if any.
    pub fn last_failed_session(&self) -> Result<Option<CrawlSession>, StoreError> {
        let id: Option<String> = self
            .lock()?
            .query_row(
                "SELECT id FROM crawl_sessions WHERE status = 'failed'
                 ORDER BY end_time DESC, start_time DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => self.get_session(&id),
            None => Ok(None),
        }
    }

    // Node operations
    pub fn get_node(&self, dot_oid: &str) -> Result<Option<NodeRecord>, StoreError> {
        let row = self
            .lock()?
            .query_row(
                &format!("SELECT {} FROM nodes WHERE dot_oid = ?1", NODE_COLUMNS),
                params![dot_oid],
                NodeRow::from_row,
            )
            .optional()?;
        row.map(NodeRow::into_record).transpose()
    }

    pub fn count_nodes(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn all_nodes(&self) -> Result<Vec<NodeRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM nodes ORDER BY dot_oid",
            NODE_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], NodeRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(NodeRow::into_record).collect()
    }

    pub fn children_of(&self, parent: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT dot_oid FROM nodes WHERE parent = ?1 ORDER BY dot_oid")?;
        let ids = stmt
            .query_map(params![parent], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

impl NodeStore for Database {
    fn exists(&self, dot_oid: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .lock()?
            .query_row(
                "SELECT 1 FROM nodes WHERE dot_oid = ?1",
                params![dot_oid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert(&self, record: &NodeRecord) -> Result<(), StoreError> {
        let node_code = record
            .node_code
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = self.lock()?.execute(
            &format!(
                "INSERT INTO nodes ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                NODE_COLUMNS
            ),
            params![
                &record.dot_oid,
                node_code,
                serde_json::to_string(&record.node_names)?,
                &record.parent,
                serde_json::to_string(&record.asn1_oid)?,
                serde_json::to_string(&record.iri_oid)?,
                record.creation_date.map(|dt| dt.to_rfc3339()),
                record.modification_date.map(|dt| dt.to_rfc3339()),
                serde_json::to_string(&record.detailed_data)?,
                serde_json::to_string(&record.children)?,
                serde_json::to_string(&record.other_fields)?,
                record.scrape_time.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::Duplicate(record.dot_oid.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

const NODE_COLUMNS: &str = "dot_oid, node_code, node_names, parent, asn1_oid, iri_oid, \
    creation_date, modification_date, detailed_data, children, other_fields, scrape_time";

/// Raw column values of a `nodes` row, decoded outside the rusqlite closure
/// so that JSON errors surface as [`StoreError::Serialization`].
struct NodeRow {
    dot_oid: String,
    node_code: Option<String>,
    node_names: String,
    parent: Option<String>,
    asn1_oid: String,
    iri_oid: String,
    creation_date: Option<String>,
    modification_date: Option<String>,
    detailed_data: String,
    children: String,
    other_fields: String,
    scrape_time: String,
}

impl NodeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(NodeRow {
            dot_oid: row.get(0)?,
            node_code: row.get(1)?,
            node_names: row.get(2)?,
            parent: row.get(3)?,
            asn1_oid: row.get(4)?,
            iri_oid: row.get(5)?,
            creation_date: row.get(6)?,
            modification_date: row.get(7)?,
            detailed_data: row.get(8)?,
            children: row.get(9)?,
            other_fields: row.get(10)?,
            scrape_time: row.get(11)?,
        })
    }

    fn into_record(self) -> Result<NodeRecord, StoreError> {
        Ok(NodeRecord {
            dot_oid: self.dot_oid,
            node_code: self
                .node_code
                .as_deref()
                .map(serde_json::from_str::<NodeCode>)
                .transpose()?,
            node_names: serde_json::from_str(&self.node_names)?,
            parent: self.parent,
            asn1_oid: serde_json::from_str(&self.asn1_oid)?,
            iri_oid: serde_json::from_str(&self.iri_oid)?,
            creation_date: self.creation_date.as_deref().map(parse_timestamp).transpose()?,
            modification_date: self
                .modification_date
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            detailed_data: serde_json::from_str::<BTreeMap<String, String>>(&self.detailed_data)?,
            children: serde_json::from_str::<Vec<ChildRef>>(&self.children)?,
            other_fields: serde_json::from_str(&self.other_fields)?,
            scrape_time: parse_timestamp(&self.scrape_time)?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Timestamp(s.to_string()))
}
