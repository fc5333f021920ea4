//! Stat table persistence (SQLite)
//!
//! The table holds exactly one row per tracked key. It is dropped and
//! recreated at startup, pre-seeded with zeros, and from then on only ever
//! updated in place by (QueueID, MediaType).

use crate::domain::stat_row::{Column, FieldValue, StatRow};
use crate::domain::types::{MediaType, TrackedKey};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_TABLE: &str = "QueueStats";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("no pre-seeded row for {key}")]
    RowMissing { key: TrackedKey },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid table name '{0}'")]
    InvalidTable(String),
}

/// Per-key row writer the poller depends on
pub trait StatStore: Send {
    /// Overwrite the stored row for `row.key`
    fn upsert_row(&mut self, row: &StatRow) -> Result<(), StoreError>;
}

pub struct SqliteStore {
    conn: Connection,
    table: String,
    update_sql: String,
}

impl SqliteStore {
    /// Open a file-backed store
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), table = %table, "store_opened");
        Self::with_connection(conn, table)
    }

    /// In-memory store (tests)
    pub fn open_in_memory(table: &str) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self, StoreError> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StoreError::InvalidTable(table.to_string()));
        }
        Ok(Self { conn, table: table.to_string(), update_sql: update_statement(table) })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Drop and recreate the stat table, then seed one zero row per tracked key.
    ///
    /// `queue_names` supplies display names; unknown queues get an empty name.
    pub fn prepare_table(
        &mut self,
        queue_ids: &[String],
        queue_names: &HashMap<String, String>,
    ) -> Result<usize, StoreError> {
        // No history is kept, so any previous table is discarded
        if let Err(e) = self.conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", self.table)) {
            warn!(table = %self.table, error = %e, "store_drop_table_failed");
        }

        info!(table = %self.table, "store_creating_table");
        self.conn.execute_batch(&create_statement(&self.table))?;

        let tx = self.conn.transaction()?;
        let mut seeded = 0;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} (QueueID, QueueName, MediaType) VALUES (?1, ?2, ?3)",
                self.table
            ))?;
            for key in TrackedKey::cross_product(queue_ids) {
                let name = queue_names.get(&key.queue_id).map(String::as_str).unwrap_or("");
                if name.is_empty() {
                    debug!(queue_id = %key.queue_id, "store_queue_name_unknown");
                }
                insert.execute(params![key.queue_id, name, key.media_type.as_str()])?;
                seeded += 1;
            }
        }
        tx.commit()?;

        info!(table = %self.table, rows = %seeded, "store_table_seeded");
        Ok(seeded)
    }

    /// Read back the stored row for `key`
    pub fn read_row(&self, key: &TrackedKey) -> Result<Option<StatRow>, StoreError> {
        let columns: Vec<&str> = Column::ALL.iter().map(|c| c.name()).collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE QueueID = ?1 AND MediaType = ?2",
            columns.join(", "),
            self.table
        );

        let row = self
            .conn
            .query_row(&sql, params![key.queue_id, key.media_type.as_str()], |r| {
                let mut row = StatRow::new(key.clone());
                for (i, column) in Column::ALL.iter().enumerate() {
                    match r.get::<_, Value>(i)? {
                        Value::Integer(v) => row.set_count(*column, v),
                        Value::Real(v) => row.set_real(*column, v),
                        _ => {}
                    }
                }
                Ok(row)
            })
            .optional()?;
        Ok(row)
    }

    /// Stored display name for a queue
    pub fn queue_name(&self, queue_id: &str) -> Result<Option<String>, StoreError> {
        let name = self
            .conn
            .query_row(
                &format!("SELECT QueueName FROM {} WHERE QueueID = ?1 AND MediaType = ?2", self.table),
                params![queue_id, MediaType::Voice.as_str()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(name)
    }

    pub fn row_count(&self) -> Result<usize, StoreError> {
        let count: i64 =
            self.conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |r| r.get(0))?;
        Ok(count as usize)
    }
}

impl StatStore for SqliteStore {
    fn upsert_row(&mut self, row: &StatRow) -> Result<(), StoreError> {
        let values = row
            .iter()
            .map(|(_, v)| match v {
                FieldValue::Int(i) => Value::Integer(i),
                FieldValue::Real(r) => Value::Real(r),
            })
            .chain([
                Value::Text(row.key.queue_id.clone()),
                Value::Text(row.key.media_type.as_str().to_string()),
            ]);

        let mut stmt = self.conn.prepare_cached(&self.update_sql)?;
        let changed = stmt.execute(params_from_iter(values))?;
        if changed == 0 {
            return Err(StoreError::RowMissing { key: row.key.clone() });
        }
        Ok(())
    }
}

fn create_statement(table: &str) -> String {
    let stat_columns: Vec<String> =
        Column::ALL.iter().map(|c| format!("{} {} NOT NULL DEFAULT 0", c.name(), c.kind().sql_type())).collect();
    format!(
        "CREATE TABLE {} (QueueID VARCHAR(50) NOT NULL, QueueName VARCHAR(100), MediaType VARCHAR(10) NOT NULL, {}, PRIMARY KEY (QueueID, MediaType))",
        table,
        stat_columns.join(", ")
    )
}

fn update_statement(table: &str) -> String {
    let assignments: Vec<String> = Column::ALL.iter().map(|c| format!("{} = ?", c.name())).collect();
    format!("UPDATE {} SET {} WHERE QueueID = ? AND MediaType = ?", table, assignments.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn queues() -> Vec<String> {
        vec!["Q1".to_string(), "Q2".to_string()]
    }

    fn prepared_store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory(DEFAULT_TABLE).unwrap();
        let names = HashMap::from([("Q1".to_string(), "Sales".to_string())]);
        store.prepare_table(&queues(), &names).unwrap();
        store
    }

    #[test]
    fn test_prepare_seeds_cross_product() {
        let store = prepared_store();
        assert_eq!(store.row_count().unwrap(), 6);
        assert_eq!(store.queue_name("Q1").unwrap().as_deref(), Some("Sales"));
        assert_eq!(store.queue_name("Q2").unwrap().as_deref(), Some(""));

        let row = store.read_row(&TrackedKey::new("Q2", MediaType::Email)).unwrap().unwrap();
        assert!(row.populated().is_empty());
    }

    #[test]
    fn test_prepare_drops_previous_contents() {
        let mut store = prepared_store();
        store.prepare_table(&["Q9".to_string()], &HashMap::new()).unwrap();
        assert_eq!(store.row_count().unwrap(), 3);
        assert!(store.read_row(&TrackedKey::new("Q1", MediaType::Voice)).unwrap().is_none());
    }

    #[test]
    fn test_upsert_overwrites_whole_row() {
        let mut store = prepared_store();
        let key = TrackedKey::new("Q1", MediaType::Voice);

        let mut first = StatRow::new(key.clone());
        first.set_count(Column::NOffered, 10);
        first.set_real(Column::TTalk, 99.5);
        store.upsert_row(&first).unwrap();

        let mut second = StatRow::new(key.clone());
        second.set_count(Column::NOffered, 4);
        store.upsert_row(&second).unwrap();

        let stored = store.read_row(&key).unwrap().unwrap();
        assert_eq!(stored, second);
        assert_eq!(stored.real(Column::TTalk), 0.0);

        // Other keys untouched
        let other = store.read_row(&TrackedKey::new("Q1", MediaType::Chat)).unwrap().unwrap();
        assert!(other.populated().is_empty());
    }

    #[test]
    fn test_upsert_unknown_key_is_row_missing() {
        let mut store = prepared_store();
        let row = StatRow::new(TrackedKey::new("Q404", MediaType::Voice));
        assert!(matches!(store.upsert_row(&row), Err(StoreError::RowMissing { .. })));
    }

    #[test]
    fn test_invalid_table_name_rejected() {
        assert!(matches!(
            SqliteStore::open_in_memory("QueueStats; DROP"),
            Err(StoreError::InvalidTable(_))
        ));
    }

    #[test]
    fn test_file_store_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("wallboard.db");
        let mut store = SqliteStore::open(&path, DEFAULT_TABLE).unwrap();
        store.prepare_table(&queues(), &HashMap::new()).unwrap();
        assert!(path.exists());
    }
}
