//! SQLite-backed run log store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{RunFilter, RunLogError, RunLogStore, RunRecord};

/// SQLite-backed run log store.
pub struct SqliteRunLogStore {
    conn: Mutex<Connection>,
}

impl SqliteRunLogStore {
    /// Create a new SQLite run log store, creating the database file and
    /// tables if needed.
    pub fn new(path: &Path) -> Result<Self, RunLogError> {
        let conn = Connection::open(path).map_err(map_db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, RunLogError> {
        let conn = Connection::open_in_memory().map_err(map_db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), RunLogError> {
        conn.execute_batch(
            r#"
            -- Append-only; rows are never updated
            CREATE TABLE IF NOT EXISTS scrape_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                source TEXT NOT NULL,
                status TEXT NOT NULL,
                found INTEGER NOT NULL,
                added INTEGER NOT NULL,
                updated INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                error_message TEXT,
                actor TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_scrape_runs_timestamp ON scrape_runs(timestamp);
            CREATE INDEX IF NOT EXISTS idx_scrape_runs_source ON scrape_runs(source);
            "#,
        )
        .map_err(map_db_err)
    }

    fn build_where_clause(filter: &RunFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref source) = filter.source {
            conditions.push("source = ?");
            params.push(Box::new(source.clone()));
        }

        if let Some(ref status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl RunLogStore for SqliteRunLogStore {
    fn insert(&self, record: &RunRecord) -> Result<i64, RunLogError> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO scrape_runs
                 (timestamp, source, status, found, added, updated,
                  duration_ms, error_message, actor)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.timestamp.to_rfc3339(),
                record.source,
                record.status,
                record.found,
                record.added,
                record.updated,
                record.duration_ms as i64,
                record.error_message,
                record.actor,
            ],
        )
        .map_err(map_db_err)?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &RunFilter) -> Result<Vec<RunRecord>, RunLogError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT id, timestamp, source, status, found, added, updated,
                    duration_ms, error_message, actor
             FROM scrape_runs {} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn.prepare(&sql).map_err(map_db_err)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let id: i64 = row.get(0)?;
                let timestamp_str: String = row.get(1)?;
                let source: String = row.get(2)?;
                let status: String = row.get(3)?;
                let found: u32 = row.get(4)?;
                let added: u32 = row.get(5)?;
                let updated: u32 = row.get(6)?;
                let duration_ms: i64 = row.get(7)?;
                let error_message: Option<String> = row.get(8)?;
                let actor: String = row.get(9)?;

                Ok((
                    id,
                    timestamp_str,
                    source,
                    status,
                    found,
                    added,
                    updated,
                    duration_ms,
                    error_message,
                    actor,
                ))
            })
            .map_err(map_db_err)?;

        let mut records = Vec::new();
        for row_result in rows {
            let (id, timestamp_str, source, status, found, added, updated, duration_ms, error_message, actor) =
                row_result.map_err(map_db_err)?;

            let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp_str)
                .map_err(|e| RunLogError::Database(format!("Invalid timestamp: {}", e)))?
                .into();

            records.push(RunRecord {
                id,
                timestamp,
                source,
                status,
                found,
                added,
                updated,
                duration_ms: duration_ms as u64,
                error_message,
                actor,
            });
        }

        Ok(records)
    }

    fn count(&self, filter: &RunFilter) -> Result<i64, RunLogError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM scrape_runs {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(map_db_err)
    }
}

fn map_db_err(e: rusqlite::Error) -> RunLogError {
    RunLogError::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(source: &str, status: &str) -> RunRecord {
        RunRecord {
            id: 0,
            timestamp: Utc::now(),
            source: source.to_string(),
            status: status.to_string(),
            found: 10,
            added: 5,
            updated: 3,
            duration_ms: 2000,
            error_message: None,
            actor: "system".to_string(),
        }
    }

    #[test]
    fn test_insert_assigns_ids() {
        let store = SqliteRunLogStore::in_memory().unwrap();
        let id1 = store.insert(&record("github", "success")).unwrap();
        let id2 = store.insert(&record("github", "success")).unwrap();
        assert!(id2 > id1);
    }

    #[test]
    fn test_query_newest_first() {
        let store = SqliteRunLogStore::in_memory().unwrap();
        let mut first = record("github", "success");
        first.found = 1;
        let mut second = record("github", "success");
        second.found = 2;
        second.timestamp = first.timestamp + chrono::Duration::seconds(10);

        store.insert(&first).unwrap();
        store.insert(&second).unwrap();

        let records = store.query(&RunFilter::new()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].found, 2);
        assert_eq!(records[1].found, 1);
    }

    #[test]
    fn test_query_filters_by_source() {
        let store = SqliteRunLogStore::in_memory().unwrap();
        store.insert(&record("github", "success")).unwrap();
        store.insert(&record("ravelry", "success")).unwrap();
        store.insert(&record("github", "error")).unwrap();

        let records = store
            .query(&RunFilter::new().with_source("github"))
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.source == "github"));
    }

    #[test]
    fn test_query_filters_by_status() {
        let store = SqliteRunLogStore::in_memory().unwrap();
        store.insert(&record("github", "success")).unwrap();
        store.insert(&record("github", "error")).unwrap();

        let records = store.query(&RunFilter::new().with_status("error")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, "error");
    }

    #[test]
    fn test_query_respects_limit() {
        let store = SqliteRunLogStore::in_memory().unwrap();
        for _ in 0..5 {
            store.insert(&record("github", "success")).unwrap();
        }

        let records = store.query(&RunFilter::new().with_limit(2)).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_count_with_filter() {
        let store = SqliteRunLogStore::in_memory().unwrap();
        store.insert(&record("github", "success")).unwrap();
        store.insert(&record("ravelry", "success")).unwrap();

        assert_eq!(store.count(&RunFilter::new()).unwrap(), 2);
        assert_eq!(
            store
                .count(&RunFilter::new().with_source("ravelry"))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_error_message_round_trips() {
        let store = SqliteRunLogStore::in_memory().unwrap();
        let mut failing = record("thingiverse", "error");
        failing.error_message = Some("connection refused".to_string());
        store.insert(&failing).unwrap();

        let records = store.query(&RunFilter::new()).unwrap();
        assert_eq!(
            records[0].error_message,
            Some("connection refused".to_string())
        );
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("runs.db");

        let store = SqliteRunLogStore::new(&db_path).unwrap();
        store.insert(&record("github", "success")).unwrap();

        assert!(db_path.exists());
        assert_eq!(store.count(&RunFilter::new()).unwrap(), 1);
    }
}
