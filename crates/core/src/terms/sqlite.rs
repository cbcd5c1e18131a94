//! SQLite-backed term store implementation.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::{TermError, TermStore};

/// SQLite-backed search term store. Terms are kept as a JSON array per
/// platform key.
pub struct SqliteTermStore {
    conn: Mutex<Connection>,
}

impl SqliteTermStore {
    /// Create a new SQLite term store, creating the database file and
    /// tables if needed.
    pub fn new(path: &Path) -> Result<Self, TermError> {
        let conn = Connection::open(path).map_err(map_db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, TermError> {
        let conn = Connection::open_in_memory().map_err(map_db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TermError> {
        conn.execute_batch(
            r#"
            -- One row per platform key; terms as a JSON array
            CREATE TABLE IF NOT EXISTS search_terms (
                platform TEXT PRIMARY KEY,
                terms TEXT NOT NULL
            );
            "#,
        )
        .map_err(map_db_err)
    }
}

impl TermStore for SqliteTermStore {
    fn get(&self, platform: &str) -> Result<Option<Vec<String>>, TermError> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row(
                "SELECT terms FROM search_terms WHERE platform = ?1",
                params![platform],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_db_err)?;

        match raw {
            Some(json) => {
                let terms: Vec<String> = serde_json::from_str(&json)
                    .map_err(|e| TermError::Serialization(e.to_string()))?;
                Ok(Some(terms))
            }
            None => Ok(None),
        }
    }

    fn replace(&self, platform: &str, terms: &[String]) -> Result<(), TermError> {
        let json =
            serde_json::to_string(terms).map_err(|e| TermError::Serialization(e.to_string()))?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO search_terms (platform, terms) VALUES (?1, ?2)
             ON CONFLICT(platform) DO UPDATE SET terms = excluded.terms",
            params![platform, json],
        )
        .map_err(map_db_err)?;
        Ok(())
    }
}

fn map_db_err(e: rusqlite::Error) -> TermError {
    TermError::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_get_missing_returns_none() {
        let store = SqliteTermStore::in_memory().unwrap();
        assert!(store.get("github").unwrap().is_none());
    }

    #[test]
    fn test_replace_and_get() {
        let store = SqliteTermStore::in_memory().unwrap();
        store
            .replace("github", &terms(&["screen reader", "eye tracking"]))
            .unwrap();

        let stored = store.get("github").unwrap().unwrap();
        assert_eq!(stored, terms(&["screen reader", "eye tracking"]));
    }

    #[test]
    fn test_replace_overwrites_in_full() {
        let store = SqliteTermStore::in_memory().unwrap();
        store.replace("github", &terms(&["a", "b", "c"])).unwrap();
        store.replace("github", &terms(&["d"])).unwrap();

        assert_eq!(store.get("github").unwrap().unwrap(), terms(&["d"]));
    }

    #[test]
    fn test_platform_keys_are_independent() {
        let store = SqliteTermStore::in_memory().unwrap();
        store.replace("github", &terms(&["a"])).unwrap();
        store
            .replace("ravelry_pa_categories", &terms(&["one-handed"]))
            .unwrap();

        assert_eq!(store.get("github").unwrap().unwrap(), terms(&["a"]));
        assert_eq!(
            store.get("ravelry_pa_categories").unwrap().unwrap(),
            terms(&["one-handed"])
        );
    }

    #[test]
    fn test_empty_list_round_trips() {
        let store = SqliteTermStore::in_memory().unwrap();
        store.replace("github", &[]).unwrap();
        assert_eq!(store.get("github").unwrap().unwrap(), Vec::<String>::new());
    }
}
