//! SQLite-backed credential store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{CredentialError, CredentialStore, OAuthCredential};

/// SQLite-backed credential store.
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
    /// Create a new SQLite credential store, creating the database file and
    /// tables if needed.
    pub fn new(path: &Path) -> Result<Self, CredentialError> {
        let conn = Connection::open(path).map_err(map_db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, CredentialError> {
        let conn = Connection::open_in_memory().map_err(map_db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CredentialError> {
        conn.execute_batch(
            r#"
            -- One row per platform; tokens mutate on refresh
            CREATE TABLE IF NOT EXISTS oauth_credentials (
                platform TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                client_secret TEXT NOT NULL,
                redirect_uri TEXT,
                access_token TEXT,
                refresh_token TEXT,
                token_expires_at TEXT
            );
            "#,
        )
        .map_err(map_db_err)
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn get(&self, platform: &str) -> Result<Option<OAuthCredential>, CredentialError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT platform, client_id, client_secret, redirect_uri,
                    access_token, refresh_token, token_expires_at
             FROM oauth_credentials WHERE platform = ?1",
            params![platform],
            row_to_credential,
        )
        .optional()
        .map_err(map_db_err)
    }

    fn upsert(&self, credential: &OAuthCredential) -> Result<(), CredentialError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO oauth_credentials
                 (platform, client_id, client_secret, redirect_uri,
                  access_token, refresh_token, token_expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(platform) DO UPDATE SET
                 client_id = excluded.client_id,
                 client_secret = excluded.client_secret,
                 redirect_uri = excluded.redirect_uri,
                 access_token = excluded.access_token,
                 refresh_token = excluded.refresh_token,
                 token_expires_at = excluded.token_expires_at",
            params![
                credential.platform,
                credential.client_id,
                credential.client_secret,
                credential.redirect_uri,
                credential.access_token,
                credential.refresh_token,
                credential.token_expires_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(map_db_err)?;
        Ok(())
    }

    fn update_tokens(
        &self,
        platform: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), CredentialError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE oauth_credentials SET
                     access_token = ?2,
                     refresh_token = COALESCE(?3, refresh_token),
                     token_expires_at = ?4
                 WHERE platform = ?1",
                params![
                    platform,
                    access_token,
                    refresh_token,
                    expires_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(map_db_err)?;

        if changed == 0 {
            return Err(CredentialError::NotFound(platform.to_string()));
        }
        Ok(())
    }
}

fn row_to_credential(row: &Row<'_>) -> rusqlite::Result<OAuthCredential> {
    let expires_raw: Option<String> = row.get(6)?;
    Ok(OAuthCredential {
        platform: row.get(0)?,
        client_id: row.get(1)?,
        client_secret: row.get(2)?,
        redirect_uri: row.get(3)?,
        access_token: row.get(4)?,
        refresh_token: row.get(5)?,
        token_expires_at: expires_raw
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc)),
    })
}

fn map_db_err(e: rusqlite::Error) -> CredentialError {
    CredentialError::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(platform: &str) -> OAuthCredential {
        OAuthCredential {
            platform: platform.to_string(),
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: Some("https://app.test/callback".to_string()),
            access_token: Some("access-1".to_string()),
            refresh_token: Some("refresh-1".to_string()),
            token_expires_at: None,
        }
    }

    #[test]
    fn test_get_missing_platform() {
        let store = SqliteCredentialStore::in_memory().unwrap();
        assert!(store.get("ravelry").unwrap().is_none());
    }

    #[test]
    fn test_upsert_and_get() {
        let store = SqliteCredentialStore::in_memory().unwrap();
        store.upsert(&sample("ravelry")).unwrap();

        let stored = store.get("ravelry").unwrap().unwrap();
        assert_eq!(stored.client_id, "client-id");
        assert_eq!(stored.access_token, Some("access-1".to_string()));
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let store = SqliteCredentialStore::in_memory().unwrap();
        store.upsert(&sample("ravelry")).unwrap();

        let mut replacement = sample("ravelry");
        replacement.client_secret = "rotated".to_string();
        store.upsert(&replacement).unwrap();

        let stored = store.get("ravelry").unwrap().unwrap();
        assert_eq!(stored.client_secret, "rotated");
    }

    #[test]
    fn test_update_tokens_rotates_both() {
        let store = SqliteCredentialStore::in_memory().unwrap();
        store.upsert(&sample("thingiverse")).unwrap();

        let expires = Utc::now() + Duration::hours(1);
        store
            .update_tokens("thingiverse", "access-2", Some("refresh-2"), Some(expires))
            .unwrap();

        let stored = store.get("thingiverse").unwrap().unwrap();
        assert_eq!(stored.access_token, Some("access-2".to_string()));
        assert_eq!(stored.refresh_token, Some("refresh-2".to_string()));
        assert!(stored.token_expires_at.is_some());
    }

    #[test]
    fn test_update_tokens_keeps_refresh_when_not_rotated() {
        let store = SqliteCredentialStore::in_memory().unwrap();
        store.upsert(&sample("thingiverse")).unwrap();

        store
            .update_tokens("thingiverse", "access-2", None, None)
            .unwrap();

        let stored = store.get("thingiverse").unwrap().unwrap();
        assert_eq!(stored.access_token, Some("access-2".to_string()));
        assert_eq!(stored.refresh_token, Some("refresh-1".to_string()));
    }

    #[test]
    fn test_update_tokens_unknown_platform() {
        let store = SqliteCredentialStore::in_memory().unwrap();
        let err = store
            .update_tokens("nope", "access", None, None)
            .unwrap_err();
        assert!(matches!(err, CredentialError::NotFound(_)));
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("credentials.db");

        let store = SqliteCredentialStore::new(&db_path).unwrap();
        store.upsert(&sample("github")).unwrap();

        assert!(db_path.exists());
        assert!(store.get("github").unwrap().is_some());
    }
}
