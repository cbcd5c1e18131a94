//! In-memory credential store for testing.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::credentials::{CredentialError, CredentialStore, OAuthCredential};

/// A recorded token refresh for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedRefresh {
    pub platform: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Mock implementation of the CredentialStore trait.
///
/// # Example
///
/// ```rust,ignore
/// use magpie_core::testing::MockCredentialStore;
///
/// let store = MockCredentialStore::new();
/// store.seed("ravelry", "old-token", "refresh-1");
///
/// // After the session refreshes, inspect what was persisted.
/// let refreshes = store.recorded_refreshes();
/// assert_eq!(refreshes[0].access_token, "new-token");
/// ```
#[derive(Default)]
pub struct MockCredentialStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    credentials: HashMap<String, OAuthCredential>,
    refreshes: Vec<RecordedRefresh>,
    next_error: Option<CredentialError>,
}

impl std::fmt::Debug for MockCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCredentialStore").finish()
    }
}

impl MockCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a complete credential with an access and refresh token.
    pub fn seed(&self, platform: &str, access_token: &str, refresh_token: &str) {
        self.inner.lock().unwrap().credentials.insert(
            platform.to_string(),
            OAuthCredential {
                platform: platform.to_string(),
                client_id: "client-id".to_string(),
                client_secret: "client-secret".to_string(),
                redirect_uri: None,
                access_token: Some(access_token.to_string()),
                refresh_token: Some(refresh_token.to_string()),
                token_expires_at: None,
            },
        );
    }

    /// Fail the next store call with the given error.
    pub fn set_next_error(&self, error: CredentialError) {
        self.inner.lock().unwrap().next_error = Some(error);
    }

    /// Refreshes persisted through `update_tokens`.
    pub fn recorded_refreshes(&self) -> Vec<RecordedRefresh> {
        self.inner.lock().unwrap().refreshes.clone()
    }
}

impl CredentialStore for MockCredentialStore {
    fn get(&self, platform: &str) -> Result<Option<OAuthCredential>, CredentialError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.next_error.take() {
            return Err(err);
        }
        Ok(inner.credentials.get(platform).cloned())
    }

    fn upsert(&self, credential: &OAuthCredential) -> Result<(), CredentialError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.next_error.take() {
            return Err(err);
        }
        inner
            .credentials
            .insert(credential.platform.clone(), credential.clone());
        Ok(())
    }

    fn update_tokens(
        &self,
        platform: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), CredentialError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.next_error.take() {
            return Err(err);
        }

        let credential = inner
            .credentials
            .get_mut(platform)
            .ok_or_else(|| CredentialError::NotFound(platform.to_string()))?;

        credential.access_token = Some(access_token.to_string());
        if let Some(token) = refresh_token {
            credential.refresh_token = Some(token.to_string());
        }
        credential.token_expires_at = expires_at;

        inner.refreshes.push(RecordedRefresh {
            platform: platform.to_string(),
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_and_get() {
        let store = MockCredentialStore::new();
        store.seed("ravelry", "token-1", "refresh-1");

        let credential = store.get("ravelry").unwrap().unwrap();
        assert_eq!(credential.access_token.as_deref(), Some("token-1"));
        assert!(store.get("thingiverse").unwrap().is_none());
    }

    #[test]
    fn test_update_tokens_keeps_refresh_token_when_absent() {
        let store = MockCredentialStore::new();
        store.seed("ravelry", "token-1", "refresh-1");

        store
            .update_tokens("ravelry", "token-2", None, None)
            .unwrap();

        let credential = store.get("ravelry").unwrap().unwrap();
        assert_eq!(credential.access_token.as_deref(), Some("token-2"));
        assert_eq!(credential.refresh_token.as_deref(), Some("refresh-1"));

        let refreshes = store.recorded_refreshes();
        assert_eq!(refreshes.len(), 1);
        assert_eq!(refreshes[0].platform, "ravelry");
    }

    #[test]
    fn test_update_tokens_unknown_platform_fails() {
        let store = MockCredentialStore::new();
        let result = store.update_tokens("ravelry", "token", None, None);
        assert!(matches!(result, Err(CredentialError::NotFound(_))));
    }

    #[test]
    fn test_error_injection_is_one_shot() {
        let store = MockCredentialStore::new();
        store.set_next_error(CredentialError::Database("locked".to_string()));

        assert!(store.get("ravelry").is_err());
        assert!(store.get("ravelry").is_ok());
    }
}
