//! OAuth credential storage and in-flight token refresh.
//!
//! Adapters never read tokens from storage directly; they go through an
//! `AuthSession`, which owns the refresh-and-retry-once behavior for
//! rejected requests.

mod session;
mod sqlite;
mod types;

pub use session::{AuthSession, RefreshAuthStyle, TokenEndpoint};
pub use sqlite::SqliteCredentialStore;
pub use types::*;

use chrono::{DateTime, Utc};

/// Trait for OAuth credential storage.
pub trait CredentialStore: Send + Sync {
    /// Look up the credential for a platform.
    fn get(&self, platform: &str) -> Result<Option<OAuthCredential>, CredentialError>;

    /// Insert or fully replace the credential for a platform.
    fn upsert(&self, credential: &OAuthCredential) -> Result<(), CredentialError>;

    /// Persist tokens from a refresh. A `None` refresh token keeps the
    /// stored one, since some platforms do not rotate it.
    fn update_tokens(
        &self,
        platform: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), CredentialError>;
}
