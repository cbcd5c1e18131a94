//! Types for OAuth credential storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-platform OAuth state. Created by an out-of-band authorization flow,
/// mutated only through token refreshes and the admin surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthCredential {
    /// Platform key, e.g. "ravelry".
    pub platform: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the access token expires, if the platform reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// Errors for credential operations.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("No credential stored for platform: {0}")]
    NotFound(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_serialization_skips_absent_fields() {
        let credential = OAuthCredential {
            platform: "ravelry".to_string(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: None,
            access_token: Some("token".to_string()),
            refresh_token: None,
            token_expires_at: None,
        };

        let json = serde_json::to_string(&credential).unwrap();
        assert!(!json.contains("redirect_uri"));
        assert!(json.contains("access_token"));

        let parsed: OAuthCredential = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.platform, "ravelry");
        assert_eq!(parsed.access_token, Some("token".to_string()));
    }
}
