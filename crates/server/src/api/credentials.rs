//! OAuth credential administration.
//!
//! Reads never return secret material. The client secret and both tokens
//! are reported as presence flags only.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use magpie_core::credentials::{CredentialError, OAuthCredential};

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Credential view with secret material stripped.
#[derive(Debug, Serialize)]
pub struct RedactedCredential {
    pub platform: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<DateTime<Utc>>,
}

impl From<OAuthCredential> for RedactedCredential {
    fn from(credential: OAuthCredential) -> Self {
        Self {
            platform: credential.platform,
            client_id: credential.client_id,
            redirect_uri: credential.redirect_uri,
            has_access_token: credential.access_token.is_some(),
            has_refresh_token: credential.refresh_token.is_some(),
            token_expires_at: credential.token_expires_at,
        }
    }
}

/// Stored credential for a platform, redacted.
pub async fn get_credential(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
) -> Result<Json<RedactedCredential>, (StatusCode, Json<ErrorResponse>)> {
    match state.credential_store().get(&platform) {
        Ok(Some(credential)) => Ok(Json(credential.into())),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: CredentialError::NotFound(platform).to_string(),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct CredentialUpdateRequest {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// Create or replace the platform's credential row.
pub async fn put_credential(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    Json(request): Json<CredentialUpdateRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let credential = OAuthCredential {
        platform,
        client_id: request.client_id,
        client_secret: request.client_secret,
        redirect_uri: request.redirect_uri,
        access_token: request.access_token,
        refresh_token: request.refresh_token,
        token_expires_at: request.token_expires_at,
    };

    match state.credential_store().upsert(&credential) {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}
