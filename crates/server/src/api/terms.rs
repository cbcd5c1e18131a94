//! Per-platform search term administration.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct TermsResponse {
    pub platform: String,
    /// Whether a stored list exists; false means the adapter uses its
    /// compiled-in defaults and `terms` is empty.
    pub stored: bool,
    pub terms: Vec<String>,
}

/// Stored search terms for a platform.
pub async fn get_terms(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
) -> Result<Json<TermsResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.term_store().get(&platform) {
        Ok(terms) => Ok(Json(TermsResponse {
            platform,
            stored: terms.is_some(),
            terms: terms.unwrap_or_default(),
        })),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct TermsUpdateRequest {
    pub terms: Vec<String>,
}

/// Replace the platform's term list in full.
pub async fn put_terms(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    Json(request): Json<TermsUpdateRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    match state.term_store().replace(&platform, &request.terms) {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}
