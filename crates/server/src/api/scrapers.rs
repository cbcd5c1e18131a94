//! Source listing, run triggering and single-URL loads.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use magpie_core::catalog::CatalogItem;
use magpie_core::trigger::LoadOutcome;
use magpie_core::{ScrapeMode, TriggerError};

use crate::state::AppState;

/// Smallest accepted sample size for test-mode runs.
const MIN_TEST_LIMIT: usize = 1;

/// Largest accepted sample size for test-mode runs.
const MAX_TEST_LIMIT: usize = 50;

/// Sample size used when test mode is requested without a limit.
const DEFAULT_TEST_LIMIT: usize = 5;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<String>,
}

/// List registered source names.
pub async fn list_sources(State(state): State<Arc<AppState>>) -> Json<SourcesResponse> {
    Json(SourcesResponse {
        sources: state.registry().names(),
    })
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub source: String,
    #[serde(default)]
    pub test_mode: bool,
    pub test_limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub status: String,
    pub source: String,
}

/// Start a scrape run for a source.
///
/// Returns 202 as soon as the run is accepted; the outcome lands in the
/// run log. A run already holding the source lock yields 409.
pub async fn trigger(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TriggerRequest>,
) -> Result<(StatusCode, Json<TriggerResponse>), (StatusCode, Json<ErrorResponse>)> {
    let mode = if request.test_mode {
        let limit = request
            .test_limit
            .unwrap_or(DEFAULT_TEST_LIMIT)
            .clamp(MIN_TEST_LIMIT, MAX_TEST_LIMIT);
        ScrapeMode::sample(limit)
    } else {
        ScrapeMode::full()
    };

    match state.trigger().trigger(&request.source, mode, None) {
        Ok(()) => Ok((
            StatusCode::ACCEPTED,
            Json(TriggerResponse {
                status: "accepted".to_string(),
                source: request.source,
            }),
        )),
        Err(e @ TriggerError::UnknownSource(_)) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
        Err(e @ TriggerError::AlreadyRunning(_)) => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: e.to_string(),
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
pub struct LoadUrlRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct LoadUrlResponse {
    /// "existing", "created" or "updated".
    pub outcome: String,
    pub item: CatalogItem,
}

/// Resolve one external URL into a catalog item.
pub async fn load_url(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoadUrlRequest>,
) -> Result<Json<LoadUrlResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.trigger().load_url(&request.url).await {
        Ok(outcome) => {
            let kind = match &outcome {
                LoadOutcome::Existing(_) => "existing",
                LoadOutcome::Created(_) => "created",
                LoadOutcome::Updated(_) => "updated",
            };
            Ok(Json(LoadUrlResponse {
                outcome: kind.to_string(),
                item: outcome.item().clone(),
            }))
        }
        Err(e @ (TriggerError::UnsupportedUrl(_) | TriggerError::NotFound(_))) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: e.to_string(),
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
