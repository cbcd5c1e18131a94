//! Run log read model.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use magpie_core::runlog::{RunFilter, RunRecord};

use crate::state::AppState;

/// Maximum allowed limit for run queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for run queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for the runs endpoint
#[derive(Debug, Deserialize)]
pub struct RunsQueryParams {
    /// Filter by source name
    pub source: Option<String>,
    /// Filter by terminal status ("success", "error", "halted")
    pub status: Option<String>,
    /// Maximum number of runs to return (default 100, max 1000)
    pub limit: Option<i64>,
    /// Pagination offset (default 0)
    pub offset: Option<i64>,
}

/// Response for the runs endpoint
#[derive(Debug, Serialize)]
pub struct RunsResponse {
    /// Matching runs, newest first
    pub runs: Vec<RunRecord>,
    /// Total number of matching runs
    pub total: i64,
    /// Limit used for this query
    pub limit: i64,
    /// Offset used for this query
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Query recorded scrape runs.
pub async fn query_runs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RunsQueryParams>,
) -> Result<Json<RunsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut base_filter = RunFilter::new();
    if let Some(ref source) = params.source {
        base_filter = base_filter.with_source(source.clone());
    }
    if let Some(ref status) = params.status {
        base_filter = base_filter.with_status(status.clone());
    }

    let query_filter = base_filter.clone().with_limit(limit).with_offset(offset);

    let runs = state.run_log_store().query(&query_filter).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to query runs: {}", e),
            }),
        )
    })?;

    let total = state.run_log_store().count(&base_filter).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to count runs: {}", e),
            }),
        )
    })?;

    Ok(Json(RunsResponse {
        runs,
        total,
        limit,
        offset,
    }))
}
