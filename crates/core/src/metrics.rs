//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Scrape runs (triggers, completions, durations)
//! - Catalog reconciliation (items found, added, updated)
//! - Source HTTP traffic (requests, token refreshes)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Scrape Run Metrics
// =============================================================================

/// Scrape runs started total by source.
pub static SCRAPE_RUNS_STARTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("magpie_scrape_runs_started_total", "Total scrape runs started"),
        &["source"],
    )
    .unwrap()
});

/// Scrape runs completed total by source and status.
pub static SCRAPE_RUNS_COMPLETED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "magpie_scrape_runs_completed_total",
            "Total scrape runs completed",
        ),
        &["source", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// Scrape runs rejected because the source was already running.
pub static SCRAPE_RUNS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "magpie_scrape_runs_rejected_total",
            "Total scrape runs rejected while another run held the source lock",
        ),
        &["source"],
    )
    .unwrap()
});

/// Scrape run duration in seconds.
pub static SCRAPE_RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "magpie_scrape_run_duration_seconds",
            "Duration of scrape runs",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        &["source"],
    )
    .unwrap()
});

/// Scheduled runs skipped total by reason.
pub static SCHEDULED_RUNS_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "magpie_scheduled_runs_skipped_total",
            "Total scheduled runs skipped before starting",
        ),
        &["source", "reason"], // reason: "misfire", "missing_credentials", "already_running"
    )
    .unwrap()
});

// =============================================================================
// Reconciliation Metrics
// =============================================================================

/// Items found per run, by source.
pub static ITEMS_FOUND: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("magpie_items_found_total", "Total items found by scrapers"),
        &["source"],
    )
    .unwrap()
});

/// Items added to the catalog, by source.
pub static ITEMS_ADDED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "magpie_items_added_total",
            "Total new items added to the catalog",
        ),
        &["source"],
    )
    .unwrap()
});

/// Items updated in place, by source.
pub static ITEMS_UPDATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "magpie_items_updated_total",
            "Total existing catalog items updated",
        ),
        &["source"],
    )
    .unwrap()
});

/// Items skipped during reconciliation.
pub static ITEMS_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "magpie_items_skipped_total",
            "Total items skipped during reconciliation",
        ),
        &["source"],
    )
    .unwrap()
});

// =============================================================================
// Source HTTP Metrics
// =============================================================================

/// Source request duration.
pub static SOURCE_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "magpie_source_request_duration_seconds",
            "Duration of HTTP requests to source platforms",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["source"],
    )
    .unwrap()
});

/// Source requests total by source and status.
pub static SOURCE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "magpie_source_requests_total",
            "Total HTTP requests to source platforms",
        ),
        &["source", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// OAuth token refreshes total by platform and result.
pub static TOKEN_REFRESHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "magpie_token_refreshes_total",
            "Total OAuth token refresh attempts",
        ),
        &["platform", "result"], // result: "success", "failed"
    )
    .unwrap()
});

/// URL loads requested through the on-demand endpoint.
pub static URL_LOADS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "magpie_url_loads_total",
        "Total single item loads requested by URL",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Scrape runs
        Box::new(SCRAPE_RUNS_STARTED.clone()),
        Box::new(SCRAPE_RUNS_COMPLETED.clone()),
        Box::new(SCRAPE_RUNS_REJECTED.clone()),
        Box::new(SCRAPE_RUN_DURATION.clone()),
        Box::new(SCHEDULED_RUNS_SKIPPED.clone()),
        // Reconciliation
        Box::new(ITEMS_FOUND.clone()),
        Box::new(ITEMS_ADDED.clone()),
        Box::new(ITEMS_UPDATED.clone()),
        Box::new(ITEMS_SKIPPED.clone()),
        // Source HTTP
        Box::new(SOURCE_REQUEST_DURATION.clone()),
        Box::new(SOURCE_REQUESTS.clone()),
        Box::new(TOKEN_REFRESHES.clone()),
        Box::new(URL_LOADS.clone()),
    ]
}
