//! Types for the scraper contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export DateTime for use in other modules
pub use chrono;

/// Kind of product a source produces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    Software,
    Knitting,
    Crochet,
    Fabrication,
    AssistiveDevice,
    Other,
}

impl ProductKind {
    /// Display name stored in the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::Software => "Software",
            ProductKind::Knitting => "Knitting",
            ProductKind::Crochet => "Crochet",
            ProductKind::Fabrication => "Fabrication",
            ProductKind::AssistiveDevice => "Assistive Device",
            ProductKind::Other => "Other",
        }
    }
}

/// A normalized item produced by an adapter, before reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProduct {
    /// Display name.
    pub name: String,
    /// Canonical external URL - used as the deduplication key.
    pub url: String,
    /// Free-text description (may be empty).
    #[serde(default)]
    pub description: String,
    /// Source identifier (e.g. "scraped-github").
    pub source: String,
    /// Product kind.
    pub kind: ProductKind,
    /// Identifier on the external platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Preview image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Alt text for the preview image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_alt: Option<String>,
    /// Rating normalized to 0-5, if the platform reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    /// Number of ratings behind the rating value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_count: Option<u32>,
    /// When the item last changed on the platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_last_updated: Option<DateTime<Utc>>,
    /// Platform-specific extras, persisted as a JSON blob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Tags; associations are fully replaced on every write.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the vendor no longer offers the product.
    #[serde(default)]
    pub banned: bool,
}

/// How a scrape run should be bounded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScrapeMode {
    /// Sample mode: stop after `test_limit` items.
    #[serde(default)]
    pub test_mode: bool,
    /// Maximum items to process when `test_mode` is set.
    #[serde(default = "default_test_limit")]
    pub test_limit: usize,
}

fn default_test_limit() -> usize {
    5
}

impl Default for ScrapeMode {
    fn default() -> Self {
        Self {
            test_mode: false,
            test_limit: default_test_limit(),
        }
    }
}

impl ScrapeMode {
    /// A full, unbounded run.
    pub fn full() -> Self {
        Self::default()
    }

    /// A sample run bounded to `limit` items.
    pub fn sample(limit: usize) -> Self {
        Self {
            test_mode: true,
            test_limit: limit,
        }
    }

    /// Item quota for this run, if any.
    pub fn quota(&self) -> Option<usize> {
        if self.test_mode {
            Some(self.test_limit)
        } else {
            None
        }
    }
}

/// Terminal status of a scrape run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    Success,
    Error,
    Halted,
}

impl ScrapeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeStatus::Success => "success",
            ScrapeStatus::Error => "error",
            ScrapeStatus::Halted => "halted",
        }
    }
}

/// Outcome of one scrape invocation. Immutable once logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResult {
    /// Which adapter ran.
    pub source: String,
    /// Items seen after platform-side filtering.
    pub found: u32,
    /// New catalog rows created.
    pub added: u32,
    /// Existing catalog rows updated.
    pub updated: u32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Terminal status.
    pub status: ScrapeStatus,
    /// Error message when status is not success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ScrapeResult {
    /// An empty successful result for `source`.
    pub fn empty(source: &str) -> Self {
        Self {
            source: source.to_string(),
            found: 0,
            added: 0,
            updated: 0,
            duration_ms: 0,
            status: ScrapeStatus::Success,
            error_message: None,
        }
    }
}

/// Running counters for one scrape invocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunTally {
    pub found: u32,
    pub added: u32,
    pub updated: u32,
}

impl RunTally {
    /// Account one reconciled item.
    pub fn record(&mut self, source: &str, outcome: &crate::catalog::ReconcileOutcome) {
        use crate::catalog::ReconcileOutcome;
        match outcome {
            ReconcileOutcome::Created(_) => self.added += 1,
            ReconcileOutcome::Updated(_) => self.updated += 1,
            ReconcileOutcome::Skipped => {
                crate::metrics::ITEMS_SKIPPED
                    .with_label_values(&[source])
                    .inc();
            }
        }
    }

    /// Finish the run, folding an optional fatal error into the status.
    pub fn into_result(
        self,
        source: &str,
        started: std::time::Instant,
        error: Option<String>,
    ) -> ScrapeResult {
        ScrapeResult {
            source: source.to_string(),
            found: self.found,
            added: self.added,
            updated: self.updated,
            duration_ms: started.elapsed().as_millis() as u64,
            status: if error.is_some() {
                ScrapeStatus::Error
            } else {
                ScrapeStatus::Success
            },
            error_message: error,
        }
    }
}

/// Errors that can occur during scrape operations.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Platform API error: {0}")]
    ApiError(String),

    #[error("Authorization failed: {0}")]
    Unauthorized(String),

    #[error("Missing credential for platform: {0}")]
    MissingCredential(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScrapeError {
    /// Map a reqwest failure into the scrape taxonomy.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ScrapeError::Timeout
        } else if e.is_connect() {
            ScrapeError::ConnectionFailed(e.to_string())
        } else {
            ScrapeError::ApiError(e.to_string())
        }
    }
}

/// Contract for platform source adapters.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Source name for logging and run records.
    fn name(&self) -> &str;

    /// Whether this adapter can resolve the given external URL.
    fn supports_url(&self, url: &str) -> bool;

    /// Fetch and reconcile a single item by its external URL.
    ///
    /// Returns `Ok(None)` when the platform has no item at that URL.
    async fn scrape_one(&self, url: &str) -> Result<Option<RawProduct>, ScrapeError>;

    /// Run a full or sampled scrape. Never panics; item-level failures are
    /// absorbed into the result counts.
    async fn scrape(&self, mode: ScrapeMode) -> ScrapeResult;
}
