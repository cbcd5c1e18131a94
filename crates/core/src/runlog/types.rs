//! Types for the run log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scraper::ScrapeResult;

/// A persisted scrape run. Rows are never updated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Row id.
    pub id: i64,
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
    /// Adapter name.
    pub source: String,
    /// Terminal status string ("success", "error", "halted").
    pub status: String,
    pub found: u32,
    pub added: u32,
    pub updated: u32,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Who caused the run; never empty.
    pub actor: String,
}

/// A run result paired with its resolved actor, queued for the writer.
#[derive(Debug, Clone)]
pub struct RunLogEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub result: ScrapeResult,
}
