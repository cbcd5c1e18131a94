//! Run log storage trait and query filter.

use thiserror::Error;

use super::RunRecord;

#[derive(Debug, Error)]
pub enum RunLogError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Filter for querying run records.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub source: Option<String>,
    pub status: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl RunFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for run log storage. Insert-only; there is no update path.
pub trait RunLogStore: Send + Sync {
    /// Insert a run record, returns the assigned ID.
    fn insert(&self, record: &RunRecord) -> Result<i64, RunLogError>;

    /// Query run records, newest first.
    fn query(&self, filter: &RunFilter) -> Result<Vec<RunRecord>, RunLogError>;

    /// Count matching run records.
    fn count(&self, filter: &RunFilter) -> Result<i64, RunLogError>;
}
