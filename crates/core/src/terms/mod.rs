//! Per-platform search term storage.
//!
//! Adapters compile in default term lists; a stored row replaces the
//! defaults wholesale for that platform key. Ravelry keys its
//! pattern-attribute categories separately from free-text platforms.

mod sqlite;

pub use sqlite::SqliteTermStore;

use thiserror::Error;

/// Errors for term storage operations.
#[derive(Debug, Error)]
pub enum TermError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Trait for search term storage.
pub trait TermStore: Send + Sync {
    /// Stored terms for a platform key, `None` when no row exists and the
    /// adapter should use its compiled-in defaults.
    fn get(&self, platform: &str) -> Result<Option<Vec<String>>, TermError>;

    /// Replace the platform's term list in full.
    fn replace(&self, platform: &str, terms: &[String]) -> Result<(), TermError>;
}
