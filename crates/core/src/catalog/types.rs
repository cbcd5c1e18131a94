//! Types for the product catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A catalog row. Created on first sighting of an identity URL, updated on
/// later sightings, never deleted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Row id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Canonical external URL - the deduplication key.
    pub url: String,
    /// Free-text description.
    pub description: String,
    /// Source identifier (canonicalized, e.g. "scraped-github").
    pub source: String,
    /// Product kind display name.
    pub product_type: String,
    /// Identifier on the external platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Preview image URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Alt text for the preview image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_alt: Option<String>,
    /// Rating normalized to 0-5.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    /// Number of ratings behind the rating value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_count: Option<u32>,
    /// When the item last changed on the platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_last_updated: Option<DateTime<Utc>>,
    /// Platform-specific extras.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// URL-safe unique slug. Absent only for rows written before slugs
    /// existed; backfilled on the next update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// When the row was first created by a scrape.
    pub scraped_at: DateTime<Utc>,
    /// Tags; fully replaced on each write that specifies tags.
    pub tags: Vec<String>,
    /// Whether the vendor no longer offers the product.
    pub banned: bool,
}

/// Fields for a new catalog row.
#[derive(Debug, Clone)]
pub struct NewCatalogItem {
    pub name: String,
    pub url: String,
    pub description: String,
    pub source: String,
    pub product_type: String,
    pub external_id: Option<String>,
    pub image_url: Option<String>,
    pub image_alt: Option<String>,
    pub rating: Option<f64>,
    pub rating_count: Option<u32>,
    pub source_last_updated: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
    pub slug: String,
    pub scraped_at: DateTime<Utc>,
    pub banned: bool,
}

/// Fields an update may touch. Identity fields (url, source, external_id,
/// scraped_at) are deliberately absent.
#[derive(Debug, Clone, Default)]
pub struct CatalogUpdate {
    pub name: String,
    pub description: String,
    pub product_type: String,
    pub image_url: Option<String>,
    pub image_alt: Option<String>,
    pub rating: Option<f64>,
    pub rating_count: Option<u32>,
    pub source_last_updated: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
    /// Backfill slug only when the row has none.
    pub slug_if_absent: Option<String>,
    pub banned: bool,
}

/// Errors for catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Uniqueness violation: {0}")]
    Duplicate(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
