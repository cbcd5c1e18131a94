//! Product catalog - the canonical store of reconciled items.
//!
//! Adapters never write here directly; the reconciler routes every raw item
//! through the `ProductCatalog` trait so identity invariants hold regardless
//! of which platform produced the item.

mod reconciler;
mod slug;
mod sqlite;
mod types;

pub use reconciler::{Reconciler, ReconcileOutcome};
pub use slug::{base_slug, slugify};
pub use sqlite::SqliteCatalog;
pub use types::*;

/// Trait for product catalog storage.
///
/// The sqlite implementation enforces UNIQUE constraints on the identity URL
/// and the slug; those constraints are the correctness backstop when
/// concurrent adapters race past the advisory `find_by_url` check.
pub trait ProductCatalog: Send + Sync {
    /// Look up an item by its identity URL.
    fn find_by_url(&self, url: &str) -> Result<Option<CatalogItem>, CatalogError>;

    /// Whether any row already uses the given slug.
    fn slug_exists(&self, slug: &str) -> Result<bool, CatalogError>;

    /// Insert a new row, returning its id.
    fn insert(&self, item: &NewCatalogItem) -> Result<i64, CatalogError>;

    /// Update non-identity fields of an existing row.
    fn update(&self, id: i64, update: &CatalogUpdate) -> Result<(), CatalogError>;

    /// Replace the item's tag associations in full.
    fn replace_tags(&self, id: i64, tags: &[String]) -> Result<(), CatalogError>;

    /// Fetch a row by id.
    fn get(&self, id: i64) -> Result<CatalogItem, CatalogError>;

    /// Total row count.
    fn count(&self) -> Result<u64, CatalogError>;
}
