//! In-memory catalog for testing.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::catalog::{
    CatalogError, CatalogItem, CatalogUpdate, NewCatalogItem, ProductCatalog,
};

/// Mock implementation of the ProductCatalog trait.
///
/// Backed by a plain in-memory map, so reconciler tests can run without
/// sqlite and can inject storage failures.
///
/// # Example
///
/// ```rust,ignore
/// use magpie_core::testing::MockCatalog;
///
/// let catalog = MockCatalog::new();
/// catalog.set_next_error(CatalogError::SchemaMismatch("no such column".into()));
///
/// // First insert fails, exercising the degradation retry.
/// ```
#[derive(Default)]
pub struct MockCatalog {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    items: HashMap<i64, CatalogItem>,
    next_id: i64,
    next_error: Option<CatalogError>,
    insert_count: usize,
    update_count: usize,
}

impl std::fmt::Debug for MockCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCatalog").finish()
    }
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next storage call with the given error.
    pub fn set_next_error(&self, error: CatalogError) {
        self.inner.lock().unwrap().next_error = Some(error);
    }

    /// Number of successful inserts.
    pub fn insert_count(&self) -> usize {
        self.inner.lock().unwrap().insert_count
    }

    /// Number of successful updates.
    pub fn update_count(&self) -> usize {
        self.inner.lock().unwrap().update_count
    }

    /// Snapshot of all rows, ordered by id.
    pub fn all_items(&self) -> Vec<CatalogItem> {
        let inner = self.inner.lock().unwrap();
        let mut items: Vec<_> = inner.items.values().cloned().collect();
        items.sort_by_key(|i| i.id);
        items
    }

    /// Seed a row directly, bypassing the insert path.
    pub fn seed(&self, item: CatalogItem) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id = inner.next_id.max(item.id);
        inner.items.insert(item.id, item);
    }
}

fn take_error(inner: &mut Inner) -> Result<(), CatalogError> {
    match inner.next_error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

impl ProductCatalog for MockCatalog {
    fn find_by_url(&self, url: &str) -> Result<Option<CatalogItem>, CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        take_error(&mut inner)?;
        Ok(inner.items.values().find(|i| i.url == url).cloned())
    }

    fn slug_exists(&self, slug: &str) -> Result<bool, CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        take_error(&mut inner)?;
        Ok(inner
            .items
            .values()
            .any(|i| i.slug.as_deref() == Some(slug)))
    }

    fn insert(&self, item: &NewCatalogItem) -> Result<i64, CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        take_error(&mut inner)?;

        if inner.items.values().any(|i| i.url == item.url) {
            return Err(CatalogError::Duplicate(item.url.clone()));
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.items.insert(
            id,
            CatalogItem {
                id,
                name: item.name.clone(),
                url: item.url.clone(),
                description: item.description.clone(),
                source: item.source.clone(),
                product_type: item.product_type.clone(),
                external_id: item.external_id.clone(),
                image_url: item.image_url.clone(),
                image_alt: item.image_alt.clone(),
                rating: item.rating,
                rating_count: item.rating_count,
                source_last_updated: item.source_last_updated,
                metadata: item.metadata.clone(),
                slug: Some(item.slug.clone()),
                scraped_at: item.scraped_at,
                tags: Vec::new(),
                banned: item.banned,
            },
        );
        inner.insert_count += 1;
        Ok(id)
    }

    fn update(&self, id: i64, update: &CatalogUpdate) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        take_error(&mut inner)?;

        let item = inner
            .items
            .get_mut(&id)
            .ok_or_else(|| CatalogError::NotFound(format!("item {}", id)))?;

        item.name = update.name.clone();
        item.description = update.description.clone();
        item.product_type = update.product_type.clone();
        item.image_url = update.image_url.clone();
        item.image_alt = update.image_alt.clone();
        item.rating = update.rating;
        item.rating_count = update.rating_count;
        item.source_last_updated = update.source_last_updated;
        item.metadata = update.metadata.clone();
        item.banned = update.banned;
        if item.slug.is_none() {
            item.slug = update.slug_if_absent.clone();
        }
        inner.update_count += 1;
        Ok(())
    }

    fn replace_tags(&self, id: i64, tags: &[String]) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        take_error(&mut inner)?;

        let item = inner
            .items
            .get_mut(&id)
            .ok_or_else(|| CatalogError::NotFound(format!("item {}", id)))?;
        item.tags = tags.to_vec();
        Ok(())
    }

    fn get(&self, id: i64) -> Result<CatalogItem, CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        take_error(&mut inner)?;
        inner
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("item {}", id)))
    }

    fn count(&self) -> Result<u64, CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        take_error(&mut inner)?;
        Ok(inner.items.len() as u64)
    }
}

/// Build a seeded row for tests.
pub fn seeded_item(id: i64, url: &str, slug: &str) -> CatalogItem {
    CatalogItem {
        id,
        name: format!("Item {}", id),
        url: url.to_string(),
        description: String::new(),
        source: "scraped-github".to_string(),
        product_type: "Software".to_string(),
        external_id: None,
        image_url: None,
        image_alt: None,
        rating: None,
        rating_count: None,
        source_last_updated: None,
        metadata: None,
        slug: Some(slug.to_string()),
        scraped_at: Utc::now(),
        tags: Vec::new(),
        banned: false,
    }
}
