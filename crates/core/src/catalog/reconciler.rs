//! Create-vs-update reconciliation of raw adapter output.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use super::slug::base_slug;
use super::types::{CatalogError, CatalogUpdate, NewCatalogItem};
use super::ProductCatalog;
use crate::scraper::RawProduct;

/// How many `-2`, `-3`, ... suffixes to try before falling back to a
/// random suffix.
const SLUG_SUFFIX_BOUND: u32 = 500;

/// Domain to canonical source name. Items whose identity URL matches one of
/// these domains get the canonical name regardless of what the adapter
/// reported; unknown domains keep the adapter-provided source.
const SOURCE_DOMAINS: &[(&str, &str)] = &[
    ("github.com", "scraped-github"),
    ("www.ravelry.com", "scraped-ravelry"),
    ("ravelry.com", "scraped-ravelry"),
    ("www.thingiverse.com", "scraped-thingiverse"),
    ("thingiverse.com", "scraped-thingiverse"),
    ("abledata.acl.gov", "scraped-abledata"),
    ("web.archive.org", "scraped-abledata"),
];

/// What happened to a single raw item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A new row was inserted.
    Created(i64),
    /// An existing row (matched by identity URL) was updated.
    Updated(i64),
    /// The item was dropped, e.g. a concurrent writer won the insert race.
    Skipped,
}

/// Routes every raw item into the catalog as either a create or an update.
///
/// Identity is the item URL. Duplicate constraint violations are treated as
/// a lost race and reported as `Skipped` rather than an error; any other
/// catalog failure propagates to the caller, which accounts it per item.
pub struct Reconciler {
    catalog: Arc<dyn ProductCatalog>,
}

impl Reconciler {
    pub fn new(catalog: Arc<dyn ProductCatalog>) -> Self {
        Self { catalog }
    }

    /// Reconcile one raw item into the catalog.
    pub fn reconcile(&self, raw: &RawProduct) -> Result<ReconcileOutcome, CatalogError> {
        match self.catalog.find_by_url(&raw.url)? {
            Some(existing) => self.update_existing(existing.id, existing.slug.is_none(), raw),
            None => self.create_new(raw),
        }
    }

    fn create_new(&self, raw: &RawProduct) -> Result<ReconcileOutcome, CatalogError> {
        let slug = self.unique_slug(&base_slug(&raw.name, &raw.url))?;
        let mut item = self.to_new_item(raw, slug);

        let id = match self.catalog.insert(&item) {
            Ok(id) => id,
            Err(CatalogError::SchemaMismatch(msg)) => {
                warn!(
                    source = %raw.source,
                    error = %msg,
                    "Insert hit a schema without media columns, retrying without them"
                );
                item.image_url = None;
                item.image_alt = None;
                self.catalog.insert(&item)?
            }
            Err(CatalogError::Duplicate(msg)) => {
                warn!(
                    source = %raw.source,
                    url = %raw.url,
                    error = %msg,
                    "Skipped duplicate item"
                );
                return Ok(ReconcileOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        self.catalog.replace_tags(id, &raw.tags)?;
        debug!(source = %raw.source, id, name = %raw.name, "Created catalog item");
        Ok(ReconcileOutcome::Created(id))
    }

    fn update_existing(
        &self,
        id: i64,
        slug_absent: bool,
        raw: &RawProduct,
    ) -> Result<ReconcileOutcome, CatalogError> {
        let slug_if_absent = if slug_absent {
            Some(self.unique_slug(&base_slug(&raw.name, &raw.url))?)
        } else {
            None
        };
        let mut update = self.to_update(raw, slug_if_absent);

        match self.catalog.update(id, &update) {
            Ok(()) => {}
            Err(CatalogError::SchemaMismatch(msg)) => {
                warn!(
                    source = %raw.source,
                    error = %msg,
                    "Update hit a schema without media columns, retrying without them"
                );
                update.image_url = None;
                update.image_alt = None;
                self.catalog.update(id, &update)?;
            }
            Err(CatalogError::Duplicate(msg)) => {
                warn!(
                    source = %raw.source,
                    url = %raw.url,
                    error = %msg,
                    "Skipped update after uniqueness violation"
                );
                return Ok(ReconcileOutcome::Skipped);
            }
            Err(e) => return Err(e),
        }

        self.catalog.replace_tags(id, &raw.tags)?;
        debug!(source = %raw.source, id, name = %raw.name, "Updated catalog item");
        Ok(ReconcileOutcome::Updated(id))
    }

    /// Find a slug not yet present in the catalog: the base itself, then
    /// numeric suffixes, then a random suffix when the numeric range is
    /// exhausted.
    fn unique_slug(&self, base: &str) -> Result<String, CatalogError> {
        if !self.catalog.slug_exists(base)? {
            return Ok(base.to_string());
        }
        for i in 2..SLUG_SUFFIX_BOUND {
            let candidate = format!("{base}-{i}");
            if !self.catalog.slug_exists(&candidate)? {
                return Ok(candidate);
            }
        }
        let suffix = Uuid::new_v4().simple().to_string();
        Ok(format!("{base}-{}", &suffix[..6]))
    }

    fn to_new_item(&self, raw: &RawProduct, slug: String) -> NewCatalogItem {
        NewCatalogItem {
            name: raw.name.clone(),
            url: raw.url.clone(),
            description: raw.description.clone(),
            source: canonical_source(&raw.source, &raw.url),
            product_type: raw.kind.as_str().to_string(),
            external_id: raw.external_id.clone(),
            image_url: raw.image_url.clone(),
            image_alt: raw.image_alt.clone(),
            rating: raw.rating,
            rating_count: raw.rating_count,
            source_last_updated: raw.source_last_updated,
            metadata: raw.metadata.clone(),
            slug,
            scraped_at: chrono::Utc::now(),
            banned: raw.banned,
        }
    }

    fn to_update(&self, raw: &RawProduct, slug_if_absent: Option<String>) -> CatalogUpdate {
        CatalogUpdate {
            name: raw.name.clone(),
            description: raw.description.clone(),
            product_type: raw.kind.as_str().to_string(),
            image_url: raw.image_url.clone(),
            image_alt: raw.image_alt.clone(),
            rating: raw.rating,
            rating_count: raw.rating_count,
            source_last_updated: raw.source_last_updated,
            metadata: raw.metadata.clone(),
            slug_if_absent,
            banned: raw.banned,
        }
    }
}

/// Canonical source name for an identity URL, falling back to the
/// adapter-provided name when the domain is unrecognized.
fn canonical_source(reported: &str, url: &str) -> String {
    let host = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()));

    if let Some(host) = host {
        for (domain, name) in SOURCE_DOMAINS {
            if host == *domain {
                return (*name).to_string();
            }
        }
    }
    reported.to_string()
}
