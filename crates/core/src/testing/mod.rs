//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides mock implementations of the engine's trait seams,
//! allowing comprehensive testing without real platforms or a database.
//!
//! # Example
//!
//! ```rust,ignore
//! use magpie_core::testing::{MockCatalog, MockCredentialStore, MockScraper};
//!
//! let scraper = MockScraper::new("github", "github.com");
//! let catalog = MockCatalog::new();
//! let credentials = MockCredentialStore::new();
//!
//! // Configure mock responses
//! scraper.set_result(result).await;
//! credentials.seed("ravelry", "token", "refresh");
//!
//! // Use in AppState...
//! ```

mod mock_catalog;
mod mock_credentials;
mod mock_scraper;

pub use mock_catalog::{seeded_item, MockCatalog};
pub use mock_credentials::{MockCredentialStore, RecordedRefresh};
pub use mock_scraper::MockScraper;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;

    use crate::catalog::NewCatalogItem;
    use crate::scraper::{ProductKind, RawProduct};

    /// Create a raw product with reasonable defaults.
    pub fn raw_product(name: &str, url: &str) -> RawProduct {
        RawProduct {
            name: name.to_string(),
            url: url.to_string(),
            description: format!("{} description", name),
            source: "scraped-github".to_string(),
            kind: ProductKind::Software,
            external_id: None,
            image_url: None,
            image_alt: None,
            rating: None,
            rating_count: None,
            source_last_updated: None,
            metadata: None,
            tags: Vec::new(),
            banned: false,
        }
    }

    /// Create a raw knitting pattern with rating and tags.
    pub fn pattern_product(name: &str, url: &str) -> RawProduct {
        let mut product = raw_product(name, url);
        product.source = "scraped-ravelry".to_string();
        product.kind = ProductKind::Knitting;
        product.rating = Some(4.5);
        product.rating_count = Some(40);
        product.tags = vec!["Hat".to_string(), "Cables".to_string()];
        product
    }

    /// Create insert-ready catalog fields.
    pub fn new_catalog_item(name: &str, url: &str, slug: &str) -> NewCatalogItem {
        NewCatalogItem {
            name: name.to_string(),
            url: url.to_string(),
            description: format!("{} description", name),
            source: "scraped-github".to_string(),
            product_type: "Software".to_string(),
            external_id: None,
            image_url: None,
            image_alt: None,
            rating: None,
            rating_count: None,
            source_last_updated: None,
            metadata: None,
            slug: slug.to_string(),
            scraped_at: Utc::now(),
            banned: false,
        }
    }
}
