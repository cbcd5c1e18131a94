//! Name-keyed lookup of registered source adapters.

use std::collections::HashMap;
use std::sync::Arc;

use super::Scraper;

/// Registry of source adapters, built once at startup.
///
/// Lookup is by adapter name for triggers and by `supports_url` for
/// single-URL loads. Registration order decides `find_for_url` ties.
#[derive(Default)]
pub struct ScraperRegistry {
    scrapers: Vec<Arc<dyn Scraper>>,
    by_name: HashMap<String, usize>,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter. A later registration with the same name
    /// replaces the earlier one.
    pub fn register(&mut self, scraper: Arc<dyn Scraper>) {
        let name = scraper.name().to_string();
        match self.by_name.get(&name) {
            Some(&idx) => self.scrapers[idx] = scraper,
            None => {
                self.by_name.insert(name, self.scrapers.len());
                self.scrapers.push(scraper);
            }
        }
    }

    /// Look up an adapter by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Scraper>> {
        self.by_name.get(name).map(|&idx| self.scrapers[idx].clone())
    }

    /// First registered adapter claiming the URL, if any.
    pub fn find_for_url(&self, url: &str) -> Option<Arc<dyn Scraper>> {
        self.scrapers
            .iter()
            .find(|s| s.supports_url(url))
            .cloned()
    }

    /// Registered adapter names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.scrapers.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.scrapers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scrapers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::{ScrapeError, ScrapeMode, ScrapeResult, RawProduct};
    use async_trait::async_trait;

    struct StubScraper {
        name: &'static str,
        domain: &'static str,
    }

    #[async_trait]
    impl Scraper for StubScraper {
        fn name(&self) -> &str {
            self.name
        }

        fn supports_url(&self, url: &str) -> bool {
            url.contains(self.domain)
        }

        async fn scrape_one(&self, _url: &str) -> Result<Option<RawProduct>, ScrapeError> {
            Ok(None)
        }

        async fn scrape(&self, _mode: ScrapeMode) -> ScrapeResult {
            ScrapeResult::empty(self.name)
        }
    }

    fn registry() -> ScraperRegistry {
        let mut registry = ScraperRegistry::new();
        registry.register(Arc::new(StubScraper {
            name: "github",
            domain: "github.com",
        }));
        registry.register(Arc::new(StubScraper {
            name: "thingiverse",
            domain: "thingiverse.com",
        }));
        registry
    }

    #[test]
    fn test_get_by_name() {
        let registry = registry();
        assert!(registry.get("github").is_some());
        assert!(registry.get("nope").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_find_for_url() {
        let registry = registry();
        let scraper = registry
            .find_for_url("https://www.thingiverse.com/thing:42")
            .unwrap();
        assert_eq!(scraper.name(), "thingiverse");
        assert!(registry.find_for_url("https://example.org/x").is_none());
    }

    #[test]
    fn test_names_in_registration_order() {
        let registry = registry();
        assert_eq!(registry.names(), vec!["github", "thingiverse"]);
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut registry = registry();
        registry.register(Arc::new(StubScraper {
            name: "github",
            domain: "github.example",
        }));

        assert_eq!(registry.len(), 2);
        let scraper = registry.get("github").unwrap();
        assert!(scraper.supports_url("https://github.example/x"));
    }
}
