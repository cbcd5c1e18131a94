//! Mock scraper for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::scraper::{RawProduct, ScrapeError, ScrapeMode, ScrapeResult, Scraper};

/// Mock implementation of the Scraper trait.
///
/// Provides controllable behavior for testing:
/// - Return a configured `ScrapeResult` from `scrape`
/// - Serve canned items for `scrape_one` by URL
/// - Track invocations for assertions
/// - Simulate failures and slow runs
///
/// # Example
///
/// ```rust,ignore
/// use magpie_core::testing::MockScraper;
///
/// let scraper = MockScraper::new("github", "github.com");
/// scraper.set_result(result).await;
///
/// let outcome = scraper.scrape(ScrapeMode::full()).await;
/// assert_eq!(scraper.scrape_count().await, 1);
/// ```
pub struct MockScraper {
    name: String,
    url_fragment: String,
    /// Result returned from `scrape`.
    result: Arc<RwLock<ScrapeResult>>,
    /// Recorded modes passed to `scrape`.
    scrapes: Arc<RwLock<Vec<ScrapeMode>>>,
    /// Recorded URLs passed to `scrape_one`.
    lookups: Arc<RwLock<Vec<String>>>,
    /// Canned items served by `scrape_one`, keyed by URL.
    items: Arc<RwLock<HashMap<String, RawProduct>>>,
    /// If set, the next `scrape_one` fails with this error.
    next_error: Arc<RwLock<Option<ScrapeError>>>,
    /// Artificial delay applied to `scrape`, for lock-contention tests.
    delay: Arc<RwLock<Option<std::time::Duration>>>,
}

impl std::fmt::Debug for MockScraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockScraper")
            .field("name", &self.name)
            .field("url_fragment", &self.url_fragment)
            .finish()
    }
}

impl MockScraper {
    /// Create a mock that claims URLs containing `url_fragment`.
    pub fn new(name: &str, url_fragment: &str) -> Self {
        Self {
            name: name.to_string(),
            url_fragment: url_fragment.to_string(),
            result: Arc::new(RwLock::new(ScrapeResult::empty(name))),
            scrapes: Arc::new(RwLock::new(Vec::new())),
            lookups: Arc::new(RwLock::new(Vec::new())),
            items: Arc::new(RwLock::new(HashMap::new())),
            next_error: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(None)),
        }
    }

    /// Set the result returned by subsequent `scrape` calls.
    pub async fn set_result(&self, result: ScrapeResult) {
        *self.result.write().await = result;
    }

    /// Serve `item` from `scrape_one` for its URL.
    pub async fn add_item(&self, item: RawProduct) {
        self.items.write().await.insert(item.url.clone(), item);
    }

    /// Configure the next `scrape_one` to fail with the given error.
    pub async fn set_next_error(&self, error: ScrapeError) {
        *self.next_error.write().await = Some(error);
    }

    /// Delay every `scrape` call, keeping the run lock held.
    pub async fn set_delay(&self, delay: std::time::Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Modes recorded from `scrape` calls.
    pub async fn recorded_scrapes(&self) -> Vec<ScrapeMode> {
        self.scrapes.read().await.clone()
    }

    /// Number of `scrape` calls performed.
    pub async fn scrape_count(&self) -> usize {
        self.scrapes.read().await.len()
    }

    /// URLs recorded from `scrape_one` calls.
    pub async fn recorded_lookups(&self) -> Vec<String> {
        self.lookups.read().await.clone()
    }
}

#[async_trait]
impl Scraper for MockScraper {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_url(&self, url: &str) -> bool {
        url.contains(&self.url_fragment)
    }

    async fn scrape_one(&self, url: &str) -> Result<Option<RawProduct>, ScrapeError> {
        self.lookups.write().await.push(url.to_string());

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        Ok(self.items.read().await.get(url).cloned())
    }

    async fn scrape(&self, mode: ScrapeMode) -> ScrapeResult {
        self.scrapes.write().await.push(mode);

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.result.read().await.clone()
    }
}
