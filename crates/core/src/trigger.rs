//! On-demand scrape triggering.
//!
//! The `TriggerService` is the single entry point for starting runs, whether
//! from the HTTP surface or the scheduler. It enforces one run per source at
//! a time, records every finished run through the run log and keeps the
//! metrics counters moving.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::catalog::{CatalogError, CatalogItem, ProductCatalog, ReconcileOutcome, Reconciler};
use crate::metrics;
use crate::runlog::RunLogHandle;
use crate::scraper::{ScrapeError, ScrapeMode, ScraperRegistry};

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("A scrape for {0} is already running")]
    AlreadyRunning(String),

    #[error("No adapter supports URL: {0}")]
    UnsupportedUrl(String),

    #[error("No item found at URL: {0}")]
    NotFound(String),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// How a single-URL load was satisfied.
#[derive(Debug)]
pub enum LoadOutcome {
    /// The catalog already had the item; no scrape happened.
    Existing(CatalogItem),
    /// The item was fetched and inserted.
    Created(CatalogItem),
    /// The item was fetched and an existing row was refreshed.
    Updated(CatalogItem),
}

impl LoadOutcome {
    pub fn item(&self) -> &CatalogItem {
        match self {
            LoadOutcome::Existing(item) => item,
            LoadOutcome::Created(item) => item,
            LoadOutcome::Updated(item) => item,
        }
    }
}

/// Starts scrape runs and single-URL loads.
///
/// Each source has one lock; a trigger while the lock is held is rejected,
/// never queued. Runs execute on detached tasks so callers get an immediate
/// accepted/rejected answer.
pub struct TriggerService {
    registry: Arc<ScraperRegistry>,
    catalog: Arc<dyn ProductCatalog>,
    reconciler: Reconciler,
    run_log: RunLogHandle,
    locks: HashMap<String, Arc<Mutex<()>>>,
}

impl TriggerService {
    pub fn new(
        registry: Arc<ScraperRegistry>,
        catalog: Arc<dyn ProductCatalog>,
        run_log: RunLogHandle,
    ) -> Self {
        let locks = registry
            .names()
            .into_iter()
            .map(|name| (name, Arc::new(Mutex::new(()))))
            .collect();
        Self {
            registry,
            catalog: Arc::clone(&catalog),
            reconciler: Reconciler::new(catalog),
            run_log,
            locks,
        }
    }

    /// Start a scrape run for `source` on a background task.
    ///
    /// Returns as soon as the run is accepted. The result is recorded via
    /// the run log when the run finishes.
    pub fn trigger(
        &self,
        source: &str,
        mode: ScrapeMode,
        actor: Option<&str>,
    ) -> Result<(), TriggerError> {
        let scraper = self
            .registry
            .get(source)
            .ok_or_else(|| TriggerError::UnknownSource(source.to_string()))?;

        let lock = self
            .locks
            .get(source)
            .ok_or_else(|| TriggerError::UnknownSource(source.to_string()))?;
        let guard = match Arc::clone(lock).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                metrics::SCRAPE_RUNS_REJECTED
                    .with_label_values(&[source])
                    .inc();
                warn!(source, "Rejected trigger, a run is already in progress");
                return Err(TriggerError::AlreadyRunning(source.to_string()));
            }
        };

        metrics::SCRAPE_RUNS_STARTED
            .with_label_values(&[source])
            .inc();
        info!(source, test_mode = mode.test_mode, "Starting scrape run");

        let run_log = self.run_log.clone();
        let actor = actor.map(|a| a.to_string());
        tokio::spawn(async move {
            let result = scraper.scrape(mode).await;

            metrics::SCRAPE_RUN_DURATION
                .with_label_values(&[&result.source])
                .observe(result.duration_ms as f64 / 1000.0);
            metrics::SCRAPE_RUNS_COMPLETED
                .with_label_values(&[&result.source, result.status.as_str()])
                .inc();
            metrics::ITEMS_FOUND
                .with_label_values(&[&result.source])
                .inc_by(result.found as u64);
            metrics::ITEMS_ADDED
                .with_label_values(&[&result.source])
                .inc_by(result.added as u64);
            metrics::ITEMS_UPDATED
                .with_label_values(&[&result.source])
                .inc_by(result.updated as u64);

            info!(
                source = %result.source,
                status = result.status.as_str(),
                found = result.found,
                added = result.added,
                updated = result.updated,
                duration_ms = result.duration_ms,
                "Scrape run finished"
            );

            run_log.record(result, actor.as_deref()).await;
            drop(guard);
        });

        Ok(())
    }

    /// Whether a run for `source` is currently in progress.
    pub fn is_running(&self, source: &str) -> bool {
        self.locks
            .get(source)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Load a single item by its external URL.
    ///
    /// The catalog is checked first; an existing row short-circuits the
    /// scrape entirely. Otherwise the first adapter claiming the URL fetches
    /// the item and the reconciler routes it into the catalog.
    pub async fn load_url(&self, url: &str) -> Result<LoadOutcome, TriggerError> {
        metrics::URL_LOADS.inc();

        if let Some(existing) = self.catalog.find_by_url(url)? {
            info!(url, id = existing.id, "URL already in catalog");
            return Ok(LoadOutcome::Existing(existing));
        }

        let scraper = self
            .registry
            .find_for_url(url)
            .ok_or_else(|| TriggerError::UnsupportedUrl(url.to_string()))?;

        info!(url, source = scraper.name(), "Loading single item by URL");
        let raw = scraper
            .scrape_one(url)
            .await?
            .ok_or_else(|| TriggerError::NotFound(url.to_string()))?;

        match self.reconciler.reconcile(&raw)? {
            ReconcileOutcome::Created(id) => Ok(LoadOutcome::Created(self.catalog.get(id)?)),
            ReconcileOutcome::Updated(id) => Ok(LoadOutcome::Updated(self.catalog.get(id)?)),
            ReconcileOutcome::Skipped => {
                // A concurrent writer inserted the same URL first.
                match self.catalog.find_by_url(url)? {
                    Some(existing) => Ok(LoadOutcome::Existing(existing)),
                    None => Err(TriggerError::NotFound(url.to_string())),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::{mpsc, Notify};

    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::runlog::RunLogEntry;
    use crate::scraper::{ProductKind, RawProduct, ScrapeResult, Scraper};

    struct StubScraper {
        name: &'static str,
        domain: &'static str,
        release: Option<Arc<Notify>>,
        scrape_one_calls: AtomicUsize,
        product: Option<RawProduct>,
    }

    impl StubScraper {
        fn new(name: &'static str, domain: &'static str) -> Self {
            Self {
                name,
                domain,
                release: None,
                scrape_one_calls: AtomicUsize::new(0),
                product: None,
            }
        }

        fn gated(name: &'static str, domain: &'static str, release: Arc<Notify>) -> Self {
            Self {
                release: Some(release),
                ..Self::new(name, domain)
            }
        }

        fn with_product(name: &'static str, domain: &'static str, product: RawProduct) -> Self {
            Self {
                product: Some(product),
                ..Self::new(name, domain)
            }
        }
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
            self.scrape_one_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.product.clone())
        }

        async fn scrape(&self, _mode: ScrapeMode) -> ScrapeResult {
            if let Some(release) = &self.release {
                release.notified().await;
            }
            let mut result = ScrapeResult::empty(self.name);
            result.found = 7;
            result.added = 3;
            result.updated = 2;
            result
        }
    }

    fn raw(name: &str, url: &str) -> RawProduct {
        RawProduct {
            name: name.to_string(),
            url: url.to_string(),
            description: String::new(),
            source: "scraped-github".to_string(),
            kind: ProductKind::Software,
            external_id: None,
            image_url: None,
            image_alt: None,
            rating: None,
            rating_count: None,
            source_last_updated: None,
            metadata: None,
            tags: vec![],
            banned: false,
        }
    }

    fn service_with(
        scrapers: Vec<Arc<dyn Scraper>>,
    ) -> (TriggerService, mpsc::Receiver<RunLogEntry>) {
        let mut registry = ScraperRegistry::new();
        for scraper in scrapers {
            registry.register(scraper);
        }
        let catalog: Arc<dyn ProductCatalog> = Arc::new(SqliteCatalog::in_memory().unwrap());
        let (tx, rx) = mpsc::channel(16);
        let run_log = RunLogHandle::new(tx, Some("system".to_string()));
        (
            TriggerService::new(Arc::new(registry), catalog, run_log),
            rx,
        )
    }

    #[tokio::test]
    async fn test_trigger_unknown_source() {
        let (service, _rx) = service_with(vec![]);
        let err = service
            .trigger("nope", ScrapeMode::full(), None)
            .unwrap_err();
        assert!(matches!(err, TriggerError::UnknownSource(_)));
    }

    #[tokio::test]
    async fn test_trigger_records_run() {
        let scraper = Arc::new(StubScraper::new("github", "github.com"));
        let (service, mut rx) = service_with(vec![scraper]);

        service
            .trigger("github", ScrapeMode::full(), Some("admin-1"))
            .unwrap();

        let entry = rx.recv().await.expect("Should receive run entry");
        assert_eq!(entry.result.source, "github");
        assert_eq!(entry.result.found, 7);
        assert_eq!(entry.actor, "admin-1");
    }

    #[tokio::test]
    async fn test_trigger_rejects_concurrent_run() {
        let release = Arc::new(Notify::new());
        let scraper = Arc::new(StubScraper::gated("github", "github.com", release.clone()));
        let (service, mut rx) = service_with(vec![scraper]);

        service.trigger("github", ScrapeMode::full(), None).unwrap();
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        assert!(service.is_running("github"));

        let err = service
            .trigger("github", ScrapeMode::full(), None)
            .unwrap_err();
        assert!(matches!(err, TriggerError::AlreadyRunning(_)));

        release.notify_one();
        let entry = rx.recv().await.expect("Should receive run entry");
        assert_eq!(entry.result.source, "github");
    }

    #[tokio::test]
    async fn test_lock_released_after_run() {
        let scraper = Arc::new(StubScraper::new("github", "github.com"));
        let (service, mut rx) = service_with(vec![scraper]);

        service.trigger("github", ScrapeMode::full(), None).unwrap();
        rx.recv().await.expect("Should receive run entry");
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;

        assert!(!service.is_running("github"));
        service.trigger("github", ScrapeMode::full(), None).unwrap();
    }

    #[tokio::test]
    async fn test_sources_run_independently() {
        let release = Arc::new(Notify::new());
        let github = Arc::new(StubScraper::gated("github", "github.com", release.clone()));
        let ravelry = Arc::new(StubScraper::new("ravelry", "ravelry.com"));
        let (service, mut rx) = service_with(vec![github, ravelry]);

        service.trigger("github", ScrapeMode::full(), None).unwrap();
        service.trigger("ravelry", ScrapeMode::full(), None).unwrap();

        let entry = rx.recv().await.expect("Should receive run entry");
        assert_eq!(entry.result.source, "ravelry");
        release.notify_one();
    }

    #[tokio::test]
    async fn test_load_url_unsupported() {
        let scraper = Arc::new(StubScraper::new("github", "github.com"));
        let (service, _rx) = service_with(vec![scraper]);

        let err = service
            .load_url("https://example.org/thing")
            .await
            .unwrap_err();
        assert!(matches!(err, TriggerError::UnsupportedUrl(_)));
    }

    #[tokio::test]
    async fn test_load_url_not_found() {
        let scraper = Arc::new(StubScraper::new("github", "github.com"));
        let (service, _rx) = service_with(vec![scraper]);

        let err = service
            .load_url("https://github.com/missing/repo")
            .await
            .unwrap_err();
        assert!(matches!(err, TriggerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_load_url_creates_item() {
        let url = "https://github.com/octocat/hello";
        let scraper = Arc::new(StubScraper::with_product(
            "github",
            "github.com",
            raw("Hello", url),
        ));
        let (service, _rx) = service_with(vec![scraper]);

        let outcome = service.load_url(url).await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Created(_)));
        assert_eq!(outcome.item().url, url);
    }

    #[tokio::test]
    async fn test_load_url_existing_skips_scrape() {
        let url = "https://github.com/octocat/hello";
        let scraper = Arc::new(StubScraper::with_product(
            "github",
            "github.com",
            raw("Hello", url),
        ));
        let (service, _rx) = service_with(vec![scraper.clone()]);

        let first = service.load_url(url).await.unwrap();
        assert!(!matches!(first, LoadOutcome::Existing(_)));

        let second = service.load_url(url).await.unwrap();
        assert!(matches!(second, LoadOutcome::Existing(_)));
        assert_eq!(scraper.scrape_one_calls.load(Ordering::SeqCst), 1);
    }
}
