//! Thingiverse search adapter.
//!
//! Runs one search page per configured term, fetches full thing details
//! per hit and reconciles them into the catalog. Things rarely carry
//! rating data, so likes and favorites stand in as a popularity score.
//! All requests run through an `AuthSession` with refresh-and-retry-once.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::Reconciler;
use crate::credentials::{AuthSession, CredentialStore, TokenEndpoint};
use crate::metrics;
use crate::terms::TermStore;

use super::pagination::PageDriver;
use super::throttle::Throttle;
use super::types::{
    ProductKind, RawProduct, RunTally, ScrapeError, ScrapeMode, ScrapeResult, Scraper,
};

/// Key under which the search terms for this adapter live in the term store.
pub const THINGIVERSE_TERMS_KEY: &str = "thingiverse";

/// Fallback terms used when the term store has no row for the platform.
const DEFAULT_SEARCH_TERMS: &[&str] = &[
    "accessibility",
    "assistive device",
    "arthritis grip",
    "adaptive tool",
    "mobility aid",
    "tremor stabilizer",
    "adaptive utensil",
];

/// File extensions accepted for preview images. Things also expose model
/// assets (.stl and friends) through the same fields.
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".svg"];

static THING_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"thing:(\d+)").unwrap());

fn default_api_base() -> String {
    "https://api.thingiverse.com".to_string()
}

fn default_requests_per_minute() -> u32 {
    5
}

fn default_results_per_page() -> u32 {
    20
}

fn default_timeout_secs() -> u64 {
    10
}

/// Configuration for the Thingiverse adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThingiverseConfig {
    /// API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Request budget per minute. 0 disables throttling.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Search results requested per term.
    #[serde(default = "default_results_per_page")]
    pub results_per_page: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ThingiverseConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            requests_per_minute: default_requests_per_minute(),
            results_per_page: default_results_per_page(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<ThingHit>,
}

#[derive(Debug, Deserialize)]
struct ThingHit {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Thing {
    id: u64,
    name: String,
    #[serde(default)]
    public_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    rating_count: Option<u32>,
    #[serde(default)]
    like_count: u32,
    #[serde(default)]
    favorite_count: u32,
    #[serde(default)]
    default_image: Option<ThingImage>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    images: Vec<ThingImage>,
    #[serde(default)]
    tags: Vec<ThingTag>,
    #[serde(default)]
    categories: Vec<ThingCategory>,
}

#[derive(Debug, Default, Deserialize)]
struct ThingImage {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    sizes: Vec<ImageSize>,
}

#[derive(Debug, Deserialize)]
struct ImageSize {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThingTag {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThingCategory {
    #[serde(default)]
    name: Option<String>,
}

/// Scrapes Thingiverse search results into the catalog.
pub struct ThingiverseScraper {
    config: ThingiverseConfig,
    client: Client,
    session: AuthSession,
    throttle: Throttle,
    reconciler: Arc<Reconciler>,
    terms: Arc<dyn TermStore>,
}

impl ThingiverseScraper {
    pub fn new(
        config: ThingiverseConfig,
        reconciler: Arc<Reconciler>,
        terms: Arc<dyn TermStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");
        let session = AuthSession::new(
            "thingiverse",
            TokenEndpoint::thingiverse(),
            credentials,
            client.clone(),
        );
        let throttle = Throttle::new(config.requests_per_minute);
        Self {
            config,
            client,
            session,
            throttle,
            reconciler,
            terms,
        }
    }

    fn search_terms(&self) -> Vec<String> {
        match self.terms.get(THINGIVERSE_TERMS_KEY) {
            Ok(Some(terms)) if !terms.is_empty() => terms,
            Ok(_) => {
                debug!("No stored search terms for thingiverse, using defaults");
                DEFAULT_SEARCH_TERMS.iter().map(|t| t.to_string()).collect()
            }
            Err(e) => {
                warn!(error = %e, "Failed to load thingiverse search terms, using defaults");
                DEFAULT_SEARCH_TERMS.iter().map(|t| t.to_string()).collect()
            }
        }
    }

    async fn run(&self, mode: ScrapeMode, tally: &mut RunTally) -> Result<(), ScrapeError> {
        let terms = self.search_terms();
        // The search endpoint ranks by relevance; one page per term is
        // already the useful tail.
        let mut driver = PageDriver::new(1, mode.quota());

        for term in &terms {
            if driver.exhausted() {
                break;
            }

            let hits = driver
                .run(|_page| async move {
                    match self.search_things(term).await {
                        Ok(hits) => Ok((hits, false)),
                        Err(e) if is_fatal(&e) => Err(e),
                        Err(e) => {
                            warn!(term = %term, error = %e, "Thingiverse search failed");
                            Ok((Vec::new(), false))
                        }
                    }
                })
                .await?;

            for hit in hits {
                tally.found += 1;
                let thing = match self.fetch_thing(hit.id).await {
                    Ok(Some(thing)) => thing,
                    Ok(None) => {
                        warn!(id = hit.id, "Thing detail not found, skipping");
                        continue;
                    }
                    Err(e) if is_fatal(&e) => return Err(e),
                    Err(e) => {
                        warn!(id = hit.id, error = %e, "Failed to fetch thing detail");
                        continue;
                    }
                };

                let product = self.to_raw_product(&thing);
                match self.reconciler.reconcile(&product) {
                    Ok(outcome) => tally.record("thingiverse", &outcome),
                    Err(e) => {
                        warn!(url = %product.url, error = %e, "Failed to reconcile thing")
                    }
                }
            }
        }

        Ok(())
    }

    async fn search_things(&self, term: &str) -> Result<Vec<ThingHit>, ScrapeError> {
        self.throttle.throttle().await;

        let url = format!(
            "{}/search/{}?type=things&per_page={}&page=1&sort=relevant",
            self.config.api_base,
            urlencoding::encode(term),
            self.config.results_per_page,
        );

        let started = Instant::now();
        let response = match self
            .session
            .execute(|token| {
                self.client
                    .get(&url)
                    .bearer_auth(token)
                    .header("Accept", "application/json")
            })
            .await
        {
            Ok(response) => response,
            Err(e) => {
                metrics::SOURCE_REQUESTS
                    .with_label_values(&["thingiverse", "error"])
                    .inc();
                return Err(e);
            }
        };
        metrics::SOURCE_REQUEST_DURATION
            .with_label_values(&["thingiverse"])
            .observe(started.elapsed().as_secs_f64());

        if !response.status().is_success() {
            metrics::SOURCE_REQUESTS
                .with_label_values(&["thingiverse", "error"])
                .inc();
            return Err(ScrapeError::ApiError(format!(
                "Thingiverse search returned {}",
                response.status()
            )));
        }
        metrics::SOURCE_REQUESTS
            .with_label_values(&["thingiverse", "success"])
            .inc();

        let data: SearchResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::ParseError(e.to_string()))?;
        if data.hits.is_empty() {
            debug!(term = %term, "Empty search results");
        }
        Ok(data.hits)
    }

    async fn fetch_thing(&self, id: u64) -> Result<Option<Thing>, ScrapeError> {
        self.throttle.throttle().await;

        let url = format!("{}/things/{}", self.config.api_base, id);
        let response = self
            .session
            .execute(|token| self.client.get(&url).bearer_auth(token))
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ScrapeError::ApiError(format!(
                "Thingiverse thing lookup returned {}",
                response.status()
            )));
        }

        let data: Thing = response
            .json()
            .await
            .map_err(|e| ScrapeError::ParseError(e.to_string()))?;
        Ok(Some(data))
    }

    fn to_raw_product(&self, thing: &Thing) -> RawProduct {
        let url = thing
            .public_url
            .clone()
            .unwrap_or_else(|| format!("https://www.thingiverse.com/thing:{}", thing.id));

        let mut tags = Vec::new();
        for tag in &thing.tags {
            if let Some(name) = tag.name.as_deref().or(tag.tag.as_deref()) {
                if !name.is_empty() && !tags.iter().any(|t| t == name) {
                    tags.push(name.to_string());
                }
            }
        }

        let (rating, rating_count) = effective_rating(thing);
        let categories: Vec<Option<String>> =
            thing.categories.iter().map(|c| c.name.clone()).collect();

        RawProduct {
            name: thing.name.clone(),
            url,
            description: thing.description.clone().unwrap_or_default(),
            source: "scraped-thingiverse".to_string(),
            kind: ProductKind::Fabrication,
            external_id: Some(thing.id.to_string()),
            image_url: preview_image(thing),
            image_alt: Some(thing.name.clone()),
            rating,
            rating_count,
            source_last_updated: None,
            metadata: Some(serde_json::json!({
                "rating": rating,
                "rating_count": rating_count,
                "stars": rating_count.unwrap_or(0),
                "likes": thing.like_count,
                "favorites": thing.favorite_count,
                "categories": categories,
            })),
            tags,
            banned: false,
        }
    }
}

fn is_fatal(e: &ScrapeError) -> bool {
    matches!(
        e,
        ScrapeError::Unauthorized(_) | ScrapeError::MissingCredential(_)
    )
}

/// Platform rating when present, otherwise a popularity score derived
/// from likes and favorites.
fn effective_rating(thing: &Thing) -> (Option<f64>, Option<u32>) {
    if let Some(count) = thing.rating_count.filter(|c| *c > 0) {
        return (thing.rating, Some(count));
    }

    let popularity = thing.like_count.max(thing.favorite_count);
    let rating = match popularity {
        50.. => Some(5.0),
        20..=49 => Some(4.0),
        5..=19 => Some(3.0),
        1..=4 => Some(2.0),
        0 => None,
    };
    (rating, (popularity > 0).then_some(popularity))
}

fn is_image_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Pick a preview image, skipping model assets that share the same fields.
/// The sizes array is ordered small to large, so it is walked backwards.
fn preview_image(thing: &Thing) -> Option<String> {
    if let Some(url) = thing.default_image.as_ref().and_then(|i| i.url.as_deref()) {
        if is_image_url(url) {
            return Some(url.to_string());
        }
    }
    if let Some(thumbnail) = thing.thumbnail.as_deref() {
        if is_image_url(thumbnail) {
            return Some(thumbnail.to_string());
        }
    }
    for image in &thing.images {
        for size in image.sizes.iter().rev() {
            if let Some(url) = size.url.as_deref() {
                if is_image_url(url) {
                    return Some(url.to_string());
                }
            }
        }
    }
    None
}

fn parse_thing_id(url: &str) -> Option<u64> {
    THING_ID_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[async_trait]
impl Scraper for ThingiverseScraper {
    fn name(&self) -> &str {
        "thingiverse"
    }

    fn supports_url(&self, url: &str) -> bool {
        url.to_lowercase().contains("thingiverse.com")
    }

    async fn scrape_one(&self, url: &str) -> Result<Option<RawProduct>, ScrapeError> {
        let Some(id) = parse_thing_id(url) else {
            return Ok(None);
        };
        match self.fetch_thing(id).await? {
            Some(thing) => Ok(Some(self.to_raw_product(&thing))),
            None => Ok(None),
        }
    }

    async fn scrape(&self, mode: ScrapeMode) -> ScrapeResult {
        let started = Instant::now();
        info!(quota = ?mode.quota(), "Starting Thingiverse scrape");

        let mut tally = RunTally::default();
        let error = match self.run(mode, &mut tally).await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "Thingiverse scrape failed");
                Some(e.to_string())
            }
        };

        let result = tally.into_result("thingiverse", started, error);
        info!(
            found = result.found,
            added = result.added,
            updated = result.updated,
            status = ?result.status,
            "Thingiverse scrape finished"
        );
        result
    }
}
