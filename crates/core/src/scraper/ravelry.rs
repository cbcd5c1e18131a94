//! Ravelry pattern search adapter.
//!
//! Walks the configured personal-attribute categories through the pattern
//! search endpoint, fetches full details per hit and reconciles them into
//! the catalog. All requests run through an `AuthSession`, so a stale
//! access token is refreshed once mid-run without failing the run.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
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

/// Key under which the category list for this adapter lives in the term store.
pub const RAVELRY_TERMS_KEY: &str = "ravelry_pa_categories";

/// Fallback personal-attribute categories when the term store has no row.
const DEFAULT_PA_CATEGORIES: &[&str] = &[
    "medical-device-access",
    "medical-device-accessory",
    "mobility-aid-accessor",
    "other-accessibility",
    "therapy-aid",
];

static PERMALINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/patterns/library/([a-z0-9-]+)").unwrap());

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

fn default_api_base() -> String {
    "https://api.ravelry.com".to_string()
}

fn default_requests_per_minute() -> u32 {
    5
}

fn default_page_size() -> u32 {
    50
}

fn default_max_pages_per_category() -> u32 {
    10
}

fn default_timeout_secs() -> u64 {
    10
}

/// Configuration for the Ravelry adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RavelryConfig {
    /// API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Request budget per minute. 0 disables throttling.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Search results requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Page cap per category.
    #[serde(default = "default_max_pages_per_category")]
    pub max_pages_per_category: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RavelryConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            requests_per_minute: default_requests_per_minute(),
            page_size: default_page_size(),
            max_pages_per_category: default_max_pages_per_category(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    patterns: Vec<PatternHit>,
}

#[derive(Debug, Deserialize)]
struct PatternHit {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    #[serde(default)]
    pattern: Option<Pattern>,
    #[serde(default)]
    patterns: Vec<Pattern>,
}

impl DetailResponse {
    fn into_pattern(self) -> Option<Pattern> {
        self.pattern.or_else(|| self.patterns.into_iter().next())
    }
}

#[derive(Debug, Deserialize)]
struct Pattern {
    id: u64,
    name: String,
    permalink: String,
    #[serde(default)]
    notes_html: Option<String>,
    #[serde(default)]
    rating_average: Option<f64>,
    #[serde(default)]
    rating_count: Option<u32>,
    #[serde(default)]
    free: Option<bool>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    yardage: Option<f64>,
    #[serde(default)]
    needle_sizes: Option<serde_json::Value>,
    #[serde(default)]
    craft: Option<Named>,
    #[serde(default)]
    pattern_type: Option<Named>,
    #[serde(default)]
    pattern_categories: Vec<Named>,
    #[serde(default)]
    personal_attributes: Vec<Named>,
    #[serde(default)]
    designer: Option<Named>,
    #[serde(default)]
    first_photo: Option<Photo>,
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Photo {
    #[serde(default)]
    medium2_url: Option<String>,
    #[serde(default)]
    medium_url: Option<String>,
    #[serde(default)]
    square_url: Option<String>,
}

impl Photo {
    fn best_url(&self) -> Option<String> {
        self.medium2_url
            .clone()
            .or_else(|| self.medium_url.clone())
            .or_else(|| self.square_url.clone())
    }
}

/// Scrapes Ravelry pattern search results into the catalog.
pub struct RavelryScraper {
    config: RavelryConfig,
    client: Client,
    session: AuthSession,
    throttle: Throttle,
    reconciler: Arc<Reconciler>,
    terms: Arc<dyn TermStore>,
}

impl RavelryScraper {
    pub fn new(
        config: RavelryConfig,
        reconciler: Arc<Reconciler>,
        terms: Arc<dyn TermStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");
        let session = AuthSession::new(
            "ravelry",
            TokenEndpoint::ravelry(),
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

    fn categories(&self) -> Vec<String> {
        match self.terms.get(RAVELRY_TERMS_KEY) {
            Ok(Some(terms)) if !terms.is_empty() => terms,
            Ok(_) => {
                debug!("No stored categories for ravelry, using defaults");
                DEFAULT_PA_CATEGORIES.iter().map(|t| t.to_string()).collect()
            }
            Err(e) => {
                warn!(error = %e, "Failed to load ravelry categories, using defaults");
                DEFAULT_PA_CATEGORIES.iter().map(|t| t.to_string()).collect()
            }
        }
    }

    async fn run(&self, mode: ScrapeMode, tally: &mut RunTally) -> Result<(), ScrapeError> {
        let categories = self.categories();
        let mut driver = PageDriver::new(self.config.max_pages_per_category, mode.quota());

        for category in &categories {
            if driver.exhausted() {
                break;
            }

            let hits = driver
                .run(|page| async move {
                    match self.fetch_search_page(category, page).await {
                        Ok(hits) => Ok((hits, true)),
                        Err(e) if is_fatal(&e) => Err(e),
                        Err(e) => {
                            warn!(category = %category, page, error = %e, "Ravelry search page failed");
                            Ok((Vec::new(), false))
                        }
                    }
                })
                .await?;

            for hit in hits {
                tally.found += 1;
                let pattern = match self.fetch_pattern(&hit.id.to_string()).await {
                    Ok(Some(pattern)) => pattern,
                    Ok(None) => {
                        warn!(id = hit.id, "Pattern detail not found, skipping");
                        continue;
                    }
                    Err(e) if is_fatal(&e) => return Err(e),
                    Err(e) => {
                        warn!(id = hit.id, error = %e, "Failed to fetch pattern detail");
                        continue;
                    }
                };

                let product = self.to_raw_product(&pattern);
                match self.reconciler.reconcile(&product) {
                    Ok(outcome) => tally.record("ravelry", &outcome),
                    Err(e) => {
                        warn!(url = %product.url, error = %e, "Failed to reconcile pattern")
                    }
                }
            }
        }

        Ok(())
    }

    async fn fetch_search_page(
        &self,
        category: &str,
        page: u32,
    ) -> Result<Vec<PatternHit>, ScrapeError> {
        self.throttle.throttle().await;

        let url = format!(
            "{}/patterns/search.json?pa={}&page_size={}&page={}&sort=best",
            self.config.api_base,
            urlencoding::encode(category),
            self.config.page_size,
            page,
        );

        let started = Instant::now();
        let response = match self
            .session
            .execute(|token| self.client.get(&url).bearer_auth(token))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                metrics::SOURCE_REQUESTS
                    .with_label_values(&["ravelry", "error"])
                    .inc();
                return Err(e);
            }
        };
        metrics::SOURCE_REQUEST_DURATION
            .with_label_values(&["ravelry"])
            .observe(started.elapsed().as_secs_f64());

        if !response.status().is_success() {
            metrics::SOURCE_REQUESTS
                .with_label_values(&["ravelry", "error"])
                .inc();
            return Err(ScrapeError::ApiError(format!(
                "Ravelry search returned {}",
                response.status()
            )));
        }
        metrics::SOURCE_REQUESTS
            .with_label_values(&["ravelry", "success"])
            .inc();

        let data: SearchResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::ParseError(e.to_string()))?;
        Ok(data.patterns)
    }

    /// Fetch one pattern by numeric id or permalink.
    async fn fetch_pattern(&self, key: &str) -> Result<Option<Pattern>, ScrapeError> {
        self.throttle.throttle().await;

        let url = format!("{}/patterns/{}.json", self.config.api_base, key);
        let response = self
            .session
            .execute(|token| self.client.get(&url).bearer_auth(token))
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ScrapeError::ApiError(format!(
                "Ravelry pattern lookup returned {}",
                response.status()
            )));
        }

        let data: DetailResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::ParseError(e.to_string()))?;
        Ok(data.into_pattern())
    }

    fn to_raw_product(&self, pattern: &Pattern) -> RawProduct {
        let designer = pattern.designer.as_ref().map(|d| d.name.clone());

        let description = pattern
            .notes_html
            .as_deref()
            .map(strip_html)
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| {
                format!("Pattern by {}", designer.as_deref().unwrap_or("unknown"))
            });

        let kind = match &pattern.craft {
            Some(craft) if craft.name.eq_ignore_ascii_case("crochet") => ProductKind::Crochet,
            _ => ProductKind::Knitting,
        };

        let mut tags = Vec::new();
        if let Some(pattern_type) = &pattern.pattern_type {
            push_tag(&mut tags, &pattern_type.name);
        }
        for category in &pattern.pattern_categories {
            push_tag(&mut tags, &category.name);
        }
        for attribute in &pattern.personal_attributes {
            push_tag(&mut tags, &attribute.name);
        }
        if let Some(designer) = &designer {
            push_tag(&mut tags, &format!("Designer: {}", designer));
        }

        let image_url = pattern
            .first_photo
            .as_ref()
            .and_then(Photo::best_url)
            .or_else(|| pattern.photos.first().and_then(Photo::best_url));

        RawProduct {
            name: pattern.name.clone(),
            url: format!(
                "https://www.ravelry.com/patterns/library/{}",
                pattern.permalink
            ),
            description,
            source: "scraped-ravelry".to_string(),
            kind,
            external_id: Some(pattern.id.to_string()),
            image_url,
            image_alt: Some(pattern.name.clone()),
            rating: pattern.rating_average,
            rating_count: pattern.rating_count,
            source_last_updated: pattern.updated_at.as_deref().and_then(parse_updated_at),
            metadata: Some(serde_json::json!({
                "rating": pattern.rating_average,
                "rating_count": pattern.rating_count,
                "craft": pattern.craft.as_ref().map(|c| c.name.clone()),
                "pattern_type": pattern.pattern_type.as_ref().map(|t| t.name.clone()),
                "free": pattern.free,
                "designer": designer,
                "personal_attributes": pattern
                    .personal_attributes
                    .iter()
                    .map(|a| a.name.clone())
                    .collect::<Vec<_>>(),
                "yardage": pattern.yardage,
                "needle_sizes": pattern.needle_sizes,
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

fn push_tag(tags: &mut Vec<String>, tag: &str) {
    if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
        tags.push(tag.to_string());
    }
}

fn strip_html(html: &str) -> String {
    HTML_TAG_RE.replace_all(html, " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ravelry emits both RFC 3339 and its legacy `YYYY/MM/DD HH:MM:SS -0500`
/// timestamp format.
fn parse_updated_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y/%m/%d %H:%M:%S %z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_permalink(url: &str) -> Option<String> {
    PERMALINK_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[async_trait]
impl Scraper for RavelryScraper {
    fn name(&self) -> &str {
        "ravelry"
    }

    fn supports_url(&self, url: &str) -> bool {
        url.to_lowercase().contains("ravelry.com")
    }

    async fn scrape_one(&self, url: &str) -> Result<Option<RawProduct>, ScrapeError> {
        let Some(permalink) = parse_permalink(url) else {
            return Ok(None);
        };
        match self.fetch_pattern(&permalink).await? {
            Some(pattern) => Ok(Some(self.to_raw_product(&pattern))),
            None => Ok(None),
        }
    }

    async fn scrape(&self, mode: ScrapeMode) -> ScrapeResult {
        let started = Instant::now();
        info!(quota = ?mode.quota(), "Starting Ravelry scrape");

        let mut tally = RunTally::default();
        let error = match self.run(mode, &mut tally).await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "Ravelry scrape failed");
                Some(e.to_string())
            }
        };

        let result = tally.into_result("ravelry", started, error);
        info!(
            found = result.found,
            added = result.added,
            updated = result.updated,
            status = ?result.status,
            "Ravelry scrape finished"
        );
        result
    }
}
