//! AbleData assistive technology adapter.
//!
//! The AbleData site went offline, so this adapter walks the 2017 snapshot
//! on the Wayback Machine. Stored terms are category page URLs; without
//! any the adapter starts from the archived products-by-category index,
//! follows category links to listings, and fetches one detail page per
//! product. Extraction is regex based; archived markup is frozen, so the
//! patterns cannot rot.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::Reconciler;
use crate::metrics;
use crate::terms::TermStore;

use super::throttle::Throttle;
use super::types::{
    ProductKind, RawProduct, RunTally, ScrapeError, ScrapeMode, ScrapeResult, Scraper,
};

/// Key under which the category URLs for this adapter live in the term store.
pub const ABLEDATA_TERMS_KEY: &str = "abledata";

const DEFAULT_INDEX_URL: &str =
    "https://web.archive.org/web/20171201151646/http://www.abledata.com/products-by-category";

const USER_AGENT: &str = "Mozilla/5.0 (compatible; AbleDataScraper/1.0)";

/// Category names as they appear on the 2017 index page.
const CATEGORIES: &[&str] = &[
    "Aids for Daily Living",
    "Blind and Low Vision",
    "Communication",
    "Computers",
    "Controls",
    "Deaf And Hard of Hearing",
    "Deaf Blind",
    "Education",
    "Environmental Adaptations",
    "Housekeeping",
    "Orthotics",
    "Prosthetics",
    "Recreation",
    "Safety and Security",
    "Seating",
    "Therapeutic Aids",
    "Transportation",
    "Walking",
    "Wheeled Mobility",
    "Workplace",
];

static ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<a\s[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#).unwrap());

static IMG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<img[^>]+>").unwrap());

static ALT_ATTR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)alt="([^"]*)""#).unwrap());

static SRC_ATTR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)src="([^"]*)""#).unwrap());

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

static WAYBACK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"web\.archive\.org/web/(\d+)[a-z_]*/(.+)").unwrap());

static BODY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)class="[^"]*field-name-body[^"]*"[^>]*>(.*?)</div>"#).unwrap());

static TECH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)class="[^"]*field-name-field-technical-specifications[^"]*"[^>]*>(.*?)</div>"#)
        .unwrap()
});

static SELECTED_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<li[^>]*class="[^"]*selected[^"]*"[^>]*>.*?<a[^>]*>(.*?)</a>"#).unwrap()
});

static THUMB_DOWN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)class="[^"]*thumb-down[^"]*".*?class="[^"]*percent[^"]*"[^>]*>[^0-9<]*(\d+)%"#)
        .unwrap()
});

static THUMB_UP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)class="[^"]*thumb-up[^"]*".*?class="[^"]*percent[^"]*"[^>]*>[^0-9<]*(\d+)%"#)
        .unwrap()
});

static RATE_INFO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)class="[^"]*rate-info[^"]*"[^>]*>(.*?)</div>"#).unwrap());

static USERS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+)\s+users?").unwrap());

static PRICE_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)item-field_price_check_date[^>]*>(.*?)</div>").unwrap());

static LAST_UPDATED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:last updated|last modified|updated|date):?\s*([A-Za-z]+ \d{1,2},? \d{4})")
        .unwrap()
});

static H1_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").unwrap());

fn default_index_url() -> String {
    DEFAULT_INDEX_URL.to_string()
}

fn default_requests_per_minute() -> u32 {
    15
}

fn default_timeout_secs() -> u64 {
    30
}

/// Configuration for the AbleData adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbledataConfig {
    /// Archived category index page.
    #[serde(default = "default_index_url")]
    pub index_url: String,
    /// Request budget per minute. archive.org asks crawlers to go slow.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Per-request timeout in seconds. Wayback responses are slow.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AbledataConfig {
    fn default() -> Self {
        Self {
            index_url: default_index_url(),
            requests_per_minute: default_requests_per_minute(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// A product link lifted from a category listing page.
#[derive(Debug, Clone, PartialEq)]
struct ListingEntry {
    name: String,
    url: String,
    image_url: Option<String>,
}

/// Scrapes archived AbleData category pages into the catalog.
pub struct AbledataScraper {
    config: AbledataConfig,
    client: Client,
    throttle: Throttle,
    reconciler: Arc<Reconciler>,
    terms: Arc<dyn TermStore>,
}

impl AbledataScraper {
    pub fn new(
        config: AbledataConfig,
        reconciler: Arc<Reconciler>,
        terms: Arc<dyn TermStore>,
    ) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");
        let throttle = Throttle::new(config.requests_per_minute);
        Self {
            config,
            client,
            throttle,
            reconciler,
            terms,
        }
    }

    fn category_urls(&self) -> Vec<String> {
        match self.terms.get(ABLEDATA_TERMS_KEY) {
            Ok(Some(urls)) if !urls.is_empty() => urls,
            Ok(_) => {
                debug!("No stored category URLs for abledata, starting from the index");
                vec![self.config.index_url.clone()]
            }
            Err(e) => {
                warn!(error = %e, "Failed to load abledata category URLs, starting from the index");
                vec![self.config.index_url.clone()]
            }
        }
    }

    async fn run(&self, mode: ScrapeMode, tally: &mut RunTally) -> Result<(), ScrapeError> {
        let urls = self.category_urls();

        for url in &urls {
            if quota_reached(mode, tally) {
                break;
            }

            if url.contains("products-by-category") {
                let html = match self.fetch_page(url).await {
                    Ok(html) => html,
                    Err(e) => {
                        warn!(url = %url, error = %e, "Failed to fetch category index");
                        continue;
                    }
                };
                for category_url in extract_category_links(&html, url) {
                    if quota_reached(mode, tally) {
                        break;
                    }
                    self.scrape_category(&category_url, mode, tally).await;
                }
            } else {
                self.scrape_category(url, mode, tally).await;
            }
        }

        Ok(())
    }

    /// Process one category listing. Failures cost this category only.
    async fn scrape_category(&self, url: &str, mode: ScrapeMode, tally: &mut RunTally) {
        let html = match self.fetch_page(url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to fetch category page");
                return;
            }
        };

        let entries = extract_listing(&html, url);
        debug!(url = %url, products = entries.len(), "Category listing parsed");

        for entry in entries {
            if quota_reached(mode, tally) {
                break;
            }
            tally.found += 1;

            let detail_html = match self.fetch_page(&entry.url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(url = %entry.url, error = %e, "Failed to fetch product page");
                    continue;
                }
            };

            let product = build_product(&entry, &detail_html);
            match self.reconciler.reconcile(&product) {
                Ok(outcome) => tally.record("abledata", &outcome),
                Err(e) => {
                    warn!(url = %product.url, error = %e, "Failed to reconcile product")
                }
            }
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<String, ScrapeError> {
        self.throttle.throttle().await;

        let started = Instant::now();
        let response = self.client.get(url).send().await.map_err(|e| {
            metrics::SOURCE_REQUESTS
                .with_label_values(&["abledata", "error"])
                .inc();
            ScrapeError::from_reqwest(e)
        })?;
        metrics::SOURCE_REQUEST_DURATION
            .with_label_values(&["abledata"])
            .observe(started.elapsed().as_secs_f64());

        if !response.status().is_success() {
            metrics::SOURCE_REQUESTS
                .with_label_values(&["abledata", "error"])
                .inc();
            return Err(ScrapeError::ApiError(format!(
                "Archived page returned {}",
                response.status()
            )));
        }
        metrics::SOURCE_REQUESTS
            .with_label_values(&["abledata", "success"])
            .inc();

        response
            .text()
            .await
            .map_err(|e| ScrapeError::ParseError(e.to_string()))
    }
}

fn quota_reached(mode: ScrapeMode, tally: &RunTally) -> bool {
    mode.quota().is_some_and(|quota| tally.found as usize >= quota)
}

fn strip_tags(html: &str) -> String {
    TAG_RE
        .replace_all(html, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rebase an archived href. Relative paths are joined against the original
/// URL embedded in the Wayback page URL and rewrapped with its timestamp;
/// `modifier` selects the Wayback rendition (`im_` for image assets).
fn absolutize(href: &str, page_url: &str, modifier: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if let Some(path) = href.strip_prefix("//web/") {
        return format!("https://web.archive.org/web/{}", path);
    }
    if href.starts_with("/web/") {
        return format!("https://web.archive.org{}", href);
    }
    if let Some(caps) = WAYBACK_RE.captures(page_url) {
        let timestamp = &caps[1];
        let original = &caps[2];
        if let Ok(joined) = Url::parse(original).and_then(|base| base.join(href)) {
            return format!(
                "https://web.archive.org/web/{}{}/{}",
                timestamp, modifier, joined
            );
        }
    }
    match Url::parse(page_url).and_then(|base| base.join(href)) {
        Ok(joined) => joined.to_string(),
        Err(_) => href.to_string(),
    }
}

/// Pull category page links out of the index page. Only anchors whose text
/// matches a known category name count.
fn extract_category_links(html: &str, page_url: &str) -> Vec<String> {
    let mut urls = Vec::new();
    for caps in ANCHOR_RE.captures_iter(html) {
        let href = &caps[1];
        let text = strip_tags(&caps[2]);
        if CATEGORIES.contains(&text.as_str()) {
            let url = absolutize(href, page_url, "");
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

/// Pull product links from a category listing and pair each with its
/// thumbnail, matched by the image's alt text.
fn extract_listing(html: &str, page_url: &str) -> Vec<ListingEntry> {
    let mut images_by_name: Vec<(String, String)> = Vec::new();
    for tag in IMG_RE.find_iter(html) {
        let tag = tag.as_str();
        let alt = ALT_ATTR_RE
            .captures(tag)
            .map(|c| strip_tags(&c[1]))
            .unwrap_or_default();
        let Some(src) = SRC_ATTR_RE.captures(tag).map(|c| c[1].to_string()) else {
            continue;
        };
        if alt.is_empty() || src.is_empty() || src.contains("ImageComingSoon") {
            continue;
        }
        let lower = src.to_lowercase();
        if ["logo", "icon", "button", "arrow", "banner", "histats"]
            .iter()
            .any(|skip| lower.contains(skip))
        {
            continue;
        }
        images_by_name.push((alt, absolutize(&src, page_url, "im_")));
    }

    let mut entries: Vec<ListingEntry> = Vec::new();
    for caps in ANCHOR_RE.captures_iter(html) {
        let href = &caps[1];
        if !href.to_lowercase().contains("/product/") {
            continue;
        }
        let name = strip_tags(&caps[2]);
        if name.len() < 3 {
            continue;
        }
        let url = absolutize(href, page_url, "");
        if entries.iter().any(|e| e.url == url) {
            continue;
        }
        let image_url = images_by_name
            .iter()
            .find(|(alt, _)| *alt == name)
            .map(|(_, src)| src.clone());
        entries.push(ListingEntry {
            name,
            url,
            image_url,
        });
    }
    entries
}

fn extract_description(html: &str, fallback: &str) -> String {
    let mut parts = Vec::new();
    if let Some(caps) = BODY_RE.captures(html) {
        let text = strip_tags(&caps[1]);
        if !text.is_empty() {
            parts.push(text);
        }
    }
    if let Some(caps) = TECH_RE.captures(html) {
        let text = strip_tags(&caps[1]);
        if !text.is_empty() {
            parts.push(format!("Technical Specifications: {}", text));
        }
    }
    if parts.is_empty() {
        fallback.to_string()
    } else {
        parts.join("\n\n")
    }
}

fn extract_tags(html: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for caps in SELECTED_TAG_RE.captures_iter(html) {
        let tag = strip_tags(&caps[1]);
        if tag.len() > 3 && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// The 2017 pages show thumbs up/down percentages. The down percentage is
/// inverted onto a 5-star scale; thumb-up is the fallback when no
/// thumb-down block exists.
fn extract_rating(html: &str) -> Option<f64> {
    if let Some(caps) = THUMB_DOWN_RE.captures(html) {
        let down: f64 = caps[1].parse().ok()?;
        return Some((100.0 - down) / 100.0 * 5.0);
    }
    if let Some(caps) = THUMB_UP_RE.captures(html) {
        let up: f64 = caps[1].parse().ok()?;
        return Some(up / 100.0 * 5.0);
    }
    None
}

fn extract_rating_count(html: &str) -> Option<u32> {
    let caps = RATE_INFO_RE.captures(html)?;
    let text = strip_tags(&caps[1]);
    USERS_RE
        .captures(&text)
        .and_then(|c| c[1].parse().ok())
}

fn parse_page_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    for format in ["%B %d, %Y", "%B %d %Y", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(DateTime::from_naive_utc_and_offset(
                date.and_time(NaiveTime::MIN),
                Utc,
            ));
        }
    }
    None
}

/// Last-updated date: the price check field when present, otherwise the
/// first "Last Updated" style phrase anywhere in the page text.
fn extract_date(html: &str) -> Option<DateTime<Utc>> {
    if let Some(caps) = PRICE_DATE_RE.captures(html) {
        if let Some(date) = parse_page_date(&strip_tags(&caps[1])) {
            return Some(date);
        }
    }
    let text = strip_tags(html);
    LAST_UPDATED_RE
        .captures(&text)
        .and_then(|caps| parse_page_date(&caps[1]))
}

fn build_product(entry: &ListingEntry, detail_html: &str) -> RawProduct {
    let description = extract_description(detail_html, &entry.name);
    let banned = description
        .to_lowercase()
        .contains("no longer sells assistive products");

    RawProduct {
        name: entry.name.clone(),
        url: entry.url.clone(),
        description,
        source: "scraped-abledata".to_string(),
        kind: ProductKind::AssistiveDevice,
        external_id: None,
        image_url: entry.image_url.clone(),
        image_alt: entry.image_url.as_ref().map(|_| entry.name.clone()),
        rating: extract_rating(detail_html),
        rating_count: extract_rating_count(detail_html),
        source_last_updated: extract_date(detail_html),
        metadata: None,
        tags: extract_tags(detail_html),
        banned,
    }
}

#[async_trait]
impl Scraper for AbledataScraper {
    fn name(&self) -> &str {
        "abledata"
    }

    fn supports_url(&self, url: &str) -> bool {
        url.to_lowercase().contains("abledata.com")
    }

    async fn scrape_one(&self, url: &str) -> Result<Option<RawProduct>, ScrapeError> {
        if !self.supports_url(url) {
            return Ok(None);
        }
        let html = match self.fetch_page(url).await {
            Ok(html) => html,
            Err(e) => {
                debug!(url = %url, error = %e, "Product page fetch failed");
                return Ok(None);
            }
        };
        let Some(name) = H1_RE.captures(&html).map(|caps| strip_tags(&caps[1])) else {
            return Ok(None);
        };
        if name.is_empty() {
            return Ok(None);
        }
        let entry = ListingEntry {
            name,
            url: url.to_string(),
            image_url: None,
        };
        Ok(Some(build_product(&entry, &html)))
    }

    async fn scrape(&self, mode: ScrapeMode) -> ScrapeResult {
        let started = Instant::now();
        info!(quota = ?mode.quota(), "Starting AbleData scrape");

        let mut tally = RunTally::default();
        let error = match self.run(mode, &mut tally).await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "AbleData scrape failed");
                Some(e.to_string())
            }
        };

        let result = tally.into_result("abledata", started, error);
        info!(
            found = result.found,
            added = result.added,
            updated = result.updated,
            status = ?result.status,
            "AbleData scrape finished"
        );
        result
    }
}
