//! GitHub repository search adapter.
//!
//! Searches the REST API for repositories matching the configured terms,
//! filters out documentation-only projects and reconciles the rest into
//! the catalog. Stars stand in for ratings since GitHub has none.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::Reconciler;
use crate::metrics;
use crate::terms::TermStore;

use super::pagination::PageDriver;
use super::throttle::Throttle;
use super::types::{
    ProductKind, RawProduct, RunTally, ScrapeError, ScrapeMode, ScrapeResult, Scraper,
};

/// Key under which the search terms for this adapter live in the term store.
pub const GITHUB_TERMS_KEY: &str = "github";

/// Fallback terms used when the term store has no row for the platform.
const DEFAULT_SEARCH_TERMS: &[&str] = &[
    "assistive technology",
    "screen reader",
    "eye tracking",
    "speech recognition",
    "switch access",
    "alternative input",
    "text-to-speech",
    "voice control",
    "accessibility aid",
    "mobility aid software",
];

/// Name patterns that mark a repository as documentation-only.
static DOC_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)awesome-|-list|-guide|guidelines|wcag|-docs|-l-").unwrap());

/// Description patterns that mark a repository as a curated aggregator.
static DOC_DESCRIPTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)awesome|list of|curated").unwrap());

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_requests_per_minute() -> u32 {
    30
}

fn default_max_pages_per_term() -> u32 {
    10
}

fn default_results_per_page() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    10
}

/// Configuration for the GitHub adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Optional bearer token. Unauthenticated search works but with a
    /// lower rate limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Request budget per minute. 0 disables throttling.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Page cap per search term.
    #[serde(default = "default_max_pages_per_term")]
    pub max_pages_per_term: u32,
    /// Results requested per search page.
    #[serde(default = "default_results_per_page")]
    pub results_per_page: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token: None,
            requests_per_minute: default_requests_per_minute(),
            max_pages_per_term: default_max_pages_per_term(),
            results_per_page: default_results_per_page(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Repo>,
}

#[derive(Debug, Deserialize)]
struct Repo {
    id: u64,
    name: String,
    html_url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u32,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    owner: Option<RepoOwner>,
}

#[derive(Debug, Deserialize)]
struct RepoOwner {
    #[serde(default)]
    avatar_url: Option<String>,
}

/// Scrapes GitHub repository search results into the catalog.
pub struct GithubScraper {
    config: GithubConfig,
    client: Client,
    throttle: Throttle,
    reconciler: Arc<Reconciler>,
    terms: Arc<dyn TermStore>,
}

impl GithubScraper {
    pub fn new(
        config: GithubConfig,
        reconciler: Arc<Reconciler>,
        terms: Arc<dyn TermStore>,
    ) -> Self {
        let client = Client::builder()
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

    fn search_terms(&self) -> Vec<String> {
        match self.terms.get(GITHUB_TERMS_KEY) {
            Ok(Some(terms)) if !terms.is_empty() => terms,
            Ok(_) => {
                debug!("No stored search terms for github, using defaults");
                DEFAULT_SEARCH_TERMS.iter().map(|t| t.to_string()).collect()
            }
            Err(e) => {
                warn!(error = %e, "Failed to load github search terms, using defaults");
                DEFAULT_SEARCH_TERMS.iter().map(|t| t.to_string()).collect()
            }
        }
    }

    async fn run(&self, mode: ScrapeMode, tally: &mut RunTally) -> Result<(), ScrapeError> {
        let terms = self.search_terms();
        let mut driver = PageDriver::new(self.config.max_pages_per_term, mode.quota());

        for term in &terms {
            if driver.exhausted() {
                break;
            }

            let repos = driver
                .run(|page| async move {
                    // Page-level failures only cost this term's remaining
                    // pages, never the run.
                    match self.fetch_repositories(term, page).await {
                        Ok(repos) => Ok((repos, true)),
                        Err(e) => {
                            warn!(term = %term, page, error = %e, "GitHub search page failed");
                            Ok((Vec::new(), false))
                        }
                    }
                })
                .await?;

            for repo in repos {
                tally.found += 1;
                let product = self.to_raw_product(&repo);
                match self.reconciler.reconcile(&product) {
                    Ok(outcome) => tally.record("github", &outcome),
                    Err(e) => {
                        warn!(url = %product.url, error = %e, "Failed to reconcile repository")
                    }
                }
            }
        }

        Ok(())
    }

    async fn fetch_repositories(&self, term: &str, page: u32) -> Result<Vec<Repo>, ScrapeError> {
        self.throttle.throttle().await;

        let url = format!(
            "{}/search/repositories?q={}&sort=stars&order=desc&per_page={}&page={}",
            self.config.api_base,
            urlencoding::encode(&format!("\"{}\" stars:>5", term)),
            self.config.results_per_page,
            page,
        );

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            metrics::SOURCE_REQUESTS
                .with_label_values(&["github", "error"])
                .inc();
            ScrapeError::from_reqwest(e)
        })?;
        metrics::SOURCE_REQUEST_DURATION
            .with_label_values(&["github"])
            .observe(started.elapsed().as_secs_f64());

        if !response.status().is_success() {
            metrics::SOURCE_REQUESTS
                .with_label_values(&["github", "error"])
                .inc();
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ScrapeError::ApiError(format!(
                "GitHub search returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        metrics::SOURCE_REQUESTS
            .with_label_values(&["github", "success"])
            .inc();

        let data: SearchResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::ParseError(e.to_string()))?;

        Ok(data
            .items
            .into_iter()
            .filter(|repo| !is_documentation_only(repo))
            .collect())
    }

    async fn fetch_repo(&self, owner: &str, repo: &str) -> Result<Option<Repo>, ScrapeError> {
        self.throttle.throttle().await;

        let url = format!("{}/repos/{}/{}", self.config.api_base, owner, repo);
        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(ScrapeError::from_reqwest)?;
        if !response.status().is_success() {
            debug!(owner, repo, status = %response.status(), "Repository lookup failed");
            return Ok(None);
        }

        let data: Repo = response
            .json()
            .await
            .map_err(|e| ScrapeError::ParseError(e.to_string()))?;
        Ok(Some(data))
    }

    fn to_raw_product(&self, repo: &Repo) -> RawProduct {
        let mut tags = Vec::new();
        for topic in &repo.topics {
            if !topic.is_empty() && !tags.contains(topic) {
                tags.push(topic.clone());
            }
        }
        if let Some(language) = &repo.language {
            if !tags.contains(language) {
                tags.push(language.clone());
            }
        }

        RawProduct {
            name: repo.name.clone(),
            url: repo.html_url.clone(),
            description: repo.description.clone().unwrap_or_default(),
            source: "scraped-github".to_string(),
            kind: ProductKind::Software,
            external_id: Some(repo.id.to_string()),
            image_url: repo.owner.as_ref().and_then(|o| o.avatar_url.clone()),
            image_alt: None,
            rating: Some(star_rating(repo.stargazers_count)),
            rating_count: Some(repo.stargazers_count),
            source_last_updated: None,
            metadata: Some(serde_json::json!({
                "language": repo.language,
                "topics": repo.topics,
            })),
            tags,
            banned: false,
        }
    }
}

/// Map a star count onto the catalog's 1-5 rating scale.
fn star_rating(stars: u32) -> f64 {
    match stars {
        100.. => 5.0,
        50..=99 => 4.0,
        10..=49 => 3.0,
        1..=9 => 2.0,
        0 => 1.0,
    }
}

/// Documentation-only repositories are aggregators, not tools.
fn is_documentation_only(repo: &Repo) -> bool {
    if DOC_NAME_RE.is_match(&repo.name) {
        return true;
    }
    if let Some(description) = &repo.description {
        if DOC_DESCRIPTION_RE.is_match(description) {
            return true;
        }
    }
    repo.name.trim_matches('-').len() <= 2
}

/// Extract `(owner, repo)` from a GitHub repository URL. Extra path
/// segments after the repository name are ignored.
fn parse_repo_url(url: &str) -> Option<(String, String)> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if !host.eq_ignore_ascii_case("github.com") && !host.eq_ignore_ascii_case("www.github.com") {
        return None;
    }
    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?.to_string();
    let repo = segments.next()?.to_string();
    Some((owner, repo))
}

#[async_trait]
impl Scraper for GithubScraper {
    fn name(&self) -> &str {
        "github"
    }

    fn supports_url(&self, url: &str) -> bool {
        url.to_lowercase().contains("github.com")
    }

    async fn scrape_one(&self, url: &str) -> Result<Option<RawProduct>, ScrapeError> {
        let Some((owner, repo)) = parse_repo_url(url) else {
            return Ok(None);
        };
        match self.fetch_repo(&owner, &repo).await? {
            Some(repo) => Ok(Some(self.to_raw_product(&repo))),
            None => Ok(None),
        }
    }

    async fn scrape(&self, mode: ScrapeMode) -> ScrapeResult {
        let started = Instant::now();
        info!(quota = ?mode.quota(), "Starting GitHub scrape");

        let mut tally = RunTally::default();
        let error = match self.run(mode, &mut tally).await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "GitHub scrape failed");
                Some(e.to_string())
            }
        };

        let result = tally.into_result("github", started, error);
        info!(
            found = result.found,
            added = result.added,
            updated = result.updated,
            status = ?result.status,
            "GitHub scrape finished"
        );
        result
    }
}
