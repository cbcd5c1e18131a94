//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! with mock source adapters injected, enabling comprehensive E2E testing
//! without real platforms.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use magpie_core::catalog::{ProductCatalog, SqliteCatalog};
use magpie_core::credentials::{CredentialStore, SqliteCredentialStore};
use magpie_core::runlog::{create_run_log_system, RunFilter, RunLogStore, SqliteRunLogStore};
use magpie_core::terms::{SqliteTermStore, TermStore};
use magpie_core::testing::MockScraper;
use magpie_core::{
    Config, DatabaseConfig, SchedulerConfig, Scraper, ScraperRegistry, TriggerService,
};

use magpie_server::api::create_router;
use magpie_server::state::AppState;

/// Re-export fixtures for test convenience
pub use magpie_core::testing::fixtures;

/// Actor recorded for runs the fixture does not attribute explicitly.
pub const SYSTEM_ACTOR: &str = "system";

/// Test fixture for E2E testing with mock source adapters.
///
/// The sqlite stores are real and live in a per-test temp directory; only
/// the adapters are mocked. Triggered runs execute on detached tasks, so
/// tests that assert on the run log must use `wait_for_runs`.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_trigger() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture
///         .post("/api/scrapers/trigger", json!({ "source": "github" }))
///         .await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock adapter registered as "github", claims github.com URLs
    pub github: Arc<MockScraper>,
    /// Mock adapter registered as "ravelry", claims ravelry.com URLs
    pub ravelry: Arc<MockScraper>,
    /// Real sqlite-backed run log, for seeding and direct assertions
    pub run_log_store: Arc<dyn RunLogStore>,
    /// Real sqlite-backed catalog, for seeding and direct assertions
    pub catalog: Arc<dyn ProductCatalog>,
    /// Temporary directory holding the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let github = Arc::new(MockScraper::new("github", "github.com"));
        let ravelry = Arc::new(MockScraper::new("ravelry", "ravelry.com"));

        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            scheduler: SchedulerConfig { enabled: false },
            ..Config::default()
        };

        let catalog: Arc<dyn ProductCatalog> = Arc::new(
            SqliteCatalog::new(&db_path).expect("Failed to create product catalog"),
        );
        let credential_store: Arc<dyn CredentialStore> = Arc::new(
            SqliteCredentialStore::new(&db_path).expect("Failed to create credential store"),
        );
        let term_store: Arc<dyn TermStore> = Arc::new(
            SqliteTermStore::new(&db_path).expect("Failed to create term store"),
        );
        let run_log_store: Arc<dyn RunLogStore> = Arc::new(
            SqliteRunLogStore::new(&db_path).expect("Failed to create run log store"),
        );

        let (run_log_handle, run_log_writer) = create_run_log_system(
            Arc::clone(&run_log_store),
            Some(SYSTEM_ACTOR.to_string()),
            100,
        );
        tokio::spawn(run_log_writer.run());

        let mut registry = ScraperRegistry::new();
        registry.register(Arc::clone(&github) as Arc<dyn Scraper>);
        registry.register(Arc::clone(&ravelry) as Arc<dyn Scraper>);
        let registry = Arc::new(registry);

        let trigger = Arc::new(TriggerService::new(
            Arc::clone(&registry),
            Arc::clone(&catalog),
            run_log_handle,
        ));

        let state = Arc::new(AppState::new(
            config,
            trigger,
            registry,
            Arc::clone(&run_log_store),
            term_store,
            credential_store,
        ));

        let router = create_router(state);

        Self {
            router,
            github,
            ravelry,
            run_log_store,
            catalog,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        (status, String::from_utf8_lossy(&body_bytes).into_owned())
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }

    /// Wait until the run log holds at least `count` records.
    ///
    /// Triggered runs finish on detached tasks and the writer persists
    /// asynchronously, so assertions on the run log need to poll.
    pub async fn wait_for_runs(&self, count: i64) {
        for _ in 0..100 {
            let current = self
                .run_log_store
                .count(&RunFilter::new())
                .expect("Failed to count runs");
            if current >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Timed out waiting for {} run log records", count);
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
