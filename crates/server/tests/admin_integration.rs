//! Integration tests for the administration endpoints: search terms,
//! OAuth credentials, run log queries and the metrics exposition.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;

use magpie_core::runlog::RunRecord;

use common::TestFixture;

#[tokio::test]
async fn test_get_terms_without_stored_list() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/scrapers/terms/github").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["platform"], "github");
    assert_eq!(response.body["stored"], false);
    assert_eq!(response.body["terms"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_put_terms_replaces_list_in_full() {
    let fixture = TestFixture::new().await;

    let put = fixture
        .put(
            "/api/scrapers/terms/ravelry",
            json!({ "terms": ["adaptive cardigan", "one-handed mittens"] }),
        )
        .await;
    assert_status!(put, StatusCode::NO_CONTENT);

    let get = fixture.get("/api/scrapers/terms/ravelry").await;
    assert_status!(get, StatusCode::OK);
    assert_eq!(get.body["stored"], true);
    assert_eq!(
        get.body["terms"],
        json!(["adaptive cardigan", "one-handed mittens"])
    );

    // A later PUT replaces, never merges.
    let put = fixture
        .put(
            "/api/scrapers/terms/ravelry",
            json!({ "terms": ["seated shawl"] }),
        )
        .await;
    assert_status!(put, StatusCode::NO_CONTENT);

    let get = fixture.get("/api/scrapers/terms/ravelry").await;
    assert_eq!(get.body["terms"], json!(["seated shawl"]));
}

#[tokio::test]
async fn test_put_empty_terms_is_distinct_from_unstored() {
    let fixture = TestFixture::new().await;

    let put = fixture
        .put("/api/scrapers/terms/github", json!({ "terms": [] }))
        .await;
    assert_status!(put, StatusCode::NO_CONTENT);

    let get = fixture.get("/api/scrapers/terms/github").await;
    assert_eq!(get.body["stored"], true);
    assert_eq!(get.body["terms"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_get_credential_missing_returns_404() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/scrapers/credentials/ravelry").await;

    assert_status!(response, StatusCode::NOT_FOUND);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("No credential stored"));
}

#[tokio::test]
async fn test_put_credential_then_get_redacted() {
    let fixture = TestFixture::new().await;

    let put = fixture
        .put(
            "/api/scrapers/credentials/ravelry",
            json!({
                "client_id": "rav-client",
                "client_secret": "rav-secret",
                "access_token": "rav-access",
                "refresh_token": null
            }),
        )
        .await;
    assert_status!(put, StatusCode::NO_CONTENT);

    let get = fixture.get("/api/scrapers/credentials/ravelry").await;
    assert_status!(get, StatusCode::OK);
    assert_eq!(get.body["platform"], "ravelry");
    assert_eq!(get.body["client_id"], "rav-client");
    assert_eq!(get.body["has_access_token"], true);
    assert_eq!(get.body["has_refresh_token"], false);

    // Secret material never appears in the response.
    let raw = serde_json::to_string(&get.body).unwrap();
    assert!(!raw.contains("rav-secret"));
    assert!(!raw.contains("rav-access"));
}

fn seeded_run(source: &str, status: &str, age_minutes: i64) -> RunRecord {
    RunRecord {
        id: 0,
        timestamp: Utc::now() - Duration::minutes(age_minutes),
        source: source.to_string(),
        status: status.to_string(),
        found: 10,
        added: 2,
        updated: 1,
        duration_ms: 1500,
        error_message: None,
        actor: "admin-1".to_string(),
    }
}

#[tokio::test]
async fn test_runs_query_filters_and_pagination() {
    let fixture = TestFixture::new().await;

    // Oldest first, so newest-first ordering is observable.
    for (source, status, age) in [
        ("github", "success", 50),
        ("github", "success", 40),
        ("ravelry", "error", 30),
        ("github", "halted", 20),
        ("ravelry", "success", 10),
    ] {
        fixture
            .run_log_store
            .insert(&seeded_run(source, status, age))
            .expect("Failed to seed run");
    }

    let all = fixture.get("/api/scrapers/runs").await;
    assert_status!(all, StatusCode::OK);
    assert_eq!(all.body["total"], 5);
    assert_eq!(all.body["runs"].as_array().unwrap().len(), 5);
    assert_eq!(all.body["runs"][0]["source"], "ravelry");

    let page = fixture.get("/api/scrapers/runs?limit=2&offset=4").await;
    assert_eq!(page.body["total"], 5);
    assert_eq!(page.body["runs"].as_array().unwrap().len(), 1);
    assert_eq!(page.body["runs"][0]["source"], "github");
    assert_eq!(page.body["limit"], 2);
    assert_eq!(page.body["offset"], 4);

    let github = fixture.get("/api/scrapers/runs?source=github").await;
    assert_eq!(github.body["total"], 3);

    let errors = fixture.get("/api/scrapers/runs?status=error").await;
    assert_eq!(errors.body["total"], 1);
    assert_eq!(errors.body["runs"][0]["source"], "ravelry");

    let both = fixture
        .get("/api/scrapers/runs?source=github&status=error")
        .await;
    assert_eq!(both.body["total"], 0);
    assert_eq!(both.body["runs"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_runs_limit_is_clamped() {
    let fixture = TestFixture::new().await;

    let high = fixture.get("/api/scrapers/runs?limit=5000").await;
    assert_status!(high, StatusCode::OK);
    assert_eq!(high.body["limit"], 1000);

    let low = fixture.get("/api/scrapers/runs?limit=0").await;
    assert_eq!(low.body["limit"], 1);
}

#[tokio::test]
async fn test_metrics_exposition() {
    let fixture = TestFixture::new().await;

    // Generate one observed request before scraping the exposition.
    fixture.get("/health").await;

    let (status, body) = fixture.get_text("/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("magpie_http_requests_in_flight"));
    assert!(body.contains("magpie_http_requests_total"));
    // Labels use the route template, not the raw URI.
    assert!(body.contains("path=\"/health\""));
}
