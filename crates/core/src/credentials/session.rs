//! Authenticated request execution with refresh-and-retry-once.

use std::sync::Arc;

use chrono::{Duration, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{CredentialStore, OAuthCredential};
use crate::metrics;
use crate::scraper::ScrapeError;

const RAVELRY_TOKEN_URL: &str = "https://www.ravelry.com/oauth2/token";
const THINGIVERSE_TOKEN_URL: &str = "https://www.thingiverse.com/login/oauth/access_token";

/// Where the client id and secret travel in a refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshAuthStyle {
    /// HTTP basic auth header.
    BasicAuth,
    /// Fields in the form body.
    FormBody,
}

/// A platform's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    pub url: String,
    pub style: RefreshAuthStyle,
}

impl TokenEndpoint {
    pub fn ravelry() -> Self {
        Self {
            url: RAVELRY_TOKEN_URL.to_string(),
            style: RefreshAuthStyle::BasicAuth,
        }
    }

    pub fn thingiverse() -> Self {
        Self {
            url: THINGIVERSE_TOKEN_URL.to_string(),
            style: RefreshAuthStyle::FormBody,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Executes authenticated platform requests for one adapter instance.
///
/// On a 401/403 the session refreshes the access token exactly once, retries
/// the original request with the new token, and surfaces a second rejection
/// as a hard failure. The token cache is behind a mutex so concurrent
/// requests from the same instance perform at most one refresh; a caller
/// that lost the race picks up the already-refreshed token instead.
pub struct AuthSession {
    platform: String,
    endpoint: TokenEndpoint,
    store: Arc<dyn CredentialStore>,
    client: Client,
    token: tokio::sync::Mutex<Option<String>>,
}

impl AuthSession {
    pub fn new(
        platform: impl Into<String>,
        endpoint: TokenEndpoint,
        store: Arc<dyn CredentialStore>,
        client: Client,
    ) -> Self {
        Self {
            platform: platform.into(),
            endpoint,
            store,
            client,
            token: tokio::sync::Mutex::new(None),
        }
    }

    /// Send a request built with the current access token, refreshing and
    /// retrying once when the platform rejects it.
    pub async fn execute<F>(&self, build: F) -> Result<Response, ScrapeError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.current_token().await?;
        let response = build(&token)
            .send()
            .await
            .map_err(ScrapeError::from_reqwest)?;

        if !is_auth_failure(response.status()) {
            return Ok(response);
        }

        warn!(
            platform = %self.platform,
            status = %response.status(),
            "Request rejected, refreshing access token"
        );
        let fresh = self.refresh_after(&token).await?;

        let retry = build(&fresh)
            .send()
            .await
            .map_err(ScrapeError::from_reqwest)?;
        if is_auth_failure(retry.status()) {
            return Err(ScrapeError::Unauthorized(format!(
                "{} rejected credentials after refresh (status {})",
                self.platform,
                retry.status()
            )));
        }
        Ok(retry)
    }

    async fn current_token(&self) -> Result<String, ScrapeError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let credential = self.load_credential()?;
        let token = credential
            .access_token
            .ok_or_else(|| ScrapeError::MissingCredential(self.platform.clone()))?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Refresh the access token, unless another task already replaced the
    /// one that failed.
    async fn refresh_after(&self, stale: &str) -> Result<String, ScrapeError> {
        let mut cached = self.token.lock().await;
        if let Some(current) = cached.as_ref() {
            if current != stale {
                return Ok(current.clone());
            }
        }

        let credential = self.load_credential()?;
        let refresh_token = credential.refresh_token.as_deref().ok_or_else(|| {
            ScrapeError::Unauthorized(format!("{}: no refresh token stored", self.platform))
        })?;

        let mut request = self.client.post(&self.endpoint.url);
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        match self.endpoint.style {
            RefreshAuthStyle::BasicAuth => {
                request =
                    request.basic_auth(&credential.client_id, Some(&credential.client_secret));
            }
            RefreshAuthStyle::FormBody => {
                form.push(("client_id", &credential.client_id));
                form.push(("client_secret", &credential.client_secret));
            }
        }

        let response = request
            .form(&form)
            .send()
            .await
            .map_err(ScrapeError::from_reqwest)?;
        if !response.status().is_success() {
            metrics::TOKEN_REFRESHES
                .with_label_values(&[&self.platform, "failed"])
                .inc();
            return Err(ScrapeError::Unauthorized(format!(
                "{} token refresh failed (status {})",
                self.platform,
                response.status()
            )));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::ParseError(e.to_string()))?;
        let expires_at = tokens.expires_in.map(|s| Utc::now() + Duration::seconds(s));

        self.store
            .update_tokens(
                &self.platform,
                &tokens.access_token,
                tokens.refresh_token.as_deref(),
                expires_at,
            )
            .map_err(|e| ScrapeError::Internal(e.to_string()))?;

        metrics::TOKEN_REFRESHES
            .with_label_values(&[&self.platform, "success"])
            .inc();
        debug!(platform = %self.platform, "Access token refreshed");
        *cached = Some(tokens.access_token.clone());
        Ok(tokens.access_token)
    }

    fn load_credential(&self) -> Result<OAuthCredential, ScrapeError> {
        self.store
            .get(&self.platform)
            .map_err(|e| ScrapeError::Internal(e.to_string()))?
            .ok_or_else(|| ScrapeError::MissingCredential(self.platform.clone()))
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::SqliteCredentialStore;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_with_tokens(access: &str, refresh: Option<&str>) -> Arc<SqliteCredentialStore> {
        let store = SqliteCredentialStore::in_memory().unwrap();
        store
            .upsert(&OAuthCredential {
                platform: "ravelry".to_string(),
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                redirect_uri: None,
                access_token: Some(access.to_string()),
                refresh_token: refresh.map(|s| s.to_string()),
                token_expires_at: None,
            })
            .unwrap();
        Arc::new(store)
    }

    fn session(server: &MockServer, store: Arc<SqliteCredentialStore>) -> AuthSession {
        AuthSession::new(
            "ravelry",
            TokenEndpoint {
                url: format!("{}/token", server.uri()),
                style: RefreshAuthStyle::FormBody,
            },
            store,
            Client::new(),
        )
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let session = session(&server, store_with_tokens("good-token", Some("r1")));
        let client = Client::new();
        let url = format!("{}/api", server.uri());

        let response = session
            .execute(|token| client.get(&url).bearer_auth(token))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_and_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(header("authorization", "Bearer stale-token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(header("authorization", "Bearer fresh-token"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-token",
                "refresh_token": "r2",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with_tokens("stale-token", Some("r1"));
        let session = session(&server, store.clone());
        let client = Client::new();
        let url = format!("{}/api", server.uri());

        let response = session
            .execute(|token| client.get(&url).bearer_auth(token))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let stored = store.get("ravelry").unwrap().unwrap();
        assert_eq!(stored.access_token, Some("fresh-token".to_string()));
        assert_eq!(stored.refresh_token, Some("r2".to_string()));
        assert!(stored.token_expires_at.is_some());
    }

    #[tokio::test]
    async fn test_second_rejection_is_hard_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-token",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server, store_with_tokens("stale-token", Some("r1")));
        let client = Client::new();
        let url = format!("{}/api", server.uri());

        let err = session
            .execute(|token| client.get(&url).bearer_auth(token))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_failed_refresh_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let session = session(&server, store_with_tokens("stale-token", Some("r1")));
        let client = Client::new();
        let url = format!("{}/api", server.uri());

        let err = session
            .execute(|token| client.get(&url).bearer_auth(token))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let server = MockServer::start().await;
        let store = Arc::new(SqliteCredentialStore::in_memory().unwrap());
        let session = session(&server, store);
        let client = Client::new();
        let url = format!("{}/api", server.uri());

        let err = session
            .execute(|token| client.get(&url).bearer_auth(token))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::MissingCredential(_)));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let session = session(&server, store_with_tokens("stale-token", None));
        let client = Client::new();
        let url = format!("{}/api", server.uri());

        let err = session
            .execute(|token| client.get(&url).bearer_auth(token))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_basic_auth_refresh_style() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(header("authorization", "Bearer stale-token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(header("authorization", "Bearer fresh-token"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        // "id:secret" base64-encoded
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("authorization", "Basic aWQ6c2VjcmV0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-token",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with_tokens("stale-token", Some("r1"));
        let session = AuthSession::new(
            "ravelry",
            TokenEndpoint {
                url: format!("{}/token", server.uri()),
                style: RefreshAuthStyle::BasicAuth,
            },
            store,
            Client::new(),
        );
        let client = Client::new();
        let url = format!("{}/api", server.uri());

        let response = session
            .execute(|token| client.get(&url).bearer_auth(token))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
}
