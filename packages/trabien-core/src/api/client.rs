//! Authenticated request gateway.
//!
//! Every outbound call to the Trabien API passes through [`ApiClient`]. The
//! gateway attaches the bearer token from the credential store, reads the
//! full response body before parsing, and on a 401 exchanges the refresh
//! token for a new access token before retrying the identical request
//! exactly once.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::CredentialStore;

use super::error::{ApiError, ApiResult};

/// Path of the session refresh endpoint. A 401 from this endpoint must never
/// trigger another refresh cycle.
pub const REFRESH_ENDPOINT: &str = "/api/auth/external/refresh";

/// Total-request timeout applied to the underlying HTTP client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A single outbound call, kept immutable so a post-refresh retry re-issues
/// it verbatim.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL, including any query string.
    pub endpoint: String,
    /// JSON body, serialized once at construction time.
    pub body: Option<Value>,
    /// Headers merged on top of the defaults.
    pub extra_headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            body: None,
            extra_headers: Vec::new(),
        }
    }

    /// Attach a JSON body. Serialization happens here, up front, so a retry
    /// sends exactly the same bytes.
    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> ApiResult<Self> {
        let value = serde_json::to_value(body).map_err(|source| ApiError::Encode {
            endpoint: self.endpoint.clone(),
            source,
        })?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }
}

/// Gateway for all Trabien API calls.
///
/// Constructed once per process and shared by reference; the only mutable
/// state it touches is the token pair inside the [`CredentialStore`].
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    credentials: Arc<CredentialStore>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, credentials: Arc<CredentialStore>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            base_url,
            http,
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        self.request(ApiRequest::new(Method::GET, endpoint)).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.request(ApiRequest::new(Method::POST, endpoint).with_json(body)?)
            .await
    }

    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.request(ApiRequest::new(Method::PATCH, endpoint).with_json(body)?)
            .await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.request(ApiRequest::new(Method::PUT, endpoint).with_json(body)?)
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        self.request(ApiRequest::new(Method::DELETE, endpoint)).await
    }

    /// Perform a request with refresh-on-401 handling.
    ///
    /// On a 401 (and only when a refresh handler is registered, the call is
    /// not already a retry, and the endpoint is not the refresh endpoint
    /// itself) the handler is invoked once; if it yields a usable access
    /// token the token pair is swapped and the request re-issued. The second
    /// attempt is terminal: its outcome is surfaced as-is.
    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<T> {
        let mut is_retry = false;

        loop {
            let (status, text) = self.dispatch(&request).await?;

            if status == StatusCode::UNAUTHORIZED
                && !is_retry
                && !request.endpoint.contains(REFRESH_ENDPOINT)
            {
                if let Some(handler) = self.credentials.refresh_handler() {
                    match handler.refresh().await {
                        Ok(refreshed) if !refreshed.access_token.is_empty() => {
                            self.credentials.apply_refresh(&refreshed);
                            is_retry = true;
                            tracing::debug!(
                                endpoint = %request.endpoint,
                                "access token refreshed, retrying request"
                            );
                            continue;
                        }
                        Ok(_) => {
                            tracing::warn!("refresh handler returned an empty access token");
                        }
                        Err(e) => {
                            tracing::warn!("token refresh failed: {e:#}");
                        }
                    }
                }
            }

            if !status.is_success() {
                return Err(ApiError::Status {
                    status: status.as_u16(),
                    message: error_message(status, &text),
                });
            }

            return serde_json::from_str(&text).map_err(|source| ApiError::InvalidBody {
                endpoint: request.endpoint.clone(),
                source,
            });
        }
    }

    /// Send one attempt and read the full body as text, success or failure,
    /// so error payloads stay available for diagnostics.
    async fn dispatch(&self, request: &ApiRequest) -> ApiResult<(StatusCode, String)> {
        let url = format!("{}{}", self.base_url, request.endpoint);

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .header(header::CONTENT_TYPE, "application/json");

        for (name, value) in &request.extra_headers {
            builder = builder.header(name, value);
        }

        if let Some(token) = self.credentials.access_token() {
            builder = builder.bearer_auth(token);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = %request.method, %url, "sending API request");

        let response = builder.send().await.map_err(|source| ApiError::Transport {
            endpoint: request.endpoint.clone(),
            source,
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|source| ApiError::Transport {
            endpoint: request.endpoint.clone(),
            source,
        })?;

        tracing::debug!(%status, body_len = text.len(), "received API response");

        Ok((status, text))
    }
}

/// Error body shape used across the API: `{"error": …}` or `{"message": …}`.
#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.error.or(parsed.message) {
            return message;
        }
    }

    format!(
        "API error: {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::api::tasks::{CreateTaskPayload, CreateTaskResponse};
    use crate::api::teams::TeamsResponse;
    use crate::auth::{RefreshHandler, RefreshedTokens};

    use super::*;

    struct CountingRefresher {
        calls: AtomicUsize,
        next_token: String,
    }

    impl CountingRefresher {
        fn new(next_token: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                next_token: next_token.to_string(),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl RefreshHandler for CountingRefresher {
        async fn refresh(&self) -> anyhow::Result<RefreshedTokens> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RefreshedTokens {
                access_token: self.next_token.clone(),
                refresh_token: None,
            })
        }
    }

    struct FailingRefresher;

    #[async_trait::async_trait]
    impl RefreshHandler for FailingRefresher {
        async fn refresh(&self) -> anyhow::Result<RefreshedTokens> {
            anyhow::bail!("refresh token revoked")
        }
    }

    fn store_with_token(token: &str) -> Arc<CredentialStore> {
        let store = Arc::new(CredentialStore::new());
        store.set_access_token(Some(token.to_string()));
        store
    }

    fn client(server: &MockServer, store: &Arc<CredentialStore>) -> ApiClient {
        ApiClient::new(server.uri(), Arc::clone(store))
    }

    #[tokio::test]
    async fn refreshes_and_retries_at_most_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"error":"expired"}"#))
            .expect(2)
            .mount(&server)
            .await;

        let store = store_with_token("stale");
        let refresher = CountingRefresher::new("fresh");
        store.set_refresh_handler(refresher.clone());

        let result: ApiResult<Value> = client(&server, &store).get("/api/tasks").await;

        let err = result.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn refresh_endpoint_401_never_triggers_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_ENDPOINT))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with_token("stale");
        let refresher = CountingRefresher::new("fresh");
        store.set_refresh_handler(refresher.clone());

        let result: ApiResult<Value> = client(&server, &store)
            .post(REFRESH_ENDPOINT, &json!({"refreshToken": "rt"}))
            .await;

        assert!(result.unwrap_err().is_auth_error());
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn token_swap_applies_to_newly_initiated_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/me/teams"))
            .and(header("Authorization", "Bearer first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"teams": []})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/me/teams"))
            .and(header("Authorization", "Bearer second"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"teams": []})))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with_token("first");
        let client = client(&server, &store);

        let _: TeamsResponse = client.get("/api/me/teams").await.unwrap();
        store.set_access_token(Some("second".to_string()));
        let _: TeamsResponse = client.get("/api/me/teams").await.unwrap();
    }

    #[tokio::test]
    async fn decodes_successful_response() {
        let server = MockServer::start().await;
        let payload = CreateTaskPayload {
            title: "Standup".to_string(),
            start_time: "2026-03-02T09:00:00Z".parse().unwrap(),
            end_time: "2026-03-02T09:15:00Z".parse().unwrap(),
            content: None,
            color: "#3b82f6".to_string(),
            tag_ids: vec![],
            file_ids: None,
            status: None,
            workspace_id: 7,
        };
        Mock::given(method("POST"))
            .and(path("/api/tasks"))
            .and(body_json(&payload))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"success":true,"taskId":42}"#),
            )
            .mount(&server)
            .await;

        let store = store_with_token("token");
        let response: CreateTaskResponse = client(&server, &store)
            .post("/api/tasks", &payload)
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.task_id, 42);
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_decode_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not-json"))
            .mount(&server)
            .await;

        let store = store_with_token("token");
        let result: ApiResult<Value> = client(&server, &store).get("/api/tasks").await;

        assert!(matches!(
            result.unwrap_err(),
            ApiError::InvalidBody { .. }
        ));
    }

    #[tokio::test]
    async fn error_message_extracted_from_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .respond_with(
                ResponseTemplate::new(404).set_body_string(r#"{"error":"Task not found"}"#),
            )
            .mount(&server)
            .await;

        let store = store_with_token("token");
        let result: ApiResult<Value> = client(&server, &store).get("/api/tasks").await;

        assert_eq!(result.unwrap_err().to_string(), "Task not found");
    }

    #[tokio::test]
    async fn status_text_fallback_when_error_body_unparseable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html>boom</html>"))
            .mount(&server)
            .await;

        let store = store_with_token("token");
        let result: ApiResult<Value> = client(&server, &store).get("/api/tasks").await;

        let err = result.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn no_handler_401_fails_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with_token("stale");
        let result: ApiResult<Value> = client(&server, &store).get("/api/tasks").await;

        assert!(result.unwrap_err().is_auth_error());
    }

    #[tokio::test]
    async fn successful_refresh_then_retry_resolves() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/me/teams"))
            .and(header("Authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/me/teams"))
            .and(header("Authorization", "Bearer new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"teams": []})))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with_token("stale");
        let refresher = CountingRefresher::new("new");
        store.set_refresh_handler(refresher.clone());

        let response: TeamsResponse = client(&server, &store).get("/api/me/teams").await.unwrap();

        assert!(response.teams.is_empty());
        assert_eq!(refresher.calls(), 1);
        assert_eq!(store.access_token().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn failing_refresh_falls_through_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with_token("stale");
        store.set_refresh_handler(Arc::new(FailingRefresher));

        let result: ApiResult<Value> = client(&server, &store).get("/api/tasks").await;

        assert!(result.unwrap_err().is_auth_error());
        assert_eq!(store.access_token().as_deref(), Some("stale"));
    }

    #[tokio::test]
    async fn empty_refreshed_token_is_not_applied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with_token("stale");
        let refresher = CountingRefresher::new("");
        store.set_refresh_handler(refresher.clone());

        let result: ApiResult<Value> = client(&server, &store).get("/api/tasks").await;

        assert!(result.unwrap_err().is_auth_error());
        assert_eq!(refresher.calls(), 1);
        assert_eq!(store.access_token().as_deref(), Some("stale"));
    }

    #[tokio::test]
    async fn extra_headers_and_query_are_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/tasks"))
            .and(query_param("task_id", "3"))
            .and(header("X-Request-Source", "desktop"))
            .and(header("Content-Type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;

        let store = store_with_token("token");
        let request = ApiRequest::new(Method::PUT, "/api/tasks?task_id=3")
            .with_json(&json!({"title": "renamed"}))
            .unwrap()
            .with_header("X-Request-Source", "desktop");

        let response: Value = client(&server, &store).request(request).await.unwrap();
        assert_eq!(response["success"], json!(true));
    }

    #[tokio::test]
    async fn bearer_header_absent_when_unauthenticated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/kakao/start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"authUrl": "u"})))
            .mount(&server)
            .await;

        let store = Arc::new(CredentialStore::new());
        let _: Value = client(&server, &store)
            .get("/api/auth/kakao/start?callback=http%3A%2F%2Flocalhost%3A4242")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key("authorization"));
    }
}
