//! Browser-based OAuth login handshake.
//!
//! The backend drives the provider flow; the client's part is:
//! 1. Bind a one-shot localhost listener for the redirect (before opening
//!    the browser, to avoid a race on the port).
//! 2. Ask the backend for the provider authorization URL, passing the
//!    localhost redirect as the callback.
//! 3. Open the URL in the system browser and wait for the redirect.
//! 4. Exchange the authorization code for tokens and persist the session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::api::ApiClient;

use super::credentials::CredentialStore;
use super::refresh::SessionRefresher;
use super::session::{delete_session, save_session, Member, Session};

/// How long to wait for the user to finish authorizing in the browser.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

const SUCCESS_PAGE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Login successful!</h1><p>You may close this tab and return to Trabien.</p></body></html>";

/// Event payload for auth URL notification (for GUI integration).
#[derive(Debug, Clone)]
pub struct LoginUrlEvent {
    pub auth_url: String,
}

#[derive(Debug, Deserialize)]
struct StartLoginResponse {
    #[serde(rename = "authUrl")]
    auth_url: String,
}

/// Response from the code exchange endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub member: Member,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Run the complete login handshake.
///
/// Emits the authorization URL via `emit_url` if provided (and opens it in
/// the system browser when the `browser` feature is enabled), then blocks
/// until the redirect arrives or the timeout expires.
pub async fn sign_in<F>(
    client: &ApiClient,
    store: &Arc<CredentialStore>,
    emit_url: Option<F>,
) -> Result<Member>
where
    F: Fn(LoginUrlEvent) + Send + Sync,
{
    // Bind before opening the browser so the redirect always has a target.
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("Failed to bind OAuth callback port")?;
    let port = listener
        .local_addr()
        .context("Failed to read OAuth callback address")?
        .port();
    let redirect_uri = format!("http://localhost:{port}");

    let query = serde_urlencoded::to_string([("callback", redirect_uri.as_str())])
        .context("Failed to encode callback parameter")?;
    let start: StartLoginResponse = client
        .get(&format!("/api/auth/kakao/start?{query}"))
        .await
        .context("Failed to start login flow")?;

    tracing::info!("Login URL generated: {}", start.auth_url);

    if let Some(emit) = &emit_url {
        emit(LoginUrlEvent {
            auth_url: start.auth_url.clone(),
        });
    }

    // Try to open browser automatically (if browser feature enabled)
    #[cfg(feature = "browser")]
    {
        if let Err(e) = webbrowser::open(&start.auth_url) {
            tracing::warn!(
                "Failed to open browser automatically: {}. User can use the manual link.",
                e
            );
        }
    }

    let params = accept_callback(listener).await?;

    if let Some(error) = params.get("error") {
        bail!("Authorization was denied: {error}");
    }
    let code = params
        .get("code")
        .context("Missing authorization code in OAuth callback")?;

    complete_login(client, store, code).await
}

/// Exchange an authorization code for tokens, persist the session, seed the
/// credential store and register the refresh handler.
pub async fn complete_login(
    client: &ApiClient,
    store: &Arc<CredentialStore>,
    code: &str,
) -> Result<Member> {
    let query = serde_urlencoded::to_string([("code", code)])
        .context("Failed to encode authorization code")?;
    let auth: AuthResponse = client
        .get(&format!("/api/auth/kakao/callback?{query}"))
        .await
        .context("Failed to exchange authorization code")?;

    if auth.access_token.is_empty() || auth.refresh_token.is_empty() {
        bail!("Invalid authentication response: missing tokens");
    }

    let expires_at = auth
        .expires_in
        .map(|secs| Utc::now() + chrono::Duration::seconds(secs));

    let session = Session {
        member: auth.member.clone(),
        access_token: auth.access_token,
        refresh_token: auth.refresh_token,
        expires_at,
    };
    save_session(&session).await?;

    store.set_tokens(session.token_pair());
    SessionRefresher::register(store, client.base_url());

    tracing::info!("Signed in as '{}'", auth.member.nickname);

    Ok(auth.member)
}

/// Sign out: delete the persisted session and wipe the in-memory tokens.
pub async fn logout(store: &Arc<CredentialStore>) -> Result<()> {
    delete_session().await?;
    store.clear();
    tracing::info!("Signed out");
    Ok(())
}

/// Wait for a single OAuth redirect on an already-bound listener.
///
/// Parses the query parameters from the first request line and answers with
/// a small success page. Times out after [`CALLBACK_TIMEOUT`].
async fn accept_callback(listener: TcpListener) -> Result<HashMap<String, String>> {
    let accept = async {
        let (mut stream, _) = listener
            .accept()
            .await
            .context("Failed to accept OAuth callback connection")?;

        let mut buf = vec![0u8; 8192];
        let n = stream
            .read(&mut buf)
            .await
            .context("Failed to read OAuth callback request")?;

        let request = String::from_utf8_lossy(&buf[..n]);
        let params = parse_query_from_request(&request)?;

        stream
            .write_all(SUCCESS_PAGE)
            .await
            .context("Failed to answer OAuth callback")?;
        let _ = stream.shutdown().await;

        Ok::<HashMap<String, String>, anyhow::Error>(params)
    };

    tokio::time::timeout(CALLBACK_TIMEOUT, accept)
        .await
        .context("Timed out waiting for OAuth callback")?
}

fn parse_query_from_request(request: &str) -> Result<HashMap<String, String>> {
    // First line format: "GET /?code=...&error=... HTTP/1.1"
    let first_line = request.lines().next().unwrap_or("");
    let path = first_line.split_ascii_whitespace().nth(1).unwrap_or("/");
    let query = path.split_once('?').map_or("", |(_, q)| q);
    serde_urlencoded::from_str(query).context("Invalid OAuth callback query parameters")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_callback_query() {
        let req = "GET /?code=abc123&state=xyz HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let params = parse_query_from_request(req).unwrap();
        assert_eq!(params.get("code").map(String::as_str), Some("abc123"));
    }

    #[test]
    fn empty_query_yields_no_params() {
        let req = "GET / HTTP/1.1\r\n\r\n";
        let params = parse_query_from_request(req).unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn percent_encoded_values_are_decoded() {
        let req = "GET /?error=access%20denied HTTP/1.1\r\n\r\n";
        let params = parse_query_from_request(req).unwrap();
        assert_eq!(
            params.get("error").map(String::as_str),
            Some("access denied")
        );
    }

    #[test]
    fn auth_response_uses_camel_case() {
        let auth: AuthResponse = serde_json::from_str(
            r#"{
                "accessToken": "at",
                "refreshToken": "rt",
                "member": {"memberId": 1, "nickname": "jamie", "provider": "kakao"},
                "expiresIn": 3600
            }"#,
        )
        .unwrap();

        assert_eq!(auth.access_token, "at");
        assert_eq!(auth.member.nickname, "jamie");
        assert_eq!(auth.expires_in, Some(3600));
    }
}
