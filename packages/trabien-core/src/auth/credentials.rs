//! In-memory credential store shared with the request gateway.
//!
//! The store is the single source of truth for the current token pair. The
//! gateway reads the access token once per request (when building headers)
//! and writes the pair once per successful refresh; all other writers are
//! the login/logout workflow.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

/// The current access/refresh token pair. Both `None` means unauthenticated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenPair {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Tokens produced by a successful refresh exchange.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// Some providers rotate the refresh token on every exchange.
    pub refresh_token: Option<String>,
}

/// The single async operation the gateway invokes when an access token is
/// rejected. Implemented by the auth workflow; see
/// [`SessionRefresher`](crate::auth::SessionRefresher).
#[async_trait]
pub trait RefreshHandler: Send + Sync {
    async fn refresh(&self) -> anyhow::Result<RefreshedTokens>;
}

/// Holds the token pair and the registered refresh handler.
///
/// Lock guards are never held across an await point; the pair is swapped
/// atomically between the gateway's suspension points.
#[derive(Default)]
pub struct CredentialStore {
    tokens: RwLock<TokenPair>,
    refresh_handler: RwLock<Option<Arc<dyn RefreshHandler>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current access token; `None` means unauthenticated.
    pub fn access_token(&self) -> Option<String> {
        self.tokens.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.tokens.read().refresh_token.clone()
    }

    pub fn tokens(&self) -> TokenPair {
        self.tokens.read().clone()
    }

    /// Replace the access token used by all subsequently initiated requests.
    /// Requests already dispatched keep the token captured in their headers.
    pub fn set_access_token(&self, token: Option<String>) {
        self.tokens.write().access_token = token;
    }

    /// Replace the pair wholesale (login, session restore).
    pub fn set_tokens(&self, pair: TokenPair) {
        *self.tokens.write() = pair;
    }

    /// Apply a refresh result as one atomic swap. The refresh token is only
    /// replaced when the exchange rotated it.
    pub fn apply_refresh(&self, refreshed: &RefreshedTokens) {
        let mut tokens = self.tokens.write();
        tokens.access_token = Some(refreshed.access_token.clone());
        if let Some(refresh_token) = &refreshed.refresh_token {
            tokens.refresh_token = Some(refresh_token.clone());
        }
    }

    /// Wipe the pair (logout). The refresh handler registration is left in
    /// place; without a refresh token it simply fails until the next login.
    pub fn clear(&self) {
        *self.tokens.write() = TokenPair::default();
    }

    /// Register the refresh handler, replacing any previous one. At most one
    /// handler is registered at a time.
    pub fn set_refresh_handler(&self, handler: Arc<dyn RefreshHandler>) {
        *self.refresh_handler.write() = Some(handler);
    }

    pub fn clear_refresh_handler(&self) {
        *self.refresh_handler.write() = None;
    }

    pub fn refresh_handler(&self) -> Option<Arc<dyn RefreshHandler>> {
        self.refresh_handler.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticRefresher(&'static str);

    #[async_trait]
    impl RefreshHandler for StaticRefresher {
        async fn refresh(&self) -> anyhow::Result<RefreshedTokens> {
            Ok(RefreshedTokens {
                access_token: self.0.to_string(),
                refresh_token: None,
            })
        }
    }

    #[test]
    fn starts_empty_and_clears_to_empty() {
        let store = CredentialStore::new();
        assert_eq!(store.tokens(), TokenPair::default());

        store.set_tokens(TokenPair {
            access_token: Some("at".to_string()),
            refresh_token: Some("rt".to_string()),
        });
        store.clear();

        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
    }

    #[test]
    fn apply_refresh_keeps_old_refresh_token_when_not_rotated() {
        let store = CredentialStore::new();
        store.set_tokens(TokenPair {
            access_token: Some("old-at".to_string()),
            refresh_token: Some("rt".to_string()),
        });

        store.apply_refresh(&RefreshedTokens {
            access_token: "new-at".to_string(),
            refresh_token: None,
        });

        assert_eq!(store.access_token().as_deref(), Some("new-at"));
        assert_eq!(store.refresh_token().as_deref(), Some("rt"));
    }

    #[test]
    fn apply_refresh_rotates_both_tokens() {
        let store = CredentialStore::new();
        store.set_tokens(TokenPair {
            access_token: Some("old-at".to_string()),
            refresh_token: Some("old-rt".to_string()),
        });

        store.apply_refresh(&RefreshedTokens {
            access_token: "new-at".to_string(),
            refresh_token: Some("new-rt".to_string()),
        });

        assert_eq!(store.access_token().as_deref(), Some("new-at"));
        assert_eq!(store.refresh_token().as_deref(), Some("new-rt"));
    }

    #[tokio::test]
    async fn registering_a_handler_replaces_the_previous_one() {
        let store = CredentialStore::new();
        store.set_refresh_handler(Arc::new(StaticRefresher("first")));
        store.set_refresh_handler(Arc::new(StaticRefresher("second")));

        let handler = store.refresh_handler().unwrap();
        let refreshed = handler.refresh().await.unwrap();
        assert_eq!(refreshed.access_token, "second");
    }
}
