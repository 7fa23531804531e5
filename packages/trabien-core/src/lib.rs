//! Trabien Core Library
//!
//! This crate provides the core functionality for Trabien clients:
//! - Authenticated API access (bearer tokens, refresh-on-401, typed errors)
//! - Session management (keyring with file fallback)
//! - Browser-based OAuth login handshake
//!
//! # Features
//!
//! - `keyring-storage` (default): Use platform keyring for session storage
//! - `file-storage`: Use file-based session storage (for headless Linux)
//! - `browser`: Automatically open the browser during OAuth login
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trabien_core::{api::ApiClient, auth, config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let endpoint = config::load_api_config();
//!     let store = Arc::new(auth::CredentialStore::new());
//!
//!     // Restore a persisted session, if any
//!     if let Some(session) = auth::load_session().await? {
//!         store.set_tokens(session.token_pair());
//!         auth::SessionRefresher::register(&store, endpoint.base_url.clone());
//!     }
//!
//!     let client = ApiClient::new(endpoint.base_url, Arc::clone(&store));
//!
//!     // List tasks in a workspace
//!     let tasks = client.tasks(1).await?;
//!     println!("{} tasks", tasks.tasks.len());
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;

// Re-export commonly used types
pub use api::{ApiClient, ApiError, ApiRequest, ApiResult};
pub use auth::{CredentialStore, Member, RefreshHandler, RefreshedTokens, Session, SessionRefresher, TokenPair};
pub use config::{load_api_config, ApiEndpointConfig, ConfigSource};
