//! Authentication module for Trabien clients.
//!
//! Provides the in-memory credential store consumed by the request gateway,
//! secure session storage (keyring with file fallback), the browser-based
//! OAuth login handshake, and request-time token refresh.

mod credentials;
mod login;
mod refresh;
mod session;

pub use credentials::{CredentialStore, RefreshHandler, RefreshedTokens, TokenPair};
pub use login::{complete_login, logout, sign_in, AuthResponse, LoginUrlEvent};
pub use refresh::SessionRefresher;
pub use session::{
    delete_session, get_session_storage_info, load_session, save_session, Member, Session,
};
