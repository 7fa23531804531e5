//! Session storage with platform keyring and file-based fallback.
//!
//! Storage priority:
//! 1. Platform keyring (if `keyring-storage` feature enabled and available)
//! 2. File-based storage under the trabien config directory

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::credentials::TokenPair;

#[cfg(feature = "keyring-storage")]
use keyring::Entry;

/// Service name used for keyring storage
const KEYRING_SERVICE: &str = "trabien";
/// Username used for keyring entry
const KEYRING_USER: &str = "session";

/// The signed-in member, as the backend returns it (camelCase on the wire).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub member_id: i64,
    pub nickname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub provider: String,
}

/// Persisted login session: the member plus the token pair, surviving
/// process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub member: Member,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// The token pair to seed the credential store with.
    pub fn token_pair(&self) -> TokenPair {
        TokenPair {
            access_token: Some(self.access_token.clone()),
            refresh_token: Some(self.refresh_token.clone()),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| Utc::now() > expires_at)
    }
}

/// Get the trabien config directory
fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .context("Failed to find config directory")?;
    Ok(config_dir.join("trabien"))
}

/// Get the session file path for file-based storage
fn get_session_file_path() -> Result<PathBuf> {
    let config_dir = get_config_dir()?;
    // Create directory if it doesn't exist
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }
    Ok(config_dir.join(".session"))
}

// ============================================================================
// File-based session storage (always available)
// ============================================================================

fn write_session_file(path: &Path, session: &Session) -> Result<()> {
    let json = serde_json::to_string(session).context("Failed to serialize session")?;

    // Set restrictive permissions on Unix before writing
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600) // Owner read/write only
            .open(path)
            .context("Failed to create session file")?;
        let mut file = std::io::BufWriter::new(file);
        file.write_all(json.as_bytes())
            .context("Failed to write session")?;
    }

    #[cfg(not(unix))]
    {
        fs::write(path, &json).context("Failed to write session file")?;
    }

    tracing::debug!("Session saved to file: {:?}", path);
    Ok(())
}

fn read_session_file(path: &Path) -> Result<Option<Session>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).context("Failed to read session file")?;
    let session: Session =
        serde_json::from_str(&content).context("Failed to parse session file")?;
    tracing::debug!("Session loaded from file");
    Ok(Some(session))
}

fn save_session_to_file(session: &Session) -> Result<()> {
    write_session_file(&get_session_file_path()?, session)
}

fn load_session_from_file() -> Result<Option<Session>> {
    read_session_file(&get_session_file_path()?)
}

fn delete_session_file() {
    if let Ok(path) = get_session_file_path() {
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!("Failed to delete session file: {}", e);
            }
        }
    }
}

// ============================================================================
// Keyring-based session storage (optional, platform-specific)
// ============================================================================

#[cfg(feature = "keyring-storage")]
fn get_keyring_entry() -> Result<Entry> {
    Entry::new(KEYRING_SERVICE, KEYRING_USER).map_err(|e| {
        tracing::error!(
            "Failed to create keyring entry (service='{}', user='{}'): {}",
            KEYRING_SERVICE,
            KEYRING_USER,
            e
        );
        anyhow::anyhow!("Failed to create keyring entry: {}", e)
    })
}

#[cfg(feature = "keyring-storage")]
fn save_session_to_keyring(session: &Session) -> Result<()> {
    let entry = match get_keyring_entry() {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("Failed to create keyring entry for saving: {}, using file storage", e);
            return save_session_to_file(session);
        }
    };

    let json = serde_json::to_string(session).context("Failed to serialize session")?;

    if let Err(e) = entry.set_password(&json) {
        tracing::warn!("Failed to save session to keyring: {}, using file storage", e);
        return save_session_to_file(session);
    }

    // Also save to file as backup
    if let Err(e) = save_session_to_file(session) {
        tracing::debug!("Failed to save backup session to file: {}", e);
    }

    Ok(())
}

#[cfg(feature = "keyring-storage")]
fn load_session_from_keyring() -> Result<Option<Session>> {
    let entry = match get_keyring_entry() {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("Failed to create keyring entry for reading: {}, trying file fallback", e);
            return load_session_from_file();
        }
    };

    match entry.get_password() {
        Ok(json) => {
            tracing::debug!("Session loaded from keyring");
            let session: Session =
                serde_json::from_str(&json).context("Failed to parse session from keyring")?;
            Ok(Some(session))
        }
        Err(keyring::Error::NoEntry) => {
            tracing::debug!("No session in keyring, trying file fallback");
            load_session_from_file()
        }
        Err(e) => {
            tracing::warn!("Failed to load session from keyring: {}, trying file fallback", e);
            load_session_from_file()
        }
    }
}

#[cfg(feature = "keyring-storage")]
fn delete_session_from_keyring() -> Result<()> {
    // Always delete from file as well
    delete_session_file();

    let entry = get_keyring_entry()?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()), // Already deleted
        Err(e) => Err(anyhow::anyhow!("Failed to delete session from keyring: {}", e)),
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Load the persisted session from storage.
///
/// Uses keyring storage if available, falling back to file storage.
/// An expired session is deleted and treated as absent.
pub async fn load_session() -> Result<Option<Session>> {
    #[cfg(feature = "keyring-storage")]
    let session = load_session_from_keyring()?;

    #[cfg(not(feature = "keyring-storage"))]
    let session = load_session_from_file()?;

    if let Some(ref s) = session {
        if s.is_expired() {
            tracing::info!("Session expired, deleting");
            let _ = delete_session().await;
            return Ok(None);
        }
    }

    Ok(session)
}

/// Save the session to secure storage.
pub async fn save_session(session: &Session) -> Result<()> {
    #[cfg(feature = "keyring-storage")]
    save_session_to_keyring(session)?;

    #[cfg(not(feature = "keyring-storage"))]
    save_session_to_file(session)?;

    tracing::info!("Session saved for member: {}", session.member.nickname);
    Ok(())
}

/// Delete the session from all storage locations.
pub async fn delete_session() -> Result<()> {
    #[cfg(feature = "keyring-storage")]
    delete_session_from_keyring()?;

    #[cfg(not(feature = "keyring-storage"))]
    delete_session_file();

    Ok(())
}

/// Get information about session storage location (for documentation/debugging)
pub fn get_session_storage_info() -> String {
    #[cfg(all(feature = "keyring-storage", target_os = "windows"))]
    {
        "Windows Credential Manager (with file fallback)".to_string()
    }
    #[cfg(all(feature = "keyring-storage", target_os = "macos"))]
    {
        "macOS Keychain (with file fallback)".to_string()
    }
    #[cfg(all(feature = "keyring-storage", target_os = "linux"))]
    {
        "Linux Secret Service (GNOME Keyring/KWallet, with file fallback)".to_string()
    }
    #[cfg(not(feature = "keyring-storage"))]
    {
        let path = get_session_file_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "~/.config/trabien/.session".to_string());
        format!("File-based storage: {}", path)
    }
}
