use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Default API base URL
const DEFAULT_API_URL: &str = "https://trabien.com";

/// Environment variable name for API URL override
const ENV_API_URL: &str = "TRABIEN_API_URL";

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    api: Option<ApiConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfig {
    /// API base URL (e.g., "https://your-instance.example.com")
    base_url: Option<String>,
}

/// Runtime API endpoint configuration
#[derive(Debug, Clone)]
pub struct ApiEndpointConfig {
    /// Base URL for API calls (e.g., "https://trabien.com")
    pub base_url: String,
    /// Source of the configuration (for logging)
    pub source: ConfigSource,
}

/// Where the configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// Loaded from environment variable
    Environment,
    /// Loaded from config file
    ConfigFile,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::ConfigFile => write!(f, "config file"),
        }
    }
}

/// Get the path to the configuration file
fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("trabien").join("config.toml"))
}

/// Load configuration from the config file
fn load_config_file() -> Option<ConfigFile> {
    let path = get_config_file_path()?;

    if !path.exists() {
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            None
        }
    }
}

/// Trim whitespace and trailing slashes; `None` if nothing is left.
fn sanitize_url(url: &str) -> Option<String> {
    let url = url.trim().trim_end_matches('/');
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

/// Load API endpoint configuration with priority:
/// 1. Environment variable (TRABIEN_API_URL)
/// 2. Config file (~/.config/trabien/config.toml)
/// 3. Default values
pub fn load_api_config() -> ApiEndpointConfig {
    // Priority 1: Environment variable
    if let Ok(url) = std::env::var(ENV_API_URL) {
        if let Some(base_url) = sanitize_url(&url) {
            tracing::info!("Using API URL from environment variable: {}", base_url);
            return ApiEndpointConfig {
                base_url,
                source: ConfigSource::Environment,
            };
        }
    }

    // Priority 2: Config file
    if let Some(config) = load_config_file() {
        if let Some(api_config) = config.api {
            if let Some(base_url) = api_config.base_url.as_deref().and_then(sanitize_url) {
                tracing::info!("Using API URL from config file: {}", base_url);
                return ApiEndpointConfig {
                    base_url,
                    source: ConfigSource::ConfigFile,
                };
            }
        }
    }

    // Priority 3: Default values
    tracing::debug!("Using default API URL: {}", DEFAULT_API_URL);
    ApiEndpointConfig {
        base_url: DEFAULT_API_URL.to_string(),
        source: ConfigSource::Default,
    }
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/trabien/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# Trabien Configuration
# Place this file at: ~/.config/trabien/config.toml

[api]
# API base URL for self-hosted instances
# Default: https://trabien.com
# base_url = "https://your-instance.example.com"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_trailing_slashes_and_whitespace() {
        assert_eq!(
            sanitize_url(" https://trabien.com/ "),
            Some("https://trabien.com".to_string())
        );
        assert_eq!(
            sanitize_url("https://trabien.com//"),
            Some("https://trabien.com".to_string())
        );
    }

    #[test]
    fn sanitize_rejects_empty_values() {
        assert_eq!(sanitize_url(""), None);
        assert_eq!(sanitize_url("   "), None);
        assert_eq!(sanitize_url("///"), None);
    }

    #[test]
    fn example_config_parses() {
        let parsed: ConfigFile = toml::from_str(&generate_example_config()).unwrap();
        assert!(parsed.api.is_none() || parsed.api.unwrap().base_url.is_none());
    }
}
