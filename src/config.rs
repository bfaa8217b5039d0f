//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.huginn/config.toml` (user)
//! 3. `/etc/huginn/config.toml` (system)
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.huginn/secrets.toml` (user, must be 0600)
//! 2. `/etc/huginn/secrets.toml` (system, must be 0600)
//!
//! Either secret may instead come from `HUGINN_API_KEY` / `HUGINN_WEBHOOK_TOKEN`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::query::{QueryConfig, RetryPolicy};
use crate::{HuginnError, Result};

const API_KEY_ENV: &str = "HUGINN_API_KEY";
const WEBHOOK_TOKEN_ENV: &str = "HUGINN_WEBHOOK_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub webhooks: Option<WebhooksConfig>,
    #[serde(default)]
    pub favorites: FavoritesConfig,
}

/// Hosted backend connection.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://xyz.example.co`.
    #[serde(default)]
    pub url: String,
    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

/// Query cache policy.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Seconds fetched data stays fresh (default: 300).
    #[serde(default = "default_stale_secs")]
    pub stale_time_secs: u64,
    /// Seconds an unobserved entry survives (default: 600).
    #[serde(default = "default_gc_secs")]
    pub gc_time_secs: u64,
    #[serde(default = "default_gc_interval_secs")]
    pub gc_interval_secs: u64,
    /// Query retries after the first attempt (default: 3).
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Mutation retries after the first attempt (default: 1).
    #[serde(default = "default_mutation_retries")]
    pub mutation_retries: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_secs: default_stale_secs(),
            gc_time_secs: default_gc_secs(),
            gc_interval_secs: default_gc_interval_secs(),
            retries: default_retries(),
            mutation_retries: default_mutation_retries(),
        }
    }
}

fn default_stale_secs() -> u64 {
    300
}

fn default_gc_secs() -> u64 {
    600
}

fn default_gc_interval_secs() -> u64 {
    60
}

fn default_retries() -> u32 {
    3
}

fn default_mutation_retries() -> u32 {
    1
}

impl CacheConfig {
    pub fn query_config(&self) -> QueryConfig {
        QueryConfig::new()
            .stale_time(Duration::from_secs(self.stale_time_secs))
            .gc_time(Duration::from_secs(self.gc_time_secs))
            .gc_interval(Duration::from_secs(self.gc_interval_secs.max(1)))
            .retry(RetryPolicy::query().max_retries(self.retries))
            .mutation_retry(RetryPolicy::mutation().max_retries(self.mutation_retries))
    }
}

/// Serverless function endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhooksConfig {
    pub archive_url: String,
    pub save_event_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FavoritesConfig {
    /// Local favorites file (default: platform data dir).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl FavoritesConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(crate::favorites::default_path)
    }
}

/// Secrets (API key, webhook token).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub backend: Option<ApiKeySecret>,
    #[serde(default)]
    pub webhooks: Option<TokenSecret>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenSecret {
    pub token: String,
}

impl Config {
    /// Load configuration from the standard locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(HuginnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".huginn").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/huginn/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(HuginnError::Configuration(
            "No config file found. Create ~/.huginn/config.toml or /etc/huginn/config.toml"
                .to_string(),
        ))
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Returns empty secrets if no file exists (env vars may supply them).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".huginn").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/huginn/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load one secrets file, rejecting group/world-readable files.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(HuginnError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Backend API key, falling back to `HUGINN_API_KEY`.
    pub fn api_key(&self) -> Option<String> {
        self.backend
            .as_ref()
            .map(|s| s.api_key.clone())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
    }

    /// Webhook bearer token, falling back to `HUGINN_WEBHOOK_TOKEN`.
    pub fn webhook_token(&self) -> Option<String> {
        self.webhooks
            .as_ref()
            .map(|s| s.token.clone())
            .or_else(|| std::env::var(WEBHOOK_TOKEN_ENV).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.cache.retries, 3);
        assert_eq!(config.cache.mutation_retries, 1);
        assert!(config.webhooks.is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [backend]
            url = "https://venue.example.co"
            timeout_secs = 10

            [cache]
            stale_time_secs = 60
            retries = 0

            [webhooks]
            archive_url = "https://venue.example.co/functions/v1/archive-events"
            save_event_url = "https://venue.example.co/functions/v1/save-event"

            [favorites]
            path = "/tmp/favs.json"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.backend.url, "https://venue.example.co");
        assert_eq!(config.backend.timeout_secs, 10);
        assert_eq!(config.cache.gc_time_secs, 600);

        let query = config.cache.query_config();
        assert_eq!(query.stale_time, Duration::from_secs(60));
        assert_eq!(query.retry.max_retries, 0);
        assert_eq!(query.mutation_retry.max_retries, 1);

        assert!(config.webhooks.unwrap().save_event_url.ends_with("save-event"));
        assert_eq!(
            config.favorites.resolved_path(),
            PathBuf::from("/tmp/favs.json")
        );
    }

    #[test]
    fn parse_secrets() {
        let toml = r#"
            [backend]
            api_key = "anon-key"

            [webhooks]
            token = "service-token"
        "#;
        let secrets: Secrets = toml::from_str(toml).unwrap();
        assert_eq!(secrets.api_key(), Some("anon-key".to_string()));
        assert_eq!(secrets.webhook_token(), Some("service-token".to_string()));
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }
}
