//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARIGOLD_API_URL` - Base URL of the commerce REST API (e.g., `https://api.example.com/v1/`)
//!
//! ## Optional
//! - `MARIGOLD_API_KEY` - Publishable API key sent as `X-Api-Key`
//! - `MARIGOLD_DATA_DIR` - Directory for local storage (default: .marigold)
//! - `MARIGOLD_HTTP_TIMEOUT_SECS` - Request timeout (default: 30)
//! - `MARIGOLD_CATALOG_CACHE_TTL_SECS` - Product/category cache TTL (default: 300)
//! - `MARIGOLD_CATALOG_CACHE_CAPACITY` - Max cached catalog entries (default: 1000)
//! - `MARIGOLD_CURRENCY` - Display currency for guest cart estimates (default: USD)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use marigold_core::CurrencyCode;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_DATA_DIR: &str = ".marigold";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_CAPACITY: u64 = 1000;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct StorefrontConfig {
    /// Base URL of the REST API. Always ends with `/` so relative paths join beneath it.
    pub api_url: Url,
    /// Publishable API key
    pub api_key: Option<SecretString>,
    /// Directory holding local persistent storage
    pub data_dir: PathBuf,
    /// Per-request timeout
    pub http_timeout: Duration,
    /// Catalog cache settings
    pub catalog_cache: CatalogCacheConfig,
    /// Currency used for guest cart estimates
    pub currency: CurrencyCode,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Product and category cache settings.
#[derive(Debug, Clone, Copy)]
pub struct CatalogCacheConfig {
    /// Time to live for cached entries
    pub ttl: Duration,
    /// Maximum number of cached entries
    pub capacity: u64,
}

impl Default for CatalogCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl std::fmt::Debug for StorefrontConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontConfig")
            .field("api_url", &self.api_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("data_dir", &self.data_dir)
            .field("http_timeout", &self.http_timeout)
            .field("catalog_cache", &self.catalog_cache)
            .field("currency", &self.currency)
            .field("sentry_dsn", &self.sentry_dsn)
            .field("sentry_environment", &self.sentry_environment)
            .finish()
    }
}

impl StorefrontConfig {
    /// Create a configuration with defaults for everything except the API URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the URL does not parse or is not http(s).
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_api_url("MARIGOLD_API_URL", api_url)?,
            api_key: None,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            http_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            catalog_cache: CatalogCacheConfig::default(),
            currency: CurrencyCode::default(),
            sentry_dsn: None,
            sentry_environment: None,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = get_required_env("MARIGOLD_API_URL")?;
        let mut config = Self::new(&api_url)?;

        config.api_key = get_optional_env("MARIGOLD_API_KEY").map(SecretString::from);
        config.data_dir = PathBuf::from(get_env_or_default("MARIGOLD_DATA_DIR", DEFAULT_DATA_DIR));
        config.http_timeout = Duration::from_secs(get_parsed_env(
            "MARIGOLD_HTTP_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
        )?);
        config.catalog_cache = CatalogCacheConfig {
            ttl: Duration::from_secs(get_parsed_env(
                "MARIGOLD_CATALOG_CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL_SECS,
            )?),
            capacity: get_parsed_env("MARIGOLD_CATALOG_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)?,
        };
        config.currency = get_env_or_default("MARIGOLD_CURRENCY", "USD")
            .parse::<CurrencyCode>()
            .map_err(|e| ConfigError::InvalidEnvVar("MARIGOLD_CURRENCY".to_string(), e))?;
        config.sentry_dsn = get_optional_env("SENTRY_DSN");
        config.sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");

        Ok(config)
    }

    /// Path of the local storage file.
    #[must_use]
    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join("storage.json")
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an environment variable parsed into `T`, falling back to `default` when unset.
fn get_parsed_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

/// Parse and normalize the API base URL.
fn parse_api_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let mut url =
        Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}', expected http or https", url.scheme()),
        ));
    }

    // Url::join replaces the last segment unless the path ends with '/'
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}
