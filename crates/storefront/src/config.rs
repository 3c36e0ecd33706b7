//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `INK_API_BASE_URL` - Backend REST API base URL (e.g. `https://api.inkcartridges.co.nz`)
//! - `INK_AUTH_URL` - Managed auth provider project URL
//! - `INK_AUTH_ANON_KEY` - Public anon key for the auth provider
//!
//! ## Optional
//! - `INK_FREE_SHIPPING_THRESHOLD` - Subtotal for free shipping (default: 100.00)
//! - `INK_FLAT_SHIPPING` - Shipping estimate below the threshold (default: 5.99)
//! - `INK_CART_DEBOUNCE_MS` - Quantity update coalescing window (default: 500)
//! - `INK_SEARCH_DEBOUNCE_MS` - Autocomplete debounce (default: 300)
//! - `INK_STORAGE_DIR` - Directory for the local storage files (default: .inkcartridges)
//! - `INK_HTTP_CONNECT_TIMEOUT_SECS` - HTTP connect timeout (default: 10)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Clone)]
pub struct StorefrontConfig {
    /// Backend REST API base URL
    pub api_base_url: Url,
    /// Auth provider settings
    pub auth: AuthConfig,
    /// Cart pricing display and coalescing settings
    pub cart: CartSettings,
    /// Autocomplete debounce window
    pub search_debounce: Duration,
    /// Where the file-backed local storage lives
    pub storage_dir: PathBuf,
    /// HTTP connect timeout
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for StorefrontConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontConfig")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("auth", &self.auth)
            .field("cart", &self.cart)
            .field("search_debounce", &self.search_debounce)
            .field("storage_dir", &self.storage_dir)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Managed auth provider configuration.
///
/// Implements `Debug` manually to redact the anon key.
#[derive(Clone)]
pub struct AuthConfig {
    /// Project URL; endpoints live under `/auth/v1`
    pub url: Url,
    /// Public anon key sent as the `apikey` header
    pub anon_key: SecretString,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("url", &self.url.as_str())
            .field("anon_key", &"[REDACTED]")
            .finish()
    }
}

/// Cart settings shared by the sync engine and the totals estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartSettings {
    /// Subtotal at which shipping becomes free
    pub free_shipping_threshold: Decimal,
    /// Flat shipping used for the local estimate below the threshold
    pub flat_shipping: Decimal,
    /// Fixed quantity-update coalescing window
    pub update_debounce: Duration,
}

impl Default for CartSettings {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Decimal::new(100, 0),
            flat_shipping: Decimal::new(599, 2),
            update_debounce: Duration::from_millis(500),
        }
    }
}

impl StorefrontConfig {
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

        let api_base_url = get_url("INK_API_BASE_URL")?;
        let auth = AuthConfig {
            url: get_url("INK_AUTH_URL")?,
            anon_key: SecretString::from(get_required_env("INK_AUTH_ANON_KEY")?),
        };

        let defaults = CartSettings::default();
        let cart = CartSettings {
            free_shipping_threshold: get_parsed_or(
                "INK_FREE_SHIPPING_THRESHOLD",
                defaults.free_shipping_threshold,
            )?,
            flat_shipping: get_parsed_or("INK_FLAT_SHIPPING", defaults.flat_shipping)?,
            update_debounce: Duration::from_millis(get_parsed_or("INK_CART_DEBOUNCE_MS", 500)?),
        };
        if cart.free_shipping_threshold.is_sign_negative() {
            return Err(ConfigError::InvalidEnvVar(
                "INK_FREE_SHIPPING_THRESHOLD".to_string(),
                "must not be negative".to_string(),
            ));
        }

        Ok(Self {
            api_base_url,
            auth,
            cart,
            search_debounce: Duration::from_millis(get_parsed_or("INK_SEARCH_DEBOUNCE_MS", 300)?),
            storage_dir: PathBuf::from(get_env_or_default("INK_STORAGE_DIR", ".inkcartridges")),
            connect_timeout: Duration::from_secs(get_parsed_or(
                "INK_HTTP_CONNECT_TIMEOUT_SECS",
                10,
            )?),
        })
    }

    /// Configuration pointing at a given backend, with defaults elsewhere.
    ///
    /// Used by tests and tools that talk to a local backend.
    #[must_use]
    pub fn for_backend(api_base_url: Url, auth_url: Url) -> Self {
        Self {
            api_base_url,
            auth: AuthConfig {
                url: auth_url,
                anon_key: SecretString::from("local-anon-key"),
            },
            cart: CartSettings::default(),
            search_debounce: Duration::from_millis(300),
            storage_dir: PathBuf::from(".inkcartridges"),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a required absolute URL. A trailing slash is added so joins keep the path.
fn get_url(key: &str) -> Result<Url, ConfigError> {
    let raw = get_required_env(key)?;
    parse_base_url(&raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e))
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn get_parsed_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Parse a base URL, requiring http(s) and normalizing the trailing slash.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url, String> {
    let mut url = Url::parse(raw.trim()).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
