//! Backend REST API client.
//!
//! Every endpoint answers with the `{success, data?, error?, code?}`
//! envelope. This module turns that into `Result<T, ApiError>`:
//!
//! - attaches the bearer token of the current session, if any
//! - on a 401 with a token, refreshes the session once and retries the
//!   original request once; a second 401 is `ApiError::Unauthorized`
//! - on a 429 returns `ApiError::RateLimited` without retrying
//! - `{success: false}` becomes `ApiError::Business` with the message intact
//!
//! Guest carts are identified by a cookie, so the HTTP client keeps a
//! cookie store. Read-mostly catalog lookups are cached for 5 minutes.

mod account;
mod cache;
mod cart;
mod catalog;
mod forms;
mod printers;

use std::sync::Arc;
use std::time::Duration;

use inkcartridges_core::ApiEnvelope;
use moka::future::Cache;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};
use url::Url;
use uuid::Uuid;

use crate::auth::AuthClient;
use crate::config::StorefrontConfig;
use crate::error::{ApiError, Result};

pub use forms::{ContactMessage, MAX_MESSAGE_LENGTH};

use cache::{CacheKey, CacheValue};

/// Seconds to wait when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Longest body excerpt kept in errors and logs.
const BODY_EXCERPT_CHARS: usize = 200;

/// Build the shared HTTP client: cookie store for the guest cart cookie and
/// the configured connect timeout. No overall request timeout is applied.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_http_client(
    config: &StorefrontConfig,
) -> std::result::Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .cookie_store(true)
        .connect_timeout(config.connect_timeout)
        .user_agent(concat!("inkcartridges-storefront/", env!("CARGO_PKG_VERSION")))
        .build()
}

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the storefront backend. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    http: reqwest::Client,
    base_url: Url,
    auth: Option<AuthClient>,
    cache: Cache<CacheKey, CacheValue>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("auth", &self.inner.auth.is_some())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client sharing `http` (and its cookie store) with the caller.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: Url, auth: Option<AuthClient>) -> Self {
        let cache = Cache::builder()
            .max_capacity(500)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(ApiClientInner {
                http,
                base_url,
                auth,
                cache,
            }),
        }
    }

    /// The auth client used for bearer tokens, if any.
    #[must_use]
    pub fn auth(&self) -> Option<&AuthClient> {
        self.inner.auth.as_ref()
    }

    /// Drop every cached catalog lookup.
    pub fn invalidate_cache(&self) {
        self.inner.cache.invalidate_all();
    }

    /// Build an endpoint URL from path segments. Segments are percent-encoded,
    /// so ids may be passed as-is.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` if the base URL cannot carry a path.
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Validation("API base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Build an endpoint URL with query parameters.
    ///
    /// # Errors
    ///
    /// Same as [`Self::url`].
    pub fn url_with_query<K, V>(&self, segments: &[&str], query: &[(K, V)]) -> Result<Url>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut url = self.url(segments)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// `GET` and decode `data`.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        self.execute(Method::GET, url, None).await
    }

    /// `POST` a JSON body and decode `data`.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn post<T, B>(&self, url: Url, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        self.execute(Method::POST, url, Some(body)).await
    }

    /// `PUT` a JSON body and decode `data`.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn put<T, B>(&self, url: Url, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        self.execute(Method::PUT, url, Some(body)).await
    }

    /// `DELETE` and decode `data`.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn delete<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        self.execute(Method::DELETE, url, None).await
    }

    /// Send once, and once more after a session refresh if the first answer
    /// was 401.
    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<T> {
        let token = self.bearer_token();
        let mut response = self
            .dispatch(&method, &url, body.as_ref(), token.as_deref())
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let (Some(auth), Some(used)) = (&self.inner.auth, token) else {
                return Err(ApiError::Unauthorized);
            };
            debug!(path = url.path(), "401 from backend, refreshing session");
            if let Err(e) = auth.refresh_after_unauthorized(&used).await {
                warn!(error = %e, "Session refresh failed");
                return Err(ApiError::SessionExpired);
            }

            let fresh = self.bearer_token();
            response = self
                .dispatch(&method, &url, body.as_ref(), fresh.as_deref())
                .await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                warn!(path = url.path(), "Still unauthorized after refresh");
                return Err(ApiError::Unauthorized);
            }
        }

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(
                response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
            );
            warn!(
                path = url.path(),
                retry_after, "Rate limited by backend, not retrying"
            );
            return Err(ApiError::RateLimited { retry_after });
        }

        let text = response.text().await?;
        let result = interpret(status, &text);
        if let Err(e) = &result
            && !matches!(e, ApiError::Business { .. })
        {
            error!(
                status = %status,
                path = url.path(),
                body = %excerpt(&text),
                "Unexpected API response"
            );
        }
        result
    }

    async fn dispatch(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<reqwest::Response> {
        let request_id = Uuid::new_v4();
        let mut request = self
            .inner
            .http
            .request(method.clone(), url.clone())
            .header(ACCEPT, "application/json")
            .header("X-Request-Id", request_id.to_string());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(%method, path = url.path(), %request_id, "API request");
        Ok(request.send().await?)
    }

    fn bearer_token(&self) -> Option<String> {
        self.inner.auth.as_ref().and_then(AuthClient::access_token)
    }
}

/// Decode an envelope body into `T`.
fn interpret<T: DeserializeOwned>(status: StatusCode, text: &str) -> Result<T> {
    let envelope: ApiEnvelope<Value> = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => return Err(ApiError::Decode(e)),
        Err(_) => {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: excerpt(text),
            });
        }
    };

    if !envelope.success || !status.is_success() {
        return Err(ApiError::Business {
            status: status.as_u16(),
            message: envelope
                .error
                .unwrap_or_else(|| format!("Request failed with status {status}")),
            code: envelope.code,
            details: envelope.details,
        });
    }

    Ok(serde_json::from_value(envelope.data.unwrap_or(Value::Null))?)
}

fn parse_retry_after(header: Option<&str>) -> u64 {
    header
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

fn excerpt(text: &str) -> String {
    text.chars().take(BODY_EXCERPT_CHARS).collect()
}
