//! Error types for talking to the backend.
//!
//! Every failure the API client can produce is an [`ApiError`]. The
//! taxonomy mirrors how the storefront reacts to it:
//!
//! - transport failures: logged, local state rolled back, toast shown
//! - business errors (`{success:false}`): message surfaced verbatim, no retry
//! - session expiry: one silent refresh-and-retry, then `Unauthorized`
//! - validation errors: raised before any request is sent

use inkcartridges_core::ErrorCode;
use thiserror::Error;

/// Errors returned by the backend API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered `{success: false}`.
    #[error("{message}")]
    Business {
        status: u16,
        message: String,
        code: Option<ErrorCode>,
        details: Option<serde_json::Value>,
    },

    /// Non-envelope error response (proxy error page, empty body, ...).
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Refreshing the session after a 401 failed.
    #[error("Your session has expired. Please sign in again.")]
    SessionExpired,

    /// Still 401 after the single refresh-and-retry, or no session at all.
    #[error("Please sign in to continue")]
    Unauthorized,

    /// 429 from the backend. Not retried.
    #[error("Too many requests, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    /// The response body did not match the expected shape.
    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A path could not be joined onto the base URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Client-side validation failed; nothing was sent.
    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    /// Build a business error without an HTTP status (used by fakes and
    /// validation paths that mimic backend responses).
    pub fn business(message: impl Into<String>, code: Option<ErrorCode>) -> Self {
        Self::Business {
            status: 400,
            message: message.into(),
            code,
            details: None,
        }
    }

    /// Machine code, if the backend sent one.
    #[must_use]
    pub const fn code(&self) -> Option<&ErrorCode> {
        match self {
            Self::Business { code, .. } => code.as_ref(),
            _ => None,
        }
    }

    /// `EMAIL_NOT_VERIFIED` is a soft error: callers prompt for verification
    /// instead of treating it as a failure.
    #[must_use]
    pub const fn is_email_not_verified(&self) -> bool {
        matches!(self.code(), Some(ErrorCode::EmailNotVerified))
    }

    /// Whether the error came from the network rather than the backend.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Stock the backend reported as available when rejecting a quantity.
    ///
    /// Reads `available_quantity` (or `available`) from the error details.
    #[must_use]
    pub fn available_quantity(&self) -> Option<u32> {
        let Self::Business {
            details: Some(details),
            ..
        } = self
        else {
            return None;
        };
        details
            .get("available_quantity")
            .or_else(|| details.get("available"))
            .and_then(serde_json::Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }

    /// Text suitable for a toast.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(_) => {
                "We couldn't reach the server. Please check your connection.".to_string()
            }
            Self::Status { .. } | Self::Decode(_) | Self::Url(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            Self::RateLimited { .. } => {
                "You're doing that too quickly. Please wait a moment.".to_string()
            }
            Self::Business { .. }
            | Self::SessionExpired
            | Self::Unauthorized
            | Self::Validation(_) => self.to_string(),
        }
    }
}

/// Result type alias for `ApiError`.
pub type Result<T> = std::result::Result<T, ApiError>;
