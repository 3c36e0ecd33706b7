//! Authentication error types.

use thiserror::Error;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] inkcartridges_core::EmailError),

    /// Wrong email or password.
    #[error("invalid login credentials")]
    InvalidCredentials,

    /// The account exists but its email is not confirmed.
    #[error("email not confirmed")]
    EmailNotConfirmed,

    /// Password rejected by the client-side policy.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// No session to act on.
    #[error("not signed in")]
    NoSession,

    /// Refresh token rejected; the session is gone.
    #[error("session expired")]
    SessionExpired,

    /// OAuth callback carried an error or was malformed.
    #[error("oauth callback error: {0}")]
    OAuth(String),

    /// Provider answered with an unexpected status.
    #[error("auth provider error: {status} - {message}")]
    Provider { status: u16, message: String },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response or token payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The provider URL could not be joined.
    #[error("invalid auth URL: {0}")]
    Url(#[from] url::ParseError),

    /// Persisting the session failed.
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}
