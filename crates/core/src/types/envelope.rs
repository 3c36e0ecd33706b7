//! The response envelope every backend endpoint returns.
//!
//! ```json
//! { "success": false, "error": "Please verify your email", "code": "EMAIL_NOT_VERIFIED" }
//! ```

use serde::{Deserialize, Serialize};

/// `{success, data?, error?, code?}` wrapper around backend payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<ErrorCode>,
    /// Extra error context, e.g. `{"available_quantity": 3}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl<T> ApiEnvelope<T> {
    /// Successful envelope carrying `data`.
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
            details: None,
        }
    }

    /// Failed envelope with a message and optional machine code.
    pub fn fail(error: impl Into<String>, code: Option<ErrorCode>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            code,
            details: None,
        }
    }

    /// Attach error details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Machine-readable error codes the client reacts to.
///
/// Unknown codes are preserved verbatim so they can still be logged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    /// Soft error: the account exists but the email is not verified yet.
    EmailNotVerified,
    InsufficientStock,
    InvalidCoupon,
    RateLimited,
    Unauthorized,
    NotFound,
    ValidationFailed,
    Other(String),
}

impl ErrorCode {
    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            Self::InsufficientStock => "INSUFFICIENT_STOCK",
            Self::InvalidCoupon => "INVALID_COUPON",
            Self::RateLimited => "RATE_LIMITED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NotFound => "NOT_FOUND",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::Other(code) => code,
        }
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "EMAIL_NOT_VERIFIED" => Self::EmailNotVerified,
            "INSUFFICIENT_STOCK" => Self::InsufficientStock,
            "INVALID_COUPON" => Self::InvalidCoupon,
            "RATE_LIMITED" => Self::RateLimited,
            "UNAUTHORIZED" => Self::Unauthorized,
            "NOT_FOUND" => Self::NotFound,
            "VALIDATION_FAILED" => Self::ValidationFailed,
            _ => Self::Other(code),
        }
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.as_str().to_owned()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
