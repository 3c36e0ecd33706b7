//! Newsletter and contact form submissions.
//!
//! Both are validated locally first; an invalid form never reaches the network.

use inkcartridges_core::Email;
use serde::Serialize;
use serde::de::IgnoredAny;
use tracing::instrument;

use super::ApiClient;
use crate::error::{ApiError, Result};

/// Longest contact message accepted.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// A contact form submission.
#[derive(Debug, Clone, Serialize)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
}

impl ContactMessage {
    /// Check the form before sending.
    ///
    /// # Errors
    ///
    /// Returns `Validation` describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation("Please enter your name".to_string()));
        }
        Email::parse(&self.email)
            .map_err(|_| ApiError::Validation("Please enter a valid email address".to_string()))?;
        let length = self.message.trim().chars().count();
        if length == 0 {
            return Err(ApiError::Validation("Please enter a message".to_string()));
        }
        if length > MAX_MESSAGE_LENGTH {
            return Err(ApiError::Validation(format!(
                "Message must be {MAX_MESSAGE_LENGTH} characters or fewer"
            )));
        }
        Ok(())
    }
}

impl ApiClient {
    /// Subscribe an address to the newsletter.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed address before any request.
    #[instrument(skip(self))]
    pub async fn subscribe_newsletter(&self, email: &str) -> Result<()> {
        let email = Email::parse(email)
            .map_err(|_| ApiError::Validation("Please enter a valid email address".to_string()))?;
        let _: IgnoredAny = self
            .post(
                self.url(&["api", "newsletter", "subscribe"])?,
                &serde_json::json!({ "email": email.as_str() }),
            )
            .await?;
        Ok(())
    }

    /// Send a contact form.
    ///
    /// # Errors
    ///
    /// Returns `Validation` before any request if the form is incomplete.
    #[instrument(skip(self, message))]
    pub async fn send_contact(&self, message: &ContactMessage) -> Result<()> {
        message.validate()?;
        let _: IgnoredAny = self
            .post(self.url(&["api", "contact"])?, message)
            .await?;
        Ok(())
    }
}
