//! Session types and token payload handling.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use inkcartridges_core::UserId;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Seconds before expiry at which a token is treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// The signed-in user as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<String>,
}

impl AuthUser {
    /// Whether the provider has confirmed the user's email.
    #[must_use]
    pub const fn is_email_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }
}

/// An authenticated session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Bearer token for API requests.
    pub access_token: SecretString,
    /// Token used to obtain a new access token.
    pub refresh_token: SecretString,
    /// Unix timestamp when the access token expires.
    pub expires_at: i64,
    pub user: AuthUser,
}

impl Session {
    /// Whether the access token is expired (or within a minute of it).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.expires_at - EXPIRY_SKEW_SECS
    }

    /// Whether a refresh can be attempted.
    #[must_use]
    pub fn can_refresh(&self) -> bool {
        !self.refresh_token.expose_secret().is_empty()
    }

    pub(crate) fn to_stored(&self) -> StoredSession {
        StoredSession {
            access_token: self.access_token.expose_secret().to_string(),
            refresh_token: self.refresh_token.expose_secret().to_string(),
            expires_at: self.expires_at,
            user: self.user.clone(),
        }
    }
}

/// Plain form of a [`Session`] for local persistence.
#[derive(Serialize, Deserialize)]
pub(crate) struct StoredSession {
    access_token: String,
    refresh_token: String,
    expires_at: i64,
    user: AuthUser,
}

impl From<StoredSession> for Session {
    fn from(stored: StoredSession) -> Self {
        Self {
            access_token: SecretString::from(stored.access_token),
            refresh_token: SecretString::from(stored.refresh_token),
            expires_at: stored.expires_at,
            user: stored.user,
        }
    }
}

/// Token grant response from the provider.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Token lifetime in seconds.
    pub expires_in: i64,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl TokenResponse {
    pub(crate) fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| Utc::now().timestamp() + self.expires_in);
        Session {
            access_token: SecretString::from(self.access_token),
            refresh_token: SecretString::from(self.refresh_token),
            expires_at,
            user: self.user,
        }
    }
}

/// Claims read from an access token payload. The signature is not checked;
/// the backend does that. The client only needs who and until when.
#[derive(Debug, Deserialize)]
pub(crate) struct AccessTokenClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Decode the payload segment of a JWT.
pub(crate) fn decode_claims(token: &str) -> Result<AccessTokenClaims, AuthError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::Decode("access token is not a JWT".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::Decode(format!("token payload: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| AuthError::Decode(format!("token claims: {e}")))
}

/// Build a session from an OAuth redirect fragment
/// (`#access_token=..&refresh_token=..&expires_in=..&token_type=bearer`).
pub(crate) fn session_from_fragment(fragment: &str) -> Result<Session, AuthError> {
    let fragment = fragment.trim_start_matches('#');
    let mut access_token = None;
    let mut refresh_token = None;
    let mut expires_in = None;
    let mut expires_at = None;
    let mut error = None;

    for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "access_token" => access_token = Some(value.into_owned()),
            "refresh_token" => refresh_token = Some(value.into_owned()),
            "expires_in" => expires_in = value.parse::<i64>().ok(),
            "expires_at" => expires_at = value.parse::<i64>().ok(),
            "error_description" => error = Some(value.into_owned()),
            "error" if error.is_none() => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(AuthError::OAuth(error));
    }
    let access_token =
        access_token.ok_or_else(|| AuthError::OAuth("missing access_token".to_string()))?;
    let refresh_token =
        refresh_token.ok_or_else(|| AuthError::OAuth("missing refresh_token".to_string()))?;

    let claims = decode_claims(&access_token)?;
    let expires_at = expires_at
        .or(claims.exp)
        .or_else(|| expires_in.map(|secs| Utc::now().timestamp() + secs))
        .ok_or_else(|| AuthError::OAuth("missing token expiry".to_string()))?;

    Ok(Session {
        access_token: SecretString::from(access_token),
        refresh_token: SecretString::from(refresh_token),
        expires_at,
        user: AuthUser {
            id: UserId::new(claims.sub),
            email: claims.email,
            email_confirmed_at: None,
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    /// Build an unsigned JWT carrying the given claims.
    pub(crate) fn fake_jwt(claims: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.signature")
    }

    #[test]
    fn test_session_from_fragment() {
        let token = fake_jwt(&serde_json::json!({
            "sub": "user-1", "email": "jane@example.co.nz", "exp": 4_000_000_000_i64
        }));
        let fragment =
            format!("#access_token={token}&refresh_token=r1&expires_in=3600&token_type=bearer");
        let session = session_from_fragment(&fragment).unwrap();
        assert_eq!(session.user.id, UserId::new("user-1"));
        assert_eq!(session.user.email.as_deref(), Some("jane@example.co.nz"));
        assert_eq!(session.expires_at, 4_000_000_000);
        assert!(!session.is_expired());
    }

    #[test]
    fn test_fragment_error_is_reported() {
        let result = session_from_fragment("error=access_denied&error_description=User+cancelled");
        assert!(matches!(result, Err(AuthError::OAuth(msg)) if msg == "User cancelled"));
    }

    #[test]
    fn test_fragment_missing_token() {
        assert!(matches!(
            session_from_fragment("#refresh_token=r1"),
            Err(AuthError::OAuth(_))
        ));
    }

    #[test]
    fn test_session_expiry_skew() {
        let session = Session {
            access_token: SecretString::from("a"),
            refresh_token: SecretString::from("r"),
            expires_at: Utc::now().timestamp() + 30,
            user: AuthUser {
                id: UserId::new("u"),
                email: None,
                email_confirmed_at: None,
            },
        };
        assert!(session.is_expired());
        assert!(session.can_refresh());
    }
}
