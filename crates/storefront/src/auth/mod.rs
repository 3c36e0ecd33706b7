//! Client for the managed auth provider.
//!
//! Speaks the provider's REST protocol under `{auth_url}/auth/v1`:
//! password and refresh-token grants, sign-up, logout and user lookup.
//! The current session lives in memory and, when storage is configured,
//! under [`keys::SESSION`] so a restart keeps the user signed in.
//!
//! Session changes are broadcast as [`AuthEvent`]s. The storefront state
//! listens to them to migrate the guest cart and favourites on sign-in and
//! to clear them on sign-out.

mod error;
mod session;

use std::sync::{Arc, PoisonError, RwLock};

use inkcartridges_core::Email;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::AuthConfig;
use crate::storage::{Storage, StorageExt, keys};

pub use error::AuthError;
pub use session::{AuthUser, Session};
use session::{StoredSession, TokenResponse};

/// Minimum password length accepted at sign-up.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Capacity of the auth event channel.
const EVENT_CAPACITY: usize = 16;

/// Session lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(AuthUser),
    SignedOut,
    TokenRefreshed,
    UserUpdated(AuthUser),
}

/// Result of a sign-up.
#[derive(Debug)]
pub enum SignUpOutcome {
    /// The provider signed the user straight in.
    Confirmed(AuthUser),
    /// A confirmation email was sent; no session yet.
    ConfirmationSent,
}

/// Error body shapes the provider uses.
#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Auth provider client. Cheap to clone.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<AuthInner>,
}

struct AuthInner {
    http: reqwest::Client,
    endpoint: Url,
    anon_key: SecretString,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
    /// Serializes refreshes so concurrent 401s trigger one token grant.
    refresh_lock: Mutex<()>,
    storage: Option<Arc<dyn Storage>>,
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("signed_in", &self.is_signed_in())
            .finish_non_exhaustive()
    }
}

impl AuthClient {
    /// Create a client. Nothing is sent until a method is called.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Url` if the provider URL cannot be extended.
    pub fn new(
        http: reqwest::Client,
        config: &AuthConfig,
        storage: Option<Arc<dyn Storage>>,
    ) -> Result<Self, AuthError> {
        let mut base = config.url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join("auth/v1/")?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(AuthInner {
                http,
                endpoint,
                anon_key: config.anon_key.clone(),
                session: RwLock::new(None),
                events,
                refresh_lock: Mutex::new(()),
                storage,
            }),
        })
    }

    /// Subscribe to session changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    /// Current bearer token, if signed in.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.read_session()
            .as_ref()
            .map(|s| s.access_token.expose_secret().to_string())
    }

    /// Currently signed-in user.
    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        self.read_session().as_ref().map(|s| s.user.clone())
    }

    /// Whether a session is held.
    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.read_session().is_some()
    }

    /// Load a persisted session, refreshing it if the access token expired.
    ///
    /// Does not emit [`AuthEvent::SignedIn`]: a restored session is the
    /// starting state, not a transition.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails. A stale session that cannot be
    /// refreshed is discarded and reported as `Ok(None)`.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<Option<AuthUser>, AuthError> {
        let Some(storage) = &self.inner.storage else {
            return Ok(None);
        };
        let Some(stored) = storage.load_json::<StoredSession>(keys::SESSION)? else {
            return Ok(None);
        };
        let session = Session::from(stored);
        let expired = session.is_expired();
        let can_refresh = session.can_refresh();
        *self.write_session() = Some(session);

        if expired {
            if !can_refresh {
                self.discard_session()?;
                return Ok(None);
            }
            debug!("Stored session expired, refreshing");
            match self.refresh().await {
                Ok(()) => {}
                Err(AuthError::SessionExpired) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        Ok(self.current_user())
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials`, `EmailNotConfirmed`, or a transport error.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthUser, AuthError> {
        let email = Email::parse(email)?;
        let response = self
            .request(reqwest::Method::POST, "token?grant_type=password")?
            .json(&serde_json::json!({
                "email": email.as_str(),
                "password": password.expose_secret(),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }
        let token: TokenResponse = decode(response).await?;
        let session = token.into_session();
        let user = session.user.clone();
        self.install_session(session)?;
        info!(user_id = %user.id, "Signed in");
        self.emit(AuthEvent::SignedIn(user.clone()));
        Ok(user)
    }

    /// Register a new account.
    ///
    /// # Errors
    ///
    /// Returns `WeakPassword` before sending if the password is too short,
    /// or the provider's rejection.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<SignUpOutcome, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password.expose_secret())?;

        let response = self
            .request(reqwest::Method::POST, "signup")?
            .json(&serde_json::json!({
                "email": email.as_str(),
                "password": password.expose_secret(),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }
        let body: serde_json::Value = decode(response).await?;
        if body.get("access_token").is_none() {
            info!("Sign-up pending email confirmation");
            return Ok(SignUpOutcome::ConfirmationSent);
        }

        let token: TokenResponse =
            serde_json::from_value(body).map_err(|e| AuthError::Decode(e.to_string()))?;
        let session = token.into_session();
        let user = session.user.clone();
        self.install_session(session)?;
        self.emit(AuthEvent::SignedIn(user.clone()));
        Ok(SignUpOutcome::Confirmed(user))
    }

    /// Complete an OAuth redirect from the URL fragment.
    ///
    /// # Errors
    ///
    /// Returns `OAuth` if the fragment carries an error or lacks tokens.
    pub fn process_oauth_callback(&self, fragment: &str) -> Result<AuthUser, AuthError> {
        let session = session::session_from_fragment(fragment)?;
        let user = session.user.clone();
        self.install_session(session)?;
        info!(user_id = %user.id, "Signed in via OAuth");
        self.emit(AuthEvent::SignedIn(user.clone()));
        Ok(user)
    }

    /// Exchange the refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns `NoSession` without a session and `SessionExpired` if the
    /// provider rejects the refresh token (the session is then cleared).
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let _guard = self.inner.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Refresh after the backend rejected `used_token`.
    ///
    /// If another task already replaced that token while this one waited
    /// for the lock, no second grant is made.
    ///
    /// # Errors
    ///
    /// Same as [`Self::refresh`].
    pub async fn refresh_after_unauthorized(&self, used_token: &str) -> Result<(), AuthError> {
        let _guard = self.inner.refresh_lock.lock().await;
        match self.access_token() {
            Some(current) if current != used_token => {
                debug!("Token already refreshed by another request");
                Ok(())
            }
            Some(_) => self.refresh_locked().await,
            None => Err(AuthError::NoSession),
        }
    }

    #[instrument(skip(self))]
    async fn refresh_locked(&self) -> Result<(), AuthError> {
        let refresh_token = self
            .read_session()
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or(AuthError::NoSession)?;

        let response = self
            .request(reqwest::Method::POST, "token?grant_type=refresh_token")?
            .json(&serde_json::json!({
                "refresh_token": refresh_token.expose_secret(),
            }))
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            let err = provider_error(response).await;
            warn!(error = %err, "Refresh token rejected, clearing session");
            self.discard_session()?;
            self.emit(AuthEvent::SignedOut);
            return Err(AuthError::SessionExpired);
        }
        if !status.is_success() {
            return Err(provider_error(response).await);
        }

        let token: TokenResponse = decode(response).await?;
        self.install_session(token.into_session())?;
        debug!("Access token refreshed");
        self.emit(AuthEvent::TokenRefreshed);
        Ok(())
    }

    /// Sign out. The provider is told on a best-effort basis; the local
    /// session is always cleared.
    ///
    /// # Errors
    ///
    /// Returns an error only if clearing the stored session fails.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(token) = self.access_token() {
            let result = match self.request(reqwest::Method::POST, "logout") {
                Ok(request) => request.bearer_auth(token).send().await.map_err(AuthError::from),
                Err(e) => Err(e),
            };
            match result {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "Provider logout failed");
                }
                Err(e) => warn!(error = %e, "Provider logout failed"),
                Ok(_) => {}
            }
        }
        self.discard_session()?;
        info!("Signed out");
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    /// Fetch the user record, updating the held session.
    ///
    /// # Errors
    ///
    /// Returns `NoSession` when signed out or the provider's error.
    pub async fn get_user(&self) -> Result<AuthUser, AuthError> {
        let token = self.access_token().ok_or(AuthError::NoSession)?;
        let response = self
            .request(reqwest::Method::GET, "user")?
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }
        let user: AuthUser = decode(response).await?;

        let changed = {
            let mut session = self.write_session();
            match session.as_mut() {
                Some(s) if s.user != user => {
                    s.user = user.clone();
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.persist()?;
            self.emit(AuthEvent::UserUpdated(user.clone()));
        }
        Ok(user)
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, AuthError> {
        let url = self.inner.endpoint.join(path)?;
        Ok(self
            .inner
            .http
            .request(method, url)
            .header("apikey", self.inner.anon_key.expose_secret()))
    }

    fn install_session(&self, session: Session) -> Result<(), AuthError> {
        *self.write_session() = Some(session);
        self.persist()
    }

    fn persist(&self) -> Result<(), AuthError> {
        let Some(storage) = &self.inner.storage else {
            return Ok(());
        };
        let stored = self.read_session().as_ref().map(Session::to_stored);
        match stored {
            Some(stored) => storage.save_json(keys::SESSION, &stored)?,
            None => storage.remove(keys::SESSION)?,
        }
        Ok(())
    }

    fn discard_session(&self) -> Result<(), AuthError> {
        *self.write_session() = None;
        self.persist()
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn read_session(&self) -> std::sync::RwLockReadGuard<'_, Option<Session>> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_session(&self) -> std::sync::RwLockWriteGuard<'_, Option<Session>> {
        self.inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Client-side password policy applied before sign-up.
///
/// # Errors
///
/// Returns `WeakPassword` describing the first rule broken.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if !password.chars().any(char::is_alphabetic) || !password.chars().any(|c| c.is_ascii_digit())
    {
        return Err(AuthError::WeakPassword(
            "must contain a letter and a number".to_string(),
        ));
    }
    Ok(())
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, AuthError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| AuthError::Decode(e.to_string()))
}

async fn provider_error(response: reqwest::Response) -> AuthError {
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    classify_error(status, &text)
}

/// Map a provider error response to an [`AuthError`].
fn classify_error(status: u16, text: &str) -> AuthError {
    let body: ProviderErrorBody = serde_json::from_str(text).unwrap_or_default();

    let code = body.error_code.as_deref().or(body.error.as_deref());
    let message = body
        .error_description
        .or(body.msg)
        .or(body.message)
        .or(body.error.clone())
        .unwrap_or_else(|| text.to_string());

    match code {
        Some("invalid_credentials") => return AuthError::InvalidCredentials,
        Some("email_not_confirmed") => return AuthError::EmailNotConfirmed,
        Some("weak_password") => return AuthError::WeakPassword(message),
        _ => {}
    }

    let lower = message.to_lowercase();
    if lower.contains("invalid login credentials") {
        AuthError::InvalidCredentials
    } else if lower.contains("email not confirmed") {
        AuthError::EmailNotConfirmed
    } else {
        AuthError::Provider { status, message }
    }
}
