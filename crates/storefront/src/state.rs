//! Application state: one place that owns every storefront component and
//! keeps them in step with the auth session.

use std::sync::{Arc, Mutex, PoisonError};

use secrecy::SecretString;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, instrument, warn};

use crate::api::{ApiClient, build_http_client};
use crate::auth::{AuthClient, AuthError, AuthEvent, AuthUser, SignUpOutcome};
use crate::cart::Cart;
use crate::config::StorefrontConfig;
use crate::favourites::Favourites;
use crate::ink_finder::InkFinder;
use crate::notify::{CartObserver, Notifier, Toast};
use crate::search::Autocomplete;
use crate::storage::{FileStorage, Storage, StorageError};

/// Error starting the storefront.
#[derive(Debug, thiserror::Error)]
pub enum StorefrontError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

/// The storefront runtime.
///
/// Cheaply cloneable via `Arc`. Auth events (sign-in, sign-out, and a
/// sign-out caused by an expired session) are applied by
/// [`Self::pump_auth_events`], which the sign-in and sign-out helpers call.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: StorefrontConfig,
    api: ApiClient,
    auth: AuthClient,
    cart: Cart<ApiClient>,
    favourites: Favourites<ApiClient>,
    ink_finder: InkFinder<ApiClient>,
    autocomplete: Autocomplete<ApiClient>,
    notifier: Option<Arc<dyn Notifier>>,
    auth_events: Mutex<broadcast::Receiver<AuthEvent>>,
}

impl Storefront {
    /// Wire up every component over one HTTP client and one storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the auth URL
    /// is unusable.
    pub fn new(
        config: StorefrontConfig,
        storage: Arc<dyn Storage>,
        notifier: Option<Arc<dyn Notifier>>,
        observer: Option<Arc<dyn CartObserver>>,
    ) -> Result<Self, StorefrontError> {
        let http = build_http_client(&config)?;
        let auth = AuthClient::new(http.clone(), &config.auth, Some(Arc::clone(&storage)))?;
        let auth_events = Mutex::new(auth.subscribe());
        let api = ApiClient::new(http, config.api_base_url.clone(), Some(auth.clone()));
        let shared = Arc::new(api.clone());

        let mut cart = Cart::new(Arc::clone(&shared), Arc::clone(&storage), config.cart);
        let mut favourites = Favourites::new(Arc::clone(&shared), Arc::clone(&storage));
        if let Some(notifier) = &notifier {
            cart = cart.with_notifier(Arc::clone(notifier));
            favourites = favourites.with_notifier(Arc::clone(notifier));
        }
        if let Some(observer) = observer {
            cart = cart.with_observer(observer);
        }
        let ink_finder = InkFinder::new(Arc::clone(&shared), storage);
        let autocomplete = Autocomplete::new(shared, config.search_debounce);

        Ok(Self {
            inner: Arc::new(StorefrontInner {
                config,
                api,
                auth,
                cart,
                favourites,
                ink_finder,
                autocomplete,
                notifier,
                auth_events,
            }),
        })
    }

    /// Build with file-backed storage under `config.storage_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory cannot be created.
    pub fn from_config(
        config: StorefrontConfig,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Result<Self, StorefrontError> {
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(&config.storage_dir)?);
        Self::new(config, storage, notifier, None)
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    #[must_use]
    pub fn auth(&self) -> &AuthClient {
        &self.inner.auth
    }

    #[must_use]
    pub fn cart(&self) -> &Cart<ApiClient> {
        &self.inner.cart
    }

    #[must_use]
    pub fn favourites(&self) -> &Favourites<ApiClient> {
        &self.inner.favourites
    }

    #[must_use]
    pub fn ink_finder(&self) -> &InkFinder<ApiClient> {
        &self.inner.ink_finder
    }

    #[must_use]
    pub fn autocomplete(&self) -> &Autocomplete<ApiClient> {
        &self.inner.autocomplete
    }

    /// Restore the saved session and load the cart and favourites.
    ///
    /// Returns the signed-in user, if any. Nothing here is fatal: a broken
    /// session is dropped and the storefront starts as a guest.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Option<AuthUser> {
        let user = match self.inner.auth.restore().await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Could not restore session");
                None
            }
        };
        // Restoring never counts as a fresh sign-in.
        self.drain_events();

        let signed_in = user.is_some();
        self.inner.cart.load(signed_in).await;
        if let Err(e) = self.inner.favourites.load(signed_in).await {
            warn!(error = %e, "Could not load favourites");
        }
        info!(signed_in, "Storefront started");
        user
    }

    /// Sign in with email and password, then migrate the guest state.
    ///
    /// # Errors
    ///
    /// Returns the auth provider's error; nothing is migrated.
    pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<AuthUser, AuthError> {
        let user = self.inner.auth.sign_in_with_password(email, password).await?;
        self.pump_auth_events().await;
        Ok(user)
    }

    /// Register a new account. If the provider signs the user straight in,
    /// the guest state is migrated as for [`Self::sign_in`].
    ///
    /// # Errors
    ///
    /// Returns the auth provider's or password policy's error.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<SignUpOutcome, AuthError> {
        let outcome = self.inner.auth.sign_up(email, password).await?;
        self.pump_auth_events().await;
        Ok(outcome)
    }

    /// Finish an OAuth redirect from its URL fragment.
    ///
    /// # Errors
    ///
    /// Returns the provider's error from the fragment.
    pub async fn complete_oauth(&self, fragment: &str) -> Result<AuthUser, AuthError> {
        let user = self.inner.auth.process_oauth_callback(fragment)?;
        self.pump_auth_events().await;
        Ok(user)
    }

    /// Sign out and clear the customer's cart and favourites locally.
    pub async fn sign_out(&self) {
        if let Err(e) = self.inner.auth.sign_out().await {
            warn!(error = %e, "Sign-out request failed");
        }
        self.pump_auth_events().await;
    }

    /// Apply every auth event emitted since the last call.
    pub async fn pump_auth_events(&self) {
        for event in self.drain_events() {
            self.handle_auth_event(&event).await;
        }
    }

    /// Keep the components in step with one auth event.
    #[instrument(skip(self, event))]
    pub async fn handle_auth_event(&self, event: &AuthEvent) {
        match event {
            AuthEvent::SignedIn(user) => {
                info!(user_id = %user.id, "Applying sign-in");
                self.inner.cart.on_signed_in().await;
                self.inner.favourites.on_signed_in().await;
                self.sync_account().await;
            }
            AuthEvent::SignedOut => {
                info!("Applying sign-out");
                self.inner.cart.on_signed_out();
                self.inner.favourites.on_signed_out();
            }
            AuthEvent::TokenRefreshed => debug!("Session refreshed"),
            AuthEvent::UserUpdated(user) => debug!(user_id = %user.id, "User updated"),
        }
    }

    async fn sync_account(&self) {
        match self.inner.api.sync_account().await {
            Ok(()) => debug!("Account synced"),
            Err(e) if e.is_email_not_verified() => {
                self.toast(Toast::info(
                    "Please verify your email address. Check your inbox for the link.",
                ));
            }
            Err(e) => warn!(error = %e, "Account sync failed"),
        }
    }

    fn drain_events(&self) -> Vec<AuthEvent> {
        let mut receiver = self
            .inner
            .auth_events
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut events = Vec::new();
        loop {
            match receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Auth events dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        events
    }

    fn toast(&self, toast: Toast) {
        if let Some(notifier) = &self.inner.notifier {
            notifier.notify(toast);
        }
    }
}
