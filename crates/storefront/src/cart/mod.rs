//! Shopping cart: a local mirror of the server cart with optimistic updates.
//!
//! # Sync states
//!
//! ```text
//! Loading ──load(guest)──► GuestSynced | GuestLocal
//!    └─────load(auth)────► AuthSynced
//! GuestLocal | GuestSynced ──sign-in──► AuthSynced
//! AuthSynced ──sign-out──► GuestLocal
//! ```
//!
//! In the synced states every mutation is applied locally first, the server
//! summary is dropped, and the backend is called. Success re-fetches the
//! server cart; failure restores the pre-mutation line and shows a toast.
//! `GuestLocal` mutations stay local (and persisted) until the next load.
//!
//! Only the server summary is a pricing source. Checkout refuses to proceed
//! without one.
//!
//! # Ordering
//!
//! Quantity steppers go through [`Cart::set_quantity_debounced`]: clicks on
//! one line are coalesced for a fixed window and at most one update per
//! line is in flight. If the quantity moved while an update was in flight,
//! the sender re-sends the newest value once it returns. A fetched cart is
//! applied only if nothing changed locally since the fetch began and no
//! quantity change is still waiting to be sent, so a slow response cannot
//! overwrite a newer local state.

mod backend;
mod totals;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use inkcartridges_core::{AppliedCoupon, CartItem, CartValidation, ProductId, ServerCart, ServerSummary};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::config::CartSettings;
use crate::debounce::Debouncer;
use crate::error::ApiError;
use crate::notify::{CartObserver, Notifier, Toast};
use crate::storage::{Storage, StorageExt, keys};

pub use backend::CartBackend;
pub use totals::{Amount, CartTotals, VerifiedTotals};

/// Largest quantity accepted for a single line.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Where the cart's contents come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartSyncState {
    /// Initial state until [`Cart::load`] finishes.
    Loading,
    /// Guest cart that could not reach the server; lives in local storage.
    GuestLocal,
    /// Guest cart mirrored from the cookie-identified server cart.
    GuestSynced,
    /// Signed-in user's server cart. Never written to local storage.
    AuthSynced,
}

impl CartSyncState {
    /// Whether mutations are sent to the backend.
    #[must_use]
    pub const fn is_synced(self) -> bool {
        match self {
            Self::GuestSynced | Self::AuthSynced => true,
            Self::Loading | Self::GuestLocal => false,
        }
    }

    /// Whether items are mirrored into local storage.
    #[must_use]
    pub const fn persists_locally(self) -> bool {
        match self {
            Self::Loading | Self::GuestLocal | Self::GuestSynced => true,
            Self::AuthSynced => false,
        }
    }
}

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Rejected before any request was sent.
    #[error("{0}")]
    Validation(String),
    #[error("Item not in cart: {0}")]
    ItemNotFound(ProductId),
    /// The operation needs the server but the cart is local-only.
    #[error("Can't reach the store right now. Please try again.")]
    Offline,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Outcome of a debounced quantity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebouncedUpdate {
    /// This call sent the update; `quantity` is the last value the server accepted.
    Sent { quantity: u32 },
    /// A later call (or the in-flight sender) carries this change.
    Coalesced,
    /// The cart is local-only; nothing was sent.
    LocalOnly,
}

/// Why checkout cannot start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutBlock {
    EmptyCart,
    /// No server summary; a reload was started.
    PriceUnverified,
    /// The server found problems with the cart.
    Issues(Vec<String>),
}

/// Result of [`Cart::checkout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutDecision {
    Proceed(VerifiedTotals),
    Blocked(CheckoutBlock),
}

/// Point-in-time copy of the cart for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSnapshot {
    pub sync: CartSyncState,
    pub items: Vec<CartItem>,
    pub summary: Option<ServerSummary>,
    pub coupon: Option<AppliedCoupon>,
    pub totals: CartTotals,
}

impl CartSnapshot {
    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

struct CartState {
    sync: CartSyncState,
    items: Vec<CartItem>,
    summary: Option<ServerSummary>,
    coupon: Option<AppliedCoupon>,
    /// Bumped on every local change; fetched carts from an older epoch are dropped.
    epoch: u64,
    /// Lines with a debounced update in flight.
    in_flight: HashSet<ProductId>,
    /// Line state before the current burst of debounced changes.
    baselines: HashMap<ProductId, Option<CartItem>>,
}

/// What a failed mutation restores.
enum Rollback {
    Line {
        id: ProductId,
        previous: Option<CartItem>,
        index: usize,
    },
    All(Vec<CartItem>),
}

/// Pre-mutation state captured by [`Cart::begin`].
struct Pending {
    sync: CartSyncState,
    epoch: u64,
    summary: Option<ServerSummary>,
    coupon: Option<AppliedCoupon>,
}

/// The cart engine.
pub struct Cart<B> {
    backend: Arc<B>,
    storage: Arc<dyn Storage>,
    settings: CartSettings,
    observer: Option<Arc<dyn CartObserver>>,
    notifier: Option<Arc<dyn Notifier>>,
    state: Mutex<CartState>,
    debouncer: Debouncer<ProductId>,
}

impl<B: CartBackend> Cart<B> {
    /// Create a cart in `Loading`, showing the locally cached guest items
    /// until [`Self::load`] runs.
    pub fn new(backend: Arc<B>, storage: Arc<dyn Storage>, settings: CartSettings) -> Self {
        let items = read_local(storage.as_ref());
        Self {
            backend,
            storage,
            settings,
            observer: None,
            notifier: None,
            state: Mutex::new(CartState {
                sync: CartSyncState::Loading,
                items,
                summary: None,
                coupon: None,
                epoch: 0,
                in_flight: HashSet::new(),
                baselines: HashMap::new(),
            }),
            debouncer: Debouncer::new(settings.update_debounce),
        }
    }

    /// Register a re-render hook.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn CartObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Register a toast sink.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    // =========================================================================
    // Reads
    // =========================================================================

    #[must_use]
    pub fn sync_state(&self) -> CartSyncState {
        self.lock().sync
    }

    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.lock().items.clone()
    }

    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lock().items.iter().map(|i| i.quantity).sum()
    }

    /// The server's totals, if the cart is currently verified.
    #[must_use]
    pub fn summary(&self) -> Option<ServerSummary> {
        self.lock().summary
    }

    #[must_use]
    pub fn coupon(&self) -> Option<AppliedCoupon> {
        self.lock().coupon.clone()
    }

    /// Verified or estimated totals.
    #[must_use]
    pub fn totals(&self) -> CartTotals {
        let state = self.lock();
        CartTotals::compute(
            &state.items,
            state.summary.as_ref(),
            state.coupon.as_ref(),
            &self.settings,
        )
    }

    #[must_use]
    pub fn subtotal(&self) -> Amount {
        self.totals().subtotal
    }

    #[must_use]
    pub fn shipping(&self) -> Amount {
        self.totals().shipping
    }

    #[must_use]
    pub fn total(&self) -> Amount {
        self.totals().total
    }

    /// Free-shipping progress for the current subtotal.
    #[must_use]
    pub fn shipping_progress(&self) -> inkcartridges_core::format::ShippingProgress {
        self.totals().shipping_progress(&self.settings)
    }

    #[must_use]
    pub const fn settings(&self) -> &CartSettings {
        &self.settings
    }

    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        let state = self.lock();
        snapshot_of(&state, &self.settings)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Populate the cart from the server.
    ///
    /// A guest whose server cart is empty but who has locally cached items
    /// gets those items pushed to the server first. If the server is
    /// unreachable a guest keeps the cached items in `GuestLocal`.
    #[instrument(skip(self))]
    pub async fn load(&self, authenticated: bool) -> CartSyncState {
        let local = {
            let mut state = self.lock();
            state.sync = CartSyncState::Loading;
            state.epoch += 1;
            if authenticated {
                Vec::new()
            } else {
                state.items.clone()
            }
        };
        let local = if local.is_empty() && !authenticated {
            read_local(self.storage.as_ref())
        } else {
            local
        };

        let sync = if authenticated {
            match self.backend.fetch_cart().await {
                Ok(cart) => self.install(cart, CartSyncState::AuthSynced),
                Err(e) => {
                    error!(error = %e, "Failed to load cart");
                    self.toast(Toast::error(e.user_message()));
                    self.install_local(Vec::new(), CartSyncState::AuthSynced)
                }
            }
        } else {
            self.load_guest(local).await
        };

        info!(state = ?sync, items = self.item_count(), "Cart loaded");
        sync
    }

    async fn load_guest(&self, local: Vec<CartItem>) -> CartSyncState {
        let cart = match self.backend.fetch_cart().await {
            Ok(cart) => cart,
            Err(e) => {
                warn!(error = %e, "Cart server unreachable, using local cart");
                return self.install_local(local, CartSyncState::GuestLocal);
            }
        };

        if !(cart.is_empty() && !local.is_empty()) {
            return self.install(cart, CartSyncState::GuestSynced);
        }

        debug!(count = local.len(), "Pushing cached guest items to server");
        for item in &local {
            if let Err(e) = self.backend.add_item(&item.id, item.quantity).await {
                warn!(product_id = %item.id, error = %e, "Could not push cached item");
            }
        }
        match self.backend.fetch_cart().await {
            Ok(cart) => self.install(cart, CartSyncState::GuestSynced),
            Err(e) => {
                warn!(error = %e, "Cart server unreachable, using local cart");
                self.install_local(local, CartSyncState::GuestLocal)
            }
        }
    }

    /// Reload from the server. A local-only guest cart goes through the
    /// guest load path so cached items are not lost.
    ///
    /// # Errors
    ///
    /// Returns the fetch error for synced carts.
    pub async fn reload(&self) -> Result<(), CartError> {
        match self.sync_state() {
            CartSyncState::Loading | CartSyncState::GuestLocal => {
                let items = self.items();
                match self.load_guest(items).await {
                    CartSyncState::GuestLocal => Err(CartError::Offline),
                    _ => Ok(()),
                }
            }
            CartSyncState::GuestSynced | CartSyncState::AuthSynced => {
                self.refresh().await?;
                Ok(())
            }
        }
    }

    /// Move the guest cart into the signed-in user's cart.
    ///
    /// Items that never reached the server (`GuestLocal`) are added one by
    /// one; a server-side guest cart is folded in by the merge endpoint.
    /// The local cache is cleared either way.
    #[instrument(skip(self))]
    pub async fn on_signed_in(&self) {
        let (prior, local) = {
            let mut state = self.lock();
            let prior = state.sync;
            state.sync = CartSyncState::Loading;
            state.baselines.clear();
            state.epoch += 1;
            (prior, state.items.clone())
        };
        self.debouncer.cancel_all();

        if prior == CartSyncState::AuthSynced {
            debug!("Already signed in, refreshing cart");
        }

        let mut failed = 0usize;
        if matches!(prior, CartSyncState::GuestLocal | CartSyncState::Loading) {
            for item in &local {
                if let Err(e) = self.backend.add_item(&item.id, item.quantity).await {
                    warn!(product_id = %item.id, error = %e, "Could not migrate cart item");
                    failed += 1;
                }
            }
        }
        if prior != CartSyncState::AuthSynced
            && let Err(e) = self.backend.merge_guest_cart().await
        {
            warn!(error = %e, "Cart merge failed");
        }

        if let Err(e) = self.storage.remove(keys::CART) {
            warn!(error = %e, "Could not clear local cart");
        }

        match self.backend.fetch_cart().await {
            Ok(cart) => {
                self.install(cart, CartSyncState::AuthSynced);
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch cart after sign-in");
                self.install_local(local, CartSyncState::AuthSynced);
            }
        }

        if failed > 0 {
            self.toast(Toast::warning(format!(
                "{failed} item(s) could not be moved to your account cart"
            )));
        }
        info!(items = self.item_count(), "Cart migrated to account");
    }

    /// Forget everything, including the local cache.
    #[instrument(skip(self))]
    pub fn on_signed_out(&self) {
        self.debouncer.cancel_all();
        {
            let mut state = self.lock();
            state.items.clear();
            state.summary = None;
            state.coupon = None;
            state.in_flight.clear();
            state.baselines.clear();
            state.sync = CartSyncState::GuestLocal;
            state.epoch += 1;
        }
        if let Err(e) = self.storage.remove(keys::CART) {
            warn!(error = %e, "Could not clear local cart");
        }
        self.changed();
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add `item.quantity` units of a product, merging into an existing line.
    ///
    /// # Errors
    ///
    /// Returns `Validation` before any request for a blank id, a zero
    /// quantity, or a line total above the quantity cap or known stock.
    /// Otherwise the backend error after rolling back.
    #[instrument(skip(self, item), fields(product_id = %item.id, quantity = item.quantity))]
    pub async fn add_item(&self, item: CartItem) -> Result<(), CartError> {
        if item.id.is_blank() {
            return Err(CartError::Validation("Invalid product".to_string()));
        }
        if item.quantity == 0 {
            return Err(CartError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }
        self.check_addition(&item)?;

        let id = item.id.clone();
        let quantity = item.quantity;
        let name = item.name.clone();
        let (pending, rollback) = self.begin(|items| {
            let index = items.iter().position(|i| i.id == item.id);
            let previous = index.and_then(|i| items.get(i).cloned());
            match index.and_then(|i| items.get_mut(i)) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(item.quantity);
                }
                None => items.push(item),
            }
            Rollback::Line {
                id: id.clone(),
                previous,
                index: index.unwrap_or(items.len().saturating_sub(1)),
            }
        });

        if !pending.sync.is_synced() {
            self.toast(Toast::success(format!("{name} added to cart")));
            return Ok(());
        }
        match self.backend.add_item(&id, quantity).await {
            Ok(()) => {
                self.toast(Toast::success(format!("{name} added to cart")));
                self.refresh_after_mutation().await;
                Ok(())
            }
            Err(e) => Err(self.fail(pending, rollback, e).await),
        }
    }

    /// Set a line's quantity now. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `ItemNotFound`, `Validation` for quantities above known
    /// stock, or the backend error after rolling back.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn update_quantity(&self, id: &ProductId, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return self.remove_item(id).await;
        }
        self.check_quantity(id, quantity)?;
        self.forget_debounced(id);

        let (pending, rollback) = self.begin(|items| set_line_quantity(items, id, quantity));
        if !pending.sync.is_synced() {
            return Ok(());
        }
        match self.backend.update_item(id, quantity).await {
            Ok(()) => {
                self.refresh_after_mutation().await;
                Ok(())
            }
            Err(e) => Err(self.fail(pending, rollback, e).await),
        }
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `ItemNotFound` or the backend error after rolling back.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn remove_item(&self, id: &ProductId) -> Result<(), CartError> {
        if !self.lock().items.iter().any(|i| &i.id == id) {
            return Err(CartError::ItemNotFound(id.clone()));
        }
        self.forget_debounced(id);

        let (pending, rollback) = self.begin(|items| remove_line(items, id));
        if !pending.sync.is_synced() {
            return Ok(());
        }
        match self.backend.remove_item(id).await {
            Ok(()) => {
                self.refresh_after_mutation().await;
                Ok(())
            }
            Err(e) => Err(self.fail(pending, rollback, e).await),
        }
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns the backend error after restoring the lines.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), CartError> {
        self.debouncer.cancel_all();
        self.lock().baselines.clear();
        let (pending, rollback) = self.begin(|items| Rollback::All(std::mem::take(items)));
        if !pending.sync.is_synced() {
            return Ok(());
        }
        match self.backend.clear_cart().await {
            Ok(()) => {
                self.refresh_after_mutation().await;
                Ok(())
            }
            Err(e) => Err(self.fail(pending, rollback, e).await),
        }
    }

    /// Change a line's quantity now and send it after the debounce window.
    ///
    /// # Errors
    ///
    /// Returns `ItemNotFound`, `Validation`, or the backend error of the
    /// update this call sent (after rolling the line back).
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn set_quantity_debounced(
        &self,
        id: &ProductId,
        quantity: u32,
    ) -> Result<DebouncedUpdate, CartError> {
        if quantity == 0 {
            self.remove_item(id).await?;
            return Ok(DebouncedUpdate::Sent { quantity: 0 });
        }
        self.check_quantity(id, quantity)?;

        let sync = {
            let mut state = self.lock();
            let previous = state.items.iter().find(|i| &i.id == id).cloned();
            state.baselines.entry(id.clone()).or_insert(previous);
            set_line_quantity(&mut state.items, id, quantity);
            state.summary = None;
            state.epoch += 1;
            self.persist(&state);
            state.sync
        };
        self.changed();

        if !sync.is_synced() {
            self.lock().baselines.remove(id);
            return Ok(DebouncedUpdate::LocalOnly);
        }
        if !self.debouncer.settle(id.clone()).await {
            return Ok(DebouncedUpdate::Coalesced);
        }
        self.send_debounced(id).await
    }

    /// One more unit of a line, debounced.
    ///
    /// # Errors
    ///
    /// See [`Self::set_quantity_debounced`].
    pub async fn increment(&self, id: &ProductId) -> Result<DebouncedUpdate, CartError> {
        let current = self.line_quantity(id)?;
        self.set_quantity_debounced(id, current.saturating_add(1)).await
    }

    /// One less unit of a line, debounced. Never goes below one.
    ///
    /// # Errors
    ///
    /// See [`Self::set_quantity_debounced`].
    pub async fn decrement(&self, id: &ProductId) -> Result<DebouncedUpdate, CartError> {
        let current = self.line_quantity(id)?;
        self.set_quantity_debounced(id, current.saturating_sub(1).max(1))
            .await
    }

    async fn send_debounced(&self, id: &ProductId) -> Result<DebouncedUpdate, CartError> {
        let (mut quantity, mut baseline) = {
            let mut state = self.lock();
            if state.in_flight.contains(id) {
                // The in-flight sender re-sends the newest quantity.
                return Ok(DebouncedUpdate::Coalesced);
            }
            let Some(baseline) = state.baselines.remove(id) else {
                return Ok(DebouncedUpdate::Coalesced);
            };
            let Some(quantity) = state.items.iter().find(|i| &i.id == id).map(|i| i.quantity)
            else {
                return Ok(DebouncedUpdate::Coalesced);
            };
            state.in_flight.insert(id.clone());
            (quantity, baseline)
        };

        loop {
            debug!(product_id = %id, quantity, "Sending debounced quantity");
            if let Err(e) = self.backend.update_item(id, quantity).await {
                self.debouncer.cancel(id);
                {
                    let mut state = self.lock();
                    state.in_flight.remove(id);
                    state.baselines.remove(id);
                    restore_line(&mut state.items, id, baseline, None);
                    state.summary = None;
                    state.epoch += 1;
                    self.persist(&state);
                }
                self.changed();
                error!(product_id = %id, error = %e, "Quantity update failed, rolled back");
                self.toast(error_toast(&e));
                return Err(e.into());
            }

            let waiting = self.debouncer.is_pending(id);
            let resend = {
                let mut state = self.lock();
                let current = state.items.iter().find(|i| &i.id == id).cloned();
                match current {
                    Some(line) if line.quantity != quantity && !waiting => {
                        state.baselines.remove(id);
                        let newer = line.quantity;
                        baseline = Some(CartItem { quantity, ..line });
                        Some(newer)
                    }
                    _ => {
                        state.in_flight.remove(id);
                        if !waiting {
                            state.baselines.remove(id);
                        }
                        None
                    }
                }
            };
            match resend {
                Some(newer) => quantity = newer,
                None if waiting => {
                    // The waiting change sends and refreshes once it settles.
                    debug!(product_id = %id, "Newer quantity pending, skipping refresh");
                    return Ok(DebouncedUpdate::Sent { quantity });
                }
                None => break,
            }
        }

        self.refresh_after_mutation().await;
        Ok(DebouncedUpdate::Sent { quantity })
    }

    // =========================================================================
    // Coupons, validation, checkout
    // =========================================================================

    /// Apply a coupon. Totals come back from the server.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty code, `Offline` for a local-only
    /// cart, or the backend's rejection (toasted verbatim).
    #[instrument(skip(self))]
    pub async fn apply_coupon(&self, code: &str) -> Result<(), CartError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(CartError::Validation(
                "Please enter a coupon code".to_string(),
            ));
        }
        if !self.sync_state().is_synced() {
            return Err(CartError::Offline);
        }

        match self.backend.apply_coupon(code).await {
            Ok(()) => {
                self.refresh().await?;
                self.toast(Toast::success(format!("Coupon {code} applied")));
                Ok(())
            }
            Err(e) => {
                warn!(code, error = %e, "Coupon rejected");
                self.toast(Toast::error(e.user_message()));
                Err(e.into())
            }
        }
    }

    /// Remove the applied coupon.
    ///
    /// # Errors
    ///
    /// Returns `Offline` for a local-only cart or the backend error.
    #[instrument(skip(self))]
    pub async fn remove_coupon(&self) -> Result<(), CartError> {
        if !self.sync_state().is_synced() {
            return Err(CartError::Offline);
        }
        match self.backend.remove_coupon().await {
            Ok(()) => {
                self.refresh().await?;
                self.toast(Toast::info("Coupon removed"));
                Ok(())
            }
            Err(e) => {
                self.toast(Toast::error(e.user_message()));
                Err(e.into())
            }
        }
    }

    /// Ask the server whether the cart can be bought as is.
    ///
    /// # Errors
    ///
    /// Returns `Offline` for a local-only cart or the backend error.
    #[instrument(skip(self))]
    pub async fn validate_cart(&self) -> Result<CartValidation, CartError> {
        if !self.sync_state().is_synced() {
            return Err(CartError::Offline);
        }
        let validation = self.backend.validate_cart().await?;
        if !validation.valid {
            info!(issues = validation.issues.len(), "Cart validation found issues");
        }
        Ok(validation)
    }

    /// Decide whether checkout may start.
    ///
    /// Requires a server summary and a passing server validation. Without a
    /// summary a reload is started and checkout is blocked.
    ///
    /// # Errors
    ///
    /// Returns the validation request's error.
    #[instrument(skip(self))]
    pub async fn checkout(&self) -> Result<CheckoutDecision, CartError> {
        let (empty, summary) = {
            let state = self.lock();
            (state.items.is_empty(), state.summary)
        };
        if empty {
            return Ok(CheckoutDecision::Blocked(CheckoutBlock::EmptyCart));
        }
        if summary.is_none() {
            warn!("Checkout blocked: cart prices not verified, reloading");
            if let Err(e) = self.reload().await {
                warn!(error = %e, "Reload before checkout failed");
            }
            return Ok(CheckoutDecision::Blocked(CheckoutBlock::PriceUnverified));
        }

        let validation = self.validate_cart().await?;
        if !validation.valid {
            if let Err(e) = self.refresh().await {
                warn!(error = %e, "Reload after failed validation failed");
            }
            return Ok(CheckoutDecision::Blocked(CheckoutBlock::Issues(
                validation.messages(),
            )));
        }

        // Re-read: a mutation during validation drops the summary.
        Ok(self.lock().summary.as_ref().map_or(
            CheckoutDecision::Blocked(CheckoutBlock::PriceUnverified),
            |summary| CheckoutDecision::Proceed(VerifiedTotals::from_summary(summary)),
        ))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Apply a local change, drop the summary, persist and notify.
    fn begin(&self, change: impl FnOnce(&mut Vec<CartItem>) -> Rollback) -> (Pending, Rollback) {
        let (pending, rollback) = {
            let mut state = self.lock();
            let summary = state.summary.take();
            let coupon = state.coupon.clone();
            let rollback = change(&mut state.items);
            state.epoch += 1;
            self.persist(&state);
            let pending = Pending {
                sync: state.sync,
                epoch: state.epoch,
                summary,
                coupon,
            };
            (pending, rollback)
        };
        self.changed();
        (pending, rollback)
    }

    /// Undo a failed mutation and toast the reason.
    ///
    /// If other changes landed while the request was in flight, only the
    /// lines this mutation touched are put back, the summary is dropped and
    /// the cart is re-fetched.
    async fn fail(&self, pending: Pending, rollback: Rollback, error: ApiError) -> CartError {
        let untouched = {
            let mut state = self.lock();
            let untouched = state.epoch == pending.epoch;
            match rollback {
                Rollback::Line {
                    id,
                    previous,
                    index,
                } => restore_line(&mut state.items, &id, previous, Some(index)),
                Rollback::All(items) if untouched => state.items = items,
                Rollback::All(items) => restore_missing(&mut state.items, items),
            }
            if untouched {
                state.summary = pending.summary;
                state.coupon = pending.coupon;
            } else {
                state.summary = None;
            }
            state.epoch += 1;
            self.persist(&state);
            untouched
        };
        self.changed();
        error!(error = %error, "Cart update failed, rolled back");
        self.toast(error_toast(&error));
        if !untouched {
            self.refresh_after_mutation().await;
        }
        CartError::Api(error)
    }

    /// Fetch the server cart and apply it if nothing changed meanwhile.
    async fn refresh(&self) -> Result<bool, ApiError> {
        let started = self.lock().epoch;
        let cart = self.backend.fetch_cart().await?;

        let applied = {
            let mut state = self.lock();
            if state.epoch != started
                || !state.in_flight.is_empty()
                || !state.baselines.is_empty()
            {
                debug!("Discarding stale cart response");
                false
            } else {
                apply_server_cart(&mut state, cart);
                if state.sync == CartSyncState::GuestLocal {
                    state.sync = CartSyncState::GuestSynced;
                }
                self.persist(&state);
                true
            }
        };
        if applied {
            self.changed();
        }
        Ok(applied)
    }

    async fn refresh_after_mutation(&self) {
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Cart refresh failed, totals unverified");
        }
    }

    fn install(&self, cart: ServerCart, sync: CartSyncState) -> CartSyncState {
        {
            let mut state = self.lock();
            apply_server_cart(&mut state, cart);
            state.sync = sync;
            state.epoch += 1;
            self.persist(&state);
        }
        self.changed();
        sync
    }

    fn install_local(&self, items: Vec<CartItem>, sync: CartSyncState) -> CartSyncState {
        {
            let mut state = self.lock();
            state.items = items;
            state.summary = None;
            state.coupon = None;
            state.sync = sync;
            state.epoch += 1;
            self.persist(&state);
        }
        self.changed();
        sync
    }

    /// Drop a waiting debounced update; an immediate one supersedes it.
    fn forget_debounced(&self, id: &ProductId) {
        self.debouncer.cancel(id);
        self.lock().baselines.remove(id);
    }

    fn line_quantity(&self, id: &ProductId) -> Result<u32, CartError> {
        self.lock()
            .items
            .iter()
            .find(|i| &i.id == id)
            .map(|i| i.quantity)
            .ok_or_else(|| CartError::ItemNotFound(id.clone()))
    }

    fn check_quantity(&self, id: &ProductId, quantity: u32) -> Result<(), CartError> {
        let state = self.lock();
        let line = state
            .items
            .iter()
            .find(|i| &i.id == id)
            .ok_or_else(|| CartError::ItemNotFound(id.clone()))?;
        if quantity > MAX_LINE_QUANTITY {
            return Err(CartError::Validation(format!(
                "Maximum quantity is {MAX_LINE_QUANTITY}"
            )));
        }
        if let Some(stock) = line.stock_quantity
            && quantity > stock
        {
            return Err(CartError::Validation(format!("Only {stock} available")));
        }
        Ok(())
    }

    /// Limits for adding `item`, counting any units already in the cart.
    fn check_addition(&self, item: &CartItem) -> Result<(), CartError> {
        let state = self.lock();
        let existing = state.items.iter().find(|i| i.id == item.id);
        let total = existing.map_or(0, |i| i.quantity).saturating_add(item.quantity);
        if total > MAX_LINE_QUANTITY {
            return Err(CartError::Validation(format!(
                "Maximum quantity is {MAX_LINE_QUANTITY}"
            )));
        }
        let stock = existing
            .and_then(|i| i.stock_quantity)
            .or(item.stock_quantity);
        if let Some(stock) = stock
            && total > stock
        {
            return Err(CartError::Validation(format!("Only {stock} available")));
        }
        Ok(())
    }

    fn persist(&self, state: &CartState) {
        if !state.sync.persists_locally() {
            return;
        }
        if let Err(e) = self.storage.save_json(keys::CART, &state.items) {
            warn!(error = %e, "Could not save cart locally");
        }
    }

    fn changed(&self) {
        if let Some(observer) = &self.observer {
            observer.cart_changed(&self.snapshot());
        }
    }

    fn toast(&self, toast: Toast) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(toast);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn snapshot_of(state: &CartState, settings: &CartSettings) -> CartSnapshot {
    CartSnapshot {
        sync: state.sync,
        items: state.items.clone(),
        summary: state.summary,
        coupon: state.coupon.clone(),
        totals: CartTotals::compute(
            &state.items,
            state.summary.as_ref(),
            state.coupon.as_ref(),
            settings,
        ),
    }
}

fn apply_server_cart(state: &mut CartState, cart: ServerCart) {
    state.items = cart.items.into_iter().map(CartItem::from).collect();
    state.summary = cart.summary;
    state.coupon = cart.coupon;
}

fn set_line_quantity(items: &mut [CartItem], id: &ProductId, quantity: u32) -> Rollback {
    let index = items.iter().position(|i| &i.id == id).unwrap_or(0);
    let previous = items.get(index).filter(|i| &i.id == id).cloned();
    if let Some(line) = items.get_mut(index).filter(|i| &i.id == id) {
        line.quantity = quantity;
    }
    Rollback::Line {
        id: id.clone(),
        previous,
        index,
    }
}

fn remove_line(items: &mut Vec<CartItem>, id: &ProductId) -> Rollback {
    let position = items.iter().position(|i| &i.id == id);
    let previous = position.map(|index| items.remove(index));
    Rollback::Line {
        id: id.clone(),
        previous,
        index: position.unwrap_or(items.len()),
    }
}

/// Re-insert lines from `snapshot` that are no longer in `items`, keeping
/// the lines that changed since.
fn restore_missing(items: &mut Vec<CartItem>, snapshot: Vec<CartItem>) {
    for (index, line) in snapshot.into_iter().enumerate() {
        if !items.iter().any(|i| i.id == line.id) {
            let at = index.min(items.len());
            items.insert(at, line);
        }
    }
}

/// Put a line back the way it was: re-insert it, reset it, or drop it if it
/// did not exist before.
fn restore_line(
    items: &mut Vec<CartItem>,
    id: &ProductId,
    previous: Option<CartItem>,
    index: Option<usize>,
) {
    let position = items.iter().position(|i| &i.id == id);
    match (position, previous) {
        (Some(pos), Some(line)) => {
            if let Some(slot) = items.get_mut(pos) {
                *slot = line;
            }
        }
        (Some(pos), None) => {
            items.remove(pos);
        }
        (None, Some(line)) => {
            let at = index.unwrap_or(items.len()).min(items.len());
            items.insert(at, line);
        }
        (None, None) => {}
    }
}

fn read_local(storage: &dyn Storage) -> Vec<CartItem> {
    match storage.load_json::<Vec<CartItem>>(keys::CART) {
        Ok(items) => items.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "Could not read local cart");
            Vec::new()
        }
    }
}

fn error_toast(error: &ApiError) -> Toast {
    match error.available_quantity() {
        Some(available) => Toast::error(format!("Only {available} available")),
        None => Toast::error(error.user_message()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests;
