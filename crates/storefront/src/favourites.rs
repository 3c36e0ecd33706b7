//! Favourites (wishlist).
//!
//! Guests keep their list in local storage; signed-in customers keep it on
//! the server. Changes are applied locally first and rolled back if the
//! server refuses them. On sign-in the guest list is pushed through the sync
//! endpoint and the local copy is dropped.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use inkcartridges_core::ProductId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::catalog::Product;
use crate::error::{ApiError, Result};
use crate::notify::{Notifier, Toast};
use crate::storage::{Storage, StorageExt, keys};

/// A favourited product. camelCase because it is also the local storage format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavouriteItem {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
}

impl From<&Product> for FavouriteItem {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.clone(),
            name: product.name.clone(),
            price: Some(product.price),
            image: product.image_url.clone(),
            sku: Some(product.sku.clone()),
        }
    }
}

/// Server-side favourites for the signed-in customer.
pub trait FavouritesBackend: Send + Sync {
    /// `GET /api/user/favourites`
    fn list_favourites(&self) -> impl Future<Output = Result<Vec<FavouriteItem>>> + Send;

    /// `POST /api/user/favourites`
    fn add_favourite(&self, product_id: &ProductId) -> impl Future<Output = Result<()>> + Send;

    /// `DELETE /api/user/favourites/{id}`
    fn remove_favourite(&self, product_id: &ProductId)
    -> impl Future<Output = Result<()>> + Send;

    /// `POST /api/user/favourites/sync`: union the given ids into the
    /// account list and return the result.
    fn sync_favourites(
        &self,
        product_ids: &[ProductId],
    ) -> impl Future<Output = Result<Vec<FavouriteItem>>> + Send;
}

#[derive(Debug, Default)]
struct FavouritesState {
    items: Vec<FavouriteItem>,
    signed_in: bool,
}

/// The favourites list.
pub struct Favourites<B> {
    backend: Arc<B>,
    storage: Arc<dyn Storage>,
    notifier: Option<Arc<dyn Notifier>>,
    state: Mutex<FavouritesState>,
}

impl<B: FavouritesBackend> Favourites<B> {
    pub fn new(backend: Arc<B>, storage: Arc<dyn Storage>) -> Self {
        Self {
            backend,
            storage,
            notifier: None,
            state: Mutex::new(FavouritesState::default()),
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn items(&self) -> Vec<FavouriteItem> {
        self.lock().items.clone()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.lock().items.len()
    }

    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.lock().items.iter().any(|i| &i.id == id)
    }

    /// Load the list from the server (signed in) or local storage (guest).
    ///
    /// # Errors
    ///
    /// Returns the backend error for a signed-in customer; the list is
    /// left empty.
    #[instrument(skip(self))]
    pub async fn load(&self, signed_in: bool) -> Result<()> {
        let items = if signed_in {
            self.backend.list_favourites().await?
        } else {
            self.read_local()
        };
        let mut state = self.lock();
        state.items = items;
        state.signed_in = signed_in;
        Ok(())
    }

    /// Add a product. Adding one that is already present is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the backend error after removing the item again.
    #[instrument(skip(self, item), fields(product_id = %item.id))]
    pub async fn add(&self, item: FavouriteItem) -> Result<()> {
        if item.id.is_blank() {
            return Err(ApiError::Validation("Invalid product".to_string()));
        }
        let id = item.id.clone();
        let signed_in = {
            let mut state = self.lock();
            if state.items.iter().any(|i| i.id == id) {
                return Ok(());
            }
            state.items.push(item);
            self.persist(&state);
            state.signed_in
        };

        if signed_in && let Err(e) = self.backend.add_favourite(&id).await {
            {
                let mut state = self.lock();
                state.items.retain(|i| i.id != id);
                self.persist(&state);
            }
            warn!(error = %e, "Could not save favourite, rolled back");
            self.toast(Toast::error(e.user_message()));
            return Err(e);
        }
        self.toast(Toast::success("Added to favourites"));
        Ok(())
    }

    /// Remove a product. Removing one that is absent is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the backend error after restoring the item.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn remove(&self, id: &ProductId) -> Result<()> {
        let (removed, signed_in) = {
            let mut state = self.lock();
            let Some(index) = state.items.iter().position(|i| &i.id == id) else {
                return Ok(());
            };
            let removed = state.items.remove(index);
            self.persist(&state);
            ((index, removed), state.signed_in)
        };

        if signed_in && let Err(e) = self.backend.remove_favourite(id).await {
            {
                let mut state = self.lock();
                let (index, item) = removed;
                let at = index.min(state.items.len());
                state.items.insert(at, item);
                self.persist(&state);
            }
            warn!(error = %e, "Could not remove favourite, rolled back");
            self.toast(Toast::error(e.user_message()));
            return Err(e);
        }
        self.toast(Toast::info("Removed from favourites"));
        Ok(())
    }

    /// Add or remove. Returns whether the product is now a favourite.
    ///
    /// # Errors
    ///
    /// See [`Self::add`] and [`Self::remove`].
    pub async fn toggle(&self, item: FavouriteItem) -> Result<bool> {
        if self.contains(&item.id) {
            self.remove(&item.id).await?;
            Ok(false)
        } else {
            self.add(item).await?;
            Ok(true)
        }
    }

    /// Push the guest list to the account and switch to the server list.
    ///
    /// The local copy is dropped only after the server accepted it.
    #[instrument(skip(self))]
    pub async fn on_signed_in(&self) {
        let local = self.read_local();
        let result = if local.is_empty() {
            self.backend.list_favourites().await
        } else {
            let ids: Vec<ProductId> = local.iter().map(|i| i.id.clone()).collect();
            self.backend.sync_favourites(&ids).await
        };

        match result {
            Ok(items) => {
                if !local.is_empty()
                    && let Err(e) = self.storage.remove(keys::FAVOURITES)
                {
                    warn!(error = %e, "Could not clear local favourites");
                }
                info!(count = items.len(), synced = local.len(), "Favourites synced");
                let mut state = self.lock();
                state.items = items;
                state.signed_in = true;
            }
            Err(e) => {
                warn!(error = %e, "Favourites sync failed");
                self.toast(Toast::warning("We couldn't sync your favourites"));
                let mut state = self.lock();
                state.items = local;
                state.signed_in = true;
            }
        }
    }

    pub fn on_signed_out(&self) {
        {
            let mut state = self.lock();
            state.items.clear();
            state.signed_in = false;
        }
        if let Err(e) = self.storage.remove(keys::FAVOURITES) {
            warn!(error = %e, "Could not clear local favourites");
        }
    }

    fn read_local(&self) -> Vec<FavouriteItem> {
        match self.storage.load_json(keys::FAVOURITES) {
            Ok(items) => items.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Could not read local favourites");
                Vec::new()
            }
        }
    }

    fn persist(&self, state: &FavouritesState) {
        if state.signed_in {
            return;
        }
        if let Err(e) = self.storage.save_json(keys::FAVOURITES, &state.items) {
            warn!(error = %e, "Could not save favourites locally");
        }
    }

    fn toast(&self, toast: Toast) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(toast);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FavouritesState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::notify::ToastLog;
    use crate::storage::MemoryStorage;

    #[derive(Default)]
    struct FakeFavourites {
        server: Mutex<Vec<FavouriteItem>>,
        failing: AtomicBool,
        synced: Mutex<Vec<ProductId>>,
    }

    impl FakeFavourites {
        fn check(&self) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                Err(ApiError::business("Favourites are unavailable", None))
            } else {
                Ok(())
            }
        }
    }

    impl FavouritesBackend for FakeFavourites {
        async fn list_favourites(&self) -> Result<Vec<FavouriteItem>> {
            self.check()?;
            Ok(self.server.lock().unwrap().clone())
        }

        async fn add_favourite(&self, product_id: &ProductId) -> Result<()> {
            self.check()?;
            self.server.lock().unwrap().push(fav(product_id.as_str()));
            Ok(())
        }

        async fn remove_favourite(&self, product_id: &ProductId) -> Result<()> {
            self.check()?;
            self.server.lock().unwrap().retain(|i| &i.id != product_id);
            Ok(())
        }

        async fn sync_favourites(&self, product_ids: &[ProductId]) -> Result<Vec<FavouriteItem>> {
            self.check()?;
            self.synced.lock().unwrap().extend_from_slice(product_ids);
            let mut server = self.server.lock().unwrap();
            for id in product_ids {
                if !server.iter().any(|i| &i.id == id) {
                    server.push(fav(id.as_str()));
                }
            }
            Ok(server.clone())
        }
    }

    fn fav(id: &str) -> FavouriteItem {
        FavouriteItem {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            price: None,
            image: None,
            sku: None,
        }
    }

    fn setup() -> (
        Arc<FakeFavourites>,
        Arc<MemoryStorage>,
        Arc<ToastLog>,
        Favourites<FakeFavourites>,
    ) {
        let backend = Arc::new(FakeFavourites::default());
        let storage = Arc::new(MemoryStorage::new());
        let toasts = Arc::new(ToastLog::new());
        let favourites = Favourites::new(
            Arc::clone(&backend),
            Arc::clone(&storage) as Arc<dyn Storage>,
        )
        .with_notifier(Arc::clone(&toasts) as Arc<dyn Notifier>);
        (backend, storage, toasts, favourites)
    }

    #[tokio::test]
    async fn test_guest_toggle_persists_locally() {
        let (_, storage, _, favourites) = setup();
        favourites.load(false).await.unwrap();

        assert!(favourites.toggle(fav("a")).await.unwrap());
        let stored: Vec<FavouriteItem> = storage.load_json(keys::FAVOURITES).unwrap().unwrap();
        assert_eq!(stored.len(), 1);

        assert!(!favourites.toggle(fav("a")).await.unwrap());
        assert!(!favourites.contains(&ProductId::new("a")));
    }

    #[tokio::test]
    async fn test_failed_server_add_rolls_back() {
        let (backend, _, toasts, favourites) = setup();
        favourites.load(true).await.unwrap();
        backend.failing.store(true, Ordering::SeqCst);

        favourites.add(fav("a")).await.unwrap_err();

        assert_eq!(favourites.count(), 0);
        assert_eq!(toasts.drain()[0].message, "Favourites are unavailable");
    }

    #[tokio::test]
    async fn test_failed_server_remove_restores_position() {
        let (backend, _, _, favourites) = setup();
        favourites.load(true).await.unwrap();
        for id in ["a", "b", "c"] {
            favourites.add(fav(id)).await.unwrap();
        }
        backend.failing.store(true, Ordering::SeqCst);

        favourites.remove(&ProductId::new("b")).await.unwrap_err();

        let ids: Vec<_> = favourites
            .items()
            .into_iter()
            .map(|i| i.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_sign_in_syncs_guest_list_and_clears_local() {
        let (backend, storage, _, favourites) = setup();
        favourites.load(false).await.unwrap();
        favourites.add(fav("a")).await.unwrap();
        backend.server.lock().unwrap().push(fav("z"));

        favourites.on_signed_in().await;

        assert_eq!(*backend.synced.lock().unwrap(), vec![ProductId::new("a")]);
        assert_eq!(favourites.count(), 2);
        assert!(storage.get(keys::FAVOURITES).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_sync_keeps_local_copy() {
        let (backend, storage, toasts, favourites) = setup();
        favourites.load(false).await.unwrap();
        favourites.add(fav("a")).await.unwrap();
        backend.failing.store(true, Ordering::SeqCst);

        favourites.on_signed_in().await;

        assert!(favourites.contains(&ProductId::new("a")));
        assert!(storage.get(keys::FAVOURITES).unwrap().is_some());
        assert!(toasts.drain().iter().any(|t| t.kind == crate::notify::ToastKind::Warning));
    }

    #[tokio::test]
    async fn test_sign_out_clears() {
        let (_, _, _, favourites) = setup();
        favourites.load(true).await.unwrap();
        favourites.add(fav("a")).await.unwrap();
        favourites.on_signed_out();
        assert_eq!(favourites.count(), 0);
    }
}
