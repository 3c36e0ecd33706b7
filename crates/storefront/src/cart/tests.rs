use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use inkcartridges_core::{CartIssue, ServerCartItem};
use rust_decimal::Decimal;
use serde_json::json;

use super::*;
use crate::notify::{ToastKind, ToastLog};
use crate::storage::MemoryStorage;

// =============================================================================
// Fake backend
// =============================================================================

/// In-memory cart server with a cookie guest cart and a user cart.
#[derive(Default)]
struct FakeBackend {
    prices: HashMap<ProductId, Decimal>,
    guest: Mutex<Vec<(ProductId, u32)>>,
    user: Mutex<Vec<(ProductId, u32)>>,
    authenticated: AtomicBool,
    offline: AtomicBool,
    /// Business error returned by every mutation while set.
    reject: Mutex<Option<(String, Option<serde_json::Value>)>>,
    issues: Mutex<Vec<CartIssue>>,
    fetches: AtomicUsize,
    adds: AtomicUsize,
    merges: AtomicUsize,
    updates: Mutex<Vec<u32>>,
    /// Response latency per endpoint.
    fetch_delay: Mutex<Duration>,
    update_delay: Mutex<Duration>,
    clear_delay: Mutex<Duration>,
    clear_fails: AtomicBool,
}

async fn latency(delay: &Mutex<Duration>) {
    let delay = *delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

impl FakeBackend {
    fn new() -> Self {
        let prices = [("ink-black", 2500), ("ink-cyan", 1999), ("toner", 9500)]
            .into_iter()
            .map(|(id, cents)| (ProductId::new(id), Decimal::new(cents, 2)))
            .collect();
        Self {
            prices,
            ..Self::default()
        }
    }

    fn lines(&self) -> std::sync::MutexGuard<'_, Vec<(ProductId, u32)>> {
        if self.authenticated.load(Ordering::SeqCst) {
            self.user.lock().unwrap()
        } else {
            self.guest.lock().unwrap()
        }
    }

    fn check(&self) -> Result<(), ApiError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        if let Some((message, details)) = self.reject.lock().unwrap().clone() {
            return Err(ApiError::Business {
                status: 400,
                message,
                code: None,
                details,
            });
        }
        Ok(())
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl CartBackend for FakeBackend {
    async fn fetch_cart(&self) -> Result<ServerCart, ApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        let lines = self.lines().clone();
        latency(&self.fetch_delay).await;
        let items: Vec<ServerCartItem> = lines
            .into_iter()
            .map(|(id, quantity)| ServerCartItem {
                name: format!("Product {id}"),
                unit_price: self.prices.get(&id).copied().unwrap_or(Decimal::ONE),
                product_id: id,
                quantity,
                image_url: None,
                sku: None,
                brand: None,
                color: None,
                in_stock: true,
                stock_quantity: None,
            })
            .collect();
        let subtotal: Decimal = items
            .iter()
            .map(|i| i.unit_price * Decimal::from(i.quantity))
            .sum();
        let summary = (!items.is_empty()).then(|| {
            let shipping = if subtotal >= Decimal::new(100, 0) {
                Decimal::ZERO
            } else {
                Decimal::new(599, 2)
            };
            ServerSummary {
                subtotal,
                shipping,
                discount: Decimal::ZERO,
                total: subtotal + shipping,
            }
        });
        Ok(ServerCart {
            items,
            summary,
            coupon: None,
        })
    }

    async fn add_item(&self, product_id: &ProductId, quantity: u32) -> Result<(), ApiError> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut lines = self.lines();
        match lines.iter_mut().find(|(id, _)| id == product_id) {
            Some(line) => line.1 += quantity,
            None => lines.push((product_id.clone(), quantity)),
        }
        Ok(())
    }

    async fn update_item(&self, product_id: &ProductId, quantity: u32) -> Result<(), ApiError> {
        self.updates.lock().unwrap().push(quantity);
        latency(&self.update_delay).await;
        self.check()?;
        if let Some(line) = self.lines().iter_mut().find(|(id, _)| id == product_id) {
            line.1 = quantity;
        }
        Ok(())
    }

    async fn remove_item(&self, product_id: &ProductId) -> Result<(), ApiError> {
        self.check()?;
        self.lines().retain(|(id, _)| id != product_id);
        Ok(())
    }

    async fn clear_cart(&self) -> Result<(), ApiError> {
        latency(&self.clear_delay).await;
        if self.clear_fails.load(Ordering::SeqCst) {
            return Err(ApiError::business("Could not clear cart", None));
        }
        self.check()?;
        self.lines().clear();
        Ok(())
    }

    async fn merge_guest_cart(&self) -> Result<(), ApiError> {
        self.merges.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let guest = std::mem::take(&mut *self.guest.lock().unwrap());
        let mut user = self.user.lock().unwrap();
        for (id, quantity) in guest {
            match user.iter_mut().find(|(existing, _)| *existing == id) {
                Some(line) => line.1 += quantity,
                None => user.push((id, quantity)),
            }
        }
        Ok(())
    }

    async fn apply_coupon(&self, code: &str) -> Result<(), ApiError> {
        self.check()?;
        if code == "SAVE10" {
            Ok(())
        } else {
            Err(ApiError::business("Coupon code is not valid", None))
        }
    }

    async fn remove_coupon(&self) -> Result<(), ApiError> {
        self.check()
    }

    async fn validate_cart(&self) -> Result<CartValidation, ApiError> {
        self.check()?;
        let issues = self.issues.lock().unwrap().clone();
        Ok(CartValidation {
            valid: issues.is_empty(),
            issues,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    backend: Arc<FakeBackend>,
    storage: Arc<MemoryStorage>,
    toasts: Arc<ToastLog>,
    cart: Arc<Cart<FakeBackend>>,
}

fn harness_with(backend: FakeBackend, storage: MemoryStorage) -> Harness {
    let backend = Arc::new(backend);
    let storage = Arc::new(storage);
    let toasts = Arc::new(ToastLog::new());
    let cart = Cart::new(
        Arc::clone(&backend),
        Arc::clone(&storage) as Arc<dyn Storage>,
        CartSettings::default(),
    )
    .with_notifier(Arc::clone(&toasts) as Arc<dyn Notifier>);
    Harness {
        backend,
        storage,
        toasts,
        cart: Arc::new(cart),
    }
}

fn harness() -> Harness {
    harness_with(FakeBackend::new(), MemoryStorage::new())
}

fn item(id: &str, price_cents: i64, quantity: u32) -> CartItem {
    CartItem {
        id: ProductId::new(id),
        name: format!("Product {id}"),
        price: Decimal::new(price_cents, 2),
        image: None,
        sku: None,
        brand: None,
        color: None,
        quantity,
        in_stock: true,
        stock_quantity: None,
    }
}

fn quantities(cart: &Cart<FakeBackend>) -> Vec<(String, u32)> {
    cart.items()
        .into_iter()
        .map(|i| (i.id.as_str().to_string(), i.quantity))
        .collect()
}

// =============================================================================
// Adding items
// =============================================================================

#[tokio::test]
async fn test_adding_same_product_merges_lines() {
    let h = harness();
    h.cart.load(false).await;

    h.cart.add_item(item("ink-black", 2500, 1)).await.unwrap();
    h.cart.add_item(item("ink-black", 2500, 2)).await.unwrap();

    assert_eq!(quantities(&h.cart), vec![("ink-black".to_string(), 3)]);
    assert_eq!(h.cart.item_count(), 3);
    assert!(h.cart.summary().is_some());
}

#[tokio::test]
async fn test_add_rejects_zero_quantity_without_request() {
    let h = harness();
    h.cart.load(false).await;

    let err = h.cart.add_item(item("ink-black", 2500, 0)).await.unwrap_err();
    assert!(matches!(err, CartError::Validation(_)));
    assert_eq!(h.backend.adds.load(Ordering::SeqCst), 0);
    assert!(h.cart.items().is_empty());
}

#[tokio::test]
async fn test_failed_add_removes_new_line_and_toasts_stock() {
    let h = harness();
    h.cart.load(false).await;
    *h.backend.reject.lock().unwrap() = Some((
        "Insufficient stock".to_string(),
        Some(json!({"available_quantity": 3})),
    ));

    let err = h.cart.add_item(item("toner", 9500, 5)).await.unwrap_err();
    assert!(matches!(err, CartError::Api(_)));
    assert!(h.cart.items().is_empty());

    let toasts = h.toasts.drain();
    let last = toasts.last().unwrap();
    assert_eq!(last.kind, ToastKind::Error);
    assert_eq!(last.message, "Only 3 available");
}

#[tokio::test]
async fn test_add_beyond_line_cap_is_rejected_without_request() {
    let h = harness();
    h.cart.load(false).await;
    h.cart.add_item(item("ink-black", 2500, 98)).await.unwrap();
    let adds = h.backend.adds.load(Ordering::SeqCst);

    let err = h.cart.add_item(item("ink-black", 2500, 2)).await.unwrap_err();
    assert_eq!(err.to_string(), "Maximum quantity is 99");
    let err = h.cart.add_item(item("toner", 9500, 100)).await.unwrap_err();
    assert!(matches!(err, CartError::Validation(_)));

    assert_eq!(h.backend.adds.load(Ordering::SeqCst), adds);
    assert_eq!(quantities(&h.cart), vec![("ink-black".to_string(), 98)]);
}

#[tokio::test]
async fn test_add_beyond_known_stock_is_rejected_without_request() {
    let h = harness();
    h.cart.load(false).await;
    let mut limited = item("ink-cyan", 1999, 4);
    limited.stock_quantity = Some(3);

    let err = h.cart.add_item(limited).await.unwrap_err();
    assert_eq!(err.to_string(), "Only 3 available");
    assert_eq!(h.backend.adds.load(Ordering::SeqCst), 0);
    assert!(h.cart.items().is_empty());
}

// =============================================================================
// Rollback
// =============================================================================

#[tokio::test]
async fn test_failed_update_rolls_back_quantity() {
    let h = harness();
    h.cart.load(false).await;
    h.cart.add_item(item("ink-black", 2500, 2)).await.unwrap();
    let summary_before = h.cart.summary();

    *h.backend.reject.lock().unwrap() = Some(("Out of stock".to_string(), None));
    let id = ProductId::new("ink-black");
    let err = h.cart.update_quantity(&id, 5).await.unwrap_err();

    assert!(matches!(err, CartError::Api(_)));
    assert_eq!(quantities(&h.cart), vec![("ink-black".to_string(), 2)]);
    assert_eq!(h.cart.summary(), summary_before);
    assert_eq!(h.toasts.drain().last().unwrap().message, "Out of stock");
}

#[tokio::test]
async fn test_failed_remove_restores_line_at_original_position() {
    let h = harness();
    h.cart.load(false).await;
    h.cart.add_item(item("ink-black", 2500, 1)).await.unwrap();
    h.cart.add_item(item("ink-cyan", 1999, 1)).await.unwrap();
    h.cart.add_item(item("toner", 9500, 1)).await.unwrap();

    *h.backend.reject.lock().unwrap() = Some(("Nope".to_string(), None));
    h.cart.remove_item(&ProductId::new("ink-cyan")).await.unwrap_err();

    let ids: Vec<_> = quantities(&h.cart).into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec!["ink-black", "ink-cyan", "toner"]);
}

#[test]
fn test_removing_a_missing_line_leaves_others_alone() {
    let mut items = vec![item("ink-black", 2500, 1), item("toner", 9500, 1)];
    let rollback = remove_line(&mut items, &ProductId::new("ink-cyan"));

    assert_eq!(items.len(), 2);
    assert!(matches!(rollback, Rollback::Line { previous: None, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_failed_clear_keeps_changes_made_while_it_was_in_flight() {
    let h = harness();
    h.cart.load(false).await;
    h.cart.add_item(item("ink-black", 2500, 1)).await.unwrap();
    *h.backend.clear_delay.lock().unwrap() = Duration::from_millis(1000);
    h.backend.clear_fails.store(true, Ordering::SeqCst);

    let (cleared, added) = tokio::join!(h.cart.clear(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.cart.add_item(item("ink-cyan", 1999, 1)).await
    });

    assert!(cleared.is_err());
    added.unwrap();
    let local: Vec<_> = quantities(&h.cart).into_iter().map(|(id, _)| id).collect();
    let server: Vec<_> = h
        .backend
        .guest
        .lock()
        .unwrap()
        .iter()
        .map(|(id, _)| id.as_str().to_string())
        .collect();
    assert_eq!(local, vec!["ink-black", "ink-cyan"]);
    assert_eq!(local, server);
    assert_eq!(h.cart.summary().unwrap().subtotal, Decimal::new(4499, 2));
}

#[tokio::test]
async fn test_update_unknown_line_is_not_found() {
    let h = harness();
    h.cart.load(false).await;
    let err = h
        .cart
        .update_quantity(&ProductId::new("missing"), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, CartError::ItemNotFound(_)));
}

#[tokio::test]
async fn test_quantity_above_known_stock_is_rejected_locally() {
    let h = harness();
    // Local-only so the fetched cart does not replace the stock figure.
    h.backend.offline.store(true, Ordering::SeqCst);
    h.cart.load(false).await;
    let mut limited = item("ink-black", 2500, 1);
    limited.stock_quantity = Some(2);
    h.cart.add_item(limited).await.unwrap();

    let err = h
        .cart
        .update_quantity(&ProductId::new("ink-black"), 3)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Only 2 available");
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn test_checkout_without_summary_is_blocked_and_reloads() {
    let h = harness();
    h.backend.offline.store(true, Ordering::SeqCst);
    h.cart.load(false).await;
    h.cart.add_item(item("ink-black", 2500, 2)).await.unwrap();
    assert_eq!(h.cart.sync_state(), CartSyncState::GuestLocal);
    assert!(!h.cart.totals().is_verified());

    let fetches = h.backend.fetch_count();
    let decision = h.cart.checkout().await.unwrap();

    assert_eq!(
        decision,
        CheckoutDecision::Blocked(CheckoutBlock::PriceUnverified)
    );
    assert_eq!(h.backend.fetch_count(), fetches + 1);
}

#[tokio::test]
async fn test_checkout_proceeds_with_server_totals() {
    let h = harness();
    h.cart.load(false).await;
    h.cart.add_item(item("ink-black", 2500, 2)).await.unwrap();

    match h.cart.checkout().await.unwrap() {
        CheckoutDecision::Proceed(totals) => {
            assert_eq!(totals.subtotal(), Decimal::new(50, 0));
            assert_eq!(totals.total(), Decimal::new(5599, 2));
        }
        other @ CheckoutDecision::Blocked(_) => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_checkout_reports_validation_issues() {
    let h = harness();
    h.cart.load(false).await;
    h.cart.add_item(item("ink-cyan", 1999, 1)).await.unwrap();
    h.backend.issues.lock().unwrap().push(CartIssue::OutOfStock {
        product_id: ProductId::new("ink-cyan"),
        name: "Cyan".to_string(),
    });

    let decision = h.cart.checkout().await.unwrap();
    assert_eq!(
        decision,
        CheckoutDecision::Blocked(CheckoutBlock::Issues(vec![
            "Cyan is out of stock".to_string()
        ]))
    );
}

#[tokio::test]
async fn test_checkout_empty_cart() {
    let h = harness();
    h.cart.load(false).await;
    assert_eq!(
        h.cart.checkout().await.unwrap(),
        CheckoutDecision::Blocked(CheckoutBlock::EmptyCart)
    );
}

// =============================================================================
// Debounced quantity changes
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_rapid_increments_send_one_update_with_final_quantity() {
    let h = harness();
    h.cart.load(false).await;
    h.cart.add_item(item("ink-black", 2500, 1)).await.unwrap();
    let id = ProductId::new("ink-black");

    let mut handles = Vec::new();
    for _ in 0..5 {
        let cart = Arc::clone(&h.cart);
        let id = id.clone();
        handles.push(tokio::spawn(async move { cart.increment(&id).await }));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let mut sent = Vec::new();
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            DebouncedUpdate::Sent { quantity } => sent.push(quantity),
            DebouncedUpdate::Coalesced => {}
            DebouncedUpdate::LocalOnly => panic!("cart should be synced"),
        }
    }

    assert_eq!(sent, vec![6]);
    assert_eq!(*h.backend.updates.lock().unwrap(), vec![6]);
    assert_eq!(quantities(&h.cart), vec![("ink-black".to_string(), 6)]);
    assert!(h.cart.summary().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_failed_debounced_update_rolls_back_to_pre_burst_quantity() {
    let h = harness();
    h.cart.load(false).await;
    h.cart.add_item(item("ink-black", 2500, 2)).await.unwrap();
    *h.backend.reject.lock().unwrap() = Some(("Out of stock".to_string(), None));
    let id = ProductId::new("ink-black");

    let (a, b) = tokio::join!(h.cart.increment(&id), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.cart.increment(&id).await
    });

    assert_eq!(a.unwrap(), DebouncedUpdate::Coalesced);
    assert!(b.is_err());
    assert_eq!(quantities(&h.cart), vec![("ink-black".to_string(), 2)]);
}

#[tokio::test(start_paused = true)]
async fn test_newer_quantity_is_resent_after_in_flight_update_returns() {
    let h = harness();
    h.cart.load(false).await;
    h.cart.add_item(item("ink-black", 2500, 2)).await.unwrap();
    *h.backend.update_delay.lock().unwrap() = Duration::from_millis(1000);
    let id = ProductId::new("ink-black");

    // The second change settles while the first update is still in flight.
    let (a, b) = tokio::join!(h.cart.set_quantity_debounced(&id, 3), async {
        tokio::time::sleep(Duration::from_millis(600)).await;
        h.cart.set_quantity_debounced(&id, 4).await
    });

    assert_eq!(a.unwrap(), DebouncedUpdate::Sent { quantity: 4 });
    assert_eq!(b.unwrap(), DebouncedUpdate::Coalesced);
    assert_eq!(*h.backend.updates.lock().unwrap(), vec![3, 4]);
    assert_eq!(quantities(&h.cart), vec![("ink-black".to_string(), 4)]);
    assert!(h.cart.summary().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_change_waiting_when_update_returns_is_not_overwritten() {
    let h = harness();
    h.cart.load(false).await;
    h.cart.add_item(item("ink-black", 2500, 2)).await.unwrap();
    *h.backend.update_delay.lock().unwrap() = Duration::from_millis(1000);
    let id = ProductId::new("ink-black");

    // The second change is still in its debounce window when the first
    // update returns.
    let (a, b) = tokio::join!(h.cart.set_quantity_debounced(&id, 3), async {
        tokio::time::sleep(Duration::from_millis(1200)).await;
        h.cart.set_quantity_debounced(&id, 4).await
    });

    assert_eq!(a.unwrap(), DebouncedUpdate::Sent { quantity: 3 });
    assert_eq!(b.unwrap(), DebouncedUpdate::Sent { quantity: 4 });
    assert_eq!(*h.backend.updates.lock().unwrap(), vec![3, 4]);
    assert_eq!(quantities(&h.cart), vec![("ink-black".to_string(), 4)]);
    assert_eq!(*h.backend.guest.lock().unwrap(), vec![(id.clone(), 4)]);
    assert!(h.cart.summary().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_fetch_started_before_a_local_change_is_discarded() {
    let h = harness();
    h.cart.load(false).await;
    h.cart.add_item(item("ink-black", 2500, 2)).await.unwrap();
    *h.backend.fetch_delay.lock().unwrap() = Duration::from_millis(1000);
    let id = ProductId::new("ink-black");

    let (applied, updated) = tokio::join!(h.cart.refresh(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.cart.update_quantity(&id, 5).await
    });

    assert!(!applied.unwrap());
    updated.unwrap();
    assert_eq!(quantities(&h.cart), vec![("ink-black".to_string(), 5)]);
    assert!(h.cart.summary().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_decrement_stops_at_one() {
    let h = harness();
    h.cart.load(false).await;
    h.cart.add_item(item("ink-black", 2500, 1)).await.unwrap();

    let outcome = h.cart.decrement(&ProductId::new("ink-black")).await.unwrap();
    assert_eq!(outcome, DebouncedUpdate::Sent { quantity: 1 });
    assert_eq!(h.cart.item_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_debounced_change_is_local_only_when_offline() {
    let h = harness();
    h.backend.offline.store(true, Ordering::SeqCst);
    h.cart.load(false).await;
    h.cart.add_item(item("ink-black", 2500, 1)).await.unwrap();

    let outcome = h.cart.increment(&ProductId::new("ink-black")).await.unwrap();
    assert_eq!(outcome, DebouncedUpdate::LocalOnly);
    assert!(h.backend.updates.lock().unwrap().is_empty());

    let stored: Vec<CartItem> = h.storage.load_json(keys::CART).unwrap().unwrap();
    assert_eq!(stored[0].quantity, 2);
}

// =============================================================================
// Loading and sign-in migration
// =============================================================================

#[tokio::test]
async fn test_guest_load_pushes_cached_items_to_empty_server_cart() {
    let storage = MemoryStorage::new();
    storage
        .save_json(keys::CART, &vec![item("ink-cyan", 1999, 2)])
        .unwrap();
    let h = harness_with(FakeBackend::new(), storage);

    let state = h.cart.load(false).await;

    assert_eq!(state, CartSyncState::GuestSynced);
    assert_eq!(*h.backend.guest.lock().unwrap(), vec![(ProductId::new("ink-cyan"), 2)]);
    assert!(h.cart.summary().is_some());
}

#[tokio::test]
async fn test_guest_load_offline_keeps_cached_items() {
    let storage = MemoryStorage::new();
    storage
        .save_json(keys::CART, &vec![item("ink-cyan", 1999, 2)])
        .unwrap();
    let backend = FakeBackend::new();
    backend.offline.store(true, Ordering::SeqCst);
    let h = harness_with(backend, storage);

    assert_eq!(h.cart.load(false).await, CartSyncState::GuestLocal);
    assert_eq!(quantities(&h.cart), vec![("ink-cyan".to_string(), 2)]);
    assert!(h.cart.summary().is_none());
}

#[tokio::test]
async fn test_sign_in_migrates_local_guest_cart_and_clears_cache() {
    let storage = MemoryStorage::new();
    storage
        .save_json(keys::CART, &vec![item("ink-black", 2500, 1), item("toner", 9500, 2)])
        .unwrap();
    let backend = FakeBackend::new();
    backend.offline.store(true, Ordering::SeqCst);
    let h = harness_with(backend, storage);
    h.cart.load(false).await;
    assert_eq!(h.cart.sync_state(), CartSyncState::GuestLocal);

    h.backend.offline.store(false, Ordering::SeqCst);
    h.backend.authenticated.store(true, Ordering::SeqCst);
    h.cart.on_signed_in().await;

    assert_eq!(h.cart.sync_state(), CartSyncState::AuthSynced);
    assert_eq!(
        quantities(&h.cart),
        vec![("ink-black".to_string(), 1), ("toner".to_string(), 2)]
    );
    assert!(h.storage.get(keys::CART).unwrap().is_none());
    assert_eq!(h.backend.merges.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_sign_in_merges_server_guest_cart_without_doubling() {
    let h = harness();
    h.cart.load(false).await;
    h.cart.add_item(item("ink-black", 2500, 2)).await.unwrap();
    assert_eq!(h.cart.sync_state(), CartSyncState::GuestSynced);
    let adds = h.backend.adds.load(Ordering::SeqCst);

    h.backend.authenticated.store(true, Ordering::SeqCst);
    h.cart.on_signed_in().await;

    assert_eq!(h.backend.adds.load(Ordering::SeqCst), adds);
    assert_eq!(quantities(&h.cart), vec![("ink-black".to_string(), 2)]);
    assert!(h.storage.get(keys::CART).unwrap().is_none());
}

#[tokio::test]
async fn test_auth_cart_is_never_persisted_locally() {
    let h = harness();
    h.backend.authenticated.store(true, Ordering::SeqCst);
    h.cart.load(true).await;
    h.cart.add_item(item("ink-black", 2500, 1)).await.unwrap();

    assert_eq!(h.cart.sync_state(), CartSyncState::AuthSynced);
    assert!(h.storage.get(keys::CART).unwrap().is_none());
}

#[tokio::test]
async fn test_sign_out_clears_everything() {
    let h = harness();
    h.backend.authenticated.store(true, Ordering::SeqCst);
    h.cart.load(true).await;
    h.cart.add_item(item("ink-black", 2500, 1)).await.unwrap();

    h.cart.on_signed_out();

    assert!(h.cart.items().is_empty());
    assert!(h.cart.summary().is_none());
    assert_eq!(h.cart.sync_state(), CartSyncState::GuestLocal);
}

// =============================================================================
// Coupons and totals
// =============================================================================

#[tokio::test]
async fn test_coupon_rejection_is_shown_verbatim() {
    let h = harness();
    h.cart.load(false).await;
    h.cart.add_item(item("ink-black", 2500, 1)).await.unwrap();
    h.toasts.drain();

    h.cart.apply_coupon("BOGUS").await.unwrap_err();
    assert_eq!(h.toasts.drain()[0].message, "Coupon code is not valid");

    h.cart.apply_coupon(" SAVE10 ").await.unwrap();
    assert_eq!(h.toasts.drain()[0].message, "Coupon SAVE10 applied");
}

#[tokio::test]
async fn test_coupon_needs_code_and_server() {
    let h = harness();
    assert!(matches!(
        h.cart.apply_coupon("  ").await,
        Err(CartError::Validation(_))
    ));
    h.backend.offline.store(true, Ordering::SeqCst);
    h.cart.load(false).await;
    assert!(matches!(
        h.cart.apply_coupon("SAVE10").await,
        Err(CartError::Offline)
    ));
}

#[tokio::test]
async fn test_shipping_progress_at_95_dollars() {
    let h = harness();
    h.backend.offline.store(true, Ordering::SeqCst);
    h.cart.load(false).await;
    h.cart.add_item(item("toner", 9500, 1)).await.unwrap();

    let progress = h.cart.shipping_progress();
    assert_eq!(progress.message(), "Add $5.00 more for FREE shipping");
    assert_eq!(progress.percent, 95);
    assert_eq!(h.cart.shipping(), Amount::Estimate(Decimal::new(599, 2)));
}

#[tokio::test]
async fn test_observer_sees_every_change() {
    #[derive(Default)]
    struct Counter(AtomicUsize);
    impl CartObserver for Counter {
        fn cart_changed(&self, _snapshot: &CartSnapshot) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let backend = Arc::new(FakeBackend::new());
    let counter = Arc::new(Counter::default());
    let cart = Cart::new(
        backend,
        Arc::new(MemoryStorage::new()),
        CartSettings::default(),
    )
    .with_observer(Arc::clone(&counter) as Arc<dyn CartObserver>);

    cart.load(false).await;
    let before = counter.0.load(Ordering::SeqCst);
    cart.add_item(item("ink-black", 2500, 1)).await.unwrap();
    assert!(counter.0.load(Ordering::SeqCst) >= before + 2);
}
