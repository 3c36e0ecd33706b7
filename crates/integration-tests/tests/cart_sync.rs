//! Integration tests for the cart against the mock backend: guest carts,
//! server-side stock errors with rollback, and migration on sign-in.

use axum::http::Method;
use inkcartridges_integration_tests::{MockBackend, TEST_EMAIL, TEST_USER_ID, test_password};
use inkcartridges_storefront::cart::{CartError, CartSyncState, CheckoutDecision};
use inkcartridges_storefront::error::ApiError;
use inkcartridges_storefront::storage::{Storage, keys};
use rust_decimal::Decimal;

// ============================================================================
// Guest cart
// ============================================================================

#[tokio::test]
async fn test_guest_cart_syncs_with_server_totals() {
    let backend = MockBackend::start().await.expect("Failed to start mock backend");
    let shop = backend.storefront().expect("Failed to build storefront");
    shop.storefront.start().await;
    let cart = shop.storefront.cart();
    assert_eq!(cart.sync_state(), CartSyncState::GuestSynced);

    let product = shop
        .storefront
        .api()
        .product_by_sku("HP65-BK")
        .await
        .expect("Product lookup failed");
    cart.add_item(product.to_cart_item(2)).await.expect("Add failed");

    assert_eq!(backend.guest_cart(), vec![("ink-black".to_string(), 2)]);
    let totals = cart.totals();
    assert!(totals.is_verified());
    assert_eq!(totals.total.value(), Decimal::new(5599, 2));
    assert!(shop.storage.get(keys::CART).expect("Storage read failed").is_some());

    match cart.checkout().await.expect("Checkout check failed") {
        CheckoutDecision::Proceed(verified) => assert_eq!(verified.total(), Decimal::new(5599, 2)),
        CheckoutDecision::Blocked(block) => panic!("checkout blocked: {block:?}"),
    }
}

#[tokio::test]
async fn test_stock_error_rolls_back_and_shows_server_message() {
    let backend = MockBackend::start().await.expect("Failed to start mock backend");
    let shop = backend.storefront().expect("Failed to build storefront");
    shop.storefront.start().await;
    let cart = shop.storefront.cart();
    let cyan = shop
        .storefront
        .api()
        .product_by_sku("HP65-C")
        .await
        .expect("Product lookup failed");

    // Stock unknown locally, so only the server can refuse the quantity.
    let mut line = cyan.to_cart_item(5);
    line.stock_quantity = None;
    let err = cart
        .add_item(line)
        .await
        .expect_err("Server should reject the quantity");

    match err {
        CartError::Api(ApiError::Business { message, .. }) => {
            assert_eq!(message, "Only 3 available");
        }
        other => panic!("expected business error, got {other:?}"),
    }
    assert_eq!(cart.item_count(), 0);
    assert!(backend.guest_cart().is_empty());
    let toasts = shop.toasts.drain();
    assert_eq!(
        toasts.last().map(|t| t.message.as_str()),
        Some("Only 3 available")
    );
}

// ============================================================================
// Sign-in migration
// ============================================================================

#[tokio::test]
async fn test_sign_in_merges_server_guest_cart_once() {
    let backend = MockBackend::start().await.expect("Failed to start mock backend");
    let shop = backend.storefront().expect("Failed to build storefront");
    shop.storefront.start().await;
    let cart = shop.storefront.cart();
    let black = shop
        .storefront
        .api()
        .product_by_sku("HP65-BK")
        .await
        .expect("Product lookup failed");
    cart.add_item(black.to_cart_item(2)).await.expect("Add failed");

    shop.storefront
        .sign_in(TEST_EMAIL, &test_password())
        .await
        .expect("Sign-in failed");

    assert_eq!(backend.merges(), 1);
    // Synced guest items are merged server-side, not re-added.
    assert_eq!(backend.requests_to(&Method::POST, "/api/cart/items").len(), 1);
    assert_eq!(
        backend.user_cart(TEST_USER_ID),
        vec![("ink-black".to_string(), 2)]
    );
    assert_eq!(cart.sync_state(), CartSyncState::AuthSynced);
    assert_eq!(cart.item_count(), 2);
    assert!(shop.storage.get(keys::CART).expect("Storage read failed").is_none());
}

#[tokio::test]
async fn test_account_cart_is_not_cached_and_cleared_on_sign_out() {
    let backend = MockBackend::start().await.expect("Failed to start mock backend");
    let shop = backend.storefront().expect("Failed to build storefront");
    shop.storefront.start().await;
    shop.storefront
        .sign_in(TEST_EMAIL, &test_password())
        .await
        .expect("Sign-in failed");
    let cart = shop.storefront.cart();
    let toner = shop
        .storefront
        .api()
        .product_by_sku("BR-TN2450")
        .await
        .expect("Product lookup failed");

    cart.add_item(toner.to_cart_item(1)).await.expect("Add failed");
    assert!(shop.storage.get(keys::CART).expect("Storage read failed").is_none());
    assert_eq!(cart.shipping().value(), Decimal::new(599, 2));

    shop.storefront.sign_out().await;

    assert_eq!(cart.item_count(), 0);
    assert!(!shop.storefront.auth().is_signed_in());
    assert_eq!(backend.user_cart(TEST_USER_ID).len(), 1);
}
