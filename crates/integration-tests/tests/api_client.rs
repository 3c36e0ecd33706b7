//! Integration tests for the API client against the mock backend:
//! envelope decoding, refresh-and-retry on 401 and rate limiting.

use axum::http::Method;
use inkcartridges_integration_tests::{MockBackend, TEST_EMAIL, TestStorefront, test_password};
use inkcartridges_storefront::cart::CartSyncState;
use inkcartridges_storefront::catalog::ProductFilters;
use inkcartridges_storefront::error::ApiError;
use serde_json::Value;

async fn signed_in() -> (MockBackend, TestStorefront) {
    let backend = MockBackend::start().await.expect("Failed to start mock backend");
    let shop = backend.storefront().expect("Failed to build storefront");
    shop.storefront.start().await;
    shop.storefront
        .sign_in(TEST_EMAIL, &test_password())
        .await
        .expect("Sign-in failed");
    (backend, shop)
}

// ============================================================================
// Refresh and retry
// ============================================================================

#[tokio::test]
async fn test_expired_token_is_refreshed_and_request_retried_once() {
    let (backend, shop) = signed_in().await;
    let api = shop.storefront.api();
    let before = backend.requests_to(&Method::GET, "/api/cart").len();

    backend.expire_access_tokens();
    let cart: Value = api
        .get(api.url(&["api", "cart"]).expect("Failed to build URL"))
        .await
        .expect("Request should succeed after refresh");

    assert!(cart.get("items").is_some());
    assert_eq!(backend.refresh_grants(), 1);

    let requests = backend.requests_to(&Method::GET, "/api/cart");
    let attempts = requests.get(before..).expect("Missing cart requests");
    assert_eq!(attempts.len(), 2, "one original request and one retry");
    assert_ne!(attempts[0].bearer, attempts[1].bearer);
    assert!(shop.storefront.auth().is_signed_in());
}

#[tokio::test]
async fn test_second_unauthorized_is_not_retried_again() {
    let (backend, shop) = signed_in().await;
    let api = shop.storefront.api();
    let before = backend.requests_to(&Method::GET, "/api/cart").len();

    backend.reject_all_tokens();
    let err = api
        .get::<Value>(api.url(&["api", "cart"]).expect("Failed to build URL"))
        .await
        .expect_err("Request should fail");

    assert!(matches!(err, ApiError::Unauthorized), "got {err:?}");
    assert_eq!(backend.refresh_grants(), 1);
    assert_eq!(backend.requests_to(&Method::GET, "/api/cart").len() - before, 2);
}

#[tokio::test]
async fn test_rejected_refresh_signs_out() {
    let (backend, shop) = signed_in().await;
    let api = shop.storefront.api();

    backend.expire_access_tokens();
    backend.revoke_refresh_tokens();
    let err = api
        .get::<Value>(api.url(&["api", "cart"]).expect("Failed to build URL"))
        .await
        .expect_err("Request should fail");

    assert!(matches!(err, ApiError::SessionExpired), "got {err:?}");
    assert!(!shop.storefront.auth().is_signed_in());

    shop.storefront.pump_auth_events().await;
    assert_eq!(shop.storefront.cart().sync_state(), CartSyncState::GuestLocal);
    assert_eq!(shop.storefront.cart().item_count(), 0);
}

// ============================================================================
// Rate limiting and envelopes
// ============================================================================

#[tokio::test]
async fn test_rate_limit_is_reported_without_retry() {
    let backend = MockBackend::start().await.expect("Failed to start mock backend");
    let shop = backend.storefront().expect("Failed to build storefront");
    backend.rate_limit_products(1, 7);

    let err = shop
        .storefront
        .api()
        .list_products(&ProductFilters::default())
        .await
        .expect_err("Listing should be rate limited");

    assert!(matches!(err, ApiError::RateLimited { retry_after: 7 }), "got {err:?}");
    assert_eq!(backend.requests_to(&Method::GET, "/api/products").len(), 1);

    let page = shop
        .storefront
        .api()
        .list_products(&ProductFilters::default())
        .await
        .expect("Second listing should succeed");
    assert_eq!(page.products.len(), 3);
}

#[tokio::test]
async fn test_business_error_keeps_message_and_code() {
    let backend = MockBackend::start().await.expect("Failed to start mock backend");
    let shop = backend.storefront().expect("Failed to build storefront");

    let err = shop
        .storefront
        .api()
        .product_by_sku("NOPE-1")
        .await
        .expect_err("Unknown SKU should fail");

    match err {
        ApiError::Business {
            status, message, ..
        } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Product not found");
        }
        other => panic!("expected business error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unverified_email_shows_info_toast_after_sign_in() {
    let backend = MockBackend::start().await.expect("Failed to start mock backend");
    let shop = backend.storefront().expect("Failed to build storefront");
    backend.require_email_verification();
    shop.storefront.start().await;

    shop.storefront
        .sign_in(TEST_EMAIL, &test_password())
        .await
        .expect("Sign-in should still succeed");

    let toasts = shop.toasts.drain();
    assert!(
        toasts
            .iter()
            .any(|t| t.message.starts_with("Please verify your email address")),
        "toasts: {toasts:?}"
    );
    assert_eq!(shop.storefront.cart().sync_state(), CartSyncState::AuthSynced);
}
