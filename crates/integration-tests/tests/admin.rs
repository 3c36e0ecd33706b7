//! Integration tests for the admin client against the mock backend.

use inkcartridges_admin::export::ExportFormat;
use inkcartridges_admin::{AdminClient, AdminError, ExportKind, OrderQuery};
use inkcartridges_core::{OrderId, OrderStatus};
use inkcartridges_integration_tests::{MockBackend, TEST_EMAIL, TestStorefront, test_password};
use inkcartridges_storefront::error::ApiError;
use serde_json::Value;

async fn admin() -> (MockBackend, TestStorefront, AdminClient) {
    let backend = MockBackend::start().await.expect("Failed to start mock backend");
    let shop = backend.storefront().expect("Failed to build storefront");
    shop.storefront
        .sign_in(TEST_EMAIL, &test_password())
        .await
        .expect("Sign-in failed");
    let client = AdminClient::new(shop.storefront.api().clone());
    (backend, shop, client)
}

// ============================================================================
// Lists
// ============================================================================

#[tokio::test]
async fn test_orders_list_decodes() {
    let (_backend, _shop, client) = admin().await;

    let page = client
        .orders(OrderQuery::default())
        .await
        .expect("Orders request failed");

    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].status, OrderStatus::Processing);
    assert_eq!(page.items[1].email, None);
}

#[tokio::test]
async fn test_admin_requires_session() {
    let backend = MockBackend::start().await.expect("Failed to start mock backend");
    let shop = backend.storefront().expect("Failed to build storefront");
    let client = AdminClient::new(shop.storefront.api().clone());

    let err = client.products().await.expect_err("Guest must be refused");

    // No session means nothing to refresh: the 401 is final.
    assert!(
        matches!(err, AdminError::Api(ApiError::Unauthorized)),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_order_status_update() {
    let (_backend, _shop, client) = admin().await;

    client
        .update_order_status(
            &OrderId::new("o-1001"),
            OrderStatus::Processing,
            OrderStatus::Shipped,
        )
        .await
        .expect("Valid transition should be sent");

    let err = client
        .update_order_status(
            &OrderId::new("o-1001"),
            OrderStatus::Shipped,
            OrderStatus::Pending,
        )
        .await
        .expect_err("Backwards transition must be refused");
    assert!(matches!(err, AdminError::InvalidTransition { .. }));
}

// ============================================================================
// Export
// ============================================================================

#[tokio::test]
async fn test_export_orders_csv() {
    let (_backend, _shop, client) = admin().await;

    let csv = client
        .export(ExportKind::Orders, ExportFormat::Csv)
        .await
        .expect("Export failed");

    let mut lines = csv.split("\r\n");
    assert_eq!(
        lines.next(),
        Some("Order,Date,Customer,Email,Status,Items,Total")
    );
    assert_eq!(
        lines.next(),
        Some("INK-1001,2026-03-01 09:30,Aroha Smith,aroha@example.co.nz,Processing,3,$123.45")
    );
    assert!(csv.contains("\"Lee, Sam\""));
}

#[tokio::test]
async fn test_export_products_json_and_html() {
    let (_backend, _shop, client) = admin().await;

    let json = client
        .export(ExportKind::Products, ExportFormat::Json)
        .await
        .expect("JSON export failed");
    let rows: Value = serde_json::from_str(&json).expect("Export is not JSON");
    assert_eq!(rows.as_array().map(Vec::len), Some(3));
    assert_eq!(rows[0]["SKU"], "HP65-BK");

    let html = client
        .export(ExportKind::Customers, ExportFormat::Html)
        .await
        .expect("HTML export failed");
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("aroha@example.co.nz"));
}
