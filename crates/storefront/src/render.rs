//! HTML fragments for the cart drawer and toasts.
//!
//! Values are formatted here and escaped by the templates; image URLs are
//! additionally restricted to `http(s)` and site-relative paths.

use askama::Template;
use inkcartridges_core::format::{format_price, sanitize_url};
use inkcartridges_core::{CartItem, StockStatus};
use rust_decimal::Decimal;

use crate::cart::{CartSnapshot, CartSyncState};
use crate::config::CartSettings;
use crate::notify::Toast;

/// One cart line, ready to render.
#[derive(Debug, Clone)]
pub struct CartLineView {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price: String,
    pub line_total: String,
    pub stock_label: &'static str,
    pub stock_class: &'static str,
}

impl From<&CartItem> for CartLineView {
    fn from(item: &CartItem) -> Self {
        let status = item.stock_status();
        Self {
            id: item.id.to_string(),
            name: item.name.clone(),
            image: item
                .image
                .as_deref()
                .map(sanitize_url)
                .filter(|url| *url != "#")
                .map(str::to_string),
            sku: item.sku.clone(),
            quantity: item.quantity,
            unit_price: format_price(item.price),
            line_total: format_price(item.line_total()),
            stock_label: status.label(),
            stock_class: match status {
                StockStatus::InStock => "in",
                StockStatus::LowStock => "low",
                StockStatus::OutOfStock => "out",
            },
        }
    }
}

/// Cart drawer fragment.
#[derive(Template)]
#[template(path = "partials/cart_drawer.html")]
pub struct CartDrawerTemplate {
    pub sync: &'static str,
    pub lines: Vec<CartLineView>,
    pub item_count: u32,
    pub subtotal: String,
    pub shipping: String,
    pub discount: Option<String>,
    pub coupon_code: Option<String>,
    pub total: String,
    /// Server-computed totals; otherwise labelled "Estimated".
    pub verified: bool,
    pub shipping_message: String,
    pub shipping_percent: u8,
    pub qualifies: bool,
}

impl CartDrawerTemplate {
    #[must_use]
    pub fn new(snapshot: &CartSnapshot, settings: &CartSettings) -> Self {
        let totals = snapshot.totals;
        let progress = totals.shipping_progress(settings);
        let discount = totals.discount.value();
        Self {
            sync: match snapshot.sync {
                CartSyncState::Loading => "loading",
                CartSyncState::GuestLocal => "guest-local",
                CartSyncState::GuestSynced => "guest-synced",
                CartSyncState::AuthSynced => "auth-synced",
            },
            lines: snapshot.items.iter().map(CartLineView::from).collect(),
            item_count: snapshot.item_count(),
            subtotal: totals.subtotal.display(),
            shipping: if totals.shipping.value() == Decimal::ZERO {
                "FREE".to_string()
            } else {
                totals.shipping.display()
            },
            discount: (discount > Decimal::ZERO).then(|| format_price(discount)),
            coupon_code: snapshot.coupon.as_ref().map(|c| c.code.clone()),
            total: totals.total.display(),
            verified: totals.is_verified(),
            shipping_message: progress.message(),
            shipping_percent: progress.percent,
            qualifies: progress.qualifies(),
        }
    }
}

/// Toast fragment.
#[derive(Template)]
#[template(path = "partials/toast.html")]
pub struct ToastTemplate {
    pub kind: &'static str,
    pub message: String,
}

impl From<&Toast> for ToastTemplate {
    fn from(toast: &Toast) -> Self {
        Self {
            kind: toast.kind.as_str(),
            message: toast.message.clone(),
        }
    }
}

/// Render the cart drawer.
///
/// # Errors
///
/// Returns an error if the template fails to render.
pub fn cart_drawer(snapshot: &CartSnapshot, settings: &CartSettings) -> askama::Result<String> {
    CartDrawerTemplate::new(snapshot, settings).render()
}

/// Render a toast.
///
/// # Errors
///
/// Returns an error if the template fails to render.
pub fn toast(toast: &Toast) -> askama::Result<String> {
    ToastTemplate::from(toast).render()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use inkcartridges_core::{ProductId, ServerSummary};

    use super::*;
    use crate::cart::CartTotals;

    fn snapshot(summary: Option<ServerSummary>) -> CartSnapshot {
        let items = vec![CartItem {
            id: ProductId::new("p1"),
            name: "HP 65 <Black>".to_string(),
            price: Decimal::new(95, 0),
            image: Some("javascript:alert(1)".to_string()),
            sku: Some("HP65BK".to_string()),
            brand: None,
            color: None,
            quantity: 1,
            in_stock: true,
            stock_quantity: Some(3),
        }];
        let settings = CartSettings::default();
        let totals = CartTotals::compute(&items, summary.as_ref(), None, &settings);
        CartSnapshot {
            sync: CartSyncState::GuestLocal,
            items,
            summary,
            coupon: None,
            totals,
        }
    }

    #[test]
    fn test_unverified_totals_are_labelled_estimated() {
        let html = cart_drawer(&snapshot(None), &CartSettings::default()).unwrap();
        assert!(html.contains("Estimated"));
        assert!(html.contains("Add $5.00 more for FREE shipping"));
        assert!(html.contains("Low stock"));
    }

    #[test]
    fn test_verified_totals_have_no_label() {
        let summary = ServerSummary {
            subtotal: Decimal::new(95, 0),
            shipping: Decimal::ZERO,
            discount: Decimal::ZERO,
            total: Decimal::new(95, 0),
        };
        let html = cart_drawer(&snapshot(Some(summary)), &CartSettings::default()).unwrap();
        assert!(!html.contains("Estimated"));
        assert!(html.contains("FREE"));
    }

    #[test]
    fn test_names_escaped_and_bad_urls_dropped() {
        let html = cart_drawer(&snapshot(None), &CartSettings::default()).unwrap();
        assert!(html.contains("HP 65 &#60;Black&#62;") || html.contains("HP 65 &lt;Black&gt;"));
        assert!(!html.contains("javascript:"));
    }

    #[test]
    fn test_toast_fragment() {
        let html = toast(&Toast::error("Only 2 available")).unwrap();
        assert!(html.contains("toast--error"));
        assert!(html.contains("role=\"alert\""));
    }
}
