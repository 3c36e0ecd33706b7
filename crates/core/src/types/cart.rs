//! Cart data model.
//!
//! [`CartItem`] is the locally rendered line (also the guest cache format in
//! browser storage, hence camelCase). [`ServerCart`] is what the backend
//! returns and is the only source of pricing truth.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::status::StockStatus;

/// A line in the locally mirrored cart.
///
/// `id` is unique within a cart: adding an existing product increments its
/// quantity instead of creating a second line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: ProductId,
    pub name: String,
    /// Unit price as last seen. Display only; never a checkout source.
    pub price: Decimal,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    pub quantity: u32,
    #[serde(default = "default_true")]
    pub in_stock: bool,
    #[serde(default)]
    pub stock_quantity: Option<u32>,
}

const fn default_true() -> bool {
    true
}

impl CartItem {
    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    /// Stock bucket for display.
    #[must_use]
    pub const fn stock_status(&self) -> StockStatus {
        StockStatus::from_quantity(self.in_stock, self.stock_quantity)
    }
}

/// Authoritative totals computed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSummary {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub total: Decimal,
}

/// A coupon the backend accepted for this cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    pub code: String,
    /// Discount amount computed by the server.
    pub discount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

/// A cart line as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCartItem {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "default_true")]
    pub in_stock: bool,
    #[serde(default)]
    pub stock_quantity: Option<u32>,
}

impl From<ServerCartItem> for CartItem {
    fn from(item: ServerCartItem) -> Self {
        Self {
            id: item.product_id,
            name: item.name,
            price: item.unit_price,
            image: item.image_url,
            sku: item.sku,
            brand: item.brand,
            color: item.color,
            quantity: item.quantity,
            in_stock: item.in_stock,
            stock_quantity: item.stock_quantity,
        }
    }
}

/// The backend's view of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCart {
    #[serde(default)]
    pub items: Vec<ServerCartItem>,
    #[serde(default)]
    pub summary: Option<ServerSummary>,
    #[serde(default)]
    pub coupon: Option<AppliedCoupon>,
}

impl ServerCart {
    /// Whether the server holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A problem found by pre-checkout validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartIssue {
    OutOfStock {
        product_id: ProductId,
        name: String,
    },
    QuantityAdjusted {
        product_id: ProductId,
        name: String,
        requested: u32,
        available: u32,
    },
    PriceChanged {
        product_id: ProductId,
        name: String,
        old_price: Decimal,
        new_price: Decimal,
    },
    Unavailable {
        product_id: ProductId,
        name: String,
    },
}

impl CartIssue {
    /// Product the issue refers to.
    #[must_use]
    pub const fn product_id(&self) -> &ProductId {
        match self {
            Self::OutOfStock { product_id, .. }
            | Self::QuantityAdjusted { product_id, .. }
            | Self::PriceChanged { product_id, .. }
            | Self::Unavailable { product_id, .. } => product_id,
        }
    }

    /// Message shown to the shopper.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::OutOfStock { name, .. } => format!("{name} is out of stock"),
            Self::QuantityAdjusted {
                name,
                requested,
                available,
                ..
            } => format!("{name}: only {available} available (you requested {requested})"),
            Self::PriceChanged {
                name,
                old_price,
                new_price,
                ..
            } => format!(
                "{name}: price changed from {} to {}",
                crate::format::format_price(*old_price),
                crate::format::format_price(*new_price)
            ),
            Self::Unavailable { name, .. } => format!("{name} is no longer available"),
        }
    }
}

/// Result of `POST /api/cart/validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CartValidation {
    pub valid: bool,
    #[serde(default)]
    pub issues: Vec<CartIssue>,
}

impl CartValidation {
    /// Human-readable issue list.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(CartIssue::message).collect()
    }
}
