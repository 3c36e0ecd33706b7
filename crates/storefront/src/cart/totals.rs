//! Cart totals: server-verified figures or clearly labelled local estimates.
//!
//! Checkout needs a [`VerifiedTotals`], and the only way to build one is
//! from a [`ServerSummary`]. A locally computed estimate is an
//! [`Amount::Estimate`] and cannot be turned into verified totals.

use inkcartridges_core::format::{ShippingProgress, format_price};
use inkcartridges_core::{AppliedCoupon, CartItem, ServerSummary};
use rust_decimal::Decimal;

use crate::config::CartSettings;

/// A money amount and whether the server vouches for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Amount {
    /// Computed by the backend.
    Verified(Decimal),
    /// Computed locally for display only.
    Estimate(Decimal),
}

impl Amount {
    /// The number, regardless of source.
    #[must_use]
    pub const fn value(self) -> Decimal {
        match self {
            Self::Verified(v) | Self::Estimate(v) => v,
        }
    }

    #[must_use]
    pub const fn is_verified(self) -> bool {
        matches!(self, Self::Verified(_))
    }

    /// Formatted for display, e.g. `$24.99`.
    #[must_use]
    pub fn display(self) -> String {
        format_price(self.value())
    }
}

/// Totals for display: verified when the server summary is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartTotals {
    pub subtotal: Amount,
    pub shipping: Amount,
    pub discount: Amount,
    pub total: Amount,
}

impl CartTotals {
    /// Whether every figure came from the server.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        self.total.is_verified()
    }

    /// Totals from the server summary if present, else a local estimate.
    ///
    /// The estimate charges nothing for shipping on an empty cart or at or
    /// above the free-shipping threshold, the flat rate otherwise, and never
    /// goes below zero.
    #[must_use]
    pub fn compute(
        items: &[CartItem],
        summary: Option<&ServerSummary>,
        coupon: Option<&AppliedCoupon>,
        settings: &CartSettings,
    ) -> Self {
        if let Some(summary) = summary {
            return Self {
                subtotal: Amount::Verified(summary.subtotal),
                shipping: Amount::Verified(summary.shipping),
                discount: Amount::Verified(summary.discount),
                total: Amount::Verified(summary.total),
            };
        }

        let subtotal: Decimal = items.iter().map(CartItem::line_total).sum();
        let shipping = if items.is_empty() || subtotal >= settings.free_shipping_threshold {
            Decimal::ZERO
        } else {
            settings.flat_shipping
        };
        let discount = coupon.map_or(Decimal::ZERO, |c| c.discount);
        let total = (subtotal + shipping - discount).max(Decimal::ZERO);

        Self {
            subtotal: Amount::Estimate(subtotal),
            shipping: Amount::Estimate(shipping),
            discount: Amount::Estimate(discount),
            total: Amount::Estimate(total),
        }
    }

    /// Progress towards free shipping for the current subtotal.
    #[must_use]
    pub fn shipping_progress(&self, settings: &CartSettings) -> ShippingProgress {
        ShippingProgress::compute(self.subtotal.value(), settings.free_shipping_threshold)
    }
}

/// Totals the backend computed, the only input checkout accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedTotals {
    subtotal: Decimal,
    shipping: Decimal,
    discount: Decimal,
    total: Decimal,
}

impl VerifiedTotals {
    pub(crate) const fn from_summary(summary: &ServerSummary) -> Self {
        Self {
            subtotal: summary.subtotal,
            shipping: summary.shipping,
            discount: summary.discount,
            total: summary.total,
        }
    }

    #[must_use]
    pub const fn subtotal(&self) -> Decimal {
        self.subtotal
    }

    #[must_use]
    pub const fn shipping(&self) -> Decimal {
        self.shipping
    }

    #[must_use]
    pub const fn discount(&self) -> Decimal {
        self.discount
    }

    #[must_use]
    pub const fn total(&self) -> Decimal {
        self.total
    }
}
