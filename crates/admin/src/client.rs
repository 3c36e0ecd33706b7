//! Admin API calls over the shared storefront client.
//!
//! Admin endpoints use the same envelope, bearer session and refresh logic
//! as the storefront, so this wraps [`ApiClient`] instead of owning HTTP.

use inkcartridges_core::{OrderId, OrderStatus, ProductId};
use inkcartridges_storefront::api::ApiClient;
use serde::de::IgnoredAny;
use serde_json::json;
use tracing::{info, instrument};

use crate::dashboard::DateRange;
use crate::error::{AdminError, Result};
use crate::export::{ExportFormat, Table, export};
use crate::models::{AdminCustomer, AdminOrder, AdminProduct, AnalyticsOverview, Page};
use crate::product_edit::ProductDraft;

/// What to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Orders,
    Products,
    Customers,
}

impl std::str::FromStr for ExportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "orders" => Ok(Self::Orders),
            "products" => Ok(Self::Products),
            "customers" => Ok(Self::Customers),
            _ => Err(format!("unknown export: {s}")),
        }
    }
}

/// Filters for the order list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
}

/// Back-office client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AdminClient {
    api: ApiClient,
}

impl AdminClient {
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Revenue and order totals for `range` and the period before it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn analytics_overview(&self, range: DateRange) -> Result<AnalyticsOverview> {
        let url = self.api.url_with_query(
            &["api", "admin", "analytics", "overview"],
            &[
                ("from", range.from.to_string()),
                ("to", range.to.to_string()),
            ],
        )?;
        Ok(self.api.get(url).await?)
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn orders(&self, query: OrderQuery) -> Result<Page<AdminOrder>> {
        let mut params = Vec::new();
        if let Some(status) = query.status {
            params.push(("status", status.to_string()));
        }
        if let Some(page) = query.page.filter(|p| *p > 1) {
            params.push(("page", page.to_string()));
        }
        let url = self.api.url_with_query(&["api", "admin", "orders"], &params)?;
        Ok(self.api.get(url).await?)
    }

    /// Move an order to `next`, checking the transition first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` without sending if `current` cannot move
    /// to `next`, or the request's error.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn update_order_status(
        &self,
        id: &OrderId,
        current: OrderStatus,
        next: OrderStatus,
    ) -> Result<()> {
        if !current.can_transition_to(next) {
            return Err(AdminError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        let url = self
            .api
            .url(&["api", "admin", "orders", id.as_str(), "status"])?;
        let _: IgnoredAny = self.api.put(url, &json!({ "status": next })).await?;
        info!(from = %current, to = %next, "Order status updated");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn products(&self) -> Result<Vec<AdminProduct>> {
        Ok(self.api.get(self.api.url(&["api", "admin", "products"])?).await?)
    }

    /// Save a product after validating the draft.
    ///
    /// # Errors
    ///
    /// Returns `Validation` with per-field messages before any request, or
    /// the request's error.
    #[instrument(skip(self, draft), fields(product_id = %id))]
    pub async fn update_product(&self, id: &ProductId, draft: &ProductDraft) -> Result<AdminProduct> {
        draft.validate()?;
        let url = self.api.url(&["api", "admin", "products", id.as_str()])?;
        let product = self.api.put(url, draft).await?;
        self.api.invalidate_cache();
        Ok(product)
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn customers(&self) -> Result<Vec<AdminCustomer>> {
        Ok(self.api.get(self.api.url(&["api", "admin", "customers"])?).await?)
    }

    /// Fetch a list and render it in `format`.
    ///
    /// # Errors
    ///
    /// Returns the fetch or export error.
    #[instrument(skip(self))]
    pub async fn export(&self, kind: ExportKind, format: ExportFormat) -> Result<String> {
        let table = match kind {
            ExportKind::Orders => {
                Table::from_records("Orders", &self.orders(OrderQuery::default()).await?.items)
            }
            ExportKind::Products => Table::from_records("Products", &self.products().await?),
            ExportKind::Customers => Table::from_records("Customers", &self.customers().await?),
        };
        Ok(export(&table, format)?)
    }
}
