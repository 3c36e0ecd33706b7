//! Back-office records as returned by the admin API.

use chrono::{DateTime, NaiveDate, Utc};
use inkcartridges_core::{CustomerId, OrderId, OrderStatus, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An order in the admin list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminOrder {
    pub id: OrderId,
    pub order_number: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub status: OrderStatus,
    pub total: Decimal,
    #[serde(default)]
    pub item_count: u32,
    pub created_at: DateTime<Utc>,
}

/// A product in the admin list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminProduct {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default = "default_true")]
    pub active: bool,
}

const fn default_true() -> bool {
    true
}

/// A customer in the admin list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCustomer {
    pub id: CustomerId,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub order_count: u32,
    #[serde(default)]
    pub total_spent: Decimal,
    pub created_at: DateTime<Utc>,
}

/// One day of revenue. Days without orders may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: Decimal,
    #[serde(default)]
    pub orders: u32,
}

/// Totals for a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PeriodTotals {
    pub revenue: Decimal,
    pub orders: u32,
    #[serde(default)]
    pub customers: u32,
}

/// `GET /api/admin/analytics/overview`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsOverview {
    pub current: PeriodTotals,
    /// Same-length period immediately before, for comparison.
    #[serde(default)]
    pub previous: Option<PeriodTotals>,
    #[serde(default)]
    pub daily: Vec<DailyRevenue>,
}

/// A page of results from an admin list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "first_page")]
    pub page: u32,
}

const fn first_page() -> u32 {
    1
}
