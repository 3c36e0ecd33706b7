//! Dashboard figures: KPIs with period-over-period change and a daily
//! revenue series for the chart.

use chrono::{Days, NaiveDate};
use inkcartridges_core::OrderStatus;
use inkcartridges_core::format::format_price;
use inkcartridges_storefront::storage::{Storage, StorageExt, keys};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AdminError, Result};
use crate::models::{AnalyticsOverview, DailyRevenue};

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// # Errors
    ///
    /// Returns `AdminError::DateRange` if `from` is after `to`.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(AdminError::DateRange(format!("{from} is after {to}")));
        }
        Ok(Self { from, to })
    }

    /// The last `days` days ending on `today`, inclusive.
    #[must_use]
    pub fn last_days(today: NaiveDate, days: u32) -> Self {
        let back = u64::from(days.max(1) - 1);
        Self {
            from: today.checked_sub_days(Days::new(back)).unwrap_or(today),
            to: today,
        }
    }

    /// Number of days covered.
    #[must_use]
    pub fn len_days(&self) -> u64 {
        u64::try_from((self.to - self.from).num_days()).unwrap_or(0) + 1
    }

    /// Every date in the range, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        self.from.iter_days().take_while(move |d| *d <= self.to)
    }
}

/// Range choices offered on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RangePreset {
    Last7Days,
    #[default]
    Last30Days,
    Last90Days,
}

impl RangePreset {
    #[must_use]
    pub const fn days(self) -> u32 {
        match self {
            Self::Last7Days => 7,
            Self::Last30Days => 30,
            Self::Last90Days => 90,
        }
    }

    #[must_use]
    pub fn range(self, today: NaiveDate) -> DateRange {
        DateRange::last_days(today, self.days())
    }
}

impl std::str::FromStr for RangePreset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "7" | "7d" | "last_7_days" => Ok(Self::Last7Days),
            "30" | "30d" | "last_30_days" => Ok(Self::Last30Days),
            "90" | "90d" | "last_90_days" => Ok(Self::Last90Days),
            _ => Err(format!("unknown range: {s}")),
        }
    }
}

/// Dashboard filter selection, remembered between visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DashboardFilters {
    #[serde(default)]
    pub preset: RangePreset,
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

impl DashboardFilters {
    /// Saved filters, or the defaults if none (or unreadable).
    #[must_use]
    pub fn load(storage: &dyn Storage) -> Self {
        match storage.load_json(keys::ADMIN_DASHBOARD_FILTERS) {
            Ok(filters) => filters.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Could not read dashboard filters");
                Self::default()
            }
        }
    }

    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub fn save(&self, storage: &dyn Storage) -> Result<()> {
        storage.save_json(keys::ADMIN_DASHBOARD_FILTERS, self)?;
        Ok(())
    }
}

/// Headline numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kpis {
    pub revenue: Decimal,
    pub orders: u32,
    pub average_order_value: Decimal,
    /// Percent change in revenue vs the previous period, 1 dp.
    pub revenue_change: Option<Decimal>,
    pub orders_change: Option<Decimal>,
}

impl Kpis {
    #[must_use]
    pub fn compute(overview: &AnalyticsOverview) -> Self {
        let current = overview.current;
        let average_order_value = if current.orders == 0 {
            Decimal::ZERO
        } else {
            (current.revenue / Decimal::from(current.orders))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        };
        let previous = overview.previous;
        Self {
            revenue: current.revenue,
            orders: current.orders,
            average_order_value,
            revenue_change: previous.and_then(|p| percent_change(p.revenue, current.revenue)),
            orders_change: previous.and_then(|p| {
                percent_change(Decimal::from(p.orders), Decimal::from(current.orders))
            }),
        }
    }

    /// Display strings: revenue, orders, average order value.
    #[must_use]
    pub fn display(&self) -> [(&'static str, String); 3] {
        [
            ("Revenue", format_price(self.revenue)),
            ("Orders", self.orders.to_string()),
            ("Avg. order", format_price(self.average_order_value)),
        ]
    }
}

/// Percent change from `before` to `after`, or `None` if `before` is zero.
#[must_use]
pub fn percent_change(before: Decimal, after: Decimal) -> Option<Decimal> {
    if before.is_zero() {
        return None;
    }
    Some(
        ((after - before) / before * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero),
    )
}

/// A point on the revenue chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub revenue: Decimal,
    pub orders: u32,
}

/// One point per day in `range`, zero where the backend sent nothing.
/// Entries outside the range are ignored; duplicates for a day are summed.
#[must_use]
pub fn revenue_series(daily: &[DailyRevenue], range: DateRange) -> Vec<SeriesPoint> {
    range
        .days()
        .map(|date| {
            let (revenue, orders) = daily
                .iter()
                .filter(|d| d.date == date)
                .fold((Decimal::ZERO, 0u32), |(r, o), d| {
                    (r + d.revenue, o.saturating_add(d.orders))
                });
            SeriesPoint {
                date,
                revenue,
                orders,
            }
        })
        .collect()
}
