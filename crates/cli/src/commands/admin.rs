//! Back-office commands.
//!
//! # Usage
//!
//! ```bash
//! # KPIs for the saved range, or a new one (remembered for next time)
//! ink-cli admin dashboard --range 7d
//!
//! # Move an order along
//! ink-cli admin set-status 1f2e... --from processing --to shipped
//!
//! # Export products as a standalone HTML page
//! ink-cli admin export products --format html --out products.html
//! ```
//!
//! Requires a signed-in admin session (`ink-cli login`).

use std::path::PathBuf;

use chrono::Utc;
use clap::Subcommand;
use inkcartridges_admin::dashboard::{DashboardFilters, Kpis, RangePreset, revenue_series};
use inkcartridges_admin::export::ExportFormat;
use inkcartridges_admin::{AdminClient, ExportKind, OrderQuery};
use inkcartridges_core::{OrderId, OrderStatus};
use inkcartridges_core::format::format_price;
use inkcartridges_storefront::Storefront;
use inkcartridges_storefront::storage::FileStorage;
use tracing::info;

use crate::error::CliError;
use crate::output;

#[derive(Subcommand)]
pub enum AdminAction {
    /// Show KPIs and the daily revenue series
    Dashboard {
        /// 7d, 30d or 90d; saved as the new default
        #[arg(long)]
        range: Option<RangePreset>,
    },
    /// List orders
    Orders {
        #[arg(long)]
        status: Option<OrderStatus>,

        #[arg(long)]
        page: Option<u32>,
    },
    /// Change an order's status
    SetStatus {
        order_id: String,

        #[arg(long)]
        from: OrderStatus,

        #[arg(long)]
        to: OrderStatus,
    },
    /// Export orders, products or customers
    Export {
        kind: ExportKind,

        #[arg(short, long, default_value = "csv")]
        format: ExportFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

pub async fn run(storefront: &Storefront, action: AdminAction) -> Result<(), CliError> {
    let client = AdminClient::new(storefront.api().clone());
    match action {
        AdminAction::Dashboard { range } => dashboard(storefront, &client, range).await,
        AdminAction::Orders { status, page } => {
            let page = client.orders(OrderQuery { status, page }).await?;
            for order in &page.items {
                output::line(format!(
                    "{:<12} {}  {:<11} {:>10}  [{}]",
                    order.order_number,
                    order.created_at.format("%Y-%m-%d"),
                    order.status.label(),
                    format_price(order.total),
                    order.id
                ))?;
            }
            output::line(format!("{} orders", page.total))
        }
        AdminAction::SetStatus { order_id, from, to } => {
            client
                .update_order_status(&OrderId::new(order_id), from, to)
                .await?;
            output::line(format!("Order moved to {}", to.label()))
        }
        AdminAction::Export { kind, format, out } => {
            let document = client.export(kind, format).await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, document)?;
                    info!(path = %path.display(), "Export written");
                    Ok(())
                }
                None => output::line(document),
            }
        }
    }
}

async fn dashboard(
    storefront: &Storefront,
    client: &AdminClient,
    range: Option<RangePreset>,
) -> Result<(), CliError> {
    let storage = FileStorage::open(&storefront.config().storage_dir)?;
    let mut filters = DashboardFilters::load(&storage);
    if let Some(preset) = range {
        filters.preset = preset;
        filters.save(&storage)?;
    }

    let range = filters.preset.range(Utc::now().date_naive());
    let overview = client.analytics_overview(range).await?;
    let kpis = Kpis::compute(&overview);

    output::line(format!("{} to {}", range.from, range.to))?;
    for (label, value) in kpis.display() {
        output::line(format!("{label:<12} {value:>14}"))?;
    }
    if let Some(change) = kpis.revenue_change {
        output::line(format!("Revenue vs previous period: {change:+}%"))?;
    }
    if let Some(change) = kpis.orders_change {
        output::line(format!("Orders vs previous period: {change:+}%"))?;
    }
    output::line("")?;
    for point in revenue_series(&overview.daily, range) {
        output::line(format!(
            "{}  {:>12}  {}",
            point.date,
            format_price(point.revenue),
            point.orders
        ))?;
    }
    Ok(())
}
