//! Plain-text rendering of command results to stdout.

use std::io::{self, Write};

use inkcartridges_core::format::format_price;
use inkcartridges_storefront::cart::{Amount, CartSnapshot};
use inkcartridges_storefront::notify::Toast;

use crate::error::CliError;

/// Write one line to stdout.
pub fn line(text: impl AsRef<str>) -> Result<(), CliError> {
    let mut out = io::stdout().lock();
    writeln!(out, "{}", text.as_ref())?;
    Ok(())
}

/// Print collected toasts as `[kind] message`.
pub fn toasts(toasts: &[Toast]) -> Result<(), CliError> {
    let mut out = io::stdout().lock();
    for toast in toasts {
        writeln!(out, "[{}] {}", toast.kind.as_str(), toast.message)?;
    }
    Ok(())
}

fn amount(label: &str, value: Amount) -> String {
    let suffix = if value.is_verified() { "" } else { " (estimated)" };
    format!("{label:<10} {:>12}{suffix}", value.display())
}

/// Cart lines followed by totals. Estimates are labelled as such.
pub fn cart(snapshot: &CartSnapshot) -> Result<(), CliError> {
    let mut out = io::stdout().lock();
    if snapshot.items.is_empty() {
        writeln!(out, "Your cart is empty")?;
        return Ok(());
    }

    for item in &snapshot.items {
        writeln!(
            out,
            "{:>3} x {:<40} {:>10}  [{}]",
            item.quantity,
            item.name,
            format_price(item.line_total()),
            item.id
        )?;
    }
    writeln!(out)?;

    let totals = &snapshot.totals;
    writeln!(out, "{}", amount("Subtotal", totals.subtotal))?;
    if !totals.discount.value().is_zero() {
        writeln!(out, "{}", amount("Discount", totals.discount))?;
    }
    writeln!(out, "{}", amount("Shipping", totals.shipping))?;
    writeln!(out, "{}", amount("Total", totals.total))?;
    if let Some(coupon) = &snapshot.coupon {
        writeln!(out, "Coupon: {}", coupon.code)?;
    }
    writeln!(out, "({} items, {:?})", snapshot.item_count(), snapshot.sync)?;
    Ok(())
}
