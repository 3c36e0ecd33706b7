//! Cart and coupon commands.
//!
//! # Usage
//!
//! ```bash
//! ink-cli cart add HP65-BK -q 2
//! ink-cli cart update 4f6c... 3
//! ink-cli cart checkout
//! ink-cli coupon apply SAVE10
//! ```

use clap::Subcommand;
use inkcartridges_core::ProductId;
use inkcartridges_core::format::format_price;
use inkcartridges_storefront::Storefront;
use inkcartridges_storefront::cart::{CheckoutBlock, CheckoutDecision};

use crate::error::CliError;
use crate::output;

#[derive(Subcommand)]
pub enum CartAction {
    /// Show the cart
    Show,
    /// Add a product by SKU
    Add {
        sku: String,

        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Set a line's quantity
    Update { product_id: String, quantity: u32 },
    /// Remove a line
    Remove { product_id: String },
    /// Remove every line
    Clear,
    /// Ask the server to check stock and prices
    Validate,
    /// Check whether checkout can start
    Checkout,
}

#[derive(Subcommand)]
pub enum CouponAction {
    /// Apply a coupon code
    Apply { code: String },
    /// Remove the applied coupon
    Remove,
}

pub async fn run(storefront: &Storefront, action: CartAction) -> Result<(), CliError> {
    let cart = storefront.cart();
    match action {
        CartAction::Show => {}
        CartAction::Add { sku, quantity } => {
            let product = storefront.api().product_by_sku(&sku).await?;
            cart.add_item(product.to_cart_item(quantity)).await?;
        }
        CartAction::Update {
            product_id,
            quantity,
        } => {
            cart.update_quantity(&ProductId::new(product_id), quantity)
                .await?;
        }
        CartAction::Remove { product_id } => {
            cart.remove_item(&ProductId::new(product_id)).await?;
        }
        CartAction::Clear => cart.clear().await?,
        CartAction::Validate => {
            let validation = cart.validate_cart().await?;
            let messages = validation.messages();
            if messages.is_empty() {
                output::line("Cart is valid")?;
            }
            for message in messages {
                output::line(format!("- {message}"))?;
            }
            return Ok(());
        }
        CartAction::Checkout => return checkout(storefront).await,
    }
    output::cart(&cart.snapshot())
}

async fn checkout(storefront: &Storefront) -> Result<(), CliError> {
    match storefront.cart().checkout().await? {
        CheckoutDecision::Proceed(totals) => {
            output::line(format!(
                "Ready for checkout: {} (shipping {})",
                format_price(totals.total()),
                format_price(totals.shipping())
            ))?;
        }
        CheckoutDecision::Blocked(CheckoutBlock::EmptyCart) => {
            output::line("Your cart is empty")?;
        }
        CheckoutDecision::Blocked(CheckoutBlock::PriceUnverified) => {
            output::line("Prices could not be confirmed yet. Please try again.")?;
        }
        CheckoutDecision::Blocked(CheckoutBlock::Issues(issues)) => {
            output::line("Please fix these before checkout:")?;
            for issue in issues {
                output::line(format!("- {issue}"))?;
            }
        }
    }
    Ok(())
}

pub async fn coupon(storefront: &Storefront, action: CouponAction) -> Result<(), CliError> {
    let cart = storefront.cart();
    match action {
        CouponAction::Apply { code } => cart.apply_coupon(&code).await?,
        CouponAction::Remove => cart.remove_coupon().await?,
    }
    output::cart(&cart.snapshot())
}
