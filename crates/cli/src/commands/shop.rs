//! Browsing, favourites, ink finder and sign-in commands.

use clap::{Args, Subcommand};
use inkcartridges_core::format::format_price;
use inkcartridges_storefront::Storefront;
use inkcartridges_storefront::catalog::{Product, ProductFilters};
use inkcartridges_storefront::favourites::FavouriteItem;
use inkcartridges_storefront::search::AutocompleteOutcome;
use secrecy::SecretString;
use tracing::info;

use crate::error::CliError;
use crate::output;

#[derive(Subcommand)]
pub enum FavouritesAction {
    /// List favourites
    List,
    /// Add or remove a product by SKU
    Toggle { sku: String },
}

/// Finder levels. Each missing level lists its options.
#[derive(Args)]
pub struct FinderArgs {
    #[arg(long)]
    pub brand: Option<String>,

    #[arg(long)]
    pub series: Option<String>,

    #[arg(long)]
    pub model: Option<String>,
}

fn print_products(products: &[Product]) -> Result<(), CliError> {
    for product in products {
        output::line(format!(
            "{:<16} {:<40} {:>10}  {}",
            product.sku,
            product.name,
            format_price(product.price),
            product.stock_status().label()
        ))?;
    }
    Ok(())
}

pub async fn favourites(storefront: &Storefront, action: FavouritesAction) -> Result<(), CliError> {
    let favourites = storefront.favourites();
    if let FavouritesAction::Toggle { sku } = action {
        let product = storefront.api().product_by_sku(&sku).await?;
        favourites.toggle(FavouriteItem::from(&product)).await?;
    }

    let items = favourites.items();
    if items.is_empty() {
        return output::line("No favourites yet");
    }
    for item in items {
        let price = item.price.map(format_price).unwrap_or_default();
        output::line(format!("{:<40} {:>10}  [{}]", item.name, price, item.id))?;
    }
    Ok(())
}

pub async fn finder(storefront: &Storefront, args: FinderArgs) -> Result<(), CliError> {
    let finder = storefront.ink_finder();

    let Some(brand) = args.brand else {
        for brand in finder.load_brands().await {
            output::line(brand)?;
        }
        return Ok(());
    };
    let series = finder.select_brand(&brand).await?;

    let Some(chosen_series) = args.series else {
        for name in series {
            output::line(name)?;
        }
        return Ok(());
    };
    let models = finder.select_series(&chosen_series).await?;

    let Some(model) = args.model else {
        for model in models {
            output::line(model.name)?;
        }
        return Ok(());
    };
    let selection = finder.select_model(&model)?;

    let filters = selection
        .product_filters()
        .ok_or_else(|| CliError::Usage("Choose a brand, series and model".to_string()))?;
    let page = storefront.api().list_products(&filters).await?;
    info!(results = page.total, "Compatible cartridges found");
    print_products(&page.products)
}

pub async fn search(storefront: &Storefront, query: &str) -> Result<(), CliError> {
    match storefront.autocomplete().input(query).await? {
        AutocompleteOutcome::TooShort => output::line("Type at least 2 characters"),
        AutocompleteOutcome::Superseded => Ok(()),
        AutocompleteOutcome::Suggestions(suggestions) => {
            for suggestion in suggestions {
                let price = suggestion.price.map(format_price).unwrap_or_default();
                output::line(format!("{:<40} {price}", suggestion.name))?;
            }
            Ok(())
        }
    }
}

pub async fn products(storefront: &Storefront, query: &str) -> Result<(), CliError> {
    let filters = ProductFilters::from_query(query);
    let page = storefront.api().list_products(&filters).await?;
    print_products(&page.products)?;
    output::line(format!(
        "Page {} of {} ({} products)",
        page.page,
        page.total_pages().max(1),
        page.total
    ))
}

pub async fn login(storefront: &Storefront, email: &str, password_env: &str) -> Result<(), CliError> {
    let password = std::env::var(password_env)
        .map(SecretString::from)
        .map_err(|_| CliError::MissingEnvVar(password_env.to_string()))?;
    let user = storefront.sign_in(email, &password).await?;
    output::line(format!(
        "Signed in as {}",
        user.email.as_deref().unwrap_or(email)
    ))
}
