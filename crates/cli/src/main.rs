//! Ink Cartridges CLI - drive the storefront and admin clients from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart with verified or estimated totals
//! ink-cli cart show
//!
//! # Add two of a cartridge by SKU
//! ink-cli cart add HP65-BK --quantity 2
//!
//! # Find cartridges for a printer
//! ink-cli finder --brand HP --series DeskJet --model "DeskJet 2720"
//!
//! # Sign in (password read from INK_PASSWORD)
//! ink-cli login -e shopper@example.co.nz
//!
//! # Export orders as CSV
//! ink-cli admin export orders --format csv --out orders.csv
//! ```
//!
//! # Environment Variables
//!
//! See `inkcartridges_storefront::config` for the backend settings.
//! `RUST_LOG` sets the log filter; `INK_LOG_JSON=1` switches logs to JSON.
//! Logs go to stderr so command output can be piped.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use clap::{Parser, Subcommand};
use inkcartridges_storefront::Storefront;
use inkcartridges_storefront::config::StorefrontConfig;
use inkcartridges_storefront::notify::{Notifier, ToastLog};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod output;

use error::CliError;

#[derive(Parser)]
#[command(name = "ink-cli")]
#[command(author, version, about = "Ink Cartridges storefront and admin CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show and change the cart
    Cart {
        #[command(subcommand)]
        action: commands::cart::CartAction,
    },
    /// Apply or remove a coupon
    Coupon {
        #[command(subcommand)]
        action: commands::cart::CouponAction,
    },
    /// List and toggle favourites
    Favourites {
        #[command(subcommand)]
        action: commands::shop::FavouritesAction,
    },
    /// Find cartridges by printer brand, series and model
    Finder(commands::shop::FinderArgs),
    /// Search suggestions for a query
    Search {
        query: String,
    },
    /// List products, filtered by a query string such as `brand=HP&in_stock=true`
    Products {
        #[arg(default_value = "")]
        query: String,
    },
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: String,

        /// Environment variable holding the password
        #[arg(long, default_value = "INK_PASSWORD")]
        password_env: String,
    },
    /// Sign out
    Logout,
    /// Back-office tools
    Admin {
        #[command(subcommand)]
        action: commands::admin::AdminAction,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "inkcartridges_storefront=info,inkcartridges_admin=info,ink_cli=info".into());
    let json = std::env::var("INK_LOG_JSON").is_ok_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = StorefrontConfig::from_env()?;
    let toasts = Arc::new(ToastLog::new());
    let notifier: Arc<dyn Notifier> = toasts.clone();
    let storefront = Storefront::from_config(config, Some(notifier))?;
    storefront.start().await;

    let result = match cli.command {
        Commands::Cart { action } => commands::cart::run(&storefront, action).await,
        Commands::Coupon { action } => commands::cart::coupon(&storefront, action).await,
        Commands::Favourites { action } => commands::shop::favourites(&storefront, action).await,
        Commands::Finder(args) => commands::shop::finder(&storefront, args).await,
        Commands::Search { query } => commands::shop::search(&storefront, &query).await,
        Commands::Products { query } => commands::shop::products(&storefront, &query).await,
        Commands::Login {
            email,
            password_env,
        } => commands::shop::login(&storefront, &email, &password_env).await,
        Commands::Logout => {
            storefront.sign_out().await;
            output::line("Signed out")
        }
        Commands::Admin { action } => commands::admin::run(&storefront, action).await,
    };

    // Toasts are shown even when the command failed; they explain rollbacks.
    output::toasts(&toasts.drain())?;
    result
}
