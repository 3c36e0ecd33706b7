//! CLI error type.

use inkcartridges_admin::AdminError;
use inkcartridges_storefront::auth::AuthError;
use inkcartridges_storefront::cart::CartError;
use inkcartridges_storefront::config::ConfigError;
use inkcartridges_storefront::error::ApiError;
use inkcartridges_storefront::ink_finder::FinderError;
use inkcartridges_storefront::state::StorefrontError;
use inkcartridges_storefront::storage::StorageError;
use thiserror::Error;

/// Errors that end a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storefront(#[from] StorefrontError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Finder(#[from] FinderError),

    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("{0}")]
    Usage(String),

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}
