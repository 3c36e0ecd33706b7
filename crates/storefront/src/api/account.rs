//! Account, order history and favourites endpoints. All require a session.

use inkcartridges_core::{AddressId, PrinterId, ProductId};
use serde::de::IgnoredAny;
use serde_json::json;
use tracing::instrument;

use super::ApiClient;
use crate::account::{
    Address, NewAddress, OrderSummary, Profile, ProfileUpdate, SavedPrinter,
};
use crate::error::{ApiError, Result};
use crate::favourites::{FavouriteItem, FavouritesBackend};

impl ApiClient {
    /// The signed-in customer's profile.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` without a session.
    #[instrument(skip(self))]
    pub async fn profile(&self) -> Result<Profile> {
        self.get(self.url(&["api", "user", "profile"])?).await
    }

    /// Update profile fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile> {
        self.put(self.url(&["api", "user", "profile"])?, update)
            .await
    }

    /// Saved addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn addresses(&self) -> Result<Vec<Address>> {
        self.get(self.url(&["api", "user", "addresses"])?).await
    }

    /// Save a new address. Validated before sending.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for incomplete addresses, otherwise the backend's error.
    #[instrument(skip(self, address))]
    pub async fn add_address(&self, address: &NewAddress) -> Result<Address> {
        address.validate().map_err(ApiError::Validation)?;
        self.post(self.url(&["api", "user", "addresses"])?, address)
            .await
    }

    /// Delete a saved address.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(address_id = %id))]
    pub async fn delete_address(&self, id: &AddressId) -> Result<()> {
        let _: IgnoredAny = self
            .delete(self.url(&["api", "user", "addresses", id.as_str()])?)
            .await?;
        Ok(())
    }

    /// Printers saved to the account.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn saved_printers(&self) -> Result<Vec<SavedPrinter>> {
        self.get(self.url(&["api", "user", "printers"])?).await
    }

    /// Save a printer chosen in the ink finder.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn save_printer(
        &self,
        brand: &str,
        series: Option<&str>,
        model: &str,
    ) -> Result<SavedPrinter> {
        self.post(
            self.url(&["api", "user", "printers"])?,
            &json!({ "brand": brand, "series": series, "model": model }),
        )
        .await
    }

    /// Remove a saved printer.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(printer_id = %id))]
    pub async fn delete_printer(&self, id: &PrinterId) -> Result<()> {
        let _: IgnoredAny = self
            .delete(self.url(&["api", "user", "printers", id.as_str()])?)
            .await?;
        Ok(())
    }

    /// Order history, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn orders(&self) -> Result<Vec<OrderSummary>> {
        self.get(self.url(&["api", "orders"])?).await
    }

    /// Ask the backend to mirror the auth user into its customer records.
    /// Called after every sign-in.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn sync_account(&self) -> Result<()> {
        let _: IgnoredAny = self
            .post(self.url(&["api", "account", "sync"])?, &json!({}))
            .await?;
        Ok(())
    }

    /// Send the verification email again.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn resend_verification_email(&self) -> Result<()> {
        let _: IgnoredAny = self
            .post(
                self.url(&["api", "email", "resend-verification"])?,
                &json!({}),
            )
            .await?;
        Ok(())
    }
}

impl FavouritesBackend for ApiClient {
    #[instrument(skip(self))]
    async fn list_favourites(&self) -> Result<Vec<FavouriteItem>> {
        self.get(self.url(&["api", "user", "favourites"])?).await
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn add_favourite(&self, product_id: &ProductId) -> Result<()> {
        let _: IgnoredAny = self
            .post(
                self.url(&["api", "user", "favourites"])?,
                &json!({ "product_id": product_id }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn remove_favourite(&self, product_id: &ProductId) -> Result<()> {
        let _: IgnoredAny = self
            .delete(self.url(&["api", "user", "favourites", product_id.as_str()])?)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, product_ids), fields(count = product_ids.len()))]
    async fn sync_favourites(&self, product_ids: &[ProductId]) -> Result<Vec<FavouriteItem>> {
        self.post(
            self.url(&["api", "user", "favourites", "sync"])?,
            &json!({ "product_ids": product_ids }),
        )
        .await
    }
}
