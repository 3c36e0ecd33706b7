//! Cart endpoints.

use inkcartridges_core::{CartValidation, ProductId, ServerCart};
use serde::de::IgnoredAny;
use serde_json::json;
use tracing::instrument;

use super::ApiClient;
use crate::cart::CartBackend;
use crate::error::Result;

impl CartBackend for ApiClient {
    #[instrument(skip(self))]
    async fn fetch_cart(&self) -> Result<ServerCart> {
        let cart: Option<ServerCart> = self.get(self.url(&["api", "cart"])?).await?;
        Ok(cart.unwrap_or_default())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn add_item(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        let _: IgnoredAny = self
            .post(
                self.url(&["api", "cart", "items"])?,
                &json!({ "product_id": product_id, "quantity": quantity }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn update_item(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        let _: IgnoredAny = self
            .put(
                self.url(&["api", "cart", "items", product_id.as_str()])?,
                &json!({ "quantity": quantity }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn remove_item(&self, product_id: &ProductId) -> Result<()> {
        let _: IgnoredAny = self
            .delete(self.url(&["api", "cart", "items", product_id.as_str()])?)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_cart(&self) -> Result<()> {
        let _: IgnoredAny = self.delete(self.url(&["api", "cart"])?).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn merge_guest_cart(&self) -> Result<()> {
        let _: IgnoredAny = self
            .post(self.url(&["api", "cart", "merge"])?, &json!({}))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn apply_coupon(&self, code: &str) -> Result<()> {
        let _: IgnoredAny = self
            .post(
                self.url(&["api", "cart", "coupon"])?,
                &json!({ "code": code }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_coupon(&self) -> Result<()> {
        let _: IgnoredAny = self.delete(self.url(&["api", "cart", "coupon"])?).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn validate_cart(&self) -> Result<CartValidation> {
        self.post(self.url(&["api", "cart", "validate"])?, &json!({}))
            .await
    }
}
