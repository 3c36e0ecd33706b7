//! Product, brand, review, shipping and autocomplete endpoints.

use rust_decimal::Decimal;
use tracing::{debug, instrument};

use super::ApiClient;
use super::cache::{CacheKey, CacheValue};
use crate::catalog::{Brand, Product, ProductFilters, ProductPage, Review, ShippingRate, Suggestion};
use crate::error::Result;
use crate::search::SuggestionSource;

impl ApiClient {
    /// List products matching `filters`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_products(&self, filters: &ProductFilters) -> Result<ProductPage> {
        let url = self.url_with_query(&["api", "products"], &filters.to_query_pairs())?;
        self.get(url).await
    }

    /// Look up a product by SKU.
    ///
    /// # Errors
    ///
    /// Returns a business error with code `NOT_FOUND` for unknown SKUs.
    #[instrument(skip(self))]
    pub async fn product_by_sku(&self, sku: &str) -> Result<Product> {
        let key = CacheKey::ProductBySku(sku.to_string());
        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product: Product = self.get(self.url(&["api", "products", sku])?).await?;
        self.inner
            .cache
            .insert(key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    /// All brands.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn brands(&self) -> Result<Vec<Brand>> {
        if let Some(CacheValue::Brands(brands)) = self.inner.cache.get(&CacheKey::Brands).await {
            debug!("Cache hit for brands");
            return Ok(brands);
        }

        let brands: Vec<Brand> = self.get(self.url(&["api", "brands"])?).await?;
        self.inner
            .cache
            .insert(CacheKey::Brands, CacheValue::Brands(brands.clone()))
            .await;
        Ok(brands)
    }

    /// Reviews for a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn reviews(&self, product_id: &str) -> Result<Vec<Review>> {
        self.get(self.url(&["api", "products", product_id, "reviews"])?)
            .await
    }

    /// Shipping options for a subtotal.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn shipping_rates(&self, subtotal: Decimal) -> Result<Vec<ShippingRate>> {
        let url = self.url_with_query(
            &["api", "shipping", "rates"],
            &[("subtotal", subtotal.to_string())],
        )?;
        self.get(url).await
    }
}

impl SuggestionSource for ApiClient {
    #[instrument(skip(self))]
    async fn suggestions(&self, query: &str) -> Result<Vec<Suggestion>> {
        let url = self.url_with_query(&["api", "search", "autocomplete"], &[("q", query)])?;
        self.get(url).await
    }
}
