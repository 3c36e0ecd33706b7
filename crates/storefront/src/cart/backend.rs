//! The server side of the cart, as seen by the sync engine.

use std::future::Future;

use inkcartridges_core::{CartValidation, ProductId, ServerCart};

use crate::error::ApiError;

/// Cart endpoints the sync engine needs.
///
/// Mutations report only success or failure: the engine always re-fetches
/// the cart afterwards, so the server copy is the single source of prices.
/// [`crate::api::ApiClient`] is the production implementation.
pub trait CartBackend: Send + Sync {
    /// `GET /api/cart`
    fn fetch_cart(&self) -> impl Future<Output = Result<ServerCart, ApiError>> + Send;

    /// `POST /api/cart/items`
    fn add_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `PUT /api/cart/items/{id}`
    fn update_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `DELETE /api/cart/items/{id}`
    fn remove_item(
        &self,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `DELETE /api/cart`
    fn clear_cart(&self) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `POST /api/cart/merge`: fold the cookie-identified guest cart into
    /// the signed-in user's cart.
    fn merge_guest_cart(&self) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `POST /api/cart/coupon`
    fn apply_coupon(&self, code: &str) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `DELETE /api/cart/coupon`
    fn remove_coupon(&self) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `POST /api/cart/validate`
    fn validate_cart(&self) -> impl Future<Output = Result<CartValidation, ApiError>> + Send;
}
