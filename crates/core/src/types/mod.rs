//! Core types for the Ink Cartridges client.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod email;
pub mod envelope;
pub mod id;
pub mod price;
pub mod status;

pub use cart::{
    AppliedCoupon, CartIssue, CartItem, CartValidation, ServerCart, ServerCartItem, ServerSummary,
};
pub use email::{Email, EmailError};
pub use envelope::{ApiEnvelope, ErrorCode};
pub use id::*;
pub use price::{CurrencyCode, Price};
pub use status::*;
