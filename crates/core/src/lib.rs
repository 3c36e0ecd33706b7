//! Ink Cartridges Core - Shared types library.
//!
//! This crate provides common types used across all storefront components:
//! - `storefront` - Customer-facing client runtime (cart, favourites, finder)
//! - `admin` - Back-office client (dashboard, exports, product edit)
//! - `cli` - Terminal front-end driving both
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no HTTP
//! clients, no storage. All pricing truth lives in the backend API; the types
//! here only describe what the backend returns and what the client caches.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, prices, emails, statuses, cart model, API envelope
//! - [`format`] - HTML escaping, price formatting, free-shipping progress

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod format;
pub mod types;

pub use types::*;
