//! Ink Cartridges admin library.
//!
//! Back-office functionality on top of the storefront API client: the
//! analytics dashboard, order and product management, and exports.
//!
//! # Modules
//!
//! - [`client`] - Admin endpoints over the shared `ApiClient`
//! - [`dashboard`] - KPIs, period comparison, revenue series, saved filters
//! - [`product_edit`] - Product draft validation
//! - [`export`] - CSV, JSON, XML and HTML table export
//! - [`prefs`] - Theme, tab and sidebar preferences

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod client;
pub mod dashboard;
pub mod error;
pub mod export;
pub mod models;
pub mod prefs;
pub mod product_edit;

pub use client::{AdminClient, ExportKind, OrderQuery};
pub use error::{AdminError, Result};
