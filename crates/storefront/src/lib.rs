//! Ink Cartridges storefront client runtime.
//!
//! Everything the shop front needs beyond rendering: the backend API
//! client, the auth session, the cart sync engine, favourites, catalog
//! filters, search autocomplete and the ink finder. [`state::Storefront`]
//! wires them together.
//!
//! # Modules
//!
//! - [`api`] - REST client with envelope decoding and refresh-on-401
//! - [`auth`] - Managed auth provider session
//! - [`cart`] - Optimistic cart with server reconciliation
//! - [`favourites`] - Wishlist, local for guests and server-side when signed in
//! - [`catalog`] - Product, brand and filter types
//! - [`search`] - Debounced autocomplete
//! - [`ink_finder`] - Brand → series → model printer lookup
//! - [`render`] - Cart drawer and toast HTML fragments

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod account;
pub mod api;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod debounce;
pub mod error;
pub mod favourites;
pub mod ink_finder;
pub mod notify;
pub mod render;
pub mod search;
pub mod state;
pub mod storage;

pub use state::Storefront;
