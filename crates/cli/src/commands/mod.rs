//! Command implementations, one module per area.

pub mod admin;
pub mod cart;
pub mod shop;
