//! Cache types for read-mostly catalog lookups.

use crate::catalog::{Brand, Product};
use crate::ink_finder::PrinterModel;

/// Cache key for catalog and printer lookups.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Brands,
    ProductBySku(String),
    PrinterBrands,
    PrinterSeries { brand: String },
    PrinterModels { brand: String, series: String },
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Brands(Vec<Brand>),
    Product(Box<Product>),
    Names(Vec<String>),
    Models(Vec<PrinterModel>),
}
