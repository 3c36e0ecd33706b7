//! Catalog types and query-string driven product filters.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use inkcartridges_core::{CartItem, ProductId, ReviewId, StockStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default page size for product listings.
pub const DEFAULT_PER_PAGE: u32 = 24;

/// Largest page size the backend accepts.
pub const MAX_PER_PAGE: u32 = 100;

/// A product as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub in_stock: bool,
    #[serde(default)]
    pub stock_quantity: Option<u32>,
    /// Printer models this cartridge fits.
    #[serde(default)]
    pub compatible_printers: Vec<String>,
}

const fn default_true() -> bool {
    true
}

impl Product {
    /// Stock bucket for display.
    #[must_use]
    pub const fn stock_status(&self) -> StockStatus {
        StockStatus::from_quantity(self.in_stock, self.stock_quantity)
    }

    /// Whether the product is discounted against its compare-at price.
    #[must_use]
    pub fn is_on_sale(&self) -> bool {
        self.compare_at_price.is_some_and(|was| was > self.price)
    }

    /// Cart line for this product.
    #[must_use]
    pub fn to_cart_item(&self, quantity: u32) -> CartItem {
        CartItem {
            id: self.id.clone(),
            name: self.name.clone(),
            price: self.price,
            image: self.image_url.clone(),
            sku: Some(self.sku.clone()),
            brand: self.brand.clone(),
            color: self.color.clone(),
            quantity,
            in_stock: self.in_stock,
            stock_quantity: self.stock_quantity,
        }
    }
}

/// One page of a product listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProductPage {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

const fn default_page() -> u32 {
    1
}

const fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

impl ProductPage {
    /// Number of pages for the current total.
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.per_page))
    }

    /// Whether a following page exists.
    #[must_use]
    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }
}

/// Listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Relevance,
    PriceAsc,
    PriceDesc,
    NameAsc,
    Newest,
}

impl SortOrder {
    /// Query-string value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::PriceAsc => "price_asc",
            Self::PriceDesc => "price_desc",
            Self::NameAsc => "name_asc",
            Self::Newest => "newest",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevance" => Ok(Self::Relevance),
            "price_asc" | "price-low" => Ok(Self::PriceAsc),
            "price_desc" | "price-high" => Ok(Self::PriceDesc),
            "name_asc" | "name" => Ok(Self::NameAsc),
            "newest" => Ok(Self::Newest),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

/// Product listing filters.
///
/// Filters live in the page URL, so they round-trip through a query string.
/// Unknown parameters and unparseable values are ignored on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductFilters {
    pub search: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub color: Option<String>,
    pub printer: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub in_stock: bool,
    pub sort: Option<SortOrder>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ProductFilters {
    /// Parse filters from a query string (with or without the leading `?`).
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let mut filters = Self::default();
        let query = query.trim_start_matches('?');

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "q" | "search" => filters.search = Some(value.to_string()),
                "brand" => filters.brand = Some(value.to_string()),
                "category" => filters.category = Some(value.to_string()),
                "color" => filters.color = Some(value.to_string()),
                "printer" => filters.printer = Some(value.to_string()),
                "min_price" => filters.min_price = value.parse().ok(),
                "max_price" => filters.max_price = value.parse().ok(),
                "in_stock" => filters.in_stock = matches!(value, "1" | "true"),
                "sort" => filters.sort = value.parse().ok(),
                "page" => filters.page = value.parse::<u32>().ok().filter(|p| *p > 0),
                "per_page" => {
                    filters.per_page = value
                        .parse::<u32>()
                        .ok()
                        .filter(|p| *p > 0)
                        .map(|p| p.min(MAX_PER_PAGE));
                }
                _ => {}
            }
        }
        filters
    }

    /// Query parameters in a stable order. Unset filters are omitted.
    #[must_use]
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(search) = &self.search {
            pairs.push(("q", search.clone()));
        }
        if let Some(brand) = &self.brand {
            pairs.push(("brand", brand.clone()));
        }
        if let Some(category) = &self.category {
            pairs.push(("category", category.clone()));
        }
        if let Some(color) = &self.color {
            pairs.push(("color", color.clone()));
        }
        if let Some(printer) = &self.printer {
            pairs.push(("printer", printer.clone()));
        }
        if let Some(min) = self.min_price {
            pairs.push(("min_price", min.to_string()));
        }
        if let Some(max) = self.max_price {
            pairs.push(("max_price", max.to_string()));
        }
        if self.in_stock {
            pairs.push(("in_stock", "true".to_string()));
        }
        if let Some(sort) = self.sort.filter(|s| *s != SortOrder::Relevance) {
            pairs.push(("sort", sort.as_str().to_string()));
        }
        if let Some(page) = self.page.filter(|p| *p > 1) {
            pairs.push(("page", page.to_string()));
        }
        if let Some(per_page) = self.per_page {
            pairs.push(("per_page", per_page.to_string()));
        }
        pairs
    }

    /// Encoded query string without the leading `?`.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.to_query_pairs())
            .finish()
    }

    /// Whether any filter narrows the listing.
    #[must_use]
    pub fn is_filtered(&self) -> bool {
        self.search.is_some()
            || self.brand.is_some()
            || self.category.is_some()
            || self.color.is_some()
            || self.printer.is_some()
            || self.min_price.is_some()
            || self.max_price.is_some()
            || self.in_stock
    }

    /// Same filters on another page. Changing any filter should reset to page 1.
    #[must_use]
    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page: Some(page.max(1)),
            ..self.clone()
        }
    }
}

/// A brand in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub product_count: Option<u32>,
}

/// A product review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    /// 1 to 5 stars.
    pub rating: u8,
    #[serde(default)]
    pub title: Option<String>,
    pub body: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub verified_purchase: bool,
    pub created_at: DateTime<Utc>,
}

/// Mean star rating, rounded to one decimal place.
#[must_use]
pub fn average_rating(reviews: &[Review]) -> Option<Decimal> {
    if reviews.is_empty() {
        return None;
    }
    let sum: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
    let count = Decimal::from(reviews.len());
    Some((Decimal::from(sum) / count).round_dp(1))
}

/// A shipping option for a given subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRate {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub estimated_days: Option<String>,
}

/// Search autocomplete entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_query_round_trip() {
        let filters = ProductFilters::from_query(
            "?q=hp+65&brand=HP&min_price=10&max_price=50.5&in_stock=1&sort=price_asc&page=2&utm_source=x",
        );
        assert_eq!(filters.search.as_deref(), Some("hp 65"));
        assert_eq!(filters.brand.as_deref(), Some("HP"));
        assert_eq!(filters.min_price, Some(Decimal::new(10, 0)));
        assert_eq!(filters.max_price, Some(Decimal::new(505, 1)));
        assert!(filters.in_stock);
        assert_eq!(filters.sort, Some(SortOrder::PriceAsc));
        assert_eq!(filters.page, Some(2));

        let again = ProductFilters::from_query(&filters.to_query_string());
        assert_eq!(again, filters);
    }

    #[test]
    fn test_filters_ignore_bad_values() {
        let filters = ProductFilters::from_query("min_price=abc&page=0&sort=bogus&per_page=5000");
        assert_eq!(filters.min_price, None);
        assert_eq!(filters.page, None);
        assert_eq!(filters.sort, None);
        assert_eq!(filters.per_page, Some(MAX_PER_PAGE));
        assert!(!filters.is_filtered());
    }

    #[test]
    fn test_default_page_and_sort_are_omitted() {
        let filters = ProductFilters {
            sort: Some(SortOrder::Relevance),
            page: Some(1),
            ..ProductFilters::default()
        };
        assert_eq!(filters.to_query_string(), "");
        assert_eq!(filters.with_page(3).to_query_string(), "page=3");
    }

    #[test]
    fn test_product_page_paging() {
        let page = ProductPage {
            products: vec![],
            total: 50,
            page: 2,
            per_page: 24,
        };
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());
    }

    #[test]
    fn test_average_rating() {
        let review = |rating| Review {
            id: ReviewId::new("r"),
            rating,
            title: None,
            body: "Good".to_string(),
            author: None,
            verified_purchase: true,
            created_at: Utc::now(),
        };
        assert_eq!(average_rating(&[]), None);
        assert_eq!(
            average_rating(&[review(5), review(4), review(4)]),
            Some(Decimal::new(43, 1))
        );
    }
}
