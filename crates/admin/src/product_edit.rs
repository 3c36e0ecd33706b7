//! Product edit form: draft values and their validation.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::FieldErrors;
use crate::models::AdminProduct;

const MAX_NAME_CHARS: usize = 200;
const SKU_CHARS: std::ops::RangeInclusive<usize> = 3..=32;

/// Editable product fields, as sent to `PUT /api/admin/products/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductDraft {
    pub name: String,
    pub sku: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compare_at_price: Option<Decimal>,
    pub stock_quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub active: bool,
}

impl From<&AdminProduct> for ProductDraft {
    fn from(product: &AdminProduct) -> Self {
        Self {
            name: product.name.clone(),
            sku: product.sku.clone(),
            brand: product.brand.clone(),
            price: product.price,
            compare_at_price: product.compare_at_price,
            stock_quantity: product.stock_quantity,
            description: None,
            active: product.active,
        }
    }
}

impl ProductDraft {
    /// Check every field and report all problems at once.
    ///
    /// # Errors
    ///
    /// Returns the per-field messages if anything is wrong.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.add("name", "Name is required");
        } else if name.chars().count() > MAX_NAME_CHARS {
            errors.add("name", format!("Name must be at most {MAX_NAME_CHARS} characters"));
        }

        if !is_valid_sku(&self.sku) {
            errors.add(
                "sku",
                "SKU must be 3-32 uppercase letters, digits or hyphens, starting with a letter or digit",
            );
        }

        if self.price <= Decimal::ZERO {
            errors.add("price", "Price must be greater than zero");
        } else if self.price.scale() > 2 && self.price != self.price.round_dp(2) {
            errors.add("price", "Price can have at most 2 decimal places");
        }

        if let Some(compare_at) = self.compare_at_price
            && compare_at < self.price
        {
            errors.add(
                "compare_at_price",
                "Compare-at price must be at least the price",
            );
        }

        if self.stock_quantity < 0 {
            errors.add("stock_quantity", "Stock cannot be negative");
        }

        errors.into_result()
    }
}

fn is_valid_sku(sku: &str) -> bool {
    SKU_CHARS.contains(&sku.len())
        && sku
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
        && !sku.starts_with('-')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn draft() -> ProductDraft {
        ProductDraft {
            name: "HP 65 Black".to_string(),
            sku: "HP65-BK".to_string(),
            brand: Some("HP".to_string()),
            price: Decimal::new(2499, 2),
            compare_at_price: Some(Decimal::new(2999, 2)),
            stock_quantity: 12,
            description: None,
            active: true,
        }
    }

    #[test]
    fn test_valid_draft() {
        assert!(draft().validate().is_ok());
    }

    #[test]
    fn test_every_problem_reported() {
        let bad = ProductDraft {
            name: "  ".to_string(),
            sku: "hp65".to_string(),
            price: Decimal::ZERO,
            compare_at_price: None,
            stock_quantity: -3,
            ..draft()
        };

        let errors = bad.validate().unwrap_err();

        assert_eq!(errors.len(), 4);
        assert!(errors.get("name").is_some());
        assert!(errors.get("sku").is_some());
        assert!(errors.get("price").is_some());
        assert!(errors.get("stock_quantity").is_some());
    }

    #[test]
    fn test_compare_at_below_price() {
        let bad = ProductDraft {
            compare_at_price: Some(Decimal::new(1999, 2)),
            ..draft()
        };
        let errors = bad.validate().unwrap_err();
        assert_eq!(
            errors.get("compare_at_price"),
            Some("Compare-at price must be at least the price")
        );
    }

    #[test]
    fn test_sku_rules() {
        assert!(is_valid_sku("CN-PG540"));
        assert!(!is_valid_sku("-ABC"));
        assert!(!is_valid_sku("AB"));
        assert!(!is_valid_sku("ab-123"));
    }
}
