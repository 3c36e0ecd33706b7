//! Type-safe price representation using decimal arithmetic.
//!
//! Prices coming from the backend are never recomputed for checkout; this
//! type exists so the client can display them and build clearly-labelled
//! estimates without floating point drift.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a price in the store's default currency.
    #[must_use]
    pub fn from_amount(amount: Decimal) -> Self {
        Self::new(amount, CurrencyCode::default())
    }

    /// Create a price from an integer number of cents.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self::from_amount(Decimal::new(cents, 2))
    }

    /// Amount rounded half-up to two decimal places.
    #[must_use]
    pub fn rounded(&self) -> Decimal {
        self.amount
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Format for display (e.g., "$1,234.50").
    #[must_use]
    pub fn display(&self) -> String {
        crate::format::format_amount(self.amount, self.currency_code)
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}

/// ISO 4217 currency codes the store sells in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    NZD,
    AUD,
    USD,
}

impl CurrencyCode {
    /// Display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::NZD | Self::AUD | Self::USD => "$",
        }
    }

    /// ISO code string.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NZD => "NZD",
            Self::AUD => "AUD",
            Self::USD => "USD",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let price = Price::from_cents(1999);
        assert_eq!(price.amount, Decimal::new(1999, 2));
        assert_eq!(price.currency_code, CurrencyCode::NZD);
    }

    #[test]
    fn test_rounded_half_up() {
        let price = Price::from_amount(Decimal::new(10005, 3));
        assert_eq!(price.rounded(), Decimal::new(1001, 2));
    }

    #[test]
    fn test_display() {
        assert_eq!(Price::from_cents(123_450).to_string(), "$1,234.50");
    }
}
