//! Customer account types: profile, addresses, saved printers, order history.

use chrono::{DateTime, Utc};
use inkcartridges_core::{AddressId, OrderId, OrderStatus, PrinterId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The signed-in customer's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

impl Profile {
    /// Name for greetings, falling back to the email address.
    #[must_use]
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            _ => self.email.clone(),
        }
    }
}

/// Editable profile fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A saved shipping address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    #[serde(flatten)]
    pub fields: NewAddress,
    #[serde(default)]
    pub is_default: bool,
}

/// Address fields as entered by the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAddress {
    pub recipient: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub region: Option<String>,
    pub postcode: String,
    pub country: String,
}

impl NewAddress {
    /// Check required fields before sending.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("recipient", &self.recipient),
            ("address line 1", &self.line1),
            ("city", &self.city),
            ("postcode", &self.postcode),
            ("country", &self.country),
        ];
        for (label, value) in required {
            if value.trim().is_empty() {
                return Err(format!("Please enter a {label}"));
            }
        }
        if self.country.trim().eq_ignore_ascii_case("NZ")
            && !(self.postcode.trim().len() == 4
                && self.postcode.trim().chars().all(|c| c.is_ascii_digit()))
        {
            return Err("NZ postcodes are 4 digits".to_string());
        }
        Ok(())
    }
}

/// A printer saved to the account for quick reordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPrinter {
    pub id: PrinterId,
    pub brand: String,
    #[serde(default)]
    pub series: Option<String>,
    pub model: String,
    #[serde(default)]
    pub nickname: Option<String>,
}

/// A past order in the customer's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub total: Decimal,
    #[serde(default)]
    pub item_count: u32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address() -> NewAddress {
        NewAddress {
            recipient: "Aroha Smith".to_string(),
            line1: "12 Queen Street".to_string(),
            line2: None,
            city: "Auckland".to_string(),
            region: None,
            postcode: "1010".to_string(),
            country: "NZ".to_string(),
        }
    }

    #[test]
    fn test_address_validation() {
        assert!(address().validate().is_ok());

        let mut missing = address();
        missing.city = "  ".to_string();
        assert_eq!(missing.validate().unwrap_err(), "Please enter a city");

        let mut bad_postcode = address();
        bad_postcode.postcode = "10101".to_string();
        assert!(bad_postcode.validate().is_err());
    }

    #[test]
    fn test_address_wire_format_is_flat() {
        let json = r#"{"id":"a1","recipient":"A","line1":"1 St","city":"C","postcode":"1010","country":"NZ","is_default":true}"#;
        let address: Address = serde_json::from_str(json).unwrap();
        assert!(address.is_default);
        assert_eq!(address.fields.city, "C");
    }

    #[test]
    fn test_display_name() {
        let profile = Profile {
            id: UserId::new("u"),
            email: "kim@example.co.nz".to_string(),
            first_name: None,
            last_name: None,
            phone: None,
            email_verified: false,
        };
        assert_eq!(profile.display_name(), "kim@example.co.nz");
    }
}
