//! Shipping addresses.

use marigold_core::AddressId;
use serde::{Deserialize, Serialize};

/// A saved shipping address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    /// Address ID.
    pub id: AddressId,
    /// Recipient name.
    pub full_name: String,
    /// Address line 1.
    pub line1: String,
    /// Address line 2.
    #[serde(default)]
    pub line2: Option<String>,
    /// City.
    pub city: String,
    /// State or province.
    #[serde(default)]
    pub state: Option<String>,
    /// Postal/ZIP code.
    pub postal_code: String,
    /// Country (ISO code or name).
    pub country: String,
    /// Contact phone.
    #[serde(default)]
    pub phone: Option<String>,
    /// Whether this is the default shipping address.
    #[serde(default)]
    pub is_default: bool,
}

impl Address {
    /// Format the address as a single line.
    #[must_use]
    pub fn formatted_single_line(&self) -> String {
        let mut parts = vec![self.line1.clone()];

        if let Some(line2) = &self.line2
            && !line2.is_empty()
        {
            parts.push(line2.clone());
        }
        parts.push(self.city.clone());
        if let Some(state) = &self.state
            && !state.is_empty()
        {
            parts.push(state.clone());
        }
        parts.push(self.postal_code.clone());
        parts.push(self.country.clone());

        parts.retain(|part| !part.is_empty());
        parts.join(", ")
    }
}

/// Input for creating or updating an address.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AddressInput {
    /// Recipient name.
    pub full_name: String,
    /// Address line 1.
    pub line1: String,
    /// Address line 2.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    /// City.
    pub city: String,
    /// State or province.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Postal/ZIP code.
    pub postal_code: String,
    /// Country.
    pub country: String,
    /// Contact phone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Make this the default address.
    pub is_default: bool,
}

impl AddressInput {
    /// Names of required fields that are blank.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("full_name", &self.full_name),
            ("line1", &self.line1),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Check required fields before sending.
    ///
    /// # Errors
    ///
    /// Returns a message listing the blank required fields.
    pub fn validate(&self) -> Result<(), String> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("missing required fields: {}", missing.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> AddressInput {
        AddressInput {
            full_name: "Ada Lovelace".to_string(),
            line1: "12 St James's Square".to_string(),
            city: "London".to_string(),
            postal_code: "SW1Y 4JH".to_string(),
            country: "GB".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_accepts_complete_input() {
        assert!(input().validate().is_ok());
    }

    #[test]
    fn test_validate_lists_blank_fields() {
        let mut address = input();
        address.city = "  ".to_string();
        address.country = String::new();

        assert_eq!(address.missing_fields(), vec!["city", "country"]);
        assert_eq!(
            address.validate().unwrap_err(),
            "missing required fields: city, country"
        );
    }

    #[test]
    fn test_formatted_single_line_skips_empty_parts() {
        let address = Address {
            id: AddressId::new(1),
            full_name: "Ada Lovelace".to_string(),
            line1: "12 St James's Square".to_string(),
            line2: Some(String::new()),
            city: "London".to_string(),
            state: None,
            postal_code: "SW1Y 4JH".to_string(),
            country: "GB".to_string(),
            phone: None,
            is_default: true,
        };

        assert_eq!(
            address.formatted_single_line(),
            "12 St James's Square, London, SW1Y 4JH, GB"
        );
    }
}
