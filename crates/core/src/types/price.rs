//! Type-safe money representation using decimal arithmetic.
//!
//! The backend prices everything; the client only needs to carry amounts
//! around, add them up for guest-cart estimates, and render them.

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors from money arithmetic.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// Two amounts with different currencies were combined.
    #[error("currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch {
        /// Currency of the left-hand operand.
        expected: CurrencyCode,
        /// Currency of the right-hand operand.
        found: CurrencyCode,
    },
    /// The arithmetic overflowed.
    #[error("money arithmetic overflowed")]
    Overflow,
}

/// A monetary amount with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Money {
    /// Create a new amount.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Zero in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::ZERO, currency_code)
    }

    /// Create an amount from minor units (e.g., cents).
    ///
    /// ```
    /// use marigold_core::{CurrencyCode, Money};
    ///
    /// let price = Money::from_minor(1999, CurrencyCode::USD);
    /// assert_eq!(price.to_string(), "$19.99");
    /// ```
    #[must_use]
    pub fn from_minor(minor: i64, currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::new(minor, 2), currency_code)
    }

    /// Whether the amount is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Add two amounts of the same currency.
    ///
    /// # Errors
    ///
    /// Returns an error if the currencies differ or the sum overflows.
    pub fn checked_add(self, other: Self) -> Result<Self, MoneyError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency_code))
    }

    /// Subtract an amount of the same currency.
    ///
    /// # Errors
    ///
    /// Returns an error if the currencies differ or the difference overflows.
    pub fn checked_sub(self, other: Self) -> Result<Self, MoneyError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency_code))
    }

    /// Subtract, flooring the result at zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the currencies differ.
    pub fn saturating_sub_to_zero(self, other: Self) -> Result<Self, MoneyError> {
        let diff = self.checked_sub(other)?;
        if diff.amount.is_sign_negative() {
            Ok(Self::zero(self.currency_code))
        } else {
            Ok(diff)
        }
    }

    /// Multiply a unit price by a quantity.
    ///
    /// # Errors
    ///
    /// Returns an error if the product overflows.
    pub fn times(self, quantity: u32) -> Result<Self, MoneyError> {
        let amount = self
            .amount
            .checked_mul(Decimal::from(quantity))
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency_code))
    }

    fn ensure_same_currency(self, other: Self) -> Result<(), MoneyError> {
        if self.currency_code != other.currency_code {
            return Err(MoneyError::CurrencyMismatch {
                expected: self.currency_code,
                found: other.currency_code,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = self.currency_code.symbol();
        let rounded = self.amount.round_dp(2);
        if rounded.is_sign_negative() && !rounded.is_zero() {
            write!(f, "-{symbol}{:.2}", rounded.abs())
        } else {
            write!(f, "{symbol}{:.2}", rounded.abs())
        }
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
    INR,
}

impl CurrencyCode {
    /// Display symbol for the currency.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
            Self::INR => "₹",
        }
    }

    /// Three-letter ISO code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
            Self::INR => "INR",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            "CAD" => Ok(Self::CAD),
            "AUD" => Ok(Self::AUD),
            "INR" => Ok(Self::INR),
            other => Err(format!("unsupported currency code: {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn usd(minor: i64) -> Money {
        Money::from_minor(minor, CurrencyCode::USD)
    }

    #[test]
    fn test_display_formats_two_decimals() {
        assert_eq!(usd(1999).to_string(), "$19.99");
        assert_eq!(usd(500).to_string(), "$5.00");
        assert_eq!(
            Money::from_minor(500, CurrencyCode::EUR).to_string(),
            "€5.00"
        );
        assert_eq!(usd(-250).to_string(), "-$2.50");
    }

    #[test]
    fn test_checked_add_same_currency() {
        assert_eq!(usd(150).checked_add(usd(250)).unwrap(), usd(400));
    }

    #[test]
    fn test_checked_add_currency_mismatch() {
        let err = usd(100)
            .checked_add(Money::from_minor(100, CurrencyCode::GBP))
            .unwrap_err();
        assert_eq!(
            err,
            MoneyError::CurrencyMismatch {
                expected: CurrencyCode::USD,
                found: CurrencyCode::GBP,
            }
        );
    }

    #[test]
    fn test_saturating_sub_floors_at_zero() {
        let result = usd(500).saturating_sub_to_zero(usd(800)).unwrap();
        assert!(result.is_zero());
        assert_eq!(usd(800).saturating_sub_to_zero(usd(500)).unwrap(), usd(300));
    }

    #[test]
    fn test_times() {
        assert_eq!(usd(1250).times(3).unwrap(), usd(3750));
        assert!(usd(1250).times(0).unwrap().is_zero());
    }

    #[test]
    fn test_deserialize_string_and_number_amounts() {
        let from_str: Money =
            serde_json::from_str(r#"{"amount":"19.99","currency_code":"USD"}"#).unwrap();
        let from_num: Money =
            serde_json::from_str(r#"{"amount":19.99,"currency_code":"USD"}"#).unwrap();
        assert_eq!(from_str, usd(1999));
        assert_eq!(from_num, usd(1999));
    }

    #[test]
    fn test_currency_from_str() {
        assert_eq!("eur".parse::<CurrencyCode>().unwrap(), CurrencyCode::EUR);
        assert!("XYZ".parse::<CurrencyCode>().is_err());
    }
}
