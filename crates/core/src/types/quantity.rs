//! Per-line item quantity.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// Zero is not a quantity; remove the line instead.
    #[error("quantity must be at least 1")]
    Zero,
    /// Above the per-line maximum.
    #[error("quantity must be at most {max} (got {got})")]
    TooLarge {
        /// Maximum allowed quantity.
        max: u32,
        /// Requested quantity.
        got: u32,
    },
}

/// Quantity of a single cart line.
///
/// ## Constraints
///
/// - At least 1
/// - At most [`Quantity::MAX`]
///
/// ```
/// use marigold_core::Quantity;
///
/// assert!(Quantity::new(1).is_ok());
/// assert!(Quantity::new(0).is_err());
/// assert_eq!(Quantity::MAX_QUANTITY.saturating_add(5), Quantity::MAX_QUANTITY);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Maximum units of one SKU on a single line.
    pub const MAX: u32 = 99;

    /// The smallest valid quantity.
    pub const ONE: Self = Self(1);

    /// The largest valid quantity.
    pub const MAX_QUANTITY: Self = Self(Self::MAX);

    /// Create a quantity.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is zero or above [`Quantity::MAX`].
    pub const fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 {
            return Err(QuantityError::Zero);
        }
        if value > Self::MAX {
            return Err(QuantityError::TooLarge {
                max: Self::MAX,
                got: value,
            });
        }
        Ok(Self(value))
    }

    /// Get the underlying value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Add, clamping to [`Quantity::MAX`].
    #[must_use]
    pub const fn saturating_add(self, other: u32) -> Self {
        let sum = self.0.saturating_add(other);
        if sum > Self::MAX {
            Self(Self::MAX)
        } else {
            Self(sum)
        }
    }

    /// Clamp to an upper bound such as known stock, never below one.
    #[must_use]
    pub fn clamp_to(self, limit: u32) -> Self {
        Self(self.0.min(limit.max(1)))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}
