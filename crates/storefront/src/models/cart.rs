//! Server-side cart.

use marigold_core::{CartItemId, CurrencyCode, Money, ProductId, SkuId};
use serde::{Deserialize, Serialize};

/// A coupon the backend accepted for the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    /// Coupon code as entered.
    pub code: String,
    /// Human description (e.g., "10% off orders over $50").
    #[serde(default)]
    pub description: Option<String>,
    /// Discount amount the coupon contributes.
    pub discount: Money,
}

/// One line of the server cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    /// Line ID. Used for quantity updates and removal.
    pub id: CartItemId,
    /// Product ID.
    pub product_id: ProductId,
    /// SKU ID.
    pub sku_id: SkuId,
    /// Product name.
    pub name: String,
    /// SKU label.
    #[serde(default)]
    pub sku_label: String,
    /// Thumbnail URL.
    #[serde(default)]
    pub image: Option<String>,
    /// Quantity.
    pub quantity: u32,
    /// Price per unit.
    pub unit_price: Money,
    /// Line total as priced by the backend.
    pub line_total: Money,
    /// Units still available, if tracked.
    #[serde(default)]
    pub max_quantity: Option<u32>,
}

/// The authenticated customer's cart, exactly as the backend computed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    /// Lines in the cart.
    #[serde(default)]
    pub items: Vec<CartItem>,
    /// Applied coupon.
    #[serde(default)]
    pub coupon: Option<AppliedCoupon>,
    /// Sum of line totals.
    pub subtotal: Money,
    /// Total discount.
    #[serde(default)]
    pub discount: Option<Money>,
    /// Shipping estimate.
    #[serde(default)]
    pub shipping: Option<Money>,
    /// Tax estimate.
    #[serde(default)]
    pub tax: Option<Money>,
    /// Amount payable.
    pub total: Money,
    /// Total units across all lines.
    #[serde(default)]
    pub item_count: u32,
}

impl Cart {
    /// An empty cart in `currency`.
    #[must_use]
    pub const fn empty(currency: CurrencyCode) -> Self {
        Self {
            items: Vec::new(),
            coupon: None,
            subtotal: Money::zero(currency),
            discount: None,
            shipping: None,
            tax: None,
            total: Money::zero(currency),
            item_count: 0,
        }
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The line holding `sku_id`.
    #[must_use]
    pub fn line_for_sku(&self, sku_id: SkuId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.sku_id == sku_id)
    }

    /// Units in the cart. Falls back to summing lines when the backend omits
    /// `item_count`.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        if self.item_count > 0 {
            return self.item_count;
        }
        self.items.iter().map(|item| item.quantity).sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_deserializes_minimal_body() {
        let json = r#"{
            "items": [{
                "id": 1, "product_id": 2, "sku_id": 3, "name": "Tee",
                "quantity": 2,
                "unit_price": {"amount": "10.00", "currency_code": "USD"},
                "line_total": {"amount": "20.00", "currency_code": "USD"}
            }],
            "subtotal": {"amount": "20.00", "currency_code": "USD"},
            "total": {"amount": "20.00", "currency_code": "USD"}
        }"#;
        let cart: Cart = serde_json::from_str(json).unwrap();

        assert_eq!(cart.total_quantity(), 2);
        assert!(cart.line_for_sku(SkuId::new(3)).is_some());
        assert!(cart.coupon.is_none());
    }

    #[test]
    fn test_empty_cart() {
        let cart = Cart::empty(CurrencyCode::EUR);
        assert!(cart.is_empty());
        assert_eq!(cart.total_quantity(), 0);
        assert_eq!(cart.total.to_string(), "€0.00");
    }
}
