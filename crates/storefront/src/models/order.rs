//! Orders and checkout.

use chrono::{DateTime, Utc};
use marigold_core::{AddressId, Money, OrderId, OrderStatus, PaymentMethod, PaymentStatus, ProductId, SkuId};
use serde::{Deserialize, Serialize};

use super::Address;

/// A line of a placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    /// Product ID.
    pub product_id: ProductId,
    /// SKU ID.
    pub sku_id: SkuId,
    /// Product name at the time of purchase.
    pub name: String,
    /// SKU label at the time of purchase.
    #[serde(default)]
    pub sku_label: String,
    /// Quantity.
    pub quantity: u32,
    /// Price per unit.
    pub unit_price: Money,
    /// Line total.
    pub line_total: Money,
}

/// Full order detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Order ID.
    pub id: OrderId,
    /// Human order number (e.g., "MG-1001").
    pub number: String,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Payment status.
    pub payment_status: PaymentStatus,
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// Lines.
    #[serde(default)]
    pub items: Vec<OrderItem>,
    /// Shipping address snapshot.
    #[serde(default)]
    pub shipping_address: Option<Address>,
    /// Coupon used.
    #[serde(default)]
    pub coupon_code: Option<String>,
    /// Sum of line totals.
    pub subtotal: Money,
    /// Discount.
    #[serde(default)]
    pub discount: Option<Money>,
    /// Shipping.
    #[serde(default)]
    pub shipping: Option<Money>,
    /// Tax.
    #[serde(default)]
    pub tax: Option<Money>,
    /// Amount charged.
    pub total: Money,
    /// When the order was placed.
    pub placed_at: DateTime<Utc>,
}

impl Order {
    /// Whether the customer may still cancel.
    #[must_use]
    pub const fn can_cancel(&self) -> bool {
        self.status.is_cancellable()
    }
}

/// Order as it appears in the order history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSummary {
    /// Order ID.
    pub id: OrderId,
    /// Human order number.
    pub number: String,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Amount charged.
    pub total: Money,
    /// Units ordered.
    #[serde(default)]
    pub item_count: u32,
    /// When the order was placed.
    pub placed_at: DateTime<Utc>,
}

/// Body of `POST orders`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    /// Shipping address.
    pub address_id: AddressId,
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// Coupon to apply, if not already on the cart.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    /// Delivery notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
