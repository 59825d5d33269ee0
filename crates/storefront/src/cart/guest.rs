//! Guest cart kept in local storage.

use chrono::{DateTime, Utc};
use marigold_core::{CurrencyCode, Money, MoneyError, ProductId, Quantity, SkuId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Product, Sku};
use crate::services::{MergeLine, MergeRequest};
use crate::storage::{self, LocalStore, StorageError, keys};

/// One line of the guest cart.
///
/// Holds a snapshot of the product so the cart can be shown without
/// refetching the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestCartItem {
    /// SKU ID.
    pub sku_id: SkuId,
    /// Product ID.
    pub product_id: ProductId,
    /// Product slug.
    pub product_slug: String,
    /// Product name.
    pub name: String,
    /// SKU label.
    pub sku_label: String,
    /// Thumbnail URL.
    #[serde(default)]
    pub image: Option<String>,
    /// Price per unit when the item was added.
    pub unit_price: Money,
    /// Quantity.
    pub quantity: Quantity,
    /// Known stock when the item was added.
    #[serde(default)]
    pub max_quantity: Option<u32>,
}

impl GuestCartItem {
    /// Snapshot `sku` of `product`.
    #[must_use]
    pub fn new(product: &Product, sku: &Sku, quantity: Quantity) -> Self {
        Self {
            sku_id: sku.id,
            product_id: product.id,
            product_slug: product.slug.clone(),
            name: product.name.clone(),
            sku_label: sku.label.clone(),
            image: product.featured_image().map(str::to_string),
            unit_price: sku.price,
            quantity,
            max_quantity: sku.stock,
        }
    }

    /// Unit price times quantity.
    ///
    /// # Errors
    ///
    /// Returns an error if the multiplication overflows.
    pub fn line_total(&self) -> std::result::Result<Money, MoneyError> {
        self.unit_price.times(self.quantity.get())
    }

    fn clamp_to_stock(&mut self) {
        if let Some(limit) = self.max_quantity {
            self.quantity = self.quantity.clamp_to(limit);
        }
    }
}

/// Cart of a customer who has not signed in.
///
/// Holds at most one line per SKU. Totals are estimates; tax, shipping and
/// coupons are only priced by the backend after the merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestCart {
    items: Vec<GuestCartItem>,
    #[serde(default)]
    coupon_code: Option<String>,
    currency: CurrencyCode,
    updated_at: DateTime<Utc>,
    /// Idempotency key of a merge that was sent but not confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    merge_key: Option<Uuid>,
}

impl GuestCart {
    /// An empty cart.
    #[must_use]
    pub fn new(currency: CurrencyCode) -> Self {
        Self {
            items: Vec::new(),
            coupon_code: None,
            currency,
            updated_at: Utc::now(),
            merge_key: None,
        }
    }

    /// Load the stored guest cart, or an empty one.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be read.
    pub fn load(store: &dyn LocalStore, currency: CurrencyCode) -> std::result::Result<Self, StorageError> {
        Ok(storage::load_json(store, keys::GUEST_CART)?.unwrap_or_else(|| Self::new(currency)))
    }

    /// Persist the cart. An empty cart without coupon is removed instead.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be written.
    pub fn save(&self, store: &dyn LocalStore) -> std::result::Result<(), StorageError> {
        if self.is_empty() && self.coupon_code.is_none() {
            return Self::discard(store);
        }
        storage::save_json(store, keys::GUEST_CART, self)
    }

    /// Remove the stored guest cart.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be written.
    pub fn discard(store: &dyn LocalStore) -> std::result::Result<(), StorageError> {
        store.remove(keys::GUEST_CART)
    }

    /// Lines in the order they were added.
    #[must_use]
    pub fn items(&self) -> &[GuestCartItem] {
        &self.items
    }

    /// Coupon to apply when the cart is merged.
    #[must_use]
    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon_code.as_deref()
    }

    /// Currency of the estimate.
    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        self.currency
    }

    /// Last modification time.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The line for `sku_id`.
    #[must_use]
    pub fn item(&self, sku_id: SkuId) -> Option<&GuestCartItem> {
        self.items.iter().find(|item| item.sku_id == sku_id)
    }

    /// Add a line, merging with an existing line for the same SKU.
    ///
    /// The merged quantity is capped at [`Quantity::MAX`] and at the known
    /// stock. Returns the resulting quantity of the line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if the SKU is sold out, or
    /// `AppError::Money` if its price is in another currency than the cart.
    pub fn add(&mut self, mut item: GuestCartItem) -> Result<Quantity> {
        if item.max_quantity == Some(0) {
            return Err(AppError::InvalidInput(format!("{} is out of stock", item.name)));
        }

        if self.items.is_empty() {
            self.currency = item.unit_price.currency_code;
        } else if item.unit_price.currency_code != self.currency {
            return Err(MoneyError::CurrencyMismatch {
                expected: self.currency,
                found: item.unit_price.currency_code,
            }
            .into());
        }

        let quantity = if let Some(existing) = self.items.iter_mut().find(|i| i.sku_id == item.sku_id) {
            existing.quantity = existing.quantity.saturating_add(item.quantity.get());
            existing.unit_price = item.unit_price;
            if item.max_quantity.is_some() {
                existing.max_quantity = item.max_quantity;
            }
            existing.clamp_to_stock();
            existing.quantity
        } else {
            item.clamp_to_stock();
            let quantity = item.quantity;
            self.items.push(item);
            quantity
        };

        self.touch();
        Ok(quantity)
    }

    /// Set the quantity of a line. Zero removes it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the SKU is not in the cart, or
    /// `AppError::Quantity` above [`Quantity::MAX`].
    pub fn set_quantity(&mut self, sku_id: SkuId, quantity: u32) -> Result<()> {
        if quantity == 0 {
            return self.remove(sku_id);
        }

        let quantity = Quantity::new(quantity)?;
        let item = self
            .items
            .iter_mut()
            .find(|item| item.sku_id == sku_id)
            .ok_or_else(|| AppError::NotFound(format!("SKU {sku_id} in cart")))?;
        item.quantity = quantity;
        item.clamp_to_stock();

        self.touch();
        Ok(())
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the SKU is not in the cart.
    pub fn remove(&mut self, sku_id: SkuId) -> Result<()> {
        let before = self.items.len();
        self.items.retain(|item| item.sku_id != sku_id);
        if self.items.len() == before {
            return Err(AppError::NotFound(format!("SKU {sku_id} in cart")));
        }

        self.touch();
        Ok(())
    }

    /// Remove every line and the coupon.
    pub fn clear(&mut self) {
        self.items.clear();
        self.coupon_code = None;
        self.touch();
    }

    /// Remember a coupon for the merge, or forget it with `None`.
    pub fn set_coupon(&mut self, code: Option<String>) {
        self.coupon_code = code;
        self.touch();
    }

    /// Units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity.get()).sum()
    }

    /// Sum of line totals.
    ///
    /// # Errors
    ///
    /// Returns an error if the arithmetic overflows.
    pub fn subtotal(&self) -> std::result::Result<Money, MoneyError> {
        self.items
            .iter()
            .try_fold(Money::zero(self.currency), |acc, item| {
                acc.checked_add(item.line_total()?)
            })
    }

    /// Body for `POST cart/merge`.
    #[must_use]
    pub fn merge_payload(&self) -> MergeRequest {
        MergeRequest {
            items: self
                .items
                .iter()
                .map(|item| MergeLine {
                    sku_id: item.sku_id,
                    quantity: item.quantity,
                })
                .collect(),
            coupon_code: self.coupon_code.clone(),
        }
    }

    /// Idempotency key for merging this cart, created on the first attempt.
    ///
    /// Every retry reuses the key until the cart is discarded, so a merge the
    /// backend applied but never confirmed is not applied twice.
    pub fn merge_key(&mut self) -> Uuid {
        *self.merge_key.get_or_insert_with(Uuid::new_v4)
    }

    /// Whether a merge was attempted and not confirmed.
    #[must_use]
    pub const fn has_pending_merge(&self) -> bool {
        self.merge_key.is_some()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::storage::MemoryStore;

    use super::*;

    fn item(sku: i64, price_minor: i64, quantity: u32, stock: Option<u32>) -> GuestCartItem {
        GuestCartItem {
            sku_id: SkuId::new(sku),
            product_id: ProductId::new(sku * 10),
            product_slug: format!("product-{sku}"),
            name: format!("Product {sku}"),
            sku_label: "Default".to_string(),
            image: None,
            unit_price: Money::from_minor(price_minor, CurrencyCode::USD),
            quantity: Quantity::new(quantity).unwrap(),
            max_quantity: stock,
        }
    }

    #[test]
    fn test_add_merges_same_sku() {
        let mut cart = GuestCart::new(CurrencyCode::USD);
        cart.add(item(1, 1000, 2, None)).unwrap();
        let quantity = cart.add(item(1, 1000, 3, None)).unwrap();

        assert_eq!(quantity.get(), 5);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.item_count(), 5);
    }

    #[test]
    fn test_add_clamps_to_max_and_stock() {
        let mut cart = GuestCart::new(CurrencyCode::USD);
        cart.add(item(1, 100, 90, None)).unwrap();
        assert_eq!(cart.add(item(1, 100, 20, None)).unwrap().get(), Quantity::MAX);

        cart.add(item(2, 100, 2, Some(4))).unwrap();
        assert_eq!(cart.add(item(2, 100, 5, Some(4))).unwrap().get(), 4);
    }

    #[test]
    fn test_add_rejects_sold_out() {
        let mut cart = GuestCart::new(CurrencyCode::USD);
        let err = cart.add(item(1, 100, 1, Some(0))).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_add_rejects_mixed_currency() {
        let mut cart = GuestCart::new(CurrencyCode::USD);
        cart.add(item(1, 100, 1, None)).unwrap();

        let mut euro = item(2, 100, 1, None);
        euro.unit_price = Money::from_minor(100, CurrencyCode::EUR);
        assert!(matches!(cart.add(euro), Err(AppError::Money(_))));
    }

    #[test]
    fn test_empty_cart_adopts_item_currency() {
        let mut cart = GuestCart::new(CurrencyCode::USD);
        let mut euro = item(2, 250, 2, None);
        euro.unit_price = Money::from_minor(250, CurrencyCode::EUR);
        cart.add(euro).unwrap();

        assert_eq!(cart.currency(), CurrencyCode::EUR);
        assert_eq!(cart.subtotal().unwrap().to_string(), "€5.00");
    }

    #[test]
    fn test_set_quantity_and_remove() {
        let mut cart = GuestCart::new(CurrencyCode::USD);
        cart.add(item(1, 1000, 1, Some(3))).unwrap();
        cart.add(item(2, 500, 1, None)).unwrap();

        cart.set_quantity(SkuId::new(1), 10).unwrap();
        assert_eq!(cart.item(SkuId::new(1)).unwrap().quantity.get(), 3);

        cart.set_quantity(SkuId::new(2), 0).unwrap();
        assert!(cart.item(SkuId::new(2)).is_none());

        assert!(matches!(
            cart.remove(SkuId::new(99)),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            cart.set_quantity(SkuId::new(1), 150),
            Err(AppError::Quantity(_))
        ));
    }

    #[test]
    fn test_subtotal() {
        let mut cart = GuestCart::new(CurrencyCode::USD);
        assert!(cart.subtotal().unwrap().is_zero());

        cart.add(item(1, 1999, 2, None)).unwrap();
        cart.add(item(2, 500, 1, None)).unwrap();
        assert_eq!(cart.subtotal().unwrap().to_string(), "$44.98");
    }

    #[test]
    fn test_merge_payload_carries_coupon() {
        let mut cart = GuestCart::new(CurrencyCode::USD);
        cart.add(item(1, 100, 2, None)).unwrap();
        cart.set_coupon(Some("WELCOME".to_string()));

        let payload = cart.merge_payload();
        assert_eq!(payload.items.len(), 1);
        assert_eq!(payload.items[0].quantity.get(), 2);
        assert_eq!(payload.coupon_code.as_deref(), Some("WELCOME"));
    }

    #[test]
    fn test_merge_key_is_stable_until_discarded() {
        let store = MemoryStore::new();
        let mut cart = GuestCart::new(CurrencyCode::USD);
        cart.add(item(1, 100, 2, None)).unwrap();
        assert!(!cart.has_pending_merge());

        let key = cart.merge_key();
        assert_eq!(cart.merge_key(), key);
        cart.save(&store).unwrap();

        let mut reloaded = GuestCart::load(&store, CurrencyCode::USD).unwrap();
        assert!(reloaded.has_pending_merge());
        assert_eq!(reloaded.merge_key(), key);

        GuestCart::discard(&store).unwrap();
        let mut fresh = GuestCart::load(&store, CurrencyCode::USD).unwrap();
        assert!(!fresh.has_pending_merge());
        assert_ne!(fresh.merge_key(), key);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let store = MemoryStore::new();
        let mut cart = GuestCart::new(CurrencyCode::USD);
        cart.add(item(1, 100, 2, None)).unwrap();
        cart.save(&store).unwrap();

        let loaded = GuestCart::load(&store, CurrencyCode::USD).unwrap();
        assert_eq!(loaded, cart);
    }

    #[test]
    fn test_saving_empty_cart_removes_it() {
        let store = MemoryStore::new();
        let mut cart = GuestCart::new(CurrencyCode::USD);
        cart.add(item(1, 100, 2, None)).unwrap();
        cart.save(&store).unwrap();

        cart.clear();
        cart.save(&store).unwrap();
        assert!(store.get(keys::GUEST_CART).unwrap().is_none());
    }

    #[test]
    fn test_load_ignores_corrupt_value() {
        let store = MemoryStore::new();
        store.set(keys::GUEST_CART, "{not json").unwrap();

        let cart = GuestCart::load(&store, CurrencyCode::GBP).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.currency(), CurrencyCode::GBP);
    }
}
