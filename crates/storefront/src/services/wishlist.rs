//! Wishlist for signed-in customers.
//!
//! Guests have no wishlist; every call fails with
//! [`AppError::AuthRequired`](crate::error::AppError::AuthRequired) before any
//! network traffic.

use marigold_core::{ProductId, Quantity};
use serde::Serialize;
use tracing::{info, instrument};

use crate::api::ApiClient;
use crate::cart::{CartSession, CartSummary};
use crate::error::{AppError, Result};
use crate::models::{Product, WishlistItem};

use super::require_auth;

#[derive(Serialize)]
struct AddRequest {
    product_id: ProductId,
}

/// Wishlist service.
#[derive(Clone)]
pub struct WishlistService {
    api: ApiClient,
}

impl WishlistService {
    /// Create a new wishlist service.
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Saved products, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<WishlistItem>> {
        require_auth(&self.api)?;
        Ok(self.api.get("wishlist").await?)
    }

    /// Save a product.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add(&self, product_id: ProductId) -> Result<WishlistItem> {
        require_auth(&self.api)?;
        Ok(self.api.post("wishlist", &AddRequest { product_id }).await?)
    }

    /// Remove a saved product.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove(&self, product_id: ProductId) -> Result<()> {
        require_auth(&self.api)?;
        self.api
            .delete_empty(&format!("wishlist/{product_id}"))
            .await?;
        Ok(())
    }

    /// Whether a product is saved.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    pub async fn contains(&self, product_id: ProductId) -> Result<bool> {
        Ok(self
            .list()
            .await?
            .iter()
            .any(|item| item.product.id == product_id))
    }

    /// Save the product if it is not saved, remove it otherwise.
    ///
    /// Returns whether the product is saved afterwards.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn toggle(&self, product_id: ProductId) -> Result<bool> {
        if self.contains(product_id).await? {
            self.remove(product_id).await?;
            Ok(false)
        } else {
            self.add(product_id).await?;
            Ok(true)
        }
    }

    /// Add one unit of the product's default SKU to the cart, then remove the
    /// product from the wishlist.
    ///
    /// The wishlist entry is kept if the cart rejects the item.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if no SKU is in stock,
    /// `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self, product, cart), fields(product_id = %product.id))]
    pub async fn move_to_cart(&self, product: &Product, cart: &CartSession) -> Result<CartSummary> {
        require_auth(&self.api)?;
        let sku = product.default_sku().ok_or_else(|| {
            AppError::InvalidInput(format!("{} is out of stock", product.name))
        })?;

        let summary = cart.add_item(product, sku, Quantity::ONE).await?;
        self.remove(product.id).await?;
        info!(sku_id = %sku.id, "Moved wishlist item to cart");
        Ok(summary)
    }
}
