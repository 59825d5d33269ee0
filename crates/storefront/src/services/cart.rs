//! The authenticated, server-side cart.
//!
//! Every mutation returns the full cart as priced by the backend; callers
//! replace their view with it instead of patching locally.

use marigold_core::{CartItemId, Quantity, SkuId};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::api::{ApiClient, ApiRequest};
use crate::error::{AppError, Result};
use crate::models::Cart;

use super::require_auth;

#[derive(Serialize)]
struct AddItemRequest {
    sku_id: SkuId,
    quantity: Quantity,
}

#[derive(Serialize)]
struct UpdateItemRequest {
    quantity: Quantity,
}

#[derive(Serialize)]
struct CouponRequest<'a> {
    code: &'a str,
}

/// One guest cart line sent to `cart/merge`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeLine {
    /// SKU ID.
    pub sku_id: SkuId,
    /// Quantity to add to the server cart.
    pub quantity: Quantity,
}

/// Body of `POST cart/merge`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeRequest {
    /// Guest cart lines.
    pub items: Vec<MergeLine>,
    /// Coupon entered while browsing as a guest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
}

impl MergeRequest {
    /// Whether there is anything to merge.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.coupon_code.is_none()
    }
}

/// Server cart service.
#[derive(Clone)]
pub struct CartService {
    api: ApiClient,
}

impl CartService {
    /// Create a new cart service.
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Fetch the cart.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self))]
    pub async fn get(&self) -> Result<Cart> {
        require_auth(&self.api)?;
        Ok(self.api.get("cart").await?)
    }

    /// Add a SKU. The backend merges with an existing line for the same SKU.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error
    /// (e.g. `Conflict` when stock is insufficient).
    #[instrument(skip(self), fields(sku_id = %sku_id, quantity = %quantity))]
    pub async fn add_item(&self, sku_id: SkuId, quantity: Quantity) -> Result<Cart> {
        require_auth(&self.api)?;
        Ok(self
            .api
            .post("cart/items", &AddItemRequest { sku_id, quantity })
            .await?)
    }

    /// Set the quantity of a line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self), fields(item_id = %item_id, quantity = %quantity))]
    pub async fn update_item(&self, item_id: CartItemId, quantity: Quantity) -> Result<Cart> {
        require_auth(&self.api)?;
        Ok(self
            .api
            .patch(&format!("cart/items/{item_id}"), &UpdateItemRequest { quantity })
            .await?)
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn remove_item(&self, item_id: CartItemId) -> Result<Cart> {
        require_auth(&self.api)?;
        Ok(self.api.delete(&format!("cart/items/{item_id}")).await?)
    }

    /// Remove every line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<Cart> {
        require_auth(&self.api)?;
        Ok(self.api.delete("cart").await?)
    }

    /// Merge guest cart lines (and coupon) into the server cart.
    ///
    /// `key` is sent as the `Idempotency-Key`; retries of the same merge must
    /// reuse it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self, request), fields(lines = request.items.len(), key = %key))]
    pub async fn merge(&self, request: &MergeRequest, key: Uuid) -> Result<Cart> {
        require_auth(&self.api)?;
        Ok(self
            .api
            .send(
                ApiRequest::post("cart/merge")
                    .json(request)?
                    .idempotency_key(key.to_string()),
            )
            .await?)
    }

    /// Apply a coupon code.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` for a blank code,
    /// `AppError::AuthRequired` when signed out, or an API error when the
    /// backend rejects the coupon.
    #[instrument(skip(self))]
    pub async fn apply_coupon(&self, code: &str) -> Result<Cart> {
        let code = normalize_coupon(code)?;
        require_auth(&self.api)?;
        Ok(self
            .api
            .post("cart/coupon", &CouponRequest { code: &code })
            .await?)
    }

    /// Remove the applied coupon.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self))]
    pub async fn remove_coupon(&self) -> Result<Cart> {
        require_auth(&self.api)?;
        Ok(self.api.send(ApiRequest::delete("cart/coupon")).await?)
    }
}

/// Trim a coupon code and reject blanks.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` if the code is blank.
pub fn normalize_coupon(code: &str) -> Result<String> {
    let code = code.trim();
    if code.is_empty() {
        return Err(AppError::InvalidInput("Coupon code is required".to_string()));
    }
    Ok(code.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_coupon() {
        assert_eq!(normalize_coupon("  SAVE10 ").unwrap(), "SAVE10");
        assert!(matches!(
            normalize_coupon("   "),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_merge_request_body() {
        let request = MergeRequest {
            items: vec![MergeLine {
                sku_id: SkuId::new(4),
                quantity: Quantity::new(2).unwrap(),
            }],
            coupon_code: None,
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"items":[{"sku_id":4,"quantity":2}]}"#
        );
        assert!(MergeRequest::default().is_empty());
    }
}
