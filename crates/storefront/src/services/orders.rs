//! Checkout and order history.

use marigold_core::OrderId;
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::api::{ApiClient, ApiError, ApiRequest};
use crate::error::{AppError, Result};
use crate::models::{CheckoutRequest, Order, OrderSummary, Page};

use super::require_auth;

#[derive(Serialize)]
struct PageQuery {
    page: u32,
}

/// Order service.
#[derive(Clone)]
pub struct OrderService {
    api: ApiClient,
}

impl OrderService {
    /// Create a new order service.
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Place an order from the current server cart.
    ///
    /// Each call carries a fresh `Idempotency-Key`, reused if the request is
    /// replayed after a token refresh.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error
    /// (e.g. `Conflict` when stock ran out).
    #[instrument(skip(self, request), fields(address_id = %request.address_id, payment_method = %request.payment_method))]
    pub async fn place(&self, request: &CheckoutRequest) -> Result<Order> {
        require_auth(&self.api)?;
        let idempotency_key = Uuid::new_v4().to_string();

        let order: Order = self
            .api
            .send(
                ApiRequest::post("orders")
                    .json(request)?
                    .idempotency_key(idempotency_key),
            )
            .await?;

        info!(order_id = %order.id, number = %order.number, "Order placed");
        Ok(order)
    }

    /// Order history.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self))]
    pub async fn list(&self, page: u32) -> Result<Page<OrderSummary>> {
        require_auth(&self.api)?;
        Ok(self
            .api
            .get_with_query("orders", &PageQuery { page: page.max(1) })
            .await?)
    }

    /// Get one order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown order,
    /// `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get(&self, order_id: OrderId) -> Result<Order> {
        require_auth(&self.api)?;
        self.api
            .get(&format!("orders/{order_id}"))
            .await
            .map_err(|e| match e {
                ApiError::NotFound(_) => AppError::NotFound(format!("order {order_id}")),
                other => other.into(),
            })
    }

    /// Cancel an order.
    ///
    /// Orders past confirmation are rejected without calling the cancel
    /// endpoint.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if the order can no longer be
    /// cancelled, `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel(&self, order_id: OrderId) -> Result<Order> {
        let order = self.get(order_id).await?;
        if !order.can_cancel() {
            return Err(AppError::InvalidInput(format!(
                "Order {} is {} and can no longer be cancelled",
                order.number, order.status
            )));
        }

        let order: Order = self
            .api
            .send(ApiRequest::post(format!("orders/{order_id}/cancel")))
            .await?;
        info!(number = %order.number, "Order cancelled");
        Ok(order)
    }
}
