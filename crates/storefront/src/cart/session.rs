//! Guest/server cart reconciliation.
//!
//! [`CartSession`] is a two-state machine:
//!
//! - `Guest`: the cart lives in local storage and every change is persisted
//!   there immediately. Totals are estimates.
//! - `Synced`: the customer is signed in and the view is the last cart the
//!   backend returned. Every change is a request; the response replaces the
//!   view.
//!
//! `Guest -> Synced` happens in [`CartSession::merge_after_login`] (or
//! [`CartSession::load`] when a stored session exists). `Synced -> Guest`
//! happens on logout and whenever a request reports that the session ended.

use std::sync::Arc;

use marigold_core::{CurrencyCode, Money, Quantity, SkuId};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use super::{GuestCart, GuestCartItem};
use crate::api::ApiClient;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::{Cart, Product, Sku};
use crate::services::CartService;
use crate::services::cart::normalize_coupon;
use crate::storage::LocalStore;

/// What the customer's cart currently is.
#[derive(Debug, Clone)]
pub enum CartView {
    /// Not signed in; cart held on this device.
    Guest(GuestCart),
    /// Signed in; cart as last returned by the backend.
    Synced(Cart),
}

impl CartView {
    /// Whether the view mirrors the server cart.
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        matches!(self, Self::Synced(_))
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Guest(cart) => cart.is_empty(),
            Self::Synced(cart) => cart.is_empty(),
        }
    }

    /// Totals for display.
    ///
    /// # Errors
    ///
    /// Returns an error if the guest estimate overflows.
    pub fn summary(&self) -> Result<CartSummary> {
        match self {
            Self::Guest(cart) => {
                let subtotal = cart.subtotal()?;
                Ok(CartSummary {
                    item_count: cart.item_count(),
                    subtotal,
                    discount: Money::zero(subtotal.currency_code),
                    total: subtotal,
                    coupon: cart.coupon_code().map(str::to_string),
                    is_estimate: true,
                })
            }
            Self::Synced(cart) => {
                let currency = cart.subtotal.currency_code;
                let discount = cart
                    .discount
                    .or_else(|| cart.coupon.as_ref().map(|c| c.discount))
                    .unwrap_or_else(|| Money::zero(currency));
                Ok(CartSummary {
                    item_count: cart.total_quantity(),
                    subtotal: cart.subtotal,
                    discount,
                    total: cart.total,
                    coupon: cart.coupon.as_ref().map(|c| c.code.clone()),
                    is_estimate: false,
                })
            }
        }
    }
}

/// Cart totals in either mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSummary {
    /// Units across all lines.
    pub item_count: u32,
    /// Sum of line totals.
    pub subtotal: Money,
    /// Discount from the coupon. Always zero for guests.
    pub discount: Money,
    /// Amount payable.
    pub total: Money,
    /// Applied (synced) or pending (guest) coupon code.
    pub coupon: Option<String>,
    /// True for guest carts, whose totals exclude tax, shipping and coupons.
    pub is_estimate: bool,
}

/// The customer's cart across sign in and sign out.
///
/// Operations are serialized; two concurrent calls never interleave their
/// request and view update.
pub struct CartSession {
    api: ApiClient,
    carts: CartService,
    store: Arc<dyn LocalStore>,
    currency: CurrencyCode,
    view: Mutex<CartView>,
}

impl CartSession {
    /// Create a session in guest mode with an empty cart. Call
    /// [`load`](Self::load) to pick up stored state.
    #[must_use]
    pub fn new(api: ApiClient, store: Arc<dyn LocalStore>, currency: CurrencyCode) -> Self {
        Self {
            carts: CartService::new(api.clone()),
            api,
            store,
            currency,
            view: Mutex::new(CartView::Guest(GuestCart::new(currency))),
        }
    }

    /// A copy of the current view.
    pub async fn view(&self) -> CartView {
        self.view.lock().await.clone()
    }

    /// Current totals.
    ///
    /// # Errors
    ///
    /// Returns an error if the guest estimate overflows.
    pub async fn summary(&self) -> Result<CartSummary> {
        self.view.lock().await.summary()
    }

    /// Whether the view mirrors the server cart.
    pub async fn is_synced(&self) -> bool {
        self.view.lock().await.is_synced()
    }

    /// Restore the cart at startup.
    ///
    /// Signed in: the server cart, after merging any guest cart left over
    /// from a failed merge. If the session turns out to be over, falls back
    /// to the guest cart. Signed out: the stored guest cart.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage fails or the backend fails for a
    /// reason other than an ended session.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<CartSummary> {
        let mut view = self.view.lock().await;

        if self.api.is_authenticated() {
            match self.merge_locked(&mut view).await {
                Ok(summary) => return Ok(summary),
                Err(e) if e.needs_sign_in() => {
                    warn!("Stored session is no longer valid, using guest cart");
                }
                Err(e) => return Err(e),
            }
        }

        *view = CartView::Guest(self.stored_guest_cart()?);
        view.summary()
    }

    /// Re-fetch the server cart, or re-read the guest cart.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub async fn refresh(&self) -> Result<CartSummary> {
        self.load().await
    }

    /// Add `quantity` of `sku`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if the SKU does not belong to the
    /// product or is sold out, storage errors in guest mode, or API errors in
    /// synced mode.
    #[instrument(skip(self, product, sku), fields(product_id = %product.id, sku_id = %sku.id, quantity = %quantity))]
    pub async fn add_item(&self, product: &Product, sku: &Sku, quantity: Quantity) -> Result<CartSummary> {
        if product.sku(sku.id).is_none() {
            return Err(AppError::InvalidInput(format!(
                "{} is not a variant of {}",
                sku.label, product.name
            )));
        }
        if !sku.is_in_stock() {
            return Err(AppError::InvalidInput(format!(
                "{} ({}) is out of stock",
                product.name, sku.label
            )));
        }

        let sku_id = sku.id.to_string();
        add_breadcrumb("cart", "Added item", Some(&[("sku_id", sku_id.as_str())]));

        let mut view = self.view.lock().await;
        match &mut *view {
            CartView::Guest(cart) => {
                self.update_guest(cart, |cart| {
                    cart.add(GuestCartItem::new(product, sku, quantity)).map(drop)
                })?;
                view.summary()
            }
            CartView::Synced(_) => {
                let result = self.carts.add_item(sku.id, quantity).await;
                self.apply_server(&mut view, result)
            }
        }
    }

    /// Set the quantity of the line holding `sku_id`. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the SKU is not in the cart,
    /// `AppError::Quantity` above the per-line maximum, or storage/API errors.
    #[instrument(skip(self), fields(sku_id = %sku_id))]
    pub async fn update_quantity(&self, sku_id: SkuId, quantity: u32) -> Result<CartSummary> {
        let mut view = self.view.lock().await;
        match &mut *view {
            CartView::Guest(cart) => {
                self.update_guest(cart, |cart| cart.set_quantity(sku_id, quantity))?;
                view.summary()
            }
            CartView::Synced(cart) => {
                let line_id = synced_line(cart, sku_id)?;
                let result = if quantity == 0 {
                    self.carts.remove_item(line_id).await
                } else {
                    let quantity = Quantity::new(quantity)?;
                    self.carts.update_item(line_id, quantity).await
                };
                self.apply_server(&mut view, result)
            }
        }
    }

    /// Remove the line holding `sku_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the SKU is not in the cart, or
    /// storage/API errors.
    #[instrument(skip(self), fields(sku_id = %sku_id))]
    pub async fn remove_item(&self, sku_id: SkuId) -> Result<CartSummary> {
        let mut view = self.view.lock().await;
        match &mut *view {
            CartView::Guest(cart) => {
                self.update_guest(cart, |cart| cart.remove(sku_id))?;
                view.summary()
            }
            CartView::Synced(cart) => {
                let line_id = synced_line(cart, sku_id)?;
                let result = self.carts.remove_item(line_id).await;
                self.apply_server(&mut view, result)
            }
        }
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns storage or API errors.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<CartSummary> {
        let mut view = self.view.lock().await;
        match &mut *view {
            CartView::Guest(cart) => {
                GuestCart::discard(self.store.as_ref())?;
                cart.clear();
                view.summary()
            }
            CartView::Synced(_) => {
                let result = self.carts.clear().await;
                self.apply_server(&mut view, result)
            }
        }
    }

    /// Apply a coupon.
    ///
    /// Guests cannot have a coupon validated; the code is kept and sent with
    /// the merge after sign in.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` for a blank code, or storage/API
    /// errors (including the backend rejecting the coupon).
    #[instrument(skip(self))]
    pub async fn apply_coupon(&self, code: &str) -> Result<CartSummary> {
        let code = normalize_coupon(code)?;

        let mut view = self.view.lock().await;
        match &mut *view {
            CartView::Guest(cart) => {
                self.update_guest(cart, |cart| {
                    cart.set_coupon(Some(code));
                    Ok(())
                })?;
                view.summary()
            }
            CartView::Synced(_) => {
                let result = self.carts.apply_coupon(&code).await;
                self.apply_server(&mut view, result)
            }
        }
    }

    /// Remove the coupon.
    ///
    /// # Errors
    ///
    /// Returns storage or API errors.
    #[instrument(skip(self))]
    pub async fn remove_coupon(&self) -> Result<CartSummary> {
        let mut view = self.view.lock().await;
        match &mut *view {
            CartView::Guest(cart) => {
                self.update_guest(cart, |cart| {
                    cart.set_coupon(None);
                    Ok(())
                })?;
                view.summary()
            }
            CartView::Synced(_) => {
                let result = self.carts.remove_coupon().await;
                self.apply_server(&mut view, result)
            }
        }
    }

    /// Move the guest cart into the server cart after sign in.
    ///
    /// With a non-empty guest cart, `POST cart/merge` is sent with its lines
    /// and pending coupon. Only when the backend accepts the merge is the
    /// guest cart removed from storage. If the merge fails the guest cart
    /// stays intact (in storage and in the view) and the error is returned;
    /// the next [`load`](Self::load) retries.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or storage/API
    /// errors.
    #[instrument(skip(self))]
    pub async fn merge_after_login(&self) -> Result<CartSummary> {
        let mut view = self.view.lock().await;
        self.merge_locked(&mut view).await
    }

    async fn merge_locked(&self, view: &mut CartView) -> Result<CartSummary> {
        let mut guest = self.stored_guest_cart()?;
        let payload = guest.merge_payload();

        if payload.is_empty() {
            let result = self.carts.get().await;
            return self.apply_server(view, result);
        }

        let retry = guest.has_pending_merge();
        let key = guest.merge_key();
        if !retry {
            // The key must be on disk before the request can reach the backend.
            guest.save(self.store.as_ref())?;
        }

        info!(
            lines = payload.items.len(),
            has_coupon = payload.coupon_code.is_some(),
            retry,
            "Merging guest cart"
        );

        match self.carts.merge(&payload, key).await {
            Ok(cart) => {
                GuestCart::discard(self.store.as_ref())?;
                *view = CartView::Synced(cart);
                info!("Guest cart merged");
                view.summary()
            }
            Err(e) => {
                warn!(error = %e, "Guest cart merge failed, keeping guest cart");
                *view = CartView::Guest(guest);
                Err(e)
            }
        }
    }

    /// Return to an empty guest cart after sign out.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be written.
    #[instrument(skip(self))]
    pub async fn reset_after_logout(&self) -> Result<()> {
        let mut view = self.view.lock().await;
        GuestCart::discard(self.store.as_ref())?;
        *view = CartView::Guest(GuestCart::new(self.currency));
        Ok(())
    }

    /// Install a server response as the view. An ended session demotes the
    /// view to the stored guest cart.
    fn apply_server(&self, view: &mut CartView, result: Result<Cart>) -> Result<CartSummary> {
        match result {
            Ok(cart) => {
                *view = CartView::Synced(cart);
                view.summary()
            }
            Err(e) if e.needs_sign_in() => {
                warn!(error = %e, "Session ended, cart back in guest mode");
                *view = CartView::Guest(self.stored_guest_cart()?);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Apply `change` to a copy of the guest cart and persist it. The view
    /// only changes once storage has accepted the new cart.
    fn update_guest(
        &self,
        cart: &mut GuestCart,
        change: impl FnOnce(&mut GuestCart) -> Result<()>,
    ) -> Result<()> {
        let mut next = cart.clone();
        change(&mut next)?;
        next.save(self.store.as_ref())?;
        *cart = next;
        Ok(())
    }

    fn stored_guest_cart(&self) -> Result<GuestCart> {
        Ok(GuestCart::load(self.store.as_ref(), self.currency)?)
    }
}

fn synced_line(cart: &Cart, sku_id: SkuId) -> Result<marigold_core::CartItemId> {
    cart.line_for_sku(sku_id)
        .map(|line| line.id)
        .ok_or_else(|| AppError::NotFound(format!("SKU {sku_id} in cart")))
}
