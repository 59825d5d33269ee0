//! The storefront facade shared by front ends.

use std::sync::Arc;

use marigold_core::{AddressId, PaymentMethod};
use tracing::{info, instrument, warn};

use crate::api::ApiClient;
use crate::cart::{CartSession, CartSummary, CartView};
use crate::config::StorefrontConfig;
use crate::error::{self, AppError, Result};
use crate::models::{CheckoutRequest, Order, RegisterInput, User};
use crate::services::{
    AddressService, AuthService, OrderService, ProductService, WishlistService,
};
use crate::storage::{FileStore, LocalStore};

/// Result of signing in or registering.
#[derive(Debug)]
pub struct SignedIn {
    /// The signed-in customer.
    pub user: User,
    /// The merged cart, or why the guest cart could not be merged. A failed
    /// merge leaves the guest cart untouched.
    pub cart: Result<CartSummary>,
}

/// Choices made at checkout.
#[derive(Debug, Clone)]
pub struct CheckoutOptions {
    /// Shipping address. Defaults to the customer's default address.
    pub address_id: Option<AddressId>,
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// Delivery notes.
    pub notes: Option<String>,
}

/// Everything a storefront front end needs, behind one handle.
///
/// Cheap to clone; clones share the HTTP client, tokens, catalog cache and
/// cart session.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: StorefrontConfig,
    api: ApiClient,
    auth: AuthService,
    products: ProductService,
    wishlist: WishlistService,
    orders: OrderService,
    addresses: AddressService,
    cart: CartSession,
}

impl Storefront {
    /// Open a storefront backed by the storage file under the configured
    /// data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be opened or the HTTP client
    /// cannot be built.
    pub fn open(config: StorefrontConfig) -> Result<Self> {
        let store = FileStore::open(config.storage_path())?;
        Self::with_store(config, Arc::new(store))
    }

    /// Open a storefront over an explicit local store.
    ///
    /// # Errors
    ///
    /// Returns an error if stored tokens cannot be read or the HTTP client
    /// cannot be built.
    pub fn with_store(config: StorefrontConfig, store: Arc<dyn LocalStore>) -> Result<Self> {
        let api = ApiClient::new(&config, store.clone())?;

        Ok(Self {
            inner: Arc::new(StorefrontInner {
                auth: AuthService::new(api.clone(), store.clone()),
                products: ProductService::new(api.clone(), config.catalog_cache),
                wishlist: WishlistService::new(api.clone()),
                orders: OrderService::new(api.clone()),
                addresses: AddressService::new(api.clone()),
                cart: CartSession::new(api.clone(), store, config.currency),
                api,
                config,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the API client.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// Authentication and profile.
    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    /// Catalog.
    #[must_use]
    pub fn products(&self) -> &ProductService {
        &self.inner.products
    }

    /// The customer's cart.
    #[must_use]
    pub fn cart(&self) -> &CartSession {
        &self.inner.cart
    }

    /// Wishlist.
    #[must_use]
    pub fn wishlist(&self) -> &WishlistService {
        &self.inner.wishlist
    }

    /// Orders.
    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    /// Address book.
    #[must_use]
    pub fn addresses(&self) -> &AddressService {
        &self.inner.addresses
    }

    /// Restore the previous session: the cart, and the Sentry user if signed in.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart cannot be loaded.
    pub async fn restore(&self) -> Result<CartSummary> {
        if let Some(user) = self.inner.auth.cached_user()? {
            error::set_sentry_user(&user.id, Some(&user.email));
        }
        self.inner.cart.load().await
    }

    /// Sign in and merge the guest cart.
    ///
    /// # Errors
    ///
    /// Returns an error if sign in fails. Merge failures are reported in
    /// [`SignedIn::cart`] instead.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<SignedIn> {
        let user = self.inner.auth.login(email, password).await?;
        Ok(self.after_sign_in(user).await)
    }

    /// Create an account, sign in and merge the guest cart.
    ///
    /// # Errors
    ///
    /// Returns an error if registration fails.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterInput) -> Result<SignedIn> {
        let user = self.inner.auth.register(input).await?;
        Ok(self.after_sign_in(user).await)
    }

    async fn after_sign_in(&self, user: User) -> SignedIn {
        error::set_sentry_user(&user.id, Some(&user.email));
        error::add_breadcrumb("auth", "Signed in", None);

        let cart = self.inner.cart.merge_after_login().await;
        if let Err(e) = &cart {
            warn!(error = %e, "Cart merge after sign in failed");
            e.capture();
        }

        SignedIn { user, cart }
    }

    /// Sign out and return to an empty guest cart.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be updated.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        self.inner.auth.logout().await?;
        self.inner.cart.reset_after_logout().await?;
        error::clear_sentry_user();
        Ok(())
    }

    /// Add a wishlist product to the cart and remove it from the wishlist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown product, or the errors of
    /// [`WishlistService::move_to_cart`].
    pub async fn move_wishlist_item_to_cart(&self, product_slug: &str) -> Result<CartSummary> {
        let product = self.inner.products.get(product_slug).await?;
        self.inner.wishlist.move_to_cart(&product, &self.inner.cart).await
    }

    /// Place an order for the server cart.
    ///
    /// The cart is re-fetched first so the order is placed for what the
    /// backend holds, and again afterwards since the backend empties it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, `AppError::EmptyCart`
    /// for an empty cart, `AppError::InvalidInput` when no address is saved,
    /// or API errors.
    #[instrument(skip(self, options), fields(payment_method = %options.payment_method))]
    pub async fn checkout(&self, options: CheckoutOptions) -> Result<Order> {
        if !self.inner.api.is_authenticated() {
            return Err(AppError::AuthRequired);
        }

        self.inner.cart.refresh().await?;
        let CartView::Synced(cart) = self.inner.cart.view().await else {
            return Err(AppError::AuthRequired);
        };
        if cart.is_empty() {
            return Err(AppError::EmptyCart);
        }

        let address_id = match options.address_id {
            Some(id) => id,
            None => self
                .inner
                .addresses
                .default_address()
                .await?
                .map(|address| address.id)
                .ok_or_else(|| {
                    AppError::InvalidInput("Add a shipping address before checking out".to_string())
                })?,
        };

        error::add_breadcrumb("checkout", "Placing order", None);
        let order = self
            .inner
            .orders
            .place(&CheckoutRequest {
                address_id,
                payment_method: options.payment_method,
                coupon_code: cart.coupon.map(|coupon| coupon.code),
                notes: options.notes.filter(|n| !n.trim().is_empty()),
            })
            .await?;

        if let Err(e) = self.inner.cart.refresh().await {
            warn!(error = %e, "Could not refresh cart after checkout");
        }

        info!(number = %order.number, total = %order.total, "Checkout complete");
        Ok(order)
    }
}
