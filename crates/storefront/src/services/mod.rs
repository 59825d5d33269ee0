//! Typed wrappers around the commerce REST endpoints.
//!
//! # Services
//!
//! - `auth` - Sign in, registration, profile and password management
//! - `products` - Catalog browsing (cached)
//! - `cart` - The authenticated, server-side cart
//! - `wishlist` - Saved products (signed-in customers only)
//! - `orders` - Checkout and order history
//! - `address` - Saved shipping addresses
//!
//! Every service holds a clone of the shared [`ApiClient`], so they are cheap
//! to clone and share one token store.

pub mod address;
pub mod auth;
pub mod cart;
pub mod orders;
pub mod products;
pub mod wishlist;

pub use address::AddressService;
pub use auth::AuthService;
pub use cart::{CartService, MergeLine, MergeRequest};
pub use orders::OrderService;
pub use products::ProductService;
pub use wishlist::WishlistService;

use crate::api::ApiClient;
use crate::error::{AppError, Result};

/// Fail fast with [`AppError::AuthRequired`] when nobody is signed in.
fn require_auth(api: &ApiClient) -> Result<()> {
    if api.is_authenticated() {
        Ok(())
    } else {
        Err(AppError::AuthRequired)
    }
}
