//! Domain types for the commerce API.
//!
//! These mirror the backend's JSON payloads. Prices are always the
//! backend's numbers; nothing here recomputes them except the guest cart
//! estimate in [`crate::cart`].

mod address;
mod cart;
mod order;
mod page;
mod product;
mod user;
mod wishlist;

pub use address::{Address, AddressInput};
pub use cart::{AppliedCoupon, Cart, CartItem};
pub use order::{CheckoutRequest, Order, OrderItem, OrderSummary};
pub use page::Page;
pub use product::{Category, Product, ProductQuery, ProductSort, ProductSummary, Review, Sku};
pub use user::{ProfileUpdate, RegisterInput, User};
pub use wishlist::WishlistItem;
