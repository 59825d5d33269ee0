//! Marigold storefront client library.
//!
//! Talks to the commerce REST backend on behalf of one customer: catalog,
//! cart, wishlist, checkout and account management. The backend owns
//! pricing, stock, coupons and the order lifecycle; this crate keeps the
//! guest cart on the device and reconciles it with the server cart on sign
//! in.
//!
//! Start with [`Storefront::open`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod storage;

pub use error::{AppError, Result};
pub use state::{CheckoutOptions, SignedIn, Storefront};
