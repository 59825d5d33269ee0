//! Integration tests for Marigold.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p marigold-integration-tests
//! ```
//!
//! Every test starts its own [`FakeBackend`]: an `axum` server on an
//! ephemeral local port that implements the commerce REST API in memory.
//! Knobs on the backend inject failures (rejected refresh tokens, failing
//! merges) and counters expose what the client actually sent.
//!
//! # Test Categories
//!
//! - `token_refresh` - 401 handling, single-flight refresh, session expiry
//! - `cart_merge` - Guest cart persistence and merge on sign in
//! - `checkout` - Orders, addresses and wishlist
//! - `catalog` - Product listing, caching and error mapping

mod backend;

pub use backend::{COUPON, EMAIL, FakeBackend, PASSWORD};
