//! Cart state on the client.
//!
//! Before sign in the cart lives only on this device ([`GuestCart`]). After
//! sign in the backend owns it and [`CartSession`] mirrors the last cart the
//! backend returned. The hand-over between the two happens in
//! [`CartSession::merge_after_login`].

mod guest;
mod session;

pub use guest::{GuestCart, GuestCartItem};
pub use session::{CartSession, CartSummary, CartView};
