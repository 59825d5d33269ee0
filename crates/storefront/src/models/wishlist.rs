//! Wishlist entries.

use chrono::{DateTime, Utc};
use marigold_core::WishlistItemId;
use serde::{Deserialize, Serialize};

use super::ProductSummary;

/// A product saved to the wishlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WishlistItem {
    /// Entry ID.
    pub id: WishlistItemId,
    /// The saved product.
    pub product: ProductSummary,
    /// When it was saved.
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}
