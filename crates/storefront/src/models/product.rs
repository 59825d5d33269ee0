//! Catalog types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use marigold_core::{CategoryId, Money, ProductId, ReviewId, SkuId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A purchasable variant of a product (size/colour combination).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sku {
    /// SKU ID.
    pub id: SkuId,
    /// Merchant SKU code.
    pub code: String,
    /// Human label (e.g., "Large / Blue").
    pub label: String,
    /// Option values keyed by option name.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Current price.
    pub price: Money,
    /// Original price when on sale.
    #[serde(default)]
    pub compare_at_price: Option<Money>,
    /// Units in stock. `None` means stock is not tracked.
    #[serde(default)]
    pub stock: Option<u32>,
}

impl Sku {
    /// Whether at least one unit can be bought.
    #[must_use]
    pub fn is_in_stock(&self) -> bool {
        self.stock.is_none_or(|stock| stock > 0)
    }

    /// Discount against the compare-at price, as a whole percentage.
    #[must_use]
    pub fn discount_percent(&self) -> Option<u32> {
        let compare_at = self.compare_at_price?;
        if compare_at.currency_code != self.price.currency_code
            || compare_at.amount <= self.price.amount
            || compare_at.amount.is_zero()
        {
            return None;
        }

        let percent = (compare_at.amount - self.price.amount) / compare_at.amount * Decimal::ONE_HUNDRED;
        percent.round().try_into().ok()
    }
}

/// Category reference embedded in products.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Category ID.
    pub id: CategoryId,
    /// URL slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Parent category, if nested.
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
    /// Number of products, when the backend reports it.
    #[serde(default)]
    pub product_count: Option<u32>,
}

/// Product as it appears in listings and the wishlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSummary {
    /// Product ID.
    pub id: ProductId,
    /// URL slug.
    pub slug: String,
    /// Product name.
    pub name: String,
    /// Lowest SKU price.
    pub price: Money,
    /// Compare-at price for the cheapest SKU.
    #[serde(default)]
    pub compare_at_price: Option<Money>,
    /// Thumbnail URL.
    #[serde(default)]
    pub image: Option<String>,
    /// Whether any SKU is in stock.
    #[serde(default = "default_true")]
    pub in_stock: bool,
    /// Average rating (0-5).
    #[serde(default)]
    pub rating: Option<f64>,
}

const fn default_true() -> bool {
    true
}

/// Full product detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Product ID.
    pub id: ProductId,
    /// URL slug.
    pub slug: String,
    /// Product name.
    pub name: String,
    /// Plain text description.
    #[serde(default)]
    pub description: String,
    /// Brand name.
    #[serde(default)]
    pub brand: Option<String>,
    /// Category.
    #[serde(default)]
    pub category: Option<Category>,
    /// Image URLs, featured first.
    #[serde(default)]
    pub images: Vec<String>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Average rating (0-5).
    #[serde(default)]
    pub rating: Option<f64>,
    /// Number of reviews.
    #[serde(default)]
    pub review_count: u32,
    /// Purchasable variants.
    pub skus: Vec<Sku>,
}

impl Product {
    /// Find a SKU by ID.
    #[must_use]
    pub fn sku(&self, id: SkuId) -> Option<&Sku> {
        self.skus.iter().find(|sku| sku.id == id)
    }

    /// The SKU to use when the customer did not pick one: the first in stock.
    #[must_use]
    pub fn default_sku(&self) -> Option<&Sku> {
        self.skus.iter().find(|sku| sku.is_in_stock())
    }

    /// Whether any SKU is in stock.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.skus.iter().any(Sku::is_in_stock)
    }

    /// Featured image URL.
    #[must_use]
    pub fn featured_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// A customer review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    /// Review ID.
    pub id: ReviewId,
    /// Star rating (1-5).
    pub rating: u8,
    /// Headline.
    #[serde(default)]
    pub title: Option<String>,
    /// Review text.
    #[serde(default)]
    pub body: String,
    /// Display name of the reviewer.
    pub author: String,
    /// When the review was posted.
    pub created_at: DateTime<Utc>,
}

/// Sort orders for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    /// Most recently added first.
    Newest,
    /// Cheapest first.
    PriceAsc,
    /// Most expensive first.
    PriceDesc,
    /// Best selling first.
    Popular,
    /// Highest rated first.
    Rating,
}

impl std::str::FromStr for ProductSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(Self::Newest),
            "price_asc" | "price-asc" => Ok(Self::PriceAsc),
            "price_desc" | "price-desc" => Ok(Self::PriceDesc),
            "popular" => Ok(Self::Popular),
            "rating" => Ok(Self::Rating),
            _ => Err(format!("invalid sort: {s}")),
        }
    }
}

/// Filters for product listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductQuery {
    /// 1-based page number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Page size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    /// Category slug.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Free-text search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Sort order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<ProductSort>,
    /// Minimum price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<Decimal>,
    /// Maximum price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<Decimal>,
    /// Only products with stock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_stock: Option<bool>,
}

impl ProductQuery {
    /// Stable cache key for this query.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!(
            "products:{}:{}:{}:{}:{:?}:{}:{}:{:?}",
            self.page.unwrap_or(1),
            self.per_page.unwrap_or(0),
            self.category.as_deref().unwrap_or(""),
            self.search.as_deref().unwrap_or("").trim().to_lowercase(),
            self.sort,
            self.min_price.map(|p| p.to_string()).unwrap_or_default(),
            self.max_price.map(|p| p.to_string()).unwrap_or_default(),
            self.in_stock,
        )
    }
}
