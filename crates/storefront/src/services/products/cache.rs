//! Cached catalog values.

use crate::models::{Category, Page, Product, ProductSummary};

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Product(Box<Product>),
    Products(Page<ProductSummary>),
    Related(Vec<ProductSummary>),
    Categories(Vec<Category>),
}

pub fn product_key(slug: &str) -> String {
    format!("product:{slug}")
}

pub fn related_key(product_id: impl std::fmt::Display) -> String {
    format!("related:{product_id}")
}

pub const CATEGORIES_KEY: &str = "categories";
