//! Catalog browsing.
//!
//! Products, related products and categories are cached with `moka` using
//! the TTL and capacity from [`CatalogCacheConfig`]. Free-text searches and
//! reviews are never cached.

mod cache;

use marigold_core::ProductId;
use moka::future::Cache;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::api::{ApiClient, ApiError, ApiRequest};
use crate::config::CatalogCacheConfig;
use crate::error::{AppError, Result};
use crate::models::{Category, Page, Product, ProductQuery, ProductSummary, Review};

use cache::{CATEGORIES_KEY, CacheValue, product_key, related_key};

#[derive(Serialize)]
struct PageQuery {
    page: u32,
}

/// Catalog service.
#[derive(Clone)]
pub struct ProductService {
    api: ApiClient,
    cache: Cache<String, CacheValue>,
}

impl ProductService {
    /// Create a new catalog service.
    #[must_use]
    pub fn new(api: ApiClient, cache_config: CatalogCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(cache_config.capacity)
            .time_to_live(cache_config.ttl)
            .build();

        Self { api, cache }
    }

    /// List products.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn list(&self, query: &ProductQuery) -> Result<Page<ProductSummary>> {
        let cacheable = query.search.as_deref().is_none_or(|s| s.trim().is_empty());
        let cache_key = query.cache_key();

        if cacheable
            && let Some(CacheValue::Products(page)) = self.cache.get(&cache_key).await
        {
            debug!("Cache hit for products");
            return Ok(page);
        }

        let request = ApiRequest::get("products").public().query(query)?;
        let page: Page<ProductSummary> = self.api.send(request).await?;

        if cacheable {
            self.cache
                .insert(cache_key, CacheValue::Products(page.clone()))
                .await;
        }

        Ok(page)
    }

    /// Get a product by slug.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` for a blank slug or a bare `.`/`..`,
    /// `AppError::NotFound` if no product has this slug, or an API error.
    #[instrument(skip(self), fields(slug = %slug))]
    pub async fn get(&self, slug: &str) -> Result<Product> {
        let slug = slug.trim();
        if slug.is_empty() {
            return Err(AppError::InvalidInput("Product slug is required".to_string()));
        }
        if matches!(slug, "." | "..") {
            return Err(AppError::InvalidInput(format!("Invalid product slug: {slug}")));
        }

        let cache_key = product_key(slug);
        if let Some(CacheValue::Product(product)) = self.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product: Product = self
            .api
            .send(ApiRequest::get("products").segment(slug).public())
            .await
            .map_err(|e| match e {
                ApiError::NotFound(_) => AppError::NotFound(format!("product {slug}")),
                other => other.into(),
            })?;

        self.cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    /// Products related to `product_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn related(&self, product_id: ProductId) -> Result<Vec<ProductSummary>> {
        let cache_key = related_key(product_id);
        if let Some(CacheValue::Related(products)) = self.cache.get(&cache_key).await {
            debug!("Cache hit for related products");
            return Ok(products);
        }

        let products: Vec<ProductSummary> = self
            .api
            .send(ApiRequest::get(format!("products/{product_id}/related")).public())
            .await?;

        self.cache
            .insert(cache_key, CacheValue::Related(products.clone()))
            .await;

        Ok(products)
    }

    /// Reviews for a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn reviews(&self, product_id: ProductId, page: u32) -> Result<Page<Review>> {
        let request = ApiRequest::get(format!("products/{product_id}/reviews"))
            .public()
            .query(&PageQuery { page: page.max(1) })?;
        Ok(self.api.send(request).await?)
    }

    /// All categories.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>> {
        if let Some(CacheValue::Categories(categories)) = self.cache.get(CATEGORIES_KEY).await {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let categories: Vec<Category> = self
            .api
            .send(ApiRequest::get("categories").public())
            .await?;

        self.cache
            .insert(
                CATEGORIES_KEY.to_string(),
                CacheValue::Categories(categories.clone()),
            )
            .await;

        Ok(categories)
    }

    // =========================================================================
    // Cache Management
    // =========================================================================

    /// Invalidate a cached product.
    pub async fn invalidate_product(&self, slug: &str) {
        self.cache.invalidate(&product_key(slug)).await;
    }

    /// Invalidate all cached data.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}
