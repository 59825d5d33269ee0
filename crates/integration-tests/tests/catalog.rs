//! Integration tests for catalog browsing and the catalog cache.

#![allow(clippy::unwrap_used)]

use marigold_core::ProductId;
use marigold_integration_tests::FakeBackend;
use marigold_storefront::AppError;
use marigold_storefront::api::ApiError;
use marigold_storefront::models::ProductQuery;
use serde_json::json;

#[tokio::test]
async fn test_list_products_pages_results() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();

    let page = storefront
        .products()
        .list(&ProductQuery {
            per_page: Some(3),
            ..ProductQuery::default()
        })
        .await
        .unwrap();

    assert_eq!(page.total, 4);
    assert_eq!(page.items.len(), 3);
    assert_eq!(page.total_pages(), 2);
    assert!(page.has_next());
}

#[tokio::test]
async fn test_list_products_filters_by_category_and_stock() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();

    let page = storefront
        .products()
        .list(&ProductQuery {
            category: Some("accessories".to_string()),
            in_stock: Some(true),
            ..ProductQuery::default()
        })
        .await
        .unwrap();

    let mut slugs: Vec<_> = page.items.iter().map(|p| p.slug.as_str()).collect();
    slugs.sort_unstable();
    assert_eq!(slugs, vec!["canvas-tote", "wool-socks"]);
}

#[tokio::test]
async fn test_search_matches_product_names() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();

    let page = storefront
        .products()
        .list(&ProductQuery {
            search: Some("Linen".to_string()),
            ..ProductQuery::default()
        })
        .await
        .unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].slug, "linen-shirt");
}

#[tokio::test]
async fn test_product_detail_includes_skus() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();

    let product = storefront.products().get("linen-shirt").await.unwrap();

    assert_eq!(product.skus.len(), 2);
    assert!(product.is_available());
    assert_eq!(product.default_sku().unwrap().label, "Medium");
    assert_eq!(product.skus[0].discount_percent(), Some(25));
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();

    let result = storefront.products().get("no-such-thing").await;

    assert!(matches!(result, Err(AppError::NotFound(message)) if message.contains("no-such-thing")));
}

#[tokio::test]
async fn test_slug_stays_inside_its_path_segment() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();

    let traversal = storefront.products().get("../cart").await;
    let with_query = storefront.products().get("linen-shirt?x=1").await;

    assert!(matches!(traversal, Err(AppError::NotFound(message)) if message.contains("../cart")));
    assert!(matches!(with_query, Err(AppError::NotFound(_))));
    assert_eq!(backend.product_requests(), 2);
    assert_eq!(backend.rejected_requests(), 0);
}

#[tokio::test]
async fn test_dot_segment_slug_is_rejected_locally() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();

    for slug in [".", ".."] {
        let result = storefront.products().get(slug).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))), "{slug}");
    }
    assert_eq!(backend.product_requests(), 0);
}

#[tokio::test]
async fn test_product_detail_is_cached() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();

    storefront.products().get("canvas-tote").await.unwrap();
    storefront.products().get("canvas-tote").await.unwrap();
    assert_eq!(backend.product_requests(), 1);

    storefront.products().invalidate_product("canvas-tote").await;
    storefront.products().get("canvas-tote").await.unwrap();
    assert_eq!(backend.product_requests(), 2);
}

#[tokio::test]
async fn test_missing_product_is_not_cached() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();

    let _ = storefront.products().get("no-such-thing").await;
    let _ = storefront.products().get("no-such-thing").await;

    assert_eq!(backend.product_requests(), 2);
}

#[tokio::test]
async fn test_categories_unwrap_data_envelope() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();

    let categories = storefront.products().categories().await.unwrap();

    let slugs: Vec<_> = categories.iter().map(|c| c.slug.as_str()).collect();
    assert_eq!(slugs, vec!["shirts", "accessories"]);
}

#[tokio::test]
async fn test_related_and_reviews() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();

    let related = storefront.products().related(ProductId::new(1)).await.unwrap();
    let reviews = storefront.products().reviews(ProductId::new(1), 1).await.unwrap();

    assert_eq!(related.len(), 2);
    assert!(related.iter().all(|p| p.id != ProductId::new(1)));
    assert!(reviews.is_empty());
}

#[tokio::test]
async fn test_catalog_is_readable_when_signed_out() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();

    storefront.products().get("wool-socks").await.unwrap();
    storefront.products().categories().await.unwrap();

    assert!(!storefront.api().is_authenticated());
    assert_eq!(backend.rejected_requests(), 0);
}

// =============================================================================
// Error Statuses
// =============================================================================

async fn list_error(backend: &FakeBackend) -> ApiError {
    let (storefront, _store) = backend.storefront();
    match storefront.products().list(&ProductQuery::default()).await {
        Err(AppError::Api(err)) => err,
        other => panic!("expected an API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limit_uses_retry_after() {
    let backend = FakeBackend::start().await;
    backend.fail_next_catalog_request(429, Some("30"), json!({ "message": "Slow down" }));

    assert!(matches!(list_error(&backend).await, ApiError::RateLimited(30)));
}

#[tokio::test]
async fn test_rate_limit_without_retry_after_defaults_to_one_second() {
    let backend = FakeBackend::start().await;
    backend.fail_next_catalog_request(429, None, json!({}));

    assert!(matches!(list_error(&backend).await, ApiError::RateLimited(1)));
}

#[tokio::test]
async fn test_forbidden_carries_message() {
    let backend = FakeBackend::start().await;
    backend.fail_next_catalog_request(403, None, json!({ "message": "Region blocked" }));

    assert!(matches!(
        list_error(&backend).await,
        ApiError::Forbidden(message) if message == "Region blocked"
    ));
}

#[tokio::test]
async fn test_unprocessable_entity_maps_field_errors() {
    let backend = FakeBackend::start().await;
    backend.fail_next_catalog_request(
        422,
        None,
        json!({
            "message": "Invalid filters",
            "errors": { "per_page": ["must be at most 100"], "sort": "is not supported" }
        }),
    );

    let ApiError::Validation { message, fields } = list_error(&backend).await else {
        panic!("expected a validation error");
    };
    assert_eq!(message, "Invalid filters");
    assert_eq!(fields["per_page"], vec!["must be at most 100".to_string()]);
    assert_eq!(fields["sort"], vec!["is not supported".to_string()]);
}

#[tokio::test]
async fn test_server_failure_keeps_status() {
    let backend = FakeBackend::start().await;
    backend.fail_next_catalog_request(503, None, json!({ "error": "Maintenance" }));

    let err = list_error(&backend).await;

    assert!(matches!(
        &err,
        ApiError::Server { status: 503, message } if message == "Maintenance"
    ));
    assert!(err.is_server_side());
}

#[tokio::test]
async fn test_catalog_recovers_after_error() {
    let backend = FakeBackend::start().await;
    backend.fail_next_catalog_request(503, None, json!({}));
    let (storefront, _store) = backend.storefront();

    assert!(storefront.products().list(&ProductQuery::default()).await.is_err());
    let page = storefront.products().list(&ProductQuery::default()).await.unwrap();

    assert_eq!(page.total, 4);
}
