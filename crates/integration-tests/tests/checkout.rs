//! Integration tests for checkout, orders, addresses and the wishlist.

#![allow(clippy::unwrap_used)]

use marigold_core::{OrderId, OrderStatus, PaymentMethod, ProductId, Quantity, SkuId};
use marigold_integration_tests::{COUPON, EMAIL, FakeBackend, PASSWORD};
use marigold_storefront::models::{Address, AddressInput};
use marigold_storefront::{AppError, CheckoutOptions, Storefront};

const TOTE: SkuId = SkuId::new(21);

fn address_input(full_name: &str) -> AddressInput {
    AddressInput {
        full_name: full_name.to_string(),
        line1: "12 Analytical Row".to_string(),
        city: "London".to_string(),
        postal_code: "N1 9GU".to_string(),
        country: "GB".to_string(),
        ..AddressInput::default()
    }
}

fn card() -> CheckoutOptions {
    CheckoutOptions {
        address_id: None,
        payment_method: PaymentMethod::Card,
        notes: None,
    }
}

/// A signed-in customer with one saved address.
async fn signed_in(backend: &FakeBackend) -> (Storefront, Address) {
    let (storefront, _store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();
    let address = storefront
        .addresses()
        .create(&address_input("Ada Lovelace"))
        .await
        .unwrap();
    (storefront, address)
}

async fn add_tote(storefront: &Storefront, quantity: u32) {
    let product = storefront.products().get("canvas-tote").await.unwrap();
    let sku = product.sku(TOTE).unwrap().clone();
    storefront
        .cart()
        .add_item(&product, &sku, Quantity::new(quantity).unwrap())
        .await
        .unwrap();
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn test_checkout_places_order_and_empties_cart() {
    let backend = FakeBackend::start().await;
    let (storefront, address) = signed_in(&backend).await;
    add_tote(&storefront, 2).await;

    let order = storefront.checkout(card()).await.unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert!(order.number.starts_with("MG-"));
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].quantity, 2);
    assert_eq!(order.shipping_address.unwrap().id, address.id);
    assert_eq!(order.payment_method, PaymentMethod::Card);

    let summary = storefront.cart().summary().await.unwrap();
    assert!(!summary.is_estimate);
    assert_eq!(summary.item_count, 0);
}

#[tokio::test]
async fn test_checkout_sends_idempotency_key() {
    let backend = FakeBackend::start().await;
    let (storefront, _address) = signed_in(&backend).await;
    add_tote(&storefront, 1).await;

    storefront.checkout(card()).await.unwrap();
    add_tote(&storefront, 1).await;
    storefront.checkout(card()).await.unwrap();

    let keys = backend.idempotency_keys();
    assert_eq!(keys.len(), 2);
    assert_ne!(keys[0], keys[1]);
    assert!(keys.iter().all(|key| key.len() == 36));
}

#[tokio::test]
async fn test_checkout_uses_requested_address() {
    let backend = FakeBackend::start().await;
    let (storefront, _default) = signed_in(&backend).await;
    let office = storefront
        .addresses()
        .create(&address_input("Ada at the office"))
        .await
        .unwrap();
    add_tote(&storefront, 1).await;

    let order = storefront
        .checkout(CheckoutOptions {
            address_id: Some(office.id),
            ..card()
        })
        .await
        .unwrap();

    assert_eq!(order.shipping_address.unwrap().full_name, "Ada at the office");
}

#[tokio::test]
async fn test_checkout_sends_applied_coupon() {
    let backend = FakeBackend::start().await;
    let (storefront, _address) = signed_in(&backend).await;
    add_tote(&storefront, 1).await;
    storefront.cart().apply_coupon(COUPON).await.unwrap();

    let order = storefront.checkout(card()).await.unwrap();

    assert_eq!(backend.order_coupons(), vec![Some(COUPON.to_string())]);
    assert_eq!(order.coupon_code.as_deref(), Some(COUPON));
}

#[tokio::test]
async fn test_checkout_without_coupon_sends_none() {
    let backend = FakeBackend::start().await;
    let (storefront, _address) = signed_in(&backend).await;
    add_tote(&storefront, 1).await;

    storefront.checkout(card()).await.unwrap();

    assert_eq!(backend.order_coupons(), vec![None]);
}

#[tokio::test]
async fn test_checkout_with_empty_cart_is_rejected() {
    let backend = FakeBackend::start().await;
    let (storefront, _address) = signed_in(&backend).await;

    let result = storefront.checkout(card()).await;

    assert!(matches!(result, Err(AppError::EmptyCart)));
    assert!(backend.idempotency_keys().is_empty());
}

#[tokio::test]
async fn test_guest_checkout_requires_sign_in() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();
    add_tote(&storefront, 1).await;

    let result = storefront.checkout(card()).await;

    assert!(matches!(result, Err(AppError::AuthRequired)));
    assert_eq!(storefront.cart().summary().await.unwrap().item_count, 1);
}

#[tokio::test]
async fn test_checkout_without_address_is_rejected() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();
    add_tote(&storefront, 1).await;

    let result = storefront.checkout(card()).await;

    assert!(matches!(result, Err(AppError::InvalidInput(_))));
    assert!(backend.idempotency_keys().is_empty());
}

#[tokio::test]
async fn test_checkout_sees_cart_changed_elsewhere() {
    let backend = FakeBackend::start().await;
    let (storefront, _address) = signed_in(&backend).await;
    // Added from another device after this client last synced.
    backend.seed_server_cart(TOTE, 3);

    let order = storefront.checkout(card()).await.unwrap();

    assert_eq!(order.items[0].quantity, 3);
}

// =============================================================================
// Orders
// =============================================================================

#[tokio::test]
async fn test_order_history_lists_placed_orders() {
    let backend = FakeBackend::start().await;
    let (storefront, _address) = signed_in(&backend).await;
    add_tote(&storefront, 2).await;
    let order = storefront.checkout(card()).await.unwrap();

    let page = storefront.orders().list(1).await.unwrap();

    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].number, order.number);
    assert_eq!(page.items[0].item_count, 2);
    assert!(!page.has_next());
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let backend = FakeBackend::start().await;
    let (storefront, _address) = signed_in(&backend).await;

    let result = storefront.orders().get(OrderId::new(424_242)).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_pending_order_can_be_cancelled() {
    let backend = FakeBackend::start().await;
    let (storefront, _address) = signed_in(&backend).await;
    add_tote(&storefront, 1).await;
    let order = storefront.checkout(card()).await.unwrap();

    let cancelled = storefront.orders().cancel(order.id).await.unwrap();

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(backend.cancel_calls(), 1);
}

#[tokio::test]
async fn test_shipped_order_is_not_sent_for_cancellation() {
    let backend = FakeBackend::start().await;
    let (storefront, _address) = signed_in(&backend).await;
    add_tote(&storefront, 1).await;
    let order = storefront.checkout(card()).await.unwrap();
    backend.set_order_status(order.id, OrderStatus::Shipped);

    let result = storefront.orders().cancel(order.id).await;

    assert!(matches!(result, Err(AppError::InvalidInput(_))));
    assert_eq!(backend.cancel_calls(), 0);
}

// =============================================================================
// Addresses
// =============================================================================

#[tokio::test]
async fn test_first_address_becomes_default() {
    let backend = FakeBackend::start().await;
    let (storefront, first) = signed_in(&backend).await;
    let second = storefront
        .addresses()
        .create(&address_input("Second"))
        .await
        .unwrap();

    assert!(first.is_default);
    assert!(!second.is_default);

    storefront.addresses().set_default(second.id).await.unwrap();
    let default = storefront.addresses().default_address().await.unwrap().unwrap();
    assert_eq!(default.id, second.id);
}

#[tokio::test]
async fn test_incomplete_address_is_rejected_locally() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();
    let input = AddressInput {
        city: String::new(),
        ..address_input("Ada")
    };

    let result = storefront.addresses().create(&input).await;

    assert!(matches!(result, Err(AppError::InvalidInput(message)) if message.contains("city")));
    assert!(storefront.addresses().list().await.unwrap().is_empty());
}

// =============================================================================
// Wishlist
// =============================================================================

#[tokio::test]
async fn test_wishlist_requires_sign_in() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();

    let result = storefront.wishlist().list().await;

    assert!(matches!(result, Err(AppError::AuthRequired)));
    assert_eq!(backend.rejected_requests(), 0);
}

#[tokio::test]
async fn test_wishlist_toggle_adds_then_removes() {
    let backend = FakeBackend::start().await;
    let (storefront, _address) = signed_in(&backend).await;
    let shirt = ProductId::new(1);

    assert!(storefront.wishlist().toggle(shirt).await.unwrap());
    assert!(storefront.wishlist().contains(shirt).await.unwrap());
    assert!(!storefront.wishlist().toggle(shirt).await.unwrap());
    assert!(storefront.wishlist().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_move_wishlist_item_to_cart() {
    let backend = FakeBackend::start().await;
    let (storefront, _address) = signed_in(&backend).await;
    storefront.wishlist().add(ProductId::new(1)).await.unwrap();

    let summary = storefront
        .move_wishlist_item_to_cart("linen-shirt")
        .await
        .unwrap();

    assert_eq!(summary.item_count, 1);
    assert_eq!(backend.server_cart_quantities(), vec![(SkuId::new(11), 1)]);
    assert!(storefront.wishlist().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sold_out_wishlist_item_stays_saved() {
    let backend = FakeBackend::start().await;
    let (storefront, _address) = signed_in(&backend).await;
    storefront.wishlist().add(ProductId::new(4)).await.unwrap();

    let result = storefront.move_wishlist_item_to_cart("sold-out-scarf").await;

    assert!(matches!(result, Err(AppError::InvalidInput(_))));
    assert_eq!(storefront.wishlist().list().await.unwrap().len(), 1);
}
