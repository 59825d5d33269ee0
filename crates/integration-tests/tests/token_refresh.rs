//! Integration tests for access token refresh.
//!
//! Covers the 401 -> refresh -> replay path, single-flight refresh under
//! concurrency, and how a failed refresh ends the session.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use marigold_integration_tests::{EMAIL, FakeBackend, PASSWORD};
use marigold_storefront::AppError;
use marigold_storefront::api::ApiError;
use marigold_storefront::storage::{LocalStore, keys};

// =============================================================================
// Replay After Refresh
// =============================================================================

#[tokio::test]
async fn test_rejected_access_token_is_refreshed_and_replayed() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();

    backend.expire_access_tokens();
    let user = storefront.auth().current_user().await.unwrap();

    assert_eq!(user.email, EMAIL);
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(backend.rejected_requests(), 1);
    assert!(storefront.api().is_authenticated());
}

#[tokio::test]
async fn test_refreshed_tokens_are_persisted() {
    let backend = FakeBackend::start().await;
    let (storefront, store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();
    let before = store.get(keys::AUTH_TOKENS).unwrap().unwrap();

    backend.expire_access_tokens();
    storefront.auth().current_user().await.unwrap();

    let after = store.get(keys::AUTH_TOKENS).unwrap().unwrap();
    assert_ne!(before, after);

    // A fresh client on the same storage picks up the renewed session.
    let reopened = backend.storefront_with(store);
    reopened.auth().current_user().await.unwrap();
    assert_eq!(backend.refresh_calls(), 1);
}

#[tokio::test]
async fn test_refresh_keeps_refresh_token_when_not_rotated() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();

    for _ in 0..2 {
        backend.expire_access_tokens();
        storefront.auth().current_user().await.unwrap();
    }

    assert_eq!(backend.refresh_calls(), 2);
}

#[tokio::test]
async fn test_rotated_refresh_token_is_used_next_time() {
    let backend = FakeBackend::start().await;
    backend.set_rotate_refresh_tokens(true);
    let (storefront, _store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();

    for _ in 0..2 {
        backend.expire_access_tokens();
        storefront.auth().current_user().await.unwrap();
    }

    assert_eq!(backend.refresh_calls(), 2);
    assert!(storefront.api().is_authenticated());
}

// =============================================================================
// Single Flight
// =============================================================================

#[tokio::test]
async fn test_concurrent_rejections_share_one_refresh() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();

    backend.expire_access_tokens();
    let (me, orders, addresses, wishlist) = tokio::join!(
        storefront.auth().current_user(),
        storefront.orders().list(1),
        storefront.addresses().list(),
        storefront.wishlist().list(),
    );

    me.unwrap();
    orders.unwrap();
    addresses.unwrap();
    wishlist.unwrap();
    assert_eq!(backend.refresh_calls(), 1);
}

#[tokio::test]
async fn test_concurrent_rejections_across_tasks_share_one_refresh() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();

    backend.expire_access_tokens();
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..6 {
        let storefront = storefront.clone();
        tasks.spawn(async move { storefront.auth().current_user().await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    assert_eq!(backend.refresh_calls(), 1);
}

// =============================================================================
// Pre-emptive Refresh
// =============================================================================

#[tokio::test]
async fn test_token_near_expiry_is_refreshed_before_sending() {
    let backend = FakeBackend::start().await;
    backend.set_access_ttl_secs(30);
    let (storefront, _store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();

    let before = backend.refresh_calls();
    storefront.auth().current_user().await.unwrap();

    assert_eq!(backend.refresh_calls(), before + 1);
    assert_eq!(backend.rejected_requests(), 0);
}

// =============================================================================
// Session End
// =============================================================================

#[tokio::test]
async fn test_rejected_refresh_expires_session() {
    let backend = FakeBackend::start().await;
    let (storefront, store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();

    backend.expire_access_tokens();
    backend.set_reject_refresh(true);
    let result = storefront.auth().current_user().await;

    assert!(matches!(
        result,
        Err(AppError::Api(ApiError::SessionExpired))
    ));
    assert!(!storefront.api().is_authenticated());
    assert!(store.get(keys::AUTH_TOKENS).unwrap().is_none());
}

#[tokio::test]
async fn test_expired_session_requires_sign_in_without_network() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();

    backend.expire_access_tokens();
    backend.set_reject_refresh(true);
    let _ = storefront.auth().current_user().await;
    let rejected = backend.rejected_requests();

    let result = storefront.orders().list(1).await;

    assert!(matches!(result, Err(AppError::AuthRequired)));
    assert!(result.unwrap_err().needs_sign_in());
    assert_eq!(backend.rejected_requests(), rejected);
}

#[tokio::test]
async fn test_missing_refresh_token_is_unauthorized() {
    let backend = FakeBackend::start().await;
    backend.set_issue_refresh_tokens(false);
    let (storefront, _store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();

    backend.expire_access_tokens();
    let result = storefront.auth().current_user().await;

    assert!(matches!(result, Err(AppError::Api(ApiError::Unauthorized))));
    assert_eq!(backend.refresh_calls(), 0);
    assert!(!storefront.api().is_authenticated());
}

#[tokio::test]
async fn test_bad_credentials_do_not_sign_in() {
    let backend = FakeBackend::start().await;
    let (storefront, store) = backend.storefront();

    let result = storefront.login(EMAIL, "wrong password").await;

    assert!(matches!(result, Err(AppError::Api(ApiError::Unauthorized))));
    assert!(!storefront.api().is_authenticated());
    assert!(store.get(keys::AUTH_TOKENS).unwrap().is_none());
    assert_eq!(backend.refresh_calls(), 0);
}

#[tokio::test]
async fn test_logout_clears_tokens_and_profile() {
    let backend = FakeBackend::start().await;
    let (storefront, store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();
    assert!(store.get(keys::PROFILE).unwrap().is_some());

    storefront.logout().await.unwrap();

    assert_eq!(backend.logout_calls(), 1);
    assert!(!storefront.api().is_authenticated());
    assert!(store.get(keys::AUTH_TOKENS).unwrap().is_none());
    assert!(store.get(keys::PROFILE).unwrap().is_none());
}

#[tokio::test]
async fn test_logout_succeeds_when_backend_rejects_it() {
    let backend = FakeBackend::start().await;
    let (storefront, store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();

    backend.expire_access_tokens();
    backend.set_reject_refresh(true);
    storefront.logout().await.unwrap();

    assert!(!storefront.api().is_authenticated());
    assert!(store.get(keys::AUTH_TOKENS).unwrap().is_none());
}

#[tokio::test]
async fn test_refresh_landing_after_logout_does_not_restore_session() {
    let backend = FakeBackend::start().await;
    let (storefront, store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();

    backend.expire_access_tokens();
    backend.set_refresh_delay(Duration::from_millis(300));
    let in_flight = {
        let storefront = storefront.clone();
        tokio::spawn(async move { storefront.auth().current_user().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    storefront.logout().await.unwrap();
    assert!(!storefront.api().is_authenticated());

    let result = in_flight.await.unwrap();

    assert!(matches!(
        result,
        Err(AppError::Api(ApiError::SessionExpired))
    ));
    assert_eq!(backend.refresh_calls(), 1);
    assert!(!storefront.api().is_authenticated());
    assert!(store.get(keys::AUTH_TOKENS).unwrap().is_none());
    assert!(store.get(keys::PROFILE).unwrap().is_none());
}

#[tokio::test]
async fn test_logout_does_not_wait_for_a_refresh() {
    let backend = FakeBackend::start().await;
    let (storefront, _store) = backend.storefront();
    storefront.login(EMAIL, PASSWORD).await.unwrap();

    backend.expire_access_tokens();
    storefront.logout().await.unwrap();

    assert_eq!(backend.logout_calls(), 1);
    assert_eq!(backend.refresh_calls(), 0);
}
