//! Account scenarios: registration, sign-in and per-user cart and wishlist.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use artisan_market_core::CategoryFilter;
use artisan_market_integration_tests::{TestContext, registration};
use artisan_market_storefront::AppError;
use artisan_market_storefront::services::AuthError;
use secrecy::SecretString;

#[tokio::test]
async fn test_register_greets_by_full_name() {
    let ctx = TestContext::new();
    assert_eq!(ctx.storefront.display_name().await, "Guest");

    let user = ctx
        .storefront
        .register(&registration("Võ Thị Sáu", "sau@example.com", "secret12"))
        .await
        .unwrap();
    assert!(!user.is_anonymous);
    assert_eq!(ctx.storefront.display_name().await, "Võ Thị Sáu");

    let profile = ctx
        .storefront
        .profiles()
        .profile(&user.uid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile.email.unwrap().as_str(), "sau@example.com");
    assert!(profile.created_at.is_some());
    assert!(profile.wishlist.is_empty());
}

#[tokio::test]
async fn test_duplicate_email_and_bad_credentials() {
    let ctx = TestContext::new();
    ctx.storefront
        .register(&registration("An", "an@example.com", "secret12"))
        .await
        .unwrap();
    ctx.storefront.sign_out().await;

    let err = ctx
        .storefront
        .register(&registration("An Again", "an@example.com", "secret12"))
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "This email is already in use.");

    let err = ctx
        .storefront
        .sign_in("an@example.com", &SecretString::from("wrong-pass"))
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "Incorrect email or password.");

    let err = ctx
        .storefront
        .sign_in("nobody@example.com", &SecretString::from("secret12"))
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "Incorrect email or password.");
    assert!(ctx.storefront.auth().current_user().is_none());
}

#[tokio::test]
async fn test_weak_password_rejected_before_sign_up() {
    let ctx = TestContext::new();
    let err = ctx
        .storefront
        .register(&registration("Bình", "binh@example.com", "12345"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Auth(AuthError::WeakPassword(6))));
    assert_eq!(err.user_message(), "Password must be at least 6 characters.");
    assert_eq!(ctx.auth.account_count().await, 0);
}

#[tokio::test]
async fn test_cart_and_wishlist_follow_the_account() {
    let ctx = TestContext::with_catalog().await;
    let products = ctx
        .storefront
        .catalog()
        .fetch_products(CategoryFilter::All)
        .await
        .unwrap();
    let (first, second) = (&products[0], &products[1]);

    ctx.storefront
        .register(&registration("Cúc", "cuc@example.com", "secret12"))
        .await
        .unwrap();
    ctx.storefront.cart().add(first).await.unwrap();
    ctx.storefront.wishlist().toggle(second).await.unwrap();
    ctx.storefront.sign_out().await;
    assert!(ctx.storefront.cart().snapshot().await.is_empty());
    assert!(ctx.storefront.wishlist().is_empty().await);

    // Same account on another device.
    let other = ctx.second_session();
    other
        .sign_in("cuc@example.com", &SecretString::from("secret12"))
        .await
        .unwrap();
    assert_eq!(other.cart().items().await[0].product.id, first.id);
    assert!(other.wishlist().contains(&second.id).await);

    assert!(!other.wishlist().toggle(second).await.unwrap());
    other.sign_out().await;

    ctx.storefront
        .sign_in("cuc@example.com", &SecretString::from("secret12"))
        .await
        .unwrap();
    assert!(ctx.storefront.wishlist().is_empty().await);
    assert_eq!(ctx.storefront.cart().item_count().await, 1);
}

#[tokio::test]
async fn test_guest_cart_carries_into_new_account() {
    let ctx = TestContext::with_catalog().await;
    let products = ctx
        .storefront
        .catalog()
        .fetch_products(CategoryFilter::All)
        .await
        .unwrap();

    ctx.storefront.cart().add(&products[2]).await.unwrap();
    let user = ctx
        .storefront
        .register(&registration("Dũng", "dung@example.com", "secret12"))
        .await
        .unwrap();
    assert_eq!(ctx.storefront.cart().owner().await, Some(user.uid.clone()));

    let profile = ctx
        .storefront
        .profiles()
        .profile(&user.uid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile.cart.item_count(), 1);
}

#[tokio::test]
async fn test_guest_sign_in_can_be_disabled() {
    let ctx = TestContext::new();
    ctx.auth.set_anonymous_enabled(false).await;
    let err = ctx.storefront.sign_in_as_guest().await.unwrap_err();
    assert_eq!(err.user_message(), "This sign-in method is not enabled.");
}
