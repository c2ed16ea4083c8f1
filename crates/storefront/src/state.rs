//! Session state shared by every screen of the storefront.

use std::sync::Arc;

use artisan_market_core::{PaymentMethod, UserId};
use secrecy::SecretString;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::backend::{AuthProvider, AuthUser, BackendError, DocumentStore};
use crate::config::StorefrontConfig;
use crate::error::{AppError, Result};
use crate::firebase;
use crate::memory::{MemoryAuth, MemoryStore};
use crate::models::{Order, ShippingForm};
use crate::services::{
    AuthSession, CartStore, CatalogService, CheckoutService, ProfileService, RegistrationForm,
    WishlistStore,
};

/// One storefront session: the backend plus every service bound to it.
///
/// This struct is cheaply cloneable via `Arc`. Two background tasks follow
/// the auth session: one re-binds the cart and wishlist whenever the
/// signed-in user changes, the other refreshes the ID token before it
/// expires. Both stop when the last clone is dropped.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: StorefrontConfig,
    store: Arc<dyn DocumentStore>,
    auth: AuthSession,
    catalog: CatalogService,
    checkout: CheckoutService,
    profiles: ProfileService,
    binding: Arc<UserBinding>,
    listener: JoinHandle<()>,
    refresher: JoinHandle<()>,
}

impl Drop for StorefrontInner {
    fn drop(&mut self) {
        self.listener.abort();
        self.refresher.abort();
    }
}

/// Cart and wishlist plus the user they are currently bound to.
struct UserBinding {
    cart: CartStore,
    wishlist: WishlistStore,
    bound: Mutex<Option<BoundUser>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BoundUser {
    uid: UserId,
    is_anonymous: bool,
}

impl BoundUser {
    fn of(user: &AuthUser) -> Self {
        Self {
            uid: user.uid.clone(),
            is_anonymous: user.is_anonymous,
        }
    }
}

impl Storefront {
    /// Assemble a session over the given backend. Must be called inside a
    /// tokio runtime.
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn AuthProvider>,
    ) -> Self {
        let auth = AuthSession::new(provider, Arc::clone(&store));
        let binding = Arc::new(UserBinding {
            cart: CartStore::new(Arc::clone(&store)),
            wishlist: WishlistStore::new(Arc::clone(&store)),
            bound: Mutex::new(None),
        });
        let listener = tokio::spawn(follow_session(auth.subscribe(), Arc::clone(&binding)));
        let refresher = tokio::spawn({
            let auth = auth.clone();
            async move { auth.keep_token_fresh().await }
        });

        Self {
            inner: Arc::new(StorefrontInner {
                catalog: CatalogService::new(Arc::clone(&store), config.catalog_cache_ttl),
                checkout: CheckoutService::new(Arc::clone(&store)),
                profiles: ProfileService::new(Arc::clone(&store)),
                config,
                store,
                auth,
                binding,
                listener,
                refresher,
            }),
        }
    }

    /// Session against Firebase.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Http` if the HTTP client cannot be built.
    pub fn connect(config: StorefrontConfig) -> std::result::Result<Self, BackendError> {
        let (firestore, identity) = firebase::connect(&config.firebase, config.http_timeout)?;
        Ok(Self::new(config, Arc::new(firestore), Arc::new(identity)))
    }

    /// Session against a fresh in-memory backend.
    #[must_use]
    pub fn offline() -> Self {
        Self::new(
            StorefrontConfig::offline(),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryAuth::new()),
        )
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// The document store every service writes through.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    #[must_use]
    pub fn auth(&self) -> &AuthSession {
        &self.inner.auth
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.inner.binding.cart
    }

    #[must_use]
    pub fn wishlist(&self) -> &WishlistStore {
        &self.inner.binding.wishlist
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    #[must_use]
    pub fn profiles(&self) -> &ProfileService {
        &self.inner.profiles
    }

    /// Sign in and bind the cart and wishlist to the user before returning.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` if sign-in fails.
    pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<AuthUser> {
        let user = self.inner.auth.sign_in(email, password).await?;
        self.on_auth_change().await;
        Ok(user)
    }

    /// # Errors
    ///
    /// Returns `AppError::Auth` if anonymous sign-in fails.
    pub async fn sign_in_as_guest(&self) -> Result<AuthUser> {
        let user = self.inner.auth.sign_in_as_guest().await?;
        self.on_auth_change().await;
        Ok(user)
    }

    /// # Errors
    ///
    /// Returns `AppError::Auth` if registration fails. The cart and wishlist
    /// are bound to the new account even when only the profile write failed.
    pub async fn register(&self, form: &RegistrationForm) -> Result<AuthUser> {
        let result = self.inner.auth.register(form).await;
        self.on_auth_change().await;
        Ok(result?)
    }

    pub async fn sign_out(&self) {
        self.inner.auth.sign_out().await;
        self.on_auth_change().await;
    }

    /// Re-bind the cart and wishlist if the signed-in user changed since the
    /// last call. The background listener calls this too.
    pub async fn on_auth_change(&self) {
        let user = self.inner.auth.current_user().as_ref().map(BoundUser::of);
        rebind(&self.inner.binding, user).await;
    }

    /// Place an order for the cart as the current user.
    ///
    /// # Errors
    ///
    /// - `AppError::Auth` if the session token cannot be refreshed
    /// - `AppError::Checkout` if the order is rejected or not saved
    pub async fn place_order(
        &self,
        shipping: &ShippingForm,
        payment_method: PaymentMethod,
    ) -> Result<Order> {
        self.inner.auth.fresh_token().await?;
        let user = self.inner.auth.current_user();
        let order = self
            .inner
            .checkout
            .place_order(self.cart(), shipping, payment_method, user.as_ref())
            .await?;
        Ok(order)
    }

    /// Greeting name for the current user.
    pub async fn display_name(&self) -> String {
        let user = self.inner.auth.current_user();
        self.inner.profiles.display_name(user.as_ref()).await
    }
}

async fn follow_session(mut rx: watch::Receiver<Option<AuthUser>>, binding: Arc<UserBinding>) {
    loop {
        let user = rx.borrow_and_update().as_ref().map(BoundUser::of);
        rebind(&binding, user).await;
        if rx.changed().await.is_err() {
            break;
        }
    }
}

#[instrument(skip(binding))]
async fn rebind(binding: &UserBinding, user: Option<BoundUser>) {
    let mut bound = binding.bound.lock().await;
    if bound.as_ref().map(|b| &b.uid) == user.as_ref().map(|u| &u.uid) {
        return;
    }

    match &user {
        Some(BoundUser { uid, .. }) => {
            // Only a cart built while signed out or as a guest follows the
            // user into an account.
            if bound.as_ref().is_some_and(|b| !b.is_anonymous) {
                binding.cart.detach().await;
            }
            if let Err(e) = binding.cart.attach(uid).await {
                AppError::from(e).report();
            }
            if let Err(e) = binding.wishlist.load(Some(uid)).await {
                AppError::from(e).report();
            }
        }
        None => {
            binding.cart.detach().await;
            if let Err(e) = binding.wishlist.load(None).await {
                AppError::from(e).report();
            }
        }
    }
    debug!("Cart and wishlist re-bound");
    *bound = user;
}
