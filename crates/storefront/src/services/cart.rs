//! Cart state with optional sync to the signed-in user's profile.
//!
//! While attached to a user, every mutation writes the whole cart to
//! `users/{uid}.cart` with a merge write before returning. A failed write
//! rolls the local change back.

use std::sync::Arc;

use artisan_market_core::{Price, ProductId, UserId};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::backend::{BackendError, DocPath, DocumentStore, FieldsExt};
use crate::error::add_breadcrumb;
use crate::fields;
use crate::models::{Cart, CartError, CartItem, Product};

/// The session's cart.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<CartStoreInner>,
}

struct CartStoreInner {
    store: Arc<dyn DocumentStore>,
    state: Mutex<CartState>,
}

#[derive(Default)]
struct CartState {
    cart: Cart,
    owner: Option<UserId>,
}

impl CartStore {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner: Arc::new(CartStoreInner {
                store,
                state: Mutex::new(CartState::default()),
            }),
        }
    }

    /// Start syncing to `uid`.
    ///
    /// A stored cart replaces the local one. When nothing is stored, the
    /// local cart (built up before signing in) is kept and written to the
    /// profile.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Backend` if the profile cannot be read or written;
    /// the cart stays attached either way.
    #[instrument(skip(self), fields(uid = %uid))]
    pub async fn attach(&self, uid: &UserId) -> Result<(), CartError> {
        let mut state = self.inner.state.lock().await;
        state.owner = Some(uid.clone());

        let stored = self.load(uid).await?;
        if stored.is_empty() {
            if !state.cart.is_empty() {
                persist(self.inner.store.as_ref(), uid, &state.cart).await?;
                debug!(lines = state.cart.len(), "Local cart saved to profile");
            }
        } else {
            info!(lines = stored.len(), "Cart restored");
            state.cart = stored;
        }
        Ok(())
    }

    /// Stop syncing and empty the local cart. The stored copy is untouched.
    pub async fn detach(&self) {
        let mut state = self.inner.state.lock().await;
        state.owner = None;
        state.cart.clear();
    }

    /// Reload the cart from the attached user's profile. No-op when detached.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Backend` if the profile cannot be read.
    pub async fn restore(&self) -> Result<(), CartError> {
        let mut state = self.inner.state.lock().await;
        if let Some(uid) = state.owner.clone() {
            state.cart = self.load(&uid).await?;
        }
        Ok(())
    }

    async fn load(&self, uid: &UserId) -> Result<Cart, BackendError> {
        let doc = self.inner.store.get(&DocPath::user(uid)).await?;
        Ok(doc.map_or_else(Cart::new, |doc| Cart::from_values(doc.fields.array("cart"))))
    }

    /// Add one unit without a stock check.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Backend` if syncing fails.
    pub async fn add(&self, product: &Product) -> Result<(), CartError> {
        self.mutate("Added to cart", Some(&product.id), |cart| {
            cart.add(product);
            Ok(())
        })
        .await
    }

    /// Add `quantity` units after a stock check.
    ///
    /// # Errors
    ///
    /// See [`Cart::add_quantity`]; also `CartError::Backend` if syncing fails.
    pub async fn add_quantity(&self, product: &Product, quantity: u32) -> Result<(), CartError> {
        self.mutate("Added to cart", Some(&product.id), |cart| {
            cart.add_quantity(product, quantity)
        })
        .await
    }

    /// # Errors
    ///
    /// Returns `CartError::Backend` if syncing fails.
    pub async fn decrement(&self, id: &ProductId) -> Result<bool, CartError> {
        self.mutate("Decremented cart line", Some(id), |cart| Ok(cart.decrement(id)))
            .await
    }

    /// # Errors
    ///
    /// Returns `CartError::Backend` if syncing fails.
    pub async fn set_quantity(&self, id: &ProductId, quantity: u32) -> Result<bool, CartError> {
        self.mutate("Changed cart quantity", Some(id), |cart| {
            Ok(cart.set_quantity(id, quantity))
        })
        .await
    }

    /// # Errors
    ///
    /// Returns `CartError::Backend` if syncing fails.
    pub async fn remove(&self, id: &ProductId) -> Result<bool, CartError> {
        self.mutate("Removed from cart", Some(id), |cart| Ok(cart.remove(id)))
            .await
    }

    /// # Errors
    ///
    /// Returns `CartError::Backend` if syncing fails.
    pub async fn clear(&self) -> Result<(), CartError> {
        self.mutate("Cleared cart", None, |cart| {
            cart.clear();
            Ok(())
        })
        .await
    }

    /// Apply `change` and sync the result. Nothing is written when the cart
    /// is unchanged.
    async fn mutate<T>(
        &self,
        action: &str,
        product_id: Option<&ProductId>,
        change: impl FnOnce(&mut Cart) -> Result<T, CartError>,
    ) -> Result<T, CartError> {
        let mut state = self.inner.state.lock().await;
        let before = state.cart.clone();
        let result = change(&mut state.cart)?;
        if state.cart == before {
            return Ok(result);
        }

        if let Some(uid) = &state.owner
            && let Err(e) = persist(self.inner.store.as_ref(), uid, &state.cart).await
        {
            warn!(error = %e, uid = %uid, "Cart sync failed, rolling back");
            state.cart = before;
            return Err(e.into());
        }

        let data = product_id.map(|id| [("product_id", id.as_str())]);
        add_breadcrumb("cart", action, data.as_ref().map(<[_; 1]>::as_slice));
        Ok(result)
    }

    /// Copy of the current cart.
    pub async fn snapshot(&self) -> Cart {
        self.inner.state.lock().await.cart.clone()
    }

    pub async fn items(&self) -> Vec<CartItem> {
        self.inner.state.lock().await.cart.items().to_vec()
    }

    pub async fn total_price(&self) -> Price {
        self.inner.state.lock().await.cart.total_price()
    }

    pub async fn item_count(&self) -> u32 {
        self.inner.state.lock().await.cart.item_count()
    }

    pub async fn badge_label(&self) -> String {
        self.inner.state.lock().await.cart.badge_label()
    }

    /// User the cart syncs to, if any.
    pub async fn owner(&self) -> Option<UserId> {
        self.inner.state.lock().await.owner.clone()
    }
}

async fn persist(store: &dyn DocumentStore, uid: &UserId, cart: &Cart) -> Result<(), BackendError> {
    store
        .merge(DocPath::user(uid), fields! { "cart" => cart.to_value() }, Vec::new())
        .await
}
