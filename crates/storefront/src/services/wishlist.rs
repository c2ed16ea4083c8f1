//! Wishlist stored as an array of product snapshots in `users/{uid}.wishlist`.
//!
//! Toggles update local state first, then issue an array union or remove on
//! the profile document. Removal sends the exact stored entries so products
//! whose details changed since they were saved are still removed.

use std::sync::Arc;

use artisan_market_core::{ProductId, UserId};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::backend::{BackendError, DocPath, DocumentStore, FieldTransform, Fields, FieldsExt, Value};
use crate::error::add_breadcrumb;
use crate::models::Product;

const WISHLIST_FIELD: &str = "wishlist";

/// One wishlisted product and the raw array entries it was decoded from.
#[derive(Debug, Clone)]
struct Entry {
    product: Product,
    stored: Vec<Value>,
}

#[derive(Default)]
struct WishlistState {
    entries: Vec<Entry>,
    owner: Option<UserId>,
}

/// The session's wishlist.
#[derive(Clone)]
pub struct WishlistStore {
    inner: Arc<WishlistStoreInner>,
}

struct WishlistStoreInner {
    store: Arc<dyn DocumentStore>,
    state: Mutex<WishlistState>,
}

impl WishlistStore {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner: Arc::new(WishlistStoreInner {
                store,
                state: Mutex::new(WishlistState::default()),
            }),
        }
    }

    /// Replace the local wishlist with `uid`'s stored one, or empty it when
    /// `uid` is `None`. A missing profile or field loads as empty.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the profile cannot be read; the wishlist
    /// is left empty but still bound to `uid`.
    #[instrument(skip(self))]
    pub async fn load(&self, uid: Option<&UserId>) -> Result<(), BackendError> {
        let mut state = self.inner.state.lock().await;
        state.owner = uid.cloned();
        state.entries.clear();

        let Some(uid) = uid else {
            return Ok(());
        };
        if let Some(doc) = self.inner.store.get(&DocPath::user(uid)).await? {
            state.entries = entries_from(&doc.fields);
        }
        debug!(count = state.entries.len(), "Wishlist loaded");
        Ok(())
    }

    /// Add the product if absent, remove it if present. Returns whether the
    /// product is wishlisted afterwards.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the profile write fails; the local change
    /// is rolled back.
    #[instrument(skip(self, product), fields(id = %product.id))]
    pub async fn toggle(&self, product: &Product) -> Result<bool, BackendError> {
        let mut state = self.inner.state.lock().await;
        let position = state
            .entries
            .iter()
            .position(|e| e.product.id == product.id);

        let (added, transform, rollback) = match position {
            Some(index) => {
                let removed = state.entries.remove(index);
                let transform = FieldTransform::ArrayRemove(removed.stored.clone());
                (false, transform, Rollback::Reinsert(index, removed))
            }
            None => {
                let snapshot = Value::Map(product.to_snapshot());
                state.entries.push(Entry {
                    product: product.clone(),
                    stored: vec![snapshot.clone()],
                });
                (true, FieldTransform::ArrayUnion(vec![snapshot]), Rollback::Pop)
            }
        };

        if let Some(uid) = &state.owner {
            let write = self
                .inner
                .store
                .merge(
                    DocPath::user(uid),
                    Fields::new(),
                    vec![(WISHLIST_FIELD.to_string(), transform)],
                )
                .await;
            if let Err(e) = write {
                warn!(error = %e, uid = %uid, "Wishlist sync failed, rolling back");
                match rollback {
                    Rollback::Reinsert(index, entry) => state.entries.insert(index, entry),
                    Rollback::Pop => {
                        state.entries.pop();
                    }
                }
                return Err(e);
            }
        }

        let action = if added {
            "Added to wishlist"
        } else {
            "Removed from wishlist"
        };
        add_breadcrumb("wishlist", action, Some(&[("product_id", product.id.as_str())]));
        Ok(added)
    }

    pub async fn contains(&self, id: &ProductId) -> bool {
        self.inner
            .state
            .lock()
            .await
            .entries
            .iter()
            .any(|e| &e.product.id == id)
    }

    /// Wishlisted products in the order they were added.
    pub async fn items(&self) -> Vec<Product> {
        self.inner
            .state
            .lock()
            .await
            .entries
            .iter()
            .map(|e| e.product.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

enum Rollback {
    Reinsert(usize, Entry),
    Pop,
}

/// Group stored entries by product id, keeping every raw entry so a removal
/// clears duplicates too. Entries without an id are ignored.
fn entries_from(fields: &Fields) -> Vec<Entry> {
    let mut entries: Vec<Entry> = Vec::new();
    for value in fields.array(WISHLIST_FIELD) {
        let Some(product) = value.as_map().and_then(Product::from_snapshot) else {
            continue;
        };
        match entries.iter_mut().find(|e| e.product.id == product.id) {
            Some(entry) => entry.stored.push(value.clone()),
            None => entries.push(Entry {
                product,
                stored: vec![value.clone()],
            }),
        }
    }
    entries
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::Document;
    use crate::fields;
    use crate::memory::MemoryStore;

    fn product(id: &str, price: i64) -> Product {
        Product::from_document(&Document {
            id: id.to_string(),
            fields: fields! { "name" => format!("Item {id}"), "price" => price },
            update_time: None,
        })
    }

    fn wishlist() -> (WishlistStore, MemoryStore) {
        let store = MemoryStore::new();
        (WishlistStore::new(Arc::new(store.clone())), store)
    }

    async fn stored(store: &MemoryStore) -> Vec<Value> {
        let doc = store
            .get(&DocPath::user(&UserId::new("u1")))
            .await
            .unwrap()
            .unwrap();
        doc.fields.array(WISHLIST_FIELD).to_vec()
    }

    #[tokio::test]
    async fn test_load_without_user_or_document_is_empty() {
        let (wishlist, _) = wishlist();
        wishlist.load(None).await.unwrap();
        assert!(wishlist.is_empty().await);

        wishlist.load(Some(&UserId::new("nobody"))).await.unwrap();
        assert!(wishlist.is_empty().await);
    }

    #[tokio::test]
    async fn test_toggle_adds_then_removes() {
        let (wishlist, store) = wishlist();
        wishlist.load(Some(&UserId::new("u1"))).await.unwrap();

        assert!(wishlist.toggle(&product("p1", 10_000)).await.unwrap());
        assert!(wishlist.contains(&ProductId::new("p1")).await);
        assert_eq!(stored(&store).await.len(), 1);

        assert!(!wishlist.toggle(&product("p1", 10_000)).await.unwrap());
        assert!(!wishlist.contains(&ProductId::new("p1")).await);
        assert!(stored(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_uses_stored_snapshot() {
        let (wishlist, store) = wishlist();
        let old = Value::Map(product("p1", 10_000).to_snapshot());
        let duplicate = Value::Map(product("p1", 12_000).to_snapshot());
        store
            .insert("users", "u1", fields! { "wishlist" => vec![old, duplicate] })
            .await;

        wishlist.load(Some(&UserId::new("u1"))).await.unwrap();
        assert_eq!(wishlist.len().await, 1);

        // Price changed since it was saved.
        assert!(!wishlist.toggle(&product("p1", 15_000)).await.unwrap());
        assert!(stored(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back() {
        let (wishlist, store) = wishlist();
        wishlist.load(Some(&UserId::new("u1"))).await.unwrap();
        wishlist.toggle(&product("p1", 10_000)).await.unwrap();
        wishlist.toggle(&product("p2", 10_000)).await.unwrap();

        store.fail_next_writes(1);
        assert!(wishlist.toggle(&product("p1", 10_000)).await.is_err());
        let ids: Vec<_> = wishlist.items().await.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![ProductId::new("p1"), ProductId::new("p2")]);

        store.fail_next_writes(1);
        assert!(wishlist.toggle(&product("p3", 10_000)).await.is_err());
        assert_eq!(wishlist.len().await, 2);
    }

    #[tokio::test]
    async fn test_anonymous_wishlist_is_local() {
        let (wishlist, store) = wishlist();
        wishlist.load(None).await.unwrap();
        wishlist.toggle(&product("p1", 10_000)).await.unwrap();
        assert_eq!(wishlist.len().await, 1);
        assert_eq!(store.commit_count(), 0);
    }
}
