//! Product catalog.
//!
//! Reads the `products` collection, optionally filtered by category, and
//! caches product lists using `moka` for the configured TTL. Writes through
//! this service invalidate the cache.

use std::sync::Arc;
use std::time::Duration;

use artisan_market_core::{CategoryFilter, ProductId};
use moka::future::Cache;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::backend::{
    BackendError, DocPath, DocumentStore, Filter, Write, collections, new_document_id,
};
use crate::models::{NewProduct, Product};

/// Most writes a single batch commit may carry.
pub const MAX_BATCH_WRITES: usize = 500;

/// Catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("product not found: {0}")]
    NotFound(ProductId),

    #[error("invalid product: {0}")]
    Invalid(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Catalog reads and writes over the document store.
#[derive(Clone)]
pub struct CatalogService {
    inner: Arc<CatalogServiceInner>,
}

struct CatalogServiceInner {
    store: Arc<dyn DocumentStore>,
    cache: Cache<CategoryFilter, Arc<Vec<Product>>>,
}

impl CatalogService {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, cache_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(64)
            .time_to_live(cache_ttl)
            .build();
        Self {
            inner: Arc::new(CatalogServiceInner { store, cache }),
        }
    }

    /// Products in a category, or the whole catalog for `CategoryFilter::All`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Backend` if the store cannot be read.
    #[instrument(skip(self))]
    pub async fn fetch_products(
        &self,
        filter: CategoryFilter,
    ) -> Result<Arc<Vec<Product>>, CatalogError> {
        if let Some(products) = self.inner.cache.get(&filter).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let products = Arc::new(load_products(self.inner.store.as_ref(), filter).await?);
        self.inner.cache.insert(filter, Arc::clone(&products)).await;
        Ok(products)
    }

    /// One product by id.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if no such product exists.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn get_product(&self, id: &ProductId) -> Result<Product, CatalogError> {
        let path = DocPath::new(collections::PRODUCTS, id.as_str());
        self.inner
            .store
            .get(&path)
            .await?
            .map(|doc| Product::from_document(&doc))
            .ok_or_else(|| CatalogError::NotFound(id.clone()))
    }

    /// Products whose name or description contains `term`, ignoring case.
    /// A blank term returns every product passing the filter.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Backend` if the store cannot be read.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        term: &str,
        filter: CategoryFilter,
    ) -> Result<Vec<Product>, CatalogError> {
        let products = self.fetch_products(filter).await?;
        Ok(products
            .iter()
            .filter(|p| p.matches_term(term))
            .cloned()
            .collect())
    }

    /// Validate and create a product with a generated id.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` if validation fails, or
    /// `CatalogError::Backend` if the write fails.
    #[instrument(skip(self, product), fields(name = %product.name))]
    pub async fn add_product(&self, product: &NewProduct) -> Result<Product, CatalogError> {
        product.validate().map_err(CatalogError::Invalid)?;

        let doc = self
            .inner
            .store
            .create(collections::PRODUCTS, product.to_fields())
            .await?;
        self.inner.cache.invalidate_all();

        info!(id = %doc.id, "Product added");
        Ok(Product::from_document(&doc))
    }

    /// Bulk-create products in batches of at most [`MAX_BATCH_WRITES`].
    ///
    /// Every product is validated before anything is written. Batches are
    /// atomic individually; a failing batch stops the import and earlier
    /// batches stay written.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` naming the first invalid entry, or
    /// `CatalogError::Backend` if a batch fails.
    #[instrument(skip(self, products), fields(count = products.len()))]
    pub async fn seed_products(
        &self,
        products: &[NewProduct],
    ) -> Result<Vec<ProductId>, CatalogError> {
        for (index, product) in products.iter().enumerate() {
            product
                .validate()
                .map_err(|reason| CatalogError::Invalid(format!("entry {}: {reason}", index + 1)))?;
        }

        let mut ids = Vec::with_capacity(products.len());
        for chunk in products.chunks(MAX_BATCH_WRITES) {
            let mut writes = Vec::with_capacity(chunk.len());
            let mut batch_ids = Vec::with_capacity(chunk.len());
            for product in chunk {
                let id = new_document_id();
                writes.push(Write::set(
                    DocPath::new(collections::PRODUCTS, id.as_str()),
                    product.to_fields(),
                ));
                batch_ids.push(ProductId::new(id));
            }

            let result = self.inner.store.commit(writes).await;
            self.inner.cache.invalidate_all();
            result?;
            debug!(batch = batch_ids.len(), "Seed batch committed");
            ids.extend(batch_ids);
        }

        info!(count = ids.len(), "Products seeded");
        Ok(ids)
    }

    /// Poll the catalog every `interval` and publish each changed list.
    ///
    /// The first value is published once the initial read completes; the
    /// receiver starts out empty. Dropping the returned [`ProductWatch`]
    /// stops polling.
    #[must_use]
    pub fn watch_products(&self, filter: CategoryFilter, interval: Duration) -> ProductWatch {
        let (tx, rx) = watch::channel(Vec::new());
        let store = Arc::clone(&self.inner.store);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut published = false;
            loop {
                ticker.tick().await;
                match load_products(store.as_ref(), filter).await {
                    // The first read is published even when it is empty.
                    Ok(products) if !published => {
                        tx.send_replace(products);
                        published = true;
                    }
                    Ok(products) => {
                        tx.send_if_modified(|current| {
                            if *current == products {
                                return false;
                            }
                            *current = products;
                            true
                        });
                    }
                    Err(e) => warn!(error = %e, "Product watch poll failed"),
                }
                if tx.is_closed() {
                    break;
                }
            }
        });

        ProductWatch { receiver: rx, task }
    }
}

async fn load_products(
    store: &dyn DocumentStore,
    filter: CategoryFilter,
) -> Result<Vec<Product>, BackendError> {
    let docs = match filter {
        CategoryFilter::All => store.list(collections::PRODUCTS).await?,
        CategoryFilter::Only(category) => {
            let filter = Filter::equal("category", category.key());
            store.query(collections::PRODUCTS, &filter).await?
        }
    };
    Ok(docs.iter().map(Product::from_document).collect())
}

/// Live product list fed by [`CatalogService::watch_products`].
pub struct ProductWatch {
    receiver: watch::Receiver<Vec<Product>>,
    task: JoinHandle<()>,
}

impl ProductWatch {
    /// Receiver of the latest product list.
    #[must_use]
    pub fn receiver(&self) -> watch::Receiver<Vec<Product>> {
        self.receiver.clone()
    }

    /// Wait for the next published list.
    ///
    /// # Errors
    ///
    /// Returns an error if the polling task has stopped.
    pub async fn changed(&mut self) -> Result<Vec<Product>, watch::error::RecvError> {
        self.receiver.changed().await?;
        Ok(self.receiver.borrow_and_update().clone())
    }
}

impl Drop for ProductWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use artisan_market_core::Category;
    use rust_decimal::Decimal;

    use super::*;
    use crate::fields;
    use crate::memory::MemoryStore;

    fn new_product(name: &str, category: Category) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            price: Decimal::from(150_000),
            category,
            image_url: String::new(),
            rating: 4.5,
            quantity: 3,
            description: Some(format!("Handmade {name}")),
            material: None,
            icon: None,
        }
    }

    async fn seeded() -> (CatalogService, MemoryStore) {
        let store = MemoryStore::new();
        store
            .insert("products", "p1", fields! { "name" => "Celadon Vase", "category" => "ceramics", "price" => 450_000_i64 })
            .await;
        store
            .insert("products", "p2", fields! { "name" => "Rattan Basket", "category" => "weaving", "price" => 120_000_i64 })
            .await;
        store
            .insert("products", "p3", fields! { "name" => "Tea Bowl", "category" => "ceramics" })
            .await;
        let catalog = CatalogService::new(Arc::new(store.clone()), Duration::from_secs(60));
        (catalog, store)
    }

    #[tokio::test]
    async fn test_fetch_by_category() {
        let (catalog, _) = seeded().await;
        assert_eq!(catalog.fetch_products(CategoryFilter::All).await.unwrap().len(), 3);

        let ceramics = catalog
            .fetch_products(CategoryFilter::Only(Category::Ceramics))
            .await
            .unwrap();
        assert_eq!(ceramics.len(), 2);
        assert!(ceramics.iter().all(|p| p.category == "ceramics"));
    }

    #[tokio::test]
    async fn test_fetch_is_cached_until_write() {
        let (catalog, store) = seeded().await;
        assert_eq!(catalog.fetch_products(CategoryFilter::All).await.unwrap().len(), 3);

        store.insert("products", "p4", fields! { "name" => "Shadow" }).await;
        assert_eq!(catalog.fetch_products(CategoryFilter::All).await.unwrap().len(), 3);

        catalog
            .add_product(&new_product("Silver Ring", Category::Jewelry))
            .await
            .unwrap();
        assert_eq!(catalog.fetch_products(CategoryFilter::All).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_get_product_not_found() {
        let (catalog, _) = seeded().await;
        assert_eq!(
            catalog.get_product(&ProductId::new("p2")).await.unwrap().name,
            "Rattan Basket"
        );
        let err = catalog.get_product(&ProductId::new("nope")).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_search_ignores_case() {
        let (catalog, _) = seeded().await;
        let found = catalog.search("BOWL", CategoryFilter::All).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.as_str(), "p3");

        let all = catalog.search("", CategoryFilter::Only(Category::Weaving)).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_add_product_validates() {
        let (catalog, store) = seeded().await;
        let mut bad = new_product("  ", Category::Painting);
        let err = catalog.add_product(&bad).await.unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)));

        bad.name = "Lacquer".to_string();
        bad.price = Decimal::ZERO;
        assert!(catalog.add_product(&bad).await.is_err());
        assert_eq!(store.len("products").await, 3);
    }

    #[tokio::test]
    async fn test_seed_products_batches() {
        let store = MemoryStore::new();
        let catalog = CatalogService::new(Arc::new(store.clone()), Duration::from_secs(60));
        let products: Vec<NewProduct> = (0..1_001)
            .map(|i| new_product(&format!("Item {i}"), Category::Weaving))
            .collect();

        let ids = catalog.seed_products(&products).await.unwrap();
        assert_eq!(ids.len(), 1_001);
        assert_eq!(store.len("products").await, 1_001);
        assert_eq!(store.commit_count(), 3);
    }

    #[tokio::test]
    async fn test_seed_rejects_any_invalid_entry_up_front() {
        let store = MemoryStore::new();
        let catalog = CatalogService::new(Arc::new(store.clone()), Duration::from_secs(60));
        let mut products = vec![new_product("Good", Category::Jewelry); 3];
        products[2].rating = 7.0;

        let err = catalog.seed_products(&products).await.unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(msg) if msg.starts_with("entry 3")));
        assert_eq!(store.len("products").await, 0);
    }

    #[tokio::test]
    async fn test_watch_publishes_changes() {
        let (catalog, store) = seeded().await;
        let mut watch = catalog.watch_products(CategoryFilter::All, Duration::from_millis(10));

        let first = watch.changed().await.unwrap();
        assert_eq!(first.len(), 3);

        store.insert("products", "p9", fields! { "name" => "New Scarf" }).await;
        let second = watch.changed().await.unwrap();
        assert_eq!(second.len(), 4);
    }

    #[tokio::test]
    async fn test_watch_publishes_empty_catalog() {
        let catalog = CatalogService::new(Arc::new(MemoryStore::new()), Duration::from_secs(60));
        let mut watch = catalog.watch_products(CategoryFilter::All, Duration::from_millis(10));

        let first = tokio::time::timeout(Duration::from_secs(2), watch.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(first.is_empty());
    }
}
