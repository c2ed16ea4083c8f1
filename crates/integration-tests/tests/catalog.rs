//! Catalog scenarios: seeding, category filters, search and live updates.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::time::Duration;

use artisan_market_core::{Category, CategoryFilter};
use artisan_market_integration_tests::{TestContext, starter_products};
use artisan_market_storefront::services::CatalogError;

#[tokio::test]
async fn test_starter_catalog_is_valid() {
    let products = starter_products();
    assert_eq!(products.len(), 8);
    for product in &products {
        assert!(product.validate().is_ok(), "{} should be valid", product.name);
    }
}

#[tokio::test]
async fn test_each_category_lists_its_products() {
    let ctx = TestContext::with_catalog().await;
    let catalog = ctx.storefront.catalog();

    assert_eq!(catalog.fetch_products(CategoryFilter::All).await.unwrap().len(), 8);
    for category in [
        Category::Ceramics,
        Category::Weaving,
        Category::Painting,
        Category::Jewelry,
    ] {
        let products = catalog.fetch_products(category.into()).await.unwrap();
        assert_eq!(products.len(), 2, "{category}");
        assert!(products.iter().all(|p| p.category() == Some(category)));
    }
}

#[tokio::test]
async fn test_search_matches_name_and_description() {
    let ctx = TestContext::with_catalog().await;
    let catalog = ctx.storefront.catalog();

    let by_name = catalog.search("tea bowl", CategoryFilter::All).await.unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].name, "Blue Lotus Tea Bowl");

    let by_description = catalog.search("SILVERSMITHS", CategoryFilter::All).await.unwrap();
    assert_eq!(by_description.len(), 1);

    let filtered = catalog
        .search("lotus", CategoryFilter::Only(Category::Jewelry))
        .await
        .unwrap();
    assert!(filtered.is_empty());
}

#[tokio::test]
async fn test_product_lookup() {
    let ctx = TestContext::with_catalog().await;
    let catalog = ctx.storefront.catalog();
    let listed = catalog.fetch_products(CategoryFilter::All).await.unwrap();

    let product = catalog.get_product(&listed[0].id).await.unwrap();
    assert_eq!(product, listed[0]);

    let missing = artisan_market_core::ProductId::new("does-not-exist");
    assert!(matches!(
        catalog.get_product(&missing).await,
        Err(CatalogError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_watch_sees_products_added_elsewhere() {
    let ctx = TestContext::with_catalog().await;
    let mut watch = ctx
        .storefront
        .catalog()
        .watch_products(CategoryFilter::Only(Category::Weaving), Duration::from_millis(10));
    assert_eq!(watch.changed().await.unwrap().len(), 2);

    let other = ctx.second_session();
    let mut mat = starter_products()
        .into_iter()
        .find(|p| p.category == Category::Weaving)
        .unwrap();
    mat.name = "Water Hyacinth Tray".to_string();
    other.catalog().add_product(&mat).await.unwrap();

    let updated = tokio::time::timeout(Duration::from_secs(2), watch.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.len(), 3);
}
