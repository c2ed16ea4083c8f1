//! Catalog browsing and editing.

use artisan_market_core::CategoryFilter;
use artisan_market_storefront::models::{NewProduct, Product};
use artisan_market_storefront::{AppError, Storefront};
use tracing::info;

use crate::CliError;

/// One listing line.
fn format_product(product: &Product) -> String {
    let stock = if product.in_stock() {
        format!("{} in stock", product.quantity)
    } else {
        "sold out".to_string()
    };
    format!(
        "{:<20}  {:<32}  {:>14}  {:<9}  {}",
        product.id, product.name, product.price, product.category, stock
    )
}

#[allow(clippy::print_stdout)]
fn print_products(products: &[Product]) {
    for product in products {
        println!("{}", format_product(product));
    }
}

/// List the catalog.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read.
pub async fn list(storefront: &Storefront, category: CategoryFilter) -> Result<(), CliError> {
    let products = storefront
        .catalog()
        .fetch_products(category)
        .await
        .map_err(AppError::from)?;
    print_products(&products);
    info!(count = products.len(), "Listed products");
    Ok(())
}

/// Search the catalog.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read.
pub async fn search(
    storefront: &Storefront,
    term: &str,
    category: CategoryFilter,
) -> Result<(), CliError> {
    let products = storefront
        .catalog()
        .search(term, category)
        .await
        .map_err(AppError::from)?;
    print_products(&products);
    info!(count = products.len(), term, "Search complete");
    Ok(())
}

/// Add one product.
///
/// # Errors
///
/// Returns an error if the product is invalid or cannot be written.
pub async fn add(storefront: &Storefront, product: &NewProduct) -> Result<(), CliError> {
    let created = storefront
        .catalog()
        .add_product(product)
        .await
        .map_err(AppError::from)?;
    info!(id = %created.id, "Product created");
    print_products(std::slice::from_ref(&created));
    Ok(())
}
