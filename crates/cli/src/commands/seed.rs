//! Seed the catalog from a YAML file.
//!
//! The file holds a single `products` list; each entry uses the same keys
//! as a product document (`name`, `price`, `category`, `imageUrl`, `rating`,
//! `quantity`, `description`, `material`, `icon`).

use std::path::Path;

use artisan_market_storefront::models::NewProduct;
use artisan_market_storefront::services::CatalogError;
use artisan_market_storefront::{AppError, Storefront};
use serde::Deserialize;
use tracing::{error, info};

use crate::CliError;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    products: Vec<NewProduct>,
}

/// Parse a catalog file.
fn parse_catalog(content: &str) -> Result<Vec<NewProduct>, serde_yaml::Error> {
    let file: CatalogFile = serde_yaml::from_str(content)?;
    Ok(file.products)
}

/// Every validation problem, one line per product.
fn validate_catalog(products: &[NewProduct]) -> Vec<String> {
    products
        .iter()
        .enumerate()
        .filter_map(|(index, product)| {
            product
                .validate()
                .err()
                .map(|reason| format!("#{} {}: {reason}", index + 1, product.name))
        })
        .collect()
}

/// Seed products from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, any entry is
/// invalid, or a batch write fails.
pub async fn products(storefront: &Storefront, path: &Path, dry_run: bool) -> Result<(), CliError> {
    info!(path = %path.display(), "Loading catalog from file");

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let products = parse_catalog(&content)?;
    info!(products = products.len(), "Parsed catalog");

    let errors = validate_catalog(&products);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        let summary = format!("{} invalid products", errors.len());
        return Err(AppError::from(CatalogError::Invalid(summary)).into());
    }

    if dry_run {
        info!(products = products.len(), "Dry run: catalog is valid, nothing written");
        return Ok(());
    }

    let ids = storefront
        .catalog()
        .seed_products(&products)
        .await
        .map_err(AppError::from)?;
    info!("Seeding complete!");
    info!("  Products written: {}", ids.len());
    Ok(())
}
