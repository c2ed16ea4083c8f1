//! Integration test harness for Artisan Market.
//!
//! Scenarios run a full [`Storefront`] against the in-memory backend, so no
//! emulator or network access is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p artisan-market-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `catalog` - Seeding, filtering, search and live updates
//! - `shopping` - Cart and checkout as a guest
//! - `accounts` - Registration, sign-in and per-user cart and wishlist

use std::sync::Arc;

use artisan_market_storefront::Storefront;
use artisan_market_storefront::config::StorefrontConfig;
use artisan_market_storefront::memory::{MemoryAuth, MemoryStore};
use artisan_market_storefront::models::{NewProduct, ShippingForm};
use artisan_market_storefront::services::RegistrationForm;
use secrecy::SecretString;
use serde::Deserialize;

/// The starter catalog shipped in `data/products.yaml`.
pub const STARTER_CATALOG: &str = include_str!("../../../data/products.yaml");

#[derive(Deserialize)]
struct CatalogFile {
    products: Vec<NewProduct>,
}

/// A storefront plus direct handles on its in-memory backend.
pub struct TestContext {
    pub storefront: Storefront,
    pub store: MemoryStore,
    pub auth: MemoryAuth,
}

impl TestContext {
    /// Fresh backend with an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let auth = MemoryAuth::new();
        let storefront = Storefront::new(
            StorefrontConfig::offline(),
            Arc::new(store.clone()),
            Arc::new(auth.clone()),
        );
        Self {
            storefront,
            store,
            auth,
        }
    }

    /// Fresh backend seeded with the starter catalog.
    ///
    /// # Panics
    ///
    /// Panics if the starter catalog fails to parse or seed.
    pub async fn with_catalog() -> Self {
        let ctx = Self::new();
        ctx.storefront
            .catalog()
            .seed_products(&starter_products())
            .await
            .expect("starter catalog should seed");
        ctx
    }

    /// A second session sharing this one's backend, as on another device.
    #[must_use]
    pub fn second_session(&self) -> Storefront {
        Storefront::new(
            StorefrontConfig::offline(),
            Arc::new(self.store.clone()),
            Arc::new(self.auth.clone()),
        )
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the starter catalog.
///
/// # Panics
///
/// Panics if `data/products.yaml` is malformed.
#[must_use]
pub fn starter_products() -> Vec<NewProduct> {
    let file: CatalogFile =
        serde_yaml::from_str(STARTER_CATALOG).expect("starter catalog should parse");
    file.products
}

#[must_use]
pub fn registration(full_name: &str, email: &str, password: &str) -> RegistrationForm {
    RegistrationForm {
        full_name: full_name.to_string(),
        email: email.to_string(),
        password: SecretString::from(password),
        confirm_password: SecretString::from(password),
    }
}

#[must_use]
pub fn shipping() -> ShippingForm {
    ShippingForm {
        name: "Lê Thu Hà".to_string(),
        phone: "+84 903 111 222".to_string(),
        address: "48 Trần Phú, Hội An".to_string(),
        note: String::new(),
    }
}
