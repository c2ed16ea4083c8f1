//! Storefront services.
//!
//! # Services
//!
//! - `auth` - Email/password and guest sessions
//! - `catalog` - Product listing, search and admin writes
//! - `cart` - Cart state synced to the user's profile
//! - `wishlist` - Favourited products
//! - `checkout` - Order placement and history
//! - `profile` - Profile lookups

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod profile;
pub mod wishlist;

pub use auth::{AuthError, AuthSession, RegistrationForm};
pub use cart::CartStore;
pub use catalog::{CatalogError, CatalogService, ProductWatch};
pub use checkout::{CheckoutError, CheckoutService};
pub use profile::ProfileService;
pub use wishlist::WishlistStore;
