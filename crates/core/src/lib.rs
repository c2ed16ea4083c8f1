//! Artisan Market Core - Shared domain types.
//!
//! This crate provides the types shared by every Artisan Market component:
//! - `storefront` - Catalog, cart, wishlist, checkout and auth services
//! - `cli` - Operator tooling (catalog seeding, order lookup)
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no backend
//! access. Values are validated on construction so the services can rely on
//! them.
//!
//! # Modules
//!
//! - [`types`] - Document IDs, prices, contact fields, categories and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
