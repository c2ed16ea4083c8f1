//! Artisan Market storefront library.
//!
//! Client-side business logic for a handcrafted-goods shop backed by a
//! hosted document database and identity provider: catalog browsing, cart,
//! wishlist, checkout and email/password or guest sessions.
//!
//! # Modules
//!
//! - [`backend`] - Store and identity traits plus the document value model
//! - [`firebase`] - REST clients for Firestore and Firebase Auth
//! - [`memory`] - In-process backend for tests and offline tooling
//! - [`services`] - Catalog, cart, wishlist, checkout, auth and profile
//! - [`state`] - [`Storefront`], the per-session bundle of services

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod error;
pub mod firebase;
pub mod memory;
pub mod models;
pub mod services;
pub mod state;
pub mod telemetry;

pub use error::{AppError, Result};
pub use state::Storefront;
