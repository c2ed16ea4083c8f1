//! Core types for Artisan Market.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod category;
pub mod contact;
pub mod id;
pub mod price;
pub mod status;

pub use category::{Category, CategoryFilter, UnknownCategory};
pub use contact::{Email, EmailError, PhoneError, PhoneNumber};
pub use id::*;
pub use price::{CurrencyCode, Price};
pub use status::*;
