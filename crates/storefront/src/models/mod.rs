//! Domain models for the storefront.
//!
//! Each model decodes leniently from its document: missing or mistyped
//! fields fall back to defaults rather than failing the whole read.

pub mod cart;
pub mod order;
pub mod product;
pub mod profile;

pub use cart::{Cart, CartError, CartItem};
pub use order::{Order, OrderLine, ShippingError, ShippingForm, ShippingInfo};
pub use product::{NewProduct, Product};
pub use profile::UserProfile;
