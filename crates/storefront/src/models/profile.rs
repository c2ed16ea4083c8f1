//! The `users/{uid}` profile document.

use artisan_market_core::{Email, UserId};
use chrono::{DateTime, Utc};

use super::cart::Cart;
use super::product::Product;
use crate::backend::{Document, Fields, FieldsExt, Value};
use crate::fields;

/// Profile fields written at registration and read back for display.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub uid: UserId,
    pub full_name: Option<String>,
    pub email: Option<Email>,
    pub created_at: Option<DateTime<Utc>>,
    pub wishlist: Vec<Product>,
    pub cart: Cart,
}

impl UserProfile {
    #[must_use]
    pub fn from_document(doc: &Document) -> Self {
        let fields = &doc.fields;
        Self {
            uid: UserId::new(doc.id.as_str()),
            full_name: fields.opt_string("fullName"),
            email: fields
                .opt_string("email")
                .and_then(|e| Email::parse(&e).ok()),
            created_at: fields.timestamp("createdAt"),
            wishlist: wishlist_from(fields),
            cart: Cart::from_values(fields.array("cart")),
        }
    }

    /// Fields written when an account is registered. The wishlist starts
    /// empty; `createdAt` comes from a server timestamp transform.
    #[must_use]
    pub fn registration_fields(full_name: &str, email: &Email) -> Fields {
        fields! {
            "fullName" => full_name,
            "email" => email.as_str(),
            "wishlist" => Value::Array(Vec::new()),
        }
    }
}

/// Decode a stored wishlist array, skipping entries without an id.
pub(crate) fn wishlist_from(fields: &Fields) -> Vec<Product> {
    fields
        .array("wishlist")
        .iter()
        .filter_map(Value::as_map)
        .filter_map(Product::from_snapshot)
        .collect()
}
