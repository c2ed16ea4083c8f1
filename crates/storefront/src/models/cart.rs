//! Cart contents.
//!
//! [`Cart`] is the plain state container. Persisting it for a signed-in
//! user is the job of [`CartStore`](crate::services::cart::CartStore).

use artisan_market_core::{Price, ProductId};
use thiserror::Error;

use super::product::Product;
use crate::backend::{BackendError, Fields, FieldsExt, Value};
use crate::fields;

/// Badge text shown once the item count passes this.
const BADGE_LIMIT: u32 = 99;

/// Cart operation errors.
#[derive(Debug, Error)]
pub enum CartError {
    /// The product has no stock at all.
    #[error("{name} is out of stock")]
    OutOfStock { name: String },

    /// Adding would take the cart past the available stock.
    #[error("only {available} of {name} in stock")]
    InsufficientStock { name: String, available: u32 },

    /// Quantities added at once must be at least one.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// Persisting the cart failed; the change was rolled back.
    #[error("cart sync failed: {0}")]
    Backend(#[from] BackendError),
}

/// One cart line: a product snapshot and how many units.
#[derive(Debug, Clone, PartialEq)]
pub struct CartItem {
    pub product: Product,
    /// Always at least 1.
    pub quantity: u32,
}

impl CartItem {
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.quantity)
    }

    fn to_value(&self) -> Value {
        Value::Map(fields! {
            "product" => self.product.to_snapshot(),
            "quantity" => self.quantity,
        })
    }

    fn from_value(value: &Value) -> Option<Self> {
        let fields: &Fields = value.as_map()?;
        let product = Product::from_snapshot(fields.get("product")?.as_map()?)?;
        Some(Self {
            product,
            quantity: fields.u32_or_zero("quantity").max(1),
        })
    }
}

/// Ordered list of cart lines, at most one per product id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.product.id == id)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct lines.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.items.len()
    }

    /// Add one unit. An existing line is incremented, a new product is
    /// appended with quantity 1. No stock check.
    pub fn add(&mut self, product: &Product) {
        match self.items.iter_mut().find(|item| item.product.id == product.id) {
            Some(item) => item.quantity = item.quantity.saturating_add(1),
            None => self.items.push(CartItem {
                product: product.clone(),
                quantity: 1,
            }),
        }
    }

    /// Add `quantity` units after checking them, together with the units
    /// already in the cart, against the product's stock.
    ///
    /// # Errors
    ///
    /// - `CartError::InvalidQuantity` when `quantity` is 0
    /// - `CartError::OutOfStock` when the product has no stock
    /// - `CartError::InsufficientStock` when the total would exceed stock
    pub fn add_quantity(&mut self, product: &Product, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        if !product.in_stock() {
            return Err(CartError::OutOfStock {
                name: product.name.clone(),
            });
        }
        let in_cart = self.get(&product.id).map_or(0, |item| item.quantity);
        if in_cart.saturating_add(quantity) > product.quantity {
            return Err(CartError::InsufficientStock {
                name: product.name.clone(),
                available: product.quantity.saturating_sub(in_cart),
            });
        }

        match self.items.iter_mut().find(|item| item.product.id == product.id) {
            Some(item) => item.quantity += quantity,
            None => self.items.push(CartItem {
                product: product.clone(),
                quantity,
            }),
        }
        Ok(())
    }

    /// Remove one unit, never going below 1. Returns `false` if the product
    /// is not in the cart.
    pub fn decrement(&mut self, id: &ProductId) -> bool {
        let Some(item) = self.items.iter_mut().find(|item| &item.product.id == id) else {
            return false;
        };
        item.quantity = item.quantity.saturating_sub(1).max(1);
        true
    }

    /// Set a line's quantity; 0 removes the line. Returns `false` if the
    /// product is not in the cart.
    pub fn set_quantity(&mut self, id: &ProductId, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove(id);
        }
        let Some(item) = self.items.iter_mut().find(|item| &item.product.id == id) else {
            return false;
        };
        item.quantity = quantity;
        true
    }

    /// Remove a line. Removing an absent id is a no-op returning `false`.
    pub fn remove(&mut self, id: &ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| &item.product.id != id);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Sum of price × quantity over all lines.
    #[must_use]
    pub fn total_price(&self) -> Price {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0_u32, |sum, item| sum.saturating_add(item.quantity))
    }

    /// Text for the cart badge: empty when the cart is empty, `99+` past 99.
    #[must_use]
    pub fn badge_label(&self) -> String {
        match self.item_count() {
            0 => String::new(),
            n if n > BADGE_LIMIT => format!("{BADGE_LIMIT}+"),
            n => n.to_string(),
        }
    }

    /// Encoding stored in `users/{uid}.cart`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Array(self.items.iter().map(CartItem::to_value).collect())
    }

    /// Decode a stored cart. Malformed entries are skipped and duplicate
    /// product ids are folded into one line.
    #[must_use]
    pub fn from_values(values: &[Value]) -> Self {
        let mut cart = Self::new();
        for item in values.iter().filter_map(CartItem::from_value) {
            match cart.items.iter_mut().find(|i| i.product.id == item.product.id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(item.quantity);
                }
                None => cart.items.push(item),
            }
        }
        cart
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::Document;

    fn product(id: &str, price: i64, stock: i64) -> Product {
        Product::from_document(&Document {
            id: id.to_string(),
            fields: fields! { "name" => format!("Item {id}"), "price" => price, "quantity" => stock },
            update_time: None,
        })
    }

    #[test]
    fn test_add_existing_increments_quantity() {
        let mut cart = Cart::new();
        let vase = product("p1", 100_000, 5);
        cart.add(&vase);
        cart.add(&vase);
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.get(&vase.id).unwrap().quantity, 2);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut cart = Cart::new();
        cart.add(&product("p1", 1000, 1));
        let before = cart.clone();
        assert!(!cart.remove(&ProductId::new("missing")));
        assert_eq!(cart, before);
    }

    #[test]
    fn test_add_quantity_checks_stock_including_cart() {
        let mut cart = Cart::new();
        let scarf = product("p1", 50_000, 3);
        cart.add_quantity(&scarf, 2).unwrap();

        let err = cart.add_quantity(&scarf, 2).unwrap_err();
        assert!(matches!(err, CartError::InsufficientStock { available: 1, .. }));
        assert_eq!(cart.item_count(), 2);

        cart.add_quantity(&scarf, 1).unwrap();
        assert_eq!(cart.item_count(), 3);
    }

    #[test]
    fn test_add_quantity_out_of_stock() {
        let mut cart = Cart::new();
        let err = cart.add_quantity(&product("p1", 1000, 0), 1).unwrap_err();
        assert!(matches!(err, CartError::OutOfStock { .. }));
        assert!(matches!(
            cart.add_quantity(&product("p2", 1000, 4), 0),
            Err(CartError::InvalidQuantity)
        ));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_decrement_floors_at_one() {
        let mut cart = Cart::new();
        let bowl = product("p1", 1000, 9);
        cart.add(&bowl);
        assert!(cart.decrement(&bowl.id));
        assert_eq!(cart.get(&bowl.id).unwrap().quantity, 1);
        assert!(!cart.decrement(&ProductId::new("nope")));
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut cart = Cart::new();
        let bowl = product("p1", 1000, 9);
        cart.add(&bowl);
        assert!(cart.set_quantity(&bowl.id, 4));
        assert_eq!(cart.item_count(), 4);
        assert!(cart.set_quantity(&bowl.id, 0));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_total_and_badge() {
        let mut cart = Cart::new();
        assert_eq!(cart.badge_label(), "");
        cart.add_quantity(&product("p1", 120_000, 200), 2).unwrap();
        cart.add(&product("p2", 35_000, 1));
        assert_eq!(cart.total_price(), Price::vnd(275_000));
        assert_eq!(cart.badge_label(), "3");

        cart.set_quantity(&ProductId::new("p1"), 150);
        assert_eq!(cart.badge_label(), "99+");
    }

    #[test]
    fn test_stored_encoding_round_trip() {
        let mut cart = Cart::new();
        cart.add_quantity(&product("p1", 120_000, 10), 3).unwrap();
        cart.add(&product("p2", 35_000, 1));

        let Value::Array(values) = cart.to_value() else {
            panic!("cart encodes as an array");
        };
        assert_eq!(Cart::from_values(&values), cart);
    }

    #[test]
    fn test_from_values_skips_junk_and_folds_duplicates() {
        let line = |id: &str, qty: i64| {
            Value::Map(fields! {
                "product" => fields! { "id" => id, "name" => "Mat" },
                "quantity" => qty,
            })
        };
        let values = vec![line("p1", 1), Value::from("junk"), line("p1", 2), line("p2", 0)];
        let cart = Cart::from_values(&values);
        assert_eq!(cart.len(), 2);
        assert_eq!(cart.get(&ProductId::new("p1")).unwrap().quantity, 3);
        // Stored zero quantities are clamped to one.
        assert_eq!(cart.get(&ProductId::new("p2")).unwrap().quantity, 1);
    }
}
