//! Catalog product.

use artisan_market_core::{Category, CurrencyCode, Price, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backend::{Document, Fields, FieldsExt, Value};
use crate::fields;

/// Name shown for products stored without one.
pub const UNTITLED_PRODUCT: &str = "Untitled product";

/// Highest rating a product can carry.
pub const MAX_RATING: f64 = 5.0;

/// A product as listed in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    pub image_url: String,
    /// Average rating in `0.0..=5.0`.
    pub rating: f64,
    /// Category key. Kept as stored so unknown keys survive a round trip.
    pub category: String,
    /// Units in stock.
    pub quantity: u32,
    pub description: Option<String>,
    pub material: Option<String>,
    pub icon: Option<String>,
}

impl Product {
    /// Decode a product document. Missing or mistyped fields take their
    /// defaults instead of failing.
    #[must_use]
    pub fn from_document(doc: &Document) -> Self {
        Self::from_fields(ProductId::new(doc.id.as_str()), &doc.fields)
    }

    /// Decode an embedded snapshot (wishlist or cart entry). Snapshots carry
    /// their own `id` field; entries without one are unusable.
    #[must_use]
    pub fn from_snapshot(fields: &Fields) -> Option<Self> {
        let id = fields.opt_string("id")?;
        Some(Self::from_fields(ProductId::new(id), fields))
    }

    fn from_fields(id: ProductId, fields: &Fields) -> Self {
        Self {
            id,
            name: fields.str_or("name", UNTITLED_PRODUCT).to_string(),
            price: Price::new(fields.decimal_or_zero("price"), CurrencyCode::default()),
            image_url: fields.str_or("imageUrl", "").to_string(),
            rating: fields.f64_or_zero("rating").clamp(0.0, MAX_RATING),
            category: fields.str_or("category", "").to_string(),
            quantity: fields.u32_or_zero("quantity"),
            description: fields.opt_string("description"),
            material: fields.opt_string("material"),
            icon: fields.opt_string("icon"),
        }
    }

    /// Document fields, without the id.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        let mut fields = fields! {
            "name" => self.name.as_str(),
            "price" => self.price.amount,
            "imageUrl" => self.image_url.as_str(),
            "rating" => self.rating,
            "category" => self.category.as_str(),
            "quantity" => self.quantity,
        };
        for (key, value) in [
            ("description", &self.description),
            ("material", &self.material),
            ("icon", &self.icon),
        ] {
            if let Some(value) = value {
                fields.insert(key.to_string(), Value::from(value.as_str()));
            }
        }
        fields
    }

    /// Embedded copy including the id, as stored in wishlists and carts.
    #[must_use]
    pub fn to_snapshot(&self) -> Fields {
        let mut fields = self.to_fields();
        fields.insert("id".to_string(), Value::from(self.id.as_str()));
        fields
    }

    /// Parsed category, `None` for keys outside the catalog.
    #[must_use]
    pub fn category(&self) -> Option<Category> {
        self.category.parse().ok()
    }

    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.quantity > 0
    }

    /// Case-insensitive substring match over name and description.
    #[must_use]
    pub fn matches_term(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&term)
            || self
                .description
                .as_ref()
                .is_some_and(|d| d.to_lowercase().contains(&term))
    }
}

/// Input for creating a product, as read from seed files or the CLI.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub price: Decimal,
    pub category: Category,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

impl NewProduct {
    /// Check the fields a catalog entry must satisfy.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.price <= Decimal::ZERO {
            return Err(format!("price must be positive, got {}", self.price));
        }
        if !self.rating.is_finite() || !(0.0..=MAX_RATING).contains(&self.rating) {
            return Err(format!("rating must be between 0 and 5, got {}", self.rating));
        }
        Ok(())
    }

    /// Document fields for the new product.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        let product = Product {
            id: ProductId::new(""),
            name: self.name.trim().to_string(),
            price: Price::new(self.price, CurrencyCode::default()),
            image_url: self.image_url.clone(),
            rating: self.rating,
            category: self.category.key().to_string(),
            quantity: self.quantity,
            description: self.description.clone().filter(|d| !d.trim().is_empty()),
            material: self.material.clone().filter(|m| !m.trim().is_empty()),
            icon: self.icon.clone().filter(|i| !i.trim().is_empty()),
        };
        product.to_fields()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn doc(fields: Fields) -> Document {
        Document {
            id: "p1".to_string(),
            fields,
            update_time: None,
        }
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let product = Product::from_document(&doc(Fields::new()));
        assert_eq!(product.id.as_str(), "p1");
        assert_eq!(product.name, UNTITLED_PRODUCT);
        assert_eq!(product.price, Price::zero());
        assert_eq!(product.image_url, "");
        assert!(product.rating.abs() < f64::EPSILON);
        assert_eq!(product.quantity, 0);
        assert!(product.description.is_none());
        assert!(!product.in_stock());
    }

    #[test]
    fn test_mistyped_fields_take_defaults() {
        let product = Product::from_document(&doc(fields! {
            "name" => 42_i64,
            "price" => "250000",
            "rating" => 9.5,
            "quantity" => -3_i64,
        }));
        assert_eq!(product.name, UNTITLED_PRODUCT);
        // Numeric strings are accepted for prices.
        assert_eq!(product.price, Price::vnd(250_000));
        assert!((product.rating - MAX_RATING).abs() < f64::EPSILON);
        assert_eq!(product.quantity, 0);
    }

    #[test]
    fn test_snapshot_round_trip_keeps_id() {
        let product = Product::from_document(&doc(fields! {
            "name" => "Bình gốm Bát Tràng",
            "price" => 450_000_i64,
            "category" => "ceramics",
            "quantity" => 4_i64,
            "material" => "Clay",
        }));
        let restored = Product::from_snapshot(&product.to_snapshot()).unwrap();
        assert_eq!(restored, product);
        assert_eq!(restored.category(), Some(Category::Ceramics));
    }

    #[test]
    fn test_snapshot_without_id_is_skipped() {
        assert!(Product::from_snapshot(&fields! { "name" => "x" }).is_none());
    }

    #[test]
    fn test_matches_term() {
        let mut product = Product::from_document(&doc(fields! { "name" => "Silk Scarf" }));
        product.description = Some("Hand-woven in Hội An".to_string());
        assert!(product.matches_term("scarf"));
        assert!(product.matches_term("WOVEN"));
        assert!(product.matches_term("  "));
        assert!(!product.matches_term("vase"));
    }

    #[test]
    fn test_new_product_from_yaml_and_validation() {
        let yaml = "name: Lacquer Box\nprice: 320000\ncategory: painting\nquantity: 5\n";
        let new: NewProduct = serde_yaml::from_str(yaml).unwrap();
        assert!(new.validate().is_ok());
        assert_eq!(new.to_fields()["category"], Value::from("painting"));
        assert!(!new.to_fields().contains_key("description"));

        let free = NewProduct {
            price: Decimal::ZERO,
            ..new.clone()
        };
        assert!(free.validate().is_err());

        let unrated = NewProduct { rating: 6.0, ..new };
        assert!(unrated.validate().is_err());
    }
}
