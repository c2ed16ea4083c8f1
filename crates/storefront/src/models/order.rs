//! Orders and shipping details.

use artisan_market_core::{
    CurrencyCode, OrderId, OrderStatus, PaymentMethod, PhoneError, PhoneNumber, Price, ProductId,
    UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::cart::{Cart, CartItem};
use super::product::UNTITLED_PRODUCT;
use crate::backend::{Document, Fields, FieldsExt, Value};
use crate::fields;

/// Shipping form rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShippingError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("invalid phone number: {0}")]
    Phone(#[from] PhoneError),
}

/// Shipping details as typed by the customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ShippingForm {
    pub name: String,
    pub phone: String,
    pub address: String,
    #[serde(default)]
    pub note: String,
}

impl ShippingForm {
    /// Validate the form.
    ///
    /// # Errors
    ///
    /// `ShippingError::MissingField` for a blank name, phone or address,
    /// `ShippingError::Phone` for a phone that is not 9 to 11 digits.
    pub fn validate(&self) -> Result<ShippingInfo, ShippingError> {
        let name = required(&self.name, "name")?;
        let phone = required(&self.phone, "phone")?;
        let address = required(&self.address, "address")?;
        let note = self.note.trim();

        Ok(ShippingInfo {
            name: name.to_string(),
            phone: PhoneNumber::parse(phone)?,
            address: address.to_string(),
            note: (!note.is_empty()).then(|| note.to_string()),
        })
    }
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, ShippingError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ShippingError::MissingField(field));
    }
    Ok(trimmed)
}

/// Validated shipping details, stored as the order's `customer` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShippingInfo {
    pub name: String,
    pub phone: PhoneNumber,
    pub address: String,
    pub note: Option<String>,
}

impl ShippingInfo {
    fn to_fields(&self) -> Fields {
        fields! {
            "name" => self.name.as_str(),
            "phone" => self.phone.as_str(),
            "address" => self.address.as_str(),
            "note" => self.note.as_deref().unwrap_or(""),
        }
    }

    /// `None` when the stored phone no longer validates.
    fn from_fields(fields: &Fields) -> Option<Self> {
        let phone = fields.opt_string("phone")?;
        Some(Self {
            name: fields.str_or("name", "").to_string(),
            phone: PhoneNumber::parse(&phone).ok()?,
            address: fields.str_or("address", "").to_string(),
            note: fields.opt_string("note"),
        })
    }
}

/// One order line, frozen at checkout time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub name: String,
    pub price: Price,
    pub quantity: u32,
}

impl OrderLine {
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price.times(self.quantity)
    }

    fn to_value(&self) -> Value {
        Value::Map(fields! {
            "productId" => self.product_id.as_str(),
            "name" => self.name.as_str(),
            "price" => self.price.amount,
            "quantity" => self.quantity,
            "lineTotal" => self.line_total().amount,
        })
    }

    fn from_value(value: &Value) -> Option<Self> {
        let fields = value.as_map()?;
        Some(Self {
            product_id: ProductId::new(fields.opt_string("productId")?),
            name: fields.str_or("name", UNTITLED_PRODUCT).to_string(),
            price: Price::new(fields.decimal_or_zero("price"), CurrencyCode::default()),
            quantity: fields.u32_or_zero("quantity").max(1),
        })
    }
}

impl From<&CartItem> for OrderLine {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product.id.clone(),
            name: item.product.name.clone(),
            price: item.product.price,
            quantity: item.quantity,
        }
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: OrderId,
    /// Absent for orders placed without an account.
    pub user_id: Option<UserId>,
    pub customer: ShippingInfo,
    pub items: Vec<OrderLine>,
    pub total: Price,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Build a pending order from the cart contents.
    #[must_use]
    pub fn from_cart(
        id: OrderId,
        cart: &Cart,
        customer: ShippingInfo,
        payment_method: PaymentMethod,
        user_id: Option<UserId>,
    ) -> Self {
        Self {
            id,
            user_id,
            customer,
            items: cart.items().iter().map(OrderLine::from).collect(),
            total: cart.total_price(),
            payment_method,
            status: OrderStatus::Pending,
            created_at: None,
        }
    }

    /// Document fields. `createdAt` is left to a server timestamp transform.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        let mut fields = fields! {
            "customer" => self.customer.to_fields(),
            "items" => self.items.iter().map(OrderLine::to_value).collect::<Vec<_>>(),
            "total" => self.total.amount,
            "paymentMethod" => self.payment_method.as_str(),
            "status" => self.status.as_str(),
        };
        if let Some(uid) = &self.user_id {
            fields.insert("userId".to_string(), Value::from(uid.as_str()));
        }
        fields
    }

    /// Decode an order document. Returns `None` when the customer map is
    /// unusable; other fields fall back to defaults.
    #[must_use]
    pub fn from_document(doc: &Document) -> Option<Self> {
        let fields = &doc.fields;
        let customer = ShippingInfo::from_fields(fields.get("customer")?.as_map()?)?;
        Some(Self {
            id: OrderId::new(doc.id.as_str()),
            user_id: fields.opt_string("userId").map(UserId::new),
            customer,
            items: fields
                .array("items")
                .iter()
                .filter_map(OrderLine::from_value)
                .collect(),
            total: Price::new(fields.decimal_or_zero("total"), CurrencyCode::default()),
            payment_method: fields
                .get("paymentMethod")
                .and_then(Value::as_str)
                .and_then(|m| m.parse().ok())
                .unwrap_or_default(),
            status: fields
                .get("status")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            created_at: fields.timestamp("createdAt"),
        })
    }
}
