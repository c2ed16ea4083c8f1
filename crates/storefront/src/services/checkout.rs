//! Order placement and order history.

use std::cmp::Reverse;
use std::sync::Arc;

use artisan_market_core::{OrderId, PaymentMethod, UserId};
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::cart::CartStore;
use crate::backend::{
    AuthUser, BackendError, DocPath, DocumentStore, FieldTransform, Filter, Write, collections,
    new_document_id,
};
use crate::error::add_breadcrumb;
use crate::models::{Order, ShippingError, ShippingForm};

/// Checkout errors.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error(transparent)]
    Shipping(#[from] ShippingError),

    #[error("order not found: {0}")]
    NotFound(OrderId),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn DocumentStore>,
}

impl CheckoutService {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Place an order for the cart's contents and clear the cart.
    ///
    /// The returned order has no `created_at`; the stored document gets the
    /// server's commit time.
    ///
    /// # Errors
    ///
    /// - `CheckoutError::EmptyCart` if the cart has no lines
    /// - `CheckoutError::Shipping` if the shipping form is invalid
    /// - `CheckoutError::Backend` if the order cannot be written; the cart is
    ///   kept
    #[instrument(skip(self, cart, shipping, user), fields(uid))]
    pub async fn place_order(
        &self,
        cart: &CartStore,
        shipping: &ShippingForm,
        payment_method: PaymentMethod,
        user: Option<&AuthUser>,
    ) -> Result<Order, CheckoutError> {
        let contents = cart.snapshot().await;
        if contents.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let customer = shipping.validate()?;

        let user_id = user.map(|u| u.uid.clone());
        if let Some(uid) = &user_id {
            tracing::Span::current().record("uid", uid.as_str());
        }

        let id = OrderId::new(new_document_id());
        let order = Order::from_cart(id, &contents, customer, payment_method, user_id);
        self.store
            .commit(vec![Write::Set {
                path: DocPath::new(collections::ORDERS, order.id.as_str()),
                fields: order.to_fields(),
                transforms: vec![("createdAt".to_string(), FieldTransform::ServerTimestamp)],
            }])
            .await?;

        info!(
            order_id = %order.id,
            total = %order.total,
            lines = order.items.len(),
            "Order placed"
        );
        add_breadcrumb("checkout", "Order placed", Some(&[("order_id", order.id.as_str())]));

        if let Err(e) = cart.clear().await {
            warn!(error = %e, order_id = %order.id, "Order placed but cart not cleared");
        }
        Ok(order)
    }

    /// Orders placed by `uid`, newest first. Undecodable documents are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Backend` if the query fails.
    #[instrument(skip(self), fields(uid = %uid))]
    pub async fn orders_for(&self, uid: &UserId) -> Result<Vec<Order>, CheckoutError> {
        let docs = self
            .store
            .query(collections::ORDERS, &Filter::equal("userId", uid.as_str()))
            .await?;

        let mut orders: Vec<Order> = docs.iter().filter_map(Order::from_document).collect();
        if orders.len() < docs.len() {
            warn!(skipped = docs.len() - orders.len(), "Skipped malformed orders");
        }
        orders.sort_by_key(|o| Reverse(o.created_at));
        Ok(orders)
    }

    /// # Errors
    ///
    /// Returns `CheckoutError::NotFound` if the order does not exist or
    /// cannot be decoded.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn order(&self, id: &OrderId) -> Result<Order, CheckoutError> {
        self.store
            .get(&DocPath::new(collections::ORDERS, id.as_str()))
            .await?
            .and_then(|doc| Order::from_document(&doc))
            .ok_or_else(|| CheckoutError::NotFound(id.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use artisan_market_core::{OrderStatus, Price};
    use chrono::{Duration, Utc};

    use super::*;
    use crate::backend::{AuthProvider, Document, Value};
    use crate::fields;
    use crate::memory::{MemoryAuth, MemoryStore};
    use crate::models::Product;

    fn product(id: &str, price: i64) -> Product {
        Product::from_document(&Document {
            id: id.to_string(),
            fields: fields! { "name" => format!("Item {id}"), "price" => price, "quantity" => 10_i64 },
            update_time: None,
        })
    }

    fn shipping() -> ShippingForm {
        ShippingForm {
            name: "Trần Minh".to_string(),
            phone: "0987-654-321".to_string(),
            address: "5 Lê Lợi, Huế".to_string(),
            note: "Call first".to_string(),
        }
    }

    fn setup() -> (CheckoutService, CartStore, MemoryStore) {
        let store = MemoryStore::new();
        let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
        (
            CheckoutService::new(Arc::clone(&shared)),
            CartStore::new(shared),
            store,
        )
    }

    #[tokio::test]
    async fn test_place_order_writes_and_clears_cart() {
        let (checkout, cart, store) = setup();
        let user = MemoryAuth::new().sign_in_anonymously().await.unwrap();
        cart.add_quantity(&product("p1", 120_000), 2).await.unwrap();
        cart.add(&product("p2", 30_000)).await.unwrap();

        let order = checkout
            .place_order(&cart, &shipping(), PaymentMethod::CashOnDelivery, Some(&user))
            .await
            .unwrap();
        assert_eq!(order.total, Price::vnd(270_000));
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(cart.snapshot().await.is_empty());

        let saved = checkout.order(&order.id).await.unwrap();
        assert_eq!(saved.items.len(), 2);
        assert_eq!(saved.user_id, Some(user.uid.clone()));
        assert!(saved.created_at.is_some());
        assert_eq!(store.len("orders").await, 1);
    }

    #[tokio::test]
    async fn test_empty_cart_is_rejected() {
        let (checkout, cart, store) = setup();
        let err = checkout
            .place_order(&cart, &shipping(), PaymentMethod::CashOnDelivery, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::EmptyCart));
        assert_eq!(store.len("orders").await, 0);
    }

    #[tokio::test]
    async fn test_invalid_shipping_is_rejected() {
        let (checkout, cart, _) = setup();
        cart.add(&product("p1", 1_000)).await.unwrap();
        let form = ShippingForm {
            phone: "abc".to_string(),
            ..shipping()
        };
        let err = checkout
            .place_order(&cart, &form, PaymentMethod::CashOnDelivery, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Shipping(ShippingError::Phone(_))));
        assert_eq!(cart.item_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cart() {
        let (checkout, cart, store) = setup();
        cart.add(&product("p1", 1_000)).await.unwrap();
        store.fail_next_writes(1);
        let err = checkout
            .place_order(&cart, &shipping(), PaymentMethod::BankTransfer, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Backend(_)));
        assert_eq!(cart.item_count().await, 1);
    }

    #[tokio::test]
    async fn test_orders_for_sorts_newest_first() {
        let (checkout, _, store) = setup();
        let now = Utc::now();
        for (id, age) in [("old", 3), ("new", 1), ("mid", 2)] {
            store
                .insert(
                    "orders",
                    id,
                    fields! {
                        "userId" => "u1",
                        "customer" => fields! { "name" => "A", "phone" => "0912345678", "address" => "B" },
                        "createdAt" => Value::Timestamp(now - Duration::days(age)),
                    },
                )
                .await;
        }
        store
            .insert("orders", "other", fields! { "userId" => "u2" })
            .await;

        let orders = checkout.orders_for(&UserId::new("u1")).await.unwrap();
        let ids: Vec<_> = orders.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_missing_order() {
        let (checkout, _, _) = setup();
        let err = checkout.order(&OrderId::new("nope")).await.unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound(_)));
    }
}
