//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type over every service error. Callers that
//! surface errors to a person show [`AppError::user_message`] and call
//! [`AppError::report`], which captures backend-side failures to Sentry.

use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::models::{CartError, ShippingError};
use crate::services::auth::AuthError;
use crate::services::catalog::CatalogError;
use crate::services::checkout::CheckoutError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Document store or identity provider failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AppError {
    /// Whether the failure lies with the backend or the deployment rather
    /// than with what the user entered.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        match self {
            Self::Backend(err)
            | Self::Catalog(CatalogError::Backend(err))
            | Self::Cart(CartError::Backend(err))
            | Self::Checkout(CheckoutError::Backend(err)) => !err.is_client_error(),
            Self::Auth(err) => err.is_server_error(),
            Self::Config(_) => true,
            _ => false,
        }
    }

    /// Message suitable for an alert shown to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(err) => err.user_message(),
            Self::Cart(CartError::OutOfStock { .. }) => "This product is out of stock.".to_string(),
            Self::Cart(CartError::InsufficientStock { available, .. }) => {
                format!("Only {available} left in stock.")
            }
            Self::Cart(CartError::InvalidQuantity) => "Please choose at least one.".to_string(),
            Self::Checkout(CheckoutError::EmptyCart) => "Your cart is empty.".to_string(),
            Self::Checkout(CheckoutError::Shipping(ShippingError::MissingField(_))) => {
                "Please fill in your name, phone number and address.".to_string()
            }
            Self::Checkout(CheckoutError::Shipping(ShippingError::Phone(_))) => {
                "Invalid phone number.".to_string()
            }
            Self::Catalog(CatalogError::Invalid(reason)) => format!("Invalid product: {reason}."),
            Self::Catalog(CatalogError::NotFound(_)) | Self::Checkout(CheckoutError::NotFound(_)) => {
                "This item is no longer available.".to_string()
            }
            Self::Backend(BackendError::RateLimited(_)) => {
                "Too many requests. Please try again later.".to_string()
            }
            Self::Backend(BackendError::PermissionDenied(_) | BackendError::Unauthenticated) => {
                "Please sign in to continue.".to_string()
            }
            Self::Cart(CartError::Backend(_)) => {
                "Could not save your cart. Please try again.".to_string()
            }
            Self::Checkout(CheckoutError::Backend(_)) => {
                "Could not place your order. Please try again.".to_string()
            }
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }

    /// Log the error and, for server-side failures, capture it to Sentry.
    pub fn report(&self) {
        if self.is_server_error() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Storefront error"
            );
        } else {
            tracing::debug!(error = %self, "Rejected user action");
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("product_id", "p-123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
