//! Boundary to the backend-as-a-service.
//!
//! The storefront talks to exactly two remote collaborators:
//!
//! - a document database ([`DocumentStore`]) holding the `products`, `users`
//!   and `orders` collections
//! - an identity provider ([`AuthProvider`]) for email/password and
//!   anonymous sessions
//!
//! Both are traits so services can run against the Firebase REST clients in
//! [`crate::firebase`] or the in-memory backend in [`crate::memory`].

mod error;
mod value;

pub use error::{AuthFailure, BackendError};
pub use value::{Fields, FieldsExt, Value};

use std::fmt;

use artisan_market_core::{Email, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;

/// Collection names.
pub mod collections {
    pub const PRODUCTS: &str = "products";
    pub const USERS: &str = "users";
    pub const ORDERS: &str = "orders";
}

/// Address of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    pub collection: String,
    pub id: String,
}

impl DocPath {
    #[must_use]
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// `users/{uid}`.
    #[must_use]
    pub fn user(uid: &UserId) -> Self {
        Self::new(collections::USERS, uid.as_str())
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
    pub update_time: Option<DateTime<Utc>>,
}

/// Server-side transform applied to one field as part of a write.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTransform {
    /// Append each element not already present.
    ArrayUnion(Vec<Value>),
    /// Remove every element equal to one of the given values.
    ArrayRemove(Vec<Value>),
    /// Set the field to the server's commit time.
    ServerTimestamp,
}

/// One write in an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Replace the whole document, creating it if absent.
    Set {
        path: DocPath,
        fields: Fields,
        transforms: Vec<(String, FieldTransform)>,
    },
    /// Overwrite only the listed fields, creating the document if absent.
    Merge {
        path: DocPath,
        fields: Fields,
        transforms: Vec<(String, FieldTransform)>,
    },
    /// Overwrite only the listed fields of an existing document.
    Update {
        path: DocPath,
        fields: Fields,
        transforms: Vec<(String, FieldTransform)>,
    },
    Delete {
        path: DocPath,
    },
}

impl Write {
    /// Plain replace with no transforms.
    #[must_use]
    pub const fn set(path: DocPath, fields: Fields) -> Self {
        Self::Set {
            path,
            fields,
            transforms: Vec::new(),
        }
    }

    #[must_use]
    pub const fn path(&self) -> &DocPath {
        match self {
            Self::Set { path, .. }
            | Self::Merge { path, .. }
            | Self::Update { path, .. }
            | Self::Delete { path } => path,
        }
    }
}

/// Query filter. Only equality on a top-level field is supported.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Equal(String, Value),
}

impl Filter {
    #[must_use]
    pub fn equal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equal(field.into(), value.into())
    }

    /// Evaluate the filter against a field map.
    #[must_use]
    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Self::Equal(field, expected) => fields.get(field).is_some_and(|v| v.matches(expected)),
        }
    }
}

/// Generate a 20-character document key in the style of auto-generated ids.
#[must_use]
pub fn new_document_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(20);
    id
}

/// Remote document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document. A missing document is `Ok(None)`.
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, BackendError>;

    /// Every document of a collection.
    async fn list(&self, collection: &str) -> Result<Vec<Document>, BackendError>;

    /// Documents of a collection passing `filter`.
    async fn query(&self, collection: &str, filter: &Filter)
    -> Result<Vec<Document>, BackendError>;

    /// Create a document with a generated key.
    async fn create(&self, collection: &str, fields: Fields) -> Result<Document, BackendError>;

    /// Apply writes atomically: all succeed or none do.
    async fn commit(&self, writes: Vec<Write>) -> Result<(), BackendError>;

    /// Attach (or drop) the signed-in user's ID token for later requests.
    fn authorize(&self, _id_token: Option<SecretString>) {}

    async fn set(&self, path: DocPath, fields: Fields) -> Result<(), BackendError> {
        self.commit(vec![Write::set(path, fields)]).await
    }

    async fn merge(
        &self,
        path: DocPath,
        fields: Fields,
        transforms: Vec<(String, FieldTransform)>,
    ) -> Result<(), BackendError> {
        self.commit(vec![Write::Merge {
            path,
            fields,
            transforms,
        }])
        .await
    }

    /// Overwrite the listed fields of a document that must already exist.
    async fn update(&self, path: DocPath, fields: Fields) -> Result<(), BackendError> {
        self.commit(vec![Write::Update {
            path,
            fields,
            transforms: Vec::new(),
        }])
        .await
    }
}

/// A signed-in session as issued by the identity provider.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: UserId,
    pub email: Option<Email>,
    pub display_name: Option<String>,
    pub is_anonymous: bool,
    pub id_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl AuthUser {
    /// Whether the ID token expires within `margin` of `now`.
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        self.expires_at - now <= margin
    }
}

/// Identity provider.
///
/// Sign-out is purely local for token-based providers, so implementations
/// only need to override [`AuthProvider::sign_out`] when they track sessions.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthUser, BackendError>;

    async fn sign_up(&self, email: &Email, password: &SecretString)
    -> Result<AuthUser, BackendError>;

    async fn sign_in_anonymously(&self) -> Result<AuthUser, BackendError>;

    async fn update_display_name(
        &self,
        user: &AuthUser,
        display_name: &str,
    ) -> Result<AuthUser, BackendError>;

    /// Exchange the refresh token for a new ID token.
    async fn refresh(&self, user: &AuthUser) -> Result<AuthUser, BackendError>;

    async fn sign_out(&self, _user: &AuthUser) -> Result<(), BackendError> {
        Ok(())
    }
}
