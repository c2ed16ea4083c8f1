//! Profile lookups for the account screen.

use std::sync::Arc;

use artisan_market_core::UserId;
use tracing::{instrument, warn};

use crate::backend::{AuthUser, BackendError, DocPath, DocumentStore};
use crate::models::UserProfile;

/// Name shown when nobody is signed in or no name is known.
pub const GUEST_NAME: &str = "Guest";

#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn DocumentStore>,
}

impl ProfileService {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// The stored profile, or `None` if the user has no profile document.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the read fails.
    #[instrument(skip(self), fields(uid = %uid))]
    pub async fn profile(&self, uid: &UserId) -> Result<Option<UserProfile>, BackendError> {
        Ok(self
            .store
            .get(&DocPath::user(uid))
            .await?
            .map(|doc| UserProfile::from_document(&doc)))
    }

    /// Name to greet the user with: the profile's full name, then the
    /// account display name, then [`GUEST_NAME`]. A failed profile read
    /// falls through to the display name.
    pub async fn display_name(&self, user: Option<&AuthUser>) -> String {
        let Some(user) = user else {
            return GUEST_NAME.to_string();
        };

        let full_name = match self.profile(&user.uid).await {
            Ok(profile) => profile.and_then(|p| p.full_name),
            Err(e) => {
                warn!(error = %e, uid = %user.uid, "Profile read failed");
                None
            }
        };

        full_name
            .or_else(|| user.display_name.clone())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| GUEST_NAME.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::AuthProvider;
    use crate::fields;
    use crate::memory::{MemoryAuth, MemoryStore};

    #[tokio::test]
    async fn test_display_name_fallbacks() {
        let store = MemoryStore::new();
        let auth = MemoryAuth::new();
        let profiles = ProfileService::new(Arc::new(store.clone()));

        assert_eq!(profiles.display_name(None).await, "Guest");

        let guest = auth.sign_in_anonymously().await.unwrap();
        assert_eq!(profiles.display_name(Some(&guest)).await, "Guest");

        let named = auth.update_display_name(&guest, "Mai").await.unwrap();
        assert_eq!(profiles.display_name(Some(&named)).await, "Mai");

        store
            .insert("users", named.uid.as_str(), fields! { "fullName" => "Phạm Thu Mai" })
            .await;
        assert_eq!(profiles.display_name(Some(&named)).await, "Phạm Thu Mai");
    }
}
