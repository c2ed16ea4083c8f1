//! Authentication session.
//!
//! Email/password and anonymous (guest) sign-in against an
//! [`AuthProvider`]. The current user is published through a
//! `tokio::sync::watch` channel; every change also hands the ID token to the
//! document store so later reads and writes run as that user.

mod error;

pub use error::AuthError;

use std::sync::Arc;

use artisan_market_core::Email;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, watch};
use tracing::{info, instrument, warn};

use crate::backend::{
    AuthFailure, AuthProvider, AuthUser, BackendError, DocPath, DocumentStore, FieldTransform,
    Write,
};
use crate::error::{add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::models::UserProfile;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Tokens this close to expiry are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Pause before retrying a refresh that failed without signing the user out.
const REFRESH_RETRY: std::time::Duration = std::time::Duration::from_secs(5);

/// Registration form as typed by the user.
#[derive(Debug, Clone)]
pub struct RegistrationForm {
    pub full_name: String,
    pub email: String,
    pub password: SecretString,
    pub confirm_password: SecretString,
}

/// The signed-in user, shared by every service of a storefront session.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<AuthSessionInner>,
}

struct AuthSessionInner {
    provider: Arc<dyn AuthProvider>,
    store: Arc<dyn DocumentStore>,
    state: watch::Sender<Option<AuthUser>>,
    /// Serialises token refreshes.
    refresh_lock: Mutex<()>,
}

impl AuthSession {
    #[must_use]
    pub fn new(provider: Arc<dyn AuthProvider>, store: Arc<dyn DocumentStore>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            inner: Arc::new(AuthSessionInner {
                provider,
                store,
                state,
                refresh_lock: Mutex::new(()),
            }),
        }
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// - `AuthError::MissingFields` if either field is blank
    /// - `AuthError::InvalidEmail` if the email is malformed
    /// - `AuthError::Provider` if the provider rejects the credentials
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<AuthUser, AuthError> {
        if email.trim().is_empty() || password.expose_secret().is_empty() {
            return Err(AuthError::MissingFields);
        }
        let email = Email::parse(email)?;

        let user = self
            .inner
            .provider
            .sign_in_with_password(&email, password)
            .await?;
        info!(uid = %user.uid, "Signed in");
        self.publish(Some(user.clone()));
        Ok(user)
    }

    /// Start an anonymous guest session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Provider` if anonymous sign-in is disabled or the
    /// provider is unreachable.
    #[instrument(skip(self))]
    pub async fn sign_in_as_guest(&self) -> Result<AuthUser, AuthError> {
        let user = self.inner.provider.sign_in_anonymously().await?;
        info!(uid = %user.uid, "Signed in as guest");
        self.publish(Some(user.clone()));
        Ok(user)
    }

    /// Create an account, set its display name and write its profile
    /// document.
    ///
    /// The new user stays signed in even when a later step fails.
    ///
    /// # Errors
    ///
    /// - `AuthError::MissingFields` if any field is blank
    /// - `AuthError::PasswordMismatch` if the confirmation differs
    /// - `AuthError::WeakPassword` for passwords under six characters
    /// - `AuthError::InvalidEmail` if the email is malformed
    /// - `AuthError::Provider` if the account cannot be created
    /// - `AuthError::ProfileNotSaved` if the profile document write fails
    #[instrument(skip(self, form), fields(email = %form.email))]
    pub async fn register(&self, form: &RegistrationForm) -> Result<AuthUser, AuthError> {
        let full_name = form.full_name.trim();
        let password = form.password.expose_secret();
        if full_name.is_empty()
            || form.email.trim().is_empty()
            || password.is_empty()
            || form.confirm_password.expose_secret().is_empty()
        {
            return Err(AuthError::MissingFields);
        }
        if password != form.confirm_password.expose_secret() {
            return Err(AuthError::PasswordMismatch);
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword(MIN_PASSWORD_LENGTH));
        }
        let email = Email::parse(&form.email)?;

        let mut user = self.inner.provider.sign_up(&email, &form.password).await?;
        self.publish(Some(user.clone()));

        match self
            .inner
            .provider
            .update_display_name(&user, full_name)
            .await
        {
            Ok(updated) => {
                user = updated;
                self.publish(Some(user.clone()));
            }
            // The profile document carries the name as well.
            Err(e) => warn!(error = %e, uid = %user.uid, "Failed to set display name"),
        }

        let profile = Write::Merge {
            path: DocPath::user(&user.uid),
            fields: UserProfile::registration_fields(full_name, &email),
            transforms: vec![("createdAt".to_string(), FieldTransform::ServerTimestamp)],
        };
        if let Err(e) = self.inner.store.commit(vec![profile]).await {
            return Err(AuthError::ProfileNotSaved(e));
        }

        info!(uid = %user.uid, "Registered");
        Ok(user)
    }

    /// End the session. Signing out while signed out is a no-op.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        let Some(user) = self.current_user() else {
            return;
        };
        if let Err(e) = self.inner.provider.sign_out(&user).await {
            warn!(error = %e, uid = %user.uid, "Provider sign-out failed");
        }
        info!(uid = %user.uid, "Signed out");
        self.publish(None);
    }

    /// Receiver notified on every sign-in, sign-out and token refresh.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        self.inner.state.borrow().clone()
    }

    /// The current ID token, refreshed first when it is about to expire.
    /// `Ok(None)` when nobody is signed in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Provider` if the refresh fails. A rejected refresh
    /// token also signs the user out.
    pub async fn fresh_token(&self) -> Result<Option<SecretString>, AuthError> {
        let _guard = self.inner.refresh_lock.lock().await;
        let Some(user) = self.current_user() else {
            return Ok(None);
        };
        if !user.expires_within(Utc::now(), chrono::Duration::seconds(REFRESH_MARGIN_SECS)) {
            return Ok(Some(user.id_token));
        }

        match self.inner.provider.refresh(&user).await {
            Ok(refreshed) => {
                let token = refreshed.id_token.clone();
                self.publish(Some(refreshed));
                Ok(Some(token))
            }
            Err(BackendError::Auth(AuthFailure::TokenExpired | AuthFailure::UserDisabled)) => {
                warn!(uid = %user.uid, "Refresh token rejected, signing out");
                self.publish(None);
                Err(AuthError::NotSignedIn)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Refresh the ID token shortly before each expiry for as long as the
    /// future runs. The store is re-authorized with every new token.
    pub async fn keep_token_fresh(&self) {
        let mut rx = self.subscribe();
        loop {
            let expires_at = rx.borrow_and_update().as_ref().map(|u| u.expires_at);
            let Some(expires_at) = expires_at else {
                if rx.changed().await.is_err() {
                    return;
                }
                continue;
            };

            let due = expires_at - chrono::Duration::seconds(REFRESH_MARGIN_SECS) - Utc::now();
            tokio::select! {
                () = tokio::time::sleep(due.to_std().unwrap_or_default()) => {
                    if let Err(e) = self.fresh_token().await {
                        warn!(error = %e, "Token refresh failed");
                        tokio::time::sleep(REFRESH_RETRY).await;
                    }
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    fn publish(&self, user: Option<AuthUser>) {
        self.inner
            .store
            .authorize(user.as_ref().map(|u| u.id_token.clone()));
        match &user {
            Some(u) => {
                set_sentry_user(&u.uid, u.email.as_ref().map(Email::as_str));
                add_breadcrumb("auth", "Session changed", Some(&[("uid", u.uid.as_str())]));
            }
            None => {
                clear_sentry_user();
                add_breadcrumb("auth", "Signed out", None);
            }
        }
        self.inner.state.send_replace(user);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{Fields, Value};
    use crate::memory::{MemoryAuth, MemoryStore};

    fn session() -> (AuthSession, MemoryAuth, MemoryStore) {
        let auth = MemoryAuth::new();
        let store = MemoryStore::new();
        let session = AuthSession::new(Arc::new(auth.clone()), Arc::new(store.clone()));
        (session, auth, store)
    }

    fn form(password: &str, confirm: &str) -> RegistrationForm {
        RegistrationForm {
            full_name: "Nguyễn Lan".to_string(),
            email: "lan@example.com".to_string(),
            password: SecretString::from(password),
            confirm_password: SecretString::from(confirm),
        }
    }

    #[tokio::test]
    async fn test_sign_in_requires_both_fields() {
        let (session, _, _) = session();
        let err = session
            .sign_in("", &SecretString::from("secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingFields));

        let err = session
            .sign_in("lan@example.com", &SecretString::from(""))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingFields));
    }

    #[tokio::test]
    async fn test_sign_in_rejects_malformed_email() {
        let (session, _, _) = session();
        let err = session
            .sign_in("not-an-email", &SecretString::from("secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidEmail(_)));
    }

    #[tokio::test]
    async fn test_register_writes_profile_and_signs_in() {
        let (session, _, store) = session();
        let mut rx = session.subscribe();

        let user = session.register(&form("secret1", "secret1")).await.unwrap();
        assert_eq!(user.display_name.as_deref(), Some("Nguyễn Lan"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().uid, user.uid);

        let doc = store.get(&DocPath::user(&user.uid)).await.unwrap().unwrap();
        let fields: &Fields = &doc.fields;
        assert_eq!(fields["fullName"], Value::from("Nguyễn Lan"));
        assert_eq!(fields["email"], Value::from("lan@example.com"));
        assert!(fields["createdAt"].as_timestamp().is_some());
    }

    #[tokio::test]
    async fn test_register_validates_before_calling_provider() {
        let (session, auth, _) = session();
        assert!(matches!(
            session.register(&form("secret1", "secret2")).await,
            Err(AuthError::PasswordMismatch)
        ));
        assert!(matches!(
            session.register(&form("12345", "12345")).await,
            Err(AuthError::WeakPassword(6))
        ));
        assert_eq!(auth.account_count().await, 0);
        assert!(session.current_user().is_none());
    }

    #[tokio::test]
    async fn test_register_keeps_user_when_profile_write_fails() {
        let (session, _, store) = session();
        store.fail_next_writes(1);
        let err = session.register(&form("secret1", "secret1")).await.unwrap_err();
        assert!(matches!(err, AuthError::ProfileNotSaved(_)));
        assert!(session.current_user().is_some());
    }

    #[tokio::test]
    async fn test_sign_out_notifies_subscribers() {
        let (session, _, _) = session();
        session.sign_in_as_guest().await.unwrap();
        let mut rx = session.subscribe();

        session.sign_out().await;
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_none());
        assert!(session.current_user().is_none());
    }

    #[tokio::test]
    async fn test_fresh_token_refreshes_near_expiry() {
        let (session, auth, _) = session();
        auth.set_token_lifetime(chrono::Duration::seconds(30)).await;
        let user = session.sign_in_as_guest().await.unwrap();

        let token = session.fresh_token().await.unwrap().unwrap();
        assert_ne!(token.expose_secret(), user.id_token.expose_secret());

        auth.set_token_lifetime(chrono::Duration::hours(1)).await;
        let refreshed = session.fresh_token().await.unwrap().unwrap();
        // Still within the 30 s lifetime issued above, so refreshed again.
        assert_ne!(refreshed.expose_secret(), token.expose_secret());

        let stable = session.fresh_token().await.unwrap().unwrap();
        assert_eq!(stable.expose_secret(), refreshed.expose_secret());
    }

    #[tokio::test]
    async fn test_fresh_token_without_user() {
        let (session, _, _) = session();
        assert!(session.fresh_token().await.unwrap().is_none());
    }
}
