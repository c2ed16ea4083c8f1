use std::collections::HashMap;
use std::sync::Arc;

use artisan_market_core::{Email, UserId};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::backend::{AuthFailure, AuthProvider, AuthUser, BackendError};

const MIN_PASSWORD_LENGTH: usize = 6;

/// Identity provider held in process memory.
///
/// Mirrors the hosted provider's rules: unique emails, passwords of at least
/// six characters, opaque tokens that expire and can be refreshed.
#[derive(Clone)]
pub struct MemoryAuth {
    inner: Arc<Mutex<AuthState>>,
}

struct Account {
    email: Option<Email>,
    password: Option<SecretString>,
    display_name: Option<String>,
    disabled: bool,
}

struct AuthState {
    accounts: HashMap<UserId, Account>,
    /// refresh token -> owner
    refresh_tokens: HashMap<String, UserId>,
    /// ID token -> owner
    id_tokens: HashMap<String, UserId>,
    anonymous_enabled: bool,
    token_lifetime: Duration,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(AuthState {
                accounts: HashMap::new(),
                refresh_tokens: HashMap::new(),
                id_tokens: HashMap::new(),
                anonymous_enabled: true,
                token_lifetime: Duration::hours(1),
            })),
        }
    }
}

impl MemoryAuth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle the anonymous sign-in method.
    pub async fn set_anonymous_enabled(&self, enabled: bool) {
        self.inner.lock().await.anonymous_enabled = enabled;
    }

    /// Lifetime of newly issued ID tokens.
    pub async fn set_token_lifetime(&self, lifetime: Duration) {
        self.inner.lock().await.token_lifetime = lifetime;
    }

    /// Disable the account registered under `email`.
    pub async fn disable(&self, email: &Email) {
        let mut state = self.inner.lock().await;
        if let Some(account) = state
            .accounts
            .values_mut()
            .find(|a| a.email.as_ref() == Some(email))
        {
            account.disabled = true;
        }
    }

    /// Number of accounts, anonymous ones included.
    pub async fn account_count(&self) -> usize {
        self.inner.lock().await.accounts.len()
    }
}

impl AuthState {
    fn issue(&mut self, uid: &UserId, is_anonymous: bool) -> AuthUser {
        let id_token = format!("id.{}", Uuid::new_v4().simple());
        let refresh_token = format!("refresh.{}", Uuid::new_v4().simple());
        self.id_tokens.insert(id_token.clone(), uid.clone());
        self.refresh_tokens
            .insert(refresh_token.clone(), uid.clone());

        let account = self.accounts.get(uid);
        AuthUser {
            uid: uid.clone(),
            email: account.and_then(|a| a.email.clone()),
            display_name: account.and_then(|a| a.display_name.clone()),
            is_anonymous,
            id_token: SecretString::from(id_token),
            refresh_token: SecretString::from(refresh_token),
            expires_at: Utc::now() + self.token_lifetime,
        }
    }

    fn find_by_email(&self, email: &Email) -> Option<(&UserId, &Account)> {
        self.accounts
            .iter()
            .find(|(_, a)| a.email.as_ref() == Some(email))
    }

    fn owner_of(&self, id_token: &SecretString) -> Result<UserId, BackendError> {
        self.id_tokens
            .get(id_token.expose_secret())
            .cloned()
            .ok_or(BackendError::Auth(AuthFailure::TokenExpired))
    }
}

fn new_uid() -> UserId {
    UserId::new(Uuid::new_v4().simple().to_string())
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthUser, BackendError> {
        let mut state = self.inner.lock().await;
        let (uid, account) = state
            .find_by_email(email)
            .ok_or(BackendError::Auth(AuthFailure::InvalidCredentials))?;
        let matches = account
            .password
            .as_ref()
            .is_some_and(|p| p.expose_secret() == password.expose_secret());
        if !matches {
            return Err(BackendError::Auth(AuthFailure::InvalidCredentials));
        }
        if account.disabled {
            return Err(BackendError::Auth(AuthFailure::UserDisabled));
        }
        let uid = uid.clone();
        Ok(state.issue(&uid, false))
    }

    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthUser, BackendError> {
        let mut state = self.inner.lock().await;
        if state.find_by_email(email).is_some() {
            return Err(BackendError::Auth(AuthFailure::EmailExists));
        }
        if password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
            return Err(BackendError::Auth(AuthFailure::WeakPassword));
        }

        let uid = new_uid();
        state.accounts.insert(
            uid.clone(),
            Account {
                email: Some(email.clone()),
                password: Some(password.clone()),
                display_name: None,
                disabled: false,
            },
        );
        Ok(state.issue(&uid, false))
    }

    async fn sign_in_anonymously(&self) -> Result<AuthUser, BackendError> {
        let mut state = self.inner.lock().await;
        if !state.anonymous_enabled {
            return Err(BackendError::Auth(AuthFailure::OperationNotAllowed));
        }
        let uid = new_uid();
        state.accounts.insert(
            uid.clone(),
            Account {
                email: None,
                password: None,
                display_name: None,
                disabled: false,
            },
        );
        Ok(state.issue(&uid, true))
    }

    async fn update_display_name(
        &self,
        user: &AuthUser,
        display_name: &str,
    ) -> Result<AuthUser, BackendError> {
        let mut state = self.inner.lock().await;
        let uid = state.owner_of(&user.id_token)?;
        let account = state
            .accounts
            .get_mut(&uid)
            .ok_or(BackendError::Auth(AuthFailure::UserNotFound))?;
        account.display_name = Some(display_name.to_string()).filter(|n| !n.is_empty());
        Ok(AuthUser {
            display_name: account.display_name.clone(),
            ..user.clone()
        })
    }

    async fn refresh(&self, user: &AuthUser) -> Result<AuthUser, BackendError> {
        let mut state = self.inner.lock().await;
        let uid = state
            .refresh_tokens
            .remove(user.refresh_token.expose_secret())
            .ok_or(BackendError::Auth(AuthFailure::TokenExpired))?;
        state.id_tokens.remove(user.id_token.expose_secret());
        if state.accounts.get(&uid).is_some_and(|a| a.disabled) {
            return Err(BackendError::Auth(AuthFailure::UserDisabled));
        }
        Ok(state.issue(&uid, user.is_anonymous))
    }

    async fn sign_out(&self, user: &AuthUser) -> Result<(), BackendError> {
        let mut state = self.inner.lock().await;
        state.id_tokens.remove(user.id_token.expose_secret());
        state.refresh_tokens.remove(user.refresh_token.expose_secret());
        Ok(())
    }
}
