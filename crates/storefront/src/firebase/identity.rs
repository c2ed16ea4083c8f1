//! Firebase Authentication over the Identity Toolkit and Secure Token REST APIs.

use std::sync::Arc;

use artisan_market_core::{Email, UserId};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::backend::{AuthFailure, AuthProvider, AuthUser, BackendError};
use crate::config::FirebaseConfig;

const IDENTITY_HOST: &str = "https://identitytoolkit.googleapis.com";
const SECURE_TOKEN_HOST: &str = "https://securetoken.googleapis.com";

/// Identity provider client.
#[derive(Clone)]
pub struct IdentityClient {
    inner: Arc<IdentityClientInner>,
}

struct IdentityClientInner {
    client: reqwest::Client,
    /// `{host}/v1/accounts`
    accounts_url: String,
    /// `{host}/v1/token`
    token_url: String,
    api_key: SecretString,
}

/// Response of `signInWithPassword`, `signUp` and `update`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<String>,
}

/// Response of the secure token endpoint (snake case, unlike the rest).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl IdentityClient {
    /// Create a client, targeting the auth emulator when configured.
    #[must_use]
    pub fn new(config: &FirebaseConfig, client: reqwest::Client) -> Self {
        let (identity, secure_token) = config.auth_emulator_host.as_ref().map_or_else(
            || (IDENTITY_HOST.to_string(), SECURE_TOKEN_HOST.to_string()),
            |host| {
                (
                    format!("http://{host}/identitytoolkit.googleapis.com"),
                    format!("http://{host}/securetoken.googleapis.com"),
                )
            },
        );

        Self {
            inner: Arc::new(IdentityClientInner {
                client,
                accounts_url: format!("{identity}/v1/accounts"),
                token_url: format!("{secure_token}/v1/token"),
                api_key: config.api_key.clone(),
            }),
        }
    }

    async fn call_accounts(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<AccountResponse, BackendError> {
        let url = format!("{}:{method}", self.inner.accounts_url);
        let response = self
            .inner
            .client
            .post(url)
            .query(&[("key", self.inner.api_key.expose_secret())])
            .json(&body)
            .send()
            .await?;
        parse_response(response).await
    }

    async fn call_token(&self, refresh_token: &SecretString) -> Result<TokenResponse, BackendError> {
        let response = self
            .inner
            .client
            .post(&self.inner.token_url)
            .query(&[("key", self.inner.api_key.expose_secret())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
            ])
            .send()
            .await?;
        parse_response(response).await
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, BackendError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(BackendError::RateLimited(1));
    }

    let body = response.text().await?;
    if status.is_success() {
        return serde_json::from_str(&body).map_err(BackendError::Parse);
    }

    // Credential failures are routine; only log the code.
    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => {
            let failure = AuthFailure::from_code(&envelope.error.message);
            debug!(status = %status, code = %failure, "Identity provider rejected request");
            Err(BackendError::Auth(failure))
        }
        Err(_) => {
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Identity provider returned non-success status"
            );
            Err(BackendError::Status {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            })
        }
    }
}

fn expires_in(seconds: Option<&str>) -> Duration {
    let secs = seconds.and_then(|s| s.parse::<i64>().ok()).unwrap_or(3600);
    Duration::seconds(secs)
}

/// Build a session from an account response. Token fields missing from the
/// response (profile updates may omit them) are taken from `previous`.
fn session_from(
    response: AccountResponse,
    is_anonymous: bool,
    previous: Option<&AuthUser>,
) -> Result<AuthUser, BackendError> {
    let id_token = response
        .id_token
        .map(SecretString::from)
        .or_else(|| previous.map(|p| p.id_token.clone()))
        .ok_or_else(|| BackendError::Decode("response carries no idToken".to_string()))?;
    let refresh_token = response
        .refresh_token
        .map(SecretString::from)
        .or_else(|| previous.map(|p| p.refresh_token.clone()))
        .ok_or_else(|| BackendError::Decode("response carries no refreshToken".to_string()))?;
    let expires_at = match (response.expires_in.as_deref(), previous) {
        (None, Some(p)) => p.expires_at,
        (seconds, _) => Utc::now() + expires_in(seconds),
    };

    Ok(AuthUser {
        uid: UserId::new(response.local_id),
        email: response
            .email
            .as_deref()
            .filter(|e| !e.is_empty())
            .and_then(|e| Email::parse(e).ok()),
        display_name: response.display_name.filter(|n| !n.is_empty()),
        is_anonymous,
        id_token,
        refresh_token,
        expires_at,
    })
}

#[async_trait]
impl AuthProvider for IdentityClient {
    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthUser, BackendError> {
        let body = json!({
            "email": email.as_str(),
            "password": password.expose_secret(),
            "returnSecureToken": true,
        });
        let response = self.call_accounts("signInWithPassword", body).await?;
        session_from(response, false, None)
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthUser, BackendError> {
        let body = json!({
            "email": email.as_str(),
            "password": password.expose_secret(),
            "returnSecureToken": true,
        });
        let response = self.call_accounts("signUp", body).await?;
        session_from(response, false, None)
    }

    #[instrument(skip(self))]
    async fn sign_in_anonymously(&self) -> Result<AuthUser, BackendError> {
        let response = self
            .call_accounts("signUp", json!({ "returnSecureToken": true }))
            .await?;
        session_from(response, true, None)
    }

    #[instrument(skip(self, user), fields(uid = %user.uid))]
    async fn update_display_name(
        &self,
        user: &AuthUser,
        display_name: &str,
    ) -> Result<AuthUser, BackendError> {
        let body = json!({
            "idToken": user.id_token.expose_secret(),
            "displayName": display_name,
            "returnSecureToken": true,
        });
        let response = self.call_accounts("update", body).await?;
        session_from(response, user.is_anonymous, Some(user))
    }

    #[instrument(skip(self, user), fields(uid = %user.uid))]
    async fn refresh(&self, user: &AuthUser) -> Result<AuthUser, BackendError> {
        let response = self.call_token(&user.refresh_token).await?;
        if response.user_id != user.uid.as_str() {
            return Err(BackendError::Decode(
                "refreshed token belongs to another user".to_string(),
            ));
        }
        Ok(AuthUser {
            id_token: SecretString::from(response.id_token),
            refresh_token: SecretString::from(response.refresh_token),
            expires_at: Utc::now() + expires_in(Some(&response.expires_in)),
            ..user.clone()
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn account(id_token: Option<&str>) -> AccountResponse {
        AccountResponse {
            local_id: "uid-1".to_string(),
            email: Some("lan@example.com".to_string()),
            display_name: Some(String::new()),
            id_token: id_token.map(str::to_string),
            refresh_token: id_token.map(|_| "refresh".to_string()),
            expires_in: id_token.map(|_| "3600".to_string()),
        }
    }

    #[test]
    fn test_session_from_sign_in_response() {
        let user = session_from(account(Some("token")), false, None).unwrap();
        assert_eq!(user.uid.as_str(), "uid-1");
        assert_eq!(user.email.unwrap().as_str(), "lan@example.com");
        assert!(user.display_name.is_none());
        assert_eq!(user.id_token.expose_secret(), "token");
        assert!(user.expires_at > Utc::now() + Duration::minutes(59));
    }

    #[test]
    fn test_session_from_update_keeps_previous_tokens() {
        let previous = session_from(account(Some("old")), false, None).unwrap();
        let updated = session_from(account(None), false, Some(&previous)).unwrap();
        assert_eq!(updated.id_token.expose_secret(), "old");
        assert_eq!(updated.expires_at, previous.expires_at);
    }

    #[test]
    fn test_session_without_token_is_rejected() {
        assert!(session_from(account(None), false, None).is_err());
    }

    #[test]
    fn test_account_response_parses_camel_case() {
        let raw = r#"{
            "kind": "identitytoolkit#VerifyPasswordResponse",
            "localId": "abc",
            "email": "a@b.vn",
            "displayName": "",
            "idToken": "t",
            "registered": true,
            "refreshToken": "r",
            "expiresIn": "3600"
        }"#;
        let parsed: AccountResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.local_id, "abc");
        assert_eq!(parsed.expires_in.as_deref(), Some("3600"));
    }

    #[test]
    fn test_emulator_endpoints() {
        let config = FirebaseConfig {
            api_key: SecretString::from("fake"),
            project_id: "demo-artisan".to_string(),
            database_id: "(default)".to_string(),
            firestore_emulator_host: None,
            auth_emulator_host: Some("127.0.0.1:9099".to_string()),
        };
        let client = IdentityClient::new(&config, reqwest::Client::new());
        assert_eq!(
            client.inner.accounts_url,
            "http://127.0.0.1:9099/identitytoolkit.googleapis.com/v1/accounts"
        );
        assert_eq!(
            client.inner.token_url,
            "http://127.0.0.1:9099/securetoken.googleapis.com/v1/token"
        );
    }
}
