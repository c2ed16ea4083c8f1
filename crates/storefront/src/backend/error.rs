//! Errors raised by document store and auth provider implementations.

use std::fmt;

use thiserror::Error;

/// Errors that can occur when talking to the remote backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint URL could not be built.
    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A document or value had an unexpected shape.
    #[error("malformed document: {0}")]
    Decode(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Security rules rejected the request.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No valid credentials were attached to the request.
    #[error("request is not authenticated")]
    Unauthenticated,

    /// A write precondition failed (e.g. updating a missing document).
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The identity provider rejected the operation.
    #[error("authentication failed: {0}")]
    Auth(AuthFailure),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Backend temporarily unreachable.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Whether the failure is caused by the caller's input or credentials
    /// rather than by the backend itself.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::PermissionDenied(_)
                | Self::Unauthenticated
                | Self::Precondition(_)
                | Self::Auth(_)
        )
    }
}

/// Identity provider failure codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    EmailNotFound,
    InvalidPassword,
    InvalidCredentials,
    EmailExists,
    InvalidEmail,
    WeakPassword,
    UserDisabled,
    UserNotFound,
    TooManyAttempts,
    OperationNotAllowed,
    TokenExpired,
    Other(String),
}

impl AuthFailure {
    /// Parse an identity toolkit error message such as
    /// `WEAK_PASSWORD : Password should be at least 6 characters`.
    #[must_use]
    pub fn from_code(message: &str) -> Self {
        let code = message.split(" : ").next().unwrap_or(message).trim();
        match code {
            "EMAIL_NOT_FOUND" => Self::EmailNotFound,
            "INVALID_PASSWORD" => Self::InvalidPassword,
            "INVALID_LOGIN_CREDENTIALS" => Self::InvalidCredentials,
            "EMAIL_EXISTS" => Self::EmailExists,
            "INVALID_EMAIL" => Self::InvalidEmail,
            "WEAK_PASSWORD" => Self::WeakPassword,
            "USER_DISABLED" => Self::UserDisabled,
            "USER_NOT_FOUND" => Self::UserNotFound,
            "TOO_MANY_ATTEMPTS_TRY_LATER" => Self::TooManyAttempts,
            "OPERATION_NOT_ALLOWED" | "ADMIN_ONLY_OPERATION" => Self::OperationNotAllowed,
            "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "INVALID_ID_TOKEN" => Self::TokenExpired,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::EmailNotFound => "EMAIL_NOT_FOUND",
            Self::InvalidPassword => "INVALID_PASSWORD",
            Self::InvalidCredentials => "INVALID_LOGIN_CREDENTIALS",
            Self::EmailExists => "EMAIL_EXISTS",
            Self::InvalidEmail => "INVALID_EMAIL",
            Self::WeakPassword => "WEAK_PASSWORD",
            Self::UserDisabled => "USER_DISABLED",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::TooManyAttempts => "TOO_MANY_ATTEMPTS_TRY_LATER",
            Self::OperationNotAllowed => "OPERATION_NOT_ALLOWED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
