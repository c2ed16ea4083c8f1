//! Authentication error types.

use artisan_market_core::EmailError;
use thiserror::Error;

use crate::backend::{AuthFailure, BackendError};

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required form field was left blank.
    #[error("missing required fields")]
    MissingFields,

    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Password and confirmation differ.
    #[error("password confirmation does not match")]
    PasswordMismatch,

    /// Password too short.
    #[error("password must be at least {0} characters")]
    WeakPassword(usize),

    /// The operation needs a signed-in user.
    #[error("not signed in")]
    NotSignedIn,

    /// The identity provider rejected the request or could not be reached.
    #[error("identity provider error: {0}")]
    Provider(#[from] BackendError),

    /// The account exists and is signed in, but its profile document could
    /// not be written.
    #[error("account created but profile was not saved: {0}")]
    ProfileNotSaved(BackendError),
}

impl AuthError {
    /// Message shown to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingFields => "Please fill in all required fields.".to_string(),
            Self::InvalidEmail(_) => "Invalid email address.".to_string(),
            Self::PasswordMismatch => "Passwords do not match.".to_string(),
            Self::WeakPassword(min) => format!("Password must be at least {min} characters."),
            Self::NotSignedIn => "Please sign in to continue.".to_string(),
            Self::ProfileNotSaved(_) => {
                "Your account was created, but your profile could not be saved.".to_string()
            }
            Self::Provider(BackendError::Auth(failure)) => failure_message(failure).to_string(),
            Self::Provider(BackendError::RateLimited(_)) => {
                "Too many attempts. Please try again later.".to_string()
            }
            Self::Provider(_) => "Something went wrong. Please try again.".to_string(),
        }
    }

    /// Whether the failure is on the provider's side rather than the user's.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        match self {
            Self::Provider(err) => {
                !err.is_client_error() && !matches!(err, BackendError::RateLimited(_))
            }
            Self::ProfileNotSaved(_) => true,
            _ => false,
        }
    }
}

fn failure_message(failure: &AuthFailure) -> &'static str {
    match failure {
        AuthFailure::EmailNotFound
        | AuthFailure::InvalidPassword
        | AuthFailure::InvalidCredentials
        | AuthFailure::UserNotFound => "Incorrect email or password.",
        AuthFailure::InvalidEmail => "Invalid email address.",
        AuthFailure::EmailExists => "This email is already in use.",
        AuthFailure::WeakPassword => "Password must be at least 6 characters.",
        AuthFailure::UserDisabled => "This account has been disabled.",
        AuthFailure::TooManyAttempts => "Too many attempts. Please try again later.",
        AuthFailure::OperationNotAllowed => "This sign-in method is not enabled.",
        AuthFailure::TokenExpired => "Your session has expired. Please sign in again.",
        AuthFailure::Other(_) => "Something went wrong. Please try again.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_failures_share_one_message() {
        for failure in [
            AuthFailure::EmailNotFound,
            AuthFailure::InvalidPassword,
            AuthFailure::InvalidCredentials,
            AuthFailure::UserNotFound,
        ] {
            let err = AuthError::Provider(BackendError::Auth(failure));
            assert_eq!(err.user_message(), "Incorrect email or password.");
            assert!(!err.is_server_error());
        }
    }

    #[test]
    fn test_registration_messages() {
        let err = AuthError::Provider(BackendError::Auth(AuthFailure::EmailExists));
        assert_eq!(err.user_message(), "This email is already in use.");
        assert_eq!(
            AuthError::WeakPassword(6).user_message(),
            "Password must be at least 6 characters."
        );
    }

    #[test]
    fn test_unknown_failures_fall_back() {
        let err = AuthError::Provider(BackendError::Unavailable("down".to_string()));
        assert_eq!(err.user_message(), "Something went wrong. Please try again.");
        assert!(err.is_server_error());
    }
}
