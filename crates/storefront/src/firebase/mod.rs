//! Firebase REST clients.
//!
//! - [`FirestoreClient`] implements [`DocumentStore`](crate::backend::DocumentStore)
//!   over the Cloud Firestore v1 REST API
//! - [`IdentityClient`] implements [`AuthProvider`](crate::backend::AuthProvider)
//!   over Identity Toolkit v1 and Secure Token v1
//!
//! Both honour the emulator hosts from [`FirebaseConfig`].

mod codec;
mod firestore;
mod identity;

pub use firestore::FirestoreClient;
pub use identity::IdentityClient;

use std::time::Duration;

use crate::backend::BackendError;
use crate::config::FirebaseConfig;

/// Build the shared HTTP client used by both Firebase clients.
///
/// # Errors
///
/// Returns `BackendError::Http` if the TLS backend cannot be initialised.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, BackendError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("artisan-market/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Create both clients over one connection pool.
///
/// # Errors
///
/// Returns `BackendError::Http` if the HTTP client cannot be built.
pub fn connect(
    config: &FirebaseConfig,
    timeout: Duration,
) -> Result<(FirestoreClient, IdentityClient), BackendError> {
    let client = http_client(timeout)?;
    tracing::info!(
        project_id = %config.project_id,
        emulator = config.uses_emulator(),
        "Firebase clients created"
    );
    Ok((
        FirestoreClient::new(config, client.clone()),
        IdentityClient::new(config, client),
    ))
}
