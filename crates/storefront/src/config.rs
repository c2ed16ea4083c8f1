//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `FIREBASE_API_KEY` - Web API key of the Firebase project
//! - `FIREBASE_PROJECT_ID` - Firebase / Google Cloud project id
//!
//! ## Optional
//! - `FIRESTORE_DATABASE` - Firestore database id (default: `(default)`)
//! - `FIRESTORE_EMULATOR_HOST` - `host:port` of a Firestore emulator
//! - `FIREBASE_AUTH_EMULATOR_HOST` - `host:port` of an Auth emulator
//! - `CATALOG_CACHE_TTL_SECS` - Product list cache lifetime (default: 300)
//! - `HTTP_TIMEOUT_SECS` - Per-request timeout for backend calls (default: 15)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `LOG_FORMAT` - `pretty` (default) or `json`

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_DATABASE: &str = "(default)";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("expected `pretty` or `json`, got `{other}`")),
        }
    }
}

/// Storefront configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Firebase project access
    pub firebase: FirebaseConfig,
    /// How long fetched product lists stay cached
    pub catalog_cache_ttl: Duration,
    /// Timeout applied to every backend request
    pub http_timeout: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. `production`, `staging`)
    pub sentry_environment: Option<String>,
    pub log_format: LogFormat,
}

/// Firebase project configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct FirebaseConfig {
    pub api_key: SecretString,
    pub project_id: String,
    /// Firestore database id, `(default)` unless a named database is used
    pub database_id: String,
    pub firestore_emulator_host: Option<String>,
    pub auth_emulator_host: Option<String>,
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("api_key", &"[REDACTED]")
            .field("project_id", &self.project_id)
            .field("database_id", &self.database_id)
            .field("firestore_emulator_host", &self.firestore_emulator_host)
            .field("auth_emulator_host", &self.auth_emulator_host)
            .finish()
    }
}

impl FirebaseConfig {
    /// Configuration pointing both services at local emulators.
    #[must_use]
    pub fn emulator(project_id: &str, host: &str, auth_host: &str) -> Self {
        Self {
            api_key: SecretString::from("emulator"),
            project_id: project_id.to_string(),
            database_id: DEFAULT_DATABASE.to_string(),
            firestore_emulator_host: Some(host.to_string()),
            auth_emulator_host: Some(auth_host.to_string()),
        }
    }

    /// Whether any service is redirected to an emulator.
    #[must_use]
    pub const fn uses_emulator(&self) -> bool {
        self.firestore_emulator_host.is_some() || self.auth_emulator_host.is_some()
    }

    fn from_lookup(env: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let project_id = get_required_env(env, "FIREBASE_PROJECT_ID")?;
        validate_project_id(&project_id)?;

        let firestore_emulator_host = get_optional_env(env, "FIRESTORE_EMULATOR_HOST");
        let auth_emulator_host = get_optional_env(env, "FIREBASE_AUTH_EMULATOR_HOST");

        // Emulators accept any key.
        let api_key = if firestore_emulator_host.is_some() && auth_emulator_host.is_some() {
            get_optional_env(env, "FIREBASE_API_KEY")
                .map_or_else(|| SecretString::from("emulator"), SecretString::from)
        } else {
            get_validated_secret(env, "FIREBASE_API_KEY")?
        };

        Ok(Self {
            api_key,
            project_id,
            database_id: get_env_or_default(env, "FIRESTORE_DATABASE", DEFAULT_DATABASE),
            firestore_emulator_host,
            auth_emulator_host,
        })
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the API key fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Load configuration from an explicit variable map.
    ///
    /// # Errors
    ///
    /// Same as [`StorefrontConfig::from_env`].
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| vars.get(key).cloned())
    }

    fn from_lookup(env: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let firebase = FirebaseConfig::from_lookup(env)?;
        let catalog_cache_ttl = Duration::from_secs(get_parsed_or_default(
            env,
            "CATALOG_CACHE_TTL_SECS",
            300_u64,
        )?);
        let http_timeout =
            Duration::from_secs(get_parsed_or_default(env, "HTTP_TIMEOUT_SECS", 15_u64)?);
        if http_timeout.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "HTTP_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let log_format = get_parsed_or_default(env, "LOG_FORMAT", LogFormat::Pretty)?;

        Ok(Self {
            firebase,
            catalog_cache_ttl,
            http_timeout,
            sentry_dsn: get_optional_env(env, "SENTRY_DSN"),
            sentry_environment: get_optional_env(env, "SENTRY_ENVIRONMENT"),
            log_format,
        })
    }

    /// Configuration for tests and local tooling that never reach the network.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            firebase: FirebaseConfig::emulator(
                "demo-artisan-market",
                "127.0.0.1:8080",
                "127.0.0.1:9099",
            ),
            catalog_cache_ttl: Duration::from_secs(300),
            http_timeout: Duration::from_secs(15),
            sentry_dsn: None,
            sentry_environment: None,
            log_format: LogFormat::Pretty,
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable. Blank values count as missing.
fn get_required_env(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<String, ConfigError> {
    get_optional_env(env, key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    env(key).filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(env: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    get_optional_env(env, key).unwrap_or_else(|| default.to_string())
}

/// Parse an optional environment variable, falling back to `default`.
fn get_parsed_or_default<T>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(env, key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Project ids are 6-30 lowercase letters, digits or hyphens.
fn validate_project_id(project_id: &str) -> Result<(), ConfigError> {
    let valid_chars = project_id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !(6..=30).contains(&project_id.len()) || !valid_chars {
        return Err(ConfigError::InvalidEnvVar(
            "FIREBASE_PROJECT_ID".to_string(),
            format!("`{project_id}` is not a valid project id"),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Copy the key from the Firebase console."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<SecretString, ConfigError> {
    let value = get_required_env(env, key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
