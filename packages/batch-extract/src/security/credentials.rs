//! Credential handling with secure memory.
//!
//! Uses the `secrecy` crate to prevent accidental logging of sensitive values.

use std::fmt;
use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretBox};

use crate::error::{Result, RunError};

/// A secret string that won't be logged or displayed.
///
/// Uses `secrecy::SecretBox` to ensure API keys are never accidentally
/// exposed in logs, debug output, or error messages.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    /// Create a new secret string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::from(value.into().as_str())))
    }

    /// Expose the secret value for use.
    ///
    /// Only call this when actually using the secret (e.g., in an API request).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_string())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Provider credentials: either an API key or a credentials file, never
/// both.
///
/// The two mechanisms authenticate differently; supplying both is a
/// configuration conflict rejected before any network activity.
#[derive(Clone)]
pub struct ProviderCredentials {
    /// Direct API key (secret).
    pub api_key: Option<SecretString>,

    /// Path to a service credentials file.
    pub credentials_path: Option<PathBuf>,
}

impl ProviderCredentials {
    /// Credentials from a direct API key.
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(SecretString::new(key)),
            credentials_path: None,
        }
    }

    /// Credentials from a service credentials file.
    pub fn credentials_file(path: impl Into<PathBuf>) -> Self {
        Self {
            api_key: None,
            credentials_path: Some(path.into()),
        }
    }

    /// Build from optional raw parts. Returns `None` when neither is set.
    pub fn from_parts(
        api_key: Option<String>,
        credentials_path: Option<String>,
    ) -> Option<Self> {
        if api_key.is_none() && credentials_path.is_none() {
            return None;
        }
        Some(Self {
            api_key: api_key.map(SecretString::new),
            credentials_path: credentials_path.map(PathBuf::from),
        })
    }

    /// Reject mutually exclusive or empty parameter combinations.
    pub fn validate(&self) -> Result<()> {
        match (&self.api_key, &self.credentials_path) {
            (Some(_), Some(_)) => Err(RunError::Config {
                reason: "api_key and credentials_path are mutually exclusive".into(),
            }),
            (None, None) => Err(RunError::Auth {
                reason: "credentials present but neither api_key nor credentials_path set"
                    .into(),
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("credentials_path", &self.credentials_path)
            .finish()
    }
}
