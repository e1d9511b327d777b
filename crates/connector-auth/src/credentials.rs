//! Application credentials the engine trusts.
//!
//! [`CredentialProvider`] is the capability the engine queries: whether
//! authentication is disabled, and which app ids (with their passwords) are
//! known. [`AppCredentialCache`] hands out per-app credentials for outbound
//! calls without asking the provider again.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::{AuthError, Result};

/// Source of trusted application identities.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Whether requests may be served without any credential.
    async fn is_authentication_disabled(&self) -> bool;

    /// Password registered for `app_id`, or `None` if the app is unknown.
    async fn get_app_password(&self, app_id: &str) -> Option<SecretString>;

    /// Whether `app_id` is an application this bot answers for.
    async fn is_valid_app_id(&self, app_id: &str) -> bool {
        self.get_app_password(app_id).await.is_some()
    }
}

/// Credential provider for a single bot application.
///
/// Authentication is disabled when the app id is blank, which is how a bot
/// runs against the local emulator without registration.
pub struct SimpleCredentialProvider {
    app_id: String,
    password: SecretString,
}

impl SimpleCredentialProvider {
    /// Create a provider for one app id/password pair.
    pub fn new(app_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            password: SecretString::new(password.into()),
        }
    }

    /// The configured app id.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }
}

impl fmt::Debug for SimpleCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleCredentialProvider")
            .field("app_id", &self.app_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl CredentialProvider for SimpleCredentialProvider {
    async fn is_authentication_disabled(&self) -> bool {
        self.app_id.trim().is_empty()
    }

    async fn get_app_password(&self, app_id: &str) -> Option<SecretString> {
        (app_id == self.app_id).then(|| SecretString::new(self.password.expose_secret().clone()))
    }

    async fn is_valid_app_id(&self, app_id: &str) -> bool {
        app_id == self.app_id
    }
}

/// App id and password used when calling back into a channel.
pub struct AppCredentials {
    app_id: String,
    password: SecretString,
}

impl AppCredentials {
    /// Create credentials.
    pub fn new(app_id: impl Into<String>, password: SecretString) -> Self {
        Self {
            app_id: app_id.into(),
            password,
        }
    }

    /// Empty credentials for the auth-disabled path.
    pub fn anonymous() -> Self {
        Self::new(String::new(), SecretString::new(String::new()))
    }

    /// App id.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Password.
    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// True for [`AppCredentials::anonymous`].
    pub fn is_anonymous(&self) -> bool {
        self.app_id.is_empty()
    }
}

impl fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCredentials")
            .field("app_id", &self.app_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Per-app credential cache.
///
/// Each app id is resolved through the provider once and then shared.
#[derive(Debug, Default)]
pub struct AppCredentialCache {
    entries: DashMap<String, Arc<AppCredentials>>,
}

impl AppCredentialCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credentials for `app_id`, loading the password on first use.
    ///
    /// A blank app id yields anonymous credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the provider has no password
    /// for `app_id`.
    pub async fn get_or_load(
        &self,
        app_id: &str,
        provider: &dyn CredentialProvider,
    ) -> Result<Arc<AppCredentials>> {
        if app_id.trim().is_empty() {
            return Ok(Arc::new(AppCredentials::anonymous()));
        }

        if let Some(cached) = self.entries.get(app_id) {
            return Ok(Arc::clone(cached.value()));
        }

        let password = provider.get_app_password(app_id).await.ok_or_else(|| {
            AuthError::Configuration(format!("no password registered for app id '{app_id}'"))
        })?;

        debug!(app_id, "Loaded app credentials");

        let credentials = self
            .entries
            .entry(app_id.to_string())
            .or_insert_with(|| Arc::new(AppCredentials::new(app_id, password)));
        Ok(Arc::clone(credentials.value()))
    }

    /// Number of cached app ids.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
