//! Retrieval of OpenID metadata and key-set documents.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use crate::error::{AuthError, Result};

/// Fetches a JSON document by URL.
///
/// The metadata cache issues every network request through this trait, so
/// tests (or deployments with their own HTTP stack) can substitute it.
#[async_trait]
pub trait MetadataTransport: Send + Sync + fmt::Debug {
    /// GET `url` and parse the body as JSON.
    async fn get_json(&self, url: &str) -> Result<Value>;
}

/// reqwest-backed transport.
///
/// - HTTPS only, except plain HTTP to loopback hosts for local development
/// - Per-request timeout so a slow identity provider cannot stall validation
/// - Redirects are not followed
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(format!("connector-auth/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetadataTransport for HttpTransport {
    async fn get_json(&self, url: &str) -> Result<Value> {
        if !is_permitted_url(url) {
            return Err(AuthError::metadata_fetch(
                url,
                "metadata endpoints must use HTTPS (HTTP only allowed for loopback)",
            ));
        }

        debug!(url, "Fetching identity provider document");

        let response = self.client.get(url).send().await.map_err(|e| {
            error!(url, error = %e, "Metadata request failed");
            AuthError::metadata_fetch(url, e.to_string())
        })?;

        if !response.status().is_success() {
            error!(url, status = %response.status(), "Metadata endpoint returned error status");
            return Err(AuthError::metadata_fetch(
                url,
                format!("endpoint returned status {}", response.status()),
            ));
        }

        response.json::<Value>().await.map_err(|e| {
            error!(url, error = %e, "Metadata response is not valid JSON");
            AuthError::metadata_fetch(url, format!("invalid JSON: {e}"))
        })
    }
}

fn is_permitted_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    match parsed.scheme() {
        "https" => true,
        "http" => matches!(
            parsed.host_str(),
            Some("localhost" | "127.0.0.1" | "[::1]")
        ),
        _ => false,
    }
}
