//! Request authentication entry point.

use std::sync::Arc;

use tracing::debug;

use crate::activity::InboundActivity;
use crate::claims::ClaimsIdentity;
use crate::config::AuthenticationConfig;
use crate::credentials::{AppCredentialCache, AppCredentials, CredentialProvider};
use crate::error::{AuthError, Result};
use crate::jwt::{HttpTransport, OpenIdMetadataCache, bearer_token, unverified_issuer};
use crate::trust::TrustedServiceUrls;
use crate::validation::{TokenValidator, ValidationContext};

/// Authenticates inbound requests.
///
/// Cheap to clone; clones share the signing key cache, the trusted service
/// URL registry and the app credential cache.
///
/// # Example
///
/// ```rust,no_run
/// use connector_auth::{
///     AuthenticationConfig, Authenticator, InboundActivity, SimpleCredentialProvider,
/// };
///
/// # async fn example(header: Option<&str>) -> connector_auth::Result<()> {
/// let authenticator = Authenticator::new(AuthenticationConfig::default())?;
/// let credentials = SimpleCredentialProvider::new("my-app-id", "my-app-password");
/// let activity = InboundActivity::new(
///     "message",
///     "https://smba.trafficmanager.net/teams/",
///     "msteams",
/// );
///
/// match authenticator
///     .authenticate_request(&activity, header, &credentials)
///     .await
/// {
///     Ok(identity) => println!("authenticated as {:?}", identity.app_id()),
///     Err(e) => println!("rejected with {}: {e}", e.status_code()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Authenticator {
    config: Arc<AuthenticationConfig>,
    metadata: Arc<OpenIdMetadataCache>,
    trusted_urls: Arc<TrustedServiceUrls>,
    app_credentials: Arc<AppCredentialCache>,
}

impl Authenticator {
    /// Create an authenticator fetching keys over HTTPS.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if `config` is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: AuthenticationConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(config.request_timeout)?;
        let metadata = OpenIdMetadataCache::new(Arc::new(transport))
            .with_refresh_interval(config.key_refresh_interval)
            .with_min_refresh_interval(config.min_key_refresh_interval);
        Self::with_metadata_cache(config, Arc::new(metadata))
    }

    /// Create an authenticator sharing an existing key cache.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if `config` is invalid.
    pub fn with_metadata_cache(
        config: AuthenticationConfig,
        metadata: Arc<OpenIdMetadataCache>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            metadata,
            trusted_urls: Arc::new(TrustedServiceUrls::new()),
            app_credentials: Arc::new(AppCredentialCache::new()),
        })
    }

    /// Authenticate one inbound request.
    ///
    /// - No header (or a blank one): anonymous identity if `credentials`
    ///   disabled authentication, otherwise [`AuthError::NoCredentialSupplied`]
    /// - A header: validated under the emulator or channel policy. On success
    ///   the activity's service URL is trusted for the identity's app id.
    ///
    /// # Errors
    ///
    /// Any [`AuthError`]; see [`validate_auth_header`](Self::validate_auth_header).
    pub async fn authenticate_request(
        &self,
        activity: &InboundActivity,
        auth_header: Option<&str>,
        credentials: &dyn CredentialProvider,
    ) -> Result<ClaimsIdentity> {
        let Some(auth_header) = auth_header.filter(|header| !header.trim().is_empty()) else {
            if credentials.is_authentication_disabled().await {
                debug!("No Authorization header, authentication disabled");
                return Ok(ClaimsIdentity::anonymous());
            }
            debug!("No Authorization header, authentication required");
            return Err(AuthError::NoCredentialSupplied);
        };

        let identity = self
            .validate_auth_header(
                auth_header,
                credentials,
                activity.channel_id(),
                activity.service_url(),
            )
            .await?;

        if let (Some(app_id), Some(service_url)) = (identity.app_id(), activity.service_url()) {
            self.trusted_urls.trust(app_id, service_url);
        }

        Ok(identity)
    }

    /// Validate an `Authorization` header value.
    ///
    /// # Errors
    ///
    /// - [`AuthError::UntrustedIssuer`] if the token decodes but no policy
    ///   trusts its issuer
    /// - [`AuthError::NoCredentialSupplied`] if the header is not a bearer
    ///   credential at all
    /// - any hard failure from the selected policy, unchanged
    pub async fn validate_auth_header(
        &self,
        auth_header: &str,
        credentials: &dyn CredentialProvider,
        channel_id: Option<&str>,
        service_url: Option<&str>,
    ) -> Result<ClaimsIdentity> {
        let validator = TokenValidator::classify(auth_header, &self.config);
        let context = ValidationContext {
            config: &self.config,
            metadata: &self.metadata,
            credentials,
            channel_id,
            service_url,
        };

        match validator.validate(auth_header, &context).await? {
            Some(identity) => Ok(identity),
            None => Err(no_identity(auth_header)),
        }
    }

    /// Credentials for calling back on behalf of `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the provider has no password
    /// for the identity's app id.
    pub async fn outbound_credentials(
        &self,
        identity: &ClaimsIdentity,
        credentials: &dyn CredentialProvider,
    ) -> Result<Arc<AppCredentials>> {
        self.app_credentials
            .get_or_load(identity.app_id().unwrap_or_default(), credentials)
            .await
    }

    /// Service URLs trusted so far.
    pub fn trusted_service_urls(&self) -> &TrustedServiceUrls {
        &self.trusted_urls
    }

    /// The shared signing key cache.
    pub fn metadata_cache(&self) -> &Arc<OpenIdMetadataCache> {
        &self.metadata
    }

    /// Configuration in use.
    pub fn config(&self) -> &AuthenticationConfig {
        &self.config
    }
}

/// Error for a header that produced no identity.
fn no_identity(auth_header: &str) -> AuthError {
    match bearer_token(auth_header).map(unverified_issuer) {
        Some(Ok(Some(issuer))) => {
            debug!(issuer = %issuer, "Bearer token from untrusted issuer");
            AuthError::UntrustedIssuer(issuer)
        }
        _ => AuthError::NoCredentialSupplied,
    }
}
