//! Authentication configuration.
//!
//! Defaults describe the public Bot Framework trust policy: channel tokens
//! issued by `https://api.botframework.com` and emulator tokens issued by the
//! Azure AD tenants the emulator signs in with. Deployments that front a
//! private identity provider (or tests using a mock one) override the URLs
//! and issuers.

use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};
use crate::options::{DEFAULT_CLOCK_TOLERANCE, VerifyOptions};

/// OpenID metadata document for tokens sent by channels.
pub const CHANNEL_OPENID_METADATA_URL: &str =
    "https://login.botframework.com/v1/.well-known/openidconfiguration";

/// Issuer of tokens sent by channels.
pub const CHANNEL_TOKEN_ISSUER: &str = "https://api.botframework.com";

/// OpenID metadata document for tokens issued to the emulator.
pub const EMULATOR_OPENID_METADATA_URL: &str =
    "https://login.microsoftonline.com/botframework.com/v2.0/.well-known/openid-configuration";

/// Issuers of emulator tokens (v1.0 and v2.0 endpoints of both tenants).
pub const EMULATOR_TOKEN_ISSUERS: [&str; 4] = [
    "https://sts.windows.net/d6d49420-f39b-4df7-a1dc-d59a935871db/",
    "https://login.microsoftonline.com/d6d49420-f39b-4df7-a1dc-d59a935871db/v2.0",
    "https://sts.windows.net/f8cdef31-a31e-4b4a-93e4-5f571e91255a/",
    "https://login.microsoftonline.com/f8cdef31-a31e-4b4a-93e4-5f571e91255a/v2.0",
];

/// Signing keys older than this are refreshed (5 days).
pub const DEFAULT_KEY_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 24 * 60 * 60);

/// Minimum gap between refreshes forced by an unknown key id.
pub const DEFAULT_MIN_KEY_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Transport timeout for metadata and key-set requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthenticationConfig {
    /// Metadata document for channel tokens
    #[serde(default = "default_channel_metadata_url")]
    pub channel_metadata_url: String,
    /// Issuer of channel tokens
    #[serde(default = "default_channel_issuer")]
    pub channel_issuer: String,
    /// Metadata document for emulator tokens
    #[serde(default = "default_emulator_metadata_url")]
    pub emulator_metadata_url: String,
    /// Issuers of emulator tokens
    #[serde(default = "default_emulator_issuers")]
    pub emulator_issuers: Vec<String>,
    /// Signing algorithms accepted on inbound tokens
    #[serde(default = "default_allowed_algorithms")]
    pub allowed_algorithms: Vec<Algorithm>,
    /// Clock skew tolerance for `exp`/`nbf`
    #[serde(default = "default_clock_tolerance")]
    pub clock_tolerance: Duration,
    /// Age after which cached signing keys are refreshed
    #[serde(default = "default_key_refresh_interval")]
    pub key_refresh_interval: Duration,
    /// Minimum gap between refreshes triggered by an unknown `kid`
    #[serde(default = "default_min_key_refresh_interval")]
    pub min_key_refresh_interval: Duration,
    /// Timeout for each metadata request
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,
}

fn default_channel_metadata_url() -> String {
    CHANNEL_OPENID_METADATA_URL.to_string()
}

fn default_channel_issuer() -> String {
    CHANNEL_TOKEN_ISSUER.to_string()
}

fn default_emulator_metadata_url() -> String {
    EMULATOR_OPENID_METADATA_URL.to_string()
}

fn default_emulator_issuers() -> Vec<String> {
    EMULATOR_TOKEN_ISSUERS.iter().map(ToString::to_string).collect()
}

fn default_allowed_algorithms() -> Vec<Algorithm> {
    vec![Algorithm::RS256, Algorithm::RS384, Algorithm::RS512]
}

fn default_clock_tolerance() -> Duration {
    DEFAULT_CLOCK_TOLERANCE
}

fn default_key_refresh_interval() -> Duration {
    DEFAULT_KEY_REFRESH_INTERVAL
}

fn default_min_key_refresh_interval() -> Duration {
    DEFAULT_MIN_KEY_REFRESH_INTERVAL
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

impl Default for AuthenticationConfig {
    fn default() -> Self {
        Self {
            channel_metadata_url: default_channel_metadata_url(),
            channel_issuer: default_channel_issuer(),
            emulator_metadata_url: default_emulator_metadata_url(),
            emulator_issuers: default_emulator_issuers(),
            allowed_algorithms: default_allowed_algorithms(),
            clock_tolerance: default_clock_tolerance(),
            key_refresh_interval: default_key_refresh_interval(),
            min_key_refresh_interval: default_min_key_refresh_interval(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl AuthenticationConfig {
    /// Check the configuration can produce a fail-closed validator.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if an issuer set or metadata URL
    /// is empty, the algorithm allow-list is empty or contains a symmetric
    /// (HMAC) algorithm, the refresh interval is zero, or the minimum
    /// refresh gap exceeds the refresh interval.
    pub fn validate(&self) -> Result<()> {
        if self.channel_issuer.trim().is_empty() {
            return Err(AuthError::Configuration(
                "channel_issuer must not be empty".to_string(),
            ));
        }
        if self.emulator_issuers.iter().all(|i| i.trim().is_empty()) {
            return Err(AuthError::Configuration(
                "emulator_issuers must contain at least one issuer".to_string(),
            ));
        }
        if self.channel_metadata_url.trim().is_empty()
            || self.emulator_metadata_url.trim().is_empty()
        {
            return Err(AuthError::Configuration(
                "metadata URLs must not be empty".to_string(),
            ));
        }
        if self.allowed_algorithms.is_empty() {
            return Err(AuthError::Configuration(
                "allowed_algorithms must not be empty".to_string(),
            ));
        }
        // Inbound keys are always published, asymmetric keys.
        if let Some(alg) = self
            .allowed_algorithms
            .iter()
            .find(|alg| matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512))
        {
            return Err(AuthError::Configuration(format!(
                "symmetric algorithm {alg:?} cannot be allowed for inbound tokens"
            )));
        }
        if self.key_refresh_interval.is_zero() {
            return Err(AuthError::Configuration(
                "key_refresh_interval must be greater than zero".to_string(),
            ));
        }
        if self.min_key_refresh_interval > self.key_refresh_interval {
            return Err(AuthError::Configuration(
                "min_key_refresh_interval must not exceed key_refresh_interval".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `issuer` belongs to the emulator trust policy.
    pub fn is_emulator_issuer(&self, issuer: &str) -> bool {
        self.emulator_issuers.iter().any(|trusted| trusted == issuer)
    }

    /// Verification rules for channel tokens.
    ///
    /// The audience is not fixed here; the channel policy checks `aud`
    /// against the credential provider.
    pub fn channel_verify_options(&self) -> VerifyOptions {
        VerifyOptions::new([self.channel_issuer.clone()])
            .with_clock_tolerance(self.clock_tolerance)
    }

    /// Verification rules for emulator tokens.
    pub fn emulator_verify_options(&self) -> VerifyOptions {
        VerifyOptions::new(self.emulator_issuers.iter().cloned())
            .with_clock_tolerance(self.clock_tolerance)
    }
}
