//! Authentication error types.
//!
//! Every failure the engine can produce is one [`AuthError`] variant. Variants
//! fall into two classes:
//!
//! - **Missing credential** ([`AuthError::is_credential_missing`]): nothing
//!   usable was presented. The caller may apply its anonymous policy.
//! - **Hard failure**: a credential was presented and rejected. These are
//!   never retried inside the engine.

use http::StatusCode;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Authentication errors
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No Authorization header and authentication is required
    #[error("Unauthorized: no credentials supplied")]
    NoCredentialSupplied,

    /// Header or token could not be decoded as a signed bearer token
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Issuer claim is not in any trusted issuer set
    #[error("Untrusted token issuer: {0}")]
    UntrustedIssuer(String),

    /// Signing algorithm not in the allow-list
    #[error("Token signing algorithm '{0}' is not allowed")]
    DisallowedAlgorithm(String),

    /// No usable signing key matches the token's key id
    #[error("No signing key found for key id '{0}'")]
    KeyNotFound(String),

    /// The signing key's endorsements do not permit this token
    #[error("Endorsement validation failed for key id '{0}'")]
    EndorsementFailure(String),

    /// Signature, expiry, issuer or audience verification failed
    #[error("Token verification failed: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    /// Verified token carries claims the trust policy rejects
    #[error("Token claims rejected: {0}")]
    ClaimRejected(String),

    /// Retrieving or parsing identity provider metadata failed
    #[error("Metadata fetch failed for {url}: {reason}")]
    MetadataFetch {
        /// URL being fetched
        url: String,
        /// Failure description
        reason: String,
    },

    /// Invalid authentication configuration
    #[error("Invalid authentication configuration: {0}")]
    Configuration(String),
}

impl AuthError {
    /// Build a [`AuthError::MetadataFetch`] for `url`.
    pub fn metadata_fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MetadataFetch {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// True when no usable credential was presented.
    ///
    /// These errors are surfaced to the caller the same way as
    /// [`AuthError::NoCredentialSupplied`].
    pub fn is_credential_missing(&self) -> bool {
        matches!(
            self,
            Self::NoCredentialSupplied | Self::MalformedToken(_) | Self::UntrustedIssuer(_)
        )
    }

    /// True when a credential was presented and rejected.
    pub fn is_hard_failure(&self) -> bool {
        !self.is_credential_missing() && !matches!(self, Self::Configuration(_))
    }

    /// HTTP status the request boundary should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MetadataFetch { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}
