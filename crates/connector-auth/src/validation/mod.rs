//! Trust policy selection.
//!
//! Two fixed policies exist. Which one applies is decided from the token's
//! unverified issuer alone; the chosen policy then verifies everything,
//! including that issuer.

pub mod channel;
pub mod emulator;

use std::sync::Arc;

use tracing::debug;

use crate::claims::ClaimsIdentity;
use crate::config::AuthenticationConfig;
use crate::credentials::CredentialProvider;
use crate::error::Result;
use crate::jwt::{OpenIdMetadataCache, bearer_token, unverified_issuer};

/// Everything a policy needs besides the header.
#[derive(Clone, Copy)]
pub struct ValidationContext<'a> {
    /// Trust configuration
    pub config: &'a AuthenticationConfig,
    /// Shared signing key cache
    pub metadata: &'a Arc<OpenIdMetadataCache>,
    /// Source of valid app ids
    pub credentials: &'a dyn CredentialProvider,
    /// Channel the activity arrived on
    pub channel_id: Option<&'a str>,
    /// Service URL the activity names
    pub service_url: Option<&'a str>,
}

impl std::fmt::Debug for ValidationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationContext")
            .field("channel_id", &self.channel_id)
            .field("service_url", &self.service_url)
            .finish_non_exhaustive()
    }
}

/// The trust policy a token is checked under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenValidator {
    /// Tokens the Azure AD tenants issue to the local emulator
    Emulator,
    /// Tokens the channel service issues
    Channel,
}

impl TokenValidator {
    /// Pick the policy for `auth_header`.
    ///
    /// Only a bearer token whose unverified `iss` is an emulator issuer
    /// selects [`TokenValidator::Emulator`]. Anything else, including headers
    /// that cannot be decoded, goes to the channel policy, which rejects
    /// them itself.
    pub fn classify(auth_header: &str, config: &AuthenticationConfig) -> Self {
        let issuer = bearer_token(auth_header)
            .and_then(|token| unverified_issuer(token).ok().flatten());

        let validator = match issuer {
            Some(issuer) if config.is_emulator_issuer(&issuer) => Self::Emulator,
            _ => Self::Channel,
        };
        debug!(validator = ?validator, "Classified token");
        validator
    }

    /// Run this policy.
    ///
    /// `Ok(None)` when the header carries no identity this policy accepts.
    ///
    /// # Errors
    ///
    /// Extraction errors, or [`AuthError::ClaimRejected`](crate::AuthError::ClaimRejected)
    /// when a verified token breaks the policy's claim rules.
    pub async fn validate(
        self,
        auth_header: &str,
        context: &ValidationContext<'_>,
    ) -> Result<Option<ClaimsIdentity>> {
        match self {
            Self::Emulator => emulator::authenticate(auth_header, context).await,
            Self::Channel => channel::authenticate(auth_header, context).await,
        }
    }
}
