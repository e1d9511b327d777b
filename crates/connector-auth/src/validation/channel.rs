//! Channel service policy.
//!
//! Tokens are signed with keys published under the channel metadata URL and
//! issued by the channel issuer. On top of signature verification:
//!
//! - the signing key must be endorsed for the activity's channel
//! - `aud` must name an app id the credential provider accepts
//! - when the caller knows the service URL, `serviceurl` must match it

use std::sync::Arc;

use tracing::warn;

use super::ValidationContext;
use crate::claims::{AUDIENCE_CLAIM, ClaimsIdentity, ISSUER_CLAIM, SERVICE_URL_CLAIM};
use crate::config::AuthenticationConfig;
use crate::credentials::CredentialProvider;
use crate::error::{AuthError, Result};
use crate::jwt::{JwtTokenExtractor, require_channel_endorsement};

/// Extract and check a channel token.
///
/// # Errors
///
/// Extraction errors, or [`AuthError::ClaimRejected`] from
/// [`validate_identity`].
pub async fn authenticate(
    auth_header: &str,
    context: &ValidationContext<'_>,
) -> Result<Option<ClaimsIdentity>> {
    let extractor = JwtTokenExtractor::new(
        context.config.channel_verify_options(),
        context.config.channel_metadata_url.clone(),
        context.config.allowed_algorithms.clone(),
        Arc::clone(context.metadata),
    )
    .with_endorsement_validator(require_channel_endorsement(context.channel_id));

    let Some(identity) = extractor.get_identity_from_auth_header(auth_header).await? else {
        return Ok(None);
    };

    validate_identity(
        &identity,
        context.config,
        context.credentials,
        context.service_url,
    )
    .await?;
    Ok(Some(identity))
}

/// Channel claim rules on an already verified identity.
///
/// # Errors
///
/// [`AuthError::ClaimRejected`] naming the first rule broken.
pub async fn validate_identity(
    identity: &ClaimsIdentity,
    config: &AuthenticationConfig,
    credentials: &dyn CredentialProvider,
    service_url: Option<&str>,
) -> Result<()> {
    if !identity.is_authenticated() {
        return Err(reject("identity is not authenticated"));
    }

    if identity.claim_str(ISSUER_CLAIM) != Some(config.channel_issuer.as_str()) {
        return Err(reject("token was not issued by the channel service"));
    }

    let app_id = identity
        .claim_str(AUDIENCE_CLAIM)
        .filter(|aud| !aud.trim().is_empty())
        .ok_or_else(|| reject("token has no audience"))?;

    if !credentials.is_valid_app_id(app_id).await {
        return Err(reject(format!("audience '{app_id}' is not a valid app id")));
    }

    if let Some(service_url) = service_url {
        match identity.claim_str(SERVICE_URL_CLAIM) {
            Some(claim) if claim == service_url => {}
            Some(claim) => {
                return Err(reject(format!(
                    "service URL claim '{claim}' does not match '{service_url}'"
                )));
            }
            None => return Err(reject("token has no service URL claim")),
        }
    }

    Ok(())
}

fn reject(reason: impl Into<String>) -> AuthError {
    let reason = reason.into();
    warn!(reason = %reason, "Channel token rejected");
    AuthError::ClaimRejected(reason)
}
