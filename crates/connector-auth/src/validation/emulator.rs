//! Emulator policy.
//!
//! The emulator signs in against Azure AD, so tokens come from one of the
//! emulator issuers and carry the bot's app id in `appid` (token version
//! 1.0) or `azp` (version 2.0). Azure AD keys carry no endorsements, so
//! none are checked.

use std::sync::Arc;

use tracing::warn;

use super::ValidationContext;
use crate::claims::{APP_ID_CLAIM, AUTHORIZED_PARTY_CLAIM, ClaimsIdentity, VERSION_CLAIM};
use crate::credentials::CredentialProvider;
use crate::error::{AuthError, Result};
use crate::jwt::JwtTokenExtractor;

/// Extract and check an emulator token.
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
        context.config.emulator_verify_options(),
        context.config.emulator_metadata_url.clone(),
        context.config.allowed_algorithms.clone(),
        Arc::clone(context.metadata),
    );

    let Some(identity) = extractor.get_identity_from_auth_header(auth_header).await? else {
        return Ok(None);
    };

    validate_identity(&identity, context.credentials).await?;
    Ok(Some(identity))
}

/// Emulator claim rules on an already verified identity.
///
/// # Errors
///
/// [`AuthError::ClaimRejected`] if the version claim is missing or unknown,
/// the app id claim for that version is missing, or the app id is not
/// accepted by `credentials`.
pub async fn validate_identity(
    identity: &ClaimsIdentity,
    credentials: &dyn CredentialProvider,
) -> Result<()> {
    if !identity.is_authenticated() {
        return Err(reject("identity is not authenticated"));
    }

    let version = identity
        .claim_str(VERSION_CLAIM)
        .ok_or_else(|| reject("token has no version claim"))?;

    let app_id_claim = match version {
        "1.0" => APP_ID_CLAIM,
        "2.0" => AUTHORIZED_PARTY_CLAIM,
        other => return Err(reject(format!("unknown token version '{other}'"))),
    };

    let app_id = identity
        .claim_str(app_id_claim)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| reject(format!("version {version} token has no '{app_id_claim}' claim")))?;

    if !credentials.is_valid_app_id(app_id).await {
        return Err(reject(format!("'{app_id}' is not a valid app id")));
    }

    Ok(())
}

fn reject(reason: impl Into<String>) -> AuthError {
    let reason = reason.into();
    warn!(reason = %reason, "Emulator token rejected");
    AuthError::ClaimRejected(reason)
}
