//! Bearer header to verified identity.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use jsonwebtoken::{Algorithm, Validation, decode};
use serde_json::Value;
use tracing::{debug, warn};

use super::metadata::OpenIdMetadataCache;
use super::{
    BEARER_SCHEME, decode_unverified_header, parse_authorization_header, unverified_issuer,
};
use crate::claims::ClaimsIdentity;
use crate::error::{AuthError, Result};
use crate::options::VerifyOptions;

/// Predicate over a signing key's endorsement list.
pub type EndorsementValidator = Arc<dyn Fn(&[String]) -> bool + Send + Sync>;

/// Endorsement predicate requiring the key to be endorsed for `channel_id`.
///
/// With no channel id every key passes.
pub fn require_channel_endorsement(channel_id: Option<&str>) -> EndorsementValidator {
    match channel_id.map(str::trim).filter(|id| !id.is_empty()) {
        None => Arc::new(|_: &[String]| true),
        Some(channel_id) => {
            let channel_id = channel_id.to_string();
            Arc::new(move |endorsements: &[String]| {
                endorsements.iter().any(|e| e.trim() == channel_id)
            })
        }
    }
}

/// Turns an `Authorization` header into a [`ClaimsIdentity`] under one trust
/// policy.
///
/// `Ok(None)` means "no identity": the header is not a bearer header or the
/// token comes from an issuer this policy does not trust. Both are decided
/// before any network request. Every other failure is an error.
#[derive(Clone)]
pub struct JwtTokenExtractor {
    options: VerifyOptions,
    metadata_url: String,
    allowed_algorithms: Vec<Algorithm>,
    cache: Arc<OpenIdMetadataCache>,
    endorsement_validator: Option<EndorsementValidator>,
}

impl fmt::Debug for JwtTokenExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtTokenExtractor")
            .field("options", &self.options)
            .field("metadata_url", &self.metadata_url)
            .field("allowed_algorithms", &self.allowed_algorithms)
            .field("endorsement_validator", &self.endorsement_validator.is_some())
            .finish_non_exhaustive()
    }
}

impl JwtTokenExtractor {
    /// Create an extractor.
    pub fn new(
        options: VerifyOptions,
        metadata_url: impl Into<String>,
        allowed_algorithms: Vec<Algorithm>,
        cache: Arc<OpenIdMetadataCache>,
    ) -> Self {
        Self {
            options,
            metadata_url: metadata_url.into(),
            allowed_algorithms,
            cache,
            endorsement_validator: None,
        }
    }

    /// Check signing key endorsements with `validator`.
    pub fn with_endorsement_validator(mut self, validator: EndorsementValidator) -> Self {
        self.endorsement_validator = Some(validator);
        self
    }

    /// Verification rules in use.
    pub fn options(&self) -> &VerifyOptions {
        &self.options
    }

    /// Metadata document the signing keys come from.
    pub fn metadata_url(&self) -> &str {
        &self.metadata_url
    }

    /// Identity from a raw `Authorization` header value.
    ///
    /// # Errors
    ///
    /// See [`get_identity`](Self::get_identity).
    pub async fn get_identity_from_auth_header(
        &self,
        header: &str,
    ) -> Result<Option<ClaimsIdentity>> {
        match parse_authorization_header(header) {
            Some((scheme, token)) => self.get_identity(scheme, token).await,
            None => {
                debug!("Authorization header is not a two-part credential");
                Ok(None)
            }
        }
    }

    /// Identity from an already split scheme and token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MalformedToken`] if the token cannot be decoded or has
    ///   no `kid`
    /// - [`AuthError::DisallowedAlgorithm`] if `alg` is not allowed
    /// - [`AuthError::KeyNotFound`] / [`AuthError::MetadataFetch`] from key
    ///   lookup
    /// - [`AuthError::EndorsementFailure`] if the key is not endorsed
    /// - [`AuthError::InvalidToken`] on bad signature, expiry, issuer or
    ///   audience
    pub async fn get_identity(&self, scheme: &str, token: &str) -> Result<Option<ClaimsIdentity>> {
        if scheme != BEARER_SCHEME || token.is_empty() {
            debug!(scheme, "Not a bearer credential");
            return Ok(None);
        }

        // Trust decision on unverified claims, before any network request
        let Some(issuer) = unverified_issuer(token)? else {
            debug!("Token has no issuer");
            return Ok(None);
        };
        if !self.options.is_trusted_issuer(&issuer) {
            debug!(issuer = %issuer, "Issuer not trusted by this policy");
            return Ok(None);
        }

        let header = decode_unverified_header(token)?;
        let algorithm = self.allowed_algorithm(&header.alg)?;
        let key_id = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| AuthError::MalformedToken("token header has no kid".to_string()))?;

        let key = self
            .cache
            .get_signing_key(&self.metadata_url, &key_id)
            .await?;

        if let Some(validator) = &self.endorsement_validator
            && !validator(key.endorsements.as_slice())
        {
            warn!(key_id = %key_id, endorsements = ?key.endorsements, "Endorsement validation failed");
            return Err(AuthError::EndorsementFailure(key_id));
        }

        let token_data = decode::<HashMap<String, Value>>(
            token,
            &key.decoding_key,
            &self.validation(algorithm),
        )
        .map_err(|e| {
            warn!(error = %e, issuer = %issuer, key_id = %key_id, "JWT validation failed");
            AuthError::InvalidToken(e)
        })?;

        debug!(issuer = %issuer, key_id = %key_id, algorithm = ?algorithm, "JWT validation successful");

        Ok(Some(ClaimsIdentity::new(token_data.claims, true)))
    }

    fn allowed_algorithm(&self, alg: &str) -> Result<Algorithm> {
        alg.parse::<Algorithm>()
            .ok()
            .filter(|algorithm| self.allowed_algorithms.contains(algorithm))
            .ok_or_else(|| {
                warn!(algorithm = alg, allowed = ?self.allowed_algorithms, "JWT algorithm not allowed");
                AuthError::DisallowedAlgorithm(alg.to_string())
            })
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.options.clock_tolerance().as_secs();
        validation.validate_nbf = true;
        validation.set_issuer(self.options.issuers());
        match self.options.audience() {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if self.options.ignore_expiration() {
            validation.validate_exp = false;
            validation.required_spec_claims.remove("exp");
        }
        validation
    }
}
