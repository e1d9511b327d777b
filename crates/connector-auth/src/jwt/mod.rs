//! JWT infrastructure shared by the channel and emulator policies.
//!
//! # Architecture
//!
//! ```text
//! Authorization: Bearer <jwt>
//!          │
//!          ▼
//! ┌──────────────────────────┐   unverified: iss, alg, kid
//! │     JwtTokenExtractor    │───────────────────────────────┐
//! └──────────────────────────┘                               │
//!          │ kid                                             │
//!          ▼                                                 ▼
//! ┌──────────────────────────┐          ┌─────────────────────────────┐
//! │   OpenIdMetadataCache    │──fetch──▶│  MetadataTransport (HTTP)   │
//! │  (per metadata URL)      │          │  metadata doc → JWKS doc    │
//! └──────────────────────────┘          └─────────────────────────────┘
//!          │ public key + endorsements
//!          ▼
//!   signature / issuer / audience / expiry → ClaimsIdentity
//! ```
//!
//! Tokens are read twice on purpose. The first pass decodes header and
//! payload without checking the signature, only to decide whether the issuer
//! is trusted at all and which key to fetch. Nothing from that pass is
//! returned to callers.
//!
//! # Modules
//!
//! - `extractor` - bearer header → verified [`ClaimsIdentity`](crate::ClaimsIdentity)
//! - `metadata` - signing key discovery and caching
//! - `transport` - HTTP retrieval of metadata documents

pub mod extractor;
pub mod metadata;
pub mod transport;

pub use extractor::{EndorsementValidator, JwtTokenExtractor, require_channel_endorsement};
pub use metadata::{OpenIdMetadataCache, ResolvedKey, SigningKey};
pub use transport::{HttpTransport, MetadataTransport};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::claims::ISSUER_CLAIM;
use crate::error::{AuthError, Result};

/// The only accepted authorization scheme.
pub const BEARER_SCHEME: &str = "Bearer";

/// Split an `Authorization` header value into scheme and credential.
///
/// The value must be exactly two space-separated parts.
pub fn parse_authorization_header(header: &str) -> Option<(&str, &str)> {
    let mut parts = header.split(' ');
    let scheme = parts.next()?;
    let credential = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((scheme, credential))
}

/// The token of a `Bearer <token>` header, if the header has that shape.
pub fn bearer_token(header: &str) -> Option<&str> {
    parse_authorization_header(header)
        .filter(|(scheme, token)| *scheme == BEARER_SCHEME && !token.is_empty())
        .map(|(_, token)| token)
}

/// JOSE header fields read before verification.
///
/// `alg` stays a string so `none` and unknown names reach the allow-list
/// check instead of failing as a parse error.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UnverifiedHeader {
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
}

/// Decode the JOSE header without verifying the signature.
pub(crate) fn decode_unverified_header(token: &str) -> Result<UnverifiedHeader> {
    let (header, _, _) = split_compact(token)?;
    decode_segment(header, "header")
}

/// Decode the payload claims without verifying the signature.
pub(crate) fn decode_unverified_claims(token: &str) -> Result<Map<String, Value>> {
    let (_, payload, _) = split_compact(token)?;
    decode_segment(payload, "payload")
}

/// The unverified `iss` claim, if the token has one.
///
/// # Errors
///
/// Returns [`AuthError::MalformedToken`] if the token is not a decodable
/// compact JWS.
pub fn unverified_issuer(token: &str) -> Result<Option<String>> {
    let claims = decode_unverified_claims(token)?;
    Ok(claims
        .get(ISSUER_CLAIM)
        .and_then(Value::as_str)
        .map(ToString::to_string))
}

fn split_compact(token: &str) -> Result<(&str, &str, &str)> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok((header, payload, signature)),
        _ => Err(AuthError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        )),
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str, name: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::MalformedToken(format!("invalid {name} encoding: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("invalid {name} JSON: {e}")))
}
