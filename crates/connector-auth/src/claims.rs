//! Verified identity produced by a successful authentication.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

/// Issuer claim
pub const ISSUER_CLAIM: &str = "iss";
/// Audience claim, carries the bot app id on channel tokens
pub const AUDIENCE_CLAIM: &str = "aud";
/// App id claim on v1.0 emulator tokens
pub const APP_ID_CLAIM: &str = "appid";
/// Authorized party claim, carries the app id on v2.0 emulator tokens
pub const AUTHORIZED_PARTY_CLAIM: &str = "azp";
/// Token version claim
pub const VERSION_CLAIM: &str = "ver";
/// Service URL the channel issued the token for
pub const SERVICE_URL_CLAIM: &str = "serviceurl";

/// A set of verified claims plus an authentication flag.
///
/// Built once per successful validation, or explicitly through
/// [`ClaimsIdentity::anonymous`] when the credential provider disabled
/// authentication. There are no mutating methods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimsIdentity {
    claims: HashMap<String, Value>,
    is_authenticated: bool,
}

impl ClaimsIdentity {
    /// Wrap decoded claims.
    pub fn new(claims: HashMap<String, Value>, is_authenticated: bool) -> Self {
        Self {
            claims,
            is_authenticated,
        }
    }

    /// Identity for the auth-disabled path: no claims, authenticated.
    pub fn anonymous() -> Self {
        Self::new(HashMap::new(), true)
    }

    /// All claims.
    pub fn claims(&self) -> &HashMap<String, Value> {
        &self.claims
    }

    /// Whether this identity passed authentication.
    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    /// True for the identity returned when authentication is disabled.
    pub fn is_anonymous(&self) -> bool {
        self.claims.is_empty()
    }

    /// Raw claim value.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Claim value when it is a JSON string.
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    /// The bot application id this identity speaks for.
    ///
    /// Follows the token version: `appid` for `ver` 1.0, `azp` for 2.0,
    /// `aud` otherwise. Emulator tokens put the resource, not the bot, in
    /// `aud`, so it is only a fallback for versioned tokens.
    pub fn app_id(&self) -> Option<&str> {
        let preferred = match self.claim_str(VERSION_CLAIM) {
            Some("1.0") => Some(APP_ID_CLAIM),
            Some("2.0") => Some(AUTHORIZED_PARTY_CLAIM),
            _ => None,
        };

        preferred
            .into_iter()
            .chain([AUDIENCE_CLAIM])
            .filter_map(|name| self.claim_str(name))
            .find(|value| !value.trim().is_empty())
    }
}
