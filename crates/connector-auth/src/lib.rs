//! # Connector Auth - Inbound Bot Request Authentication
//!
//! Validates the bearer tokens that bot channels and the local emulator
//! attach to inbound activities, and turns them into a verified
//! [`ClaimsIdentity`].
//!
//! ## Design Principles
//!
//! - **Decide trust before work**: the unverified issuer is checked first, so
//!   tokens from unknown issuers never cause a network request
//! - **Fail closed**: only an explicit "authentication disabled" answer from
//!   the [`CredentialProvider`] yields an anonymous identity
//! - **Two fixed policies**: [`TokenValidator::Emulator`] and
//!   [`TokenValidator::Channel`], chosen by a pure classification
//! - **Owned, injectable cache**: signing keys live in an
//!   [`OpenIdMetadataCache`] with pluggable transport and clock
//!
//! ## Architecture
//!
//! - [`authenticator`] - `authenticate_request` entry point
//! - [`validation`] - policy classification and per-policy claim rules
//! - [`jwt`] - bearer parsing, token extraction, key discovery and caching
//! - [`config`] - trust configuration and Bot Framework defaults
//! - [`credentials`] - credential provider capability and app credentials
//! - [`trust`] - service URLs trusted after authentication
//! - [`error`] - the [`AuthError`] taxonomy
//!
//! ## Quick Start
//!
//! ```rust
//! use connector_auth::{AuthError, Authenticator, AuthenticationConfig, InboundActivity, SimpleCredentialProvider};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> connector_auth::Result<()> {
//! let authenticator = Authenticator::new(AuthenticationConfig::default())?;
//! let activity = InboundActivity::new("message", "https://smba.trafficmanager.net/teams/", "msteams");
//!
//! // A bot without an app id runs unauthenticated
//! let open = SimpleCredentialProvider::new("", "");
//! let identity = authenticator.authenticate_request(&activity, None, &open).await?;
//! assert!(identity.is_authenticated() && identity.claims().is_empty());
//!
//! // A registered bot requires a token
//! let registered = SimpleCredentialProvider::new("my-app-id", "my-app-password");
//! let err = authenticator
//!     .authenticate_request(&activity, None, &registered)
//!     .await
//!     .unwrap_err();
//! assert!(matches!(err, AuthError::NoCredentialSupplied));
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod authenticator;
pub mod claims;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod jwt;
pub mod options;
pub mod trust;
pub mod validation;

#[doc(inline)]
pub use activity::InboundActivity;
#[doc(inline)]
pub use authenticator::Authenticator;
#[doc(inline)]
pub use claims::ClaimsIdentity;
#[doc(inline)]
pub use clock::{Clock, SystemClock};
#[doc(inline)]
pub use config::*;
#[doc(inline)]
pub use credentials::{AppCredentialCache, AppCredentials, CredentialProvider, SimpleCredentialProvider};
#[doc(inline)]
pub use error::{AuthError, Result};
#[doc(inline)]
pub use jwt::{
    EndorsementValidator, HttpTransport, JwtTokenExtractor, MetadataTransport,
    OpenIdMetadataCache, ResolvedKey, SigningKey,
};
#[doc(inline)]
pub use options::VerifyOptions;
#[doc(inline)]
pub use trust::TrustedServiceUrls;
#[doc(inline)]
pub use validation::TokenValidator;
