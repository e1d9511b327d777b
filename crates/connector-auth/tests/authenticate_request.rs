//! End-to-end request authentication
//!
//! Tests cover:
//! - Anonymous and required-auth paths without a header
//! - Channel tokens: success, expiry, service URL and endorsement rules
//! - Emulator tokens (v1.0 and v2.0)
//! - Key rotation between requests, and rate-limited refreshes for unknown key ids
//! - Concurrent validations sharing one cache
//! - The full HTTP path against a mock identity provider

mod common;

use std::sync::Arc;

use common::{
    APP_ID, APP_PASSWORD, CHANNEL_ID, CHANNEL_JWKS_URL, KEY_A, KEY_B, ManualClock,
    MockIdentityProvider, MockTransport, SERVICE_URL, authenticator, authenticator_with_clock,
    channel_claims, emulator_claims,
};
use connector_auth::{
    AuthError, AuthenticationConfig, Authenticator, CHANNEL_OPENID_METADATA_URL,
    DEFAULT_MIN_KEY_REFRESH_INTERVAL, EMULATOR_OPENID_METADATA_URL, InboundActivity,
    SimpleCredentialProvider, TokenValidator,
};
use jsonwebtoken::Algorithm;
use serde_json::json;

fn activity() -> InboundActivity {
    InboundActivity::new("message", SERVICE_URL, CHANNEL_ID)
}

fn registered_bot() -> SimpleCredentialProvider {
    SimpleCredentialProvider::new(APP_ID, APP_PASSWORD)
}

fn default_transport() -> Arc<MockTransport> {
    MockTransport::bot_framework(vec![KEY_A.jwk(&[CHANNEL_ID, "webchat"])], vec![KEY_B.jwk(&[])])
}

// Scenario A
#[tokio::test]
async fn test_auth_disabled_without_header_is_anonymous() {
    let transport = default_transport();
    let auth = authenticator(&transport);
    let open_bot = SimpleCredentialProvider::new("", "");

    let identity = auth
        .authenticate_request(&activity(), None, &open_bot)
        .await
        .unwrap();

    assert!(identity.is_authenticated());
    assert!(identity.claims().is_empty());
    assert_eq!(transport.total_requests(), 0);
}

// Scenario B
#[tokio::test]
async fn test_auth_required_without_header_is_unauthorized() {
    let transport = default_transport();
    let auth = authenticator(&transport);

    let err = auth
        .authenticate_request(&activity(), None, &registered_bot())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::NoCredentialSupplied));
    assert!(err.is_credential_missing());
}

// Scenario C
#[tokio::test]
async fn test_valid_channel_token_authenticates() {
    let transport = default_transport();
    let auth = authenticator(&transport);
    let claims = channel_claims(3600);

    let identity = auth
        .authenticate_request(&activity(), Some(&KEY_A.bearer(&claims)), &registered_bot())
        .await
        .unwrap();

    assert!(identity.is_authenticated());
    assert_eq!(identity.app_id(), Some(APP_ID));
    for (name, value) in claims.as_object().unwrap() {
        assert_eq!(identity.claim(name), Some(value), "claim {name}");
    }
    assert!(auth.trusted_service_urls().is_trusted(APP_ID, SERVICE_URL));
    assert_eq!(transport.requests_to(CHANNEL_JWKS_URL), 1);
}

// Scenario D
#[tokio::test]
async fn test_expired_channel_token_is_hard_failure() {
    let transport = default_transport();
    let auth = authenticator(&transport);

    let err = auth
        .authenticate_request(
            &activity(),
            Some(&KEY_A.bearer(&channel_claims(-3600))),
            &registered_bot(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidToken(_)));
    assert!(err.is_hard_failure());
    assert!(auth.trusted_service_urls().is_empty());
}

#[tokio::test]
async fn test_token_for_another_bot_is_rejected() {
    let transport = default_transport();
    let auth = authenticator(&transport);
    let mut claims = channel_claims(3600);
    claims["aud"] = json!("another-bot");

    let err = auth
        .authenticate_request(&activity(), Some(&KEY_A.bearer(&claims)), &registered_bot())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::ClaimRejected(_)));
}

#[tokio::test]
async fn test_token_replayed_against_other_service_url_is_rejected() {
    let transport = default_transport();
    let auth = authenticator(&transport);
    let other = InboundActivity::new("message", "https://attacker.example.com/", CHANNEL_ID);

    let err = auth
        .authenticate_request(
            &other,
            Some(&KEY_A.bearer(&channel_claims(3600))),
            &registered_bot(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::ClaimRejected(_)));
    assert!(!auth.trusted_service_urls().is_trusted(APP_ID, "https://attacker.example.com/"));
}

#[tokio::test]
async fn test_key_not_endorsed_for_channel_is_rejected() {
    let transport = default_transport();
    let auth = authenticator(&transport);
    let slack = InboundActivity::new("message", SERVICE_URL, "slack");

    let err = auth
        .authenticate_request(&slack, Some(&KEY_A.bearer(&channel_claims(3600))), &registered_bot())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::EndorsementFailure(_)));
}

#[tokio::test]
async fn test_emulator_tokens_authenticate() {
    let transport = default_transport();
    let auth = authenticator(&transport);
    let emulator = InboundActivity::new("message", "http://localhost:50000", "emulator");

    for version in ["1.0", "2.0"] {
        let header = KEY_B.bearer(&emulator_claims(version));
        assert_eq!(
            TokenValidator::classify(&header, auth.config()),
            TokenValidator::Emulator
        );

        let identity = auth
            .authenticate_request(&emulator, Some(&header), &registered_bot())
            .await
            .unwrap_or_else(|e| panic!("version {version}: {e}"));
        assert_eq!(identity.app_id(), Some(APP_ID));

        let credentials = auth
            .outbound_credentials(&identity, &registered_bot())
            .await
            .unwrap();
        assert_eq!(credentials.app_id(), APP_ID);
    }

    assert!(auth.trusted_service_urls().is_trusted(APP_ID, "http://localhost:50000"));
    assert!(
        !auth
            .trusted_service_urls()
            .is_trusted("https://api.botframework.com", "http://localhost:50000")
    );
    assert_eq!(auth.trusted_service_urls().len(), 1);
    assert_eq!(transport.requests_to(EMULATOR_OPENID_METADATA_URL), 1);
    assert_eq!(transport.requests_to(CHANNEL_OPENID_METADATA_URL), 0);
}

#[tokio::test]
async fn test_emulator_token_with_unknown_version_is_rejected() {
    let transport = default_transport();
    let auth = authenticator(&transport);
    let mut claims = emulator_claims("1.0");
    claims["ver"] = json!("9.9");

    let err = auth
        .authenticate_request(&activity(), Some(&KEY_B.bearer(&claims)), &registered_bot())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::ClaimRejected(_)));
}

#[tokio::test]
async fn test_emulator_key_cannot_sign_channel_tokens() {
    let transport = default_transport();
    let auth = authenticator(&transport);
    // Channel issuer, but signed with a key only the emulator metadata lists
    let header = KEY_B.bearer(&channel_claims(3600));

    let err = auth
        .authenticate_request(&activity(), Some(&header), &registered_bot())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::KeyNotFound(_)));
}

#[tokio::test]
async fn test_rotated_key_accepted_after_refresh() {
    let transport = MockTransport::bot_framework(vec![KEY_A.jwk(&[CHANNEL_ID])], vec![]);
    let clock = ManualClock::new();
    let auth = authenticator_with_clock(&transport, &clock);
    let header = KEY_B.bearer(&channel_claims(3600));

    // Warm the cache with A only
    auth.authenticate_request(&activity(), Some(&KEY_A.bearer(&channel_claims(3600))), &registered_bot())
        .await
        .unwrap();
    clock.advance(DEFAULT_MIN_KEY_REFRESH_INTERVAL);

    let err = auth
        .authenticate_request(&activity(), Some(&header), &registered_bot())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::KeyNotFound(_)));
    let after_miss = transport.requests_to(CHANNEL_JWKS_URL);
    assert_eq!(after_miss, 2);

    transport.set_keys(CHANNEL_JWKS_URL, vec![KEY_A.jwk(&[CHANNEL_ID]), KEY_B.jwk(&[CHANNEL_ID])]);
    clock.advance(DEFAULT_MIN_KEY_REFRESH_INTERVAL);

    auth.authenticate_request(&activity(), Some(&header), &registered_bot())
        .await
        .unwrap();
    assert_eq!(transport.requests_to(CHANNEL_JWKS_URL), after_miss + 1);
}

#[tokio::test]
async fn test_forged_key_ids_do_not_refetch_keys() {
    let transport = default_transport();
    let clock = ManualClock::new();
    let auth = authenticator_with_clock(&transport, &clock);

    auth.authenticate_request(&activity(), Some(&KEY_A.bearer(&channel_claims(3600))), &registered_bot())
        .await
        .unwrap();
    let warm = transport.total_requests();

    for i in 0..20 {
        let token = KEY_A.sign_with(Algorithm::RS256, &format!("forged-{i}"), &channel_claims(3600));
        let err = auth
            .authenticate_request(&activity(), Some(&format!("Bearer {token}")), &registered_bot())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::KeyNotFound(_)));
    }
    assert_eq!(transport.total_requests(), warm);

    // A key published later is still picked up once the interval has passed
    transport.set_keys(CHANNEL_JWKS_URL, vec![KEY_A.jwk(&[CHANNEL_ID]), KEY_B.jwk(&[CHANNEL_ID])]);
    clock.advance(DEFAULT_MIN_KEY_REFRESH_INTERVAL);
    auth.authenticate_request(&activity(), Some(&KEY_B.bearer(&channel_claims(3600))), &registered_bot())
        .await
        .unwrap();
    assert_eq!(transport.total_requests(), warm + 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_cache() {
    let transport = default_transport();
    let auth = authenticator(&transport);
    let header = Arc::new(KEY_A.bearer(&channel_claims(3600)));

    // Warm up so the refresh count below is exact
    auth.authenticate_request(&activity(), Some(header.as_str()), &registered_bot())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..50 {
        let auth = auth.clone();
        let header = Arc::clone(&header);
        handles.push(tokio::spawn(async move {
            auth.authenticate_request(&activity(), Some(header.as_str()), &registered_bot())
                .await
        }));
    }

    let mut identities = Vec::new();
    for handle in handles {
        identities.push(handle.await.unwrap().unwrap());
    }

    assert!(identities.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(transport.requests_to(CHANNEL_JWKS_URL), 1);
    assert_eq!(auth.trusted_service_urls().len(), 1);
}

#[tokio::test]
async fn test_full_http_path_against_mock_identity_provider() {
    let idp = MockIdentityProvider::start().await;
    idp.publish(vec![KEY_A.jwk(&[CHANNEL_ID])]).await;

    let config = AuthenticationConfig {
        channel_metadata_url: idp.metadata_url(),
        ..Default::default()
    };
    let auth = Authenticator::new(config).unwrap();

    let identity = auth
        .authenticate_request(&activity(), Some(&KEY_A.bearer(&channel_claims(3600))), &registered_bot())
        .await
        .unwrap();
    assert_eq!(identity.app_id(), Some(APP_ID));

    let credentials = auth.outbound_credentials(&identity, &registered_bot()).await.unwrap();
    assert_eq!(credentials.app_id(), APP_ID);
}
