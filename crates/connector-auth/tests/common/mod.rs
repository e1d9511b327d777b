//! Common test utilities for integration tests
//!
//! Signing keys, token minting, an in-memory metadata transport, a manual
//! clock and a wiremock identity provider.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use connector_auth::{
    AuthError, AuthenticationConfig, Authenticator, CHANNEL_OPENID_METADATA_URL,
    CHANNEL_TOKEN_ISSUER, Clock, EMULATOR_OPENID_METADATA_URL, EMULATOR_TOKEN_ISSUERS,
    MetadataTransport, OpenIdMetadataCache,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const CHANNEL_JWKS_URL: &str = "https://login.botframework.com/v1/.well-known/keys";
pub const EMULATOR_JWKS_URL: &str =
    "https://login.microsoftonline.com/botframework.com/discovery/v2.0/keys";

pub const APP_ID: &str = "bot-app-id";
pub const APP_PASSWORD: &str = "bot-app-password";
pub const SERVICE_URL: &str = "https://smba.trafficmanager.net/teams/";
pub const CHANNEL_ID: &str = "msteams";

/// RSA signing key with its public JWK parts
pub struct TestKey {
    pub kid: String,
    encoding_key: EncodingKey,
    n: String,
    e: String,
}

impl TestKey {
    /// Generate a fresh 2048-bit RSA key
    pub fn generate(kid: &str) -> Self {
        use rsa::pkcs8::{EncodePrivateKey, LineEnding};
        use rsa::traits::PublicKeyParts;
        use rsa::RsaPrivateKey;

        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("Failed to generate RSA key");
        let pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("Failed to encode private key");
        let public_key = private_key.to_public_key();

        Self {
            kid: kid.to_string(),
            encoding_key: EncodingKey::from_rsa_pem(pem.as_bytes()).expect("Invalid RSA key"),
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }
    }

    /// Public JWK as published in a key set
    pub fn jwk(&self, endorsements: &[&str]) -> Value {
        json!({
            "kty": "RSA",
            "use": "sig",
            "kid": self.kid,
            "n": self.n,
            "e": self.e,
            "endorsements": endorsements,
        })
    }

    /// RS256 token with this key's kid
    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with(Algorithm::RS256, &self.kid, claims)
    }

    /// Token with an explicit algorithm and kid
    pub fn sign_with(&self, algorithm: Algorithm, kid: &str, claims: &Value) -> String {
        let mut header = Header::new(algorithm);
        header.typ = Some("JWT".to_string());
        header.kid = Some(kid.to_string());
        encode(&header, claims, &self.encoding_key).expect("Failed to encode test JWT")
    }

    /// `Authorization` header value for `claims`
    pub fn bearer(&self, claims: &Value) -> String {
        format!("Bearer {}", self.sign(claims))
    }
}

/// Shared keys; generating RSA keys is slow
pub static KEY_A: LazyLock<TestKey> = LazyLock::new(|| TestKey::generate("key-a"));
pub static KEY_B: LazyLock<TestKey> = LazyLock::new(|| TestKey::generate("key-b"));

/// Get current Unix timestamp
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs()
}

/// Claims of a channel token for `APP_ID` and `SERVICE_URL`
pub fn channel_claims(exp_offset_secs: i64) -> Value {
    let now = current_timestamp();
    json!({
        "iss": CHANNEL_TOKEN_ISSUER,
        "aud": APP_ID,
        "serviceurl": SERVICE_URL,
        "exp": (now as i64 + exp_offset_secs) as u64,
        "nbf": now - 60,
        "iat": now - 60,
    })
}

/// Claims of an emulator token of `version` for `APP_ID`
pub fn emulator_claims(version: &str) -> Value {
    let now = current_timestamp();
    let mut claims = json!({
        "iss": EMULATOR_TOKEN_ISSUERS[1],
        "aud": "https://api.botframework.com",
        "ver": version,
        "exp": now + 3600,
        "nbf": now - 60,
        "iat": now - 60,
    });
    let app_id_claim = if version == "1.0" { "appid" } else { "azp" };
    claims[app_id_claim] = json!(APP_ID);
    claims
}

/// In-memory metadata transport with request accounting
#[derive(Debug, Default)]
pub struct MockTransport {
    documents: Mutex<HashMap<String, Value>>,
    requests: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transport serving both default Bot Framework metadata endpoints
    pub fn bot_framework(channel_keys: Vec<Value>, emulator_keys: Vec<Value>) -> Arc<Self> {
        let transport = Self::new();
        transport.publish(CHANNEL_OPENID_METADATA_URL, CHANNEL_JWKS_URL, channel_keys);
        transport.publish(EMULATOR_OPENID_METADATA_URL, EMULATOR_JWKS_URL, emulator_keys);
        transport
    }

    /// Serve a metadata document pointing at `jwks_url`, and the key set
    pub fn publish(&self, metadata_url: &str, jwks_url: &str, keys: Vec<Value>) {
        self.set(metadata_url, json!({ "issuer": "test", "jwks_uri": jwks_url }));
        self.set_keys(jwks_url, keys);
    }

    pub fn set_keys(&self, jwks_url: &str, keys: Vec<Value>) {
        self.set(jwks_url, json!({ "keys": keys }));
    }

    pub fn set(&self, url: &str, document: Value) {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), document);
    }

    /// Make `url` fail from now on
    pub fn fail(&self, url: &str) {
        self.documents.lock().unwrap().remove(url);
    }

    pub fn requests_to(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| *u == url)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl MetadataTransport for MockTransport {
    async fn get_json(&self, url: &str) -> connector_auth::Result<Value> {
        self.requests.lock().unwrap().push(url.to_string());
        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| AuthError::metadata_fetch(url, "endpoint returned status 503"))
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock(Mutex<SystemTime>);

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(SystemTime::now())))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.0.lock().unwrap()
    }
}

/// Metadata cache over `transport`
pub fn metadata_cache(transport: &Arc<MockTransport>) -> Arc<OpenIdMetadataCache> {
    Arc::new(OpenIdMetadataCache::new(
        Arc::clone(transport) as Arc<dyn MetadataTransport>
    ))
}

/// Authenticator with default trust policy over `transport`
pub fn authenticator(transport: &Arc<MockTransport>) -> Authenticator {
    Authenticator::with_metadata_cache(AuthenticationConfig::default(), metadata_cache(transport))
        .expect("default config is valid")
}

/// Authenticator whose key cache reads time from `clock`
pub fn authenticator_with_clock(
    transport: &Arc<MockTransport>,
    clock: &Arc<ManualClock>,
) -> Authenticator {
    let cache = OpenIdMetadataCache::new(Arc::clone(transport) as Arc<dyn MetadataTransport>)
        .with_clock(Arc::clone(clock) as Arc<dyn Clock>);
    Authenticator::with_metadata_cache(AuthenticationConfig::default(), Arc::new(cache))
        .expect("default config is valid")
}

/// Wiremock identity provider serving a metadata document and key set
pub struct MockIdentityProvider {
    pub server: MockServer,
}

impl MockIdentityProvider {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn metadata_url(&self) -> String {
        format!("{}/.well-known/openid-configuration", self.server.uri())
    }

    pub fn jwks_url(&self) -> String {
        format!("{}/keys", self.server.uri())
    }

    /// Replace whatever is mounted with `keys`
    pub async fn publish(&self, keys: Vec<Value>) {
        self.server.reset().await;
        self.mount_metadata().await;
        Mock::given(method("GET"))
            .and(path("/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .mount(&self.server)
            .await;
    }

    /// Key set endpoint answers 503 from now on
    pub async fn fail_keys(&self) {
        self.server.reset().await;
        self.mount_metadata().await;
        Mock::given(method("GET"))
            .and(path("/keys"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&self.server)
            .await;
    }

    async fn mount_metadata(&self) {
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": CHANNEL_TOKEN_ISSUER,
                "jwks_uri": self.jwks_url(),
                "id_token_signing_alg_values_supported": ["RS256"],
            })))
            .mount(&self.server)
            .await;
    }

    /// Requests received on `request_path` since the last reset
    pub async fn requests_to(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == request_path)
            .count()
    }
}
