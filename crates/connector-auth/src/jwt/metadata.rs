//! Signing key discovery and caching
//!
//! Keys are discovered in two steps: the OpenID metadata document names a
//! `jwks_uri`, and that document lists the keys. The cache keeps one entry
//! per metadata URL:
//!
//! - **Freshness window**: keys older than the refresh interval (default
//!   5 days) are re-fetched before use
//! - **Refresh on miss**: an unknown `kid` forces one refresh and one retry,
//!   so rotated keys are picked up without waiting for the window. At most
//!   one such refresh runs per minimum refresh interval (default 30
//!   seconds); misses inside it answer `KeyNotFound` from the cache
//! - **Snapshot swap**: each refresh builds a complete key list and swaps it
//!   in atomically; readers see the old list or the new one, never a mix
//! - **Failure keeps state**: a failed refresh surfaces an error for the
//!   current call and leaves the previous keys in place
//!
//! No lock is held while a request is in flight.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::{ArcSwap, ArcSwapOption};
use dashmap::DashMap;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::Jwk;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::transport::MetadataTransport;
use crate::clock::{Clock, SystemClock};
use crate::config::{DEFAULT_KEY_REFRESH_INTERVAL, DEFAULT_MIN_KEY_REFRESH_INTERVAL};
use crate::error::{AuthError, Result};

/// A published signing key.
#[derive(Debug, Clone)]
pub struct SigningKey {
    key_id: String,
    jwk: Jwk,
    endorsements: Vec<String>,
}

impl SigningKey {
    /// Parse one entry of a JWKS `keys` array.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MetadataFetch`] tagged with `source_url` if the
    /// entry has no `kid`, a non-list `endorsements` or is not a JWK.
    pub fn from_jwk_value(source_url: &str, value: &Value) -> Result<Self> {
        let key_id = value
            .get("kid")
            .and_then(Value::as_str)
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| AuthError::metadata_fetch(source_url, "key without kid"))?
            .to_string();

        let endorsements = match value.get("endorsements") {
            None | Some(Value::Null) => Vec::new(),
            Some(list) => serde_json::from_value(list.clone()).map_err(|e| {
                AuthError::metadata_fetch(
                    source_url,
                    format!("key '{key_id}' has invalid endorsements: {e}"),
                )
            })?,
        };

        let jwk: Jwk = serde_json::from_value(value.clone()).map_err(|e| {
            AuthError::metadata_fetch(source_url, format!("key '{key_id}' is not a valid JWK: {e}"))
        })?;

        Ok(Self {
            key_id,
            jwk,
            endorsements,
        })
    }

    /// Key id (`kid`).
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Channels this key may assert.
    pub fn endorsements(&self) -> &[String] {
        &self.endorsements
    }

    /// The key in JWK form.
    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    /// Convert the JWK into a verification key.
    ///
    /// A published key whose material cannot be used verifies nothing, so it
    /// is reported as [`AuthError::KeyNotFound`].
    fn resolve(&self, metadata_url: &str) -> Result<ResolvedKey> {
        let decoding_key = DecodingKey::from_jwk(&self.jwk).map_err(|e| {
            warn!(metadata_url, key_id = %self.key_id, error = %e, "Unusable key material");
            AuthError::KeyNotFound(self.key_id.clone())
        })?;
        Ok(ResolvedKey {
            key_id: self.key_id.clone(),
            decoding_key,
            endorsements: self.endorsements.clone(),
        })
    }
}

/// A signing key ready for signature verification.
#[derive(Clone)]
pub struct ResolvedKey {
    /// Key id (`kid`)
    pub key_id: String,
    /// Public key used to verify signatures
    pub decoding_key: DecodingKey,
    /// Channels this key may assert
    pub endorsements: Vec<String>,
}

impl fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedKey")
            .field("key_id", &self.key_id)
            .field("endorsements", &self.endorsements)
            .finish_non_exhaustive()
    }
}

/// Immutable key list as of one refresh.
#[derive(Debug, Default)]
struct KeySnapshot {
    keys: Vec<SigningKey>,
    refreshed_at: Option<SystemTime>,
}

impl KeySnapshot {
    fn is_stale(&self, now: SystemTime, refresh_interval: Duration) -> bool {
        match self.refreshed_at {
            None => true,
            Some(at) => match now.duration_since(at) {
                Ok(age) => age > refresh_interval,
                Err(_) => true, // Clock went backwards, refresh
            },
        }
    }

    fn find(&self, key_id: &str) -> Option<&SigningKey> {
        self.keys.iter().find(|key| key.key_id == key_id)
    }
}

#[derive(Debug)]
struct MetadataEntry {
    url: String,
    snapshot: ArcSwap<KeySnapshot>,
    // Start of the latest refresh, successful or not
    last_attempt: ArcSwapOption<SystemTime>,
}

/// The one field of the OpenID metadata document the cache needs.
#[derive(Debug, Deserialize)]
struct OpenIdConfiguration {
    jwks_uri: String,
}

/// Process-wide signing key cache, keyed by metadata URL.
///
/// Share one instance (behind an `Arc`) across every validator so each
/// metadata URL is fetched once, not once per request.
///
/// # Example
///
/// ```rust,no_run
/// # use connector_auth::jwt::{HttpTransport, OpenIdMetadataCache};
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # async fn example() -> connector_auth::Result<()> {
/// let transport = HttpTransport::new(Duration::from_secs(10))?;
/// let cache = OpenIdMetadataCache::new(Arc::new(transport));
///
/// let key = cache
///     .get_signing_key(
///         "https://login.botframework.com/v1/.well-known/openidconfiguration",
///         "key-id-123",
///     )
///     .await?;
/// println!("endorsed for {:?}", key.endorsements);
/// # Ok(())
/// # }
/// ```
pub struct OpenIdMetadataCache {
    entries: DashMap<String, Arc<MetadataEntry>>,
    transport: Arc<dyn MetadataTransport>,
    clock: Arc<dyn Clock>,
    refresh_interval: Duration,
    min_refresh_interval: Duration,
}

impl fmt::Debug for OpenIdMetadataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenIdMetadataCache")
            .field("entries", &self.entries.len())
            .field("transport", &self.transport)
            .field("clock", &self.clock)
            .field("refresh_interval", &self.refresh_interval)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .finish()
    }
}

impl OpenIdMetadataCache {
    /// Create a cache using wall-clock time and the default 5-day window.
    pub fn new(transport: Arc<dyn MetadataTransport>) -> Self {
        Self {
            entries: DashMap::new(),
            transport,
            clock: Arc::new(SystemClock),
            refresh_interval: DEFAULT_KEY_REFRESH_INTERVAL,
            min_refresh_interval: DEFAULT_MIN_KEY_REFRESH_INTERVAL,
        }
    }

    /// Use a different time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a different freshness window.
    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    /// Limit how often an unknown key id may force a refresh.
    pub fn with_min_refresh_interval(mut self, min_refresh_interval: Duration) -> Self {
        self.min_refresh_interval = min_refresh_interval;
        self
    }

    /// Freshness window.
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Minimum gap between refreshes forced by an unknown key id.
    pub fn min_refresh_interval(&self) -> Duration {
        self.min_refresh_interval
    }

    /// Look up the signing key `key_id` published under `metadata_url`.
    ///
    /// Refreshes first when the cached keys are stale. When the keys looked
    /// fresh but `key_id` is missing, refreshes once more and retries, unless
    /// a refresh started less than the minimum refresh interval ago.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MetadataFetch`] if a needed refresh fails
    /// - [`AuthError::KeyNotFound`] if no usable key matches after a refresh,
    ///   or within the minimum refresh interval of the last one
    pub async fn get_signing_key(&self, metadata_url: &str, key_id: &str) -> Result<ResolvedKey> {
        let entry = self.entry(metadata_url);

        let mut snapshot = entry.snapshot.load_full();
        let mut refreshed = false;
        if snapshot.is_stale(self.clock.now(), self.refresh_interval) {
            debug!(metadata_url, "Signing keys stale or missing, refreshing");
            snapshot = self.refresh_entry(&entry).await?;
            refreshed = true;
        }

        if let Some(key) = snapshot.find(key_id) {
            debug!(metadata_url, key_id, "Using cached signing key");
            return key.resolve(metadata_url);
        }

        if !refreshed {
            if self.miss_refresh_throttled(&entry) {
                warn!(metadata_url, key_id, "Key id not cached, refresh rate limited");
                return Err(AuthError::KeyNotFound(key_id.to_string()));
            }

            debug!(metadata_url, key_id, "Key id not cached, refreshing for key rotation");
            snapshot = self.refresh_entry(&entry).await?;
            if let Some(key) = snapshot.find(key_id) {
                return key.resolve(metadata_url);
            }
        }

        warn!(metadata_url, key_id, "No signing key matches key id");
        Err(AuthError::KeyNotFound(key_id.to_string()))
    }

    /// Fetch the keys for `metadata_url` now, regardless of age.
    ///
    /// Returns the number of usable keys.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MetadataFetch`] if either document cannot be
    /// retrieved or parsed; the previous keys stay cached.
    pub async fn refresh(&self, metadata_url: &str) -> Result<usize> {
        let entry = self.entry(metadata_url);
        Ok(self.refresh_entry(&entry).await?.keys.len())
    }

    /// Key ids currently cached for `metadata_url`.
    pub fn cached_key_ids(&self, metadata_url: &str) -> Vec<String> {
        self.entries
            .get(metadata_url)
            .map(|entry| {
                entry
                    .snapshot
                    .load()
                    .keys
                    .iter()
                    .map(|key| key.key_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// When `metadata_url` was last refreshed successfully.
    pub fn last_refreshed(&self, metadata_url: &str) -> Option<SystemTime> {
        self.entries
            .get(metadata_url)
            .and_then(|entry| entry.snapshot.load().refreshed_at)
    }

    fn entry(&self, metadata_url: &str) -> Arc<MetadataEntry> {
        if let Some(entry) = self.entries.get(metadata_url) {
            return Arc::clone(entry.value());
        }
        let entry = self
            .entries
            .entry(metadata_url.to_string())
            .or_insert_with(|| {
                Arc::new(MetadataEntry {
                    url: metadata_url.to_string(),
                    snapshot: ArcSwap::from_pointee(KeySnapshot::default()),
                    last_attempt: ArcSwapOption::empty(),
                })
            });
        Arc::clone(entry.value())
    }

    /// Whether a refresh started within the minimum refresh interval.
    fn miss_refresh_throttled(&self, entry: &MetadataEntry) -> bool {
        let Some(last) = entry.last_attempt.load_full() else {
            return false;
        };
        self.clock
            .now()
            .duration_since(*last)
            .is_ok_and(|since| since < self.min_refresh_interval)
    }

    async fn refresh_entry(&self, entry: &MetadataEntry) -> Result<Arc<KeySnapshot>> {
        info!(metadata_url = %entry.url, "Fetching OpenID metadata");
        entry.last_attempt.store(Some(Arc::new(self.clock.now())));

        let document = self.transport.get_json(&entry.url).await?;
        let configuration: OpenIdConfiguration =
            serde_json::from_value(document).map_err(|e| {
                AuthError::metadata_fetch(&entry.url, format!("invalid metadata document: {e}"))
            })?;

        let key_set = self.transport.get_json(&configuration.jwks_uri).await?;
        let keys = parse_key_set(&configuration.jwks_uri, &key_set)?;

        let snapshot = Arc::new(KeySnapshot {
            keys,
            refreshed_at: Some(self.clock.now()),
        });
        entry.snapshot.store(Arc::clone(&snapshot));

        info!(
            metadata_url = %entry.url,
            jwks_uri = %configuration.jwks_uri,
            key_count = snapshot.keys.len(),
            "Signing keys refreshed"
        );

        Ok(snapshot)
    }
}

/// Parse a JWKS document, skipping keys that cannot be used.
fn parse_key_set(jwks_uri: &str, document: &Value) -> Result<Vec<SigningKey>> {
    let entries = document
        .get("keys")
        .and_then(Value::as_array)
        .ok_or_else(|| AuthError::metadata_fetch(jwks_uri, "key set has no 'keys' array"))?;

    Ok(entries
        .iter()
        .filter_map(|value| match SigningKey::from_jwk_value(jwks_uri, value) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(jwks_uri, error = %e, "Skipping unusable key");
                None
            }
        })
        .collect())
}
