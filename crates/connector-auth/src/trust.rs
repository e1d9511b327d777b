//! Service URLs trusted for outbound calls.
//!
//! After an inbound request authenticates, the bot may call back into the
//! service URL the activity named. The registry remembers that URL, per app
//! id, for the lifetime of the process so outbound clients can attach the
//! app's credentials without re-validating.

use dashmap::DashSet;
use tracing::{debug, warn};
use url::Url;

/// Process-lifetime registry of `(app id, service origin)` pairs.
#[derive(Debug, Default)]
pub struct TrustedServiceUrls {
    entries: DashSet<(String, String)>,
}

impl TrustedServiceUrls {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust `service_url` for `app_id`.
    ///
    /// Returns `false` if the URL cannot be parsed; nothing is recorded then.
    pub fn trust(&self, app_id: &str, service_url: &str) -> bool {
        let Some(origin) = origin_of(service_url) else {
            warn!(service_url, "Cannot trust unparsable service URL");
            return false;
        };
        if self.entries.insert((app_id.to_string(), origin)) {
            debug!(app_id, service_url, "Trusting service URL");
        }
        true
    }

    /// Whether `service_url` was trusted for `app_id`.
    pub fn is_trusted(&self, app_id: &str, service_url: &str) -> bool {
        origin_of(service_url)
            .is_some_and(|origin| self.entries.contains(&(app_id.to_string(), origin)))
    }

    /// Number of trusted pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is trusted yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Scheme, host and port of a URL; paths under one origin share trust.
fn origin_of(service_url: &str) -> Option<String> {
    let url = Url::parse(service_url.trim()).ok()?;
    url.host_str()?;
    Some(url.origin().ascii_serialization())
}
