//! Token verification parameters.

use std::time::Duration;

/// Default clock skew tolerance (5 minutes)
pub const DEFAULT_CLOCK_TOLERANCE: Duration = Duration::from_secs(300);

/// Issuer, audience and time rules applied to a token.
///
/// Built once per trust policy and shared read-only across concurrent
/// validations; the builder methods consume `self`.
///
/// # Example
///
/// ```rust
/// use connector_auth::VerifyOptions;
/// use std::time::Duration;
///
/// let options = VerifyOptions::new(["https://api.botframework.com"])
///     .with_clock_tolerance(Duration::from_secs(60));
///
/// assert!(options.is_trusted_issuer("https://api.botframework.com"));
/// assert!(options.audience().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOptions {
    issuers: Vec<String>,
    audience: Option<String>,
    clock_tolerance: Duration,
    ignore_expiration: bool,
}

impl VerifyOptions {
    /// Trust tokens from `issuers`, no audience check, default tolerance.
    pub fn new<I, S>(issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            issuers: issuers.into_iter().map(Into::into).collect(),
            audience: None,
            clock_tolerance: DEFAULT_CLOCK_TOLERANCE,
            ignore_expiration: false,
        }
    }

    /// Require the `aud` claim to equal `audience`.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Set the clock skew tolerance for `exp`/`nbf`.
    pub fn with_clock_tolerance(mut self, tolerance: Duration) -> Self {
        self.clock_tolerance = tolerance;
        self
    }

    /// Skip the expiration check entirely.
    pub fn with_ignore_expiration(mut self, ignore: bool) -> Self {
        self.ignore_expiration = ignore;
        self
    }

    /// Trusted issuers.
    pub fn issuers(&self) -> &[String] {
        &self.issuers
    }

    /// Whether `issuer` is one of the trusted issuers.
    pub fn is_trusted_issuer(&self, issuer: &str) -> bool {
        self.issuers.iter().any(|trusted| trusted == issuer)
    }

    /// Expected audience, when the audience check is enabled.
    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    /// Clock skew tolerance.
    pub fn clock_tolerance(&self) -> Duration {
        self.clock_tolerance
    }

    /// Whether expiration is ignored.
    pub fn ignore_expiration(&self) -> bool {
        self.ignore_expiration
    }
}
