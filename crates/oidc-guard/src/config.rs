//! Authenticator configuration
//!
//! [`OidcConfig`] carries the four inputs the pipeline consumes (provider base
//! URL, realm, expected audience, JWKS cache TTL) plus the tuning knobs for
//! timeouts, clock skew and the signature algorithm allow-list. How the values
//! are loaded (flags, environment, files) is left to the embedding process;
//! the struct deserializes from any `serde` format with durations in seconds.

use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// RSA-family algorithms accepted in the allow-list
const RSA_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// Whether `alg` belongs to the RSA family (RS* or PS*)
pub(crate) fn is_rsa_algorithm(alg: Algorithm) -> bool {
    RSA_ALGORITHMS.contains(&alg)
}

/// OIDC provider and validation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OidcConfig {
    /// Provider base URL, e.g. `https://sso.example.com`
    pub base_url: String,

    /// Realm (tenant) name
    pub realm: String,

    /// Client identifier, checked against the `aud` claim
    pub client_id: String,

    /// How long a fetched key set is served before it is considered stale
    #[serde(default = "default_jwks_cache_ttl", with = "duration_secs")]
    pub jwks_cache_ttl: Duration,

    /// Upper bound for each discovery/JWKS request
    #[serde(default = "default_request_timeout", with = "duration_secs")]
    pub request_timeout: Duration,

    /// Minimum spacing between refreshes caused by an unknown `kid`
    /// while the cached key set is still fresh
    #[serde(default = "default_min_refresh_interval", with = "duration_secs")]
    pub min_refresh_interval: Duration,

    /// Clock skew tolerance for `exp`, `nbf` and `iat`
    #[serde(default = "default_clock_skew", with = "duration_secs")]
    pub clock_skew: Duration,

    /// Signature algorithms accepted for tokens (RSA family only)
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<Algorithm>,
}

fn default_jwks_cache_ttl() -> Duration {
    Duration::from_secs(300) // 5 minutes
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_min_refresh_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_clock_skew() -> Duration {
    Duration::from_secs(60)
}

fn default_algorithms() -> Vec<Algorithm> {
    vec![Algorithm::RS256]
}

impl OidcConfig {
    /// Create a configuration with default tuning
    pub fn new(
        base_url: impl Into<String>,
        realm: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            realm: realm.into(),
            client_id: client_id.into(),
            jwks_cache_ttl: default_jwks_cache_ttl(),
            request_timeout: default_request_timeout(),
            min_refresh_interval: default_min_refresh_interval(),
            clock_skew: default_clock_skew(),
            algorithms: default_algorithms(),
        }
    }

    /// Set the JWKS cache TTL
    #[must_use]
    pub fn with_jwks_cache_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_cache_ttl = ttl;
        self
    }

    /// Set the per-request network timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the unknown-`kid` refresh rate limit
    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Set the clock skew tolerance
    #[must_use]
    pub fn with_clock_skew(mut self, leeway: Duration) -> Self {
        self.clock_skew = leeway;
        self
    }

    /// Replace the algorithm allow-list
    #[must_use]
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfiguration`] if a required field is
    /// empty, the base URL is not an absolute HTTP(S) URL, the TTL or timeout
    /// is zero, or the algorithm allow-list is empty or contains a non-RSA
    /// algorithm.
    pub fn validate(&self) -> AuthResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "base_url is required".to_string(),
            ));
        }

        let url = url::Url::parse(&self.base_url).map_err(|e| {
            AuthError::InvalidConfiguration(format!("base_url is not a valid URL: {e}"))
        })?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(AuthError::InvalidConfiguration(
                "base_url must be an HTTP(S) URL".to_string(),
            ));
        }

        if self.realm.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration("realm is required".to_string()));
        }

        if self.client_id.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "client_id is required".to_string(),
            ));
        }

        if self.jwks_cache_ttl.is_zero() {
            return Err(AuthError::InvalidConfiguration(
                "jwks_cache_ttl must be greater than zero".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(AuthError::InvalidConfiguration(
                "request_timeout must be greater than zero".to_string(),
            ));
        }

        if self.algorithms.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "at least one signature algorithm must be allowed".to_string(),
            ));
        }

        if let Some(alg) = self
            .algorithms
            .iter()
            .find(|alg| !is_rsa_algorithm(**alg))
        {
            return Err(AuthError::InvalidConfiguration(format!(
                "algorithm {alg:?} is not allowed; only RSA signatures (RS*, PS*) are supported"
            )));
        }

        Ok(())
    }

    /// Well-known discovery URL for the configured realm.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfiguration`] if `base_url` is not a usable URL.
    pub fn discovery_url(&self) -> AuthResult<String> {
        crate::discovery::discovery_url(&self.base_url, &self.realm)
    }

    /// Build the HTTP client used for discovery and JWKS fetches.
    ///
    /// Requests are bounded by `request_timeout`; a timed-out request
    /// surfaces as an ordinary network failure. Redirects are not followed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfiguration`] if the client cannot be built.
    pub fn http_client(&self) -> AuthResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .user_agent(concat!("oidc-guard/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::InvalidConfiguration(format!("Failed to create HTTP client: {e}")))
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
